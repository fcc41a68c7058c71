//! 指令解释器
//!
//! 一批指令在存储的副本上逐条执行，全部成功后才替换原存储；
//! 任一条失败时原存储保持不变，错误中带有出错条目的序号。
//!
//! 名称冲突时自动加后缀（`A` → `A1`），同一批中后续对该名称的引用跟随新名称。

use crate::constraint::Derivation;
use crate::entity::{Angle, EntityId, Point, Polygon, PolygonSource, Segment};
use crate::error::{BoardError, BoardResult};
use crate::instruction::Instruction;
use crate::math::Point2;
use crate::polygon::refresh_polygons;
use crate::properties::Color;
use crate::resolver::Resolver;
use crate::store::EntityStore;
use std::collections::HashMap;

/// 批量执行结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// 执行的基本指令数（复合指令展开后）
    pub applied: usize,
    /// 新建实体
    pub created: Vec<EntityId>,
    /// 因重名而改名的实体：(请求的名称, 实际名称)
    pub renamed: Vec<(String, String)>,
    /// 已存在而被复用的线段
    pub reused: Vec<EntityId>,
    /// 执行后的自动多边形数
    pub polygons: usize,
}

/// 指令解释器
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    resolver: Resolver,
}

/// 单批执行上下文
struct Batch<'a> {
    store: &'a mut EntityStore,
    resolver: &'a Resolver,
    aliases: HashMap<String, String>,
    report: BatchReport,
}

fn color_or(text: Option<&str>, default: Color) -> BoardResult<Color> {
    match text {
        None => Ok(default),
        Some(text) => Color::parse(text)
            .ok_or_else(|| BoardError::InvalidParameter(format!("unknown color '{text}'"))),
    }
}

impl<'a> Batch<'a> {
    fn resolve_name<'n>(&'n self, name: &'n str) -> &'n str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    fn point_id(&self, name: &str) -> BoardResult<EntityId> {
        let actual = self.resolve_name(name);
        self.store
            .point_by_name(actual)
            .map(|p| p.id)
            .ok_or_else(|| BoardError::UnknownName(name.to_string()))
    }

    fn segment_ends(&self, name: &str) -> BoardResult<(EntityId, EntityId)> {
        let actual = self.resolve_name(name);
        self.store
            .segment_by_name(actual)
            .map(|s| (s.start, s.end))
            .ok_or_else(|| BoardError::UnknownName(name.to_string()))
    }

    /// 为新实体分配名称，冲突时加后缀并记录别名
    fn claim(&mut self, requested: Option<&str>, default_base: &str) -> String {
        let base = requested
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(default_base);
        let actual = self.store.unique_name(base);
        if actual != base && requested.is_some() {
            self.report.renamed.push((base.to_string(), actual.clone()));
            self.aliases.insert(base.to_string(), actual.clone());
        }
        actual
    }

    fn created(&mut self, id: EntityId) -> EntityId {
        self.report.created.push(id);
        id
    }

    fn add_derived(
        &mut self,
        requested: Option<&str>,
        default_base: &str,
        derivation: Derivation,
        color: Option<&str>,
    ) -> BoardResult<EntityId> {
        let color = color_or(color, Color::RED)?;
        let name = self.claim(requested, default_base);
        let id = self
            .store
            .add_point(Point::derived(name, derivation).with_color(color))?;
        Ok(self.created(id))
    }

    /// 连接两点；已有线段时复用
    fn connect(
        &mut self,
        requested: Option<&str>,
        a: EntityId,
        b: EntityId,
        color: Color,
        width: Option<f64>,
    ) -> BoardResult<EntityId> {
        if let Some(existing) = self.store.segment_between(a, b) {
            let id = existing.id;
            if let Some(requested) = requested {
                if requested != existing.name {
                    self.aliases.insert(requested.to_string(), existing.name.clone());
                }
            }
            self.report.reused.push(id);
            return Ok(id);
        }

        let default_base = format!("{}{}", self.store.name_of(a), self.store.name_of(b));
        let name = self.claim(requested, &default_base);
        let mut segment = Segment::new(name, a, b).with_color(color);
        if let Some(width) = width {
            if !(width.is_finite() && width > 0.0) {
                return Err(BoardError::InvalidParameter(format!(
                    "line width must be positive, got {width}"
                )));
            }
            segment.width = width;
        }
        let id = self.store.add_segment(segment)?;
        Ok(self.created(id))
    }

    fn outline(
        &mut self,
        name: Option<&str>,
        points: &[String],
        color: Option<&str>,
    ) -> BoardResult<Vec<EntityId>> {
        let ids = points
            .iter()
            .map(|p| self.point_id(p))
            .collect::<BoardResult<Vec<_>>>()?;
        let color = color_or(color, Color::BLACK)?;
        let n = ids.len();
        for i in 0..n {
            let edge_name = name.map(|name| format!("{name}_边{}", i + 1));
            self.connect(edge_name.as_deref(), ids[i], ids[(i + 1) % n], color, None)?;
        }
        Ok(ids)
    }

    /// 登记手动多边形，指定填充色时显示填充
    fn register_polygon(
        &mut self,
        name: Option<&str>,
        prefix: &str,
        vertices: Vec<EntityId>,
        fill_color: Option<&str>,
    ) -> BoardResult<()> {
        let fill = color_or(fill_color, Color::POLYGON_FILL)?;
        let polygon_name = self.claim(name, prefix);
        let mut polygon = Polygon::new(polygon_name, vertices, PolygonSource::Manual);
        polygon.fill_color = fill;
        polygon.show_fill = fill_color.is_some();
        let id = self.store.add_polygon(polygon)?;
        self.created(id);
        Ok(())
    }

    fn apply(&mut self, instruction: &Instruction) -> BoardResult<()> {
        match instruction {
            Instruction::Point {
                name,
                x,
                y,
                color,
                fixed,
            } => {
                if !(x.is_finite() && y.is_finite()) {
                    return Err(BoardError::InvalidParameter("coordinates must be finite".into()));
                }
                let color = color_or(color.as_deref(), Color::BLACK)?;
                let name = self.claim(name.as_deref(), "P");
                let id = self.store.add_point(
                    Point::free(name, Point2::new(*x, *y))
                        .with_color(color)
                        .with_fixed(*fixed),
                )?;
                self.created(id);
            }
            Instruction::Line {
                name,
                start_point,
                end_point,
                color,
                width,
            } => {
                let a = self.point_id(start_point)?;
                let b = self.point_id(end_point)?;
                let color = color_or(color.as_deref(), Color::BLACK)?;
                self.connect(name.as_deref(), a, b, color, *width)?;
            }
            Instruction::Triangle {
                name,
                points,
                color,
                fill_color,
            } => {
                if points.len() != 3 {
                    return Err(BoardError::InvalidParameter(format!(
                        "triangle needs exactly 3 points, got {}",
                        points.len()
                    )));
                }
                let vertices = self.outline(name.as_deref(), points, color.as_deref())?;
                // 不填充时交给自动检测
                if fill_color.is_some() {
                    self.register_polygon(name.as_deref(), "T", vertices, fill_color.as_deref())?;
                }
            }
            Instruction::Polygon {
                name,
                points,
                color,
                fill_color,
            } => {
                if points.len() < 3 {
                    return Err(BoardError::InvalidParameter(format!(
                        "polygon needs at least 3 points, got {}",
                        points.len()
                    )));
                }
                let vertices = self.outline(name.as_deref(), points, color.as_deref())?;
                self.register_polygon(name.as_deref(), "Poly", vertices, fill_color.as_deref())?;
            }
            Instruction::Midpoint {
                point_name,
                line_name,
                color,
            } => {
                let (a, b) = self.segment_ends(line_name)?;
                self.add_derived(point_name.as_deref(), "M", Derivation::Midpoint { a, b }, color.as_deref())?;
            }
            Instruction::RatioPoint {
                point_name,
                line_name,
                ratio,
                color,
            } => {
                let ratio = ratio.unwrap_or(0.5);
                if !ratio.is_finite() {
                    return Err(BoardError::InvalidParameter("ratio must be finite".into()));
                }
                let (a, b) = self.segment_ends(line_name)?;
                self.add_derived(point_name.as_deref(), "R", Derivation::ratio(a, b, ratio), color.as_deref())?;
            }
            Instruction::PerpendicularFoot {
                foot_name,
                source_point_name,
                line_name,
                color,
            } => {
                let source = self.point_id(source_point_name)?;
                let (a, b) = self.segment_ends(line_name)?;
                self.add_derived(
                    foot_name.as_deref(),
                    "F",
                    Derivation::PerpendicularFoot { source, a, b },
                    color.as_deref(),
                )?;
            }
            Instruction::Circumcenter {
                point_name,
                points,
                color,
            } => {
                let [p1, p2, p3] = points.as_slice() else {
                    return Err(BoardError::InvalidParameter(format!(
                        "circumcenter needs exactly 3 points, got {}",
                        points.len()
                    )));
                };
                let derivation = Derivation::Circumcenter {
                    p1: self.point_id(p1)?,
                    p2: self.point_id(p2)?,
                    p3: self.point_id(p3)?,
                };
                self.add_derived(point_name.as_deref(), "O", derivation, color.as_deref())?;
            }
            Instruction::Intersection {
                point_name,
                line1,
                line2,
                color,
            } => {
                let (a, b) = self.segment_ends(line1)?;
                let (c, d) = self.segment_ends(line2)?;
                self.add_derived(
                    point_name.as_deref(),
                    "X",
                    Derivation::Intersection { a, b, c, d },
                    color.as_deref(),
                )?;
            }
            Instruction::FixedLengthLine {
                name,
                start_point,
                end_point,
                length,
                color,
                width,
            } => {
                if !(length.is_finite() && *length > 0.0) {
                    return Err(BoardError::InvalidParameter(format!(
                        "length must be positive, got {length}"
                    )));
                }
                let a = self.point_id(start_point)?;
                let b = self.point_id(end_point)?;
                let color = color_or(color.as_deref(), Color::BLACK)?;
                let id = self.connect(name.as_deref(), a, b, color, *width)?;
                self.store.set_fixed_length(id, Some(*length))?;
                self.resolver.settle(self.store, id)?;
            }
            Instruction::FixedAngle {
                name,
                vertex,
                point1,
                point2,
                angle,
            } => {
                let vertex = self.point_id(vertex)?;
                let arm1 = self.point_id(point1)?;
                let arm2 = self.point_id(point2)?;
                let default_base = format!(
                    "{}{}{}",
                    self.store.name_of(arm1),
                    self.store.name_of(vertex),
                    self.store.name_of(arm2)
                );
                let name = self.claim(name.as_deref(), &default_base);
                let id = self
                    .store
                    .add_angle(Angle::new(name, arm1, vertex, arm2).with_target(*angle))?;
                self.created(id);
                self.resolver.settle(self.store, id)?;
            }
            Instruction::FixedPoint { point } => {
                let id = self.point_id(point)?;
                if self.store.point(id).is_some_and(|p| p.is_derived()) {
                    return Err(BoardError::NotMovable {
                        name: point.clone(),
                        reason: "derived points cannot be fixed".into(),
                    });
                }
                self.store.set_fixed(id, true)?;
            }
            composite => {
                for part in composite.expand()? {
                    if part.is_composite() {
                        return Err(BoardError::InvalidParameter(format!(
                            "nested composite '{}'",
                            part.kind()
                        )));
                    }
                    self.apply(&part)?;
                }
                return Ok(());
            }
        }
        self.report.applied += 1;
        Ok(())
    }
}

impl Interpreter {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// 原子地执行一批指令
    pub fn apply(
        &self,
        store: &mut EntityStore,
        instructions: &[Instruction],
    ) -> BoardResult<BatchReport> {
        let mut scratch = store.clone();
        let mut batch = Batch {
            store: &mut scratch,
            resolver: &self.resolver,
            aliases: HashMap::new(),
            report: BatchReport::default(),
        };

        for (index, instruction) in instructions.iter().enumerate() {
            if let Err(source) = batch.apply(instruction) {
                tracing::warn!(
                    "Instruction {} ({}) rejected: {}",
                    index,
                    instruction.kind(),
                    source
                );
                return Err(BoardError::Instruction {
                    index,
                    kind: instruction.kind().to_string(),
                    source: Box::new(source),
                });
            }
        }

        let mut report = batch.report;
        self.resolver.resolve_all(&mut scratch)?;
        report.polygons = refresh_polygons(&mut scratch)?.len();

        *store = scratch;
        tracing::info!(
            "Applied {} instructions: {} entities created, {} renamed",
            report.applied,
            report.created.len(),
            report.renamed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::angle_at;
    use crate::instruction::parse_instructions;
    use approx::assert_relative_eq;

    fn run(store: &mut EntityStore, json: &str) -> BoardResult<BatchReport> {
        Interpreter::default().apply(store, &parse_instructions(json).unwrap())
    }

    #[test]
    fn test_triangle_with_midpoint() {
        let mut store = EntityStore::new();
        let report = run(
            &mut store,
            r#"[
                {"type": "point", "name": "A", "x": 0, "y": 0},
                {"type": "point", "name": "B", "x": 4, "y": 0},
                {"type": "point", "name": "C", "x": 0, "y": 4},
                {"type": "triangle", "name": "T", "points": ["A", "B", "C"]},
                {"type": "midpoint", "point_name": "M", "line_name": "T_边1"}
            ]"#,
        )
        .unwrap();

        assert_eq!(report.applied, 5);
        assert_eq!(report.polygons, 1);
        assert_eq!(store.segment_count(), 3);
        assert_eq!(store.point_by_name("M").unwrap().position, Point2::new(2.0, 0.0));
    }

    #[test]
    fn test_filled_triangle() {
        let mut store = EntityStore::new();
        let report = run(
            &mut store,
            r#"[
                {"type": "point", "name": "A", "x": 0, "y": 0},
                {"type": "point", "name": "B", "x": 4, "y": 0},
                {"type": "point", "name": "C", "x": 0, "y": 4},
                {"type": "triangle", "name": "T", "points": ["A", "B", "C"], "fill_color": "yellow"}
            ]"#,
        )
        .unwrap();

        // 手动三角形覆盖了自动检测
        assert_eq!(store.polygon_count(), 1);
        let t = store.polygons().next().unwrap();
        assert_eq!(t.name, "T");
        assert_eq!(t.source, PolygonSource::Manual);
        assert!(t.show_fill);
        assert_eq!(t.fill_color, Color::YELLOW);
        assert!(report.created.contains(&t.id));
    }

    #[test]
    fn test_failure_leaves_store_untouched() {
        let mut store = EntityStore::new();
        run(&mut store, r#"{"type": "point", "name": "A", "x": 0, "y": 0}"#).unwrap();
        let before = store.clone();

        let err = run(
            &mut store,
            r#"[
                {"type": "point", "name": "B", "x": 1, "y": 1},
                {"type": "line", "start_point": "A", "end_point": "B"},
                {"type": "line", "start_point": "A", "end_point": "Z"}
            ]"#,
        )
        .unwrap_err();

        assert!(matches!(
            &err,
            BoardError::Instruction { index: 2, kind, source }
                if kind == "line" && matches!(**source, BoardError::UnknownName(ref n) if n == "Z")
        ));
        assert_eq!(store, before);
    }

    #[test]
    fn test_rename_follows_references() {
        let mut store = EntityStore::new();
        run(&mut store, r#"{"type": "point", "name": "A", "x": 0, "y": 0}"#).unwrap();

        let report = run(
            &mut store,
            r#"[
                {"type": "point", "name": "A", "x": 10, "y": 0},
                {"type": "point", "name": "B", "x": 10, "y": 10},
                {"type": "line", "name": "L", "start_point": "A", "end_point": "B"}
            ]"#,
        )
        .unwrap();

        assert_eq!(report.renamed, vec![("A".to_string(), "A1".to_string())]);
        let line = store.segment_by_name("L").unwrap();
        assert_eq!(store.name_of(line.start), "A1");
    }

    #[test]
    fn test_existing_segment_is_reused() {
        let mut store = EntityStore::new();
        let report = run(
            &mut store,
            r#"[
                {"type": "point", "name": "A", "x": 0, "y": 0},
                {"type": "point", "name": "B", "x": 3, "y": 4},
                {"type": "line", "name": "AB", "start_point": "A", "end_point": "B"},
                {"type": "fixed_length_line", "name": "L1", "start_point": "B", "end_point": "A", "length": 10},
                {"type": "midpoint", "line_name": "L1"}
            ]"#,
        )
        .unwrap();

        assert_eq!(store.segment_count(), 1);
        assert_eq!(report.reused.len(), 1);
        let ab = store.segment_by_name("AB").unwrap();
        assert_eq!(ab.fixed_length, Some(10.0));
        // 复用的线段方向为 A→B，调整的是终点 B
        let a = store.point_by_name("A").unwrap().position;
        let b = store.point_by_name("B").unwrap().position;
        assert_relative_eq!((a - b).norm(), 10.0, epsilon = 1e-9);
        assert!(store.point_by_name("M").is_some());
    }

    #[test]
    fn test_invalid_color_rejected() {
        let mut store = EntityStore::new();
        let err = run(
            &mut store,
            r#"{"type": "point", "name": "A", "x": 0, "y": 0, "color": "not-a-color"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BoardError::Instruction { index: 0, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_hand_in_hand_model() {
        let mut store = EntityStore::new();
        run(&mut store, r#"{"type": "hand_in_hand", "alpha": 60, "beta": 60}"#).unwrap();

        assert_eq!(store.point_count(), 5);
        assert_eq!(store.segment_count(), 8);
        assert_eq!(store.angle_count(), 2);
        assert!(store.point_by_name("O").unwrap().fixed);
        assert!(store.point_by_name("A").unwrap().fixed);

        let pos = |n: &str| store.point_by_name(n).unwrap().position;
        assert_relative_eq!((pos("A") - pos("O")).norm(), 160.0, epsilon = 1e-9);
        assert_relative_eq!((pos("D") - pos("O")).norm(), 240.0, epsilon = 1e-9);
        assert_relative_eq!(angle_at(&pos("C"), &pos("O"), &pos("D")), 60.0, epsilon = 1e-9);
        // 两个等边三角形：AOB、COD，加上 ABDC 四边形的闭环
        assert!(store.polygon_count() >= 2);

        // 手拉手结论：AC = BD
        assert_relative_eq!(
            (pos("A") - pos("C")).norm(),
            (pos("B") - pos("D")).norm(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_manual_polygon() {
        let mut store = EntityStore::new();
        run(
            &mut store,
            r#"[
                {"type": "rectangle", "name": "R", "x": 0, "y": 0, "width": 4, "height": 2},
                {"type": "polygon", "name": "Q", "points": ["RA", "RB", "RC"], "fill_color": "yellow"}
            ]"#,
        )
        .unwrap();
        let q = store.polygons().find(|p| p.name == "Q").unwrap();
        assert_eq!(q.source, PolygonSource::Manual);
        assert!(q.show_fill);
        // 只新建对角线 RC-RA
        assert_eq!(store.segment_count(), 5);
        // RA-RC-RD 被自动检测，RA-RB-RC 已由 Q 覆盖
        assert_eq!(store.polygon_count(), 2);
    }
}
