//! 测量与画布摘要

use crate::entity::EntityId;
use crate::error::{BoardError, BoardResult};
use crate::geometry::{angle_at, Line, Polyline};
use crate::math::{cross, Point2, Vector2};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

fn position(store: &EntityStore, id: EntityId) -> BoardResult<Point2> {
    store.position(id).ok_or(BoardError::EntityNotFound(id))
}

/// 线段长度
pub fn segment_length(store: &EntityStore, id: EntityId) -> BoardResult<f64> {
    let segment = store.segment(id).ok_or(BoardError::EntityNotFound(id))?;
    Ok(Line::new(position(store, segment.start)?, position(store, segment.end)?).length())
}

/// 角度（度）
pub fn angle_degrees(store: &EntityStore, id: EntityId) -> BoardResult<f64> {
    let angle = store.angle(id).ok_or(BoardError::EntityNotFound(id))?;
    Ok(angle_at(
        &position(store, angle.arm1)?,
        &position(store, angle.vertex)?,
        &position(store, angle.arm2)?,
    ))
}

fn polygon_outline(store: &EntityStore, id: EntityId) -> BoardResult<Polyline> {
    let polygon = store.polygon(id).ok_or(BoardError::EntityNotFound(id))?;
    let points = polygon
        .vertices
        .iter()
        .map(|&v| position(store, v))
        .collect::<BoardResult<Vec<_>>>()?;
    Ok(Polyline::new(points, true))
}

/// 多边形面积（鞋带公式）
pub fn polygon_area(store: &EntityStore, id: EntityId) -> BoardResult<f64> {
    Ok(polygon_outline(store, id)?.area())
}

/// 多边形周长
pub fn polygon_perimeter(store: &EntityStore, id: EntityId) -> BoardResult<f64> {
    Ok(polygon_outline(store, id)?.length())
}

/// 两条线段的交点
pub fn segment_intersection(
    store: &EntityStore,
    first: EntityId,
    second: EntityId,
) -> BoardResult<Option<Point2>> {
    let line = |id: EntityId| -> BoardResult<Line> {
        let s = store.segment(id).ok_or(BoardError::EntityNotFound(id))?;
        Ok(Line::new(position(store, s.start)?, position(store, s.end)?))
    };
    Ok(line(first)?.intersection(&line(second)?))
}

/// 动画过程中记录的测量项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Measurement {
    SegmentLength(EntityId),
    Angle(EntityId),
    PolygonArea(EntityId),
}

/// 测量值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementValue {
    pub name: String,
    pub measurement: Measurement,
    pub value: f64,
}

impl Measurement {
    pub fn target(&self) -> EntityId {
        match *self {
            Measurement::SegmentLength(id) | Measurement::Angle(id) | Measurement::PolygonArea(id) => id,
        }
    }

    pub fn measure(&self, store: &EntityStore) -> BoardResult<MeasurementValue> {
        let value = match *self {
            Measurement::SegmentLength(id) => segment_length(store, id)?,
            Measurement::Angle(id) => angle_degrees(store, id)?,
            Measurement::PolygonArea(id) => polygon_area(store, id)?,
        };
        Ok(MeasurementValue {
            name: store.name_of(self.target()),
            measurement: *self,
            value,
        })
    }

    /// 所有线段长度与多边形面积
    pub fn all_in(store: &EntityStore) -> Vec<Measurement> {
        store
            .segments()
            .map(|s| Measurement::SegmentLength(s.id))
            .chain(store.polygons().map(|p| Measurement::PolygonArea(p.id)))
            .collect()
    }
}

/// 画布摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSummary {
    pub points: usize,
    pub free_points: usize,
    pub derived_points: usize,
    pub fixed_points: usize,
    pub segments: usize,
    pub angles: usize,
    pub polygons: usize,
}

impl CanvasSummary {
    pub fn of(store: &EntityStore) -> Self {
        let derived_points = store.points().filter(|p| p.is_derived()).count();
        Self {
            points: store.point_count(),
            free_points: store.point_count() - derived_points,
            derived_points,
            fixed_points: store.points().filter(|p| p.fixed).count(),
            segments: store.segment_count(),
            angles: store.angle_count(),
            polygons: store.polygon_count(),
        }
    }
}

impl std::fmt::Display for CanvasSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} points ({} derived, {} fixed), {} segments, {} angles, {} polygons",
            self.points, self.derived_points, self.fixed_points, self.segments, self.angles, self.polygons
        )
    }
}

/// 判定平行、垂直的容差（夹角正弦/余弦的绝对值）
pub const RELATION_TOLERANCE: f64 = 0.01;

/// 画布上识别出的几何关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relation {
    /// 三点两两有线段相连
    Triangle { vertices: [EntityId; 3] },
    Parallel { first: EntityId, second: EntityId },
    Perpendicular { first: EntityId, second: EntityId },
}

impl Relation {
    pub fn describe(&self, store: &EntityStore) -> String {
        let name = |id| store.name_of(id);
        match *self {
            Relation::Triangle { vertices: [a, b, c] } => {
                format!("triangle {}{}{}", name(a), name(b), name(c))
            }
            Relation::Parallel { first, second } => {
                format!("segments {} and {} are parallel", name(first), name(second))
            }
            Relation::Perpendicular { first, second } => {
                format!("segments {} and {} are perpendicular", name(first), name(second))
            }
        }
    }
}

/// 识别三角形以及平行、垂直的线段对
pub fn find_relations(store: &EntityStore) -> Vec<Relation> {
    let mut adjacency: BTreeMap<EntityId, BTreeSet<EntityId>> = BTreeMap::new();
    for segment in store.segments().filter(|s| s.start != s.end) {
        adjacency.entry(segment.start).or_default().insert(segment.end);
        adjacency.entry(segment.end).or_default().insert(segment.start);
    }

    let mut relations = Vec::new();
    for (&a, neighbours) in &adjacency {
        for &b in neighbours.range(a..).filter(|&&b| b > a) {
            for &c in adjacency[&b].range(b..).filter(|&&c| c > b) {
                if neighbours.contains(&c) {
                    relations.push(Relation::Triangle { vertices: [a, b, c] });
                }
            }
        }
    }

    let directions: Vec<(EntityId, Vector2)> = store
        .segments()
        .filter_map(|s| {
            let d = store.position(s.end)? - store.position(s.start)?;
            (d.norm() > f64::EPSILON).then(|| (s.id, d.normalize()))
        })
        .collect();
    for (i, (first, u)) in directions.iter().enumerate() {
        for (second, v) in &directions[i + 1..] {
            let (sin, cos) = (cross(u, v).abs(), u.dot(v).abs());
            if sin < RELATION_TOLERANCE {
                relations.push(Relation::Parallel { first: *first, second: *second });
            } else if cos < RELATION_TOLERANCE {
                relations.push(Relation::Perpendicular { first: *first, second: *second });
            }
        }
    }
    relations
}

/// 根据画布内容给出下一步作图建议
pub fn suggestions(store: &EntityStore) -> Vec<String> {
    let points = store.point_count();
    let segments = store.segment_count();
    let has_triangle = find_relations(store)
        .iter()
        .any(|r| matches!(r, Relation::Triangle { .. }));

    let mut hints = Vec::new();
    if points >= 2 && segments == 0 {
        hints.push("Connect the points with segments".to_string());
    }
    if points >= 3 {
        hints.push(if has_triangle {
            "Add midpoints, altitudes or medians to the triangle".to_string()
        } else {
            "Build a triangle from three of the points".to_string()
        });
    }
    if segments >= 1 {
        hints.push("Add midpoints or ratio points on the segments".to_string());
    }
    if segments >= 2 {
        hints.push("Find where the segments intersect".to_string());
    }
    if segments >= 1 && !store.points().any(|p| p.is_derived()) {
        hints.push("Add constraints such as fixed lengths or angles".to_string());
    }
    hints
}

/// 画布的文字描述，作为助手的上下文
pub fn describe_canvas(store: &EntityStore) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Canvas: {}", CanvasSummary::of(store));

    for point in store.points() {
        let _ = write!(
            text,
            "- point {} ({:.1}, {:.1})",
            point.name, point.position.x, point.position.y
        );
        if let Some(derivation) = &point.derivation {
            let _ = write!(text, ": {}", derivation.describe(&point.name, |id| store.name_of(id)));
        }
        if point.fixed {
            text.push_str(" [fixed]");
        }
        text.push('\n');
    }
    for segment in store.segments() {
        let _ = write!(
            text,
            "- segment {} = {}{}",
            segment.name,
            store.name_of(segment.start),
            store.name_of(segment.end)
        );
        if let Some(length) = segment.fixed_length {
            let _ = write!(text, " [length {length:.1}]");
        }
        text.push('\n');
    }
    for angle in store.angles() {
        let _ = write!(text, "- angle {}", angle.name);
        if let Some(target) = angle.target {
            let _ = write!(text, " [{target:.1} deg]");
        }
        text.push('\n');
    }
    for polygon in store.polygons() {
        let names: Vec<String> = polygon.vertices.iter().map(|&v| store.name_of(v)).collect();
        let _ = writeln!(text, "- polygon {} = {}", polygon.name, names.join(""));
    }

    let relations = find_relations(store);
    if !relations.is_empty() {
        text.push_str("Relations:\n");
        for relation in &relations {
            let _ = writeln!(text, "- {}", relation.describe(store));
        }
    }
    let hints = suggestions(store);
    if !hints.is_empty() {
        text.push_str("Suggestions:\n");
        for hint in hints {
            let _ = writeln!(text, "- {hint}");
        }
    }
    text
}
