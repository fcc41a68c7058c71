//! 几何实体存储
//!
//! 保存画板上的所有点、线段、角和多边形，负责：
//! - ID 分配与名称唯一性
//! - 按 ID / 名称查询
//! - 级联删除（删除点时一并删除引用它的实体与派生点）

use crate::constraint::Derivation;
use crate::entity::{Angle, EntityId, EntityRef, Point, Polygon, PolygonSource, Segment};
use crate::error::{BoardError, BoardResult};
use crate::math::Point2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// 实体存储
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoreData", into = "StoreData")]
pub struct EntityStore {
    next_id: u64,
    points: BTreeMap<EntityId, Point>,
    segments: BTreeMap<EntityId, Segment>,
    angles: BTreeMap<EntityId, Angle>,
    polygons: BTreeMap<EntityId, Polygon>,
    /// 名称索引
    names: HashMap<String, EntityId>,
}

/// 序列化形式：按 ID 顺序排列的实体列表
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreData {
    next_id: u64,
    points: Vec<Point>,
    segments: Vec<Segment>,
    angles: Vec<Angle>,
    polygons: Vec<Polygon>,
}

impl From<StoreData> for EntityStore {
    fn from(data: StoreData) -> Self {
        let mut store = EntityStore::new();
        for point in data.points {
            store.names.insert(point.name.clone(), point.id);
            store.points.insert(point.id, point);
        }
        for segment in data.segments {
            store.names.insert(segment.name.clone(), segment.id);
            store.segments.insert(segment.id, segment);
        }
        for angle in data.angles {
            store.names.insert(angle.name.clone(), angle.id);
            store.angles.insert(angle.id, angle);
        }
        for polygon in data.polygons {
            store.names.insert(polygon.name.clone(), polygon.id);
            store.polygons.insert(polygon.id, polygon);
        }
        store.next_id = data.next_id.max(store.max_id() + 1);
        store
    }
}

impl From<EntityStore> for StoreData {
    fn from(store: EntityStore) -> Self {
        Self {
            next_id: store.next_id,
            points: store.points.into_values().collect(),
            segments: store.segments.into_values().collect(),
            angles: store.angles.into_values().collect(),
            polygons: store.polygons.into_values().collect(),
        }
    }
}

impl EntityStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            next_id: 1,
            points: BTreeMap::new(),
            segments: BTreeMap::new(),
            angles: BTreeMap::new(),
            polygons: BTreeMap::new(),
            names: HashMap::new(),
        }
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn max_id(&self) -> u64 {
        [
            self.points.keys().next_back(),
            self.segments.keys().next_back(),
            self.angles.keys().next_back(),
            self.polygons.keys().next_back(),
        ]
        .into_iter()
        .flatten()
        .map(|id| id.0)
        .max()
        .unwrap_or(0)
    }

    // === 名称 ===

    /// 名称是否已被占用
    pub fn name_in_use(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// 生成唯一名称：`base`、`base1`、`base2`……
    pub fn unique_name(&self, base: &str) -> String {
        if !self.name_in_use(base) {
            return base.to_string();
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{base}{counter}");
            if !self.name_in_use(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn claim_name(&mut self, name: &str, default_prefix: &str, id: EntityId) -> BoardResult<String> {
        let name = if name.is_empty() {
            self.unique_name(&format!("{default_prefix}{}", id.0))
        } else if self.name_in_use(name) {
            return Err(BoardError::DuplicateName(name.to_string()));
        } else {
            name.to_string()
        };
        self.names.insert(name.clone(), id);
        Ok(name)
    }

    /// 按名称查找实体ID
    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// 实体名称，找不到时返回ID的字符串形式
    pub fn name_of(&self, id: EntityId) -> String {
        self.get(id)
            .map(|entity| match entity {
                EntityRef::Point(p) => p.name.clone(),
                EntityRef::Segment(s) => s.name.clone(),
                EntityRef::Angle(a) => a.name.clone(),
                EntityRef::Polygon(p) => p.name.clone(),
            })
            .unwrap_or_else(|| id.to_string())
    }

    /// 重命名实体
    pub fn rename(&mut self, id: EntityId, new_name: &str) -> BoardResult<()> {
        if new_name.is_empty() {
            return Err(BoardError::InvalidParameter("name must not be empty".into()));
        }
        if let Some(owner) = self.id_of(new_name) {
            if owner == id {
                return Ok(());
            }
            return Err(BoardError::DuplicateName(new_name.to_string()));
        }

        let slot = if let Some(p) = self.points.get_mut(&id) {
            &mut p.name
        } else if let Some(s) = self.segments.get_mut(&id) {
            &mut s.name
        } else if let Some(a) = self.angles.get_mut(&id) {
            &mut a.name
        } else if let Some(p) = self.polygons.get_mut(&id) {
            &mut p.name
        } else {
            return Err(BoardError::EntityNotFound(id));
        };

        let old = std::mem::replace(slot, new_name.to_string());
        self.names.remove(&old);
        self.names.insert(new_name.to_string(), id);
        Ok(())
    }

    // === 添加 ===

    /// 添加点
    ///
    /// 派生点的操作数必须已存在，初始位置立即按约束计算。
    pub fn add_point(&mut self, mut point: Point) -> BoardResult<EntityId> {
        if let Some(derivation) = &point.derivation {
            let position = self.evaluate(derivation)?;
            match position {
                Some(p) => point.position = p,
                None => point.undefined = true,
            }
        }

        let id = self.allocate_id();
        point.id = id;
        point.name = self.claim_name(&point.name, "P", id)?;
        self.points.insert(id, point);
        Ok(id)
    }

    /// 添加线段
    pub fn add_segment(&mut self, mut segment: Segment) -> BoardResult<EntityId> {
        self.require_point(segment.start)?;
        self.require_point(segment.end)?;
        if segment.start == segment.end {
            return Err(BoardError::InvalidParameter(format!(
                "segment endpoints must differ ({})",
                self.name_of(segment.start)
            )));
        }
        if let Some(length) = segment.fixed_length {
            if !(length.is_finite() && length > 0.0) {
                return Err(BoardError::InvalidParameter(format!(
                    "fixed length must be positive, got {length}"
                )));
            }
        }

        let id = self.allocate_id();
        segment.id = id;
        segment.name = self.claim_name(&segment.name, "L", id)?;
        self.segments.insert(id, segment);
        Ok(id)
    }

    /// 添加角
    pub fn add_angle(&mut self, mut angle: Angle) -> BoardResult<EntityId> {
        for p in angle.points() {
            self.require_point(p)?;
        }
        if angle.arm1 == angle.vertex || angle.arm2 == angle.vertex || angle.arm1 == angle.arm2 {
            return Err(BoardError::InvalidParameter(
                "angle needs three distinct points".into(),
            ));
        }
        if let Some(target) = angle.target {
            if !(target.is_finite() && target > 0.0 && target < 180.0) {
                return Err(BoardError::InvalidParameter(format!(
                    "fixed angle must be in (0, 180), got {target}"
                )));
            }
        }

        let id = self.allocate_id();
        angle.id = id;
        angle.name = self.claim_name(&angle.name, "A", id)?;
        self.angles.insert(id, angle);
        Ok(id)
    }

    /// 添加多边形
    pub fn add_polygon(&mut self, mut polygon: Polygon) -> BoardResult<EntityId> {
        if polygon.vertices.len() < 3 {
            return Err(BoardError::InvalidParameter(
                "polygon needs at least three vertices".into(),
            ));
        }
        let distinct: HashSet<_> = polygon.vertices.iter().collect();
        if distinct.len() != polygon.vertices.len() {
            return Err(BoardError::InvalidParameter(
                "polygon vertices must be distinct".into(),
            ));
        }
        for v in &polygon.vertices {
            self.require_point(*v)?;
        }

        let id = self.allocate_id();
        polygon.id = id;
        polygon.name = self.claim_name(&polygon.name, "Poly", id)?;
        self.polygons.insert(id, polygon);
        Ok(id)
    }

    // === 查询 ===

    pub fn point(&self, id: EntityId) -> Option<&Point> {
        self.points.get(&id)
    }

    pub fn segment(&self, id: EntityId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    pub fn angle(&self, id: EntityId) -> Option<&Angle> {
        self.angles.get(&id)
    }

    pub fn polygon(&self, id: EntityId) -> Option<&Polygon> {
        self.polygons.get(&id)
    }

    /// 按ID查询任意实体
    pub fn get(&self, id: EntityId) -> Option<EntityRef<'_>> {
        if let Some(p) = self.points.get(&id) {
            Some(EntityRef::Point(p))
        } else if let Some(s) = self.segments.get(&id) {
            Some(EntityRef::Segment(s))
        } else if let Some(a) = self.angles.get(&id) {
            Some(EntityRef::Angle(a))
        } else {
            self.polygons.get(&id).map(EntityRef::Polygon)
        }
    }

    pub fn point_by_name(&self, name: &str) -> Option<&Point> {
        self.id_of(name).and_then(|id| self.points.get(&id))
    }

    pub fn segment_by_name(&self, name: &str) -> Option<&Segment> {
        self.id_of(name).and_then(|id| self.segments.get(&id))
    }

    /// 当前坐标
    pub fn position(&self, id: EntityId) -> Option<Point2> {
        self.points.get(&id).map(|p| p.position)
    }

    /// 查找连接两点的线段
    pub fn segment_between(&self, a: EntityId, b: EntityId) -> Option<&Segment> {
        self.segments.values().find(|s| s.connects(a, b))
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.values()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn angles(&self) -> impl Iterator<Item = &Angle> {
        self.angles.values()
    }

    pub fn polygons(&self) -> impl Iterator<Item = &Polygon> {
        self.polygons.values()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn angle_count(&self) -> usize {
        self.angles.len()
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// 实体总数
    pub fn len(&self) -> usize {
        self.points.len() + self.segments.len() + self.angles.len() + self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn require_point(&self, id: EntityId) -> BoardResult<&Point> {
        self.points.get(&id).ok_or(BoardError::EntityNotFound(id))
    }

    /// 按当前坐标求值派生规则
    pub fn evaluate(&self, derivation: &Derivation) -> BoardResult<Option<Point2>> {
        derivation
            .evaluate(|id| self.position(id))
            .map_err(BoardError::EntityNotFound)
    }

    // === 修改 ===

    /// 直接写入坐标，不做任何约束检查（由求解器调用）
    pub(crate) fn set_position(&mut self, id: EntityId, position: Point2) -> BoardResult<()> {
        let point = self.points.get_mut(&id).ok_or(BoardError::EntityNotFound(id))?;
        point.position = position;
        Ok(())
    }

    pub(crate) fn set_undefined(&mut self, id: EntityId, undefined: bool) {
        if let Some(point) = self.points.get_mut(&id) {
            point.undefined = undefined;
        }
    }

    /// 直接替换派生规则，不检查环（由求解器调用）
    pub(crate) fn replace_derivation(
        &mut self,
        id: EntityId,
        derivation: Option<Derivation>,
    ) -> BoardResult<Option<Derivation>> {
        let point = self.points.get_mut(&id).ok_or(BoardError::EntityNotFound(id))?;
        Ok(std::mem::replace(&mut point.derivation, derivation))
    }

    /// 设置/取消固定点
    pub fn set_fixed(&mut self, id: EntityId, fixed: bool) -> BoardResult<()> {
        let point = self.points.get_mut(&id).ok_or(BoardError::EntityNotFound(id))?;
        point.fixed = fixed;
        Ok(())
    }

    /// 设置线段固定长度
    pub fn set_fixed_length(&mut self, id: EntityId, length: Option<f64>) -> BoardResult<()> {
        if let Some(length) = length {
            if !(length.is_finite() && length > 0.0) {
                return Err(BoardError::InvalidParameter(format!(
                    "fixed length must be positive, got {length}"
                )));
            }
        }
        let segment = self.segments.get_mut(&id).ok_or(BoardError::EntityNotFound(id))?;
        segment.fixed_length = length;
        Ok(())
    }

    /// 设置多边形填充
    pub fn set_polygon_fill(
        &mut self,
        id: EntityId,
        show_fill: bool,
        fill_color: Option<crate::properties::Color>,
    ) -> BoardResult<()> {
        let polygon = self.polygons.get_mut(&id).ok_or(BoardError::EntityNotFound(id))?;
        polygon.show_fill = show_fill;
        if let Some(color) = fill_color {
            polygon.fill_color = color;
        }
        Ok(())
    }

    /// 用新检测结果替换所有自动多边形
    pub(crate) fn replace_auto_polygons(&mut self, detected: Vec<Polygon>) -> BoardResult<Vec<EntityId>> {
        let stale: Vec<EntityId> = self
            .polygons
            .values()
            .filter(|p| p.source == PolygonSource::Auto)
            .map(|p| p.id)
            .collect();
        for id in stale {
            if let Some(p) = self.polygons.remove(&id) {
                self.names.remove(&p.name);
            }
        }

        let mut ids = Vec::with_capacity(detected.len());
        for mut polygon in detected {
            polygon.name = self.unique_name(&polygon.name);
            ids.push(self.add_polygon(polygon)?);
        }
        Ok(ids)
    }

    // === 删除 ===

    /// 删除实体，返回所有被删除的ID（含级联）
    ///
    /// 删除点时，引用该点的线段、角、多边形以及依赖它的派生点一并删除。
    pub fn remove(&mut self, id: EntityId) -> BoardResult<Vec<EntityId>> {
        if self.get(id).is_none() {
            return Err(BoardError::EntityNotFound(id));
        }

        let mut removed = Vec::new();
        let mut pending = vec![id];

        while let Some(current) = pending.pop() {
            if let Some(point) = self.points.remove(&current) {
                self.names.remove(&point.name);
                removed.push(current);

                let dependants: Vec<EntityId> = self
                    .points
                    .values()
                    .filter(|p| p.derivation.as_ref().is_some_and(|d| d.depends_on(current)))
                    .map(|p| p.id)
                    .collect();
                pending.extend(dependants);

                let segments: Vec<EntityId> = self
                    .segments
                    .values()
                    .filter(|s| s.touches(current))
                    .map(|s| s.id)
                    .collect();
                pending.extend(segments);

                let angles: Vec<EntityId> = self
                    .angles
                    .values()
                    .filter(|a| a.points().contains(&current))
                    .map(|a| a.id)
                    .collect();
                pending.extend(angles);

                let polygons: Vec<EntityId> = self
                    .polygons
                    .values()
                    .filter(|p| p.vertices.contains(&current))
                    .map(|p| p.id)
                    .collect();
                pending.extend(polygons);
            } else if let Some(segment) = self.segments.remove(&current) {
                self.names.remove(&segment.name);
                removed.push(current);
            } else if let Some(angle) = self.angles.remove(&current) {
                self.names.remove(&angle.name);
                removed.push(current);
            } else if let Some(polygon) = self.polygons.remove(&current) {
                self.names.remove(&polygon.name);
                removed.push(current);
            }
        }

        tracing::debug!("Removed {} entities starting from {}", removed.len(), id);
        Ok(removed)
    }

    /// 清空
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
