//! 约束求解
//!
//! 派生点按依赖图的拓扑顺序重新计算；固定长度与固定角度通过有限轮次的
//! 逐约束投影来满足（高斯-赛德尔式迭代）。

use crate::constraint::Derivation;
use crate::entity::EntityId;
use crate::error::{BoardError, BoardResult};
use crate::geometry::{angle_at, rotate_to_angle};
use crate::math::{Point2, Vector2, EPSILON};
use crate::store::EntityStore;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// 求解参数
#[derive(Debug, Clone)]
pub struct ResolverParams {
    /// 约束投影的最大轮数
    pub max_passes: usize,

    /// 长度容差
    pub tolerance: f64,

    /// 角度容差（度）
    pub angle_tolerance: f64,
}

impl Default for ResolverParams {
    fn default() -> Self {
        Self {
            max_passes: 16,
            tolerance: 1e-6,
            angle_tolerance: 1e-6,
        }
    }
}

/// 一次求解的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveReport {
    /// 重新计算过位置的派生点
    pub updated: Vec<EntityId>,
    /// 当前无解的派生点
    pub undefined: Vec<EntityId>,
    /// 被长度/角度约束调整过的自由点
    pub adjusted: Vec<EntityId>,
}

/// 派生点依赖图
///
/// 边从派生点指向它的操作数。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    operands: BTreeMap<EntityId, Vec<EntityId>>,
}

impl DependencyGraph {
    pub fn build(store: &EntityStore) -> Self {
        let operands = store
            .points()
            .filter_map(|p| p.derivation.as_ref().map(|d| (p.id, d.operands())))
            .collect();
        Self { operands }
    }

    /// 派生点数量
    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    /// 拓扑排序：操作数总在依赖它的点之前
    ///
    /// 存在环时返回 [`BoardError::ConstraintCycle`]，包含环上的点名。
    pub fn topological_order(&self, store: &EntityStore) -> BoardResult<Vec<EntityId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: BTreeMap<EntityId, Mark> = BTreeMap::new();
        let mut order = Vec::with_capacity(self.operands.len());

        for &root in self.operands.keys() {
            if marks.contains_key(&root) {
                continue;
            }

            // 显式栈的DFS，`path` 记录当前路径用于报告环
            let mut path: Vec<EntityId> = Vec::new();
            let mut stack: Vec<(EntityId, usize)> = vec![(root, 0)];
            marks.insert(root, Mark::Visiting);
            path.push(root);

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                let deps = self.operands.get(&node).map(Vec::as_slice).unwrap_or(&[]);
                if *next < deps.len() {
                    let dep = deps[*next];
                    *next += 1;
                    if !self.operands.contains_key(&dep) {
                        continue;
                    }
                    match marks.get(&dep) {
                        Some(Mark::Done) => {}
                        Some(Mark::Visiting) => {
                            let start = path.iter().position(|&p| p == dep).unwrap_or(0);
                            let mut names: Vec<String> =
                                path[start..].iter().map(|&p| store.name_of(p)).collect();
                            names.push(store.name_of(dep));
                            return Err(BoardError::ConstraintCycle(names));
                        }
                        None => {
                            marks.insert(dep, Mark::Visiting);
                            path.push(dep);
                            stack.push((dep, 0));
                        }
                    }
                } else {
                    marks.insert(node, Mark::Done);
                    order.push(node);
                    path.pop();
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    /// 直接或间接依赖于 `changed` 中任一点的派生点
    pub fn dependants_of(&self, changed: &[EntityId]) -> BTreeSet<EntityId> {
        let mut affected: BTreeSet<EntityId> = BTreeSet::new();
        let mut frontier: Vec<EntityId> = changed.to_vec();
        while let Some(current) = frontier.pop() {
            for (&point, deps) in &self.operands {
                if deps.contains(&current) && affected.insert(point) {
                    frontier.push(point);
                }
            }
        }
        affected
    }

    /// `from` 是否（传递地）依赖 `target`
    fn reaches(&self, from: EntityId, target: EntityId) -> bool {
        let mut seen = HashSet::new();
        let mut frontier = vec![from];
        while let Some(current) = frontier.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(deps) = self.operands.get(&current) {
                frontier.extend(deps.iter().copied());
            }
        }
        false
    }
}

/// 约束求解器
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    params: ResolverParams,
}

impl Resolver {
    pub fn new(params: ResolverParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ResolverParams {
        &self.params
    }

    /// 检查依赖图无环，返回拓扑顺序
    pub fn validate(&self, store: &EntityStore) -> BoardResult<Vec<EntityId>> {
        DependencyGraph::build(store).topological_order(store)
    }

    /// 重新计算所有派生点
    pub fn resolve_all(&self, store: &mut EntityStore) -> BoardResult<ResolveReport> {
        let order = self.validate(store)?;
        let mut report = ResolveReport::default();
        self.evaluate_in_order(store, &order, &mut report)?;
        tracing::debug!(
            "Resolved {} derived points ({} undefined)",
            report.updated.len(),
            report.undefined.len()
        );
        Ok(report)
    }

    /// 只重新计算依赖于 `changed` 的派生点
    pub fn resolve_from(
        &self,
        store: &mut EntityStore,
        changed: &[EntityId],
    ) -> BoardResult<ResolveReport> {
        let graph = DependencyGraph::build(store);
        let order = graph.topological_order(store)?;
        let affected = graph.dependants_of(changed);
        let order: Vec<EntityId> = order.into_iter().filter(|id| affected.contains(id)).collect();

        let mut report = ResolveReport::default();
        self.evaluate_in_order(store, &order, &mut report)?;
        Ok(report)
    }

    /// 拖动自由点
    ///
    /// 派生点与固定点不可移动。移动后执行长度/角度约束，再更新受影响的派生点。
    pub fn move_point(
        &self,
        store: &mut EntityStore,
        id: EntityId,
        position: Point2,
    ) -> BoardResult<ResolveReport> {
        let point = store.point(id).ok_or(BoardError::EntityNotFound(id))?;
        if point.is_derived() {
            return Err(BoardError::NotMovable {
                name: point.name.clone(),
                reason: "position is derived from other points".into(),
            });
        }
        if point.fixed {
            return Err(BoardError::NotMovable {
                name: point.name.clone(),
                reason: "point is fixed".into(),
            });
        }
        if !(position.x.is_finite() && position.y.is_finite()) {
            return Err(BoardError::InvalidParameter(format!(
                "non-finite position for '{}'",
                point.name
            )));
        }

        store.set_position(id, position)?;
        // 约束执行前派生点必须已是新位置
        let mut report = self.resolve_from(store, &[id])?;
        let adjusted = self.enforce(store, id)?;

        if !adjusted.is_empty() {
            let followup = self.resolve_from(store, &adjusted)?;
            for updated in followup.updated {
                if !report.updated.contains(&updated) {
                    report.updated.push(updated);
                }
            }
            report.undefined.extend(followup.undefined);
            report.undefined.sort();
            report.undefined.dedup();
            report
                .undefined
                .retain(|p| store.point(*p).is_some_and(|p| p.undefined));
        }
        report.adjusted = adjusted;
        Ok(report)
    }

    /// 设置或清除点的派生规则
    ///
    /// 会形成环时拒绝，存储保持不变。
    pub fn set_derivation(
        &self,
        store: &mut EntityStore,
        id: EntityId,
        derivation: Option<Derivation>,
    ) -> BoardResult<ResolveReport> {
        if store.point(id).is_none() {
            return Err(BoardError::EntityNotFound(id));
        }

        if let Some(derivation) = &derivation {
            let graph = DependencyGraph::build(store);
            for operand in derivation.operands() {
                if store.point(operand).is_none() {
                    return Err(BoardError::EntityNotFound(operand));
                }
                if graph.reaches(operand, id) {
                    let mut names = vec![store.name_of(id), store.name_of(operand)];
                    if operand != id {
                        names.push(store.name_of(id));
                    }
                    return Err(BoardError::ConstraintCycle(names));
                }
            }
        }

        store.replace_derivation(id, derivation)?;
        let mut order = self.validate(store)?;
        let affected = DependencyGraph::build(store).dependants_of(&[id]);
        order.retain(|p| *p == id || affected.contains(p));

        let mut report = ResolveReport::default();
        self.evaluate_in_order(store, &order, &mut report)?;
        Ok(report)
    }

    fn evaluate_in_order(
        &self,
        store: &mut EntityStore,
        order: &[EntityId],
        report: &mut ResolveReport,
    ) -> BoardResult<()> {
        for &id in order {
            let Some(derivation) = store.point(id).and_then(|p| p.derivation.clone()) else {
                continue;
            };
            match store.evaluate(&derivation)? {
                Some(position) => {
                    store.set_position(id, position)?;
                    store.set_undefined(id, false);
                    report.updated.push(id);
                }
                None => {
                    if store.point(id).is_some_and(|p| !p.undefined) {
                        tracing::warn!("Derived point '{}' is undefined", store.name_of(id));
                    }
                    store.set_undefined(id, true);
                    report.undefined.push(id);
                }
            }
        }
        Ok(())
    }

    /// 立即满足单个固定长度线段或固定角度，返回被移动的点
    ///
    /// 线段优先移动终点，角度优先移动第二条边上的点。
    pub fn settle(&self, store: &mut EntityStore, id: EntityId) -> BoardResult<Option<EntityId>> {
        let locked = Self::locked_points(store);
        let movable = |p: &EntityId| !locked.contains(p);

        let moved = if let Some(segment) = store.segment(id) {
            let Some(length) = segment.fixed_length else {
                return Ok(None);
            };
            let (start, end) = (segment.start, segment.end);
            match [end, start].into_iter().find(movable) {
                Some(mover) => self.fix_length(store, start, end, length, mover),
                None => None,
            }
        } else if let Some(angle) = store.angle(id) {
            let Some(target) = angle.target else {
                return Ok(None);
            };
            let (arm1, vertex, arm2) = (angle.arm1, angle.vertex, angle.arm2);
            match [arm2, arm1].into_iter().find(movable) {
                Some(mover) => self.fix_angle(store, arm1, vertex, arm2, target, mover),
                None => None,
            }
        } else {
            return Err(BoardError::EntityNotFound(id));
        };

        if moved.is_none() {
            tracing::debug!("Constraint {} already satisfied or fully locked", store.name_of(id));
        }
        if let Some(mover) = moved {
            self.resolve_from(store, &[mover])?;
        }
        Ok(moved)
    }

    fn locked_points(store: &EntityStore) -> HashSet<EntityId> {
        store
            .points()
            .filter(|p| p.fixed || p.is_derived())
            .map(|p| p.id)
            .collect()
    }

    /// 沿线段方向移动 mover 使长度恢复，已满足时返回 None
    fn fix_length(
        &self,
        store: &mut EntityStore,
        start: EntityId,
        end: EntityId,
        length: f64,
        mover: EntityId,
    ) -> Option<EntityId> {
        let ps = store.position(start)?;
        let pe = store.position(end)?;
        let current = (pe - ps).norm();
        if (current - length).abs() <= self.params.tolerance {
            return None;
        }
        let (anchor, free) = if mover == end { (ps, pe) } else { (pe, ps) };
        let direction = if current < EPSILON {
            Vector2::x()
        } else {
            (free - anchor) / current
        };
        store.set_position(mover, anchor + direction * length).ok()?;
        Some(mover)
    }

    /// 绕顶点旋转 mover 使角度恢复，已满足时返回 None
    fn fix_angle(
        &self,
        store: &mut EntityStore,
        arm1: EntityId,
        vertex: EntityId,
        arm2: EntityId,
        target: f64,
        mover: EntityId,
    ) -> Option<EntityId> {
        let p1 = store.position(arm1)?;
        let pv = store.position(vertex)?;
        let p2 = store.position(arm2)?;
        if (angle_at(&p1, &pv, &p2) - target).abs() <= self.params.angle_tolerance {
            return None;
        }
        let rotated = if mover == arm2 {
            rotate_to_angle(&p1, &pv, &p2, target)
        } else {
            rotate_to_angle(&p2, &pv, &p1, target)
        };
        store.set_position(mover, rotated).ok()?;
        Some(mover)
    }

    /// 执行固定长度与固定角度约束，返回被调整的点
    ///
    /// 派生点与固定点不会被调整；`dragged` 只在约束另一端不可调整时才被投影。
    /// 每次调整后立即更新依赖于被移动点的派生点，后续约束读到的都是当前位置。
    pub fn enforce(&self, store: &mut EntityStore, dragged: EntityId) -> BoardResult<Vec<EntityId>> {
        let locked = Self::locked_points(store);
        let pick = |candidates: &[EntityId]| -> Option<EntityId> {
            candidates
                .iter()
                .copied()
                .find(|c| !locked.contains(c) && *c != dragged)
                .or_else(|| candidates.iter().copied().find(|c| !locked.contains(c)))
        };

        let lengths: Vec<(EntityId, EntityId, f64)> = store
            .segments()
            .filter_map(|s| s.fixed_length.map(|l| (s.start, s.end, l)))
            .collect();
        let angles: Vec<(EntityId, EntityId, EntityId, f64)> = store
            .angles()
            .filter_map(|a| a.target.map(|t| (a.arm1, a.vertex, a.arm2, t)))
            .collect();

        let mut adjusted: BTreeSet<EntityId> = BTreeSet::new();

        for pass in 0..self.params.max_passes {
            let mut changed = false;

            for &(start, end, length) in &lengths {
                let Some(mover) = pick(&[end, start]) else {
                    continue;
                };
                if let Some(moved) = self.fix_length(store, start, end, length, mover) {
                    self.resolve_from(store, &[moved])?;
                    adjusted.insert(moved);
                    changed = true;
                }
            }

            for &(arm1, vertex, arm2, target) in &angles {
                let Some(mover) = pick(&[arm2, arm1]) else {
                    continue;
                };
                if let Some(moved) = self.fix_angle(store, arm1, vertex, arm2, target, mover) {
                    self.resolve_from(store, &[moved])?;
                    adjusted.insert(moved);
                    changed = true;
                }
            }

            if !changed {
                tracing::debug!("Constraint enforcement converged after {} passes", pass);
                break;
            }
        }

        adjusted.remove(&dragged);
        Ok(adjusted.into_iter().collect())
    }
}
