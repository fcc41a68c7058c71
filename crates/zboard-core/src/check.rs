//! 画布一致性检查
//!
//! 找出重复的点与线段、过短的线段、孤立的自由点，以及所在线段已被删除的交点，
//! 并可一次性清理其中可以安全删除的部分。

use crate::constraint::Derivation;
use crate::entity::EntityId;
use crate::error::BoardResult;
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// 坐标比较精度
pub const POSITION_TOLERANCE: f64 = 0.1;

/// 短于此长度的线段视为退化
pub const MIN_SEGMENT_LENGTH: f64 = 1.0;

/// 检查发现的问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// 与先创建的自由点坐标重合
    DuplicatePoint { point: EntityId, original: EntityId },
    /// 与先创建的线段端点位置相同
    DuplicateSegment { segment: EntityId, original: EntityId },
    DegenerateSegment { segment: EntityId, length: f64 },
    /// 未被任何线段、角、多边形或派生点引用的非固定自由点
    OrphanedPoint { point: EntityId },
    /// 定义交点的线段已不存在
    OrphanedIntersection { point: EntityId },
}

impl Issue {
    /// 出问题的实体
    pub fn entity(&self) -> EntityId {
        match *self {
            Issue::DuplicatePoint { point, .. }
            | Issue::OrphanedPoint { point }
            | Issue::OrphanedIntersection { point } => point,
            Issue::DuplicateSegment { segment, .. } | Issue::DegenerateSegment { segment, .. } => segment,
        }
    }

    pub fn describe(&self, store: &EntityStore) -> String {
        let name = |id| store.name_of(id);
        match *self {
            Issue::DuplicatePoint { point, original } => {
                format!("point {} coincides with {}", name(point), name(original))
            }
            Issue::DuplicateSegment { segment, original } => {
                format!("segment {} duplicates {}", name(segment), name(original))
            }
            Issue::DegenerateSegment { segment, length } => {
                format!("segment {} is too short ({length:.3})", name(segment))
            }
            Issue::OrphanedPoint { point } => format!("point {} is not used by anything", name(point)),
            Issue::OrphanedIntersection { point } => {
                format!("intersection {} has lost its segments", name(point))
            }
        }
    }
}

/// 画布统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStatistics {
    pub total_objects: usize,
    pub points: usize,
    pub segments: usize,
    pub angles: usize,
    pub polygons: usize,
    pub intersections: usize,
    pub issues: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub issues: Vec<Issue>,
    pub statistics: CheckStatistics,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

fn position_key(store: &EntityStore, id: EntityId) -> Option<(i64, i64)> {
    let p = store.position(id)?;
    Some((
        (p.x / POSITION_TOLERANCE).round() as i64,
        (p.y / POSITION_TOLERANCE).round() as i64,
    ))
}

/// 被其他实体引用的点
fn referenced_points(store: &EntityStore) -> BTreeSet<EntityId> {
    let mut used = BTreeSet::new();
    for segment in store.segments() {
        used.insert(segment.start);
        used.insert(segment.end);
    }
    for angle in store.angles() {
        used.extend(angle.points());
    }
    for polygon in store.polygons() {
        used.extend(polygon.vertices.iter().copied());
    }
    for point in store.points() {
        if let Some(derivation) = &point.derivation {
            used.extend(derivation.operands());
        }
    }
    used
}

/// 检查整个画布
pub fn check(store: &EntityStore) -> CheckReport {
    let mut issues = Vec::new();
    let used = referenced_points(store);

    // 派生点与其他点重合是常态，只比较自由点
    let mut seen_points: HashMap<(i64, i64), EntityId> = HashMap::new();
    for point in store.points().filter(|p| !p.is_derived()) {
        let Some(key) = position_key(store, point.id) else {
            continue;
        };
        match seen_points.get(&key) {
            Some(&original) => issues.push(Issue::DuplicatePoint {
                point: point.id,
                original,
            }),
            None => {
                seen_points.insert(key, point.id);
            }
        }
    }

    let mut seen_segments: HashMap<[(i64, i64); 2], EntityId> = HashMap::new();
    for segment in store.segments() {
        let (Some(start), Some(end)) = (store.position(segment.start), store.position(segment.end)) else {
            continue;
        };
        let length = (end - start).norm();
        if length < MIN_SEGMENT_LENGTH {
            issues.push(Issue::DegenerateSegment {
                segment: segment.id,
                length,
            });
        }

        let (Some(a), Some(b)) = (position_key(store, segment.start), position_key(store, segment.end)) else {
            continue;
        };
        let key = if a <= b { [a, b] } else { [b, a] };
        match seen_segments.get(&key) {
            Some(&original) => issues.push(Issue::DuplicateSegment {
                segment: segment.id,
                original,
            }),
            None => {
                seen_segments.insert(key, segment.id);
            }
        }
    }

    for point in store.points() {
        match &point.derivation {
            None if !point.fixed && !used.contains(&point.id) => {
                issues.push(Issue::OrphanedPoint { point: point.id });
            }
            Some(Derivation::Intersection { a, b, c, d }) => {
                if store.segment_between(*a, *b).is_none() || store.segment_between(*c, *d).is_none() {
                    issues.push(Issue::OrphanedIntersection { point: point.id });
                }
            }
            _ => {}
        }
    }

    let statistics = CheckStatistics {
        total_objects: store.len(),
        points: store.point_count(),
        segments: store.segment_count(),
        angles: store.angle_count(),
        polygons: store.polygon_count(),
        intersections: store
            .points()
            .filter(|p| matches!(p.derivation, Some(Derivation::Intersection { .. })))
            .count(),
        issues: issues.len(),
    };
    CheckReport { issues, statistics }
}

/// 删除可以安全清理的问题实体，返回被删除的全部 ID（含级联）
///
/// 删除重复线段、退化线段、失去线段的交点，以及未被引用的重复点。
/// 孤立的自由点只报告不删除。
pub fn repair(store: &mut EntityStore) -> BoardResult<Vec<EntityId>> {
    let report = check(store);
    let used = referenced_points(store);
    let targets: Vec<EntityId> = report
        .issues
        .iter()
        .filter_map(|issue| match *issue {
            Issue::DuplicatePoint { point, .. } if !used.contains(&point) => Some(point),
            Issue::DuplicateSegment { segment, .. } | Issue::DegenerateSegment { segment, .. } => Some(segment),
            Issue::OrphanedIntersection { point } => Some(point),
            _ => None,
        })
        .collect();

    let mut removed = Vec::new();
    for id in targets {
        // 可能已被前面的级联删除
        if store.get(id).is_some() {
            removed.extend(store.remove(id)?);
        }
    }
    if !removed.is_empty() {
        tracing::info!("Repaired canvas: removed {} entities", removed.len());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Point, Segment};
    use crate::math::Point2;

    fn free(store: &mut EntityStore, name: &str, x: f64, y: f64) -> EntityId {
        store.add_point(Point::free(name, Point2::new(x, y))).unwrap()
    }

    #[test]
    fn test_clean_canvas() {
        let mut store = EntityStore::new();
        let a = free(&mut store, "A", 0.0, 0.0);
        let b = free(&mut store, "B", 10.0, 0.0);
        store.add_segment(Segment::new("AB", a, b)).unwrap();
        store
            .add_point(Point::derived("M", Derivation::Midpoint { a, b }))
            .unwrap();

        let report = check(&store);
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.statistics.total_objects, 4);
        assert_eq!(report.statistics.points, 3);
        assert_eq!(report.statistics.issues, 0);
    }

    #[test]
    fn test_duplicates_and_degenerate() {
        let mut store = EntityStore::new();
        let a = free(&mut store, "A", 0.0, 0.0);
        let b = free(&mut store, "B", 10.0, 0.0);
        // 0.1 精度内重合
        let a2 = free(&mut store, "A2", 0.02, -0.01);
        let c = free(&mut store, "C", 10.5, 0.0);
        let ab = store.add_segment(Segment::new("AB", a, b)).unwrap();
        let ba = store.add_segment(Segment::new("BA", b, a2)).unwrap();
        let bc = store.add_segment(Segment::new("BC", b, c)).unwrap();

        let report = check(&store);
        assert!(report
            .issues
            .contains(&Issue::DuplicatePoint { point: a2, original: a }));
        assert!(report
            .issues
            .contains(&Issue::DuplicateSegment { segment: ba, original: ab }));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, Issue::DegenerateSegment { segment, .. } if *segment == bc)));
        assert_eq!(report.statistics.issues, report.issues.len());
        assert!(report.issues[0].describe(&store).contains("A2"));

        // A2 仍被 BA 引用，删除 BA 后才会清理
        let removed = repair(&mut store).unwrap();
        assert!(removed.contains(&ba));
        assert!(removed.contains(&bc));
        assert!(store.point(a2).is_some());
        assert!(store.segment(ab).is_some());

        let removed = repair(&mut store).unwrap();
        assert_eq!(removed, vec![a2]);
    }

    #[test]
    fn test_orphans() {
        let mut store = EntityStore::new();
        let a = free(&mut store, "A", 0.0, 0.0);
        let b = free(&mut store, "B", 10.0, 10.0);
        let c = free(&mut store, "C", 0.0, 10.0);
        let d = free(&mut store, "D", 10.0, 0.0);
        let lonely = free(&mut store, "E", 50.0, 50.0);
        let anchor = store
            .add_point(Point::free("F", Point2::new(-50.0, 0.0)).with_fixed(true))
            .unwrap();
        store.add_segment(Segment::new("AB", a, b)).unwrap();
        let cd = store.add_segment(Segment::new("CD", c, d)).unwrap();
        let x = store
            .add_point(Point::derived("X", Derivation::Intersection { a, b, c, d }))
            .unwrap();

        let report = check(&store);
        assert_eq!(report.issues, vec![Issue::OrphanedPoint { point: lonely }]);
        assert_eq!(report.statistics.intersections, 1);
        assert!(!report.issues.iter().any(|i| i.entity() == anchor));

        store.remove(cd).unwrap();
        let report = check(&store);
        assert!(report.issues.contains(&Issue::OrphanedIntersection { point: x }));

        let removed = repair(&mut store).unwrap();
        assert_eq!(removed, vec![x]);
        // 孤立自由点只报告；C、D 随交点删除也不再被引用
        assert!(store.point(lonely).is_some());
        let orphaned: Vec<EntityId> = check(&store).issues.iter().map(Issue::entity).collect();
        assert_eq!(orphaned, vec![c, d, lonely]);
    }
}
