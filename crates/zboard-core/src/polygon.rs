//! 多边形自动检测
//!
//! 线段图中每条边与其两端点之间（不经过该边）的最短路径构成一个最小环。
//! 顶点集合相同的环视为同一多边形；重新检测时沿用原有多边形的名称和填充属性。

use crate::entity::{EntityId, Polygon, PolygonSource};
use crate::error::BoardResult;
use crate::store::EntityStore;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// 邻接表（按ID排序，保证检测结果确定）
fn adjacency(store: &EntityStore) -> BTreeMap<EntityId, BTreeSet<EntityId>> {
    let mut graph: BTreeMap<EntityId, BTreeSet<EntityId>> = BTreeMap::new();
    for segment in store.segments() {
        graph.entry(segment.start).or_default().insert(segment.end);
        graph.entry(segment.end).or_default().insert(segment.start);
    }
    graph
}

/// 不经过边 from-to 的最短路径（含两端点）
fn shortest_detour(
    graph: &BTreeMap<EntityId, BTreeSet<EntityId>>,
    from: EntityId,
    to: EntityId,
) -> Option<Vec<EntityId>> {
    let mut previous: HashMap<EntityId, EntityId> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    previous.insert(from, from);

    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = graph.get(&current) else {
            continue;
        };
        for &next in neighbors {
            if current == from && next == to {
                continue;
            }
            if previous.contains_key(&next) {
                continue;
            }
            previous.insert(next, current);
            if next == to {
                let mut path = vec![to];
                let mut cursor = to;
                while cursor != from {
                    cursor = previous[&cursor];
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}

/// 检测线段构成的所有最小环，顶点按环路顺序排列
pub fn detect_cycles(store: &EntityStore) -> Vec<Vec<EntityId>> {
    let graph = adjacency(store);
    let mut seen: BTreeSet<Vec<EntityId>> = BTreeSet::new();
    let mut cycles = Vec::new();

    for segment in store.segments() {
        let Some(path) = shortest_detour(&graph, segment.start, segment.end) else {
            continue;
        };
        if path.len() < 3 {
            continue;
        }
        let mut key = path.clone();
        key.sort();
        if seen.insert(key) {
            cycles.push(path);
        }
    }
    cycles
}

/// 重新检测自动多边形，返回当前所有自动多边形的ID
///
/// 已被手动多边形覆盖的顶点集合不再重复生成。
pub fn refresh_polygons(store: &mut EntityStore) -> BoardResult<Vec<EntityId>> {
    let mut manual: BTreeSet<Vec<EntityId>> = BTreeSet::new();
    let mut previous: HashMap<Vec<EntityId>, Polygon> = HashMap::new();
    for polygon in store.polygons() {
        match polygon.source {
            PolygonSource::Manual => {
                manual.insert(polygon.vertex_key());
            }
            PolygonSource::Auto => {
                previous.insert(polygon.vertex_key(), polygon.clone());
            }
        }
    }

    let detected: Vec<Polygon> = detect_cycles(store)
        .into_iter()
        .filter_map(|vertices| {
            let mut key = vertices.clone();
            key.sort();
            if manual.contains(&key) {
                return None;
            }
            let polygon = match previous.remove(&key) {
                Some(old) => Polygon {
                    vertices,
                    ..old
                },
                None => {
                    let label: String = vertices.iter().map(|&v| store.name_of(v)).collect();
                    Polygon::new(format!("poly_{label}"), vertices, PolygonSource::Auto)
                }
            };
            Some(polygon)
        })
        .collect();

    let count = detected.len();
    let ids = store.replace_auto_polygons(detected)?;
    tracing::debug!("Detected {} polygons", count);
    Ok(ids)
}
