//! 派生约束
//!
//! 派生点的位置是其操作数点位置的纯函数。约束只保存点的 ID，
//! 求值时通过查询闭包取得当前坐标。
//!
//! 支持的关系：
//! - 中点
//! - 比例点
//! - 垂足
//! - 三点外心
//! - 两线段交点

use crate::entity::EntityId;
use crate::geometry::{Circle, Line};
use crate::math::Point2;
use serde::{Deserialize, Serialize};

/// 派生规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    /// 线段 ab 的中点
    Midpoint { a: EntityId, b: EntityId },

    /// 线段 ab 上比例为 ratio 的点（ratio 限制在 [0, 1]）
    Ratio { a: EntityId, b: EntityId, ratio: f64 },

    /// 点 source 到线段 ab 的垂足（限制在线段上）
    PerpendicularFoot {
        source: EntityId,
        a: EntityId,
        b: EntityId,
    },

    /// 经过三点的圆的圆心
    Circumcenter {
        p1: EntityId,
        p2: EntityId,
        p3: EntityId,
    },

    /// 线段 ab 与线段 cd 的交点
    Intersection {
        a: EntityId,
        b: EntityId,
        c: EntityId,
        d: EntityId,
    },
}

/// 约束类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivationType {
    Midpoint,
    Ratio,
    PerpendicularFoot,
    Circumcenter,
    Intersection,
}

impl Derivation {
    /// 创建比例点约束，比例被限制在 [0, 1]
    pub fn ratio(a: EntityId, b: EntityId, ratio: f64) -> Self {
        Derivation::Ratio {
            a,
            b,
            ratio: ratio.clamp(0.0, 1.0),
        }
    }

    pub fn derivation_type(&self) -> DerivationType {
        match self {
            Derivation::Midpoint { .. } => DerivationType::Midpoint,
            Derivation::Ratio { .. } => DerivationType::Ratio,
            Derivation::PerpendicularFoot { .. } => DerivationType::PerpendicularFoot,
            Derivation::Circumcenter { .. } => DerivationType::Circumcenter,
            Derivation::Intersection { .. } => DerivationType::Intersection,
        }
    }

    /// 操作数点（按声明顺序，可能重复）
    pub fn operands(&self) -> Vec<EntityId> {
        match *self {
            Derivation::Midpoint { a, b } | Derivation::Ratio { a, b, .. } => vec![a, b],
            Derivation::PerpendicularFoot { source, a, b } => vec![source, a, b],
            Derivation::Circumcenter { p1, p2, p3 } => vec![p1, p2, p3],
            Derivation::Intersection { a, b, c, d } => vec![a, b, c, d],
        }
    }

    /// 是否引用了该点
    pub fn depends_on(&self, id: EntityId) -> bool {
        self.operands().contains(&id)
    }

    /// 求值
    ///
    /// `lookup` 返回操作数当前坐标。缺少操作数时返回 `Err(缺失的ID)`；
    /// 关系无解（共线、平行、交点不在线段上）时返回 `Ok(None)`。
    pub fn evaluate<F>(&self, lookup: F) -> Result<Option<Point2>, EntityId>
    where
        F: Fn(EntityId) -> Option<Point2>,
    {
        let get = |id: EntityId| lookup(id).ok_or(id);

        let position = match *self {
            Derivation::Midpoint { a, b } => Some(Line::new(get(a)?, get(b)?).midpoint()),
            Derivation::Ratio { a, b, ratio } => {
                Some(Line::new(get(a)?, get(b)?).point_at(ratio.clamp(0.0, 1.0)))
            }
            Derivation::PerpendicularFoot { source, a, b } => {
                let source = get(source)?;
                Some(Line::new(get(a)?, get(b)?).foot_of(&source))
            }
            Derivation::Circumcenter { p1, p2, p3 } => {
                Circle::from_three_points(get(p1)?, get(p2)?, get(p3)?).map(|c| c.center)
            }
            Derivation::Intersection { a, b, c, d } => {
                let first = Line::new(get(a)?, get(b)?);
                let second = Line::new(get(c)?, get(d)?);
                first.intersection(&second)
            }
        };
        Ok(position)
    }

    /// 人类可读的描述，`name` 把点ID翻译成名称
    pub fn describe(&self, point: &str, name: impl Fn(EntityId) -> String) -> String {
        match *self {
            Derivation::Midpoint { a, b } => {
                format!("{point} is the midpoint of {}{}", name(a), name(b))
            }
            Derivation::Ratio { a, b, ratio } => {
                format!("{point} lies on {}{} at ratio {ratio:.2}", name(a), name(b))
            }
            Derivation::PerpendicularFoot { source, a, b } => format!(
                "{point} is the foot of the perpendicular from {} to {}{}",
                name(source),
                name(a),
                name(b)
            ),
            Derivation::Circumcenter { p1, p2, p3 } => format!(
                "{point} is the circumcenter of {}{}{}",
                name(p1),
                name(p2),
                name(p3)
            ),
            Derivation::Intersection { a, b, c, d } => format!(
                "{point} is the intersection of {}{} and {}{}",
                name(a),
                name(b),
                name(c),
                name(d)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(points: &HashMap<EntityId, Point2>) -> impl Fn(EntityId) -> Option<Point2> + '_ {
        move |id| points.get(&id).copied()
    }

    #[test]
    fn test_ratio_is_clamped() {
        let d = Derivation::ratio(EntityId(1), EntityId(2), 1.5);
        assert!(matches!(d, Derivation::Ratio { ratio, .. } if ratio == 1.0));
    }

    #[test]
    fn test_evaluate_midpoint_and_foot() {
        let points = HashMap::from([
            (EntityId(1), Point2::new(0.0, 0.0)),
            (EntityId(2), Point2::new(8.0, 0.0)),
            (EntityId(3), Point2::new(2.0, 5.0)),
        ]);

        let mid = Derivation::Midpoint {
            a: EntityId(1),
            b: EntityId(2),
        };
        assert_eq!(mid.evaluate(lookup(&points)), Ok(Some(Point2::new(4.0, 0.0))));

        let foot = Derivation::PerpendicularFoot {
            source: EntityId(3),
            a: EntityId(1),
            b: EntityId(2),
        };
        assert_eq!(foot.evaluate(lookup(&points)), Ok(Some(Point2::new(2.0, 0.0))));
    }

    #[test]
    fn test_evaluate_undefined_and_missing() {
        let points = HashMap::from([
            (EntityId(1), Point2::new(0.0, 0.0)),
            (EntityId(2), Point2::new(1.0, 1.0)),
            (EntityId(3), Point2::new(2.0, 2.0)),
        ]);

        let collinear = Derivation::Circumcenter {
            p1: EntityId(1),
            p2: EntityId(2),
            p3: EntityId(3),
        };
        assert_eq!(collinear.evaluate(lookup(&points)), Ok(None));

        let missing = Derivation::Midpoint {
            a: EntityId(1),
            b: EntityId(9),
        };
        assert_eq!(missing.evaluate(lookup(&points)), Err(EntityId(9)));
    }

    #[test]
    fn test_describe() {
        let d = Derivation::Midpoint {
            a: EntityId(1),
            b: EntityId(2),
        };
        let text = d.describe("M", |id| if id == EntityId(1) { "A".into() } else { "B".into() });
        assert_eq!(text, "M is the midpoint of AB");
    }
}
