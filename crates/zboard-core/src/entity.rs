//! 画板实体定义
//!
//! 四类实体：点、线段、角、多边形。线段、角、多边形只通过 [`EntityId`]
//! 引用点，坐标始终以点为准。

use crate::constraint::Derivation;
use crate::math::Point2;
use crate::properties::Color;
use serde::{Deserialize, Serialize};

/// 实体ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn null() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 点的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// 自由点，由用户直接设定位置
    Free,
    /// 派生点，位置由约束计算
    Derived,
}

/// 点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: EntityId,
    pub name: String,
    pub position: Point2,
    pub color: Color,
    /// 显示半径
    pub radius: f64,
    /// 固定点不可被拖动，也不会被约束调整
    pub fixed: bool,
    pub visible: bool,
    /// 派生规则，自由点为 None
    pub derivation: Option<Derivation>,
    /// 派生规则当前无解（如三点共线的外心）
    #[serde(default)]
    pub undefined: bool,
}

impl Point {
    pub const DEFAULT_RADIUS: f64 = 5.0;

    /// 创建自由点
    pub fn free(name: impl Into<String>, position: Point2) -> Self {
        Self {
            id: EntityId::null(),
            name: name.into(),
            position,
            color: Color::BLACK,
            radius: Self::DEFAULT_RADIUS,
            fixed: false,
            visible: true,
            derivation: None,
            undefined: false,
        }
    }

    /// 创建派生点，位置在加入存储时计算
    pub fn derived(name: impl Into<String>, derivation: Derivation) -> Self {
        Self {
            color: Color::RED,
            derivation: Some(derivation),
            ..Self::free(name, Point2::origin())
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn kind(&self) -> PointKind {
        if self.derivation.is_some() {
            PointKind::Derived
        } else {
            PointKind::Free
        }
    }

    pub fn is_derived(&self) -> bool {
        self.derivation.is_some()
    }
}

/// 线段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: EntityId,
    pub name: String,
    pub start: EntityId,
    pub end: EntityId,
    pub color: Color,
    pub width: f64,
    /// 固定长度约束
    pub fixed_length: Option<f64>,
}

impl Segment {
    pub const DEFAULT_WIDTH: f64 = 2.0;

    pub fn new(name: impl Into<String>, start: EntityId, end: EntityId) -> Self {
        Self {
            id: EntityId::null(),
            name: name.into(),
            start,
            end,
            color: Color::BLACK,
            width: Self::DEFAULT_WIDTH,
            fixed_length: None,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_fixed_length(mut self, length: f64) -> Self {
        self.fixed_length = Some(length);
        self
    }

    /// 是否以该点为端点
    pub fn touches(&self, point: EntityId) -> bool {
        self.start == point || self.end == point
    }

    /// 是否连接同样两个点（不计方向）
    pub fn connects(&self, a: EntityId, b: EntityId) -> bool {
        (self.start == a && self.end == b) || (self.start == b && self.end == a)
    }
}

/// 角，arm1-vertex-arm2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Angle {
    pub id: EntityId,
    pub name: String,
    pub arm1: EntityId,
    pub vertex: EntityId,
    pub arm2: EntityId,
    pub color: Color,
    /// 固定角度（度）
    pub target: Option<f64>,
}

impl Angle {
    pub fn new(name: impl Into<String>, arm1: EntityId, vertex: EntityId, arm2: EntityId) -> Self {
        Self {
            id: EntityId::null(),
            name: name.into(),
            arm1,
            vertex,
            arm2,
            color: Color::BLUE,
            target: None,
        }
    }

    pub fn with_target(mut self, degrees: f64) -> Self {
        self.target = Some(degrees);
        self
    }

    pub fn points(&self) -> [EntityId; 3] {
        [self.arm1, self.vertex, self.arm2]
    }
}

/// 多边形来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonSource {
    /// 由线段闭环自动检测
    Auto,
    /// 由指令显式创建
    Manual,
}

/// 多边形
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub id: EntityId,
    pub name: String,
    /// 顶点按环路顺序排列
    pub vertices: Vec<EntityId>,
    pub source: PolygonSource,
    pub fill_color: Color,
    pub show_fill: bool,
}

impl Polygon {
    pub fn new(name: impl Into<String>, vertices: Vec<EntityId>, source: PolygonSource) -> Self {
        Self {
            id: EntityId::null(),
            name: name.into(),
            vertices,
            source,
            fill_color: Color::POLYGON_FILL,
            show_fill: false,
        }
    }

    /// 顶点集合的规范键（排序后的ID），用于判断是否同一多边形
    pub fn vertex_key(&self) -> Vec<EntityId> {
        let mut key = self.vertices.clone();
        key.sort();
        key
    }
}

/// 实体引用，用于按名称查询
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    Point(&'a Point),
    Segment(&'a Segment),
    Angle(&'a Angle),
    Polygon(&'a Polygon),
}

impl EntityRef<'_> {
    pub fn id(&self) -> EntityId {
        match self {
            EntityRef::Point(p) => p.id,
            EntityRef::Segment(s) => s.id,
            EntityRef::Angle(a) => a.id,
            EntityRef::Polygon(p) => p.id,
        }
    }
}
