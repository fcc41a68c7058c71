//! ZBoard 核心引擎
//!
//! 交互式几何画板的无界面内核：点、线段、角、多边形的存储，
//! 派生点与长度、角度约束的求解，JSON 绘图指令的解释执行，
//! 点动画调度，以及函数图像与测量。
//!
//! # 架构设计
//!
//! - `EntityStore`: 按 ID 与名称索引的实体存储
//! - `Resolver`: 按依赖顺序重算派生点，执行长度/角度约束
//! - `Interpreter`: 原子地执行一批 `Instruction`
//! - `AnimationScheduler`: 固定帧率的点动画
//! - `BoardSession`: 独占画板的异步命令循环
//!
//! # 示例
//!
//! ```rust
//! use zboard_core::prelude::*;
//!
//! let mut board = Board::default();
//! board
//!     .apply_json(r#"[
//!         {"type": "point", "name": "A", "x": 0, "y": 0},
//!         {"type": "point", "name": "B", "x": 4, "y": 0},
//!         {"type": "line", "name": "AB", "start_point": "A", "end_point": "B"},
//!         {"type": "midpoint", "point_name": "M", "line_name": "AB"}
//!     ]"#)
//!     .unwrap();
//!
//! board.move_point("B", Point2::new(8.0, 0.0)).unwrap();
//! assert_eq!(board.store().point_by_name("M").unwrap().position, Point2::new(4.0, 0.0));
//! ```

pub mod animation;
pub mod board;
pub mod check;
pub mod config;
pub mod constraint;
pub mod entity;
pub mod error;
pub mod expr;
pub mod function;
pub mod geometry;
pub mod instruction;
pub mod interpreter;
pub mod math;
pub mod measure;
pub mod polygon;
pub mod properties;
pub mod resolver;
pub mod session;
pub mod store;
pub mod view;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::animation::{
        AnimationConfig, AnimationScheduler, AnimationState, MotionPath, PlaybackMode, Rotation,
        StepReport,
    };
    pub use crate::board::Board;
    pub use crate::check::{CheckReport, CheckStatistics, Issue};
    pub use crate::config::BoardConfig;
    pub use crate::constraint::Derivation;
    pub use crate::entity::{Angle, EntityId, EntityRef, Point, Polygon, PolygonSource, Segment};
    pub use crate::error::{BoardError, BoardResult};
    pub use crate::function::{Extrema, FunctionPlot, ValueRange};
    pub use crate::geometry::{Circle, Line, Polyline};
    pub use crate::instruction::{parse_assistant_reply, parse_instructions, Instruction};
    pub use crate::interpreter::{BatchReport, Interpreter};
    pub use crate::math::{BoundingBox2, Point2, Vector2};
    pub use crate::measure::{CanvasSummary, Measurement, MeasurementValue, Relation};
    pub use crate::properties::Color;
    pub use crate::resolver::{ResolveReport, Resolver};
    pub use crate::session::{Assistant, BoardEvent, BoardSession, SessionHandle};
    pub use crate::store::EntityStore;
    pub use crate::view::ViewState;
}
