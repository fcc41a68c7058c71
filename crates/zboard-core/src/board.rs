//! 画板
//!
//! 组合实体存储、视图、函数图像与求解器，对外提供按名称操作的接口。

use crate::animation::{AnimationConfig, AnimationScheduler};
use crate::check::{self, CheckReport};
use crate::config::BoardConfig;
use crate::entity::EntityId;
use crate::error::{BoardError, BoardResult};
use crate::function::FunctionPlot;
use crate::instruction::{parse_assistant_reply, parse_instructions, Instruction};
use crate::interpreter::{BatchReport, Interpreter};
use crate::math::{BoundingBox2, Point2};
use crate::measure::{
    describe_canvas, find_relations, suggestions, CanvasSummary, Measurement, MeasurementValue, Relation,
};
use crate::polygon::refresh_polygons;
use crate::resolver::{ResolveReport, Resolver};
use crate::store::EntityStore;
use crate::view::ViewState;

/// 画板
#[derive(Debug, Clone)]
pub struct Board {
    store: EntityStore,
    view: ViewState,
    functions: Vec<FunctionPlot>,
    resolver: Resolver,
    interpreter: Interpreter,
    config: BoardConfig,
}

impl Board {
    pub fn new(config: BoardConfig) -> Self {
        let resolver = Resolver::default();
        Self {
            store: EntityStore::new(),
            view: ViewState::new(config.canvas_width, config.canvas_height),
            functions: Vec::new(),
            interpreter: Interpreter::new(resolver.clone()),
            resolver,
            config,
        }
    }

    /// 从已保存的数据恢复
    ///
    /// 依赖图有环时拒绝；派生点位置重新计算。
    pub fn from_parts(
        config: BoardConfig,
        mut store: EntityStore,
        view: ViewState,
        functions: Vec<FunctionPlot>,
    ) -> BoardResult<Self> {
        let resolver = Resolver::default();
        resolver.resolve_all(&mut store)?;
        Ok(Self {
            store,
            view,
            functions,
            interpreter: Interpreter::new(resolver.clone()),
            resolver,
            config,
        })
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn functions(&self) -> &[FunctionPlot] {
        &self.functions
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    // === 指令 ===

    pub fn apply(&mut self, instructions: &[Instruction]) -> BoardResult<BatchReport> {
        self.interpreter.apply(&mut self.store, instructions)
    }

    /// 执行 JSON 指令（数组或单个对象）
    pub fn apply_json(&mut self, json: &str) -> BoardResult<BatchReport> {
        let instructions = parse_instructions(json)?;
        self.apply(&instructions)
    }

    /// 执行助手回复中提取出的指令
    pub fn apply_reply(&mut self, reply: &str) -> BoardResult<BatchReport> {
        let instructions = parse_assistant_reply(reply);
        if instructions.is_empty() {
            return Err(BoardError::MalformedInstructions(
                "no drawing instructions found in reply".into(),
            ));
        }
        self.apply(&instructions)
    }

    // === 编辑 ===

    fn require(&self, name: &str) -> BoardResult<EntityId> {
        self.store
            .id_of(name)
            .ok_or_else(|| BoardError::UnknownName(name.to_string()))
    }

    /// 拖动命名点
    pub fn move_point(&mut self, name: &str, position: Point2) -> BoardResult<ResolveReport> {
        let id = self.require(name)?;
        self.resolver.move_point(&mut self.store, id, position)
    }

    /// 删除命名实体及其依赖
    pub fn remove(&mut self, name: &str) -> BoardResult<Vec<EntityId>> {
        let id = self.require(name)?;
        let removed = self.store.remove(id)?;
        refresh_polygons(&mut self.store)?;
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.functions.clear();
    }

    // === 函数图像 ===

    /// 添加函数图像，返回其名称；范围缺省时取配置值
    pub fn add_function(&mut self, expression: &str, range: Option<(f64, f64)>) -> BoardResult<String> {
        let (x_min, x_max) = range.unwrap_or((self.config.plot.x_min, self.config.plot.x_max));
        let mut plot = FunctionPlot::new(expression, x_min, x_max)?;
        plot.name = format!("f{}", self.functions.len() + 1);
        let name = plot.name.clone();
        tracing::info!("Added function {}: y = {}", name, expression);
        self.functions.push(plot);
        Ok(name)
    }

    pub fn remove_function(&mut self, name: &str) -> BoardResult<FunctionPlot> {
        let index = self
            .functions
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| BoardError::UnknownName(name.to_string()))?;
        Ok(self.functions.remove(index))
    }

    pub fn function(&self, name: &str) -> Option<&FunctionPlot> {
        self.functions.iter().find(|f| f.name == name)
    }

    // === 测量与摘要 ===

    /// 所有线段长度与多边形面积
    pub fn measurements(&self) -> Vec<MeasurementValue> {
        Measurement::all_in(&self.store)
            .iter()
            .filter_map(|m| m.measure(&self.store).ok())
            .collect()
    }

    pub fn summary(&self) -> CanvasSummary {
        CanvasSummary::of(&self.store)
    }

    /// 供助手使用的画布描述
    pub fn describe(&self) -> String {
        describe_canvas(&self.store)
    }

    /// 三角形与平行、垂直线段
    pub fn relations(&self) -> Vec<Relation> {
        find_relations(&self.store)
    }

    pub fn suggestions(&self) -> Vec<String> {
        suggestions(&self.store)
    }

    // === 检查 ===

    pub fn check(&self) -> CheckReport {
        check::check(&self.store)
    }

    /// 清理重复、退化与失效的实体
    pub fn repair(&mut self) -> BoardResult<Vec<EntityId>> {
        let removed = check::repair(&mut self.store)?;
        if !removed.is_empty() {
            refresh_polygons(&mut self.store)?;
        }
        Ok(removed)
    }

    /// 所有点的包围盒
    pub fn bounds(&self) -> Option<BoundingBox2> {
        BoundingBox2::from_points(self.store.points().map(|p| p.position))
    }

    /// 调整视图使所有点可见
    pub fn fit_view(&mut self, margin: f64) {
        if let Some(bounds) = self.bounds() {
            self.view.fit(&bounds, margin);
        }
    }

    // === 动画 ===

    /// 按配置的速度范围创建动画调度器
    pub fn animation(&self, config: AnimationConfig) -> BoardResult<AnimationScheduler> {
        let settings = &self.config.animation;
        Ok(AnimationScheduler::new(config)?
            .with_resolver(self.resolver.clone())
            .with_speed_range(settings.min_speed, settings.max_speed))
    }

    /// 以配置中的默认帧率、时长与模式构造动画配置
    pub fn animation_config(
        &self,
        moving: EntityId,
        path: crate::animation::MotionPath,
    ) -> AnimationConfig {
        let settings = &self.config.animation;
        AnimationConfig::new(moving, path)
            .with_fps(settings.fps)
            .with_duration(settings.default_duration_ms)
            .with_mode(settings.default_mode)
    }

    /// 直接访问存储，供动画调度器推进
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new(BoardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationState, MotionPath};
    use approx::assert_relative_eq;

    const TRIANGLE: &str = r#"[
        {"type": "point", "name": "A", "x": 0, "y": 0},
        {"type": "point", "name": "B", "x": 100, "y": 0},
        {"type": "point", "name": "C", "x": 0, "y": 100},
        {"type": "triangle", "name": "T", "points": ["A", "B", "C"]},
        {"type": "midpoint", "point_name": "M", "line_name": "T_边1"}
    ]"#;

    #[test]
    fn test_apply_and_measure() {
        let mut board = Board::default();
        board.apply_json(TRIANGLE).unwrap();
        let summary = board.summary();
        assert_eq!(summary.points, 4);
        assert_eq!(summary.derived_points, 1);
        assert!(board
            .measurements()
            .iter()
            .any(|m| matches!(m.measurement, Measurement::PolygonArea(_)) && (m.value - 5000.0).abs() < 1e-9));
    }

    #[test]
    fn test_move_updates_midpoint() {
        let mut board = Board::default();
        board.apply_json(TRIANGLE).unwrap();
        board.move_point("B", Point2::new(200.0, 0.0)).unwrap();
        assert_relative_eq!(
            board.store().point_by_name("M").unwrap().position,
            Point2::new(100.0, 0.0)
        );
        assert!(matches!(
            board.move_point("M", Point2::new(1.0, 1.0)),
            Err(BoardError::NotMovable { .. })
        ));
        assert!(matches!(
            board.move_point("Z", Point2::new(1.0, 1.0)),
            Err(BoardError::UnknownName(_))
        ));
    }

    #[test]
    fn test_remove_cascades() {
        let mut board = Board::default();
        board.apply_json(TRIANGLE).unwrap();
        board.remove("A").unwrap();
        assert!(board.store().point_by_name("M").is_none());
        assert_eq!(board.store().polygon_count(), 0);
    }

    #[test]
    fn test_check_and_repair() {
        let mut board = Board::default();
        board.apply_json(TRIANGLE).unwrap();
        assert!(board.check().is_clean());
        assert_eq!(board.relations().len(), 2);

        board
            .apply_json(r#"[
                {"type": "point", "name": "D", "x": 0.04, "y": 0},
                {"type": "line", "name": "DB", "start_point": "D", "end_point": "B"}
            ]"#)
            .unwrap();
        let report = board.check();
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.statistics.segments, 4);

        let db = board.store().id_of("DB").unwrap();
        assert_eq!(board.repair().unwrap(), vec![db]);
        // D 不再被引用，第二次清理删除
        let d = board.store().id_of("D").unwrap();
        assert_eq!(board.repair().unwrap(), vec![d]);
        assert!(board.check().is_clean());
        assert_eq!(board.store().polygon_count(), 1);
    }

    #[test]
    fn test_apply_reply_needs_instructions() {
        let mut board = Board::default();
        assert!(matches!(
            board.apply_reply("nothing to draw here"),
            Err(BoardError::MalformedInstructions(_))
        ));
        board.apply_reply("点A (10, 20)").unwrap();
        assert_eq!(board.store().point_count(), 1);
    }

    #[test]
    fn test_functions() {
        let mut board = Board::default();
        let name = board.add_function("x^2", None).unwrap();
        assert_eq!(board.function(&name).unwrap().range(), (-10.0, 10.0));
        assert!(board.add_function("x +", None).is_err());
        board.remove_function(&name).unwrap();
        assert!(board.functions().is_empty());
    }

    #[test]
    fn test_animation_uses_config_defaults() {
        let mut board = Board::default();
        board.apply_json(TRIANGLE).unwrap();
        let path = MotionPath::through_points(board.store(), &["B", "C"], false).unwrap();
        let a = board.store().id_of("A").unwrap();
        let config = board.animation_config(a, path);
        assert_eq!(config.fps, 20);

        let mut scheduler = board.animation(config).unwrap();
        scheduler.run_to_end(board.store_mut()).unwrap();
        assert_eq!(scheduler.state(), AnimationState::Finished);
        assert_relative_eq!(
            board.store().point_by_name("A").unwrap().position,
            Point2::new(0.0, 100.0)
        );
    }

    #[test]
    fn test_fit_view() {
        let mut board = Board::default();
        board.apply_json(TRIANGLE).unwrap();
        board.fit_view(10.0);
        let visible = board.view().visible_bounds();
        assert!(visible.contains(&Point2::new(100.0, 100.0)));
    }
}
