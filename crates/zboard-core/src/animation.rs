//! 点动画
//!
//! 让一个或多个自由点沿路径运动。固定帧率，`total_steps = duration * fps`，
//! 第 `step` 帧的进度为 `step / (total_steps - 1)`。每一帧通过求解器移动点，
//! 派生点与长度、角度约束随之更新。

use crate::entity::EntityId;
use crate::error::{BoardError, BoardResult};
use crate::function::FunctionPlot;
use crate::geometry::Polyline;
use crate::math::Point2;
use crate::measure::{Measurement, MeasurementValue};
use crate::resolver::Resolver;
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::str::FromStr;
use std::time::Duration;

/// 单个行程的帧数上限
pub const MAX_STEPS: usize = 1_000_000;

/// 播放模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// 播放一次后结束
    #[default]
    Single,
    /// 到达终点后从头开始
    Loop,
    /// 来回播放
    #[serde(alias = "pingpong")]
    PingPong,
}

impl FromStr for PlaybackMode {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" | "once" => Ok(Self::Single),
            "loop" => Ok(Self::Loop),
            "pingpong" | "ping_pong" | "ping-pong" => Ok(Self::PingPong),
            other => Err(BoardError::InvalidParameter(format!(
                "unknown playback mode '{other}'"
            ))),
        }
    }
}

/// 旋转方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl Rotation {
    fn sign(self) -> f64 {
        match self {
            Rotation::CounterClockwise => 1.0,
            Rotation::Clockwise => -1.0,
        }
    }
}

/// 运动路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionPath {
    /// 按弧长参数化的折线
    Polyline(Polyline),
    /// 圆周，进度 1 对应一整圈
    Circle {
        center: Point2,
        radius: f64,
        /// 起始角（弧度）
        start_angle: f64,
        #[serde(default)]
        rotation: Rotation,
    },
    /// 函数图像，x 从 `x_min` 匀速移动到 `x_max`
    Function { plot: FunctionPlot },
}

impl MotionPath {
    /// 依次经过若干命名点的折线
    pub fn through_points(store: &EntityStore, names: &[&str], closed: bool) -> BoardResult<Self> {
        let points = names
            .iter()
            .map(|name| {
                store
                    .point_by_name(name)
                    .map(|p| p.position)
                    .ok_or_else(|| BoardError::UnknownName((*name).to_string()))
            })
            .collect::<BoardResult<Vec<_>>>()?;
        if points.len() < 2 {
            return Err(BoardError::Animation(
                "a path needs at least two points".into(),
            ));
        }
        Ok(MotionPath::Polyline(Polyline::new(points, closed)))
    }

    /// 绕 `center` 旋转，半径与起始角取自 `moving` 当前位置
    pub fn orbit(
        store: &EntityStore,
        center: EntityId,
        moving: EntityId,
        rotation: Rotation,
    ) -> BoardResult<Self> {
        let c = store.position(center).ok_or(BoardError::EntityNotFound(center))?;
        let p = store.position(moving).ok_or(BoardError::EntityNotFound(moving))?;
        let offset = p - c;
        let radius = offset.norm();
        if radius < crate::math::EPSILON {
            return Err(BoardError::Animation(
                "moving point coincides with the orbit center".into(),
            ));
        }
        Ok(MotionPath::Circle {
            center: c,
            radius,
            start_angle: offset.y.atan2(offset.x),
            rotation,
        })
    }

    /// 进度对应的位置，函数在该处无定义时返回 None
    pub fn position_at(&self, progress: f64) -> Option<Point2> {
        let t = progress.clamp(0.0, 1.0);
        match self {
            MotionPath::Polyline(polyline) => polyline.point_at_progress(t),
            MotionPath::Circle {
                center,
                radius,
                start_angle,
                rotation,
            } => {
                let angle = start_angle + rotation.sign() * TAU * t;
                Some(Point2::new(
                    center.x + radius * angle.cos(),
                    center.y + radius * angle.sin(),
                ))
            }
            MotionPath::Function { plot } => {
                let (x_min, x_max) = plot.range();
                let x = x_min + (x_max - x_min) * t;
                let y = plot.evaluate(x);
                y.is_finite().then(|| Point2::new(x, y))
            }
        }
    }
}

/// 动画配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// 运动的点，全部移动到同一位置
    pub moving: Vec<EntityId>,
    pub path: MotionPath,
    pub duration_ms: u64,
    pub fps: u32,
    #[serde(default)]
    pub mode: PlaybackMode,
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// 每帧记录的测量项
    #[serde(default)]
    pub measurements: Vec<Measurement>,
}

fn default_speed() -> f64 {
    1.0
}

impl AnimationConfig {
    pub fn new(moving: EntityId, path: MotionPath) -> Self {
        Self {
            moving: vec![moving],
            path,
            duration_ms: 1000,
            fps: 20,
            mode: PlaybackMode::Single,
            speed: 1.0,
            measurements: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_mode(mut self, mode: PlaybackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_measurements(mut self, measurements: Vec<Measurement>) -> Self {
        self.measurements = measurements;
        self
    }

    /// 总帧数，至少为 1，至多 [`MAX_STEPS`]
    pub fn total_steps(&self) -> usize {
        let steps = (self.duration_ms as f64 / 1000.0 * self.fps as f64).min(MAX_STEPS as f64);
        (steps as usize).max(1)
    }

    /// 帧间隔（毫秒）
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.fps as f64
    }

    pub fn validate(&self) -> BoardResult<()> {
        if self.moving.is_empty() {
            return Err(BoardError::Animation("no moving point".into()));
        }
        if self.fps == 0 {
            return Err(BoardError::Animation("fps must be positive".into()));
        }
        if self.duration_ms == 0 {
            return Err(BoardError::Animation("duration must be positive".into()));
        }
        if self.duration_ms as f64 / 1000.0 * self.fps as f64 > MAX_STEPS as f64 {
            return Err(BoardError::Animation(format!(
                "{} ms at {} fps exceeds {} frames",
                self.duration_ms, self.fps, MAX_STEPS
            )));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(BoardError::Animation(format!("invalid speed {}", self.speed)));
        }
        if let MotionPath::Circle { radius, .. } = self.path {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(BoardError::Animation(format!("invalid radius {radius}")));
            }
        }
        Ok(())
    }
}

/// 动画状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationState {
    #[default]
    Idle,
    Playing,
    Paused,
    Finished,
    Cancelled,
}

impl AnimationState {
    /// 是否可以重新开始
    pub fn is_stopped(self) -> bool {
        matches!(
            self,
            AnimationState::Idle | AnimationState::Finished | AnimationState::Cancelled
        )
    }
}

/// 预计算的一帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub step: usize,
    pub time_ms: f64,
    pub progress: f64,
    pub position: Option<Point2>,
}

/// 一帧执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub progress: f64,
    pub position: Option<Point2>,
    pub measurements: Vec<MeasurementValue>,
}

/// 动画调度器
#[derive(Debug, Clone)]
pub struct AnimationScheduler {
    config: AnimationConfig,
    resolver: Resolver,
    state: AnimationState,
    total_steps: usize,
    current_step: usize,
    forward: bool,
    speed: f64,
    speed_range: (f64, f64),
    /// 尚未消耗的时间（毫秒，已乘速度）
    pending_ms: f64,
    /// 开始播放时所有自由点的位置
    start_positions: Vec<(EntityId, Point2)>,
}

impl AnimationScheduler {
    pub const DEFAULT_SPEED_RANGE: (f64, f64) = (0.1, 5.0);

    pub fn new(config: AnimationConfig) -> BoardResult<Self> {
        config.validate()?;
        let (min, max) = Self::DEFAULT_SPEED_RANGE;
        Ok(Self {
            total_steps: config.total_steps(),
            speed: config.speed.clamp(min, max),
            config,
            resolver: Resolver::default(),
            state: AnimationState::Idle,
            current_step: 0,
            forward: true,
            speed_range: Self::DEFAULT_SPEED_RANGE,
            pending_ms: 0.0,
            start_positions: Vec::new(),
        })
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_speed_range(mut self, min: f64, max: f64) -> Self {
        if min > 0.0 && min <= max {
            self.speed_range = (min, max);
            self.speed = self.speed.clamp(min, max);
        }
        self
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    fn progress_of(&self, step: usize) -> f64 {
        (step as f64 / self.total_steps.saturating_sub(1).max(1) as f64).clamp(0.0, 1.0)
    }

    /// 一个完整行程的所有帧
    pub fn frames(&self) -> Vec<Frame> {
        let interval = self.config.frame_interval_ms();
        (0..self.total_steps)
            .map(|step| {
                let progress = self.progress_of(step);
                Frame {
                    step,
                    time_ms: step as f64 * interval,
                    progress,
                    position: self.config.path.position_at(progress),
                }
            })
            .collect()
    }

    /// 开始或继续播放
    pub fn play(&mut self, store: &EntityStore) -> BoardResult<()> {
        match self.state {
            AnimationState::Playing => Ok(()),
            AnimationState::Paused => self.resume(),
            _ => {
                for &id in &self.config.moving {
                    let point = store.point(id).ok_or(BoardError::EntityNotFound(id))?;
                    if point.is_derived() || point.fixed {
                        return Err(BoardError::NotMovable {
                            name: point.name.clone(),
                            reason: "only free points can be animated".into(),
                        });
                    }
                }
                self.start_positions = store
                    .points()
                    .filter(|p| !p.is_derived())
                    .map(|p| (p.id, p.position))
                    .collect();
                self.current_step = 0;
                self.forward = true;
                self.pending_ms = 0.0;
                self.state = AnimationState::Playing;
                tracing::info!(
                    "Animation started: {} steps, {:?} mode",
                    self.total_steps,
                    self.config.mode
                );
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) -> BoardResult<()> {
        if self.state != AnimationState::Playing {
            return Err(BoardError::Animation(format!(
                "cannot pause while {:?}",
                self.state
            )));
        }
        self.state = AnimationState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> BoardResult<()> {
        if self.state != AnimationState::Paused {
            return Err(BoardError::Animation(format!(
                "cannot resume while {:?}",
                self.state
            )));
        }
        self.state = AnimationState::Playing;
        Ok(())
    }

    /// 设置速度倍率，返回限制后的实际值
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        if speed.is_finite() {
            let (min, max) = self.speed_range;
            self.speed = speed.clamp(min, max);
        }
        self.speed
    }

    /// 推进 `elapsed` 的时间，执行期间到期的所有帧
    ///
    /// 单次调用最多执行 `total_steps` 帧，多余的时间被丢弃。
    pub fn tick(&mut self, store: &mut EntityStore, elapsed: Duration) -> BoardResult<Vec<StepReport>> {
        if self.state != AnimationState::Playing {
            return Ok(Vec::new());
        }
        let interval = self.config.frame_interval_ms();
        self.pending_ms += elapsed.as_secs_f64() * 1000.0 * self.speed;

        let mut reports = Vec::new();
        while self.pending_ms >= interval && self.state == AnimationState::Playing {
            if reports.len() >= self.total_steps {
                self.pending_ms = 0.0;
                break;
            }
            self.pending_ms -= interval;
            reports.push(self.step(store)?);
        }
        Ok(reports)
    }

    /// 执行当前帧并前进
    pub fn step(&mut self, store: &mut EntityStore) -> BoardResult<StepReport> {
        if self.state != AnimationState::Playing {
            return Err(BoardError::Animation(format!(
                "cannot step while {:?}",
                self.state
            )));
        }

        let live: Vec<EntityId> = self
            .config
            .moving
            .iter()
            .copied()
            .filter(|&id| store.point(id).is_some())
            .collect();
        if live.is_empty() {
            self.state = AnimationState::Cancelled;
            return Err(BoardError::Animation("moving points were removed".into()));
        }
        if live.len() < self.config.moving.len() {
            tracing::warn!(
                "{} moving points no longer exist",
                self.config.moving.len() - live.len()
            );
            self.config.moving = live;
        }

        let step = self.current_step;
        let progress = self.progress_of(step);
        let position = self.config.path.position_at(progress);
        if let Some(target) = position {
            for &id in &self.config.moving {
                self.resolver.move_point(store, id, target)?;
            }
        }

        let measurements = self
            .config
            .measurements
            .iter()
            .filter_map(|m| m.measure(store).ok())
            .collect();

        self.advance();
        Ok(StepReport {
            step,
            progress,
            position,
            measurements,
        })
    }

    fn advance(&mut self) {
        let last = self.total_steps.saturating_sub(1);
        match self.config.mode {
            PlaybackMode::Single => {
                self.current_step += 1;
                if self.current_step >= self.total_steps {
                    self.state = AnimationState::Finished;
                    tracing::info!("Animation finished");
                }
            }
            PlaybackMode::Loop => {
                self.current_step += 1;
                if self.current_step >= self.total_steps {
                    self.current_step = 0;
                }
            }
            PlaybackMode::PingPong => {
                if last == 0 {
                    // 只有一帧
                    self.current_step = 0;
                } else if self.forward {
                    self.current_step = (self.current_step + 1).min(last);
                } else {
                    self.current_step = self.current_step.saturating_sub(1);
                }
                if self.current_step >= last {
                    self.forward = false;
                } else if self.current_step == 0 {
                    self.forward = true;
                }
            }
        }
    }

    /// 取消动画，自由点回到开始播放时的位置
    pub fn cancel(&mut self, store: &mut EntityStore) -> BoardResult<()> {
        if self.state == AnimationState::Idle {
            return Ok(());
        }
        for &(id, position) in &self.start_positions {
            if store.point(id).is_some() {
                store.set_position(id, position)?;
            }
        }
        self.resolver.resolve_all(store)?;
        self.start_positions.clear();
        self.current_step = 0;
        self.forward = true;
        self.pending_ms = 0.0;
        self.state = AnimationState::Cancelled;
        tracing::info!("Animation cancelled");
        Ok(())
    }

    /// 跑完整个单次动画（无界模式只跑一个行程）
    pub fn run_to_end(&mut self, store: &mut EntityStore) -> BoardResult<Vec<StepReport>> {
        self.play(store)?;
        let mut reports = Vec::with_capacity(self.total_steps);
        while self.state == AnimationState::Playing && reports.len() < self.total_steps {
            reports.push(self.step(store)?);
        }
        Ok(reports)
    }
}
