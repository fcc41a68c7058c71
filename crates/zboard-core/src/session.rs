//! 画板会话
//!
//! 单一所有者循环：会话独占 [`Board`]，通过 mpsc 通道接收命令，
//! 每个请求附带 oneshot 应答。助手请求在阻塞线程池中执行，
//! 其结果作为命令送回循环，因此对存储的修改不会并发发生。
//! 动画由 `tokio::time` 定时器驱动。

use crate::animation::{AnimationConfig, AnimationScheduler, AnimationState, StepReport};
use crate::board::Board;
use crate::error::{BoardError, BoardResult};
use crate::instruction::{parse_assistant_reply, parse_instructions, Instruction};
use crate::interpreter::BatchReport;
use crate::math::Point2;
use crate::resolver::ResolveReport;
use futures::channel::{mpsc, oneshot};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// 绘图助手
///
/// 输入用户需求与画布描述，返回包含绘图指令的文本。实现可以阻塞。
pub trait Assistant: Send + Sync + 'static {
    fn complete(&self, prompt: &str, context: &str) -> BoardResult<String>;
}

type Reply<T> = oneshot::Sender<BoardResult<T>>;

/// 会话命令
pub enum BoardCommand {
    Apply {
        instructions: Vec<Instruction>,
        reply: Reply<BatchReport>,
    },
    MovePoint {
        name: String,
        position: Point2,
        reply: Reply<ResolveReport>,
    },
    /// 请求助手生成图形
    Ask {
        prompt: String,
        reply: Reply<BatchReport>,
    },
    /// 助手返回后由后台任务送回
    AssistantReply {
        outcome: BoardResult<Vec<Instruction>>,
        reply: Reply<BatchReport>,
    },
    StartAnimation {
        config: AnimationConfig,
        reply: Reply<usize>,
    },
    PauseAnimation {
        reply: Reply<()>,
    },
    ResumeAnimation {
        reply: Reply<()>,
    },
    SetSpeed {
        speed: f64,
        reply: Reply<f64>,
    },
    CancelAnimation {
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<Board>,
    },
    Shutdown,
}

/// 会话事件
#[derive(Debug, Clone)]
pub enum BoardEvent {
    BatchApplied(BatchReport),
    PointMoved { name: String },
    AnimationStarted { total_steps: usize },
    AnimationStep(StepReport),
    AnimationFinished,
    AnimationCancelled,
    /// 动画因错误中止
    AnimationAborted(String),
}

/// 会话句柄，可克隆
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::UnboundedSender<BoardCommand>,
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> BoardCommand) -> BoardResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .unbounded_send(make(tx))
            .map_err(|_| BoardError::SessionClosed)?;
        rx.await.map_err(|_| BoardError::SessionClosed)?
    }

    pub async fn apply(&self, instructions: Vec<Instruction>) -> BoardResult<BatchReport> {
        self.request(|reply| BoardCommand::Apply {
            instructions,
            reply,
        })
        .await
    }

    pub async fn apply_json(&self, json: &str) -> BoardResult<BatchReport> {
        let instructions = parse_instructions(json)?;
        self.apply(instructions).await
    }

    pub async fn move_point(&self, name: &str, position: Point2) -> BoardResult<ResolveReport> {
        let name = name.to_string();
        self.request(|reply| BoardCommand::MovePoint {
            name,
            position,
            reply,
        })
        .await
    }

    pub async fn ask(&self, prompt: &str) -> BoardResult<BatchReport> {
        let prompt = prompt.to_string();
        self.request(|reply| BoardCommand::Ask { prompt, reply }).await
    }

    /// 开始动画，返回总帧数
    pub async fn start_animation(&self, config: AnimationConfig) -> BoardResult<usize> {
        self.request(|reply| BoardCommand::StartAnimation { config, reply })
            .await
    }

    pub async fn pause_animation(&self) -> BoardResult<()> {
        self.request(|reply| BoardCommand::PauseAnimation { reply }).await
    }

    pub async fn resume_animation(&self) -> BoardResult<()> {
        self.request(|reply| BoardCommand::ResumeAnimation { reply }).await
    }

    pub async fn set_speed(&self, speed: f64) -> BoardResult<f64> {
        self.request(|reply| BoardCommand::SetSpeed { speed, reply }).await
    }

    pub async fn cancel_animation(&self) -> BoardResult<()> {
        self.request(|reply| BoardCommand::CancelAnimation { reply }).await
    }

    /// 当前画板的副本
    pub async fn snapshot(&self) -> BoardResult<Board> {
        self.request(|reply| BoardCommand::Snapshot { reply }).await
    }

    pub fn shutdown(&self) -> BoardResult<()> {
        self.sender
            .unbounded_send(BoardCommand::Shutdown)
            .map_err(|_| BoardError::SessionClosed)
    }
}

/// 画板会话
pub struct BoardSession {
    board: Board,
    assistant: Option<Arc<dyn Assistant>>,
    commands: mpsc::UnboundedReceiver<BoardCommand>,
    internal_tx: mpsc::UnboundedSender<BoardCommand>,
    internal_rx: mpsc::UnboundedReceiver<BoardCommand>,
    events: mpsc::UnboundedSender<BoardEvent>,
    animation: Option<AnimationScheduler>,
    ticker: Interval,
    last_tick: Instant,
}

impl BoardSession {
    /// 创建会话，返回会话本身、命令句柄与事件流
    ///
    /// 必须在 tokio 运行时中调用。
    pub fn new(
        board: Board,
        assistant: Option<Arc<dyn Assistant>>,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<BoardEvent>) {
        let (sender, commands) = mpsc::unbounded();
        let (internal_tx, internal_rx) = mpsc::unbounded();
        let (events, event_rx) = mpsc::unbounded();

        let fps = board.config().animation.fps.max(1);
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let session = Self {
            board,
            assistant,
            commands,
            internal_tx,
            internal_rx,
            events,
            animation: None,
            ticker,
            last_tick: Instant::now(),
        };
        (session, SessionHandle { sender }, event_rx)
    }

    fn animating(&self) -> bool {
        self.animation
            .as_ref()
            .is_some_and(|a| a.state() == AnimationState::Playing)
    }

    /// 运行直到收到 `Shutdown` 或所有句柄被丢弃，返回最终的画板
    pub async fn run(mut self) -> Board {
        tracing::info!("Board session started");
        loop {
            tokio::select! {
                command = self.commands.next() => match command {
                    Some(BoardCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(command) = self.internal_rx.next() => self.handle(command),
                now = self.ticker.tick(), if self.animating() => self.advance(now),
            }
        }
        if let Some(mut animation) = self.animation.take() {
            if !animation.state().is_stopped() {
                let _ = animation.cancel(self.board.store_mut());
            }
        }
        tracing::info!("Board session stopped");
        self.board
    }

    fn emit(&self, event: BoardEvent) {
        // 无人订阅时丢弃
        let _ = self.events.unbounded_send(event);
    }

    fn handle(&mut self, command: BoardCommand) {
        match command {
            BoardCommand::Apply {
                instructions,
                reply,
            } => {
                let result = self.board.apply(&instructions);
                if let Ok(report) = &result {
                    self.emit(BoardEvent::BatchApplied(report.clone()));
                }
                let _ = reply.send(result);
            }
            BoardCommand::MovePoint {
                name,
                position,
                reply,
            } => {
                let result = self.board.move_point(&name, position);
                if result.is_ok() {
                    self.emit(BoardEvent::PointMoved { name });
                }
                let _ = reply.send(result);
            }
            BoardCommand::Ask { prompt, reply } => self.ask(prompt, reply),
            BoardCommand::AssistantReply { outcome, reply } => {
                let result = outcome.and_then(|instructions| {
                    if instructions.is_empty() {
                        return Err(BoardError::MalformedInstructions(
                            "no drawing instructions found in reply".into(),
                        ));
                    }
                    self.board.apply(&instructions)
                });
                if let Ok(report) = &result {
                    self.emit(BoardEvent::BatchApplied(report.clone()));
                }
                let _ = reply.send(result);
            }
            BoardCommand::StartAnimation { config, reply } => {
                let _ = reply.send(self.start_animation(config));
            }
            BoardCommand::PauseAnimation { reply } => {
                let _ = reply.send(self.with_animation(|a| a.pause()));
            }
            BoardCommand::ResumeAnimation { reply } => {
                let result = self.with_animation(|a| a.resume());
                if result.is_ok() {
                    self.restart_clock();
                }
                let _ = reply.send(result);
            }
            BoardCommand::SetSpeed { speed, reply } => {
                let _ = reply.send(self.with_animation(|a| Ok(a.set_speed(speed))));
            }
            BoardCommand::CancelAnimation { reply } => {
                let result = match self.animation.take() {
                    Some(mut animation) => animation.cancel(self.board.store_mut()),
                    None => Err(BoardError::Animation("no animation".into())),
                };
                if result.is_ok() {
                    self.emit(BoardEvent::AnimationCancelled);
                }
                let _ = reply.send(result);
            }
            BoardCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.board.clone()));
            }
            BoardCommand::Shutdown => {}
        }
    }

    fn ask(&mut self, prompt: String, reply: Reply<BatchReport>) {
        let Some(assistant) = self.assistant.clone() else {
            let _ = reply.send(Err(BoardError::Assistant("no assistant configured".into())));
            return;
        };
        let context = self.board.describe();
        let loopback = self.internal_tx.clone();
        tokio::spawn(async move {
            let joined =
                tokio::task::spawn_blocking(move || assistant.complete(&prompt, &context)).await;
            let outcome = match joined {
                Ok(Ok(text)) => Ok(parse_assistant_reply(&text)),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(BoardError::Assistant(format!("assistant task failed: {e}"))),
            };
            if let Err(e) = &outcome {
                tracing::warn!("Assistant request failed: {}", e);
            }
            let _ = loopback.unbounded_send(BoardCommand::AssistantReply { outcome, reply });
        });
    }

    fn with_animation<T>(
        &mut self,
        f: impl FnOnce(&mut AnimationScheduler) -> BoardResult<T>,
    ) -> BoardResult<T> {
        match self.animation.as_mut() {
            Some(animation) => f(animation),
            None => Err(BoardError::Animation("no animation".into())),
        }
    }

    fn restart_clock(&mut self) {
        self.last_tick = Instant::now();
        self.ticker.reset_at(self.last_tick + self.ticker.period());
    }

    fn start_animation(&mut self, config: AnimationConfig) -> BoardResult<usize> {
        let mut scheduler = self.board.animation(config)?;
        if let Some(mut previous) = self.animation.take() {
            if !previous.state().is_stopped() {
                previous.cancel(self.board.store_mut())?;
                self.emit(BoardEvent::AnimationCancelled);
            }
        }
        scheduler.play(self.board.store())?;
        let total_steps = scheduler.total_steps();
        self.animation = Some(scheduler);
        self.restart_clock();
        self.emit(BoardEvent::AnimationStarted { total_steps });
        Ok(total_steps)
    }

    fn advance(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        let Some(animation) = self.animation.as_mut() else {
            return;
        };

        match animation.tick(self.board.store_mut(), elapsed) {
            Ok(reports) => {
                let finished = animation.state() == AnimationState::Finished;
                for report in reports {
                    self.emit(BoardEvent::AnimationStep(report));
                }
                if finished {
                    self.animation = None;
                    self.emit(BoardEvent::AnimationFinished);
                }
            }
            Err(e) => {
                tracing::warn!("Animation aborted: {}", e);
                self.animation = None;
                self.emit(BoardEvent::AnimationAborted(e.to_string()));
            }
        }
    }
}
