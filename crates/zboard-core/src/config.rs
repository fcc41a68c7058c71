//! 画板配置
//!
//! 从 JSON 文件加载，缺失字段使用默认值。

use crate::animation::{PlaybackMode, MAX_STEPS};
use crate::error::{BoardError, BoardResult};
use crate::function::MAX_SAMPLES;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 动画配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnimationSettings {
    /// 帧率
    pub fps: u32,
    /// 默认时长（毫秒）
    pub default_duration_ms: u64,
    pub default_mode: PlaybackMode,
    /// 速度倍率范围
    pub min_speed: f64,
    pub max_speed: f64,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            fps: 20,
            default_duration_ms: 1000,
            default_mode: PlaybackMode::Single,
            min_speed: 0.1,
            max_speed: 5.0,
        }
    }
}

/// 函数绘图配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlotSettings {
    /// 采样分段数
    pub resolution: usize,
    pub x_min: f64,
    pub x_max: f64,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            resolution: 1000,
            x_min: -10.0,
            x_max: 10.0,
        }
    }
}

/// 助手服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantSettings {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen3:4b-instruct".to_string(),
            timeout_secs: 30,
        }
    }
}

/// 画板配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoardConfig {
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub animation: AnimationSettings,
    pub plot: PlotSettings,
    pub assistant: AssistantSettings,
    /// 每次修改后自动保存
    pub autosave: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            canvas_width: 800.0,
            canvas_height: 600.0,
            animation: AnimationSettings::default(),
            plot: PlotSettings::default(),
            assistant: AssistantSettings::default(),
            autosave: true,
        }
    }
}

impl BoardConfig {
    /// 配置文件默认名
    pub const FILE_NAME: &'static str = "zboard.json";

    pub fn from_json(text: &str) -> BoardResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> BoardResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        tracing::info!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// 文件存在则加载，否则使用默认值
    pub fn load_or_default(path: impl AsRef<Path>) -> BoardResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> BoardResult<()> {
        let fail = |msg: String| Err(BoardError::Config(msg));
        if self.animation.fps == 0 {
            return fail("animation.fps must be positive".into());
        }
        if self.animation.default_duration_ms == 0 {
            return fail("animation.default_duration_ms must be positive".into());
        }
        if !(self.animation.min_speed > 0.0 && self.animation.min_speed <= self.animation.max_speed) {
            return fail(format!(
                "invalid speed range [{}, {}]",
                self.animation.min_speed, self.animation.max_speed
            ));
        }
        let frames = self.animation.default_duration_ms as f64 / 1000.0 * self.animation.fps as f64;
        if frames > MAX_STEPS as f64 {
            return fail(format!(
                "animation.default_duration_ms at {} fps exceeds {} frames",
                self.animation.fps, MAX_STEPS
            ));
        }
        if self.plot.resolution == 0 || self.plot.resolution > MAX_SAMPLES {
            return fail(format!(
                "plot.resolution must be in 1..={}, got {}",
                MAX_SAMPLES, self.plot.resolution
            ));
        }
        if !(self.plot.x_min < self.plot.x_max) {
            return fail(format!(
                "invalid plot range [{}, {}]",
                self.plot.x_min, self.plot.x_max
            ));
        }
        if !(self.canvas_width > 0.0 && self.canvas_height > 0.0) {
            return fail("canvas size must be positive".into());
        }
        if self.assistant.timeout_secs == 0 {
            return fail("assistant.timeout_secs must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = BoardConfig::from_json(r#"{ "animation": { "fps": 30 } }"#).unwrap();
        assert_eq!(config.animation.fps, 30);
        assert_eq!(config.animation.default_duration_ms, 1000);
        assert_eq!(config.plot, PlotSettings::default());
        assert!(config.autosave);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            BoardConfig::from_json(r#"{ "animation": { "fps": 0 } }"#),
            Err(BoardError::Config(_))
        ));
        assert!(matches!(
            BoardConfig::from_json(r#"{ "plot": { "resolution": 0 } }"#),
            Err(BoardError::Config(_))
        ));
        assert!(matches!(
            BoardConfig::from_json(r#"{ "plot": { "x_min": 5, "x_max": 1 } }"#),
            Err(BoardError::Config(_))
        ));
        assert!(matches!(
            BoardConfig::from_json(r#"{ "plot": { "resolution": 1000001 } }"#),
            Err(BoardError::Config(_))
        ));
        assert!(matches!(
            BoardConfig::from_json(
                r#"{ "animation": { "fps": 1000, "default_duration_ms": 3600000 } }"#
            ),
            Err(BoardError::Config(_))
        ));
    }

    #[test]
    fn test_mode_is_snake_case() {
        let config =
            BoardConfig::from_json(r#"{ "animation": { "default_mode": "ping_pong" } }"#).unwrap();
        assert_eq!(config.animation.default_mode, PlaybackMode::PingPong);
    }
}
