//! 画布快照文档

use crate::error::FileError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zboard_core::board::Board;
use zboard_core::config::BoardConfig;
use zboard_core::function::FunctionPlot;
use zboard_core::resolver::Resolver;
use zboard_core::store::EntityStore;
use zboard_core::view::ViewState;

/// 当前文档格式版本
pub const FORMAT_VERSION: u32 = 1;

/// 文档元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl DocumentMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            id: Uuid::new_v4(),
            created: now,
            modified: now,
        }
    }
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// 画布快照：实体存储、视图与函数图像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    pub metadata: DocumentMetadata,
    pub store: EntityStore,
    pub view: ViewState,
    #[serde(default)]
    pub functions: Vec<FunctionPlot>,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            version: FORMAT_VERSION,
            metadata: DocumentMetadata::new(title),
            store: EntityStore::new(),
            view: ViewState::default(),
            functions: Vec::new(),
        }
    }

    /// 从画板当前状态创建快照
    pub fn from_board(board: &Board, metadata: DocumentMetadata) -> Self {
        Self {
            version: FORMAT_VERSION,
            metadata,
            store: board.store().clone(),
            view: board.view().clone(),
            functions: board.functions().to_vec(),
        }
    }

    /// 检查版本与约束依赖图
    pub fn validate(&self) -> Result<(), FileError> {
        if self.version > FORMAT_VERSION {
            return Err(FileError::UnsupportedVersion(format!(
                "Document version {} is newer than supported version {}",
                self.version, FORMAT_VERSION
            )));
        }
        Resolver::default().validate(&self.store)?;
        Ok(())
    }

    /// 恢复为画板，派生点位置重新计算
    pub fn into_board(self, config: BoardConfig) -> Result<Board, FileError> {
        self.validate()?;
        Ok(Board::from_parts(config, self.store, self.view, self.functions)?)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new("Untitled")
    }
}
