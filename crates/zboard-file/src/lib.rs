//! ZBoard 文件格式处理
//!
//! 支持：
//! - `.zboard` 原生格式（MessagePack + Zstd）
//! - `.json` 文本格式
//! - 临时目录中的自动保存

pub mod autosave;
pub mod document;
pub mod error;
pub mod json;
pub mod native;

pub use autosave::AutoSave;
pub use document::{Document, DocumentMetadata, FORMAT_VERSION};
pub use error::FileError;

use std::path::Path;
use zboard_core::board::Board;
use zboard_core::config::BoardConfig;

/// 文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Native,
    Json,
}

impl Format {
    /// 按扩展名判断
    pub fn from_path(path: &Path) -> Result<Self, FileError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("zboard") => Ok(Format::Native),
            Some("json") => Ok(Format::Json),
            other => Err(FileError::InvalidFormat(format!(
                "unsupported file extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

/// 保存文档
pub fn save_document(document: &Document, path: &Path) -> Result<(), FileError> {
    match Format::from_path(path)? {
        Format::Native => native::save(document, path),
        Format::Json => json::save(document, path),
    }
}

/// 加载文档并检查约束依赖图
pub fn load_document(path: &Path) -> Result<Document, FileError> {
    let document = match Format::from_path(path)? {
        Format::Native => native::load(path)?,
        Format::Json => json::load(path)?,
    };
    document.validate()?;
    Ok(document)
}

/// 保存画板，标题取文件名
pub fn save(board: &Board, path: &Path) -> Result<Document, FileError> {
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled");
    let document = Document::from_board(board, DocumentMetadata::new(title));
    save_document(&document, path)?;
    Ok(document)
}

/// 加载画板，派生点重新计算
pub fn load(path: &Path, config: BoardConfig) -> Result<Board, FileError> {
    load_document(path)?.into_board(config)
}
