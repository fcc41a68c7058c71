//! JSON 格式（.json）

use crate::document::Document;
use crate::error::FileError;
use std::path::Path;

pub fn to_string(document: &Document) -> Result<String, FileError> {
    Ok(serde_json::to_string_pretty(document)?)
}

pub fn from_str(text: &str) -> Result<Document, FileError> {
    Ok(serde_json::from_str(text)?)
}

/// 保存文档到文件
pub fn save(document: &Document, path: &Path) -> Result<(), FileError> {
    std::fs::write(path, to_string(document)?)?;
    tracing::info!(
        "Saved {} entities to {}",
        document.store.len(),
        path.display()
    );
    Ok(())
}

/// 从文件加载文档
pub fn load(path: &Path) -> Result<Document, FileError> {
    let document = from_str(&std::fs::read_to_string(path)?)?;
    tracing::info!(
        "Loaded {} entities from {}",
        document.store.len(),
        path.display()
    );
    Ok(document)
}
