//! 自动保存
//!
//! 画布状态写入系统临时目录下的 `zboard_autosave/canvas_autosave.json`。

use crate::document::{Document, DocumentMetadata};
use crate::error::FileError;
use crate::json;
use std::path::{Path, PathBuf};
use zboard_core::board::Board;
use zboard_core::config::BoardConfig;

const DIR_NAME: &str = "zboard_autosave";
const FILE_NAME: &str = "canvas_autosave.json";

/// 自动保存位置
#[derive(Debug, Clone)]
pub struct AutoSave {
    dir: PathBuf,
}

impl AutoSave {
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir().join(DIR_NAME))
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(FILE_NAME)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, board: &Board) -> Result<PathBuf, FileError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path();
        let document = Document::from_board(board, DocumentMetadata::new("autosave"));
        json::save(&document, &path)?;
        Ok(path)
    }

    /// 存在自动保存文件时加载
    pub fn load_if_present(&self, config: BoardConfig) -> Result<Option<Board>, FileError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let board = json::load(&path)?.into_board(config)?;
        Ok(Some(board))
    }

    /// 删除自动保存文件，返回是否存在过
    pub fn clear(&self) -> Result<bool, FileError> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => {
                tracing::info!("Cleared autosave at {}", self.dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for AutoSave {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autosave_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let autosave = AutoSave::in_dir(dir.path().join(DIR_NAME));
        assert!(autosave.load_if_present(BoardConfig::default()).unwrap().is_none());

        let mut board = Board::default();
        board
            .apply_json(r#"{"type": "point", "name": "A", "x": 1.5, "y": -2}"#)
            .unwrap();
        let path = autosave.save(&board).unwrap();
        assert!(path.ends_with(FILE_NAME));

        let restored = autosave
            .load_if_present(BoardConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(restored.store(), board.store());

        assert!(autosave.clear().unwrap());
        assert!(!autosave.clear().unwrap());
    }

    #[test]
    fn test_default_location() {
        let autosave = AutoSave::new();
        assert!(autosave.dir().starts_with(std::env::temp_dir()));
        assert!(autosave.dir().ends_with(DIR_NAME));
    }
}
