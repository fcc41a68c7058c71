//! 画板核心错误定义

use crate::entity::EntityId;
use crate::expr::ExprError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("No entity named '{0}'")]
    UnknownName(String),

    #[error("Name already in use: {0}")]
    DuplicateName(String),

    #[error("Constraint cycle through: {}", .0.join(" -> "))]
    ConstraintCycle(Vec<String>),

    #[error("Point '{name}' cannot be moved: {reason}")]
    NotMovable { name: String, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Instruction {index} ({kind}) rejected: {source}")]
    Instruction {
        index: usize,
        kind: String,
        #[source]
        source: Box<BoardError>,
    },

    #[error("Malformed instructions: {0}")]
    MalformedInstructions(String),

    #[error("Animation error: {0}")]
    Animation(String),

    #[error("Expression error: {0}")]
    Expression(#[from] ExprError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Assistant error: {0}")]
    Assistant(String),

    #[error("Board session closed")]
    SessionClosed,
}

pub type BoardResult<T> = Result<T, BoardError>;
