//! Change notifications emitted by the board store

use serde::Serialize;

/// What changed in the board state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum BoardEvent {
    BoardsChanged,
    ColumnsChanged,
    TasksChanged,
    /// A failure was recorded; carries the displayed message
    ErrorRaised(String),
    /// Local state was replaced from the remote store after a failed write
    Resynced,
    Reset,
}
