//! Turn-level events.
//!
//! `TurnEvent`s let a front end follow a turn as it happens: retrieval,
//! streamed fragments, each execution, and the final save.

use serde::{Deserialize, Serialize};

/// Events emitted by a session while running a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Context chunks were retrieved from the store.
    Retrieved { count: usize },

    /// Partial text from the model.
    Chunk { content: String },

    /// The response held no runnable code.
    NoCode { notice: String },

    /// A code block is about to run (`index` is zero-based).
    ExecutionStarted { index: usize, total: usize },

    /// A code block finished; `output` is stdout or the error text.
    ExecutionFinished {
        index: usize,
        output: String,
        success: bool,
    },

    /// The store was saved with `entries` chunks in it.
    Persisted { entries: usize },
}

impl TurnEvent {
    /// Short event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Retrieved { .. } => "retrieved",
            Self::Chunk { .. } => "chunk",
            Self::NoCode { .. } => "no_code",
            Self::ExecutionStarted { .. } => "execution_started",
            Self::ExecutionFinished { .. } => "execution_finished",
            Self::Persisted { .. } => "persisted",
        }
    }
}
