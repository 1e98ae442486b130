use thiserror::Error;

/// Failure taxonomy of the coordination engine. Every variant names the
/// node and operation involved so the shell can render a precise message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown node '{name}' during {op}")]
    UnknownNode { op: &'static str, name: String },
    #[error("a node named '{name}' already exists")]
    DuplicateName { name: String },
    #[error("invalid config for node '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },
    #[error("node '{name}' is already running")]
    AlreadyRunning { name: String },
    #[error("node '{name}' is not running (required by {op})")]
    NotRunning { op: &'static str, name: String },
    #[error("backend unreachable during {op}: {message}")]
    BackendUnavailable { op: &'static str, message: String },
    #[error("backend failed during {op} for node '{name}': {message}")]
    Backend {
        op: &'static str,
        name: String,
        message: String,
    },
    #[error("trigger subscription failed: {message}")]
    Subscription { message: String },
    #[error("a pending tray action requires a selected node")]
    SelectionRequired,
}
