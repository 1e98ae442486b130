use nodedeck_core::{NodeConfig, NodeInfo};
use thiserror::Error;

/// Failure surface of a backend implementation. The dispatcher translates
/// these into [`crate::EngineError`] with the node name and operation
/// attached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendFailure {
    /// The backend could not be reached at all. On `refresh` this retains
    /// the previous registry snapshot.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The supplied configuration was rejected before any state changed.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Opaque backend failure.
    #[error("{0}")]
    Failed(String),
}

/// Lifecycle command interface of the external node backend.
///
/// Each call either succeeds with the updated node state or fails without
/// the engine assuming anything about backend-side effects; reconciliation
/// after an ambiguous failure is an explicit `list` (engine `refresh`).
pub trait NodeBackend: Send {
    fn create(&mut self, name: &str, config: &NodeConfig) -> Result<NodeInfo, BackendFailure>;
    fn apply_config(&mut self, name: &str, config: &NodeConfig)
        -> Result<NodeInfo, BackendFailure>;
    fn start(&mut self, name: &str) -> Result<NodeInfo, BackendFailure>;
    fn stop(&mut self, name: &str) -> Result<NodeInfo, BackendFailure>;
    fn destroy(&mut self, name: &str) -> Result<(), BackendFailure>;
    fn open_admin(&mut self, name: &str) -> Result<(), BackendFailure>;
    /// Full authoritative node list with status.
    fn list(&mut self) -> Result<Vec<NodeInfo>, BackendFailure>;
    /// Captured output of a node started through this backend.
    fn output(&mut self, name: &str) -> Result<String, BackendFailure>;
    /// Forward one input line to a running node's stdin.
    fn send_input(&mut self, name: &str, line: &str) -> Result<(), BackendFailure>;
}
