//! Node registry and tray-event coordination engine.
//!
//! The engine is the single owner of the node registry, the current
//! selection, and the pending tray action. Direct commands and external
//! trigger events both funnel into it: triggers are delivered over a
//! channel by the [`listener::TriggerListener`] and applied by whoever
//! drives the engine, so trigger-driven and user-driven mutations never
//! interleave.

pub mod backend;
pub mod engine;
pub mod listener;
pub mod registry;
pub mod selection;
pub mod transport;

mod error;

pub use backend::{BackendFailure, NodeBackend};
pub use engine::{CoordinationEngine, EngineOptions};
pub use error::EngineError;
pub use listener::{TriggerListener, TRIGGER_EVENT};
pub use registry::NodeRegistry;
pub use selection::SelectionState;
pub use transport::{LocalTrayTransport, SubscribeError, SubscriptionToken, TriggerTransport};
