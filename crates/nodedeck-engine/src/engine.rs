use crate::backend::{BackendFailure, NodeBackend};
use crate::error::EngineError;
use crate::registry::NodeRegistry;
use crate::selection::SelectionState;
use nodedeck_core::{NodeConfig, NodeInfo, TrayAction, TraySection, TrayVerb, TriggerPayload};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Trigger verb that only reveals/focuses a node: it updates the
    /// selection but never queues a pending tray action.
    pub reveal_verb: TrayVerb,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            reveal_verb: TrayVerb::Show,
        }
    }
}

/// Single owner of registry, selection, and pending tray action.
///
/// Every lifecycle operation follows the same shape: validate
/// preconditions against the current registry, invoke the backend, and
/// mutate local state only on success. Backend failures pass through
/// unchanged; nothing is retried here and nothing is mutated
/// speculatively — after an ambiguous failure, [`Self::refresh`] is the
/// way back to ground truth.
pub struct CoordinationEngine {
    registry: NodeRegistry,
    selection: SelectionState,
    backend: Box<dyn NodeBackend>,
    options: EngineOptions,
}

impl CoordinationEngine {
    pub fn new(backend: Box<dyn NodeBackend>, options: EngineOptions) -> Self {
        Self {
            registry: NodeRegistry::new(),
            selection: SelectionState::new(),
            backend,
            options,
        }
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        self.registry.nodes()
    }

    pub fn snapshot(&self) -> Vec<NodeInfo> {
        self.registry.snapshot()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selection.selected()
    }

    pub fn selected_node(&self) -> Option<&NodeInfo> {
        self.selection.selected().and_then(|name| self.registry.get(name))
    }

    pub fn pending_action(&self) -> Option<&TrayAction> {
        self.selection.pending()
    }

    pub fn consume_pending_action(&mut self) -> Option<TrayAction> {
        self.selection.consume_pending()
    }

    /// Set the selection. Fails with `UnknownNode` if the name is not in
    /// the registry; the selection never points at a nonexistent node.
    pub fn select(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.registry.contains(name) {
            return Err(EngineError::UnknownNode {
                op: "select",
                name: name.to_string(),
            });
        }
        self.selection.select(name.to_string());
        Ok(())
    }

    pub fn set_pending_action(
        &mut self,
        section: TraySection,
        verb: TrayVerb,
    ) -> Result<(), EngineError> {
        self.selection.set_pending(section, verb)
    }

    /// Apply one external trigger payload: select the node, then queue the
    /// pending action unless the verb is the reveal-only sentinel.
    ///
    /// A reveal-only trigger does not disturb a pending action that is
    /// already queued, even when it moves the selection to another node.
    /// The shell is expected to drain the pending action as each trigger is
    /// applied; a pending action left queued across a re-selection targets
    /// whatever is selected when it is finally consumed.
    pub fn apply_trigger(&mut self, trigger: TriggerPayload) -> Result<(), EngineError> {
        self.select(&trigger.node_name)?;
        if trigger.action == self.options.reveal_verb {
            debug!(node = %trigger.node_name, "trigger is reveal-only; no pending action");
            return Ok(());
        }
        if trigger.section == TraySection::Unrecognized {
            warn!(node = %trigger.node_name, "trigger targets an unrecognized section");
        }
        self.selection.set_pending(trigger.section, trigger.action)
    }

    pub fn initialize(
        &mut self,
        name: &str,
        config: &NodeConfig,
    ) -> Result<NodeInfo, EngineError> {
        if self.registry.contains(name) {
            return Err(EngineError::DuplicateName {
                name: name.to_string(),
            });
        }
        let node = self
            .backend
            .create(name, config)
            .map_err(|failure| map_failure("initialize", name, failure))?;
        info!(node = %node.name, "node initialized");
        self.registry.upsert(node.clone());
        self.selection.select(node.name.clone());
        Ok(node)
    }

    pub fn config_update(
        &mut self,
        name: &str,
        config: &NodeConfig,
    ) -> Result<NodeInfo, EngineError> {
        self.require_known("config_update", name)?;
        let node = self
            .backend
            .apply_config(name, config)
            .map_err(|failure| map_failure("config_update", name, failure))?;
        info!(node = %node.name, "node config updated");
        self.registry.upsert(node.clone());
        Ok(node)
    }

    pub fn start(&mut self, name: &str) -> Result<NodeInfo, EngineError> {
        let current = self.require_known("start", name)?;
        if current.is_running() {
            return Err(EngineError::AlreadyRunning {
                name: name.to_string(),
            });
        }
        let node = self
            .backend
            .start(name)
            .map_err(|failure| map_failure("start", name, failure))?;
        info!(node = %node.name, "node started");
        self.registry.upsert(node.clone());
        Ok(node)
    }

    pub fn stop(&mut self, name: &str) -> Result<NodeInfo, EngineError> {
        let current = self.require_known("stop", name)?;
        if !current.is_running() {
            return Err(EngineError::NotRunning {
                op: "stop",
                name: name.to_string(),
            });
        }
        let node = self
            .backend
            .stop(name)
            .map_err(|failure| map_failure("stop", name, failure))?;
        info!(node = %node.name, "node stopped");
        self.registry.upsert(node.clone());
        Ok(node)
    }

    /// Destroy a node. If it was selected, the selection and any pending
    /// tray action are cleared with it.
    pub fn delete(&mut self, name: &str) -> Result<(), EngineError> {
        self.require_known("delete", name)?;
        self.backend
            .destroy(name)
            .map_err(|failure| map_failure("delete", name, failure))?;
        info!(node = %name, "node deleted");
        self.registry.remove(name);
        if self.selection.clear_if_selected(name) {
            debug!(node = %name, "deleted node was selected; selection cleared");
        }
        Ok(())
    }

    pub fn open_admin_dashboard(&mut self, name: &str) -> Result<(), EngineError> {
        let current = self.require_known("open_admin_dashboard", name)?;
        if !current.is_running() {
            return Err(EngineError::NotRunning {
                op: "open_admin_dashboard",
                name: name.to_string(),
            });
        }
        self.backend
            .open_admin(name)
            .map_err(|failure| map_failure("open_admin_dashboard", name, failure))
    }

    pub fn node_output(&mut self, name: &str) -> Result<String, EngineError> {
        self.require_known("node_output", name)?;
        self.backend
            .output(name)
            .map_err(|failure| map_failure("node_output", name, failure))
    }

    pub fn send_input(&mut self, name: &str, line: &str) -> Result<(), EngineError> {
        let current = self.require_known("send_input", name)?;
        if !current.is_running() {
            return Err(EngineError::NotRunning {
                op: "send_input",
                name: name.to_string(),
            });
        }
        self.backend
            .send_input(name, line)
            .map_err(|failure| map_failure("send_input", name, failure))
    }

    /// Re-fetch the authoritative node list and replace the registry
    /// wholesale. On `BackendUnavailable` the previous snapshot is kept
    /// untouched. A selection that no longer resolves after the replace is
    /// cleared together with its pending action.
    pub fn refresh(&mut self) -> Result<(), EngineError> {
        let nodes = self.backend.list().map_err(|failure| match failure {
            BackendFailure::Unavailable(message) => EngineError::BackendUnavailable {
                op: "refresh",
                message,
            },
            other => EngineError::Backend {
                op: "refresh",
                name: String::new(),
                message: other.to_string(),
            },
        })?;
        self.registry.replace_all(nodes);

        if let Some(selected) = self.selection.selected().map(str::to_string) {
            if !self.registry.contains(&selected) {
                info!(node = %selected, "selected node vanished on refresh; selection cleared");
                self.selection.clear();
            }
        }
        Ok(())
    }

    fn require_known(&self, op: &'static str, name: &str) -> Result<&NodeInfo, EngineError> {
        self.registry.get(name).ok_or_else(|| EngineError::UnknownNode {
            op,
            name: name.to_string(),
        })
    }
}

fn map_failure(op: &'static str, name: &str, failure: BackendFailure) -> EngineError {
    match failure {
        BackendFailure::Unavailable(message) => EngineError::BackendUnavailable { op, message },
        BackendFailure::InvalidConfig(reason) => EngineError::InvalidConfig {
            name: name.to_string(),
            reason,
        },
        BackendFailure::Failed(message) => EngineError::Backend {
            op,
            name: name.to_string(),
            message,
        },
    }
}
