use crate::error::EngineError;
use nodedeck_core::{TrayAction, TraySection, TrayVerb};

/// Current selection plus the one-shot pending tray action.
///
/// Validation of the selected name against the registry is the engine's
/// job; this type only enforces the invariants that are local to it: a
/// pending action needs a live selection, and clearing the selection
/// discards the pending action with it.
#[derive(Debug, Default)]
pub struct SelectionState {
    selected: Option<String>,
    pending: Option<TrayAction>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn select(&mut self, name: String) {
        self.selected = Some(name);
    }

    pub fn clear(&mut self) {
        self.selected = None;
        self.pending = None;
    }

    /// Clear selection and pending action if `name` is the selected node.
    /// Returns whether anything was cleared.
    pub fn clear_if_selected(&mut self, name: &str) -> bool {
        if self.selected.as_deref() == Some(name) {
            self.clear();
            true
        } else {
            false
        }
    }

    pub fn set_pending(&mut self, section: TraySection, verb: TrayVerb) -> Result<(), EngineError> {
        if self.selected.is_none() {
            return Err(EngineError::SelectionRequired);
        }
        self.pending = Some(TrayAction { section, verb });
        Ok(())
    }

    pub fn pending(&self) -> Option<&TrayAction> {
        self.pending.as_ref()
    }

    /// At-most-once drain: a second call before a new trigger returns `None`.
    pub fn consume_pending(&mut self) -> Option<TrayAction> {
        self.pending.take()
    }
}
