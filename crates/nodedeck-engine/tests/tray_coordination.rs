use nodedeck_core::{NodeConfig, NodeInfo, NodeStatus, TraySection, TrayVerb, TriggerPayload};
use nodedeck_engine::{
    BackendFailure, CoordinationEngine, EngineOptions, LocalTrayTransport, NodeBackend,
    TriggerListener, TRIGGER_EVENT,
};
use std::collections::BTreeMap;

/// In-memory backend sufficient for driving the full trigger path.
#[derive(Default)]
struct ScriptedBackend {
    nodes: BTreeMap<String, NodeInfo>,
}

impl ScriptedBackend {
    fn seeded(names: &[&str]) -> Self {
        let mut backend = Self::default();
        for name in names {
            backend.nodes.insert(
                name.to_string(),
                NodeInfo {
                    name: name.to_string(),
                    status: NodeStatus::Stopped,
                    config: NodeConfig {
                        server_port: 2428,
                        swarm_port: 2528,
                        run_on_startup: false,
                    },
                },
            );
        }
        backend
    }
}

impl NodeBackend for ScriptedBackend {
    fn create(&mut self, name: &str, config: &NodeConfig) -> Result<NodeInfo, BackendFailure> {
        let node = NodeInfo {
            name: name.to_string(),
            status: NodeStatus::Stopped,
            config: *config,
        };
        self.nodes.insert(name.to_string(), node.clone());
        Ok(node)
    }

    fn apply_config(
        &mut self,
        name: &str,
        config: &NodeConfig,
    ) -> Result<NodeInfo, BackendFailure> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| BackendFailure::Failed("missing".to_string()))?;
        node.config = *config;
        Ok(node.clone())
    }

    fn start(&mut self, name: &str) -> Result<NodeInfo, BackendFailure> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| BackendFailure::Failed("missing".to_string()))?;
        node.status = NodeStatus::Running;
        Ok(node.clone())
    }

    fn stop(&mut self, name: &str) -> Result<NodeInfo, BackendFailure> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| BackendFailure::Failed("missing".to_string()))?;
        node.status = NodeStatus::Stopped;
        Ok(node.clone())
    }

    fn destroy(&mut self, name: &str) -> Result<(), BackendFailure> {
        self.nodes.remove(name);
        Ok(())
    }

    fn open_admin(&mut self, _name: &str) -> Result<(), BackendFailure> {
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<NodeInfo>, BackendFailure> {
        Ok(self.nodes.values().cloned().collect())
    }

    fn output(&mut self, _name: &str) -> Result<String, BackendFailure> {
        Ok(String::new())
    }

    fn send_input(&mut self, _name: &str, _line: &str) -> Result<(), BackendFailure> {
        Ok(())
    }
}

fn trigger(node: &str, section: TraySection, action: TrayVerb) -> TriggerPayload {
    TriggerPayload {
        node_name: node.to_string(),
        section,
        action,
    }
}

#[tokio::test]
async fn tray_trigger_drives_selection_and_dispatch_end_to_end() {
    let mut engine = CoordinationEngine::new(
        Box::new(ScriptedBackend::seeded(&["alpha", "beta"])),
        EngineOptions::default(),
    );
    engine.refresh().expect("initial refresh");

    let transport = LocalTrayTransport::new();
    let (mut listener, mut rx) =
        TriggerListener::subscribe(&transport, TRIGGER_EVENT).expect("subscribe");

    // Tray asks to start beta, then merely reveal alpha.
    transport.emit(
        TRIGGER_EVENT,
        trigger("beta", TraySection::Controls, TrayVerb::Start),
    );
    transport.emit(
        TRIGGER_EVENT,
        trigger("alpha", TraySection::Controls, TrayVerb::Show),
    );
    listener.teardown();

    while let Some(payload) = rx.recv().await {
        engine.apply_trigger(payload).expect("apply trigger");

        // The shell consumes the pending action exactly once and feeds it
        // back into the dispatcher.
        if let Some(action) = engine.consume_pending_action() {
            let target = engine.selected().expect("selection set").to_string();
            match (action.section, &action.verb) {
                (TraySection::Controls, TrayVerb::Start) => {
                    engine.start(&target).expect("start");
                }
                other => panic!("unexpected tray action: {other:?}"),
            }
        }
    }

    // beta was started by its trigger; alpha's reveal changed only selection.
    let beta = engine
        .nodes()
        .iter()
        .find(|node| node.name == "beta")
        .expect("beta");
    assert_eq!(beta.status, NodeStatus::Running);
    assert_eq!(engine.selected(), Some("alpha"));
    assert!(engine.pending_action().is_none());
}

#[tokio::test]
async fn delete_trigger_clears_selection_through_the_full_path() {
    let mut engine = CoordinationEngine::new(
        Box::new(ScriptedBackend::seeded(&["alpha"])),
        EngineOptions::default(),
    );
    engine.refresh().expect("initial refresh");

    let transport = LocalTrayTransport::new();
    let (mut listener, mut rx) =
        TriggerListener::subscribe(&transport, TRIGGER_EVENT).expect("subscribe");

    transport.emit(
        TRIGGER_EVENT,
        trigger("alpha", TraySection::Delete, TrayVerb::Delete),
    );
    listener.teardown();

    while let Some(payload) = rx.recv().await {
        engine.apply_trigger(payload).expect("apply trigger");
        if let Some(action) = engine.consume_pending_action() {
            assert_eq!(action.section, TraySection::Delete);
            let target = engine.selected().expect("selection set").to_string();
            engine.delete(&target).expect("delete");
        }
    }

    assert!(engine.nodes().is_empty());
    assert!(engine.selected().is_none());
    assert!(engine.pending_action().is_none());
}
