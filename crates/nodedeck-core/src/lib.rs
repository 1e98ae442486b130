use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod trigger;

pub use trigger::{
    parse_trigger_line, TrayAction, TraySection, TrayVerb, TriggerFrameError, TriggerPayload,
    DEFAULT_MAX_TRIGGER_LINE_BYTES,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Stopped,
    Running,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Stopped
    }
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Stopped => "stopped",
            NodeStatus::Running => "running",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, NodeStatus::Running)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "stopped" => Ok(NodeStatus::Stopped),
            "running" => Ok(NodeStatus::Running),
            other => Err(format!("Unknown node status: {other}")),
        }
    }
}

/// Ports and startup behavior of a managed node. The backend owns the
/// on-disk representation; this is the manager's view of it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub server_port: u16,
    pub swarm_port: u16,
    #[serde(default)]
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub status: NodeStatus,
    pub config: NodeConfig,
}

impl NodeInfo {
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn admin_url(&self) -> String {
        format!("http://127.0.0.1:{}/admin", self.config.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_status_round_trips_through_strings() {
        assert_eq!("running".parse::<NodeStatus>(), Ok(NodeStatus::Running));
        assert_eq!(" Stopped ".parse::<NodeStatus>(), Ok(NodeStatus::Stopped));
        assert!("paused".parse::<NodeStatus>().is_err());
        assert_eq!(NodeStatus::Running.to_string(), "running");
    }

    #[test]
    fn node_config_defaults_run_on_startup_to_false() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"server_port": 2428, "swarm_port": 2528}"#).expect("parse");
        assert_eq!(config.server_port, 2428);
        assert!(!config.run_on_startup);
    }

    #[test]
    fn admin_url_points_at_server_port() {
        let node = NodeInfo {
            name: "alpha".to_string(),
            status: NodeStatus::Running,
            config: NodeConfig {
                server_port: 2428,
                swarm_port: 2528,
                run_on_startup: false,
            },
        };
        assert_eq!(node.admin_url(), "http://127.0.0.1:2428/admin");
    }
}
