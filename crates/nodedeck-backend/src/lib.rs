//! Process-spawning node backend.
//!
//! Each node is a directory under the nodes home holding a `config.toml`
//! with its server and swarm ports. The backend drives an external node
//! binary (`<binary> --node-name <n> --home <dir> init|run`), tracks the
//! processes it spawned, captures their output with ANSI escapes
//! stripped, and keeps the run-on-startup flags in a locked JSON settings
//! file.

use nodedeck_core::{NodeConfig, NodeInfo, NodeStatus};
use nodedeck_engine::{BackendFailure, NodeBackend};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, warn};

mod settings;

pub use settings::{Settings, SettingsStore};

const CONFIG_FILE: &str = "config.toml";
const ANSI_PATTERN: &str = r"\x1b\[[0-9;?]*[ -/]*[@-~]";

struct NodeProcess {
    child: Child,
    stdin: Sender<String>,
    output: Arc<Mutex<String>>,
}

pub struct ProcessBackend {
    home: PathBuf,
    binary: PathBuf,
    settings: SettingsStore,
    ansi: Regex,
    processes: HashMap<String, NodeProcess>,
}

impl ProcessBackend {
    pub fn new(home: impl Into<PathBuf>, binary: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            settings: SettingsStore::new(&home),
            home,
            binary: binary.into(),
            ansi: Regex::new(ANSI_PATTERN).expect("valid ansi pattern"),
            processes: HashMap::new(),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn node_dir(&self, name: &str) -> PathBuf {
        self.home.join(name)
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.node_dir(name).join(CONFIG_FILE)
    }

    fn node_info(&self, name: &str) -> Result<NodeInfo, BackendFailure> {
        let (server_port, swarm_port) = read_ports(&self.config_path(name))?;
        let status = if self.processes.contains_key(name) {
            NodeStatus::Running
        } else {
            NodeStatus::Stopped
        };
        Ok(NodeInfo {
            name: name.to_string(),
            status,
            config: NodeConfig {
                server_port,
                swarm_port,
                run_on_startup: self.settings.run_on_startup(name),
            },
        })
    }

    /// Drop the tracked process if its child has exited on its own, so a
    /// crashed node reads as stopped and can be started again.
    fn prune_exited(&mut self, name: &str) {
        let Some(process) = self.processes.get_mut(name) else {
            return;
        };
        match process.child.try_wait() {
            Ok(Some(status)) => {
                warn!(node = %name, "node process exited on its own: {status}");
                self.processes.remove(name);
            }
            Ok(None) => {}
            Err(err) => warn!(node = %name, "failed to poll node process: {err}"),
        }
    }

    fn run_init(&self, name: &str, config: &NodeConfig) -> Result<(), BackendFailure> {
        let home = path_str(&self.home)?;
        let output = Command::new(&self.binary)
            .args([
                "--node-name",
                name,
                "--home",
                home,
                "init",
                "--server-port",
                &config.server_port.to_string(),
                "--swarm-port",
                &config.swarm_port.to_string(),
            ])
            .output()
            .map_err(|err| BackendFailure::Failed(format!("failed to run node init: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendFailure::Failed(format!(
                "node init exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl NodeBackend for ProcessBackend {
    fn create(&mut self, name: &str, config: &NodeConfig) -> Result<NodeInfo, BackendFailure> {
        validate_config(config)?;
        let dir = self.node_dir(name);
        if dir.exists() {
            return Err(BackendFailure::Failed(format!(
                "node directory already exists: {}",
                dir.display()
            )));
        }
        fs::create_dir_all(&self.home)
            .map_err(|err| BackendFailure::Failed(format!("failed to create nodes home: {err}")))?;

        self.run_init(name, config)?;

        // The binary may or may not have materialized a config; the manager
        // keeps its own authoritative copy of the ports either way.
        fs::create_dir_all(&dir)
            .map_err(|err| BackendFailure::Failed(format!("failed to create node dir: {err}")))?;
        write_ports(&self.config_path(name), config.server_port, config.swarm_port)?;
        self.settings.set_run_on_startup(name, config.run_on_startup)?;

        self.node_info(name)
    }

    fn apply_config(
        &mut self,
        name: &str,
        config: &NodeConfig,
    ) -> Result<NodeInfo, BackendFailure> {
        validate_config(config)?;
        let path = self.config_path(name);
        if !path.exists() {
            return Err(BackendFailure::Failed(format!(
                "no config for node '{name}' at {}",
                path.display()
            )));
        }
        update_ports(&path, config.server_port, config.swarm_port)?;
        self.settings.set_run_on_startup(name, config.run_on_startup)?;
        self.node_info(name)
    }

    fn start(&mut self, name: &str) -> Result<NodeInfo, BackendFailure> {
        self.prune_exited(name);
        if self.processes.contains_key(name) {
            return Err(BackendFailure::Failed(format!(
                "node '{name}' already has a tracked process"
            )));
        }
        let (server_port, swarm_port) = read_ports(&self.config_path(name))?;
        check_port_free(server_port)?;
        check_port_free(swarm_port)?;

        let home = path_str(&self.home)?.to_string();
        let mut child = Command::new(&self.binary)
            .args(["--node-name", name, "--home", &home, "run"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| BackendFailure::Failed(format!("failed to spawn node: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendFailure::Failed("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendFailure::Failed("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendFailure::Failed("failed to capture stderr".to_string()))?;

        let (input_tx, input_rx) = mpsc::channel::<String>();
        thread::spawn({
            let name = name.to_string();
            move || {
                let mut stdin = stdin;
                for line in input_rx {
                    if writeln!(stdin, "{line}").is_err() {
                        warn!(node = %name, "stdin of node process closed");
                        break;
                    }
                }
            }
        });

        let output = Arc::new(Mutex::new(String::new()));
        thread::spawn({
            let output = Arc::clone(&output);
            let ansi = self.ansi.clone();
            let name = name.to_string();
            move || {
                let stdout_lines = BufReader::new(stdout).lines();
                let stderr_lines = BufReader::new(stderr).lines();
                for line in stdout_lines.chain(stderr_lines) {
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            warn!(node = %name, "failed to read node output: {err}");
                            break;
                        }
                    };
                    let cleaned = ansi.replace_all(&line, "");
                    if let Ok(mut buffer) = output.lock() {
                        buffer.push_str(&cleaned);
                        buffer.push('\n');
                    }
                }
                debug!(node = %name, "node output stream closed");
            }
        });

        self.processes.insert(
            name.to_string(),
            NodeProcess {
                child,
                stdin: input_tx,
                output,
            },
        );
        self.node_info(name)
    }

    fn stop(&mut self, name: &str) -> Result<NodeInfo, BackendFailure> {
        let mut process = self.processes.remove(name).ok_or_else(|| {
            BackendFailure::Failed(format!("no tracked process for node '{name}'"))
        })?;
        if let Err(err) = process.child.kill() {
            warn!(node = %name, "kill failed (process may have exited): {err}");
        }
        let _ = process.child.wait();
        self.node_info(name)
    }

    fn destroy(&mut self, name: &str) -> Result<(), BackendFailure> {
        if self.processes.contains_key(name) {
            let _ = self.stop(name);
        }
        let dir = self.node_dir(name);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|err| {
                BackendFailure::Failed(format!("failed to remove node dir: {err}"))
            })?;
        }
        self.settings.remove(name)
    }

    fn open_admin(&mut self, name: &str) -> Result<(), BackendFailure> {
        let (server_port, _) = read_ports(&self.config_path(name))?;
        let url = format!("http://127.0.0.1:{server_port}/admin");
        open_in_browser(&url)
    }

    fn list(&mut self) -> Result<Vec<NodeInfo>, BackendFailure> {
        if !self.home.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.home)
            .map_err(|err| BackendFailure::Unavailable(format!("failed to read nodes home: {err}")))?;

        let mut nodes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                BackendFailure::Unavailable(format!("failed to read nodes home entry: {err}"))
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !entry.path().join(CONFIG_FILE).exists() {
                continue;
            }
            self.prune_exited(&name);
            match self.node_info(&name) {
                Ok(node) => nodes.push(node),
                Err(err) => warn!(node = %name, "skipping unreadable node: {err}"),
            }
        }
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    fn output(&mut self, name: &str) -> Result<String, BackendFailure> {
        let process = self.processes.get(name).ok_or_else(|| {
            BackendFailure::Failed(format!("no tracked process for node '{name}'"))
        })?;
        let buffer = process
            .output
            .lock()
            .map_err(|_| BackendFailure::Failed("output buffer lock poisoned".to_string()))?;
        Ok(buffer.clone())
    }

    fn send_input(&mut self, name: &str, line: &str) -> Result<(), BackendFailure> {
        let process = self.processes.get(name).ok_or_else(|| {
            BackendFailure::Failed(format!("no tracked process for node '{name}'"))
        })?;
        process
            .stdin
            .send(line.to_string())
            .map_err(|err| BackendFailure::Failed(format!("failed to queue input: {err}")))
    }
}

fn validate_config(config: &NodeConfig) -> Result<(), BackendFailure> {
    if config.server_port == 0 || config.swarm_port == 0 {
        return Err(BackendFailure::InvalidConfig(
            "ports must be nonzero".to_string(),
        ));
    }
    if config.server_port == config.swarm_port {
        return Err(BackendFailure::InvalidConfig(format!(
            "server and swarm ports collide on {}",
            config.server_port
        )));
    }
    Ok(())
}

fn check_port_free(port: u16) -> Result<(), BackendFailure> {
    TcpListener::bind(("127.0.0.1", port))
        .map(|_| ())
        .map_err(|err| BackendFailure::Failed(format!("port {port} is not available: {err}")))
}

fn path_str(path: &Path) -> Result<&str, BackendFailure> {
    path.to_str()
        .ok_or_else(|| BackendFailure::Failed(format!("non-utf8 path: {}", path.display())))
}

fn read_ports(path: &Path) -> Result<(u16, u16), BackendFailure> {
    let raw = fs::read_to_string(path)
        .map_err(|err| BackendFailure::Failed(format!("failed to read node config: {err}")))?;
    let value: toml::Value = toml::from_str(&raw)
        .map_err(|err| BackendFailure::Failed(format!("failed to parse node config: {err}")))?;
    let server = section_port(&value, "server")?;
    let swarm = section_port(&value, "swarm")?;
    Ok((server, swarm))
}

fn section_port(value: &toml::Value, section: &str) -> Result<u16, BackendFailure> {
    value
        .get(section)
        .and_then(|table| table.get("port"))
        .and_then(toml::Value::as_integer)
        .and_then(|port| u16::try_from(port).ok())
        .ok_or_else(|| {
            BackendFailure::Failed(format!("node config is missing [{section}] port"))
        })
}

fn write_ports(path: &Path, server_port: u16, swarm_port: u16) -> Result<(), BackendFailure> {
    let document = format!("[server]\nport = {server_port}\n\n[swarm]\nport = {swarm_port}\n");
    fs::write(path, document)
        .map_err(|err| BackendFailure::Failed(format!("failed to write node config: {err}")))
}

/// Rewrite only the port keys, keeping whatever else the node binary put
/// in its config.
fn update_ports(path: &Path, server_port: u16, swarm_port: u16) -> Result<(), BackendFailure> {
    let raw = fs::read_to_string(path)
        .map_err(|err| BackendFailure::Failed(format!("failed to read node config: {err}")))?;
    let mut value: toml::Value = toml::from_str(&raw)
        .map_err(|err| BackendFailure::Failed(format!("failed to parse node config: {err}")))?;

    set_section_port(&mut value, "server", server_port);
    set_section_port(&mut value, "swarm", swarm_port);

    let updated = toml::to_string(&value)
        .map_err(|err| BackendFailure::Failed(format!("failed to serialize node config: {err}")))?;
    fs::write(path, updated)
        .map_err(|err| BackendFailure::Failed(format!("failed to write node config: {err}")))
}

fn set_section_port(value: &mut toml::Value, section: &str, port: u16) {
    let Some(table) = value.as_table_mut() else {
        return;
    };
    let entry = table
        .entry(section.to_string())
        .or_insert_with(|| toml::Value::Table(Default::default()));
    if let Some(section_table) = entry.as_table_mut() {
        section_table.insert("port".to_string(), toml::Value::Integer(i64::from(port)));
    }
}

fn open_in_browser(url: &str) -> Result<(), BackendFailure> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    };
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", url]);
        cmd
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    };

    command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|err| BackendFailure::Failed(format!("failed to open {url}: {err}")))
}
