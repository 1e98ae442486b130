use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nodedeck_backend::ProcessBackend;
use nodedeck_core::{
    parse_trigger_line, NodeConfig, NodeInfo, TraySection, TrayVerb,
    DEFAULT_MAX_TRIGGER_LINE_BYTES,
};
use nodedeck_engine::{
    CoordinationEngine, EngineOptions, LocalTrayTransport, TriggerListener, TRIGGER_EVENT,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nodedeck-ctl", about = "Manage local nodes and bridge tray triggers")]
struct Args {
    /// Nodes home directory. Defaults to the platform data dir.
    #[arg(long)]
    home: Option<PathBuf>,
    /// Node binary the backend drives.
    #[arg(long, default_value = "noded")]
    binary: PathBuf,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List known nodes with status.
    List,
    /// Initialize a new node and select it.
    Init {
        name: String,
        #[arg(long, default_value_t = 2428)]
        server_port: u16,
        #[arg(long, default_value_t = 2528)]
        swarm_port: u16,
        #[arg(long, default_value_t = false)]
        run_on_startup: bool,
    },
    /// Update an existing node's configuration.
    Config {
        name: String,
        #[arg(long)]
        server_port: u16,
        #[arg(long)]
        swarm_port: u16,
        #[arg(long, default_value_t = false)]
        run_on_startup: bool,
    },
    /// Destroy a node and its on-disk state.
    Delete { name: String },
    /// Run a cockpit session: NDJSON tray triggers arrive on stdin, slash
    /// commands (/refresh, /start, /stop, /logs, /input, /open, /quit)
    /// drive the dispatcher directly.
    Serve,
}

/// Direct session commands, parsed from `/`-prefixed stdin lines.
#[derive(Debug)]
enum SessionCommand {
    Refresh,
    Start(String),
    Stop(String),
    Open(String),
    Logs(String),
    Input(String, String),
    Quit,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let home = match args.home.clone() {
        Some(home) => home,
        None => dirs::data_dir()
            .context("no platform data dir; pass --home")?
            .join("nodedeck")
            .join("nodes"),
    };
    info!(home = %home.display(), binary = %args.binary.display(), "starting");

    let backend = ProcessBackend::new(&home, &args.binary);
    let mut engine = CoordinationEngine::new(Box::new(backend), EngineOptions::default());
    engine.refresh().context("failed to load node list")?;

    match args.command {
        CliCommand::List => {
            if engine.nodes().is_empty() {
                println!("no nodes");
            }
            for node in engine.nodes() {
                print_node(node);
            }
            Ok(())
        }
        CliCommand::Init {
            name,
            server_port,
            swarm_port,
            run_on_startup,
        } => {
            let node = engine
                .initialize(
                    &name,
                    &NodeConfig {
                        server_port,
                        swarm_port,
                        run_on_startup,
                    },
                )
                .with_context(|| format!("failed to initialize node '{name}'"))?;
            print_node(&node);
            Ok(())
        }
        CliCommand::Config {
            name,
            server_port,
            swarm_port,
            run_on_startup,
        } => {
            let node = engine
                .config_update(
                    &name,
                    &NodeConfig {
                        server_port,
                        swarm_port,
                        run_on_startup,
                    },
                )
                .with_context(|| format!("failed to update node '{name}'"))?;
            print_node(&node);
            Ok(())
        }
        CliCommand::Delete { name } => {
            engine
                .delete(&name)
                .with_context(|| format!("failed to delete node '{name}'"))?;
            println!("deleted {name}");
            Ok(())
        }
        CliCommand::Serve => serve(engine),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn serve(mut engine: CoordinationEngine) -> Result<()> {
    let transport = LocalTrayTransport::new();
    let (mut listener, mut triggers) = TriggerListener::subscribe(&transport, TRIGGER_EVENT)
        .context("tray trigger subscription failed")?;

    let (command_tx, mut commands) = mpsc::unbounded_channel::<SessionCommand>();
    let stdin_task = tokio::spawn(read_stdin(transport.clone(), command_tx));

    println!("session ready; feed tray triggers as NDJSON, /quit to exit");
    loop {
        tokio::select! {
            maybe_trigger = triggers.recv() => {
                let Some(payload) = maybe_trigger else { break };
                let node = payload.node_name.clone();
                match engine.apply_trigger(payload) {
                    Ok(()) => {
                        info!(node = %node, "trigger applied");
                        dispatch_pending(&mut engine);
                    }
                    Err(err) => warn!(node = %node, "trigger dropped: {err}"),
                }
            }
            maybe_command = commands.recv() => {
                let Some(command) = maybe_command else { break };
                if matches!(command, SessionCommand::Quit) {
                    break;
                }
                run_session_command(&mut engine, command);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    listener.teardown();
    stdin_task.abort();
    Ok(())
}

async fn read_stdin(
    transport: LocalTrayTransport,
    commands: mpsc::UnboundedSender<SessionCommand>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('/') {
            match parse_session_command(rest) {
                Some(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                None => warn!(line = %trimmed, "unrecognized session command"),
            }
            continue;
        }
        match parse_trigger_line(trimmed, DEFAULT_MAX_TRIGGER_LINE_BYTES) {
            Ok(payload) => {
                transport.emit(TRIGGER_EVENT, payload);
            }
            Err(err) => warn!("ignoring trigger line: {err}"),
        }
    }
}

fn parse_session_command(rest: &str) -> Option<SessionCommand> {
    let mut parts = rest.splitn(3, ' ');
    let verb = parts.next()?;
    match verb {
        "refresh" => Some(SessionCommand::Refresh),
        "quit" => Some(SessionCommand::Quit),
        "start" => Some(SessionCommand::Start(parts.next()?.to_string())),
        "stop" => Some(SessionCommand::Stop(parts.next()?.to_string())),
        "open" => Some(SessionCommand::Open(parts.next()?.to_string())),
        "logs" => Some(SessionCommand::Logs(parts.next()?.to_string())),
        "input" => {
            let name = parts.next()?.to_string();
            let line = parts.next().unwrap_or_default().to_string();
            Some(SessionCommand::Input(name, line))
        }
        _ => None,
    }
}

fn run_session_command(engine: &mut CoordinationEngine, command: SessionCommand) {
    let outcome = match command {
        SessionCommand::Refresh => engine.refresh().map(|()| {
            for node in engine.nodes() {
                print_node(node);
            }
        }),
        SessionCommand::Start(name) => engine.start(&name).map(|node| print_node(&node)),
        SessionCommand::Stop(name) => engine.stop(&name).map(|node| print_node(&node)),
        SessionCommand::Open(name) => engine.open_admin_dashboard(&name),
        SessionCommand::Logs(name) => engine.node_output(&name).map(|output| {
            println!("{output}");
        }),
        SessionCommand::Input(name, line) => engine.send_input(&name, &line),
        SessionCommand::Quit => Ok(()),
    };
    if let Err(err) = outcome {
        warn!("{err}");
    }
}

/// Feed the consumed pending tray action back into the dispatcher, the
/// way the dashboard shell would.
fn dispatch_pending(engine: &mut CoordinationEngine) {
    let Some(action) = engine.consume_pending_action() else {
        return;
    };
    let Some(target) = engine.selected().map(str::to_string) else {
        return;
    };

    let outcome = match (action.section, &action.verb) {
        (TraySection::Controls, TrayVerb::Start) => engine.start(&target).map(|_| ()),
        (TraySection::Controls, TrayVerb::Stop) => engine.stop(&target).map(|_| ()),
        (TraySection::Controls, TrayVerb::Open) => engine.open_admin_dashboard(&target),
        (TraySection::Logs, _) => engine.node_output(&target).map(|output| {
            println!("{output}");
        }),
        (TraySection::Delete, _) => engine.delete(&target),
        (TraySection::Config, _) => {
            // No config form in a headless session; show the current one.
            if let Some(node) = engine.selected_node() {
                print_node(node);
            }
            Ok(())
        }
        (section, verb) => {
            warn!(node = %target, %section, %verb, "unhandled tray action");
            Ok(())
        }
    };
    if let Err(err) = outcome {
        warn!(node = %target, "tray action failed: {err}");
    }
}

fn print_node(node: &NodeInfo) {
    println!(
        "{:<20} {:<8} server={} swarm={} startup={}",
        node.name,
        node.status,
        node.config.server_port,
        node.config.swarm_port,
        node.config.run_on_startup
    );
}
