use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use vfx_launcher::app_launcher::{self, DccApp};
use vfx_launcher::batch_render;
use vfx_launcher::bridge::NodeBridge;
use vfx_launcher::config::{self, Config, MissingParameterPolicy};
use vfx_launcher::error::BridgeError;
use vfx_launcher::folder_generator;
use vfx_launcher::hython::HythonTransport;
use vfx_launcher::logging;
use vfx_launcher::process_manager::PROCESS_MANAGER;
use vfx_launcher::session::Session;

#[derive(Parser)]
#[command(
    name = "vfx-launcher",
    version,
    about = "Pipeline launcher with a headless Houdini node/parameter bridge"
)]
struct Cli {
    /// Config file (default: ~/.vfx-launcher/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the per-call interpreter timeout
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    /// Fail when interpreter output has no result block
    #[arg(long, global = true)]
    strict: bool,
    /// What setting an unknown parameter does
    #[arg(long, global = true, value_enum)]
    missing_parameter: Option<MissingParameter>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum MissingParameter {
    Ignore,
    Error,
}

impl From<MissingParameter> for MissingParameterPolicy {
    fn from(value: MissingParameter) -> Self {
        match value {
            MissingParameter::Ignore => MissingParameterPolicy::Ignore,
            MissingParameter::Error => MissingParameterPolicy::Error,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LaunchTarget {
    Houdini,
    Nuke,
}

impl From<LaunchTarget> for DccApp {
    fn from(value: LaunchTarget) -> Self {
        match value {
            LaunchTarget::Houdini => DccApp::Houdini,
            LaunchTarget::Nuke => DccApp::Nuke,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List every node path in a .hip file
    Nodes { document: String },
    /// List the parameter names of one node
    Parms { document: String, node: String },
    /// Print the evaluated value of one parameter
    Get {
        document: String,
        node: String,
        parm: String,
    },
    /// Set one parameter and save the .hip file in place
    Set {
        document: String,
        node: String,
        parm: String,
        value: String,
    },
    /// Walk a document: nodes, then parameters of the selected node, then its value
    Inspect {
        document: String,
        /// Node to select (default: first node)
        #[arg(long)]
        node: Option<String>,
        /// Parameter to read (default: first parameter)
        #[arg(long)]
        parm: Option<String>,
        /// Write this value to the selected parameter and save
        #[arg(long)]
        set: Option<String>,
    },
    /// Create folders listed in the first column of a CSV file
    Folders {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        target: PathBuf,
    },
    /// Join render command files into one batch file
    Batch {
        #[arg(long)]
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Open Houdini or Nuke from the configured path
    Launch {
        #[arg(value_enum)]
        app: LaunchTarget,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current configuration as JSON
    Show,
    SetHoudini { path: String },
    SetNuke { path: String },
    /// Explicit hython override (takes precedence over the Houdini sibling)
    SetHython { path: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init();

    let orphans = PROCESS_MANAGER.cleanup_orphans();
    if orphans > 0 {
        info!(count = orphans, "Cleaned up interpreters from a previous session");
    }

    let result = run(cli);
    PROCESS_MANAGER.kill_all_processes();
    result
}

fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.clone().unwrap_or_else(config::config_path);
    let mut config = config::load_config_from(&config_file);
    if let Some(timeout_ms) = cli.timeout_ms {
        config.bridge.timeout_ms = timeout_ms;
    }
    if cli.strict {
        config.bridge.strict_output = true;
    }
    if let Some(policy) = cli.missing_parameter {
        config.bridge.missing_parameter = policy.into();
    }

    match cli.command {
        Command::Nodes { document } => {
            let bridge = bridge(&config)?;
            let nodes = bridge
                .list_nodes(config::expand_path(&document))
                .wait()
                .map_err(report)?;
            for node in nodes {
                println!("{}", node);
            }
            Ok(())
        }
        Command::Parms { document, node } => {
            let bridge = bridge(&config)?;
            let parms = bridge
                .list_parameters(config::expand_path(&document), node)
                .wait()
                .map_err(report)?;
            for parm in parms {
                println!("{}", parm);
            }
            Ok(())
        }
        Command::Get {
            document,
            node,
            parm,
        } => {
            let bridge = bridge(&config)?;
            let reading = bridge
                .get_parameter_value(config::expand_path(&document), node, parm)
                .wait()
                .map_err(report)?;
            println!("{}", reading);
            Ok(())
        }
        Command::Set {
            document,
            node,
            parm,
            value,
        } => {
            let bridge = bridge(&config)?;
            bridge
                .set_parameter_value(config::expand_path(&document), node, parm, value)
                .wait()
                .map_err(report)?;
            println!("Parameter value updated and file saved.");
            Ok(())
        }
        Command::Inspect {
            document,
            node,
            parm,
            set,
        } => {
            let bridge = bridge(&config)?;
            inspect(
                &bridge,
                &config::expand_path(&document),
                node.as_deref(),
                parm.as_deref(),
                set,
            )
        }
        Command::Folders { csv, target } => {
            let created = folder_generator::generate_from_csv(&csv, &target)?;
            println!("Created {} folder(s) under {}", created.len(), target.display());
            Ok(())
        }
        Command::Batch { output, inputs } => {
            let path = batch_render::generate_batch_file(&inputs, &output)?;
            println!("Batch file generated: {}", path.display());
            Ok(())
        }
        Command::Launch { app } => {
            let path = app_launcher::launch_application(app.into(), &config.paths)?;
            println!("Launched {}", path.display());
            Ok(())
        }
        Command::Settings { action } => settings(action, config, &config_file),
    }
}

fn bridge(config: &Config) -> Result<NodeBridge<HythonTransport>> {
    let bridge = NodeBridge::from_config(config).map_err(report)?;
    info!(
        interpreter = %bridge.transport().interpreter().display(),
        timeout_ms = config.bridge.timeout_ms,
        "Node bridge ready"
    );
    Ok(bridge)
}

/// Log a bridge failure and turn it into a user-facing error
fn report(e: BridgeError) -> anyhow::Error {
    error!(severity = ?e.severity(), error = %e, "Bridge call failed");
    let message = e.user_message();
    anyhow::Error::new(e).context(message)
}

/// Interactive-style walk through a document, driven by the session model
fn inspect(
    bridge: &NodeBridge<HythonTransport>,
    document: &Path,
    node: Option<&str>,
    parm: Option<&str>,
    set: Option<String>,
) -> Result<()> {
    let start = Instant::now();
    let mut session = Session::new();
    session.set_document(document);

    let nodes = bridge.list_nodes(document).wait().map_err(report)?;
    session.apply_nodes(document, nodes);
    if let Some(node) = node {
        if !session.select_node(node) {
            bail!("Node {} not found in {}", node, document.display());
        }
    }

    for listed in session.nodes() {
        let marker = if Some(listed.as_str()) == session.selected_node() {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, listed);
    }

    let Some(selected) = session.selected_node().map(str::to_string) else {
        println!("No nodes found.");
        return Ok(());
    };

    let parms = bridge
        .list_parameters(document, selected.as_str())
        .wait()
        .map_err(report)?;
    session.apply_parameters(document, &selected, parms);
    if let Some(parm) = parm {
        if !session.select_parameter(parm) {
            bail!("Parameter {} not found on {}", parm, selected);
        }
    }
    println!("Parameters of {}: {}", selected, session.parameter_names().join(", "));

    if let Some(value) = set {
        session.set_pending_value(value);
        let edit = session.edit()?;
        bridge
            .set_parameter_value(
                edit.document.clone(),
                edit.node.as_str(),
                edit.parameter.as_str(),
                edit.value.as_str(),
            )
            .wait()
            .map_err(report)?;
        session.apply_saved(&edit);
        println!("Parameter value updated and file saved.");
    } else if let Some(parameter) = session.selected_parameter().map(str::to_string) {
        let reading = bridge
            .get_parameter_value(document, selected.as_str(), parameter.as_str())
            .wait()
            .map_err(report)?;
        session.apply_value(document, &selected, &parameter, reading);
    }

    if let (Some(parameter), Some(value)) = (session.selected_parameter(), session.last_value()) {
        println!("Parameter Value: {} = {}", parameter, value);
    }

    logging::log_perf("inspect", start.elapsed().as_millis() as u64, 30_000);
    Ok(())
}

fn settings(action: SettingsAction, mut config: Config, config_file: &Path) -> Result<()> {
    match action {
        SettingsAction::Show => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to render config")?
            );
            return Ok(());
        }
        SettingsAction::SetHoudini { path } => config.paths.houdini = Some(path),
        SettingsAction::SetNuke { path } => config.paths.nuke = Some(path),
        SettingsAction::SetHython { path } => config.paths.hython = Some(path),
    }

    config::save_config(&config, config_file)?;
    println!("Settings saved to {}", config_file.display());
    Ok(())
}
