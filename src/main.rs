use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::config::WeftConfig;
use weft_core::event::EventBus;
use weft_core::schema::{Record, TypeTag};
use weft_core::traits::{NodeOutputs, PartialRun};
use weft_core::workflow::{LoopSubworkflowDefinition, WorkflowDefinition};
use weft_engine::{ExecutionPlan, WorkflowExecutor};
use weft_nodes::NodeRegistry;

#[derive(Parser)]
#[command(name = "weft", version, about = "Node-based workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "weft.toml", env = "WEFT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow file and construct every node
    Validate {
        /// Workflow JSON file
        file: PathBuf,
        /// Also check it is usable as a loop body
        #[arg(long = "loop")]
        as_loop: bool,
    },
    /// Execute a workflow and print every node output
    Run {
        /// Workflow JSON file
        file: PathBuf,
        /// JSON object fed to the InputNode
        #[arg(long, default_value = "{}")]
        input: String,
        /// Stop once this node's output is known
        #[arg(long)]
        target: Option<String>,
        /// Print workflow events to stderr after the run
        #[arg(long)]
        events: bool,
    },
    /// List the type tag vocabulary
    Types,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        WeftConfig::load(&cli.config)?
    } else {
        WeftConfig::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if !cli.config.exists() {
        warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    let registry = Arc::new(NodeRegistry::with_builtins());

    match cli.command {
        Commands::Validate { file, as_loop } => {
            let workflow = read_workflow(&file)?;
            if as_loop {
                LoopSubworkflowDefinition::new(workflow.clone())?;
            }
            ExecutionPlan::build(&workflow, &registry)?;
            println!(
                "{}: ok ({} nodes, {} links)",
                file.display(),
                workflow.nodes.len(),
                workflow.links.len()
            );
        }
        Commands::Run {
            file,
            input,
            target,
            events,
        } => {
            let workflow = read_workflow(&file)?;
            let parsed: serde_json::Value =
                serde_json::from_str(&input).context("--input must be JSON")?;
            let seed: Record = match parsed {
                serde_json::Value::Object(map) => map,
                other => bail!("--input must be a JSON object, got {}", other),
            };
            let input_id = match workflow.input_node() {
                Some(node) => node.id.clone(),
                None => bail!("workflow has no InputNode"),
            };

            let bus = Arc::new(EventBus::new(config.engine.event_capacity));
            let mut rx = bus.subscribe();
            let executor = WorkflowExecutor::with_events(registry, config.engine.clone(), bus);

            info!(file = %file.display(), "Running workflow");
            let outputs = match target {
                Some(target) => {
                    let request = PartialRun::new(target)
                        .rerun_predecessors(true)
                        .seed(input_id, seed);
                    executor.run_partial(&workflow, request).await?
                }
                None => {
                    executor
                        .run(&workflow, NodeOutputs::from([(input_id, seed)]))
                        .await?
                }
            };

            if events {
                while let Ok(event) = rx.try_recv() {
                    eprintln!("{}", serde_json::to_string(&event)?);
                }
            }
            let sorted: BTreeMap<_, _> = outputs.into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&sorted)?);
        }
        Commands::Types => {
            for tag in TypeTag::all() {
                println!("{}", tag);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn read_workflow(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let workflow: WorkflowDefinition = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(workflow)
}
