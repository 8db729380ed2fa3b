use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialog_engine::{DialogSession, EngineConfig, TriggerInvocation};
use dialog_paths::{
    combine_scope_with_indices, get_dependency_values, get_indices_from_data_paths,
    scope_to_data_paths, ArrayIdentityRegistry,
};
use dialog_protocol::{serialize_json, update_result_schema, InitialPayload};
use serde_json::{json, Value};

use crate::replay::{parse_change, CollectedAlerts, ReplayTransport};

mod replay;

#[derive(Parser)]
#[command(name = "dialog-settings")]
#[command(about = "Inspect settings-dialog scopes and replay update resolution offline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log errors only (stdout is reserved for JSON)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a scope into data-path segments
    #[command(name = "data-paths")]
    DataPaths(ScopeArgs),

    /// Concrete data paths of a scope at the given array indices
    Combine(CombineArgs),

    /// Match a concrete data path against candidate scopes
    #[command(name = "match-path")]
    MatchPath(MatchPathArgs),

    /// Dependency values of a scope in a settings document
    Dependencies(DependenciesArgs),

    /// JSON schema of an update result
    Schema,

    /// Open a dialog offline, apply edits and triggers, print the outcome
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ScopeArgs {
    /// Scope, e.g. #/properties/model/properties/rows/items/properties/name
    scope: String,
}

#[derive(Args)]
struct CombineArgs {
    scope: String,

    /// Array indices, outermost first (comma-separated)
    #[arg(long, value_delimiter = ',')]
    indices: Vec<usize>,
}

#[derive(Args)]
struct MatchPathArgs {
    /// Concrete data path, e.g. model.rows.2.name
    path: String,

    /// Candidate scope (repeatable)
    #[arg(long = "scope", required = true)]
    scopes: Vec<String>,
}

#[derive(Args)]
struct DependenciesArgs {
    /// Settings document (JSON)
    #[arg(long)]
    data: PathBuf,

    #[arg(long)]
    scope: String,

    /// Pinned array indices, outermost first (comma-separated)
    #[arg(long, value_delimiter = ',')]
    indices: Vec<usize>,
}

#[derive(Args)]
struct ReplayArgs {
    /// Initial dialog payload (JSON)
    #[arg(long)]
    payload: PathBuf,

    /// Recorded backend responses, a JSON array answered in call order
    #[arg(long)]
    responses: Option<PathBuf>,

    /// User edit PATH=VALUE (repeatable, applied in order before triggers)
    #[arg(long = "change")]
    changes: Vec<String>,

    /// Trigger id to fire (repeatable)
    #[arg(long = "fire")]
    fire: Vec<String>,

    /// Settings id the fired triggers belong to
    #[arg(long)]
    settings_id: Option<String>,

    /// Cascade generations resolved per edit (overrides DIALOG_MAX_CASCADE_DEPTH)
    #[arg(long)]
    max_cascade_depth: Option<usize>,

    /// Backend call timeout in ms, 0 disables (overrides DIALOG_BACKEND_TIMEOUT_MS)
    #[arg(long)]
    backend_timeout_ms: Option<u64>,

    /// Include the recorded backend calls in the output
    #[arg(long)]
    calls: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::DataPaths(args) => {
            let paths = scope_to_data_paths(&args.scope)
                .with_context(|| format!("Invalid scope {}", args.scope))?;
            println!("{}", serialize_json(&paths)?);
        }
        Commands::Combine(args) => {
            let paths = combine_scope_with_indices(&args.scope, &args.indices)
                .with_context(|| format!("Invalid scope {}", args.scope))?;
            println!("{}", serialize_json(&paths)?);
        }
        Commands::MatchPath(args) => run_match_path(args)?,
        Commands::Dependencies(args) => run_dependencies(args)?,
        Commands::Schema => println!("{}", serialize_json(&update_result_schema())?),
        Commands::Replay(args) => run_replay(args).await?,
    }

    Ok(())
}

fn run_match_path(args: MatchPathArgs) -> Result<()> {
    let candidates = args
        .scopes
        .iter()
        .map(|scope| {
            scope_to_data_paths(scope).with_context(|| format!("Invalid scope {scope}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let output = match get_indices_from_data_paths(&candidates, &args.path) {
        Some(matched) => json!({
            "indices": matched.indices,
            "dataPaths": matched.data_paths,
        }),
        None => Value::Null,
    };
    println!("{}", serialize_json(&output)?);
    Ok(())
}

fn run_dependencies(args: DependenciesArgs) -> Result<()> {
    let data = read_json(&args.data)?;
    let mut registry = ArrayIdentityRegistry::new();
    let values = get_dependency_values(&data, &args.scope, &args.indices, &mut registry)
        .with_context(|| format!("Invalid scope {}", args.scope))?;
    println!("{}", serialize_json(&values)?);
    Ok(())
}

async fn run_replay(args: ReplayArgs) -> Result<()> {
    let payload: InitialPayload = serde_json::from_value(read_json(&args.payload)?)
        .context("Invalid dialog payload")?;
    let transport = Arc::new(match &args.responses {
        Some(path) => ReplayTransport::from_file(path)?,
        None => ReplayTransport::default(),
    });
    let alerts = Arc::new(CollectedAlerts::default());

    let mut config = EngineConfig::from_env();
    if let Some(depth) = args.max_cascade_depth {
        config.max_cascade_depth = depth.max(1);
    }
    if let Some(ms) = args.backend_timeout_ms {
        config.backend_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }

    let session = DialogSession::open(payload, transport.clone(), alerts.clone(), config)
        .await
        .context("Failed to open dialog")?;

    for raw in &args.changes {
        let (path, value) = parse_change(raw)?;
        session
            .set_value(&path, value)
            .await
            .with_context(|| format!("Failed to set {path}"))?;
    }
    for id in &args.fire {
        let mut invocation = TriggerInvocation::new(id.as_str());
        if let Some(settings_id) = &args.settings_id {
            invocation = invocation.with_settings_id(settings_id.as_str());
        }
        session
            .fire_trigger(invocation)
            .await
            .with_context(|| format!("Failed to fire trigger {id}"))?;
    }

    let unused = transport.remaining();
    if unused > 0 {
        log::warn!("{unused} recorded responses were not consumed");
    }

    let mut output = json!({
        "data": session.data(),
        "alerts": alerts.take(),
    });
    if args.calls {
        output["calls"] = serde_json::to_value(transport.calls())?;
    }
    println!("{}", serialize_json(&output)?);
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}
