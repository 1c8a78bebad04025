//! Binary entry point for the graphcache replay CLI.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use graphcache::{
    network::channel::ChannelNetwork,
    schema::TypeDescriptor,
    selection::Fragment,
    CacheConfig, Callbacks, CacheError, DataId, Environment, EnvironmentConfig, Operation,
    OperationDescriptor, Response, Schema, Selector, Store, StoreOptions, Variables,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "graphcache",
    version,
    about = "Replay graph query responses through a normalized cache",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "GRAPHCACHE_CONFIG",
        value_name = "FILE",
        help = "Path to the CLI config file"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, help = "Output format for reports")]
    format: Option<OutputFormat>,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto)]
    theme: Theme,

    #[arg(
        long,
        global = true,
        value_name = "DIRECTIVES",
        help = "Tracing filter, e.g. graphcache=debug"
    )]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed a script's payloads through an environment and report snapshots
    Replay(ScriptCmd),
    /// Replay a script and print the normalized records
    Inspect(ScriptCmd),
}

#[derive(Args, Debug)]
struct ScriptCmd {
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    #[arg(long, help = "Normalize deferred and streamed selections inline")]
    no_incremental: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Replay input: one operation and the responses the network yields for it.
#[derive(Debug, Deserialize)]
struct Script {
    operation: Operation,
    #[serde(default)]
    variables: Variables,
    #[serde(default)]
    schema: Option<Vec<TypeDescriptor>>,
    #[serde(default)]
    selectors: Vec<ScriptSelector>,
    #[serde(default)]
    cache_config: CacheConfig,
    payloads: Vec<Response>,
}

/// Extra fragment subscription, reported next to the operation's own.
#[derive(Debug, Deserialize)]
struct ScriptSelector {
    name: String,
    data_id: DataId,
    fragment: Fragment,
}

#[derive(Clone, Debug, Serialize)]
struct SnapshotEvent {
    selector: String,
    data: Value,
    missing_data: bool,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    operation: String,
    payloads: usize,
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    revision: u64,
    records: usize,
    snapshots: Vec<SnapshotEvent>,
    #[serde(skip)]
    source: Value,
}

struct Settings {
    incremental_delivery: bool,
    id_field: String,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32, Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    init_tracing(cli.log_filter.as_deref(), config.log_filter());
    debug!(
        path = config.path().map(|path| path.display().to_string()).unwrap_or_default(),
        loaded = config.loaded(),
        "cli.config"
    );
    let format = cli
        .format
        .or_else(|| config.format())
        .unwrap_or(OutputFormat::Text);
    let ui = Ui::new(cli.theme);

    match cli.command {
        Command::Replay(cmd) => {
            let report = replay_file(&cmd, &config).await?;
            emit(format, &report, || ui.replay(&report))?;
            Ok(exit_code(&report))
        }
        Command::Inspect(cmd) => {
            let report = replay_file(&cmd, &config).await?;
            emit(format, &report.source, || ui.inspect(&report))?;
            Ok(exit_code(&report))
        }
    }
}

fn init_tracing(flag: Option<&str>, configured: Option<&str>) {
    let filter = match flag {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("warn"))),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

async fn replay_file(cmd: &ScriptCmd, config: &CliConfig) -> Result<ReplayReport, Box<dyn Error>> {
    let script = read_script(&cmd.script)?;
    let settings = Settings {
        incremental_delivery: config.incremental_delivery() && !cmd.no_incremental,
        id_field: config.id_field().to_owned(),
    };
    replay(script, &settings).await
}

fn read_script(path: &Path) -> Result<Script, Box<dyn Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read script {}: {err}", path.display()))?;
    let script = serde_json::from_str(&contents)
        .map_err(|err| format!("failed to parse script {}: {err}", path.display()))?;
    Ok(script)
}

async fn replay(script: Script, settings: &Settings) -> Result<ReplayReport, Box<dyn Error>> {
    let mut options = StoreOptions::default();
    if let Some(types) = script.schema {
        options = options.schema(Arc::new(Schema::new(types)));
    }
    let store = Store::new(options);
    let network = ChannelNetwork::new(Handle::current());
    let environment = Environment::new(
        EnvironmentConfig::new(network.clone(), store.clone())
            .incremental_delivery(settings.incremental_delivery)
            .id_field(settings.id_field.clone()),
    );
    let operation = OperationDescriptor::new(Arc::new(script.operation), script.variables);

    let mut selectors = vec![("operation".to_owned(), operation.root.clone())];
    for extra in &script.selectors {
        selectors.push((
            extra.name.clone(),
            Selector::for_fragment(
                extra.data_id.clone(),
                &extra.fragment,
                operation.variables.clone(),
            ),
        ));
    }
    let events = Arc::new(Mutex::new(Vec::new()));
    let watchers: Vec<_> = selectors
        .into_iter()
        .map(|(name, selector)| {
            let log = events.clone();
            environment.subscribe(environment.lookup(&selector), move |snapshot| {
                log.lock().push(SnapshotEvent {
                    selector: name.clone(),
                    data: snapshot.data.to_json(),
                    missing_data: snapshot.is_missing_data,
                });
            })
        })
        .collect();

    let payloads = script.payloads.len();
    let sender = network.open();
    for payload in script.payloads {
        sender.send(Ok(payload))?;
    }
    drop(sender);

    let (done_tx, done_rx) = oneshot::channel::<Result<(), CacheError>>();
    let on_complete = Arc::new(Mutex::new(Some(done_tx)));
    let on_error = on_complete.clone();
    let subscription = environment
        .execute(&operation, script.cache_config)
        .subscribe(
            Callbacks::new()
                .on_complete(move || {
                    if let Some(tx) = on_complete.lock().take() {
                        let _ = tx.send(Ok(()));
                    }
                })
                .on_error(move |err| {
                    if let Some(tx) = on_error.lock().take() {
                        let _ = tx.send(Err(err));
                    }
                }),
        );
    let outcome = done_rx.await?;
    subscription.unsubscribe();

    let (outcome, error_code) = match outcome {
        Ok(()) => ("complete".to_owned(), None),
        Err(err) => (err.to_string(), Some(err.code())),
    };
    let snapshots = events.lock().clone();
    let report = ReplayReport {
        operation: operation.name().to_owned(),
        payloads,
        outcome,
        error_code,
        revision: store.revision(),
        records: store.record_count(),
        snapshots,
        source: store.to_json(),
    };
    for watcher in watchers {
        watcher.dispose();
    }
    Ok(report)
}

fn exit_code(report: &ReplayReport) -> i32 {
    if report.error_code.is_some() {
        2
    } else {
        0
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

