//! Session Tool
//!
//! Works on session documents (`{ "id", "campaign", "events": [...] }`):
//! creates them, appends events, validates, reduces, audits and exports.
//!
//! ```text
//! session_tool create sessions/2024-01-15-0001.json --campaign bastards-blood
//! session_tool append sessions/2024-01-15-0001.json damage --target kara --data '{"amount": 4}'
//! session_tool reduce sessions/2024-01-15-0001.json
//! ```
//!
//! Set `RUST_LOG=talebound_hub=debug` to watch appends and cache updates.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use talebound_core::{NewEvent, SessionId};
use talebound_hub::{HubConfig, SessionCoordinator};
use talebound_journal::{Auditor, ExportFormat, Exporter, LogStore, MemoryStore, SessionDocument};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "session_tool")]
#[command(about = "Inspect, validate and append to session documents")]
#[command(version)]
struct Cli {
    /// Hub configuration (RON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new, empty session document
    Create {
        file: PathBuf,
        /// Session id (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "bastards-blood")]
        campaign: String,
    },

    /// Validate and append one event, then rewrite the document
    Append {
        file: PathBuf,
        /// Event kind, e.g. `damage`
        kind: String,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        target: Option<String>,
        /// `data` object as JSON
        #[arg(long)]
        data: Option<String>,
        /// `result` object as JSON
        #[arg(long)]
        result: Option<String>,
    },

    /// Check every event in a document
    Validate { file: PathBuf },

    /// Print the reduced state and the events that could not be applied
    Reduce {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = StateFormat::Json)]
        format: StateFormat,
    },

    /// Print event counts and unresolved events
    Audit { file: PathBuf },

    /// Re-export the log
    Export {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StateFormat {
    Json,
    Ron,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Jsonl,
    Json,
    Ron,
    Text,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Jsonl => ExportFormat::JsonLines,
            Format::Json => ExportFormat::Json,
            Format::Ron => ExportFormat::Ron,
            Format::Text => ExportFormat::Text,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => HubConfig::load(path)?,
        None => HubConfig::default(),
    };

    match cli.command {
        Commands::Create { file, id, campaign } => create(&file, id, campaign),
        Commands::Append {
            file,
            kind,
            actor,
            target,
            data,
            result,
        } => {
            let mut event = NewEvent::new(kind);
            if let Some(actor) = actor {
                event = event.actor(actor);
            }
            if let Some(target) = target {
                event = event.target(target);
            }
            if let Some(data) = data {
                event = event.data(parse_json("--data", &data)?);
            }
            if let Some(result) = result {
                event = event.result(parse_json("--result", &result)?);
            }
            append(config, &file, event).await
        }
        Commands::Validate { file } => validate(&file),
        Commands::Reduce { file, format } => reduce(config, &file, format).await,
        Commands::Audit { file } => audit(config, &file).await,
        Commands::Export { file, format } => export(&file, format.into()),
    }
}

fn load(file: &Path) -> Result<SessionDocument> {
    SessionDocument::read(file).with_context(|| format!("reading {}", file.display()))
}

fn parse_json(flag: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("{} is not valid JSON", flag))
}

/// A coordinator holding just this document's session
async fn open(config: HubConfig, document: &SessionDocument) -> Result<(SessionCoordinator, Arc<MemoryStore>)> {
    let store = Arc::new(MemoryStore::new());
    let hub = SessionCoordinator::new(store.clone(), config);
    hub.import(document).await?;
    Ok((hub, store))
}

fn create(file: &Path, id: Option<String>, campaign: String) -> Result<()> {
    if file.exists() {
        anyhow::bail!("{} already exists", file.display());
    }
    let id = match id {
        Some(id) => id,
        None => file
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .context("cannot derive a session id from the file name; pass --id")?,
    };
    if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SessionDocument::new(SessionId::new(id.clone()), campaign).write(file)?;
    info!(session = %id, "session document created");
    println!("Created session {}", id);
    Ok(())
}

async fn append(config: HubConfig, file: &Path, event: NewEvent) -> Result<()> {
    let document = load(file)?;
    let (hub, store) = open(config, &document).await?;

    let id = hub.append(&document.id, event).await?;
    SessionDocument::export(store.as_ref(), &document.id)?.write(file)?;

    let appended = store.list(&document.id, id)?;
    println!("Logged event {} to session {}", id, document.id);
    if let Some(event) = appended.first() {
        println!("{}", serde_json::to_string_pretty(&event.to_wire())?);
    }
    Ok(())
}

fn validate(file: &Path) -> Result<()> {
    let document = load(file)?;
    let events = document.decode_events()?;
    println!("{}: {} events, all valid", document.id, events.len());
    Ok(())
}

async fn reduce(config: HubConfig, file: &Path, format: StateFormat) -> Result<()> {
    let document = load(file)?;
    let (hub, _) = open(config, &document).await?;
    let (state, unresolved) = hub.get_state(&document.id).await?;

    let rendered = match format {
        StateFormat::Json => serde_json::to_string_pretty(&state)?,
        StateFormat::Ron => ron::ser::to_string_pretty(&state, ron::ser::PrettyConfig::default())?,
    };
    println!("{}", rendered);
    if !unresolved.is_empty() {
        let ids: Vec<String> = unresolved.iter().map(|id| id.to_string()).collect();
        eprintln!("unresolved: {}", ids.join(", "));
    }
    Ok(())
}

async fn audit(config: HubConfig, file: &Path) -> Result<()> {
    let document = load(file)?;
    let (hub, _) = open(config, &document).await?;
    let reduction = hub.reduce(&document.id).await?;
    let events = document.decode_events()?;

    let report = Auditor::new(&events)
        .with_reduction(&reduction)
        .generate_report();
    println!("{}", report);
    Ok(())
}

fn export(file: &Path, format: ExportFormat) -> Result<()> {
    let document = load(file)?;
    let store = MemoryStore::new();
    let meta = document.import_into(&store)?;
    let events = store.list(&document.id, talebound_core::EventId::new(0))?;

    let mut stdout = std::io::stdout();
    Exporter::new(&events)
        .with_meta(&meta)
        .export_to(&mut stdout, format)?;
    Ok(())
}
