//! fleetdeck entry point.

use clap::{Parser, Subcommand};
use fleetdeck_console::config::ConsoleConfig;
use fleetdeck_console::dispatcher::wait_for_connection;
use fleetdeck_console::error::ConsoleResult;
use fleetdeck_console::persistence;
use fleetdeck_console::{
    logging, AppContext, ConsoleEvent, WsDispatcher, WsSettings, KINDS,
};
use fleetdeck_filter::{parse, serialize, to_query_string, PredicateSet};
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "fleetdeck", version, about = "Console for a bare-metal fleet backend")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, env = "FLEETDECK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a collection. Without --filter the saved search for the kind is used.
    List {
        kind: String,
        #[arg(long, short)]
        filter: Option<String>,
        /// Remember the filter as the kind's saved search.
        #[arg(long)]
        save: bool,
    },
    /// Show one record.
    Get { kind: String, key: String },
    /// Delete one record.
    Delete { kind: String, key: String },
    /// Print server notifications as they arrive.
    Watch {
        /// Kinds to load and keep in sync while watching.
        #[arg(long = "kind")]
        kinds: Vec<String>,
    },
    /// Parse a filter expression offline and print its forms.
    Filter { expr: String },
    /// Print the known entity kinds.
    Kinds,
}

#[tokio::main]
async fn main() -> ConsoleResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Filter { expr } => print_filter(&expr),
        Command::Kinds => print_json(&KINDS),
        command => run_online(cli.config, command).await,
    }
}

async fn run_online(config_path: Option<PathBuf>, command: Command) -> ConsoleResult<()> {
    let config = ConsoleConfig::load(config_path)?;
    logging::init(&config.log)?;

    let (dispatcher, mut events) = WsDispatcher::spawn(WsSettings::from_config(&config));
    let context = Arc::new(AppContext::new(dispatcher));
    wait_for_connection(
        &mut events,
        Duration::from_millis(config.request_timeout_ms),
    )
    .await?;

    match command {
        Command::Watch { kinds } => watch(&context, &kinds, events).await,
        command => {
            spawn_event_pump(Arc::clone(&context), events);
            run_command(&context, &config, command).await
        }
    }
}

async fn run_command(
    context: &AppContext<WsDispatcher>,
    config: &ConsoleConfig,
    command: Command,
) -> ConsoleResult<()> {
    match command {
        Command::List { kind, filter, save } => {
            let collection = context.collection(&kind)?;
            let mut state = persistence::load(&config.state_path)?.unwrap_or_default();
            let predicates = match &filter {
                Some(expr) => parse(expr),
                None => state.recall(collection.kind()).unwrap_or_default(),
            };
            if save {
                state.remember(collection.kind(), &predicates);
                persistence::save(&config.state_path, &state)?;
            }
            tracing::info!(
                model = collection.kind(),
                filter = %serialize(&predicates),
                "Listing"
            );
            let items = collection.list(&predicates).await?;
            print_json(&items)
        }
        Command::Get { kind, key } => {
            let item = context.collection(&kind)?.get(&key).await?;
            print_json(&item)
        }
        Command::Delete { kind, key } => {
            let collection = context.collection(&kind)?;
            collection.delete(&key).await?;
            print_json(&json!({"kind": collection.kind(), "deleted": key}))
        }
        Command::Watch { .. } | Command::Filter { .. } | Command::Kinds => Ok(()),
    }
}

/// Keep the context in sync with server pushes for the rest of the run.
fn spawn_event_pump(
    context: Arc<AppContext<WsDispatcher>>,
    mut events: mpsc::Receiver<ConsoleEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            context.absorb_event(&event).await;
        }
    });
}

async fn watch(
    context: &AppContext<WsDispatcher>,
    kinds: &[String],
    mut events: mpsc::Receiver<ConsoleEvent>,
) -> ConsoleResult<()> {
    for kind in kinds {
        let collection = context.collection(kind)?;
        let loaded = collection.list(&PredicateSet::new()).await?;
        tracing::info!(model = collection.kind(), count = loaded.len(), "Watching");
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                let applied = context.absorb_event(&event).await;
                let line = match &event {
                    ConsoleEvent::Notify(notify) => json!({
                        "event": "notify",
                        "name": notify.name,
                        "action": notify.action,
                        "data": notify.data,
                        "applied": applied,
                    }),
                    ConsoleEvent::Connected { reconnect } => {
                        json!({"event": "connected", "reconnect": reconnect})
                    }
                    ConsoleEvent::Disconnected { reason } => {
                        json!({"event": "disconnected", "reason": reason})
                    }
                    ConsoleEvent::Error(message) => json!({"event": "error", "message": message}),
                };
                print_line(&line)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return Ok(());
            }
        }
    }
}

fn print_filter(expr: &str) -> ConsoleResult<()> {
    let predicates = parse(expr);
    print_json(&json!({
        "predicates": predicates,
        "canonical": serialize(&predicates),
        "query": to_query_string(&predicates),
    }))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> ConsoleResult<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn print_line<T: Serialize + ?Sized>(value: &T) -> ConsoleResult<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
