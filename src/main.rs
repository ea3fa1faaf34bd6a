//! botfleet - Supervisor for long-running bot processes
//!
//! Main entry point for the botfleet CLI.

mod commands;

use anyhow::Context;
use botfleet::config::{BotStore, LaunchSettings};
use botfleet::fleet::{BotId, FleetCommand, FleetController, FleetEvent};
use botfleet::launch::select_launch_plan;
use botfleet::style;
use clap::Parser;
use commands::{parse_control, Cli, Commands, ControlLine, OutputFormat, CONTROL_HELP};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::collections::HashMap;
use std::path::Path;
use std::process;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

fn main() {
    // Initialize logging
    if let Err(e) = botfleet::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let store = cli.store();
    let settings = cli.launch_settings();

    tracing::debug!(path = %store.path().display(), "Using bot list");

    match cli.command {
        Commands::Add { path } => handle_add(store, settings, &path),
        Commands::Remove { bot, yes } => handle_remove(store, settings, &bot, yes),
        Commands::List { json } => handle_list(store, settings, json),
        Commands::Run { format } => handle_run(store, settings, format),
    }
}

fn handle_add(store: BotStore, settings: LaunchSettings, path: &Path) -> anyhow::Result<()> {
    let mut fleet = FleetController::load(store, settings.clone());
    let id = fleet
        .add_bot(path)
        .with_context(|| format!("Failed to add {}", path.display()))?;

    let Some(bot) = fleet.get(id) else {
        anyhow::bail!("Bot {} vanished after being added", id);
    };

    println!(
        "{} Added {} {} {}",
        style::success("✓"),
        style::bot_id(id),
        style::header(bot.name()),
        style::path(&bot.root_path().display().to_string())
    );

    if let Err(e) = select_launch_plan(bot.root_path(), &settings) {
        println!("  {} {}", style::warning("⚠"), style::warning(&e.to_string()));
    }

    Ok(())
}

fn handle_remove(
    store: BotStore,
    settings: LaunchSettings,
    query: &str,
    yes: bool,
) -> anyhow::Result<()> {
    let mut fleet = FleetController::load(store, settings);
    let id = fleet.find(query)?;
    let name = fleet
        .get(id)
        .map(|b| b.name().to_string())
        .unwrap_or_else(|| query.to_string());

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Are you sure you want to remove bot \"{}\"?", name))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmed {
            println!("{}", style::dim("Cancelled"));
            return Ok(());
        }
    }

    let removed = fleet.remove_bot(id)?;
    println!(
        "{} Removed {} {}",
        style::success("✓"),
        style::bot_id(removed.id),
        removed.name
    );
    Ok(())
}

fn handle_list(store: BotStore, settings: LaunchSettings, json: bool) -> anyhow::Result<()> {
    let fleet = FleetController::load(store, settings);

    if json {
        println!("{}", serde_json::to_string_pretty(&fleet.snapshots())?);
        return Ok(());
    }

    if fleet.is_empty() && fleet.dormant_paths().is_empty() {
        println!("No bots registered. Add one with: botfleet add <path>");
        return Ok(());
    }

    println!("{}", style::header(&format!("Bots ({})", fleet.len())));
    for snapshot in fleet.snapshots() {
        println!("  {}", snapshot.display_line());
    }

    if !fleet.dormant_paths().is_empty() {
        println!();
        println!("{}", style::header("Missing directories (kept in the list)"));
        for path in fleet.dormant_paths() {
            println!("  {}", style::dim(&path.display().to_string()));
        }
    }

    Ok(())
}

fn handle_run(store: BotStore, settings: LaunchSettings, format: OutputFormat) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(supervise(store, settings, format));

    // The stdin reader may still be blocked on a read
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}

async fn supervise(
    store: BotStore,
    settings: LaunchSettings,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut fleet = FleetController::load(store, settings);
    if fleet.is_empty() {
        anyhow::bail!("No bots registered. Add one with: botfleet add <path>");
    }

    let labels: HashMap<BotId, String> = fleet
        .bots()
        .map(|b| (b.id(), b.name().to_string()))
        .collect();

    let printer = tokio::spawn(print_events(fleet.subscribe(), labels, format));
    tokio::spawn(read_control(fleet.command_sender(), fleet.shutdown_token()));

    let shutdown = fleet.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        }
    });

    let started = fleet.start_all();
    tracing::info!(started, total = fleet.len(), "Fleet running");

    fleet.run().await?;

    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "Output printer ended abnormally");
    }
    Ok(())
}

/// Print fleet events until the controller stops
async fn print_events(
    mut events: broadcast::Receiver<FleetEvent>,
    mut labels: HashMap<BotId, String>,
    format: OutputFormat,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Output display fell behind, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let stopped = matches!(event, FleetEvent::Stopped);

        match format {
            OutputFormat::Json => match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
            },
            OutputFormat::Text => print_text_event(event, &mut labels),
        }

        if stopped {
            break;
        }
    }
}

fn print_text_event(event: FleetEvent, labels: &mut HashMap<BotId, String>) {
    match event {
        FleetEvent::Line { bot, line } => {
            let label = labels.get(&bot).cloned().unwrap_or_else(|| bot.to_string());
            println!("{}", style::log_line(&label, &line));
        }
        FleetEvent::StateChanged { bot, state } => {
            let label = labels.get(&bot).cloned().unwrap_or_else(|| bot.to_string());
            println!("{} {} {}", style::dim("--"), label, style::state_style(state));
        }
        FleetEvent::BotAdded { bot } => {
            labels.insert(bot.id, bot.name);
        }
        FleetEvent::CommandRejected { target, reason } => {
            eprintln!("{} {}: {}", style::error("✗"), target, reason);
        }
        FleetEvent::Started
        | FleetEvent::Stopped
        | FleetEvent::BotRemoved { .. }
        | FleetEvent::AggregateChanged { .. } => {}
    }
}

/// Forward control lines from stdin to the controller.
///
/// End of input only stops reading; the fleet keeps running until Ctrl-C or
/// `quit`.
async fn read_control(commands: mpsc::Sender<FleetCommand>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("stdin closed, control input disabled");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read control input");
                break;
            }
        };

        let control = match parse_control(&line) {
            Ok(Some(control)) => control,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{} {}", style::error("✗"), message);
                continue;
            }
        };

        match control {
            ControlLine::Help => println!("{}", CONTROL_HELP),
            ControlLine::Status => print_status(&commands).await,
            other => {
                let quit = other == ControlLine::Quit;
                if let Some(command) = other.into_command() {
                    if commands.send(command).await.is_err() {
                        break;
                    }
                }
                if quit {
                    break;
                }
            }
        }
    }
}

async fn print_status(commands: &mpsc::Sender<FleetCommand>) {
    let (tx, rx) = oneshot::channel();
    if commands.send(FleetCommand::Status(tx)).await.is_err() {
        return;
    }

    match rx.await {
        Ok(snapshots) => {
            for snapshot in snapshots {
                println!("  {}", snapshot.display_line());
            }
        }
        Err(_) => tracing::debug!("Controller stopped before answering status"),
    }
}
