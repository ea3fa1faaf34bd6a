//! Fleet controller
//!
//! Holds the registered bots and is the single coordinating context for all of
//! them. Every mutation of bot state happens here, either through a direct
//! method call or through the [`FleetCommand`] channel when the controller is
//! driven by [`FleetController::run`].

use super::bot::{path_key, Bot, BotId, BotSnapshot};
use super::events::{EventSink, FleetEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};
use super::supervisor::{
    ExitDisposition, ProcessSupervisor, RestartOutcome, StartOutcome, StopOutcome,
    SupervisorMessage,
};
use crate::config::{BotStore, LaunchSettings};
use crate::{FleetError, Result};
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Commands accepted by a running controller
///
/// Bots are addressed by id (`bot-N`), name or path.
#[derive(Debug)]
pub enum FleetCommand {
    /// Register a bot directory
    AddBot(PathBuf),

    /// Deregister a stopped bot
    RemoveBot(String),

    /// Start one bot
    Start(String),

    /// Stop one bot
    Stop(String),

    /// Restart one bot
    Restart(String),

    /// Start every idle bot
    StartAll,

    /// Stop every running bot
    StopAll,

    /// Restart every bot
    RestartAll,

    /// Reply with a snapshot of every bot
    Status(oneshot::Sender<Vec<BotSnapshot>>),

    /// Kill everything and leave the event loop
    Shutdown,
}

/// Result of handling a command
enum CommandResult {
    /// Keep running the event loop
    Continue,
    /// Leave the event loop
    Stop,
}

/// What [`FleetController::process_next`] applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// An output line was published
    Output(BotId),

    /// An exit was handled
    Exit(BotId, ExitDisposition),

    /// The message belonged to a bot that has been removed
    Orphaned,
}

/// Coordinates all registered bots
#[derive(Debug)]
pub struct FleetController {
    /// Registered bots in insertion order
    bots: Vec<Bot>,

    next_id: u64,

    /// Where the path list is persisted, if anywhere
    store: Option<BotStore>,

    /// Saved paths whose directory was missing at load time
    dormant: Vec<PathBuf>,

    supervisor: ProcessSupervisor,

    /// Output and exits from background tasks
    messages_rx: mpsc::UnboundedReceiver<SupervisorMessage>,

    events: EventSink,

    command_tx: mpsc::Sender<FleetCommand>,
    command_rx: Option<mpsc::Receiver<FleetCommand>>,

    shutdown: CancellationToken,

    /// Last published (any_running, any_stopped)
    aggregate: (bool, bool),
}

impl FleetController {
    /// Create an empty fleet that is not persisted
    pub fn new(settings: LaunchSettings) -> Self {
        let events = EventSink::new(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let (supervisor, messages_rx) =
            ProcessSupervisor::new(settings, events.clone(), shutdown.clone());
        let (command_tx, command_rx) = mpsc::channel(64);

        Self {
            bots: Vec::new(),
            next_id: 1,
            store: None,
            dormant: Vec::new(),
            supervisor,
            messages_rx,
            events,
            command_tx,
            command_rx: Some(command_rx),
            shutdown,
            aggregate: (false, false),
        }
    }

    /// Create an empty fleet that saves to `store` on every add and remove
    pub fn with_store(store: BotStore, settings: LaunchSettings) -> Self {
        let mut fleet = Self::new(settings);
        fleet.store = Some(store);
        fleet
    }

    /// Replay the saved bot list.
    ///
    /// Paths that are no longer directories are kept aside and written back on
    /// the next save. A corrupt list is reported and the fleet starts empty.
    pub fn load(store: BotStore, settings: LaunchSettings) -> Self {
        let paths = match store.load() {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(
                    path = %store.path().display(),
                    error = %e,
                    "Failed to load bot list, starting empty"
                );
                Vec::new()
            }
        };

        let mut fleet = Self::with_store(store, settings);
        for path in paths {
            if fleet.contains_path(&path) || fleet.dormant.iter().any(|d| same_path(d, &path)) {
                tracing::debug!(path = %path.display(), "Skipping duplicate saved path");
                continue;
            }

            if path.is_dir() {
                fleet.register(path);
            } else {
                tracing::info!(path = %path.display(), "Saved bot directory is missing, skipping");
                fleet.dormant.push(path);
            }
        }
        fleet.aggregate = fleet.compute_aggregate();

        tracing::info!(
            bots = fleet.bots.len(),
            dormant = fleet.dormant.len(),
            "Fleet loaded"
        );
        fleet
    }

    /// Register a bot directory.
    ///
    /// Relative paths are resolved against the current directory. Fails with
    /// [`FleetError::DuplicateBot`] when the directory is already registered.
    pub fn add_bot(&mut self, path: impl AsRef<Path>) -> Result<BotId> {
        let path = absolutize(path.as_ref())?;

        if self.contains_path(&path) {
            tracing::debug!(path = %path.display(), "Duplicate bot rejected");
            return Err(FleetError::DuplicateBot(path));
        }

        if !path.is_dir() {
            return Err(FleetError::NotADirectory(path));
        }

        self.dormant.retain(|d| !same_path(d, &path));
        let id = self.register(path);

        if let Some(bot) = self.get(id) {
            tracing::info!(bot = %id, name = bot.name(), path = %bot.root_path().display(), "Bot added");
            self.events.send(FleetEvent::BotAdded {
                bot: bot.snapshot(),
            });
        }

        self.persist();
        self.publish_aggregate();
        Ok(id)
    }

    /// Deregister a bot. Refused with [`FleetError::BotRunning`] while it is active.
    pub fn remove_bot(&mut self, id: BotId) -> Result<BotSnapshot> {
        let index = self.index_of(id)?;

        if self.bots[index].is_running() {
            return Err(FleetError::BotRunning(self.bots[index].name().to_string()));
        }

        let bot = self.bots.remove(index);
        tracing::info!(bot = %id, name = bot.name(), "Bot removed");
        self.events.send(FleetEvent::BotRemoved { bot: id });

        self.persist();
        self.publish_aggregate();
        Ok(bot.snapshot())
    }

    pub fn start(&mut self, id: BotId) -> Result<StartOutcome> {
        let index = self.index_of(id)?;
        let result = self.supervisor.start(&mut self.bots[index]);
        self.publish_aggregate();
        result
    }

    pub fn stop(&mut self, id: BotId) -> Result<StopOutcome> {
        let index = self.index_of(id)?;
        let outcome = self.supervisor.stop(&mut self.bots[index]);
        self.publish_aggregate();
        Ok(outcome)
    }

    pub fn restart(&mut self, id: BotId) -> Result<RestartOutcome> {
        let index = self.index_of(id)?;
        let result = self.supervisor.restart(&mut self.bots[index]);
        self.publish_aggregate();
        result
    }

    /// Start every bot without a process. Returns how many were started.
    ///
    /// Launch failures are reported on each bot's log and do not stop the batch.
    pub fn start_all(&mut self) -> usize {
        let mut started = 0;
        for bot in self.bots.iter_mut().filter(|b| !b.is_running()) {
            if let Ok(StartOutcome::Started { .. }) = self.supervisor.start(bot) {
                started += 1;
            }
        }

        tracing::info!(started, "Start all");
        self.publish_aggregate();
        started
    }

    /// Issue a stop to every running bot. Returns how many kills went out.
    ///
    /// Each kill is handed to that bot's own watcher task, so this never waits
    /// on a process. The exits complete the transitions later.
    pub fn stop_all(&mut self) -> usize {
        let requested = self
            .bots
            .iter_mut()
            .filter(|b| b.is_running())
            .map(|bot| self.supervisor.stop(bot))
            .filter(|outcome| *outcome == StopOutcome::Requested)
            .count();

        tracing::info!(requested, "Stop all");
        self.publish_aggregate();
        requested
    }

    /// Restart every bot: running ones through the crash path, idle ones directly
    pub fn restart_all(&mut self) -> usize {
        let mut restarted = 0;
        for bot in self.bots.iter_mut() {
            match self.supervisor.restart(bot) {
                Ok(RestartOutcome::Restarting)
                | Ok(RestartOutcome::Started(StartOutcome::Started { .. })) => restarted += 1,
                Ok(_) => {}
                Err(e) => tracing::debug!(bot = %bot.id(), error = %e, "Restart failed"),
            }
        }

        tracing::info!(restarted, "Restart all");
        self.publish_aggregate();
        restarted
    }

    /// Whether any bot has a process attached
    pub fn any_running(&self) -> bool {
        self.bots.iter().any(|b| b.is_running())
    }

    /// Whether any bot has no process attached
    pub fn any_stopped(&self) -> bool {
        self.bots.iter().any(|b| !b.is_running())
    }

    pub fn bots(&self) -> impl Iterator<Item = &Bot> {
        self.bots.iter()
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    pub fn get(&self, id: BotId) -> Option<&Bot> {
        self.bots.iter().find(|b| b.id() == id)
    }

    pub fn snapshots(&self) -> Vec<BotSnapshot> {
        self.bots.iter().map(Bot::snapshot).collect()
    }

    /// Saved paths that were skipped because their directory is missing
    pub fn dormant_paths(&self) -> &[PathBuf] {
        &self.dormant
    }

    /// Resolve a bot by id (`bot-3`), name, or directory path
    pub fn find(&self, query: &str) -> Result<BotId> {
        if let Ok(id) = query.parse::<BotId>() {
            if self.get(id).is_some() {
                return Ok(id);
            }
        }

        let by_name = self
            .bots
            .iter()
            .find(|b| b.name() == query)
            .or_else(|| self.bots.iter().find(|b| b.name().eq_ignore_ascii_case(query)));
        if let Some(bot) = by_name {
            return Ok(bot.id());
        }

        let path = Path::new(query);
        let path = absolutize(path).unwrap_or_else(|_| path.to_path_buf());
        self.bots
            .iter()
            .find(|b| b.matches_path(&path))
            .map(Bot::id)
            .ok_or_else(|| FleetError::BotNotFound(query.to_string()))
    }

    /// Subscribe to fleet events
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.events.subscribe()
    }

    /// Get a command sender for this controller
    pub fn command_sender(&self) -> mpsc::Sender<FleetCommand> {
        self.command_tx.clone()
    }

    /// Token that ends the event loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Mark the fleet as closing and kill every live process.
    ///
    /// Exits observed afterwards are final: nothing restarts.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();

        let mut killed = 0;
        for bot in self.bots.iter().filter(|b| b.is_running()) {
            self.supervisor.kill(bot);
            killed += 1;
        }

        tracing::info!(killed, "Fleet shutting down");
    }

    /// Wait for the next message from a background task and apply it
    pub async fn process_next(&mut self) -> Option<Applied> {
        let message = self.messages_rx.recv().await?;
        Some(self.apply(message))
    }

    /// Run the event loop until shutdown.
    ///
    /// Applies background messages and commands one at a time. Leaves when a
    /// [`FleetCommand::Shutdown`] arrives or the shutdown token is cancelled,
    /// killing every live process on the way out.
    pub async fn run(&mut self) -> Result<()> {
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| FleetError::Config("Fleet controller already running".to_string()))?;

        self.events.send(FleetEvent::Started);
        tracing::info!(bots = self.bots.len(), "Fleet controller started");

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown signaled");
                    break;
                }
                Some(message) = self.messages_rx.recv() => {
                    self.apply(message);
                }
                Some(command) = command_rx.recv() => {
                    match self.dispatch(command) {
                        CommandResult::Continue => {}
                        CommandResult::Stop => break,
                    }
                }
            }
        }

        self.shutdown();
        self.events.send(FleetEvent::Stopped);
        tracing::info!("Fleet controller stopped");
        Ok(())
    }

    fn apply(&mut self, message: SupervisorMessage) -> Applied {
        match message {
            SupervisorMessage::Output { bot, line, .. } => {
                if self.get(bot).is_none() {
                    return Applied::Orphaned;
                }
                self.events.send(FleetEvent::Line { bot, line });
                Applied::Output(bot)
            }
            SupervisorMessage::Exited {
                bot,
                handle,
                status,
            } => {
                let Ok(index) = self.index_of(bot) else {
                    return Applied::Orphaned;
                };
                let disposition =
                    self.supervisor
                        .handle_exit(&mut self.bots[index], handle, status);
                tracing::debug!(%bot, ?disposition, "Exit applied");
                self.publish_aggregate();
                Applied::Exit(bot, disposition)
            }
        }
    }

    fn dispatch(&mut self, command: FleetCommand) -> CommandResult {
        tracing::debug!(?command, "Received command");

        match command {
            FleetCommand::AddBot(path) => {
                if let Err(e) = self.add_bot(&path) {
                    self.reject(path.display().to_string(), e);
                }
            }
            FleetCommand::RemoveBot(target) => {
                if let Err(e) = self.find(&target).and_then(|id| self.remove_bot(id)) {
                    self.reject(target, e);
                }
            }
            FleetCommand::Start(target) => {
                match self.find(&target).and_then(|id| self.start(id)) {
                    Ok(StartOutcome::AlreadyRunning) => {
                        self.reject(target, "already running".to_string())
                    }
                    Ok(_) => {}
                    Err(e) => self.reject(target, e),
                }
            }
            FleetCommand::Stop(target) => match self.find(&target).and_then(|id| self.stop(id)) {
                Ok(StopOutcome::NotRunning) => self.reject(target, "not running".to_string()),
                Ok(_) => {}
                Err(e) => self.reject(target, e),
            },
            FleetCommand::Restart(target) => {
                if let Err(e) = self.find(&target).and_then(|id| self.restart(id)) {
                    self.reject(target, e);
                }
            }
            FleetCommand::StartAll => {
                self.start_all();
            }
            FleetCommand::StopAll => {
                self.stop_all();
            }
            FleetCommand::RestartAll => {
                self.restart_all();
            }
            FleetCommand::Status(reply) => {
                if reply.send(self.snapshots()).is_err() {
                    tracing::debug!("Status requester went away");
                }
            }
            FleetCommand::Shutdown => {
                tracing::info!("Received shutdown command");
                return CommandResult::Stop;
            }
        }
        CommandResult::Continue
    }

    fn reject(&self, target: String, reason: impl ToString) {
        let reason = reason.to_string();
        tracing::warn!(%target, %reason, "Command rejected");
        self.events.send(FleetEvent::CommandRejected { target, reason });
    }

    fn register(&mut self, path: PathBuf) -> BotId {
        let id = BotId(self.next_id);
        self.next_id += 1;
        self.bots.push(Bot::new(id, path));
        id
    }

    fn index_of(&self, id: BotId) -> Result<usize> {
        self.bots
            .iter()
            .position(|b| b.id() == id)
            .ok_or_else(|| FleetError::BotNotFound(id.to_string()))
    }

    fn contains_path(&self, path: &Path) -> bool {
        self.bots.iter().any(|b| b.matches_path(path))
    }

    /// Write registered and dormant paths. Failures are logged, not returned.
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let paths: Vec<PathBuf> = self
            .bots
            .iter()
            .map(|b| b.root_path().to_path_buf())
            .chain(self.dormant.iter().cloned())
            .collect();

        if let Err(e) = store.save(&paths) {
            tracing::warn!(path = %store.path().display(), error = %e, "Failed to save bot list");
        }
    }

    fn compute_aggregate(&self) -> (bool, bool) {
        (self.any_running(), self.any_stopped())
    }

    /// Publish the aggregate flags if they changed
    fn publish_aggregate(&mut self) {
        let aggregate = self.compute_aggregate();
        if aggregate == self.aggregate {
            return;
        }

        self.aggregate = aggregate;
        let (any_running, any_stopped) = aggregate;
        tracing::debug!(any_running, any_stopped, "Aggregate changed");
        self.events.send(FleetEvent::AggregateChanged {
            any_running,
            any_stopped,
        });
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    path_key(a) == path_key(b)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
