//! Per-bot process supervision
//!
//! Owns the start/stop/restart state machine and the background tasks attached
//! to each spawned process:
//!
//! - two reader tasks (stdout, stderr) that decode lines into colored segments
//! - one watcher task that waits for the exit and carries out kill requests
//!
//! Background tasks never touch a [`Bot`]. They send [`SupervisorMessage`]s
//! back to the coordinating context, which applies them through
//! [`ProcessSupervisor::handle_exit`] one at a time.
//!
//! Any exit that was not preceded by a stop request is treated as a crash and
//! the bot is started again immediately. There is no backoff and no retry
//! ceiling.

use super::bot::{Bot, BotId, BotState, LogLine, OutputStream};
use super::events::{EventSink, FleetEvent};
use crate::config::LaunchSettings;
use crate::launch::select_launch_plan;
use crate::{FleetError, Result};
use ansi_segments::AnsiSegmenter;
use chrono::Utc;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Identifies one spawned process; never reused within a fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

/// Live process attached to a bot
#[derive(Debug)]
pub struct ProcessHandle {
    id: HandleId,
    pid: Option<u32>,
    kill_tx: mpsc::UnboundedSender<()>,
    launched: Instant,
}

impl ProcessHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn uptime(&self) -> Duration {
        self.launched.elapsed()
    }

    /// Ask the watcher task to kill the process.
    ///
    /// Fire-and-forget. If the watcher has already observed the exit the
    /// request is dropped; the pending exit message finishes the transition.
    pub fn request_kill(&self) {
        if self.kill_tx.send(()).is_err() {
            trace!(pid = ?self.pid, "Kill requested after process exit");
        } else {
            trace!(pid = ?self.pid, "Kill requested");
        }
    }
}

/// Messages from background tasks to the coordinating context
#[derive(Debug)]
pub enum SupervisorMessage {
    /// A decoded output line
    Output {
        bot: BotId,
        handle: HandleId,
        line: LogLine,
    },

    /// The process terminated; sent exactly once per handle
    Exited {
        bot: BotId,
        handle: HandleId,
        status: std::io::Result<ExitStatus>,
    },
}

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process was attached
    Started { pid: Option<u32> },

    /// A process is already attached; nothing was spawned
    AlreadyRunning,

    /// The fleet is shutting down; nothing was spawned
    ShuttingDown,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Kill issued with the stop flag set
    Requested,

    /// A stop is already in flight
    AlreadyStopping,

    /// No process attached
    NotRunning,
}

/// Result of a restart request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Kill issued without the stop flag; the exit path starts the bot again
    Restarting,

    /// Nothing was running, so the bot was started directly
    Started(StartOutcome),
}

/// What happened when an exit was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Requested stop finished; the bot is idle
    Stopped,

    /// Unexpected exit; a fresh start was attempted
    Restarted { relaunched: bool },

    /// Exit arrived after shutdown, or for a handle that is no longer attached
    Ignored,
}

/// Drives bots through their lifecycle
///
/// All methods must be called from the coordinating context, inside a tokio
/// runtime.
#[derive(Debug)]
pub struct ProcessSupervisor {
    settings: LaunchSettings,
    messages: mpsc::UnboundedSender<SupervisorMessage>,
    events: EventSink,
    shutdown: CancellationToken,
    next_handle: u64,
}

impl ProcessSupervisor {
    pub(crate) fn new(
        settings: LaunchSettings,
        events: EventSink,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<SupervisorMessage>) {
        let (messages, messages_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            settings,
            messages,
            events,
            shutdown,
            next_handle: 1,
        };
        (supervisor, messages_rx)
    }

    /// Start the bot if no process is attached.
    ///
    /// Launch failures leave the bot idle, are written to its log, and are
    /// returned as errors.
    pub fn start(&mut self, bot: &mut Bot) -> Result<StartOutcome> {
        if self.shutdown.is_cancelled() {
            debug!(bot = %bot.id(), "Start refused during shutdown");
            return Ok(StartOutcome::ShuttingDown);
        }

        if bot.handle.is_some() {
            debug!(bot = %bot.id(), "Start ignored, process already attached");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let plan = match select_launch_plan(bot.root_path(), &self.settings) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(bot = %bot.id(), error = %e, "No launch target");
                self.log(bot, &format!("[ERROR] {}", e));
                return Err(e);
            }
        };

        let mut child = match plan.command().spawn() {
            Ok(child) => child,
            Err(source) => {
                let e = FleetError::SpawnFailure {
                    program: plan.program.clone(),
                    source,
                };
                warn!(bot = %bot.id(), error = %e, "Spawn failed");
                self.log(bot, &format!("[ERROR] {}", e));
                return Err(e);
            }
        };

        let handle_id = HandleId(self.next_handle);
        self.next_handle += 1;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_lines(
                stdout,
                bot.id(),
                handle_id,
                OutputStream::Stdout,
                self.messages.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_lines(
                stderr,
                bot.id(),
                handle_id,
                OutputStream::Stderr,
                self.messages.clone(),
            ));
        }

        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        tokio::spawn(watch_process(
            child,
            bot.id(),
            handle_id,
            kill_rx,
            self.messages.clone(),
        ));

        bot.handle = Some(ProcessHandle {
            id: handle_id,
            pid,
            kill_tx,
            launched: Instant::now(),
        });
        bot.started_at = Some(Utc::now());

        info!(
            bot = %bot.id(),
            name = bot.name(),
            pid = ?pid,
            command = %plan.command_line(),
            "Bot started"
        );
        self.state_changed(bot);

        Ok(StartOutcome::Started { pid })
    }

    /// Request a deliberate stop.
    ///
    /// The stop flag is set before the kill goes out, so the exit is recorded
    /// as stopped by user rather than as a crash.
    pub fn stop(&self, bot: &mut Bot) -> StopOutcome {
        let Some(handle) = bot.handle.as_ref() else {
            return StopOutcome::NotRunning;
        };

        if bot.stop_requested {
            debug!(bot = %bot.id(), "Stop already in flight");
            return StopOutcome::AlreadyStopping;
        }

        bot.stop_requested = true;
        handle.request_kill();

        info!(bot = %bot.id(), pid = ?handle.pid(), "Stop requested");
        self.state_changed(bot);

        StopOutcome::Requested
    }

    /// Restart through the crash path, or start directly when idle
    pub fn restart(&mut self, bot: &mut Bot) -> Result<RestartOutcome> {
        if let Some(handle) = bot.handle.as_ref() {
            info!(bot = %bot.id(), pid = ?handle.pid(), "Restart requested");
            handle.request_kill();
            return Ok(RestartOutcome::Restarting);
        }

        self.start(bot).map(RestartOutcome::Started)
    }

    /// Apply the exit of `handle` to `bot`.
    ///
    /// After shutdown has been signaled every exit is final and nothing
    /// changes.
    pub fn handle_exit(
        &mut self,
        bot: &mut Bot,
        handle: HandleId,
        status: std::io::Result<ExitStatus>,
    ) -> ExitDisposition {
        if self.shutdown.is_cancelled() {
            debug!(bot = %bot.id(), "Exit observed during shutdown");
            return ExitDisposition::Ignored;
        }

        match bot.handle.as_ref() {
            Some(current) if current.id() == handle => {}
            _ => {
                debug!(bot = %bot.id(), ?handle, "Exit for a detached handle");
                return ExitDisposition::Ignored;
            }
        }

        bot.handle = None;
        bot.started_at = None;

        if bot.stop_requested {
            bot.stop_requested = false;
            info!(bot = %bot.id(), "Bot stopped by user");
            self.log(bot, "[INFO] Bot process stopped by user.");
            self.state_changed(bot);
            return ExitDisposition::Stopped;
        }

        let description = describe_exit(&status);
        warn!(bot = %bot.id(), exit = %description, "Bot exited unexpectedly, restarting");
        self.log(
            bot,
            &format!("[ERROR] Bot process exited ({}). Restarting...", description),
        );
        self.state_changed(bot);

        bot.restarts += 1;
        let relaunched = matches!(self.start(bot), Ok(StartOutcome::Started { .. }));

        ExitDisposition::Restarted { relaunched }
    }

    /// Send a kill to the bot's process without touching its state.
    ///
    /// Used at shutdown, after which exits are ignored.
    pub fn kill(&self, bot: &Bot) {
        if let Some(handle) = bot.handle.as_ref() {
            handle.request_kill();
        }
    }

    fn log(&self, bot: &Bot, text: &str) {
        self.events.send(FleetEvent::Line {
            bot: bot.id(),
            line: LogLine::supervisor(text),
        });
    }

    fn state_changed(&self, bot: &Bot) {
        let state: BotState = bot.state();
        debug!(bot = %bot.id(), %state, "State changed");
        self.events.send(FleetEvent::StateChanged {
            bot: bot.id(),
            state,
        });
    }
}

/// Human-readable exit status, e.g. `code 1` or `signal 9`
pub fn describe_exit(status: &std::io::Result<ExitStatus>) -> String {
    let status = match status {
        Ok(status) => status,
        Err(e) => return format!("wait failed: {}", e),
    };

    if let Some(code) = status.code() {
        return format!("code {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }

    "unknown status".to_string()
}

/// Wait for the process to exit, carrying out kill requests meanwhile
async fn watch_process(
    mut child: Child,
    bot: BotId,
    handle: HandleId,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
    messages: mpsc::UnboundedSender<SupervisorMessage>,
) {
    let pid = child.id();

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(()) = kill_rx.recv() => {
                if let Err(source) = child.start_kill() {
                    let e = FleetError::TerminationRaceIgnored { pid, source };
                    debug!(%bot, error = %e, "Kill failed");
                }
            }
        }
    };

    trace!(%bot, ?pid, "Process exited");
    if messages
        .send(SupervisorMessage::Exited {
            bot,
            handle,
            status,
        })
        .is_err()
    {
        debug!(%bot, "Exit dropped, controller is gone");
    }
}

/// Read newline-delimited output and forward it as decoded lines.
///
/// Invalid UTF-8 is replaced rather than ending the stream.
async fn read_lines<R>(
    reader: R,
    bot: BotId,
    handle: HandleId,
    stream: OutputStream,
    messages: mpsc::UnboundedSender<SupervisorMessage>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut segmenter = AnsiSegmenter::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%bot, ?stream, error = %e, "Output stream failed");
                break;
            }
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let text = String::from_utf8_lossy(&buf);
        let segments = match stream {
            OutputStream::Stderr => segmenter.feed(&format!("[ERROR] {}", text)),
            _ => segmenter.feed(&text),
        };

        let message = SupervisorMessage::Output {
            bot,
            handle,
            line: LogLine::new(stream, segments),
        };
        if messages.send(message).is_err() {
            break;
        }
    }
}
