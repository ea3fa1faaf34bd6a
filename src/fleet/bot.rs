//! Bot representation and lifecycle states
//!
//! Defines the Bot record that represents one supervised directory, its
//! lifecycle state, and the observable snapshot handed to shells.

use super::supervisor::ProcessHandle;
use ansi_segments::{segment_line, Color, Segment};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Stable identifier of a registered bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BotId(pub(crate) u64);

impl BotId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bot-{}", self.0)
    }
}

impl FromStr for BotId {
    type Err = crate::FleetError;

    fn from_str(s: &str) -> crate::Result<Self> {
        s.strip_prefix("bot-")
            .and_then(|n| n.parse().ok())
            .map(BotId)
            .ok_or_else(|| crate::FleetError::BotNotFound(s.to_string()))
    }
}

impl Serialize for BotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Bot lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    /// No process attached
    Idle,

    /// Process attached and not yet exited
    Running,

    /// Kill issued on request, waiting for the exit
    StoppingByRequest,
}

impl BotState {
    /// Get emoji indicator for state
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Idle => "⚪",
            Self::Running => "🟢",
            Self::StoppingByRequest => "🟡",
        }
    }

    /// Whether a process is attached
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::StoppingByRequest)
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::StoppingByRequest => write!(f, "stopping"),
        }
    }
}

/// Where a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    /// Tagged with an `[ERROR] ` prefix
    Stderr,
    /// Messages written by the supervisor itself
    Supervisor,
}

/// One decoded line of a bot's log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub stream: OutputStream,
    pub segments: Vec<Segment>,
}

impl LogLine {
    pub fn new(stream: OutputStream, segments: Vec<Segment>) -> Self {
        Self { stream, segments }
    }

    /// Supervisor message in the default color
    pub fn supervisor(text: &str) -> Self {
        let (segments, _) = segment_line(text, Color::Default);
        Self::new(OutputStream::Supervisor, segments)
    }

    /// Visible text with colors dropped
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Key used for duplicate detection: case-insensitive, trailing separators ignored
pub(crate) fn path_key(path: &Path) -> String {
    let lossy = path.to_string_lossy();
    let trimmed = lossy.trim_end_matches(['/', '\\']);
    let key = if trimmed.is_empty() { lossy.as_ref() } else { trimmed };
    key.to_lowercase()
}

/// Display name for a bot directory: its final path segment
pub(crate) fn name_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// A supervised bot
#[derive(Debug)]
pub struct Bot {
    id: BotId,

    /// Final path segment at creation time
    name: String,

    /// Absolute working directory
    root_path: PathBuf,

    /// Set right before a deliberate kill, cleared once that exit is handled
    pub(crate) stop_requested: bool,

    /// The live process, if any
    pub(crate) handle: Option<ProcessHandle>,

    /// Number of automatic restarts after unexpected exits
    pub(crate) restarts: u32,

    /// When the current process was launched
    pub(crate) started_at: Option<DateTime<Utc>>,
}

impl Bot {
    /// Create an idle bot for `root_path`
    pub fn new(id: BotId, root_path: impl Into<PathBuf>) -> Self {
        let root_path = root_path.into();
        Self {
            id,
            name: name_for(&root_path),
            root_path,
            stop_requested: false,
            handle: None,
            restarts: 0,
            started_at: None,
        }
    }

    pub fn id(&self) -> BotId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// True exactly when a process handle is attached
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn state(&self) -> BotState {
        match (&self.handle, self.stop_requested) {
            (None, _) => BotState::Idle,
            (Some(_), true) => BotState::StoppingByRequest,
            (Some(_), false) => BotState::Running,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(|h| h.pid())
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Whether `path` names this bot's directory
    pub fn matches_path(&self, path: &Path) -> bool {
        path_key(&self.root_path) == path_key(path)
    }

    /// Time since the current process was launched
    pub fn uptime(&self) -> Option<Duration> {
        self.handle.as_ref().map(|h| h.uptime())
    }

    /// Observable copy of the bot's state
    pub fn snapshot(&self) -> BotSnapshot {
        BotSnapshot {
            id: self.id,
            name: self.name.clone(),
            path: self.root_path.clone(),
            state: self.state(),
            running: self.is_running(),
            pid: self.pid(),
            restarts: self.restarts,
            started_at: self.started_at,
            uptime_secs: self.uptime().map(|d| d.as_secs()),
        }
    }
}

/// Point-in-time view of a bot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotSnapshot {
    pub id: BotId,
    pub name: String,
    pub path: PathBuf,
    pub state: BotState,
    pub running: bool,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<u64>,
}

impl BotSnapshot {
    /// Format uptime as human-readable string
    pub fn format_uptime(&self) -> String {
        let Some(secs) = self.uptime_secs else {
            return "-".to_string();
        };

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
        }
    }

    /// Get display line for listings
    pub fn display_line(&self) -> String {
        let pid_str = self.pid.map(|p| format!("PID {}", p)).unwrap_or_default();

        format!(
            "{} {} {} ({}) {} | up {} | restarts {} | {}",
            self.state.emoji(),
            self.id,
            self.name,
            self.state,
            pid_str,
            self.format_uptime(),
            self.restarts,
            self.path.display()
        )
    }
}
