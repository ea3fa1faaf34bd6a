//! Error types for botfleet
//!
//! Defines the error enum covering every failure mode of the supervisor.
//! Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for botfleet operations
pub type Result<T> = std::result::Result<T, FleetError>;

/// Error type for botfleet operations
#[derive(Error, Debug)]
pub enum FleetError {
    /// Bot directory is already registered (case-insensitive path match)
    #[error("Bot already added: {}", .0.display())]
    DuplicateBot(PathBuf),

    /// Path to add is not an existing directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Neither an entry script nor a package manifest was found
    #[error("No {entry_script} or {manifest} in {}", .root.display())]
    NoLaunchTarget {
        root: PathBuf,
        entry_script: String,
        manifest: String,
    },

    /// The OS refused to create the process
    #[error("Failed to start {program}: {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Removal refused while the bot is active
    #[error("Bot '{0}' is running; stop it before removing it")]
    BotRunning(String),

    /// Kill issued against a process that had already gone away.
    ///
    /// Never surfaced to callers; logged at debug level where it happens.
    #[error("Process {pid:?} had already exited: {source}")]
    TerminationRaceIgnored {
        pid: Option<u32>,
        #[source]
        source: std::io::Error,
    },

    /// No bot matches the given id, name or path
    #[error("Bot not found: {0}")]
    BotNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl FleetError {
    /// Whether this error belongs to the taxonomy that is swallowed silently
    pub fn is_ignorable(&self) -> bool {
        matches!(self, FleetError::TerminationRaceIgnored { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = FleetError::DuplicateBot(PathBuf::from("/bots/alpha"));
        assert_eq!(err.to_string(), "Bot already added: /bots/alpha");

        let err = FleetError::NoLaunchTarget {
            root: PathBuf::from("/bots/empty"),
            entry_script: "index.js".to_string(),
            manifest: "package.json".to_string(),
        };
        assert_eq!(err.to_string(), "No index.js or package.json in /bots/empty");

        let err = FleetError::BotRunning("alpha".to_string());
        assert!(err.to_string().contains("stop it before removing"));
    }

    #[test]
    fn test_ignorable() {
        let race = FleetError::TerminationRaceIgnored {
            pid: Some(42),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "gone"),
        };
        assert!(race.is_ignorable());
        assert!(!FleetError::BotNotFound("x".to_string()).is_ignorable());
    }

    #[test]
    fn test_io_conversion() {
        fn read() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/botfleet/file")?)
        }
        assert!(matches!(read(), Err(FleetError::Io(_))));
    }
}
