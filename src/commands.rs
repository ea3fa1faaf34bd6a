//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here, along with the
//! parser for control lines typed while `botfleet run` is active.

use botfleet::config::{BotStore, LaunchSettings};
use botfleet::fleet::FleetCommand;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// botfleet - Keep a fleet of bot processes running
#[derive(Parser, Debug)]
#[command(name = "botfleet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the bot list (default: ~/.config/botfleet/bots.json)
    #[arg(short, long, global = true, env = "BOTFLEET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interpreter used to run entry scripts (default: node)
    #[arg(long, global = true, env = "BOTFLEET_INTERPRETER")]
    pub interpreter: Option<String>,

    /// Package manager used when only a manifest exists (default: npm)
    #[arg(long, global = true, env = "BOTFLEET_PACKAGE_MANAGER")]
    pub package_manager: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Bot list selected by --config, or the default one
    pub fn store(&self) -> BotStore {
        match &self.config {
            Some(path) => BotStore::new(path),
            None => BotStore::open_default(),
        }
    }

    /// Launch settings with command-line overrides applied
    pub fn launch_settings(&self) -> LaunchSettings {
        let mut settings = LaunchSettings::default();
        if let Some(ref interpreter) = self.interpreter {
            settings = settings.with_interpreter(interpreter);
        }
        if let Some(ref package_manager) = self.package_manager {
            settings = settings.with_package_manager(package_manager);
        }
        settings
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a bot directory
    Add {
        /// Directory containing index.js or package.json
        path: PathBuf,
    },

    /// Deregister a bot
    Remove {
        /// Bot id (bot-N), name or path
        bot: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List registered bots
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start every bot and supervise them until interrupted
    ///
    /// Control commands are read from stdin, one per line:
    /// start|stop|restart <bot>, start-all, stop-all, restart-all, status, quit
    Run {
        /// How bot output is printed
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Output format for `run`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored lines prefixed with the bot name
    Text,
    /// One JSON event per line
    Json,
}

/// A control line typed while the fleet is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    Start(String),
    Stop(String),
    Restart(String),
    StartAll,
    StopAll,
    RestartAll,
    Status,
    Help,
    Quit,
}

impl ControlLine {
    /// The fleet command this line maps to, if it is not handled by the shell
    pub fn into_command(self) -> Option<FleetCommand> {
        match self {
            Self::Start(bot) => Some(FleetCommand::Start(bot)),
            Self::Stop(bot) => Some(FleetCommand::Stop(bot)),
            Self::Restart(bot) => Some(FleetCommand::Restart(bot)),
            Self::StartAll => Some(FleetCommand::StartAll),
            Self::StopAll => Some(FleetCommand::StopAll),
            Self::RestartAll => Some(FleetCommand::RestartAll),
            Self::Quit => Some(FleetCommand::Shutdown),
            Self::Status | Self::Help => None,
        }
    }
}

pub const CONTROL_HELP: &str = "\
Commands:
  start <bot>      Start a bot (id, name or path)
  stop <bot>       Stop a bot
  restart <bot>    Restart a bot
  start-all        Start every idle bot
  stop-all         Stop every running bot
  restart-all      Restart every bot
  status           List bots
  quit             Stop everything and exit";

/// Parse one control line. Blank lines yield `Ok(None)`.
pub fn parse_control(line: &str) -> Result<Option<ControlLine>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let target = |make: fn(String) -> ControlLine| {
        if rest.is_empty() {
            Err(format!("'{}' needs a bot id, name or path", verb))
        } else {
            Ok(Some(make(rest.to_string())))
        }
    };

    match verb.to_lowercase().as_str() {
        "start" => target(ControlLine::Start),
        "stop" => target(ControlLine::Stop),
        "restart" => target(ControlLine::Restart),
        "start-all" => Ok(Some(ControlLine::StartAll)),
        "stop-all" => Ok(Some(ControlLine::StopAll)),
        "restart-all" => Ok(Some(ControlLine::RestartAll)),
        "status" | "ls" => Ok(Some(ControlLine::Status)),
        "help" | "?" => Ok(Some(ControlLine::Help)),
        "quit" | "exit" => Ok(Some(ControlLine::Quit)),
        _ => Err(format!("Unknown command '{}' (try 'help')", verb)),
    }
}
