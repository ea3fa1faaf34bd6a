//! Bot supervision
//!
//! A fleet is a set of bot directories, each run as one child process at a
//! time. The [`FleetController`] is the single coordinating context: it owns
//! every [`Bot`], applies commands, and receives output lines and exits from
//! the background tasks that the [`ProcessSupervisor`] attaches to each
//! process.
//!
//! # Example
//!
//! ```no_run
//! use botfleet::config::{BotStore, LaunchSettings};
//! use botfleet::fleet::{FleetController, FleetEvent};
//!
//! # async fn example() -> botfleet::Result<()> {
//! let mut fleet = FleetController::load(BotStore::open_default(), LaunchSettings::default());
//! let mut events = fleet.subscribe();
//! fleet.start_all();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let FleetEvent::Line { bot, line } = event {
//!             println!("{}: {}", bot, line.text());
//!         }
//!     }
//! });
//!
//! fleet.run().await?;
//! # Ok(())
//! # }
//! ```

mod bot;
mod controller;
mod events;
mod supervisor;

pub use bot::{Bot, BotId, BotSnapshot, BotState, LogLine, OutputStream};
pub use controller::{Applied, FleetCommand, FleetController};
pub use events::{FleetEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};
pub use supervisor::{describe_exit, ExitDisposition, RestartOutcome, StartOutcome, StopOutcome};
