//! botfleet - Supervisor for long-running bot processes
//!
//! Runs a set of bot directories as child processes with start, stop and
//! restart control, restarts any bot that exits without being asked to, and
//! streams each bot's output as colored segments.
//!
//! # Architecture
//!
//! - **fleet**: Bot records, the per-bot state machine and the fleet controller
//! - **launch**: Chooses the command line for a bot directory
//! - **config**: Persisted bot list and launch settings
//! - **style**: Terminal rendering of colored log lines
//!
//! Color decoding lives in the `ansi-segments` workspace crate.

pub mod config;
pub mod error;
pub mod fleet;
pub mod launch;
pub mod logging;
pub mod style;

// Re-exports
pub use error::{FleetError, Result};
