//! Configuration
//!
//! Two pieces of configuration drive the fleet:
//! - the persisted bot list (~/.config/botfleet/bots.json), a JSON array of
//!   bot directories
//! - launch settings, which name the entry script, manifest and the programs
//!   used to run them

mod bot_store;
mod launch_settings;

pub use bot_store::BotStore;
pub use launch_settings::LaunchSettings;
