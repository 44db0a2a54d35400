//! Command-line front-end.
//!
//! Parses arguments, asks for confirmations, and renders reports. All
//! decisions are made by the orchestrator.

mod commands;
mod output;
mod prompt;

pub use commands::{Cli, Commands, ConfigCommands, OutputFormat};
pub use output::OutputFormatter;
pub use prompt::StdinConfirmer;
