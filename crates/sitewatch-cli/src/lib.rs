//! # sitewatch-cli
//!
//! Sitewatch command-line interface.
//!
//! Provides commands for:
//! - Evaluating alert configurations against sensor readings
//! - Validating configurations against subscription tiers
//! - Sending initial notifications and running escalation stages
//! - Previewing escalation schedules
//!
//! # Architecture
//!
//! Inputs are JSON documents read from disk; tuning comes from an optional
//! TOML [`AlertingConfig`](sitewatch_alerts::AlertingConfig). Each command
//! wraps one `sitewatch-alerts` operation and writes its result through
//! [`OutputFormat`].
//!
//! ```text
//! ┌──────────────┐   JSON / TOML   ┌──────────────────┐   email / SMS / webhook
//! │ sitewatch    │────────────────►│ sitewatch-alerts │────────────────────────►
//! └──────────────┘                 └──────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod input;
pub mod output;

pub use cli::{Cli, Commands, Format, Tier};
pub use error::CliError;
pub use output::OutputFormat;
