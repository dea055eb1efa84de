//! Loading JSON inputs and the alerting configuration.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use sitewatch_alerts::AlertingConfig;

use crate::error::CliError;

/// Reads and deserializes a JSON file.
///
/// # Errors
///
/// Returns `CliError::Io` if the file cannot be read and `CliError::Input`
/// if it is not valid JSON for `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| CliError::Input {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Loads the alerting configuration, or the defaults when no file is given.
///
/// # Errors
///
/// Returns `CliError::Config` if the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> Result<AlertingConfig, CliError> {
    match path {
        Some(path) => {
            AlertingConfig::from_file(path).map_err(|e| CliError::Config(e.to_string()))
        }
        None => Ok(AlertingConfig::default()),
    }
}
