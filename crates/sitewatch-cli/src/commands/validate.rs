//! Configuration validation command implementation.

use std::io::Write;

use sitewatch_alerts::{AlertConfiguration, AlertRuleEngine};
use tracing::info;

use crate::error::CliError;
use crate::output::OutputFormat;

/// Handler for `validate`.
pub struct ValidateCommand<'a> {
    engine: &'a AlertRuleEngine,
}

impl<'a> ValidateCommand<'a> {
    /// Creates a new validate command handler.
    #[must_use]
    pub const fn new(engine: &'a AlertRuleEngine) -> Self {
        Self { engine }
    }

    /// Validates `configuration` and writes the report.
    ///
    /// An invalid configuration is a successful run; the verdict is in the report.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription lookup fails or the report cannot be written.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        configuration: &AlertConfiguration,
    ) -> Result<(), CliError> {
        let report = self.engine.validate_configuration(configuration)?;
        info!(
            configuration_id = %configuration.id,
            is_valid = report.is_valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "configuration validated"
        );

        format.write(out, &report)?;
        Ok(())
    }
}
