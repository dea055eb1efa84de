//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`evaluate`] - Rule evaluation against sensor readings
//! - [`validate`] - Configuration validation
//! - [`notify`] - Initial notification delivery
//! - [`escalate`] - Running one escalation stage
//! - [`plan_escalation`] - Escalation schedule preview

pub mod escalate;
pub mod evaluate;
pub mod notify;
pub mod plan_escalation;
pub mod validate;

pub use escalate::EscalateCommand;
pub use evaluate::EvaluateCommand;
pub use notify::NotifyCommand;
pub use plan_escalation::PlanEscalationCommand;
pub use validate::ValidateCommand;
