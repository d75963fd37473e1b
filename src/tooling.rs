//! Tooling & Integration Layer
//!
//! The command-line surface and the process host that drives a role through
//! its lifecycle.

pub mod cli;
pub mod host;

pub use cli::{Cli, CliContext, Commands, ConfigArgs};
pub use host::{run_role, HostSignal, EXIT_STARTUP_FAILURE};
