//! tether-agent: the command-executing end of a relay pair
//!
//! Runs on a remote host, maintains an outbound TLS connection to the
//! controller, and executes relayed lines through a shell.

pub mod runner;
pub mod shell;

pub use runner::run;
pub use shell::{Reply, ShellExecutor};
