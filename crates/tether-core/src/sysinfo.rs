//! Host metadata snapshot

use serde::{Deserialize, Serialize};

/// Snapshot of host metadata captured when an endpoint is constructed.
///
/// Everything but `cwd` is immutable for the life of the endpoint; `cwd`
/// tracks working-directory changes relayed through a `chdir` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Hostname of the machine
    pub hostname: String,
    /// Operating system (e.g. "linux", "macos")
    pub platform: String,
    /// Name of the user the process runs as
    pub username: String,
    /// Current working directory
    pub cwd: String,
}

impl SystemInfo {
    /// Capture a snapshot of the current process environment
    pub fn capture() -> Self {
        Self {
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            platform: std::env::consts::OS.to_string(),
            username: whoami::username(),
            cwd: std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| String::from("/")),
        }
    }

    /// The `user@host` signature agents register under
    pub fn signature(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}
