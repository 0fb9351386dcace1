//! Shell execution of relayed command lines
//!
//! Every line arriving over the relay is an action. A few are handled
//! in-process (`ping`, `stop`, `info`, the rickroll easter egg, and the
//! prompt echo guard); everything else is handed to the configured shell
//! with stdout and stderr captured. Working-directory changes are applied
//! to the agent process itself so later relative commands resolve against
//! the new directory.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, warn};

use tether_core::SystemInfo;

const RICK: &str = "https://www.youtube.com/watch?v=oHg5SJYRHA0";

/// What to do with one relayed action line
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to send back
    Ignore,
    /// Close the connection and shut down
    Stop,
    /// Text to write back over the relay
    Output(String),
}

pub struct ShellExecutor {
    shell: String,
    /// The controller's base prompt, trimmed. Prompt redraws relayed to
    /// the agent must not be executed as commands.
    prompt_guard: String,
}

impl ShellExecutor {
    pub fn new(shell: &str, controller_prompt: &str) -> Self {
        Self {
            shell: shell.to_string(),
            prompt_guard: controller_prompt.trim().to_string(),
        }
    }

    /// Handle one relayed action line
    pub async fn handle(&self, action: &str) -> Reply {
        let action = action.trim();
        debug!("Handle action: {}", action);

        if action.is_empty() || action == self.prompt_guard {
            warn!("Ignoring request to exec prompt: {}", action);
            Reply::Ignore
        } else if action == "ping" {
            Reply::Output("pong".to_string())
        } else if action == "stop" {
            Reply::Stop
        } else if action.to_lowercase().contains("rickroll") {
            let _ = Command::new("python3")
                .args(["-m", "webbrowser", RICK])
                .spawn();
            Reply::Output("Rick is rolling ...".to_string())
        } else if action == "info" {
            let info = SystemInfo::capture();
            let body = serde_json::to_string_pretty(&info)
                .unwrap_or_else(|_| "{}".to_string());
            Reply::Output(body)
        } else {
            Reply::Output(self.exec(action).await)
        }
    }

    /// Run an action through the shell and format the tagged response
    async fn exec(&self, action: &str) -> String {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(action)
            .output()
            .await;

        let tokens: Vec<&str> = action.split_whitespace().collect();
        let is_cd = tokens.first() == Some(&"cd") && tokens.len() > 1;

        match output {
            Ok(out) if out.status.success() && is_cd => self.change_dir(action, tokens[1]),
            Ok(out) => {
                let mut response = String::new();
                response.push_str(&String::from_utf8_lossy(&out.stdout));
                response.push_str(&String::from_utf8_lossy(&out.stderr));
                response.push('\n');
                response.push_str(action);

                if out.status.success() {
                    response.push_str(" [OK]");
                } else {
                    let code = out
                        .status
                        .code()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "No Response".to_string());
                    response.push_str(&format!(" [FAIL] (code: {})", code));
                }
                response
            }
            Err(e) => {
                warn!("Failed to spawn shell: {}", e);
                format!("\n{} [FAIL] (code: No Response)", action)
            }
        }
    }

    /// Apply a `cd` to the agent process itself.
    ///
    /// The shell already validated the destination in its own process;
    /// relative destinations are resolved against the current directory.
    fn change_dir(&self, action: &str, dest: &str) -> String {
        let target = if dest.starts_with('.') {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(dest)
        } else {
            PathBuf::from(dest)
        };

        if target.exists() && std::env::set_current_dir(&target).is_ok() {
            let cwd = std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| target.to_string_lossy().into_owned());
            warn!("Changed working directory: {}", cwd);
            format!("chdir {}", cwd)
        } else {
            format!(
                "{} [FAIL] (target {} does not exist)",
                action,
                target.display()
            )
        }
    }
}
