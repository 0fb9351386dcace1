//! Configuration management for tether

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Configuration for the controller daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Address all three listeners bind to
    pub host: String,

    /// Port agents connect to
    pub agent_port: u16,

    /// Port operator clients connect to
    pub client_port: u16,

    /// Port the websocket bridge listens on
    pub web_port: u16,

    /// Base prompt shown to unbound operator sessions
    pub prompt: String,

    /// Directory certificate file names are resolved against
    pub certs_dir: PathBuf,

    /// Server certificate file name
    pub server_cert: String,

    /// Server private key file name
    pub server_key: String,

    /// CA certificate file names used to verify peers
    pub ca_certs: Vec<String>,

    /// Directory for best-effort JSON state snapshots (disabled when unset)
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            agent_port: 1111,
            client_port: 2222,
            web_port: 4040,
            prompt: "tether> ".to_string(),
            certs_dir: default_config_dir().join("certs"),
            server_cert: "server.cert.pem".to_string(),
            server_key: "server.key.pem".to_string(),
            ca_certs: vec!["ca.cert.pem".to_string()],
            snapshot_dir: None,
        }
    }
}

impl ControllerConfig {
    /// Agent listener address
    pub fn agent_addr(&self) -> String {
        format!("{}:{}", self.host, self.agent_port)
    }

    /// Client listener address
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.host, self.client_port)
    }

    /// Websocket listener address
    pub fn web_addr(&self) -> String {
        format!("{}:{}", self.host, self.web_port)
    }

    /// Resolve a certificate file name against the certs directory
    pub fn cert_path(&self, name: &str) -> PathBuf {
        self.certs_dir.join(name)
    }

    /// Resolved CA certificate paths
    pub fn ca_paths(&self) -> Vec<PathBuf> {
        self.ca_certs.iter().map(|n| self.cert_path(n)).collect()
    }
}

/// Configuration for the remote agent process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Controller host to connect to
    pub controller_host: String,

    /// Controller agent port
    pub controller_port: u16,

    /// Directory certificate file names are resolved against
    pub certs_dir: PathBuf,

    /// Agent certificate file name
    pub cert: String,

    /// Agent private key file name
    pub key: String,

    /// CA certificate file name used to verify the controller
    pub ca: String,

    /// Shell used to execute relayed command lines
    pub shell: String,

    /// The controller's base prompt, used as an echo-loop guard
    pub controller_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            controller_host: "127.0.0.1".to_string(),
            controller_port: 1111,
            certs_dir: default_config_dir().join("certs"),
            cert: "agent.cert.pem".to_string(),
            key: "agent.key.pem".to_string(),
            ca: "ca.cert.pem".to_string(),
            shell: "sh".to_string(),
            controller_prompt: "tether> ".to_string(),
        }
    }
}

impl AgentConfig {
    /// Controller address to dial
    pub fn controller_addr(&self) -> String {
        format!("{}:{}", self.controller_host, self.controller_port)
    }

    /// Resolve a certificate file name against the certs directory
    pub fn cert_path(&self, name: &str) -> PathBuf {
        self.certs_dir.join(name)
    }
}

/// Configuration for an operator client session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Controller host to connect to
    pub controller_host: String,

    /// Controller client port
    pub controller_port: u16,

    /// Directory certificate file names are resolved against
    pub certs_dir: PathBuf,

    /// Client certificate file name
    pub cert: String,

    /// Client private key file name
    pub key: String,

    /// CA certificate file name used to verify the controller
    pub ca: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            controller_host: "127.0.0.1".to_string(),
            controller_port: 2222,
            certs_dir: default_config_dir().join("certs"),
            cert: "client.cert.pem".to_string(),
            key: "client.key.pem".to_string(),
            ca: "ca.cert.pem".to_string(),
        }
    }
}

impl ClientConfig {
    /// Controller address to dial
    pub fn controller_addr(&self) -> String {
        format!("{}:{}", self.controller_host, self.controller_port)
    }

    /// Resolve a certificate file name against the certs directory
    pub fn cert_path(&self, name: &str) -> PathBuf {
        self.certs_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.agent_addr(), "127.0.0.1:1111");
        assert_eq!(config.client_addr(), "127.0.0.1:2222");
        assert_eq!(config.web_addr(), "127.0.0.1:4040");
        assert_eq!(config.prompt, "tether> ");
        assert!(config.snapshot_dir.is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ControllerConfig::default();
        config.agent_port = 5555;
        config.ca_certs = vec!["other-ca.pem".to_string()];

        save_config(&path, &config).unwrap();
        let loaded: ControllerConfig = load_config(&path).unwrap();

        assert_eq!(loaded.agent_port, 5555);
        assert_eq!(loaded.ca_certs, vec!["other-ca.pem".to_string()]);
        assert_eq!(loaded.client_port, config.client_port);
    }

    #[test]
    fn test_load_missing_config() {
        let err = load_config::<ControllerConfig>(Path::new("/nonexistent/config.toml"));
        assert!(matches!(err, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "agent_port = 9999\n").unwrap();

        let loaded: ControllerConfig = load_config(&path).unwrap();
        assert_eq!(loaded.agent_port, 9999);
        assert_eq!(loaded.client_port, 2222);
    }
}
