//! Data types shared by the fan-out engine.
//!
//! `HostRecord` is deserialized straight from the inventory file; the other types
//! are produced while a run is in progress.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

/// Default SSH port used when a host record does not set one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// One target machine: where to connect, how to log in, what to run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostRecord {
    /// Hostname or IP address
    #[serde(rename = "host")]
    pub address: String,
    /// SSH port, accepted as a number or a string in the inventory
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Pinned SHA256 host key fingerprint (`SHA256:...`), overrides the global policy
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Commands to run, in order
    #[serde(default)]
    pub commands: Vec<String>,
}

impl HostRecord {
    /// Create a record with the required fields and no credentials.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        commands: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            address: address.into(),
            port: None,
            username: username.into(),
            password: None,
            key_file: None,
            fingerprint: None,
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    /// Name used for this host in console output and log records.
    pub fn label(&self) -> &str {
        &self.address
    }

    /// `host:port` dial address.
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port_or_default())
    }

    /// Configured password, treating an empty string as absent.
    pub fn configured_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Configured key file, treating an empty path as absent.
    pub fn configured_key_file(&self) -> Option<&PathBuf> {
        self.key_file
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<PortValue> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(PortValue::Number(port)) => Ok(Some(port)),
        Some(PortValue::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(PortValue::Text(text)) => text
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid port '{}': {}", text, e))),
    }
}

/// Result of running one command on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub host: String,
    pub command: String,
    /// Combined stdout and stderr, in arrival order
    pub output: Vec<u8>,
    /// Failure reason, `None` when the command succeeded
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn succeeded(host: impl Into<String>, command: impl Into<String>, output: Vec<u8>) -> Self {
        Self {
            host: host.into(),
            command: command.into(),
            output,
            error: None,
        }
    }

    pub fn failed(
        host: impl Into<String>,
        command: impl Into<String>,
        output: Vec<u8>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            command: command.into(),
            output,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Counters reported once every host has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub hosts: usize,
    pub hosts_failed: usize,
    pub commands_succeeded: usize,
    pub commands_failed: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn commands_total(&self) -> usize {
        self.commands_succeeded + self.commands_failed
    }
}
