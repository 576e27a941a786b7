//! SSH client handler and host key trust policy.
//!
//! # Architecture
//!
//! - `HostKeyPolicy`: decides whether a server's public key is trusted. Checking
//!   against `known_hosts` is the default; accepting every key has to be requested
//!   explicitly (`--insecure`), and a host record may pin a SHA256 fingerprint.
//! - `SshClientHandler`: the russh client handler, carrying the policy for the one
//!   host it was created for.

use std::path::PathBuf;

use russh::keys::known_hosts::{check_known_hosts, check_known_hosts_path};
use russh::keys::{HashAlg, PublicKey};
use russh::{client, keys};
use tracing::{debug, error, warn};

use super::types::HostRecord;

/// How server host keys are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Key must be listed in a known_hosts file (`~/.ssh/known_hosts` when `path` is `None`)
    KnownHosts { path: Option<PathBuf> },
    /// Key must have this SHA256 fingerprint, e.g. `SHA256:9/M2Qo...`
    Fingerprint(String),
    /// Every key is accepted. Only for explicit opt-in.
    AcceptAny,
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::KnownHosts { path: None }
    }
}

impl HostKeyPolicy {
    /// Effective policy for one host; a pinned fingerprint wins over the run policy.
    pub fn for_host(&self, host: &HostRecord) -> HostKeyPolicy {
        match host.fingerprint.as_deref().map(str::trim) {
            Some(fingerprint) if !fingerprint.is_empty() => {
                HostKeyPolicy::Fingerprint(fingerprint.to_string())
            }
            _ => self.clone(),
        }
    }

    /// Check a server key presented by `host:port`.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        match self {
            HostKeyPolicy::AcceptAny => {
                warn!(host = %host, port, "accepting host key without verification");
                true
            }
            HostKeyPolicy::Fingerprint(expected) => {
                let actual = key.fingerprint(HashAlg::Sha256).to_string();
                if actual == *expected {
                    debug!(host = %host, "host key matches pinned fingerprint");
                    true
                } else {
                    error!(
                        host = %host,
                        expected = %expected,
                        actual = %actual,
                        "host key does not match pinned fingerprint"
                    );
                    false
                }
            }
            HostKeyPolicy::KnownHosts { path } => {
                let checked = match path {
                    Some(path) => check_known_hosts_path(host, port, key, path),
                    None => check_known_hosts(host, port, key),
                };
                match checked {
                    Ok(true) => {
                        debug!(host = %host, port, "host key verified against known_hosts");
                        true
                    }
                    Ok(false) => {
                        warn!(host = %host, port, "host key not found in known_hosts");
                        false
                    }
                    Err(keys::Error::KeyChanged { line }) => {
                        error!(host = %host, port, line, "host key changed since it was recorded");
                        false
                    }
                    Err(e) => {
                        warn!(host = %host, port, "failed to check known_hosts: {}", e);
                        false
                    }
                }
            }
        }
    }
}

/// Client handler for russh that verifies host keys with a [`HostKeyPolicy`].
pub struct SshClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl SshClientHandler {
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
        }
    }
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(self
            .policy
            .verify(&self.host, self.port, server_public_key))
    }
}
