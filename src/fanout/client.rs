//! SSH connection establishment and remote command channels.
//!
//! ## Connection Lifecycle
//!
//! 1. **Client Configuration**: Build the russh client configuration for one
//!    [`AlgorithmProfile`] with keepalive settings.
//!
//! 2. **Connection Establishment**: Dial `host:port`, negotiate and authenticate,
//!    all bounded by the connect timeout.
//!
//! 3. **Command Execution**: Every command gets its own session channel; stdout
//!    and stderr are collected into one buffer in arrival order.
//!
//! ## Fallback Strategy
//!
//! Older servers often only speak CBC ciphers and SHA-1 key exchange. The modern
//! profile is always tried first; if that attempt fails for any reason (timeout,
//! negotiation, authentication) the legacy profile is tried once. There is no
//! further retry and no backoff.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::keys::Algorithm;
use russh::{ChannelMsg, Disconnect, Preferred, cipher, client, kex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::fanout::auth::{AuthMethod, AuthStrategy};
use crate::fanout::config::RunSettings;
use crate::fanout::error::{AttemptError, ChannelError, FanoutError};
use crate::fanout::session::{HostKeyPolicy, SshClientHandler};
use crate::fanout::types::HostRecord;

/// Keepalive interval for established connections
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Unanswered keepalives before a connection is considered dead
const KEEPALIVE_MAX: usize = 3;

const MODERN_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
];

const MODERN_KEX: &[kex::Name] = &[
    kex::CURVE25519,
    kex::ECDH_SHA2_NISTP384,
    kex::DH_G14_SHA256,
    kex::EXTENSION_SUPPORT_AS_CLIENT,
    kex::EXTENSION_OPENSSH_STRICT_KEX_AS_CLIENT,
];

const LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::AES_128_CBC,
    cipher::AES_256_CBC,
    cipher::AES_128_CTR,
    cipher::AES_256_CTR,
];

const LEGACY_KEX: &[kex::Name] = &[
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::EXTENSION_SUPPORT_AS_CLIENT,
];

/// Named set of algorithms offered during key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmProfile {
    /// CTR ciphers with curve25519 / ECDH / DH-group14-SHA256 key exchange
    Modern,
    /// CBC ciphers, SHA-1 Diffie-Hellman and `ssh-dss` host keys
    Legacy,
}

impl AlgorithmProfile {
    pub fn preferred(&self) -> Preferred {
        match self {
            AlgorithmProfile::Modern => Preferred {
                kex: Cow::Borrowed(MODERN_KEX),
                cipher: Cow::Borrowed(MODERN_CIPHERS),
                ..Default::default()
            },
            AlgorithmProfile::Legacy => {
                let defaults = Preferred::default();
                let mut key = defaults.key.to_vec();
                key.push(Algorithm::Dsa);
                Preferred {
                    kex: Cow::Borrowed(LEGACY_KEX),
                    cipher: Cow::Borrowed(LEGACY_CIPHERS),
                    key: Cow::Owned(key),
                    ..defaults
                }
            }
        }
    }
}

impl std::fmt::Display for AlgorithmProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlgorithmProfile::Modern => write!(f, "modern"),
            AlgorithmProfile::Legacy => write!(f, "legacy"),
        }
    }
}

/// Build russh client configuration for one algorithm profile.
///
/// There is no inactivity timeout: a command may legitimately stay silent for a
/// long time. Dead peers are detected by keepalives instead.
pub(crate) fn build_client_config(profile: AlgorithmProfile) -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        preferred: profile.preferred(),
        ..Default::default()
    })
}

/// Raw result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Combined stdout and stderr
    pub output: Vec<u8>,
    pub exit_status: Option<u32>,
    pub exit_signal: Option<String>,
    pub timed_out: bool,
}

/// Opens authenticated connections with one algorithm profile.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: RemoteConnection;

    async fn connect(
        &self,
        host: &HostRecord,
        auth: &AuthMethod,
        profile: AlgorithmProfile,
    ) -> Result<Self::Connection, AttemptError>;
}

/// An open connection to one host.
#[async_trait]
pub trait RemoteConnection: Send + Sync + 'static {
    /// Run `command` in a fresh channel, writing `stdin` to it if given.
    async fn execute(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, ChannelError>;

    /// Release the connection.
    async fn close(&self);
}

/// Connect with the modern profile, falling back to the legacy profile once.
pub async fn connect_with_fallback<C: Connector>(
    connector: &C,
    host: &HostRecord,
    auth: &AuthMethod,
) -> Result<C::Connection, FanoutError> {
    match connector
        .connect(host, auth, AlgorithmProfile::Modern)
        .await
    {
        Ok(conn) => return Ok(conn),
        Err(e) => {
            warn!(
                host = %host.label(),
                error = %e,
                "Retrying {} with legacy algorithms...",
                host.label()
            );
        }
    }

    connector
        .connect(host, auth, AlgorithmProfile::Legacy)
        .await
        .map_err(|source| FanoutError::Connection {
            host: host.label().to_string(),
            profile: AlgorithmProfile::Legacy,
            source,
        })
}

/// Real connector backed by russh.
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
    host_key_policy: HostKeyPolicy,
}

impl SshConnector {
    pub fn new(settings: &RunSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout,
            command_timeout: settings.command_timeout,
            host_key_policy: settings.host_key_policy.clone(),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Connection = SshConnection;

    async fn connect(
        &self,
        host: &HostRecord,
        auth: &AuthMethod,
        profile: AlgorithmProfile,
    ) -> Result<SshConnection, AttemptError> {
        let config = build_client_config(profile);
        let port = host.port_or_default();
        let handler =
            SshClientHandler::new(host.address.clone(), port, self.host_key_policy.for_host(host));

        debug!(
            host = %host.label(),
            port,
            profile = %profile,
            auth = auth.name(),
            "connecting"
        );

        let handshake = async {
            let mut handle = client::connect(config, (host.address.as_str(), port), handler).await?;

            if !auth.authenticate(&mut handle, &host.username).await? {
                return Err(AttemptError::AuthRejected {
                    user: host.username.clone(),
                });
            }

            Ok::<_, AttemptError>(handle)
        };

        let handle = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| AttemptError::TimedOut(self.connect_timeout))??;

        info!(host = %host.label(), profile = %profile, "connected");

        Ok(SshConnection {
            host: host.label().to_string(),
            handle,
            command_timeout: self.command_timeout,
        })
    }
}

/// Authenticated russh connection owned by one host task.
pub struct SshConnection {
    host: String,
    handle: client::Handle<SshClientHandler>,
    command_timeout: Option<Duration>,
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn execute(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, ChannelError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ChannelError::Open(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| ChannelError::Exec(format!("failed to execute command: {}", e)))?;

        let (mut read_half, write_half) = channel.split();

        // Remote stdin must see EOF, otherwise anything reading it never exits.
        // The secret is written from a detached task so a process that never reads
        // stdin cannot hold up output collection; shutting the writer down sends EOF.
        let feeder = match stdin {
            Some(payload) => {
                let mut writer = write_half.make_writer();
                let host = self.host.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = writer.write_all(&payload).await {
                        debug!(host = %host, "stdin write ignored: {}", e);
                        return;
                    }
                    if let Err(e) = writer.shutdown().await {
                        debug!(host = %host, "stdin eof ignored: {}", e);
                    }
                }))
            }
            None => {
                if let Err(e) = write_half.eof().await {
                    debug!(host = %self.host, "stdin eof ignored: {}", e);
                }
                None
            }
        };

        let mut result = ExecOutput {
            output: Vec::with_capacity(4096),
            ..Default::default()
        };

        match self.command_timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, collect_output(&mut read_half, &mut result))
                    .await
                    .is_err()
                {
                    warn!(
                        host = %self.host,
                        "Command timed out after {:?}, returning partial output ({} bytes)",
                        timeout,
                        result.output.len()
                    );
                    result.timed_out = true;
                }
            }
            None => collect_output(&mut read_half, &mut result).await,
        }

        if let Some(feeder) = feeder {
            feeder.abort();
        }

        // Always close the channel so the connection can serve the next command
        let _ = write_half.close().await;

        Ok(result)
    }

    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(host = %self.host, "disconnect failed: {}", e);
        }
    }
}

/// Read channel messages until the remote command has finished.
async fn collect_output(read_half: &mut russh::ChannelReadHalf, result: &mut ExecOutput) {
    loop {
        match read_half.wait().await {
            Some(ChannelMsg::Data { data }) => {
                result.output.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExtendedData { data, .. }) => {
                // stderr shares the buffer with stdout
                result.output.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                result.exit_status = Some(exit_status);
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                result.exit_signal = Some(format!("{:?}", signal_name));
            }
            Some(ChannelMsg::Eof) => {
                // Continue to wait for exit status if not received yet
                if result.exit_status.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }
}
