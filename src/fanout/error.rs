//! Error types for the fan-out engine.
//!
//! Every [`FanoutError`] belongs to one [`ErrorScope`], which decides how far it
//! is allowed to travel:
//!
//! 1. **Fatal**: the inventory or the run setup is unusable. Surfaced to `main`
//!    before any connection is attempted.
//! 2. **Host**: credentials or the connection for one host failed. That host is
//!    abandoned; every other host keeps going.
//! 3. **Command**: one command could not run or exited unsuccessfully. It is
//!    reported as a failed outcome and the host moves on to its next command.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::client::AlgorithmProfile;

/// How far an error propagates before it is turned into a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Fatal,
    Host,
    Command,
}

impl std::fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorScope::Fatal => write!(f, "fatal"),
            ErrorScope::Host => write!(f, "host"),
            ErrorScope::Command => write!(f, "command"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read key file {path:?}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse key file {path:?}: {reason}")]
    KeyParse { path: PathBuf, reason: String },

    #[error("failed to read password for {user}@{host}: {source}")]
    PasswordRead {
        user: String,
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to {host} failed ({profile} algorithms): {source}")]
    Connection {
        host: String,
        profile: AlgorithmProfile,
        #[source]
        source: AttemptError,
    },

    #[error("session creation failed on {host}: {reason}")]
    Session { host: String, reason: String },

    #[error("command failed on {host}: {command}: {reason}")]
    CommandExecution {
        host: String,
        command: String,
        reason: String,
    },
}

impl FanoutError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            FanoutError::Config(_) => ErrorScope::Fatal,
            FanoutError::KeyRead { .. }
            | FanoutError::KeyParse { .. }
            | FanoutError::PasswordRead { .. }
            | FanoutError::Connection { .. } => ErrorScope::Host,
            FanoutError::Session { .. } | FanoutError::CommandExecution { .. } => {
                ErrorScope::Command
            }
        }
    }
}

/// Why a single connection attempt with one algorithm profile failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("connection timed out after {0:?}")]
    TimedOut(Duration),

    #[error("ssh error: {0}")]
    Transport(#[from] russh::Error),

    #[error("authentication rejected for user {user}")]
    AuthRejected { user: String },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failure inside one command channel, before host context is attached.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport could not allocate a channel; the command never ran.
    #[error("failed to open channel: {0}")]
    Open(String),

    #[error("{0}")]
    Exec(String),
}
