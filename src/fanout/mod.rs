//! SSH fan-out engine: credentials, connections, command execution and results.
//!
//! This module is organized into the following submodules:
//!
//! - `types`: Host records, command outcomes and the run summary
//! - `config`: Run settings with environment variable support
//! - `inventory`: YAML host inventory loading, validation and filtering
//! - `error`: Error types and their scope (fatal, per host, per command)
//! - `auth`: Credential resolution and authentication strategies
//! - `session`: russh client handler and host key trust policy
//! - `client`: Algorithm profiles and connection establishment with fallback
//! - `runner`: Single command execution, including `sudo -S` secret piping
//! - `sink`: Console and log file result aggregation
//! - `dispatcher`: Concurrent per-host execution

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod inventory;
pub mod runner;
pub mod session;
pub mod sink;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use client::{AlgorithmProfile, SshConnector};
pub use config::RunSettings;
pub use dispatcher::Dispatcher;
pub use error::{ErrorScope, FanoutError};
pub use session::HostKeyPolicy;
pub use sink::ResultSink;
pub use types::{CommandOutcome, HostRecord, RunSummary};
