//! Run settings resolution.
//!
//! Every setting uses a three-tier priority system:
//!
//! 1. **Parameter** - Value given on the command line (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_CONNECT_TIMEOUT` | 30s | Dial timeout per algorithm profile, in seconds |
//! | `SSH_COMMAND_TIMEOUT` | none | Per-command timeout in seconds |
//! | `SSH_MAX_CONCURRENCY` | 32 | Hosts processed at the same time |

use std::env;
use std::time::Duration;

use super::session::HostKeyPolicy;

/// Default SSH connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default number of hosts processed concurrently
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Environment variable name for SSH connection timeout
pub const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";

/// Environment variable name for the per-command timeout
pub const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_COMMAND_TIMEOUT";

/// Environment variable name for the host concurrency limit
pub const MAX_CONCURRENCY_ENV_VAR: &str = "SSH_MAX_CONCURRENCY";

/// Settings shared by every host in one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub connect_timeout: Duration,
    pub command_timeout: Option<Duration>,
    pub max_concurrency: usize,
    pub host_key_policy: HostKeyPolicy,
}

impl RunSettings {
    /// Resolve every setting from the given parameters, the environment and defaults.
    pub fn resolve(
        connect_timeout_secs: Option<u64>,
        command_timeout_secs: Option<u64>,
        max_concurrency: Option<usize>,
        host_key_policy: HostKeyPolicy,
    ) -> Self {
        Self {
            connect_timeout: Duration::from_secs(resolve_connect_timeout(connect_timeout_secs)),
            command_timeout: resolve_command_timeout(command_timeout_secs).map(Duration::from_secs),
            max_concurrency: resolve_max_concurrency(max_concurrency),
            host_key_policy,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            host_key_policy: HostKeyPolicy::default(),
        }
    }
}

/// Resolve the connection timeout value with priority: parameter -> env var -> default
pub fn resolve_connect_timeout(timeout_param: Option<u64>) -> u64 {
    // Priority 1: Use parameter if provided
    if let Some(timeout) = timeout_param {
        return timeout;
    }

    // Priority 2: Use environment variable if set
    if let Ok(env_timeout) = env::var(CONNECT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    // Priority 3: Default value
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Resolve the command timeout with priority: parameter -> env var -> none.
///
/// Zero disables the timeout.
pub fn resolve_command_timeout(timeout_param: Option<u64>) -> Option<u64> {
    let timeout = timeout_param.or_else(|| {
        env::var(COMMAND_TIMEOUT_ENV_VAR)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
    });
    timeout.filter(|secs| *secs > 0)
}

/// Resolve the concurrency limit with priority: parameter -> env var -> default.
///
/// A limit of zero would stall every host, so it is raised to one.
pub fn resolve_max_concurrency(param: Option<usize>) -> usize {
    if let Some(limit) = param {
        return limit.max(1);
    }

    if let Ok(env_limit) = env::var(MAX_CONCURRENCY_ENV_VAR)
        && let Ok(limit) = env_limit.parse::<usize>()
    {
        return limit.max(1);
    }

    DEFAULT_MAX_CONCURRENCY
}
