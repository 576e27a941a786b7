//! Runs one command on an open connection and judges its result.

use tracing::{debug, error};

use super::client::{ExecOutput, RemoteConnection};
use super::error::{ChannelError, FanoutError};
use super::types::CommandOutcome;

/// Markers of a remote `sudo` that reads the password from stdin.
const STDIN_SUDO_MARKERS: &[&str] = &["sudo -S", "sudo --stdin"];

/// Whether `command` expects the host secret on its standard input.
pub fn needs_secret(command: &str) -> bool {
    STDIN_SUDO_MARKERS
        .iter()
        .any(|marker| command.contains(marker))
}

/// Bytes to write to the remote stdin for `command`, if any.
fn stdin_payload(command: &str, secret: Option<&str>) -> Option<Vec<u8>> {
    match secret {
        Some(secret) if !secret.is_empty() && needs_secret(command) => {
            Some(format!("{}\n", secret).into_bytes())
        }
        _ => None,
    }
}

/// Run `command` on `conn` and turn whatever happens into a [`CommandOutcome`].
///
/// Never fails: channel errors and unsuccessful exits become failed outcomes so the
/// caller can move on to the next command.
pub async fn run_command<R: RemoteConnection + ?Sized>(
    conn: &R,
    host: &str,
    command: &str,
    secret: Option<&str>,
) -> CommandOutcome {
    let stdin = stdin_payload(command, secret);
    debug!(host = %host, command = %command, with_stdin = stdin.is_some(), "running command");

    let exec = match conn.execute(command, stdin).await {
        Ok(exec) => exec,
        Err(e) => {
            let err = match e {
                ChannelError::Open(reason) => FanoutError::Session {
                    host: host.to_string(),
                    reason,
                },
                ChannelError::Exec(reason) => FanoutError::CommandExecution {
                    host: host.to_string(),
                    command: command.to_string(),
                    reason,
                },
            };
            error!(host = %host, command = %command, scope = %err.scope(), "{}", err);
            return CommandOutcome::failed(host, command, Vec::new(), err.to_string());
        }
    };

    match failure_reason(&exec) {
        None => CommandOutcome::succeeded(host, command, exec.output),
        Some(reason) => {
            let err = FanoutError::CommandExecution {
                host: host.to_string(),
                command: command.to_string(),
                reason,
            };
            error!(host = %host, command = %command, "{}", err);
            CommandOutcome::failed(host, command, exec.output, err.to_string())
        }
    }
}

fn failure_reason(exec: &ExecOutput) -> Option<String> {
    if exec.timed_out {
        return Some("timed out".to_string());
    }
    if let Some(signal) = &exec.exit_signal {
        return Some(format!("killed by signal {}", signal));
    }
    match exec.exit_status {
        Some(0) => None,
        Some(code) => Some(format!("exit status {}", code)),
        None => Some("connection closed without exit status".to_string()),
    }
}
