//! Concurrent fan-out of command batches across hosts.
//!
//! A run has two phases:
//!
//! 1. **Credential resolution**: every host is resolved in declaration order on a
//!    blocking thread, so password prompts never overlap on the terminal. Hosts
//!    whose credentials fail are reported and get no task.
//! 2. **Execution**: one tokio task per remaining host. A semaphore bounds how many
//!    hosts are active at once; each task connects with fallback, runs its commands
//!    in order and always closes the connection.
//!
//! Ctrl-C cancels the shared [`CancellationToken`]. Tasks stop while waiting for a
//! permit, while connecting, or between commands; a host stopped before it
//! connected is reported as cancelled. A command already running is
//! allowed to finish.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::auth::{CredentialResolver, PasswordPrompt, ResolvedCredentials};
use super::client::{Connector, RemoteConnection, connect_with_fallback};
use super::error::FanoutError;
use super::runner::run_command;
use super::sink::ResultSink;
use super::types::{HostRecord, RunSummary};

pub struct Dispatcher<C, P> {
    connector: Arc<C>,
    resolver: Arc<CredentialResolver<P>>,
    sink: Arc<ResultSink>,
    limit: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<C, P> Dispatcher<C, P>
where
    C: Connector,
    P: PasswordPrompt + 'static,
{
    pub fn new(
        connector: C,
        resolver: CredentialResolver<P>,
        sink: Arc<ResultSink>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            resolver: Arc::new(resolver),
            sink,
            limit: Arc::new(Semaphore::new(max_concurrency.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every host's commands and wait for all of them.
    pub async fn run(&self, hosts: Vec<HostRecord>) -> RunSummary {
        self.sink.set_hosts(hosts.len());
        info!(hosts = hosts.len(), "starting run");

        let mut handles = Vec::new();
        for (host, credentials) in self.resolve_all(hosts).await {
            let credentials = match credentials {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!(host = %host.label(), scope = %e.scope(), "{}", e);
                    self.sink.record_host_failure(host.label(), &e);
                    continue;
                }
            };

            handles.push(tokio::spawn(run_host(
                Arc::clone(&self.connector),
                Arc::clone(&self.sink),
                Arc::clone(&self.limit),
                self.cancel.clone(),
                host,
                credentials,
            )));
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("host task failed: {}", e);
            }
        }

        if self.cancel.is_cancelled() {
            self.sink.mark_cancelled();
        }
        self.sink.summary()
    }

    /// Resolve credentials for every host, one at a time, off the async runtime.
    async fn resolve_all(
        &self,
        hosts: Vec<HostRecord>,
    ) -> Vec<(HostRecord, Result<ResolvedCredentials, FanoutError>)> {
        let resolver = Arc::clone(&self.resolver);
        let cancel = self.cancel.clone();

        let resolved = tokio::task::spawn_blocking(move || {
            let mut resolved = Vec::with_capacity(hosts.len());
            for host in hosts {
                if cancel.is_cancelled() {
                    debug!(host = %host.label(), "cancelled before credential resolution");
                    break;
                }
                let credentials = resolver.resolve(&host);
                resolved.push((host, credentials));
            }
            resolved
        })
        .await;

        match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("credential resolution failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Execution unit for one host.
async fn run_host<C: Connector>(
    connector: Arc<C>,
    sink: Arc<ResultSink>,
    limit: Arc<Semaphore>,
    cancel: CancellationToken,
    host: HostRecord,
    credentials: ResolvedCredentials,
) {
    let _permit = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(host = %host.label(), "cancelled while waiting for a slot");
            sink.cancelled(host.label());
            return;
        }
        permit = limit.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(e) => {
                error!(host = %host.label(), "concurrency limit closed: {}", e);
                return;
            }
        },
    };

    if cancel.is_cancelled() {
        sink.cancelled(host.label());
        return;
    }

    sink.connecting(host.label());
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(host = %host.label(), "cancelled while connecting");
            sink.cancelled(host.label());
            return;
        }
        connected = connect_with_fallback(connector.as_ref(), &host, &credentials.auth) => connected,
    };

    let conn = match connected {
        Ok(conn) => conn,
        Err(e) => {
            error!(host = %host.label(), scope = %e.scope(), "{}", e);
            sink.record_host_failure(host.label(), &e);
            return;
        }
    };

    for command in &host.commands {
        if cancel.is_cancelled() {
            warn!(host = %host.label(), "cancelled, skipping remaining commands");
            break;
        }
        let outcome = run_command(&conn, host.label(), command, credentials.secret.as_deref()).await;
        sink.record(&outcome);
    }

    conn.close().await;
    debug!(host = %host.label(), "host finished");
}
