//! Credential resolution for one host record.
//!
//! A key file always wins and never prompts. Without a key file the configured
//! password is used, or the user is asked for one on the terminal. The resolver
//! is called for every host before any connection starts, so at most one prompt
//! is ever on screen.

use std::io;

use async_trait::async_trait;
use crossterm::style::Stylize;
use russh::client;
use tracing::debug;

use crate::fanout::error::FanoutError;
use crate::fanout::session::SshClientHandler;
use crate::fanout::types::HostRecord;

use super::traits::AuthStrategy;
use super::{KeyAuth, PasswordAuth};

/// How a host authenticates.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    KeyBased(KeyAuth),
    PasswordBased(PasswordAuth),
}

#[async_trait]
impl AuthStrategy for AuthMethod {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, russh::Error> {
        match self {
            AuthMethod::KeyBased(auth) => auth.authenticate(handle, username).await,
            AuthMethod::PasswordBased(auth) => auth.authenticate(handle, username).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AuthMethod::KeyBased(auth) => auth.name(),
            AuthMethod::PasswordBased(auth) => auth.name(),
        }
    }
}

/// Everything a host task needs to log in and answer `sudo -S`.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub auth: AuthMethod,
    /// Secret written to `sudo -S` prompts, if any is known
    pub secret: Option<String>,
}

/// Source of interactively entered passwords.
pub trait PasswordPrompt: Send + Sync {
    /// Show `prompt` and read one line without echoing it.
    fn read_password(&self, prompt: &str) -> io::Result<String>;
}

/// Prompts on the controlling terminal with echo disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read_password(&self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt.yellow().to_string())
    }
}

/// Turns host records into [`ResolvedCredentials`].
pub struct CredentialResolver<P> {
    prompt: P,
}

impl<P: PasswordPrompt> CredentialResolver<P> {
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }

    pub fn resolve(&self, host: &HostRecord) -> Result<ResolvedCredentials, FanoutError> {
        if let Some(key_file) = host.configured_key_file() {
            let key = KeyAuth::load(key_file)?;
            debug!(host = %host.label(), "using key authentication");
            return Ok(ResolvedCredentials {
                auth: AuthMethod::KeyBased(key),
                secret: host.configured_password().map(str::to_string),
            });
        }

        let password = match host.configured_password() {
            Some(password) => password.to_string(),
            None => {
                let prompt = format!("Enter password for {}@{}: ", host.username, host.address);
                self.prompt
                    .read_password(&prompt)
                    .map_err(|source| FanoutError::PasswordRead {
                        user: host.username.clone(),
                        host: host.address.clone(),
                        source,
                    })?
            }
        };

        debug!(host = %host.label(), "using password authentication");
        Ok(ResolvedCredentials {
            auth: AuthMethod::PasswordBased(PasswordAuth::new(password.clone())),
            secret: Some(password),
        })
    }
}
