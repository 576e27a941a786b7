//! Authentication for SSH connections.
//!
//! This module provides a trait-based authentication system that follows
//! the Strategy pattern, plus the resolver that picks a strategy per host.
//!
//! # Available Strategies
//!
//! - [`PasswordAuth`]: Password-based authentication
//! - [`KeyAuth`]: Private key file authentication
//!
//! # Example
//!
//! ```ignore
//! use ssh_fanout::fanout::auth::{CredentialResolver, TerminalPrompt};
//!
//! let resolver = CredentialResolver::new(TerminalPrompt);
//! let creds = resolver.resolve(&host)?;
//! let ok = creds.auth.authenticate(&mut handle, &host.username).await?;
//! ```

mod key;
mod password;
mod resolver;
mod traits;

pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use resolver::{
    AuthMethod, CredentialResolver, PasswordPrompt, ResolvedCredentials, TerminalPrompt,
};
pub use traits::AuthStrategy;

#[cfg(test)]
pub(crate) use key::tests::{TEST_PRIVATE_KEY, write_key_file};
