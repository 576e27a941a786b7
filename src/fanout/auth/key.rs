//! Private key file SSH authentication.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::fanout::error::FanoutError;
use crate::fanout::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Private key file authentication strategy.
///
/// The key is read and parsed once, when credentials are resolved, so a bad
/// key file fails the host before any connection is attempted. Only
/// passphrase-less keys are supported.
#[derive(Clone)]
pub struct KeyAuth {
    key_path: PathBuf,
    key: Arc<keys::PrivateKey>,
}

impl KeyAuth {
    /// Read and parse the private key at `key_path`.
    pub fn load(key_path: impl Into<PathBuf>) -> Result<Self, FanoutError> {
        let key_path = key_path.into();

        let bytes = std::fs::read(&key_path).map_err(|source| FanoutError::KeyRead {
            path: key_path.clone(),
            source,
        })?;

        let text = std::str::from_utf8(&bytes).map_err(|e| FanoutError::KeyParse {
            path: key_path.clone(),
            reason: format!("key file is not valid UTF-8: {}", e),
        })?;

        let key = keys::decode_secret_key(text, None).map_err(|e| FanoutError::KeyParse {
            path: key_path.clone(),
            reason: e.to_string(),
        })?;

        let algorithm = key.algorithm();
        debug!(path = ?key_path, algorithm = algorithm.as_str(), "loaded private key");

        Ok(Self {
            key_path,
            key: Arc::new(key),
        })
    }

    pub fn path(&self) -> &Path {
        &self.key_path
    }
}

impl std::fmt::Debug for KeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAuth")
            .field("key_path", &self.key_path)
            .field("algorithm", &self.key.algorithm().as_str())
            .finish()
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, russh::Error> {
        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::clone(&self.key), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
