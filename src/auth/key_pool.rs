//! Round-robin API key pool with failover.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};

use super::mask_secret;
use crate::error::LlmError;
use crate::types::ProviderConfig;

#[derive(Default)]
struct PoolState {
    keys: Vec<Arc<SecretString>>,
    cursor: usize,
}

/// Ordered list of API keys and a cursor.
///
/// Every [`next_key`](Self::next_key) call returns the key under the cursor
/// and advances it, so successful traffic is spread evenly over all keys.
#[derive(Default)]
pub struct ApiKeyPool {
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for ApiKeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyPool")
            .field("len", &self.len())
            .finish()
    }
}

fn normalize(keys: Vec<String>) -> Vec<Arc<SecretString>> {
    let mut seen: Vec<String> = Vec::new();
    for key in keys {
        let key = key.trim().to_string();
        if !key.is_empty() && !seen.contains(&key) {
            seen.push(key);
        }
    }
    seen.into_iter()
        .map(|k| Arc::new(SecretString::from(k)))
        .collect()
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                keys: normalize(keys),
                cursor: 0,
            }),
        }
    }

    /// Primary key followed by the configured additional keys.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.all_api_keys())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().keys.is_empty()
    }

    /// Key under the cursor; advances the cursor modulo the pool size.
    pub fn next_key(&self) -> Option<Arc<SecretString>> {
        let mut state = self.lock();
        if state.keys.is_empty() {
            return None;
        }
        let idx = state.cursor % state.keys.len();
        state.cursor = (idx + 1) % state.keys.len();
        Some(state.keys[idx].clone())
    }

    /// Replace all keys and reset the cursor.
    pub fn set_keys(&self, keys: Vec<String>) {
        let mut state = self.lock();
        state.keys = normalize(keys);
        state.cursor = 0;
    }

    pub fn add_key(&self, key: impl Into<String>) {
        let key = key.into();
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        let mut state = self.lock();
        if !state.keys.iter().any(|k| k.expose_secret() == key) {
            state.keys.push(Arc::new(SecretString::from(key.to_string())));
        }
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.keys.clear();
        state.cursor = 0;
    }

    /// Run `op` with successive keys until one succeeds.
    ///
    /// Auth, quota and rate-limit failures advance to the next key; any other
    /// error is returned immediately. After one full pass over the pool the
    /// last error is returned.
    pub async fn execute_with_failover<F, Fut, T>(&self, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut(Arc<SecretString>) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let attempts = self.len();
        let mut last_error = None;
        for attempt in 0..attempts {
            let Some(key) = self.next_key() else { break };
            let label = mask_secret(key.expose_secret());
            match op(key).await {
                Ok(value) => return Ok(value),
                Err(err) if err.triggers_credential_failover() => {
                    tracing::warn!(
                        provider = %err.provider,
                        key = %label,
                        kind = %err.kind(),
                        attempt = attempt + 1,
                        of = attempts,
                        "API key rejected, rotating to next key"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::auth("no API key configured")))
    }
}
