//! OAuth credential sets with refresh-token rotation.
//!
//! Each set lives behind its own async mutex. A request locks the set, refreshes
//! the access token when it is missing or about to expire, runs the refresh
//! callback and only then releases the token. Concurrent requests on an expired
//! set queue on the mutex and reuse the refreshed token.
//!
//! A refresh is bounded by the provider timeout and by the cancellation token
//! of the request that triggered it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::Credential;
use crate::error::LlmError;
use crate::types::OAuthCredentialSet;

/// Access tokens are refreshed this long before they expire.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Token endpoint deadline used until a provider timeout is applied.
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Expiry assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

type Slot = Arc<Mutex<OAuthCredentialSet>>;

/// Rotating pool of OAuth identities for one provider.
pub struct OAuthManager {
    provider: String,
    slots: RwLock<Vec<Slot>>,
    cursor: AtomicUsize,
    http: reqwest::Client,
    default_token_url: Option<String>,
    skew: Duration,
    refresh_timeout_ms: AtomicU64,
}

impl std::fmt::Debug for OAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthManager")
            .field("provider", &self.provider)
            .field("sets", &self.len())
            .field("default_token_url", &self.default_token_url)
            .finish()
    }
}

impl OAuthManager {
    pub fn new(
        provider: impl Into<String>,
        sets: Vec<OAuthCredentialSet>,
        http: reqwest::Client,
        default_token_url: Option<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            slots: RwLock::new(Self::slots_from(sets)),
            cursor: AtomicUsize::new(0),
            http,
            default_token_url,
            skew: DEFAULT_REFRESH_SKEW,
            refresh_timeout_ms: AtomicU64::new(DEFAULT_REFRESH_TIMEOUT.as_millis() as u64),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Deadline for one exchange with the token endpoint.
    pub fn set_refresh_timeout(&self, timeout: Duration) {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        self.refresh_timeout_ms.store(ms, Ordering::Relaxed);
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms.load(Ordering::Relaxed))
    }

    fn slots_from(sets: Vec<OAuthCredentialSet>) -> Vec<Slot> {
        sets.into_iter()
            .filter(OAuthCredentialSet::is_usable)
            .map(|s| Arc::new(Mutex::new(s)))
            .collect()
    }

    fn snapshot(&self) -> Vec<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the credential sets.
    ///
    /// A set whose id and client data match a live slot that has refreshed
    /// since `sets` was captured keeps the live tokens; handing back an older
    /// configuration snapshot never restores rotated refresh tokens.
    pub fn set_credentials(&self, sets: Vec<OAuthCredentialSet>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let current = std::mem::take(&mut *slots);
        *slots = sets
            .into_iter()
            .filter(OAuthCredentialSet::is_usable)
            .map(|incoming| {
                current
                    .iter()
                    .find(|slot| Self::supersedes(slot, &incoming))
                    .cloned()
                    .unwrap_or_else(|| Arc::new(Mutex::new(incoming)))
            })
            .collect();
        self.cursor.store(0, Ordering::Relaxed);
    }

    /// Whether the live `slot` is a newer state of `incoming`.
    fn supersedes(slot: &Slot, incoming: &OAuthCredentialSet) -> bool {
        let Ok(live) = slot.try_lock() else {
            return false;
        };
        live.id == incoming.id
            && live.client_id == incoming.client_id
            && live.client_secret == incoming.client_secret
            && live.token_url == incoming.token_url
            && live.refresh_count > incoming.refresh_count
    }

    pub fn clear(&self) {
        self.set_credentials(Vec::new());
    }

    /// Current state of every credential set.
    pub async fn credentials(&self) -> Vec<OAuthCredentialSet> {
        let mut out = Vec::new();
        for slot in self.snapshot() {
            out.push(slot.lock().await.clone());
        }
        out
    }

    async fn lock_slot<'a>(
        &self,
        slot: &'a Slot,
        cancel: Option<&CancellationToken>,
    ) -> Result<MutexGuard<'a, OAuthCredentialSet>, LlmError> {
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(self.cancelled()),
                set = slot.lock() => Ok(set),
            },
            None => Ok(slot.lock().await),
        }
    }

    fn cancelled(&self) -> LlmError {
        LlmError::cancelled()
            .with_provider(&self.provider)
            .with_operation("refresh_token")
    }

    /// Valid access token of `slot`, refreshing it first when needed.
    async fn access_token(
        &self,
        slot: &Slot,
        cancel: Option<&CancellationToken>,
    ) -> Result<(String, String), LlmError> {
        let mut set = self.lock_slot(slot, cancel).await?;
        if set.needs_refresh(self.skew, Utc::now()) {
            self.refresh(&mut set, cancel).await?;
        }
        Ok((set.id.clone(), set.access_token.clone()))
    }

    /// Exchange the refresh token of `set` for a new access token.
    ///
    /// Runs the refresh callback once on success. A missing `refresh_token` in
    /// the response keeps the previous refresh token. The exchange gives up
    /// after [`refresh_timeout`](Self::refresh_timeout) or when `cancel` fires,
    /// leaving `set` untouched.
    pub async fn refresh(
        &self,
        set: &mut OAuthCredentialSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), LlmError> {
        let fail = |msg: String| {
            LlmError::auth(msg)
                .with_provider(&self.provider)
                .with_operation("refresh_token")
        };
        if set.refresh_token.is_empty() {
            return Err(fail(format!(
                "credential '{}' has no refresh token",
                set.id
            )));
        }
        let url = set
            .token_url
            .clone()
            .or_else(|| self.default_token_url.clone())
            .ok_or_else(|| {
                LlmError::configuration(format!(
                    "no token endpoint configured for credential '{}'",
                    set.id
                ))
                .with_provider(&self.provider)
                .with_operation("refresh_token")
            })?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", set.refresh_token.as_str()),
            ("client_id", set.client_id.as_str()),
        ];
        if !set.client_secret.is_empty() {
            form.push(("client_secret", set.client_secret.as_str()));
        }

        tracing::debug!(provider = %self.provider, credential = %set.id, "refreshing OAuth token");
        let timeout = self.refresh_timeout();
        let exchange = async {
            let response = self
                .http
                .post(&url)
                .timeout(timeout)
                .form(&form)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let sample: String = body.chars().take(200).collect();
                return Err(fail(format!("token refresh rejected: {sample}")).with_status(status.as_u16()));
            }
            let token = response.json::<TokenResponse>().await.map_err(|e| {
                if e.is_timeout() {
                    self.transport_error(e)
                } else {
                    fail(format!("malformed token response: {e}")).with_source(e)
                }
            })?;
            Ok::<TokenResponse, LlmError>(token)
        };
        let token = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                result = exchange => result?,
            },
            None => exchange.await?,
        };
        if token.access_token.is_empty() {
            return Err(fail("token response carried no access token".to_string()));
        }

        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::seconds(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        set.access_token = token.access_token;
        if let Some(refresh) = token.refresh_token.filter(|t| !t.is_empty()) {
            set.refresh_token = refresh;
        }
        set.expires_at = Some(expires_at);
        set.refresh_count += 1;
        set.last_refresh = Some(now);

        if let Some(callback) = &set.on_token_refresh
            && let Err(e) = callback(&set.id, &set.access_token, &set.refresh_token, expires_at)
        {
            tracing::warn!(
                provider = %self.provider,
                credential = %set.id,
                error = %e,
                "token refresh callback failed"
            );
        }
        tracing::info!(
            provider = %self.provider,
            credential = %set.id,
            refresh_count = set.refresh_count,
            "OAuth token refreshed"
        );
        Ok(())
    }

    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        let err = if e.is_timeout() {
            LlmError::timeout(format!(
                "token endpoint gave no answer within {}s",
                self.refresh_timeout().as_secs_f32()
            ))
        } else {
            LlmError::auth(format!("token endpoint unreachable: {e}"))
        };
        err.with_provider(&self.provider)
            .with_operation("refresh_token")
            .with_source(e)
    }

    /// Force the next use of `slot` to refresh.
    async fn mark_stale(&self, slot: &Slot, used_token: &str) {
        let mut set = slot.lock().await;
        if set.access_token == used_token {
            set.expires_at = Some(Utc::now());
        }
    }

    /// Run `op` with successive credential sets until one succeeds.
    ///
    /// Cancellation through `cancel` ends the loop at once, including while a
    /// refresh is in flight.
    pub async fn execute_with_failover<F, Fut, T>(
        &self,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, LlmError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let slots = self.snapshot();
        let mut last_error = None;
        for _ in 0..slots.len() {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % slots.len();
            let slot = &slots[idx];
            let (id, token) = match self.access_token(slot, cancel).await {
                Ok(pair) => pair,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(provider = %self.provider, error = %e, "OAuth credential unusable");
                    last_error = Some(e);
                    continue;
                }
            };
            let credential = Credential::OAuth {
                id: id.clone(),
                token: Arc::new(SecretString::from(token.clone())),
            };
            match op(credential).await {
                Ok(value) => return Ok(value),
                Err(err) if err.triggers_credential_failover() => {
                    if err.kind() == crate::error::ErrorKind::Auth {
                        self.mark_stale(slot, &token).await;
                    }
                    tracing::warn!(
                        provider = %self.provider,
                        credential = %id,
                        kind = %err.kind(),
                        "OAuth credential rejected, rotating"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            LlmError::auth("no OAuth credential configured")
                .with_provider(&self.provider)
                .with_operation("authenticate")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type Calls = Arc<StdMutex<Vec<(String, String, String)>>>;

    fn recorder() -> (Calls, crate::types::TokenRefreshCallback) {
        let calls: Calls = Arc::default();
        let sink = calls.clone();
        let cb: crate::types::TokenRefreshCallback = Arc::new(
            move |id: &str, access: &str, refresh: &str, _exp: chrono::DateTime<Utc>| {
                sink.lock()
                    .unwrap()
                    .push((id.to_string(), access.to_string(), refresh.to_string()));
                Ok(())
            },
        );
        (calls, cb)
    }

    fn expired_set(server: &MockServer, cb: crate::types::TokenRefreshCallback) -> OAuthCredentialSet {
        OAuthCredentialSet::new("acct-1", "client-1")
            .with_tokens(
                "old-access",
                "old-refresh",
                Some(Utc::now() - chrono::Duration::seconds(1)),
            )
            .with_token_url(format!("{}/oauth/token", server.uri()))
            .with_refresh_callback(cb)
    }

    #[tokio::test]
    async fn refreshes_once_and_reuses_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .and(body_string_contains("client_id=client-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (calls, cb) = recorder();
        let manager = OAuthManager::new(
            "anthropic",
            vec![expired_set(&server, cb)],
            reqwest::Client::new(),
            None,
        );

        for _ in 0..2 {
            let token = manager
                .execute_with_failover(None, |c| async move { Ok(c.secret().to_string()) })
                .await
                .unwrap();
            assert_eq!(token, "new-access");
        }

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(
                "acct-1".to_string(),
                "new-access".to_string(),
                "old-refresh".to_string()
            )]
        );
        let sets = manager.credentials().await;
        assert_eq!(sets[0].refresh_count, 1);
        assert!(sets[0].last_refresh.is_some());
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "access_token": "fresh",
                        "refresh_token": "rotated",
                        "expires_in": 600
                    }))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (calls, cb) = recorder();
        let manager = Arc::new(OAuthManager::new(
            "gemini",
            vec![expired_set(&server, cb)],
            reqwest::Client::new(),
            None,
        ));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move {
                m.execute_with_failover(None, |c| async move { Ok(c.secret().to_string()) })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "fresh");
        }
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(calls.lock().unwrap()[0].2, "rotated");
    }

    #[tokio::test]
    async fn stale_snapshot_does_not_undo_a_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (calls, cb) = recorder();
        let original = expired_set(&server, cb);
        let manager = OAuthManager::new(
            "anthropic",
            vec![original.clone()],
            reqwest::Client::new(),
            None,
        );
        let secret = |c: Credential| async move { Ok::<_, LlmError>(c.secret().to_string()) };
        assert_eq!(manager.execute_with_failover(None, secret).await.unwrap(), "new-access");

        manager.set_credentials(vec![original]);
        assert_eq!(manager.execute_with_failover(None, secret).await.unwrap(), "new-access");
        let sets = manager.credentials().await;
        assert_eq!(sets[0].refresh_token, "new-refresh");
        assert_eq!(calls.lock().unwrap().len(), 1);

        manager.set_credentials(vec![
            OAuthCredentialSet::new("acct-1", "client-2").with_tokens("other", "r", None),
        ]);
        assert_eq!(manager.credentials().await[0].access_token, "other");
    }

    #[tokio::test]
    async fn hung_token_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "late" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let (calls, cb) = recorder();
        let manager = OAuthManager::new(
            "anthropic",
            vec![expired_set(&server, cb)],
            reqwest::Client::new(),
            None,
        );
        manager.set_refresh_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = manager
            .execute_with_failover(None, |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(manager.credentials().await[0].access_token, "old-access");
    }

    #[tokio::test]
    async fn cancellation_interrupts_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "late" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let (_, cb) = recorder();
        let manager = OAuthManager::new(
            "anthropic",
            vec![expired_set(&server, cb)],
            reqwest::Client::new(),
            None,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let err = manager
            .execute_with_failover(Some(&cancel), |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn failed_refresh_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let (calls, cb) = recorder();
        let manager = OAuthManager::new(
            "qwen",
            vec![expired_set(&server, cb)],
            reqwest::Client::new(),
            None,
        );
        let err = manager
            .execute_with_failover(None, |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Auth);
        assert_eq!(err.status_code(), Some(400));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_token_is_used_without_refresh() {
        let set = OAuthCredentialSet::new("a", "c").with_tokens(
            "live",
            "r",
            Some(Utc::now() + chrono::Duration::hours(1)),
        );
        let manager = OAuthManager::new("anthropic", vec![set], reqwest::Client::new(), None);
        let token = manager
            .execute_with_failover(None, |c| async move { Ok(c.secret().to_string()) })
            .await
            .unwrap();
        assert_eq!(token, "live");
    }

    #[tokio::test]
    async fn rotates_between_sets_on_auth_failure() {
        let future = Some(Utc::now() + chrono::Duration::hours(1));
        let sets = vec![
            OAuthCredentialSet::new("one", "c").with_tokens("t1", "", future),
            OAuthCredentialSet::new("two", "c").with_tokens("t2", "", future),
        ];
        let manager = OAuthManager::new("anthropic", sets, reqwest::Client::new(), None);
        let used = manager
            .execute_with_failover(None, |c| async move {
                if c.secret() == "t1" {
                    Err(LlmError::auth("revoked"))
                } else {
                    Ok(c.label())
                }
            })
            .await
            .unwrap();
        assert_eq!(used, "oauth:two");
    }
}
