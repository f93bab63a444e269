use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::api::BackendClient;
use crate::config::{AuthConfig, AuthConfigUpdate, ConfigError, StorageMode};
use crate::events::{AuthEvent, EventBus, Subscription};
use crate::idtoken::decode_id_token;
use crate::pkce::{generate_pkce_pair, generate_state};
use crate::provider::{
    ProviderAdapter, ProviderInfo, ProviderRegistry, TokenResult, TokenSet, UserProfile,
};
use crate::session::{Session, SessionStore};
use crate::storage::{FileStorage, MemoryStorage, StorageBackend};

use super::errors::AuthError;
use super::scheduler::RefreshScheduler;
use super::types::{
    AuthorizationRequest, CallbackData, CallbackOutcome, LoginInitiation, LoginRequest,
};

const STATE_ENTROPY_BYTES: usize = 32;
const NONCE_ENTROPY_BYTES: usize = 16;

/// Pending login attempts older than this are dropped when a new one is
/// recorded. Matches the window a user can reasonably leave a provider
/// consent screen open.
const PENDING_TTL_SECS: i64 = 600;

/// Default session file name when persistent storage is selected without
/// an explicit path.
const DEFAULT_SESSION_FILE: &str = "oauth2_client_session.json";

struct ClientInner {
    config: RwLock<AuthConfig>,
    registry: RwLock<ProviderRegistry>,
    sessions: SessionStore,
    backend: BackendClient,
    pending: Mutex<HashMap<String, AuthorizationRequest>>,
    events: EventBus,
    scheduler: RefreshScheduler,
    refresh_in_flight: AtomicBool,
    /// Bumped by every sign-out. A login or refresh that was in flight
    /// across a sign-out sees a stale value and must not write its session,
    /// otherwise it would resurrect the state the user just cleared.
    epoch: AtomicU64,
    /// Serializes session writes against `sign_out`'s clear, so the epoch
    /// check and the store write happen as one step.
    session_write: tokio::sync::Mutex<()>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.scheduler.cancel();
    }
}

/// The client-side authentication engine. Cheap to clone; all clones share
/// one session, one provider registry and one refresh timer.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<ClientInner>,
}

impl AuthClient {
    pub fn new(config: AuthConfig) -> Self {
        let backend: Box<dyn StorageBackend> = match config.storage_mode() {
            StorageMode::Persistent => {
                let path = config
                    .session_file()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_SESSION_FILE));
                Box::new(FileStorage::new(path))
            }
            StorageMode::SessionScoped | StorageMode::InMemory => Box::new(MemoryStorage::new()),
        };
        Self::with_storage(config, backend)
    }

    /// Build the engine on a caller-supplied storage backend, overriding
    /// the configured storage mode.
    pub fn with_storage(config: AuthConfig, backend: Box<dyn StorageBackend>) -> Self {
        let registry = ProviderRegistry::from_config(&config);
        let api = BackendClient::new(config.api_base_url(), config.http_timeout_secs());
        Self {
            inner: Arc::new(ClientInner {
                config: RwLock::new(config),
                registry: RwLock::new(registry),
                sessions: SessionStore::new(backend),
                backend: api,
                pending: Mutex::new(HashMap::new()),
                events: EventBus::new(),
                scheduler: RefreshScheduler::new(),
                refresh_in_flight: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                session_write: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Merge a partial configuration update and rebuild the provider
    /// registry from the result. Validation happens before anything is
    /// applied, so a rejected update leaves the engine untouched.
    pub fn configure(&self, update: AuthConfigUpdate) -> Result<(), ConfigError> {
        let mut config = self
            .inner
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        config.configure(update)?;
        let rebuilt = ProviderRegistry::from_config(&config);
        if let Ok(mut registry) = self.inner.registry.write() {
            *registry = rebuilt;
        }
        Ok(())
    }

    /// Register (or replace) a provider adapter directly, bypassing the
    /// built-in settings types. This is the hook for fully custom
    /// integrations.
    pub fn register_adapter(&self, enabled: bool, adapter: Arc<dyn ProviderAdapter>) {
        if let Ok(mut registry) = self.inner.registry.write() {
            registry.register(enabled, adapter);
        }
    }

    /// Enabled providers, in configuration order.
    pub fn available_providers(&self) -> Vec<ProviderInfo> {
        self.inner
            .registry
            .read()
            .map(|r| r.available_providers())
            .unwrap_or_default()
    }

    /// Subscribe to lifecycle events. Dropping the returned handle (or
    /// calling `unsubscribe`) detaches the listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    /// Begin a login attempt: validate the return URL, pick the provider,
    /// generate state (and PKCE / nonce where the provider supports them)
    /// and compose the authorization URL. No network I/O happens here; the
    /// only side effect is recording the pending request under its state.
    pub fn initiate_login(&self, request: LoginRequest) -> Result<LoginInitiation, AuthError> {
        let return_url = match Url::parse(&request.return_url) {
            Ok(url) if (url.scheme() == "http" || url.scheme() == "https") && url.has_host() => url,
            _ => {
                error!("Rejected return URL: {}", request.return_url);
                return Err(AuthError::InvalidReturnUrl(request.return_url));
            }
        };

        let provider = match request.provider {
            Some(name) => name,
            None => self
                .read_config(|c| c.default_provider().map(str::to_string))
                .ok_or_else(|| AuthError::ProviderUnavailable("no provider specified".into()))?,
        };
        let adapter = self
            .resolve(&provider)
            .ok_or_else(|| AuthError::ProviderUnavailable(provider.clone()))?;

        let state = generate_state(STATE_ENTROPY_BYTES)?;
        let pkce = if adapter.supports_pkce() {
            Some(generate_pkce_pair()?)
        } else {
            None
        };
        let nonce = if adapter.is_oidc() {
            Some(crate::utils::gen_random_string(NONCE_ENTROPY_BYTES)?)
        } else {
            None
        };

        let auth_request = AuthorizationRequest {
            provider: provider.clone(),
            return_url: return_url.to_string(),
            scopes: request.scopes,
            state: state.clone(),
            pkce,
            nonce,
            extra_params: request.extra_params,
            created_at: Utc::now(),
        };
        let auth_url = adapter.authorization_url(&auth_request)?;

        if let Ok(mut pending) = self.inner.pending.lock() {
            let cutoff = Utc::now() - chrono::Duration::seconds(PENDING_TTL_SECS);
            pending.retain(|_, req| req.created_at > cutoff);
            pending.insert(state.clone(), auth_request);
        }

        debug!("Login initiated with provider {provider}");
        self.inner.events.emit(AuthEvent::LoginStart {
            provider: provider.clone(),
        });
        Ok(LoginInitiation { auth_url, state })
    }

    /// Complete a login attempt from the provider's redirect parameters.
    ///
    /// The state is consumed before anything else, including before the
    /// network exchange: a replayed callback fails with `InvalidState` even
    /// if the first redemption is still in flight. A provider `error`
    /// parameter short-circuits the flow without touching the token
    /// endpoint.
    pub async fn handle_callback(&self, data: CallbackData) -> Result<CallbackOutcome, AuthError> {
        let state = data.state.as_deref().unwrap_or_default();
        let request = self
            .inner
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(state));
        let Some(request) = request else {
            error!("Callback carried unknown or already-used state");
            return Err(AuthError::InvalidState);
        };

        if let Some(code) = data.error {
            let message = data.error_description.clone().unwrap_or_else(|| code.clone());
            warn!("Provider returned error on callback: {message}");
            self.inner.events.emit(AuthEvent::LoginError {
                provider: request.provider.clone(),
                message,
            });
            return Err(AuthError::Provider {
                error: code,
                description: data.error_description,
            });
        }

        let adapter = self
            .resolve(&request.provider)
            .ok_or_else(|| AuthError::ProviderUnavailable(request.provider.clone()))?;

        let Some(code) = data.code else {
            return Err(AuthError::Provider {
                error: "invalid_request".into(),
                description: Some("authorization code missing from callback".into()),
            });
        };

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let verifier = request.pkce.as_ref().map(|p| p.verifier.as_str());
        let tokens = match adapter.exchange_code_for_tokens(&code, verifier).await {
            TokenResult::Success(tokens) => tokens,
            TokenResult::Failure(failure) => {
                self.inner.events.emit(AuthEvent::LoginError {
                    provider: request.provider.clone(),
                    message: failure.to_string(),
                });
                return Err(AuthError::TokenExchange(failure));
            }
        };

        self.verify_nonce(&request, &tokens)?;

        let user = match adapter.profile_from_tokens(&tokens).await {
            Ok(user) => user,
            Err(err) => {
                self.inner.events.emit(AuthEvent::LoginError {
                    provider: request.provider.clone(),
                    message: err.to_string(),
                });
                return Err(err.into());
            }
        };

        let session = Session::from_tokens(user.clone(), &tokens, &request.provider, Utc::now());
        if !self.store_session(&session, epoch).await? {
            warn!("Login abandoned: sign-out happened during the exchange");
            return Err(AuthError::Cancelled);
        }

        info!(
            "Login completed for provider {} (user {})",
            request.provider, user.id
        );
        self.inner.events.emit(AuthEvent::LoginSuccess {
            provider: request.provider.clone(),
            session_id: session.session_id.clone(),
        });
        self.inner
            .events
            .emit(AuthEvent::StateChanged { authenticated: true });

        Ok(CallbackOutcome {
            session,
            user,
            tokens,
        })
    }

    /// The active session, if one exists and has not expired.
    pub async fn current_session(&self) -> Option<Session> {
        self.inner.sessions.get().await
    }

    /// The authenticated user's profile, if any.
    pub async fn current_user(&self) -> Option<UserProfile> {
        self.current_session().await.map(|s| s.user)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current_session().await.is_some()
    }

    /// Exchange the stored refresh token for fresh tokens and update the
    /// session in place. At most one refresh runs at a time; a concurrent
    /// call fails with `RefreshInFlight`. On failure the stored session is
    /// left untouched.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        if self
            .inner
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh suppressed: one is already in flight");
            return Err(AuthError::RefreshInFlight);
        }
        let result = self.refresh_inner().await;
        self.inner.refresh_in_flight.store(false, Ordering::Release);
        result
    }

    async fn refresh_inner(&self) -> Result<Session, AuthError> {
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let mut session = self
            .current_session()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        let refresh_token = session
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;
        let adapter = self
            .resolve(&session.provider)
            .ok_or_else(|| AuthError::ProviderUnavailable(session.provider.clone()))?;

        match adapter.refresh_tokens(&refresh_token).await {
            TokenResult::Success(tokens) => {
                session.apply_refresh(&tokens, None, Utc::now());
                if !self.store_session(&session, epoch).await? {
                    debug!("Refresh result discarded: user signed out mid-flight");
                    return Err(AuthError::NotAuthenticated);
                }
                info!("Session refreshed for provider {}", session.provider);
                Ok(session)
            }
            TokenResult::Failure(failure) => {
                warn!("Token refresh failed: {failure}");
                Err(AuthError::TokenExchange(failure))
            }
        }
    }

    /// Write a session back to the store, unless a sign-out invalidated the
    /// flow while its network call was in flight. The epoch check and the
    /// write share the lock `sign_out` clears under, so there is no window
    /// for a stale write to land after the clear. Returns whether the write
    /// happened; the refresh timer is only armed for a landed write.
    async fn store_session(&self, session: &Session, epoch: u64) -> Result<bool, AuthError> {
        let _guard = self.inner.session_write.lock().await;
        if self.inner.epoch.load(Ordering::Acquire) != epoch {
            return Ok(false);
        }
        self.inner.sessions.set(session).await?;
        self.arm_auto_refresh(session);
        Ok(true)
    }

    /// Sign out. Local state is always cleared and the call always returns
    /// `true`; server-side logout and token revocation are best-effort and
    /// only reflected in the `LogoutSuccess` event.
    pub async fn sign_out(&self) -> bool {
        self.inner.events.emit(AuthEvent::LogoutStart);
        self.inner.scheduler.cancel();
        // Invalidate in-flight logins and refreshes before clearing, then
        // clear under the same lock their writes take.
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        let session = self.inner.sessions.get().await;
        {
            let _guard = self.inner.session_write.lock().await;
            self.inner.sessions.clear().await;
        }
        self.inner
            .events
            .emit(AuthEvent::StateChanged { authenticated: false });

        let mut server_synced = false;
        if let Some(session) = session {
            server_synced = self.inner.backend.logout(&session.access_token).await;
            if let Some(adapter) = self.resolve(&session.provider) {
                let mut tokens = vec![session.access_token.clone()];
                if let Some(refresh) = session.refresh_token.clone() {
                    tokens.push(refresh);
                }
                if !adapter.revoke_tokens(&tokens).await {
                    debug!("Token revocation incomplete for {}", session.provider);
                }
            }
        }

        self.inner
            .events
            .emit(AuthEvent::LogoutSuccess { server_synced });
        true
    }

    /// Ask the application backend whether it still accepts the current
    /// access token. `Ok(false)` means the server rejected the session
    /// even though it looks valid locally.
    pub async fn check_server_session(&self) -> Result<bool, AuthError> {
        let session = self
            .current_session()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        Ok(self.inner.backend.check_session(&session.access_token).await?)
    }

    pub async fn has_role(&self, role: &str) -> bool {
        self.current_session()
            .await
            .map(|s| s.user.roles.iter().any(|r| r == role))
            .unwrap_or(false)
    }

    pub async fn has_permission(&self, permission: &str) -> bool {
        self.current_session()
            .await
            .map(|s| s.user.permissions.iter().any(|p| p == permission))
            .unwrap_or(false)
    }

    pub async fn has_any_role(&self, roles: &[&str]) -> bool {
        self.current_session()
            .await
            .map(|s| roles.iter().any(|r| s.user.roles.iter().any(|have| have == r)))
            .unwrap_or(false)
    }

    pub async fn has_any_permission(&self, permissions: &[&str]) -> bool {
        self.current_session()
            .await
            .map(|s| {
                permissions
                    .iter()
                    .any(|p| s.user.permissions.iter().any(|have| have == p))
            })
            .unwrap_or(false)
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.inner.registry.read().ok().and_then(|r| r.resolve(name))
    }

    fn read_config<T>(&self, f: impl FnOnce(&AuthConfig) -> T) -> T {
        let config = self
            .inner
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&config)
    }

    /// When the login attempt carried a nonce and the provider issued an
    /// ID token that echoes one, the two must match.
    fn verify_nonce(&self, request: &AuthorizationRequest, tokens: &TokenSet) -> Result<(), AuthError> {
        let (Some(expected), Some(id_token)) = (&request.nonce, &tokens.id_token) else {
            return Ok(());
        };
        match decode_id_token(id_token) {
            Ok(claims) => match claims.nonce {
                Some(ref got) if got != expected => {
                    error!("ID token nonce does not match the login attempt");
                    Err(AuthError::NonceMismatch)
                }
                _ => Ok(()),
            },
            Err(err) => {
                debug!("ID token not decodable for nonce check: {err}");
                Ok(())
            }
        }
    }

    /// Schedule a refresh at `expires_at - skew`. Replaces any earlier
    /// timer. Nothing is scheduled when auto-refresh is off or the session
    /// has no refresh token.
    fn arm_auto_refresh(&self, session: &Session) {
        let (enabled, skew) = self.read_config(|c| (c.auto_refresh(), c.refresh_skew_secs()));
        if !enabled || session.refresh_token.is_none() {
            self.inner.scheduler.cancel();
            return;
        }

        let fire_at = session.expires_at - chrono::Duration::seconds(skew as i64);
        let delay = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.arm(delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let client = AuthClient { inner };
            match client.refresh_session().await {
                Ok(_) => {}
                Err(AuthError::RefreshInFlight) => {
                    debug!("Scheduled refresh skipped: manual refresh in flight");
                }
                Err(err) => {
                    warn!("Scheduled refresh failed: {err}");
                    client.inner.events.emit(AuthEvent::TokenExpired);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Capability, HealthStatus, TokenFailure};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct MockAdapter {
        name: String,
        oidc: bool,
        exchange: Mutex<TokenResult>,
        refresh: Mutex<TokenResult>,
        profile: UserProfile,
        exchange_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        // When set, the matching call blocks until the gate is notified,
        // letting tests interleave other engine calls mid-flight.
        exchange_gate: Option<Arc<tokio::sync::Notify>>,
        refresh_gate: Option<Arc<tokio::sync::Notify>>,
    }

    impl MockAdapter {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                oidc: true,
                exchange: Mutex::new(TokenResult::Success(test_tokens("at-1", 3600))),
                refresh: Mutex::new(TokenResult::Success(test_tokens("at-2", 3600))),
                profile: test_profile(name),
                exchange_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                exchange_gate: None,
                refresh_gate: None,
            }
        }

        fn with_exchange(self, result: TokenResult) -> Self {
            *self.exchange.lock().unwrap() = result;
            self
        }

        fn with_refresh(self, result: TokenResult) -> Self {
            *self.refresh.lock().unwrap() = result;
            self
        }

        fn with_exchange_gate(mut self, gate: Arc<tokio::sync::Notify>) -> Self {
            self.exchange_gate = Some(gate);
            self
        }

        fn with_refresh_gate(mut self, gate: Arc<tokio::sync::Notify>) -> Self {
            self.refresh_gate = Some(gate);
            self
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn display_name(&self) -> &str {
            "Mock"
        }

        fn capabilities(&self) -> Vec<Capability> {
            vec![Capability::OAuth2, Capability::Pkce, Capability::Refresh]
        }

        fn default_scopes(&self) -> Vec<String> {
            vec!["openid".into()]
        }

        fn is_oidc(&self) -> bool {
            self.oidc
        }

        fn authorization_url(
            &self,
            request: &AuthorizationRequest,
        ) -> Result<Url, crate::provider::ProviderError> {
            crate::provider::compose_authorize_url(
                "https://mock.example.com/authorize",
                "mock-client",
                "https://app.example.com/callback",
                &self.default_scopes(),
                request,
            )
        }

        async fn exchange_code_for_tokens(
            &self,
            _code: &str,
            _pkce_verifier: Option<&str>,
        ) -> TokenResult {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.exchange_gate {
                gate.notified().await;
            }
            self.exchange.lock().unwrap().clone()
        }

        async fn get_user_info(
            &self,
            _access_token: &str,
        ) -> Result<UserProfile, crate::provider::ProviderError> {
            Ok(self.profile.clone())
        }

        async fn refresh_tokens(&self, _refresh_token: &str) -> TokenResult {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.refresh_gate {
                gate.notified().await;
            }
            self.refresh.lock().unwrap().clone()
        }

        async fn revoke_tokens(&self, _tokens: &[String]) -> bool {
            true
        }

        async fn health_status(&self) -> HealthStatus {
            HealthStatus {
                is_healthy: true,
                response_time: Duration::ZERO,
                error: None,
            }
        }
    }

    fn test_tokens(access_token: &str, expires_in: u64) -> TokenSet {
        TokenSet {
            access_token: access_token.to_string(),
            refresh_token: Some("rt-1".to_string()),
            id_token: None,
            token_type: "Bearer".to_string(),
            expires_in,
            scope: Some("openid".to_string()),
        }
    }

    fn test_profile(provider: &str) -> UserProfile {
        UserProfile {
            id: "user-1".to_string(),
            email: Some("user@example.com".to_string()),
            name: Some("Test User".to_string()),
            given_name: None,
            family_name: None,
            picture: None,
            provider: provider.to_string(),
            email_verified: true,
            locale: None,
            roles: vec!["editor".to_string()],
            permissions: vec!["posts:write".to_string()],
        }
    }

    fn test_client(adapter: MockAdapter) -> AuthClient {
        // Closed port so best-effort backend calls fail instantly.
        let config = AuthConfig::new("http://127.0.0.1:9", "https://app.example.com/callback")
            .expect("config")
            .with_http_timeout_secs(1);
        let client = AuthClient::new(config);
        client.register_adapter(true, Arc::new(adapter));
        client
    }

    async fn login(client: &AuthClient) -> CallbackOutcome {
        let initiation = client
            .initiate_login(LoginRequest {
                provider: Some("mock".to_string()),
                return_url: "https://app.example.com/home".to_string(),
                ..Default::default()
            })
            .expect("initiate");
        client
            .handle_callback(CallbackData {
                code: Some("auth-code".to_string()),
                state: Some(initiation.state),
                ..Default::default()
            })
            .await
            .expect("callback")
    }

    #[tokio::test]
    async fn test_initiate_login_rejects_bad_return_url() {
        let client = test_client(MockAdapter::new("mock"));
        let result = client.initiate_login(LoginRequest {
            provider: Some("mock".to_string()),
            return_url: "javascript:alert(1)".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(AuthError::InvalidReturnUrl(_))));
    }

    #[tokio::test]
    async fn test_initiate_login_unknown_provider() {
        let client = test_client(MockAdapter::new("mock"));
        let result = client.initiate_login(LoginRequest {
            provider: Some("nope".to_string()),
            return_url: "https://app.example.com/home".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(AuthError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_initiate_login_includes_state_and_pkce() {
        let client = test_client(MockAdapter::new("mock"));
        let initiation = client
            .initiate_login(LoginRequest {
                provider: Some("mock".to_string()),
                return_url: "https://app.example.com/home".to_string(),
                ..Default::default()
            })
            .expect("initiate");
        let query = initiation.auth_url.query().unwrap_or_default().to_string();
        assert!(query.contains(&format!("state={}", initiation.state)));
        assert!(query.contains("code_challenge="));
        assert!(query.contains("code_challenge_method=S256"));
    }

    #[tokio::test]
    async fn test_login_round_trip_creates_session() {
        let client = test_client(MockAdapter::new("mock"));
        let before = Utc::now();
        let outcome = login(&client).await;

        assert_eq!(outcome.user.id, "user-1");
        assert_eq!(outcome.session.provider, "mock");
        let lifetime = (outcome.session.expires_at - before).num_seconds();
        assert!((3595..=3605).contains(&lifetime), "lifetime was {lifetime}");

        let stored = client.current_session().await.expect("session stored");
        assert_eq!(stored.session_id, outcome.session.session_id);
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_state_cannot_be_redeemed_twice() {
        let client = test_client(MockAdapter::new("mock"));
        let initiation = client
            .initiate_login(LoginRequest {
                provider: Some("mock".to_string()),
                return_url: "https://app.example.com/home".to_string(),
                ..Default::default()
            })
            .expect("initiate");
        let data = CallbackData {
            code: Some("auth-code".to_string()),
            state: Some(initiation.state),
            ..Default::default()
        };
        client.handle_callback(data.clone()).await.expect("first");
        let second = client.handle_callback(data).await;
        assert!(matches!(second, Err(AuthError::InvalidState)));
    }

    #[tokio::test]
    async fn test_unknown_state_is_rejected() {
        let client = test_client(MockAdapter::new("mock"));
        let result = client
            .handle_callback(CallbackData {
                code: Some("auth-code".to_string()),
                state: Some("never-issued".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidState)));
    }

    #[tokio::test]
    async fn test_provider_error_short_circuits_exchange() {
        let adapter = Arc::new(MockAdapter::new("mock"));
        let config = AuthConfig::new("http://127.0.0.1:9", "https://app.example.com/callback")
            .expect("config");
        let client = AuthClient::new(config);
        client.register_adapter(true, adapter.clone());

        let initiation = client
            .initiate_login(LoginRequest {
                provider: Some("mock".to_string()),
                return_url: "https://app.example.com/home".to_string(),
                ..Default::default()
            })
            .expect("initiate");
        let result = client
            .handle_callback(CallbackData {
                state: Some(initiation.state),
                error: Some("access_denied".to_string()),
                error_description: Some("User cancelled the dialog".to_string()),
                ..Default::default()
            })
            .await;

        match result {
            Err(err @ AuthError::Provider { .. }) => {
                assert_eq!(err.to_string(), "User cancelled the dialog");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
        assert_eq!(adapter.exchange_calls.load(Ordering::SeqCst), 0);
        assert!(client.current_session().await.is_none());
    }

    #[tokio::test]
    async fn test_exchange_failure_surfaces_unchanged() {
        let adapter = MockAdapter::new("mock").with_exchange(TokenResult::Failure(
            TokenFailure::provider("invalid_grant", Some("Code expired".to_string())),
        ));
        let client = test_client(adapter);
        let initiation = client
            .initiate_login(LoginRequest {
                provider: Some("mock".to_string()),
                return_url: "https://app.example.com/home".to_string(),
                ..Default::default()
            })
            .expect("initiate");
        let result = client
            .handle_callback(CallbackData {
                code: Some("stale".to_string()),
                state: Some(initiation.state),
                ..Default::default()
            })
            .await;
        match result {
            Err(AuthError::TokenExchange(failure)) => {
                assert_eq!(failure.error, "invalid_grant");
                assert_eq!(failure.description.as_deref(), Some("Code expired"));
            }
            other => panic!("expected exchange failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_expires_without_external_trigger() {
        // Zero lifetime and no refresh token: the session is expired the
        // moment it lands, with no refresh or sign-out involved.
        let adapter = MockAdapter::new("mock").with_exchange(TokenResult::Success(TokenSet {
            refresh_token: None,
            ..test_tokens("at-1", 0)
        }));
        let client = test_client(adapter);
        login(&client).await;

        assert!(client.current_session().await.is_none());
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_refresh_rotates_access_token() {
        let client = test_client(MockAdapter::new("mock"));
        let outcome = login(&client).await;
        assert_eq!(outcome.session.access_token, "at-1");

        let refreshed = client.refresh_session().await.expect("refresh");
        assert_eq!(refreshed.access_token, "at-2");
        assert_eq!(refreshed.session_id, outcome.session.session_id);

        let stored = client.current_session().await.expect("session");
        assert_eq!(stored.access_token, "at-2");
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_session() {
        let adapter = MockAdapter::new("mock").with_refresh(TokenResult::Failure(
            TokenFailure::provider("invalid_grant", None),
        ));
        let client = test_client(adapter);
        login(&client).await;

        let result = client.refresh_session().await;
        assert!(matches!(result, Err(AuthError::TokenExchange(_))));
        let stored = client.current_session().await.expect("session kept");
        assert_eq!(stored.access_token, "at-1");
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let client = test_client(MockAdapter::new("mock"));
        let result = client.refresh_session().await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let adapter = MockAdapter::new("mock").with_exchange(TokenResult::Success(TokenSet {
            refresh_token: None,
            ..test_tokens("at-1", 3600)
        }));
        let client = test_client(adapter);
        login(&client).await;

        let result = client.refresh_session().await;
        assert!(matches!(result, Err(AuthError::NoRefreshToken)));
        let stored = client.current_session().await.expect("session kept");
        assert_eq!(stored.access_token, "at-1");
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_suppressed() {
        let client = test_client(MockAdapter::new("mock"));
        login(&client).await;

        client.inner.refresh_in_flight.store(true, Ordering::SeqCst);
        let result = client.refresh_session().await;
        assert!(matches!(result, Err(AuthError::RefreshInFlight)));

        client.inner.refresh_in_flight.store(false, Ordering::SeqCst);
        assert!(client.refresh_session().await.is_ok());
    }

    #[tokio::test]
    async fn test_sign_out_during_refresh_does_not_resurrect_session() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let adapter = MockAdapter::new("mock").with_refresh_gate(gate.clone());
        let client = test_client(adapter);
        login(&client).await;

        // Park a refresh inside the provider call, then sign out under it.
        let refresher = client.clone();
        let in_flight = tokio::spawn(async move { refresher.refresh_session().await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(client.sign_out().await);
        assert!(client.current_session().await.is_none());

        gate.notify_one();
        let result = in_flight.await.expect("refresh task");
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
        assert!(client.current_session().await.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_during_callback_cancels_login() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let adapter = MockAdapter::new("mock").with_exchange_gate(gate.clone());
        let client = test_client(adapter);

        let initiation = client
            .initiate_login(LoginRequest {
                provider: Some("mock".to_string()),
                return_url: "https://app.example.com/home".to_string(),
                ..Default::default()
            })
            .expect("initiate");
        let callback_client = client.clone();
        let in_flight = tokio::spawn(async move {
            callback_client
                .handle_callback(CallbackData {
                    code: Some("auth-code".to_string()),
                    state: Some(initiation.state),
                    ..Default::default()
                })
                .await
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(client.sign_out().await);

        gate.notify_one();
        let result = in_flight.await.expect("callback task");
        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert!(client.current_session().await.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_session_despite_unreachable_backend() {
        let client = test_client(MockAdapter::new("mock"));
        login(&client).await;

        assert!(client.sign_out().await);
        assert!(client.current_session().await.is_none());
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_sign_out_without_session() {
        let client = test_client(MockAdapter::new("mock"));
        assert!(client.sign_out().await);
    }

    #[tokio::test]
    async fn test_role_and_permission_queries() {
        let client = test_client(MockAdapter::new("mock"));

        assert!(!client.has_role("editor").await);
        assert!(!client.has_any_role(&["editor", "admin"]).await);

        login(&client).await;

        assert!(client.has_role("editor").await);
        assert!(!client.has_role("admin").await);
        assert!(client.has_any_role(&["admin", "editor"]).await);
        assert!(!client.has_any_role(&["admin", "owner"]).await);
        assert!(!client.has_any_role(&[]).await);

        assert!(client.has_permission("posts:write").await);
        assert!(!client.has_permission("posts:delete").await);
        assert!(client.has_any_permission(&["posts:write", "posts:delete"]).await);
        assert!(!client.has_any_permission(&["posts:delete"]).await);
    }

    #[tokio::test]
    async fn test_events_fire_through_lifecycle() {
        let client = test_client(MockAdapter::new("mock"));
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = client.subscribe(move |event| {
            let label = match event {
                AuthEvent::LoginStart { .. } => "login-start",
                AuthEvent::LoginSuccess { .. } => "login-success",
                AuthEvent::LoginError { .. } => "login-error",
                AuthEvent::LogoutStart => "logout-start",
                AuthEvent::LogoutSuccess { .. } => "logout-success",
                AuthEvent::StateChanged { .. } => "state-changed",
                AuthEvent::TokenExpired => "token-expired",
            };
            sink.lock().unwrap().push(label.to_string());
        });

        login(&client).await;
        client.sign_out().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "login-start",
                "login-success",
                "state-changed",
                "logout-start",
                "state-changed",
                "logout-success",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_fires_before_expiry() {
        let adapter = MockAdapter::new("mock")
            .with_exchange(TokenResult::Success(test_tokens("at-1", 120)))
            .with_refresh(TokenResult::Success(test_tokens("at-2", 3600)));
        let client = test_client(adapter);
        login(&client).await;
        // Let the spawned timer task register its sleep before the clock
        // moves, otherwise it would park against an already-advanced clock.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // Skew is 60s, lifetime 120s: the timer fires around t+60.
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let stored = client.current_session().await.expect("session");
        assert_eq!(stored.access_token, "at-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_failure_emits_token_expired() {
        let adapter = MockAdapter::new("mock")
            .with_exchange(TokenResult::Success(test_tokens("at-1", 120)))
            .with_refresh(TokenResult::Failure(TokenFailure::provider(
                "invalid_grant",
                None,
            )));
        let client = test_client(adapter);

        let expired = Arc::new(AtomicBool::new(false));
        let flag = expired.clone();
        let _subscription = client.subscribe(move |event| {
            if matches!(event, AuthEvent::TokenExpired) {
                flag.store(true, Ordering::SeqCst);
            }
        });

        login(&client).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(expired.load(Ordering::SeqCst));
        // The failed refresh leaves the stored session as it was.
        let stored = client.current_session().await.expect("session");
        assert_eq!(stored.access_token, "at-1");
    }

    #[tokio::test]
    async fn test_available_providers_lists_registered() {
        let client = test_client(MockAdapter::new("mock"));
        let providers = client.available_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "mock");
        assert!(providers[0].enabled);
    }
}
