//! Client configuration.
//!
//! `AuthConfig` is constructed explicitly by the caller and injected into
//! the engine; nothing here reads the process environment. Invalid
//! configuration fails at construction, never at login time. After
//! construction the value is immutable except through [`AuthConfig::configure`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    #[error("Missing base API URL")]
    MissingBaseUrl,

    #[error("Invalid URL in {field}: {reason}")]
    InvalidUrl { field: String, reason: String },

    #[error("Provider '{0}' is enabled but has no client id")]
    MissingClientId(String),

    #[error("Provider '{provider}' has an invalid client id: {reason}")]
    InvalidClientId { provider: String, reason: String },

    #[error("Provider '{provider}' is missing required field '{field}'")]
    MissingField { provider: String, field: String },

    #[error("Default provider '{0}' is not configured")]
    UnknownDefaultProvider(String),
}

/// How long the persisted session survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Survives process restarts (file-backed).
    Persistent,
    /// Survives for the lifetime of the engine's process.
    SessionScoped,
    /// Never leaves memory; gone when the engine is dropped.
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub enabled: bool,
    /// Restricts sign-in to a Google Workspace domain (`hd` parameter).
    pub hosted_domain: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppleSettings {
    /// Apple "Services ID", reverse-DNS shaped.
    pub client_id: String,
    pub team_id: Option<String>,
    pub scopes: Vec<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookSettings {
    /// Numeric app id.
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub enabled: bool,
    pub graph_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureB2cSettings {
    /// Application (client) id, a GUID.
    pub client_id: String,
    pub tenant: String,
    /// User flow, e.g. `B2C_1_signupsignin`.
    pub policy: String,
    pub scopes: Vec<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomSettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub display_name: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub revoke_url: Option<String>,
    pub health_url: Option<String>,
    pub scopes: Vec<String>,
    pub enabled: bool,
    pub supports_pkce: bool,
    /// Userinfo claim holding the user's role list, if the deployment has one.
    pub roles_claim: Option<String>,
    pub permissions_claim: Option<String>,
}

/// Per-provider configuration. One variant per supported identity provider,
/// each carrying its own required fields, instead of a single bag of
/// optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSettings {
    Google(GoogleSettings),
    Apple(AppleSettings),
    Facebook(FacebookSettings),
    AzureB2c(AzureB2cSettings),
    Custom(CustomSettings),
}

impl ProviderSettings {
    pub fn client_id(&self) -> &str {
        match self {
            Self::Google(s) => &s.client_id,
            Self::Apple(s) => &s.client_id,
            Self::Facebook(s) => &s.client_id,
            Self::AzureB2c(s) => &s.client_id,
            Self::Custom(s) => &s.client_id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::Google(s) => s.enabled,
            Self::Apple(s) => s.enabled,
            Self::Facebook(s) => s.enabled,
            Self::AzureB2c(s) => s.enabled,
            Self::Custom(s) => s.enabled,
        }
    }

    pub fn scopes(&self) -> &[String] {
        match self {
            Self::Google(s) => &s.scopes,
            Self::Apple(s) => &s.scopes,
            Self::Facebook(s) => &s.scopes,
            Self::AzureB2c(s) => &s.scopes,
            Self::Custom(s) => &s.scopes,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.enabled() && self.client_id().is_empty() {
            return Err(ConfigError::MissingClientId(name.to_string()));
        }
        if !self.enabled() {
            // Disabled providers keep their configuration but are not
            // required to pass shape checks.
            return Ok(());
        }
        match self {
            Self::Google(s) => {
                if !s.client_id.ends_with(".apps.googleusercontent.com") {
                    return Err(ConfigError::InvalidClientId {
                        provider: name.to_string(),
                        reason: "expected suffix '.apps.googleusercontent.com'".to_string(),
                    });
                }
            }
            Self::Apple(s) => {
                if !s.client_id.contains('.') {
                    return Err(ConfigError::InvalidClientId {
                        provider: name.to_string(),
                        reason: "expected a reverse-DNS Services ID".to_string(),
                    });
                }
            }
            Self::Facebook(s) => {
                if !s.client_id.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ConfigError::InvalidClientId {
                        provider: name.to_string(),
                        reason: "expected a numeric app id".to_string(),
                    });
                }
                if s.graph_version.is_empty() {
                    return Err(ConfigError::MissingField {
                        provider: name.to_string(),
                        field: "graph_version".to_string(),
                    });
                }
            }
            Self::AzureB2c(s) => {
                if !is_guid(&s.client_id) {
                    return Err(ConfigError::InvalidClientId {
                        provider: name.to_string(),
                        reason: "expected a GUID application id".to_string(),
                    });
                }
                if s.tenant.is_empty() {
                    return Err(ConfigError::MissingField {
                        provider: name.to_string(),
                        field: "tenant".to_string(),
                    });
                }
                if s.policy.is_empty() {
                    return Err(ConfigError::MissingField {
                        provider: name.to_string(),
                        field: "policy".to_string(),
                    });
                }
            }
            Self::Custom(s) => {
                validate_absolute_url("authorize_url", &s.authorize_url)?;
                validate_absolute_url("token_url", &s.token_url)?;
                validate_absolute_url("userinfo_url", &s.userinfo_url)?;
                if let Some(url) = &s.revoke_url {
                    validate_absolute_url("revoke_url", url)?;
                }
                if let Some(url) = &s.health_url {
                    validate_absolute_url("health_url", url)?;
                }
            }
        }
        Ok(())
    }
}

fn is_guid(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    s.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => c.is_ascii_hexdigit(),
    })
}

pub(crate) fn validate_absolute_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// Fields that may be changed after construction through an explicit merge.
#[derive(Debug, Clone, Default)]
pub struct AuthConfigUpdate {
    pub default_provider: Option<String>,
    pub auto_refresh: Option<bool>,
    pub refresh_skew_secs: Option<u64>,
    /// Providers to add or replace, validated on merge.
    pub providers: Vec<(String, ProviderSettings)>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    api_base_url: String,
    redirect_uri: String,
    /// Declaration order is preserved; the registry reports providers in
    /// this order.
    providers: Vec<(String, ProviderSettings)>,
    default_provider: Option<String>,
    storage_mode: StorageMode,
    auto_refresh: bool,
    refresh_skew_secs: u64,
    http_timeout_secs: u64,
    session_file: Option<std::path::PathBuf>,
}

impl AuthConfig {
    pub fn new(
        api_base_url: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let api_base_url = api_base_url.into();
        if api_base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        validate_absolute_url("api_base_url", &api_base_url)?;
        let redirect_uri = redirect_uri.into();
        validate_absolute_url("redirect_uri", &redirect_uri)?;
        Ok(Self {
            api_base_url,
            redirect_uri,
            providers: Vec::new(),
            default_provider: None,
            storage_mode: StorageMode::InMemory,
            auto_refresh: true,
            refresh_skew_secs: 60,
            http_timeout_secs: 10,
            session_file: None,
        })
    }

    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        settings: ProviderSettings,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        settings.validate(&name)?;
        match self.providers.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = settings,
            None => self.providers.push((name, settings)),
        }
        Ok(self)
    }

    pub fn with_default_provider(mut self, name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if !self.providers.iter().any(|(n, _)| *n == name) {
            return Err(ConfigError::UnknownDefaultProvider(name));
        }
        self.default_provider = Some(name);
        Ok(self)
    }

    pub fn with_storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    pub fn with_session_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    pub fn with_auto_refresh(mut self, enabled: bool, skew_secs: u64) -> Self {
        self.auto_refresh = enabled;
        self.refresh_skew_secs = skew_secs;
        self
    }

    pub fn with_http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }

    /// Explicit post-construction merge. Each provider entry in the update
    /// is validated before anything is applied; a failed merge leaves the
    /// configuration unchanged.
    pub fn configure(&mut self, update: AuthConfigUpdate) -> Result<(), ConfigError> {
        for (name, settings) in &update.providers {
            settings.validate(name)?;
        }
        if let Some(name) = &update.default_provider {
            let known = self.providers.iter().any(|(n, _)| n == name)
                || update.providers.iter().any(|(n, _)| n == name);
            if !known {
                return Err(ConfigError::UnknownDefaultProvider(name.clone()));
            }
        }
        for (name, settings) in update.providers {
            match self.providers.iter_mut().find(|(n, _)| *n == name) {
                Some(entry) => entry.1 = settings,
                None => self.providers.push((name, settings)),
            }
        }
        if let Some(name) = update.default_provider {
            self.default_provider = Some(name);
        }
        if let Some(enabled) = update.auto_refresh {
            self.auto_refresh = enabled;
        }
        if let Some(skew) = update.refresh_skew_secs {
            self.refresh_skew_secs = skew;
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn providers(&self) -> impl Iterator<Item = (&str, &ProviderSettings)> {
        self.providers.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.storage_mode
    }

    pub fn session_file(&self) -> Option<&std::path::Path> {
        self.session_file.as_deref()
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn refresh_skew_secs(&self) -> u64 {
        self.refresh_skew_secs
    }

    pub fn http_timeout_secs(&self) -> u64 {
        self.http_timeout_secs
    }
}
