//! oauth2-client-core - Client-side OAuth2/OIDC authentication engine
//!
//! This crate drives the full login lifecycle against pluggable identity
//! providers: authorization URL composition with CSRF state and PKCE,
//! single-use callback redemption, session storage with automatic token
//! refresh, and role/permission queries over the authenticated profile.

mod api;
mod client;
mod config;
mod events;
mod idtoken;
mod pkce;
mod provider;
mod session;
mod storage;
mod utils;

// The engine and its request/response surface
pub use client::{
    AuthClient, AuthError, AuthorizationRequest, CallbackData, CallbackOutcome, LoginInitiation,
    LoginRequest,
};

// Configuration
pub use config::{
    AppleSettings, AuthConfig, AuthConfigUpdate, AzureB2cSettings, ConfigError, CustomSettings,
    FacebookSettings, GoogleSettings, ProviderSettings, StorageMode,
};

// Provider adapters and their data types
pub use provider::{
    AppleAdapter, AzureB2cAdapter, Capability, CustomAdapter, FacebookAdapter, FailureKind,
    GoogleAdapter, HealthStatus, ProviderAdapter, ProviderError, ProviderInfo, ProviderRegistry,
    TokenFailure, TokenResult, TokenSet, UserProfile,
};

// Sessions and storage backends
pub use session::{Session, SessionError};
pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageError};

// Backend API surface
pub use api::{ApiEnvelope, ApiError};

// Lifecycle events
pub use events::{AuthEvent, Subscription};

// Low-level helpers useful to integrations
pub use idtoken::{IdTokenClaims, IdTokenError, decode_id_token};
pub use pkce::{PkcePair, generate_pkce_pair, generate_state};
pub use utils::UtilError;
