//! Provider adapters: one per identity provider, all implementing the
//! authorize/exchange/userinfo/refresh/revoke/health contract.

mod adapter;
mod apple;
mod azure_b2c;
mod custom;
mod errors;
mod facebook;
mod google;
mod http;
mod registry;
mod types;

pub use adapter::ProviderAdapter;
pub use apple::AppleAdapter;
pub use azure_b2c::AzureB2cAdapter;
pub use custom::CustomAdapter;
pub use errors::ProviderError;
pub use facebook::FacebookAdapter;
pub use google::GoogleAdapter;
pub use registry::ProviderRegistry;
pub use types::{
    Capability, FailureKind, HealthStatus, ProviderInfo, TokenFailure, TokenResult, TokenSet,
    UserProfile,
};

pub(crate) use adapter::compose_authorize_url;
