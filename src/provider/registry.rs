use std::sync::Arc;

use crate::config::{AuthConfig, ProviderSettings};

use super::adapter::ProviderAdapter;
use super::apple::AppleAdapter;
use super::azure_b2c::AzureB2cAdapter;
use super::custom::CustomAdapter;
use super::facebook::FacebookAdapter;
use super::google::GoogleAdapter;
use super::http::OAuth2Http;
use super::types::ProviderInfo;

struct RegistryEntry {
    name: String,
    enabled: bool,
    adapter: Arc<dyn ProviderAdapter>,
}

/// Resolves a provider name to its adapter. Entries keep the order they
/// were declared in the configuration; disabled providers stay registered
/// but are invisible to resolution.
pub struct ProviderRegistry {
    entries: Vec<RegistryEntry>,
}

impl ProviderRegistry {
    pub fn from_config(config: &AuthConfig) -> Self {
        let http = OAuth2Http::new(config.http_timeout_secs());
        let redirect_uri = config.redirect_uri().to_string();
        let mut registry = Self {
            entries: Vec::new(),
        };

        for (name, settings) in config.providers() {
            let adapter: Arc<dyn ProviderAdapter> = match settings {
                ProviderSettings::Google(s) => Arc::new(GoogleAdapter::new(
                    name,
                    s.clone(),
                    redirect_uri.clone(),
                    http.clone(),
                )),
                ProviderSettings::Apple(s) => Arc::new(AppleAdapter::new(
                    name,
                    s.clone(),
                    redirect_uri.clone(),
                    http.clone(),
                )),
                ProviderSettings::Facebook(s) => Arc::new(FacebookAdapter::new(
                    name,
                    s.clone(),
                    redirect_uri.clone(),
                    http.clone(),
                )),
                ProviderSettings::AzureB2c(s) => Arc::new(AzureB2cAdapter::new(
                    name,
                    s.clone(),
                    redirect_uri.clone(),
                    http.clone(),
                )),
                ProviderSettings::Custom(s) => Arc::new(CustomAdapter::new(
                    name,
                    s.clone(),
                    redirect_uri.clone(),
                    http.clone(),
                )),
            };
            registry.register(settings.enabled(), adapter);
        }
        registry
    }

    /// Register an adapter (built-in or caller-provided). A later
    /// registration under the same name replaces the earlier one.
    pub fn register(&mut self, enabled: bool, adapter: Arc<dyn ProviderAdapter>) {
        let name = adapter.name().to_string();
        tracing::debug!(provider = %name, enabled, "Registering provider adapter");
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.enabled = enabled;
                entry.adapter = adapter;
            }
            None => self.entries.push(RegistryEntry {
                name,
                enabled,
                adapter,
            }),
        }
    }

    /// Enabled providers only, in configuration-declared order.
    pub fn available_providers(&self) -> Vec<ProviderInfo> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| ProviderInfo {
                name: e.name.clone(),
                display_name: e.adapter.display_name().to_string(),
                capabilities: e.adapter.capabilities(),
                enabled: true,
            })
            .collect()
    }

    /// Case-sensitive exact match. A disabled provider resolves as
    /// not-found even though it still exists in configuration.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.entries
            .iter()
            .find(|e| e.name == name && e.enabled)
            .map(|e| Arc::clone(&e.adapter))
    }
}
