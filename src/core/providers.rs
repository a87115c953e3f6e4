use crate::core::config::defaults::DEFAULT_PROVIDER;
use crate::core::config::{Config, ProviderConfig};
use std::collections::BTreeMap;

/// Endpoint, model and key for one completion request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub id: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

/// Maps provider keys to endpoints. Keys are resolved once when the registry
/// is built, so a session never reads the environment mid-turn.
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    default_provider: String,
    providers: BTreeMap<String, ProviderMetadata>,
}

#[derive(Clone, Debug)]
struct ProviderMetadata {
    config: ProviderConfig,
    api_key: String,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self::from_config_with_env(config, |key| std::env::var(key).ok())
    }

    pub fn from_config_with_env<F>(config: &Config, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let providers = config
            .effective_providers()
            .into_iter()
            .map(|(id, provider)| {
                let api_key = provider
                    .api_key
                    .clone()
                    .or_else(|| provider.api_key_env.as_deref().and_then(&lookup))
                    .unwrap_or_default();
                if api_key.trim().is_empty() {
                    tracing::debug!(provider = %id, "No API key available for provider");
                }
                (
                    id,
                    ProviderMetadata {
                        config: provider,
                        api_key,
                    },
                )
            })
            .collect();

        Self {
            default_provider: config.default_provider(),
            providers,
        }
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Picks the provider for `selector` (case-insensitive), falling back to
    /// the default provider for unknown or missing keys.
    pub fn resolve(&self, selector: Option<&str>, model: Option<&str>) -> ResolvedProvider {
        let requested = selector
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty());

        let (id, metadata) = requested
            .as_deref()
            .and_then(|key| self.lookup(key))
            .or_else(|| {
                if let Some(key) = &requested {
                    tracing::warn!(provider = %key, fallback = %self.default_provider, "Unknown provider requested");
                }
                self.lookup(&self.default_provider)
            })
            .or_else(|| self.lookup(DEFAULT_PROVIDER))
            .map(|(id, meta)| (id.to_string(), meta.clone()))
            .unwrap_or_else(|| {
                let config = crate::core::config::defaults::builtin_providers()
                    .remove(DEFAULT_PROVIDER)
                    .unwrap_or(ProviderConfig {
                        base_url: String::new(),
                        default_model: String::new(),
                        api_key: None,
                        api_key_env: None,
                        fixed_model: false,
                    });
                (
                    DEFAULT_PROVIDER.to_string(),
                    ProviderMetadata {
                        config,
                        api_key: String::new(),
                    },
                )
            });

        let requested_model = model.map(str::trim).filter(|value| !value.is_empty());
        let model = match requested_model {
            Some(model) if !metadata.config.fixed_model => model.to_string(),
            _ => metadata.config.default_model.clone(),
        };

        ResolvedProvider {
            id,
            base_url: metadata.config.base_url,
            model,
            api_key: metadata.api_key,
        }
    }

    fn lookup(&self, key: &str) -> Option<(&str, &ProviderMetadata)> {
        self.providers
            .get_key_value(key)
            .map(|(id, meta)| (id.as_str(), meta))
    }
}
