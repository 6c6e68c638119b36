use anyhow::{Result, anyhow, bail};
use pkg_types::config::ProviderSettings;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::Provider;
use crate::f5::F5Provider;
use crate::zevenet::ZevenetProvider;

/// Builds a provider from its connection settings.
pub type ProviderFactory = fn(&ProviderSettings) -> Result<Arc<dyn Provider>>;

/// Name → factory table, constructed once at process start and passed down
/// explicitly.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every provider shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(F5Provider::SLUG.to_string(), F5Provider::factory);
        registry
            .factories
            .insert(ZevenetProvider::SLUG.to_string(), ZevenetProvider::factory);
        registry
    }

    /// Register a factory under `slug`. Registering the same slug twice is an error.
    pub fn register(&mut self, slug: &str, factory: ProviderFactory) -> Result<()> {
        if self.factories.contains_key(slug) {
            bail!("provider '{}' tried to register twice", slug);
        }
        self.factories.insert(slug.to_string(), factory);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the provider registered under `slug`.
    pub fn build(&self, slug: &str, settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        let factory = self.factories.get(slug).ok_or_else(|| {
            anyhow!(
                "No such provider: {} (known: {})",
                slug,
                self.names().join(", ")
            )
        })?;
        let provider = factory(settings)?;
        info!("Configured {} provider", provider.name());
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pkg_types::EndpointConfig;

    struct NullProvider;

    #[async_trait]
    impl Provider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
        async fn get_lb_configs(&self) -> Result<Vec<EndpointConfig>> {
            Ok(Vec::new())
        }
        async fn add_lb_config(&self, _: &EndpointConfig) -> Result<Option<String>> {
            Ok(None)
        }
        async fn update_lb_config(&self, _: &EndpointConfig) -> Result<Option<String>> {
            Ok(None)
        }
        async fn remove_lb_config(&self, _: &EndpointConfig) -> Result<()> {
            Ok(())
        }
    }

    fn null_factory(_: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(NullProvider))
    }

    #[test]
    fn builtin_names() {
        let registry = ProviderRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["f5_BigIP", "zevenet"]);
    }

    #[test]
    fn register_and_build() {
        let mut registry = ProviderRegistry::new();
        registry.register("null", null_factory).unwrap();
        let provider = registry.build("null", &ProviderSettings::default()).unwrap();
        assert_eq!(provider.name(), "null");
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ProviderRegistry::new();
        registry.register("null", null_factory).unwrap();
        assert!(registry.register("null", null_factory).is_err());
    }

    #[test]
    fn unknown_provider_fails() {
        let registry = ProviderRegistry::with_builtin();
        let err = registry
            .build("nope", &ProviderSettings::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("No such provider: nope"));
    }

    #[test]
    fn missing_settings_fail() {
        let registry = ProviderRegistry::with_builtin();
        assert!(registry.build("f5_BigIP", &ProviderSettings::default()).is_err());
        assert!(registry.build("zevenet", &ProviderSettings::default()).is_err());
    }
}
