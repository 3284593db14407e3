use std::sync::Arc;

use crate::auction::adapter::BidderAdapter;
use crate::settings::Settings;

#[derive(Default)]
struct AdapterRegistryInner {
    adapters: Vec<Arc<dyn BidderAdapter>>,
}

/// In-memory registry of exchange adapters discovered from settings.
///
/// Cheap to clone; clones share the same adapters.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    inner: Arc<AdapterRegistryInner>,
}

impl AdapterRegistry {
    /// Build a registry from every enabled `[bidders.*]` section.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut inner = AdapterRegistryInner::default();

        for builder in super::builders() {
            for adapter in builder(settings) {
                log::info!("Registering exchange adapter: {}", adapter.code());
                inner.adapters.push(adapter);
            }
        }

        log::info!("Adapter registry built with {} adapters", inner.adapters.len());

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Registry holding exactly `adapters`, bypassing settings.
    #[must_use]
    pub fn with_adapters(adapters: Vec<Arc<dyn BidderAdapter>>) -> Self {
        Self {
            inner: Arc::new(AdapterRegistryInner { adapters }),
        }
    }

    /// Adapter registered under `code` or one of its aliases.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<Arc<dyn BidderAdapter>> {
        self.inner
            .adapters
            .iter()
            .find(|adapter| adapter.matches(code))
            .cloned()
    }

    /// Canonical codes of the registered adapters.
    #[must_use]
    pub fn codes(&self) -> Vec<&'static str> {
        self.inner.adapters.iter().map(|adapter| adapter.code()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::create_test_settings;

    #[test]
    fn test_registry_resolves_codes_and_aliases() {
        let registry = AdapterRegistry::from_settings(&create_test_settings());

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.codes(), vec!["appnexus", "mediasquare", "theadx", "viant"]);
        assert_eq!(registry.get("msq").map(|a| a.code()), Some("mediasquare"));
        assert_eq!(registry.get("theAdx").map(|a| a.code()), Some("theadx"));
        assert_eq!(registry.get("VIANTORTB").map(|a| a.code()), Some("viant"));
        assert_eq!(registry.get("appnexusAst").map(|a| a.code()), Some("appnexus"));
        assert!(registry.get("rubicon").is_none());
    }

    #[test]
    fn test_disabled_bidders_are_skipped() {
        let settings = Settings::from_toml(
            r#"
            [bidders.appnexus]
            enabled = false

            [bidders.viant]
            enabled = true
            "#,
        )
        .expect("should parse settings");
        let registry = AdapterRegistry::from_settings(&settings);

        assert_eq!(registry.codes(), vec!["viant"]);
        assert!(registry.get("appnexus").is_none());
    }

    #[test]
    fn test_invalid_config_is_not_registered() {
        let settings = Settings::from_toml(
            r#"
            [bidders.theadx]
            ttl_seconds = 0
            "#,
        )
        .expect("should parse settings");

        assert!(AdapterRegistry::from_settings(&settings).is_empty());
    }
}
