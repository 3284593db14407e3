//! Dynamic ad boost: tags ad units that have reached the viewability
//! threshold on this page so bidders can boost them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use validator::Validate;

use super::{deep_set, AuctionSession, RequestBidsConfig, RtdOutcome, RtdProvider, RtdServices};
use crate::auction::context::ConsentSignals;
use crate::settings::{IntegrationConfig, Settings};

const PROVIDER_NAME: &str = "dynamicAdBoost";
const CONFIG_KEY: &str = "dynamic_ad_boost";
const SCRIPT_BASE_URL: &str = "https://adxbid.info";
/// Visible ratio an element must exceed to count as viewed.
pub const VIEWABILITY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DynamicAdBoostConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_script_base_url")]
    #[validate(url)]
    pub script_base_url: String,
}

fn default_enabled() -> bool {
    true
}

fn default_script_base_url() -> String {
    SCRIPT_BASE_URL.to_string()
}

impl Default for DynamicAdBoostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            script_base_url: default_script_base_url(),
        }
    }
}

impl IntegrationConfig for DynamicAdBoostConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Record one intersection observation for `element_id`.
///
/// Returns `true` when the observation counts as viewed. Once viewed, the
/// host may stop observing the element.
pub fn record_observation(
    session: &mut AuctionSession,
    element_id: &str,
    intersection_ratio: f64,
    is_intersecting: bool,
) -> bool {
    if !is_intersecting || intersection_ratio <= VIEWABILITY_THRESHOLD {
        return false;
    }
    session
        .viewability
        .insert(element_id.to_string(), intersection_ratio);
    true
}

#[derive(Debug, Default)]
pub struct DynamicAdBoostProvider {
    config: DynamicAdBoostConfig,
}

impl DynamicAdBoostProvider {
    #[must_use]
    pub fn new(config: DynamicAdBoostConfig) -> Self {
        Self { config }
    }

    /// Script the host should load for `hostname`.
    #[must_use]
    pub fn script_url(&self, hostname: &str) -> String {
        format!(
            "{}/rtd-{}.js",
            self.config.script_base_url.trim_end_matches('/'),
            hostname
        )
    }
}

#[async_trait]
impl RtdProvider for DynamicAdBoostProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn init(&self, _consent: &ConsentSignals) -> bool {
        true
    }

    async fn get_bid_request_data(
        &self,
        config: &mut RequestBidsConfig,
        session: &mut AuctionSession,
    ) -> RtdOutcome {
        let mut boosted = 0;
        for ad_unit in &mut config.ad_units {
            let Some(ratio) = session.viewability.get(&ad_unit.code) else {
                continue;
            };
            let ortb2_imp = ad_unit.ortb2_imp.get_or_insert(Json::Null);
            deep_set(
                ortb2_imp,
                &["ext", "data", PROVIDER_NAME, ad_unit.code.as_str()],
                Json::from(*ratio),
            );
            boosted += 1;
        }

        if boosted == 0 {
            return RtdOutcome::Skipped("no viewed ad units".to_string());
        }
        log::debug!("dynamicAdBoost: boosted {} ad units", boosted);
        RtdOutcome::Applied
    }
}

/// Register the provider when `[rtd.dynamic_ad_boost]` is present and enabled.
#[must_use]
pub fn register_providers(settings: &Settings, _services: &RtdServices) -> Vec<Arc<dyn RtdProvider>> {
    let mut providers: Vec<Arc<dyn RtdProvider>> = Vec::new();

    match settings.rtd_config::<DynamicAdBoostConfig>(CONFIG_KEY) {
        Ok(Some(config)) => {
            log::info!("Registering dynamicAdBoost RTD provider");
            providers.push(Arc::new(DynamicAdBoostProvider::new(config)));
        }
        Ok(None) => {
            log::debug!("dynamicAdBoost RTD config absent or disabled");
        }
        Err(e) => {
            log::error!("Failed to load dynamicAdBoost configuration: {:?}", e);
        }
    }

    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtd::RtdAdUnit;
    use serde_json::json;

    fn ad_unit(code: &str, ortb2_imp: Option<Json>) -> RtdAdUnit {
        RtdAdUnit {
            code: code.to_string(),
            ortb2_imp,
            ..RtdAdUnit::default()
        }
    }

    #[test]
    fn test_record_observation_threshold() {
        let mut session = AuctionSession::default();

        assert!(!record_observation(&mut session, "div-1", 0.5, true));
        assert!(!record_observation(&mut session, "div-1", 0.9, false));
        assert!(record_observation(&mut session, "div-1", 0.75, true));
        assert_eq!(session.viewability.get("div-1"), Some(&0.75));
    }

    #[test]
    fn test_viewed_units_are_tagged() {
        let provider = DynamicAdBoostProvider::default();
        let mut session = AuctionSession::default();
        record_observation(&mut session, "div-1", 0.8, true);

        let mut config = RequestBidsConfig {
            ad_units: vec![
                ad_unit("div-1", Some(json!({ "ext": { "gpid": "/1/div-1" } }))),
                ad_unit("div-2", None),
            ],
            ..RequestBidsConfig::default()
        };

        let outcome = tokio_test::block_on(provider.get_bid_request_data(&mut config, &mut session));
        assert_eq!(outcome, RtdOutcome::Applied);
        assert_eq!(
            config.ad_units[0].ortb2_imp,
            Some(json!({
                "ext": { "gpid": "/1/div-1", "data": { "dynamicAdBoost": { "div-1": 0.8 } } }
            }))
        );
        assert!(config.ad_units[1].ortb2_imp.is_none());
    }

    #[test]
    fn test_nothing_viewed_still_resolves() {
        let provider = DynamicAdBoostProvider::default();
        let mut config = RequestBidsConfig {
            ad_units: vec![ad_unit("div-1", None)],
            ..RequestBidsConfig::default()
        };

        let outcome = tokio_test::block_on(
            provider.get_bid_request_data(&mut config, &mut AuctionSession::default()),
        );
        assert!(matches!(outcome, RtdOutcome::Skipped(_)));
        assert!(config.ad_units[0].ortb2_imp.is_none());
    }

    #[test]
    fn test_script_url() {
        let provider = DynamicAdBoostProvider::default();
        assert_eq!(provider.script_url("www.example.com"), "https://adxbid.info/rtd-www.example.com.js");
    }
}
