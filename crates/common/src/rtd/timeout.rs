//! Timeout rules: extra auction time based on what the auction contains and
//! the device it runs on.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{AuctionSession, PageSignals, RequestBidsConfig, RtdAdUnit, RtdOutcome, RtdProvider, RtdServices};
use crate::auction::context::ConsentSignals;
use crate::settings::{IntegrationConfig, Settings};

const PROVIDER_NAME: &str = "timeout";

/// Milliseconds to add per signal value. Every table is optional.
///
/// ```toml
/// [rtd.timeout.rules]
/// includesVideo = { "true" = 200, "false" = 50 }
/// numAdUnits = { "1-5" = 100, "6-10" = 200 }
/// deviceType = { "2" = 50, "4" = 100, "5" = 200 }
/// connectionSpeed = { slow = 200, medium = 100, fast = 50, unknown = 10 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutRules {
    #[serde(default, alias = "includes_video", skip_serializing_if = "Option::is_none")]
    pub includes_video: Option<BTreeMap<String, u64>>,
    /// Keys are exact counts (`"3"`) or inclusive ranges (`"1-5"`).
    #[serde(default, alias = "num_ad_units", skip_serializing_if = "Option::is_none")]
    pub num_ad_units: Option<BTreeMap<String, u64>>,
    #[serde(default, alias = "device_type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<BTreeMap<String, u64>>,
    #[serde(default, alias = "connection_speed", skip_serializing_if = "Option::is_none")]
    pub connection_speed: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSpeed {
    Slow,
    Medium,
    Fast,
    Unknown,
}

impl ConnectionSpeed {
    #[must_use]
    pub fn from_connection_type(connection_type: Option<&str>) -> Self {
        match connection_type {
            Some("slow-2g" | "2g") => Self::Slow,
            Some("3g") => Self::Medium,
            Some("bluetooth" | "cellular" | "ethernet" | "wifi" | "wimax" | "4g") => Self::Fast,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Medium => "medium",
            Self::Fast => "fast",
            Self::Unknown => "unknown",
        }
    }
}

static TABLET_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ipad|android 3\.0|xoom|sch-i800|playbook|tablet|kindle")
        .expect("tablet regex should compile")
});
static MOBILE_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)iphone|ipod|android|blackberry|opera|mini|windows\sce|palm|smartphone|iemobile")
        .expect("mobile regex should compile")
});

/// Device type used by the rules: 5 tablet, 4 mobile, 2 desktop.
#[must_use]
pub fn device_type(user_agent: Option<&str>) -> u8 {
    match user_agent {
        Some(ua) if TABLET_UA.is_match(ua) => 5,
        Some(ua) if MOBILE_UA.is_match(ua) => 4,
        _ => 2,
    }
}

fn ad_unit_count_bonus(rules: &BTreeMap<String, u64>, count: usize) -> u64 {
    if let Some(bonus) = rules.get(&count.to_string()).filter(|bonus| **bonus > 0) {
        return *bonus;
    }
    rules
        .iter()
        .find(|(range, _)| {
            let Some((lo, hi)) = range.split_once('-') else {
                return false;
            };
            match (lo.trim().parse::<usize>(), hi.trim().parse::<usize>()) {
                (Ok(lo), Ok(hi)) => lo <= count && count <= hi,
                _ => false,
            }
        })
        .map_or(0, |(_, bonus)| *bonus)
}

/// Milliseconds to add to the auction timeout.
#[must_use]
pub fn calculate_timeout_modifier(
    ad_units: &[RtdAdUnit],
    rules: &TimeoutRules,
    signals: &PageSignals,
) -> u64 {
    let mut modifier = 0;

    if let Some(table) = &rules.includes_video {
        let has_video = ad_units.iter().any(|unit| unit.media_types.video.is_some());
        let add = table.get(&has_video.to_string()).copied().unwrap_or(0);
        log::debug!("Adding {} to timeout for includesVideo {}", add, has_video);
        modifier += add;
    }

    if let Some(table) = &rules.num_ad_units {
        let add = ad_unit_count_bonus(table, ad_units.len());
        log::debug!("Adding {} to timeout for numAdUnits {}", add, ad_units.len());
        modifier += add;
    }

    if let Some(table) = &rules.device_type {
        let device = device_type(signals.user_agent.as_deref());
        let add = table.get(&device.to_string()).copied().unwrap_or(0);
        log::debug!("Adding {} to timeout for deviceType {}", add, device);
        modifier += add;
    }

    if let Some(table) = &rules.connection_speed {
        let speed = ConnectionSpeed::from_connection_type(signals.connection_type.as_deref());
        let add = table.get(speed.as_str()).copied().unwrap_or(0);
        log::debug!("Adding {} to timeout for connectionSpeed {}", add, speed.as_str());
        modifier += add;
    }

    modifier
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TimeoutConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: TimeoutRules,
    /// Timeout the modifier is added to when the request carries none.
    #[serde(default)]
    pub base_timeout_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl IntegrationConfig for TimeoutConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub struct TimeoutRulesProvider {
    config: TimeoutConfig,
}

impl TimeoutRulesProvider {
    #[must_use]
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RtdProvider for TimeoutRulesProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn init(&self, _consent: &ConsentSignals) -> bool {
        true
    }

    async fn get_bid_request_data(
        &self,
        config: &mut RequestBidsConfig,
        _session: &mut AuctionSession,
    ) -> RtdOutcome {
        let Some(base) = config.timeout_ms.or(self.config.base_timeout_ms) else {
            return RtdOutcome::Skipped("no base timeout".to_string());
        };
        let modifier = calculate_timeout_modifier(&config.ad_units, &self.config.rules, &config.signals);
        config.timeout_ms = Some(base + modifier);
        log::debug!("Timeout modifier {} applied, timeout is now {}", modifier, base + modifier);
        RtdOutcome::Applied
    }
}

/// Register the provider when `[rtd.timeout]` is present and enabled.
#[must_use]
pub fn register_providers(settings: &Settings, _services: &RtdServices) -> Vec<Arc<dyn RtdProvider>> {
    let mut providers: Vec<Arc<dyn RtdProvider>> = Vec::new();

    match settings.rtd_config::<TimeoutConfig>(PROVIDER_NAME) {
        Ok(Some(config)) => {
            log::info!("Registering timeout rules RTD provider");
            providers.push(Arc::new(TimeoutRulesProvider::new(config)));
        }
        Ok(None) => {
            log::debug!("Timeout rules RTD config absent or disabled");
        }
        Err(e) => {
            log::error!("Failed to load timeout rules configuration: {:?}", e);
        }
    }

    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn units(value: serde_json::Value) -> Vec<RtdAdUnit> {
        serde_json::from_value(value).expect("should deserialize ad units")
    }

    fn rules(value: serde_json::Value) -> TimeoutRules {
        serde_json::from_value(value).expect("should deserialize rules")
    }

    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
    const DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0";

    #[test]
    fn test_device_type_from_user_agent() {
        assert_eq!(device_type(Some(IPAD)), 5);
        assert_eq!(device_type(Some(IPHONE)), 4);
        assert_eq!(device_type(Some(DESKTOP)), 2);
        assert_eq!(device_type(None), 2);
    }

    #[test]
    fn test_connection_speed() {
        assert_eq!(ConnectionSpeed::from_connection_type(Some("2g")), ConnectionSpeed::Slow);
        assert_eq!(ConnectionSpeed::from_connection_type(Some("3g")), ConnectionSpeed::Medium);
        assert_eq!(ConnectionSpeed::from_connection_type(Some("wifi")), ConnectionSpeed::Fast);
        assert_eq!(ConnectionSpeed::from_connection_type(None), ConnectionSpeed::Unknown);
    }

    #[test]
    fn test_modifier_sums_every_rule() {
        let ad_units = units(json!([
            { "code": "a", "mediaTypes": { "video": { "context": "instream" } } },
            { "code": "b", "mediaTypes": { "banner": { "sizes": [[300, 250]] } } },
            { "code": "c" }
        ]));
        let rules = rules(json!({
            "includesVideo": { "true": 200, "false": 50 },
            "numAdUnits": { "1-2": 100, "3-5": 200 },
            "deviceType": { "2": 50, "4": 100, "5": 200 },
            "connectionSpeed": { "slow": 200, "medium": 100, "fast": 50, "unknown": 10 }
        }));
        let signals = PageSignals {
            user_agent: Some(IPHONE.to_string()),
            connection_type: Some("3g".to_string()),
            ..PageSignals::default()
        };

        assert_eq!(calculate_timeout_modifier(&ad_units, &rules, &signals), 200 + 200 + 100 + 100);
    }

    #[test]
    fn test_exact_ad_unit_count_wins_over_range() {
        let ad_units = units(json!([{ "code": "a" }, { "code": "b" }]));
        let rules = rules(json!({ "numAdUnits": { "1-5": 100, "2": 20 } }));
        assert_eq!(calculate_timeout_modifier(&ad_units, &rules, &PageSignals::default()), 20);

        let rules = TimeoutRules::default();
        assert_eq!(calculate_timeout_modifier(&ad_units, &rules, &PageSignals::default()), 0);
    }

    #[test]
    fn test_provider_extends_timeout() {
        let provider = TimeoutRulesProvider::new(TimeoutConfig {
            enabled: true,
            rules: rules(json!({ "includesVideo": { "false": 50 } })),
            base_timeout_ms: Some(1000),
        });
        let mut config = RequestBidsConfig {
            ad_units: units(json!([{ "code": "a" }])),
            ..RequestBidsConfig::default()
        };

        let outcome = tokio_test::block_on(
            provider.get_bid_request_data(&mut config, &mut AuctionSession::default()),
        );
        assert_eq!(outcome, RtdOutcome::Applied);
        assert_eq!(config.timeout_ms, Some(1050));
    }
}
