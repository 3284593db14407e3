//! Real-time data providers.
//!
//! A provider gets one chance per auction to enrich the outgoing request
//! configuration before adapters build their payloads. State that must
//! survive between auctions on the same page, such as viewability
//! observations or whether floors were already attached, lives in the
//! host-owned [`AuctionSession`] rather than inside the provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::auction::context::ConsentSignals;
use crate::auction::types::MediaTypes;
use crate::settings::Settings;

pub mod dynamic_ad_boost;
pub mod pubmatic;
pub mod timeout;

pub use pubmatic::{FloorsFetcher, NoFloorsFetcher, StaticFloorsFetcher};

/// An ad unit as seen by RTD providers, before it is split per bidder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtdAdUnit {
    pub code: String,
    #[serde(default)]
    pub media_types: MediaTypes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ortb2_imp: Option<Json>,
}

/// Page signals that providers would otherwise read from the browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Network Information API type or effective type, e.g. `4g`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    /// Local hour of day, 0-23. The current local hour when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
}

impl PageSignals {
    #[must_use]
    pub fn hostname(&self) -> Option<String> {
        let page = self.page_url.as_deref()?;
        url::Url::parse(page)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

/// The request configuration a provider may modify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBidsConfig {
    #[serde(default)]
    pub ad_units: Vec<RtdAdUnit>,
    /// Global first-party data fragments.
    #[serde(default)]
    pub ortb2_fragments: Json,
    /// Floors configuration for the price-floors consumer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floors: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub signals: PageSignals,
}

/// Per-page state shared by successive auctions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSession {
    /// Set once the floors provider has run, successful or not.
    #[serde(default)]
    pub floors_attached: bool,
    /// Best visible ratio recorded per element id.
    #[serde(default)]
    pub viewability: BTreeMap<String, f64>,
}

/// How a provider's hook finished. Every hook resolves with exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtdOutcome {
    Applied,
    Skipped(String),
    Failed(String),
}

/// Trait implemented by real-time data providers.
#[async_trait]
pub trait RtdProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check the provider's configuration against the consent signals.
    /// A provider that returns `false` is not called for this auction.
    fn init(&self, consent: &ConsentSignals) -> bool;

    /// Enrich `config` before the auction starts.
    async fn get_bid_request_data(
        &self,
        config: &mut RequestBidsConfig,
        session: &mut AuctionSession,
    ) -> RtdOutcome;
}

/// Collaborators injected into providers at registration time.
#[derive(Clone)]
pub struct RtdServices {
    pub floors_fetcher: Arc<dyn FloorsFetcher>,
}

impl Default for RtdServices {
    fn default() -> Self {
        Self {
            floors_fetcher: Arc::new(NoFloorsFetcher),
        }
    }
}

type ProviderBuilder = fn(&Settings, &RtdServices) -> Vec<Arc<dyn RtdProvider>>;

fn provider_builders() -> &'static [ProviderBuilder] {
    &[
        pubmatic::register_providers,
        dynamic_ad_boost::register_providers,
        timeout::register_providers,
    ]
}

/// Every enabled RTD provider, run in registration order.
#[derive(Clone, Default)]
pub struct RtdModule {
    providers: Vec<Arc<dyn RtdProvider>>,
}

impl RtdModule {
    #[must_use]
    pub fn from_settings(settings: &Settings, services: &RtdServices) -> Self {
        let mut providers = Vec::new();
        for builder in provider_builders() {
            providers.extend(builder(settings, services));
        }
        log::info!("RTD module built with {} providers", providers.len());
        Self { providers }
    }

    #[must_use]
    pub fn with_providers(providers: Vec<Arc<dyn RtdProvider>>) -> Self {
        Self { providers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run every provider whose `init` accepts `consent`.
    pub async fn run(
        &self,
        config: &mut RequestBidsConfig,
        session: &mut AuctionSession,
        consent: &ConsentSignals,
    ) -> Vec<(&'static str, RtdOutcome)> {
        let mut outcomes = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let outcome = if provider.init(consent) {
                provider.get_bid_request_data(config, session).await
            } else {
                RtdOutcome::Skipped("init rejected the configuration".to_string())
            };
            log::debug!("RTD provider {} finished: {:?}", provider.name(), outcome);
            outcomes.push((provider.name(), outcome));
        }
        outcomes
    }
}

/// Set `value` at a dotted path inside `root`, creating objects on the way.
/// Non-object intermediates are replaced.
pub(crate) fn deep_set(root: &mut Json, path: &[&str], value: Json) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };
    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Json::Object(serde_json::Map::new());
        }
        let Json::Object(map) = current else {
            return;
        };
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Json::Object(serde_json::Map::new()));
    }
    if !current.is_object() {
        *current = Json::Object(serde_json::Map::new());
    }
    if let Json::Object(map) = current {
        map.insert((*last).to_string(), value);
    }
}
