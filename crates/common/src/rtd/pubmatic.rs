//! PubMatic floors provider.
//!
//! Fetches the publisher's floor rules once per page and hands them to the
//! price-floors consumer together with the additional schema fields PubMatic
//! rules key on (device type, time of day, browser, OS and UTM presence).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Timelike;
use error_stack::{Report, ResultExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use validator::Validate;

use super::{AuctionSession, RequestBidsConfig, RtdOutcome, RtdProvider, RtdServices};
use crate::auction::context::ConsentSignals;
use crate::error::TransformError;
use crate::settings::{IntegrationConfig, Settings};

const PROVIDER_NAME: &str = "pubmatic";
const FLOORS_BASE_URL: &str = "https://ads.pubmatic.com/AdServer/js/pwt/floors/";
const FLOORS_ENDPOINT: &str = "/floors.json";

/// Source of floor rule documents. The host owns the transport.
#[async_trait]
pub trait FloorsFetcher: Send + Sync {
    /// Fetch the body at `url`. `Ok(None)` means an empty response.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Rtd`] when the transport fails.
    async fn fetch(&self, url: &str) -> Result<Option<String>, Report<TransformError>>;
}

/// Fetcher for hosts without a transport; every fetch is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFloorsFetcher;

#[async_trait]
impl FloorsFetcher for NoFloorsFetcher {
    async fn fetch(&self, _url: &str) -> Result<Option<String>, Report<TransformError>> {
        Ok(None)
    }
}

/// Fetcher that answers every URL with the same body.
#[derive(Debug, Default, Clone)]
pub struct StaticFloorsFetcher {
    body: Option<String>,
}

impl StaticFloorsFetcher {
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
        }
    }
}

#[async_trait]
impl FloorsFetcher for StaticFloorsFetcher {
    async fn fetch(&self, _url: &str) -> Result<Option<String>, Report<TransformError>> {
        Ok(self.body.clone())
    }
}

/// `[rtd.pubmatic]`. Ids are kept raw so `init` can tell a missing id from
/// one of the wrong type.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct PubmaticConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, alias = "publisherId")]
    pub publisher_id: Json,
    #[serde(default, alias = "profileId")]
    pub profile_id: Json,
}

fn default_enabled() -> bool {
    true
}

impl IntegrationConfig for PubmaticConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

#[must_use]
pub fn time_of_day(hour: u32) -> TimeOfDay {
    match hour {
        5..=11 => TimeOfDay::Morning,
        12..=16 => TimeOfDay::Afternoon,
        17..=18 => TimeOfDay::Evening,
        _ => TimeOfDay::Night,
    }
}

/// `"1"` when the page's query string mentions `utm`, else `"0"`.
#[must_use]
pub fn utm_flag(url: Option<&str>) -> &'static str {
    let query = url.and_then(|url| url.split('?').nth(1));
    if query.is_some_and(|query| query.contains("utm")) {
        "1"
    } else {
        "0"
    }
}

static BROWSERS: Lazy<Vec<(Regex, i32)>> = Lazy::new(|| {
    [
        (r"(?i)\b(?:crios)/([\w.]+)", 1),
        (r"(?i)\b(?:edg|edga|edgios|edge)/([\w.]+)", 2),
        (r"(?i)\b(?:opr|opera)[/ ]([\w.]+)", 3),
        (r"(?i)\b(?:fxios|firefox)/([\w.]+)", 12),
        (r"(?i)\b(?:samsungbrowser)/([\w.]+)", 10),
        (r"(?i)\b(?:ucbrowser)/([\w.]+)", 11),
        (r"(?i)\b(?:chrome)/([\w.]+)", 7),
        (r"(?i)\bversion/([\w.]+).*\bsafari\b", 8),
        (r"(?i)\b(?:msie |trident/.*rv:)([\w.]+)", 6),
    ]
    .into_iter()
    .map(|(pattern, code)| {
        (
            Regex::new(pattern).expect("browser regex should compile"),
            code,
        )
    })
    .collect()
});

/// Numeric browser code: `-1` without a user agent, `0` when unrecognized.
#[must_use]
pub fn browser_code(user_agent: Option<&str>) -> i32 {
    let Some(user_agent) = user_agent else {
        return -1;
    };
    BROWSERS
        .iter()
        .find(|(regex, _)| regex.is_match(user_agent))
        .map_or(0, |(_, code)| *code)
}

static OS_RULES: Lazy<Vec<(Regex, u32)>> = Lazy::new(|| {
    [
        (r"(?i)windows", 1),
        (r"(?i)iphone|ipad|ipod", 5),
        (r"(?i)android", 4),
        (r"(?i)mac os|macintosh", 2),
        (r"(?i)linux|x11", 3),
    ]
    .into_iter()
    .map(|(pattern, code)| (Regex::new(pattern).expect("OS regex should compile"), code))
    .collect()
});

/// Numeric OS code, `0` when unrecognized.
#[must_use]
pub fn os_code(user_agent: Option<&str>) -> u32 {
    user_agent
        .and_then(|ua| OS_RULES.iter().find(|(regex, _)| regex.is_match(ua)))
        .map_or(0, |(_, code)| *code)
}

static TABLET_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ipad|tablet|kindle|playbook|silk").expect("tablet regex should compile")
});
static ANDROID_UA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)android").expect("android regex should compile"));
static MOBILE_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)mobile|iphone|ipod|android|blackberry|iemobile|opera mini")
        .expect("mobile regex should compile")
});

/// Device code used by the floor rules: 0 desktop, 1 mobile, 2 tablet.
#[must_use]
pub fn device_code(user_agent: Option<&str>) -> u32 {
    match user_agent {
        Some(ua) if TABLET_UA.is_match(ua) => 2,
        Some(ua) if ANDROID_UA.is_match(ua) && !ua.to_ascii_lowercase().contains("mobile") => 2,
        Some(ua) if MOBILE_UA.is_match(ua) => 1,
        _ => 0,
    }
}

/// Wrap a floors document in the consumer's configuration shape.
#[must_use]
pub fn floors_config(data: &Json, config: &RequestBidsConfig) -> Json {
    let signals = &config.signals;
    let hour = signals.hour.unwrap_or_else(|| chrono::Local::now().hour());
    let user_agent = signals.user_agent.as_deref();

    json!({
        "floors": {
            "data": data,
            "additionalSchemaFields": {
                "deviceType": device_code(user_agent).to_string(),
                "timeOfDay": time_of_day(hour).as_str(),
                "browser": browser_code(user_agent).to_string(),
                "os": os_code(user_agent).to_string(),
                "utm": utm_flag(signals.page_url.as_deref()),
            }
        }
    })
}

/// Floors document URL for a publisher profile.
#[must_use]
pub fn floors_url(publisher_id: &str, profile_id: &str) -> String {
    format!("{FLOORS_BASE_URL}{publisher_id}/{profile_id}{FLOORS_ENDPOINT}")
}

pub struct PubmaticProvider {
    config: PubmaticConfig,
    fetcher: Arc<dyn FloorsFetcher>,
}

impl PubmaticProvider {
    #[must_use]
    pub fn new(config: PubmaticConfig, fetcher: Arc<dyn FloorsFetcher>) -> Self {
        Self { config, fetcher }
    }

    fn ids(&self) -> Option<(&str, &str)> {
        let publisher = self.config.publisher_id.as_str().filter(|id| !id.is_empty())?;
        let profile = self.config.profile_id.as_str().filter(|id| !id.is_empty())?;
        Some((publisher, profile))
    }

    async fn fetch_floors(&self, url: &str) -> Result<Option<Json>, Report<TransformError>> {
        let Some(body) = self.fetcher.fetch(url).await? else {
            return Ok(None);
        };
        if body.is_empty() {
            return Ok(None);
        }
        let data = serde_json::from_str(&body).change_context(TransformError::Rtd {
            message: "floors response is not valid JSON".to_string(),
        })?;
        Ok(Some(data))
    }
}

fn id_problem(value: &Json, missing: &'static str, wrong_type: &'static str) -> Option<&'static str> {
    match value {
        Json::Null => Some(missing),
        Json::String(id) if id.is_empty() => Some(missing),
        Json::String(_) => None,
        _ => Some(wrong_type),
    }
}

#[async_trait]
impl RtdProvider for PubmaticProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn init(&self, _consent: &ConsentSignals) -> bool {
        let problem = id_problem(
            &self.config.publisher_id,
            "Missing publisher Id.",
            "Publisher Id should be a string.",
        )
        .or_else(|| {
            id_problem(
                &self.config.profile_id,
                "Missing profile Id.",
                "Profile Id should be string.",
            )
        });
        if let Some(problem) = problem {
            log::error!("PubMatic RTD provider: {}", problem);
            return false;
        }
        true
    }

    async fn get_bid_request_data(
        &self,
        config: &mut RequestBidsConfig,
        session: &mut AuctionSession,
    ) -> RtdOutcome {
        if session.floors_attached {
            return RtdOutcome::Skipped("floors already attached".to_string());
        }
        session.floors_attached = true;

        let Some((publisher_id, profile_id)) = self.ids() else {
            return RtdOutcome::Skipped("publisher or profile id missing".to_string());
        };
        let url = floors_url(publisher_id, profile_id);

        match self.fetch_floors(&url).await {
            Ok(Some(data)) if data.as_object().is_some_and(|map| !map.is_empty()) => {
                let wrapped = floors_config(&data, config);
                config.floors = wrapped.get("floors").cloned();
                log::debug!("PubMatic RTD provider: floors attached from {}", url);
                RtdOutcome::Applied
            }
            Ok(Some(_)) => {
                log::info!("PubMatic RTD provider: the fetched floors data is empty");
                RtdOutcome::Skipped("floors data is empty".to_string())
            }
            Ok(None) => {
                log::error!("PubMatic RTD provider: error while fetching floors: empty response");
                RtdOutcome::Skipped("empty floors response".to_string())
            }
            Err(report) => {
                log::error!("PubMatic RTD provider: error while fetching floors: {:?}", report);
                RtdOutcome::Failed(report.current_context().to_string())
            }
        }
    }
}

/// Register the PubMatic provider when `[rtd.pubmatic]` is present and enabled.
#[must_use]
pub fn register_providers(settings: &Settings, services: &RtdServices) -> Vec<Arc<dyn RtdProvider>> {
    let mut providers: Vec<Arc<dyn RtdProvider>> = Vec::new();

    match settings.rtd_config::<PubmaticConfig>(PROVIDER_NAME) {
        Ok(Some(config)) => {
            log::info!("Registering PubMatic RTD provider");
            providers.push(Arc::new(PubmaticProvider::new(
                config,
                services.floors_fetcher.clone(),
            )));
        }
        Ok(None) => {
            log::debug!("PubMatic RTD config absent or disabled");
        }
        Err(e) => {
            log::error!("Failed to load PubMatic RTD configuration: {:?}", e);
        }
    }

    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtd::PageSignals;

    struct FailingFetcher;

    #[async_trait]
    impl FloorsFetcher for FailingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Option<String>, Report<TransformError>> {
            Err(Report::new(TransformError::Rtd {
                message: "connection reset".to_string(),
            }))
        }
    }

    fn provider(fetcher: Arc<dyn FloorsFetcher>) -> PubmaticProvider {
        PubmaticProvider::new(
            PubmaticConfig {
                enabled: true,
                publisher_id: json!("156209"),
                profile_id: json!("1234"),
            },
            fetcher,
        )
    }

    fn request_config() -> RequestBidsConfig {
        RequestBidsConfig {
            signals: PageSignals {
                page_url: Some("https://example.com/page?utm_source=news".to_string()),
                user_agent: Some(
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                        .to_string(),
                ),
                connection_type: None,
                hour: Some(13),
            },
            ..RequestBidsConfig::default()
        }
    }

    #[test]
    fn test_time_of_day_boundaries() {
        assert_eq!(time_of_day(4), TimeOfDay::Night);
        assert_eq!(time_of_day(5), TimeOfDay::Morning);
        assert_eq!(time_of_day(11), TimeOfDay::Morning);
        assert_eq!(time_of_day(12), TimeOfDay::Afternoon);
        assert_eq!(time_of_day(17), TimeOfDay::Evening);
        assert_eq!(time_of_day(18), TimeOfDay::Evening);
        assert_eq!(time_of_day(19), TimeOfDay::Night);
        assert_eq!(time_of_day(0), TimeOfDay::Night);
    }

    #[test]
    fn test_utm_flag() {
        assert_eq!(utm_flag(Some("https://example.com/?utm_source=x")), "1");
        assert_eq!(utm_flag(Some("https://example.com/?id=4")), "0");
        assert_eq!(utm_flag(Some("https://example.com/utm")), "0");
        assert_eq!(utm_flag(None), "0");
    }

    #[test]
    fn test_user_agent_codes() {
        let chrome = "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Version/17.0 Mobile/15E148 Safari/604.1";
        let tablet = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

        assert_eq!(browser_code(Some(chrome)), 7);
        assert_eq!(browser_code(Some(iphone)), 8);
        assert_eq!(browser_code(Some("curl/8.0")), 0);
        assert_eq!(browser_code(None), -1);

        assert_eq!(os_code(Some(chrome)), 1);
        assert_eq!(os_code(Some(iphone)), 5);
        assert_eq!(os_code(Some(tablet)), 4);

        assert_eq!(device_code(Some(chrome)), 0);
        assert_eq!(device_code(Some(iphone)), 1);
        assert_eq!(device_code(Some(tablet)), 2);
    }

    #[test]
    fn test_init_requires_string_ids() {
        assert!(provider(Arc::new(NoFloorsFetcher)).init(&ConsentSignals::default()));

        let numeric = PubmaticProvider::new(
            PubmaticConfig {
                enabled: true,
                publisher_id: json!(156209),
                profile_id: json!("1234"),
            },
            Arc::new(NoFloorsFetcher),
        );
        assert!(!numeric.init(&ConsentSignals::default()));

        let missing_profile = PubmaticProvider::new(
            PubmaticConfig {
                enabled: true,
                publisher_id: json!("156209"),
                profile_id: Json::Null,
            },
            Arc::new(NoFloorsFetcher),
        );
        assert!(!missing_profile.init(&ConsentSignals::default()));
    }

    #[test]
    fn test_floors_attached_once_per_session() {
        let fetcher = StaticFloorsFetcher::new(r#"{"currency":"USD","schema":{"fields":["mediaType"]},"values":{"banner":0.5}}"#);
        let pubmatic = provider(Arc::new(fetcher));
        let mut config = request_config();
        let mut session = AuctionSession::default();

        let outcome = tokio_test::block_on(pubmatic.get_bid_request_data(&mut config, &mut session));
        assert_eq!(outcome, RtdOutcome::Applied);
        assert!(session.floors_attached);

        let floors = config.floors.clone().expect("should attach floors");
        assert_eq!(floors["data"]["values"]["banner"], 0.5);
        assert_eq!(
            floors["additionalSchemaFields"],
            json!({
                "deviceType": "0",
                "timeOfDay": "afternoon",
                "browser": "7",
                "os": "1",
                "utm": "1"
            })
        );

        let mut second = request_config();
        let outcome = tokio_test::block_on(pubmatic.get_bid_request_data(&mut second, &mut session));
        assert!(matches!(outcome, RtdOutcome::Skipped(_)));
        assert!(second.floors.is_none());
    }

    #[test]
    fn test_empty_and_failed_fetches_resolve() {
        for body in ["{}", "[1, 2]", ""] {
            let empty = provider(Arc::new(StaticFloorsFetcher::new(body)));
            let mut config = request_config();
            let mut session = AuctionSession::default();
            let outcome = tokio_test::block_on(empty.get_bid_request_data(&mut config, &mut session));
            assert!(matches!(outcome, RtdOutcome::Skipped(_)), "body {body:?}");
            assert!(config.floors.is_none());
        }

        let failing = provider(Arc::new(FailingFetcher));
        let mut config = request_config();
        let mut session = AuctionSession::default();
        let outcome = tokio_test::block_on(failing.get_bid_request_data(&mut config, &mut session));
        assert!(matches!(outcome, RtdOutcome::Failed(_)));
        assert!(session.floors_attached);

        let invalid = provider(Arc::new(StaticFloorsFetcher::new("not json")));
        let outcome = tokio_test::block_on(
            invalid.get_bid_request_data(&mut request_config(), &mut AuctionSession::default()),
        );
        assert!(matches!(outcome, RtdOutcome::Failed(_)));
    }

    #[test]
    fn test_floors_url() {
        assert_eq!(
            floors_url("156209", "1234"),
            "https://ads.pubmatic.com/AdServer/js/pwt/floors/156209/1234/floors.json"
        );
    }
}
