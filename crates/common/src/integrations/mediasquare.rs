//! Mediasquare adapter.
//!
//! Every request goes out in one `codes[]` payload. Bids come back in a flat
//! `responses[]` list correlated by `bid_id`, each carrying a `mediasquare`
//! block that is echoed on the bid and again on the win notification.

use std::sync::Arc;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use validator::Validate;

use crate::auction::adapter::{
    Batch, BatchItem, BidPolicy, BidderAdapter, DecodeResult, DecodedAd, DecodedVideo,
    EncodeContext, EncodedRequest, PartitionPolicy, PolicyOverrides,
};
use crate::auction::context::PrivacyContext;
use crate::auction::identity::IdentitySchema;
use crate::auction::types::{
    AdUnitRequest, BidMeta, BidderParams, ExchangeResponse, MediaType, NormalizedBid,
    SyncOptions, UserSync, VideoContext, WirePayload,
};
use crate::error::TransformError;
use crate::native::{DecodedNative, NativeSource};
use crate::settings::{option_string_from_string_or_number, IntegrationConfig, Settings};
use crate::sizes;

pub const BIDDER_CODE: &str = "mediasquare";
const ALIASES: &[&str] = &["msq"];

const ENDPOINT: &str = "https://pbs-front.mediasquare.fr/";
const TEST_ENDPOINT: &str = "https://bidder-test.mediasquare.fr/";
const AUCTION_PATH: &str = "msq_prebid";
const WINNING_PATH: &str = "winning";
const OUTSTREAM_RENDERER_URL: &str = "https://acdn.adnxs.com/video/outstream/ANOutstreamVideo.js";
const DEFAULT_TTL_SECONDS: u32 = 300;
const EXTENSION_KEY: &str = "mediasquare";

/// Response fields copied into the `mediasquare` block when present.
const OPTIONAL_BLOCK_FIELDS: &[&str] = &["context", "increment", "ova", "match", "hasConsent"];

#[must_use]
pub fn matches_code(code: &str) -> bool {
    BIDDER_CODE.eq_ignore_ascii_case(code) || ALIASES.iter().any(|a| a.eq_ignore_ascii_case(code))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediasquareParams {
    #[serde(
        default,
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub owner: Option<String>,
    #[serde(
        default,
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,
    /// Route the auction to the test bidder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MediasquareConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Base URL the auction and winning paths are appended to.
    #[serde(default)]
    #[validate(url)]
    pub endpoint: Option<String>,
    #[serde(flatten)]
    #[validate(nested)]
    pub policy: PolicyOverrides,
}

fn default_enabled() -> bool {
    true
}

impl Default for MediasquareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            policy: PolicyOverrides::default(),
        }
    }
}

impl IntegrationConfig for MediasquareConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub struct MediasquareAdapter {
    base_url: String,
    policy: BidPolicy,
}

impl MediasquareAdapter {
    #[must_use]
    pub fn new(config: &MediasquareConfig) -> Self {
        Self {
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| ENDPOINT.to_string()),
            policy: config.policy.apply(BidPolicy::with_ttl(DEFAULT_TTL_SECONDS)),
        }
    }

    fn params(request: &AdUnitRequest) -> Option<&MediasquareParams> {
        match &request.params {
            BidderParams::Mediasquare(params) => Some(params),
            _ => None,
        }
    }
}

impl Default for MediasquareAdapter {
    fn default() -> Self {
        Self::new(&MediasquareConfig::default())
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

impl BidderAdapter for MediasquareAdapter {
    fn code(&self) -> &'static str {
        BIDDER_CODE
    }

    fn aliases(&self) -> &'static [&'static str] {
        ALIASES
    }

    fn partition_policy(&self) -> PartitionPolicy {
        PartitionPolicy::Combined
    }

    fn policy(&self) -> &BidPolicy {
        &self.policy
    }

    fn identity_schema(&self) -> IdentitySchema {
        IdentitySchema::OpenRtbEids
    }

    fn validate_bid_request(&self, request: &AdUnitRequest) -> Result<(), Report<TransformError>> {
        let present = |value: Option<&String>| value.is_some_and(|v| !v.is_empty());
        let valid = Self::params(request)
            .is_some_and(|params| present(params.owner.as_ref()) && present(params.code.as_ref()));
        if !valid {
            return Err(Report::new(TransformError::InvalidBidRequest {
                message: "owner and code are required in bidder params".to_string(),
            }));
        }
        Ok(())
    }

    fn tag_id(&self, request: &AdUnitRequest) -> Option<String> {
        Self::params(request).and_then(|params| params.code.clone())
    }

    fn encode(
        &self,
        batch: &Batch<'_>,
        ctx: &EncodeContext<'_>,
    ) -> Result<EncodedRequest, Report<TransformError>> {
        if batch.items.is_empty() {
            return Err(Report::new(TransformError::Adapter {
                message: "Mediasquare batch is empty".to_string(),
            }));
        }

        let codes = batch
            .items
            .iter()
            .map(build_code)
            .collect::<Result<Vec<_>, _>>()?;

        let mut body = Map::new();
        body.insert("codes".to_string(), Json::Array(codes));
        if let Some(page) = &ctx.site.page {
            body.insert(
                "referer".to_string(),
                json!(urlencoding::encode(page).into_owned()),
            );
        }
        if let Some(version) = &ctx.auction.host_version {
            body.insert("pbjs".to_string(), json!(version));
        }
        if let Some(gdpr) = gdpr_block(ctx.privacy) {
            body.insert("gdpr".to_string(), gdpr);
        }
        if let Some(usp) = &ctx.privacy.us_privacy {
            body.insert("uspConsent".to_string(), json!(usp));
        }
        if let Some(gpp) = &ctx.privacy.gpp {
            body.insert(
                "gpp".to_string(),
                json!({ "consentString": gpp, "applicableSections": ctx.privacy.gpp_sid }),
            );
        }
        if let Some(schain) = ctx
            .auction
            .ortb2_path(&["source", "ext", "schain"])
            .or_else(|| ctx.auction.ortb2_path(&["source", "schain"]))
        {
            body.insert("schain".to_string(), schain.clone());
        }
        if let Some(dsa) = ctx.auction.ortb2_path(&["regs", "ext", "dsa"]) {
            body.insert("dsa".to_string(), dsa.clone());
        }
        if ctx.auction.ortb2.is_object() {
            body.insert("ortb2".to_string(), ctx.auction.ortb2.clone());
        }
        if let Some(eids) = ctx.identity {
            body.insert("eids".to_string(), eids.clone());
        }

        let test = batch.items.iter().any(|item| {
            Self::params(item.request).is_some_and(|params| params.test == Some(true))
        });
        let base = if test { TEST_ENDPOINT } else { self.base_url.as_str() };
        Ok(EncodedRequest::post(join(base, AUCTION_PATH), Json::Object(body)))
    }

    fn decode(&self, body: &Json, _payload: &WirePayload) -> DecodeResult {
        let responses = match body.get("responses") {
            None | Some(Json::Null) => return Ok(Vec::new()),
            Some(Json::Array(responses)) => responses,
            Some(_) => {
                return Err(Report::new(TransformError::InvalidResponse {
                    message: "Mediasquare responses is not an array".to_string(),
                }))
            }
        };
        Ok(responses.iter().map(decode_response).collect())
    }

    fn user_syncs(
        &self,
        _options: &SyncOptions,
        responses: &[ExchangeResponse],
        _privacy: &PrivacyContext,
    ) -> Vec<UserSync> {
        let Some(cookies) = responses
            .first()
            .and_then(|response| response.body.get("cookies"))
            .and_then(Json::as_array)
        else {
            return Vec::new();
        };
        cookies
            .iter()
            .filter_map(|cookie| {
                let url = cookie.get("url").and_then(Json::as_str)?;
                match cookie.get("type").and_then(Json::as_str)? {
                    "image" => Some(UserSync::image(url)),
                    "iframe" => Some(UserSync::iframe(url)),
                    _ => None,
                }
            })
            .collect()
    }

    fn renders_video(&self, context: VideoContext) -> bool {
        context != VideoContext::Adpod
    }

    fn win_notifications(&self, bid: &NormalizedBid) -> Vec<String> {
        let Some(block) = bid.extensions.get(EXTENSION_KEY).and_then(Json::as_object) else {
            return Vec::new();
        };

        let Ok(mut url) = url::Url::parse(&join(&self.base_url, WINNING_PATH)) else {
            log::warn!("Mediasquare winning URL is invalid: {}", self.base_url);
            return Vec::new();
        };
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in block {
                if let Some(value) = scalar(value) {
                    query.append_pair(key, &value);
                }
            }
            query
                .append_pair("cpm", &bid.cpm.to_string())
                .append_pair("size", &format!("{}x{}", bid.width, bid.height))
                .append_pair("mediaType", &bid.media_type.to_string())
                .append_pair("currency", &bid.currency)
                .append_pair("requestId", &bid.request_id)
                .append_pair("adUnitCode", &bid.ad_unit_code);
        }
        vec![url.into()]
    }
}

// ============================================================================
// Request
// ============================================================================

fn build_code(item: &BatchItem<'_>) -> Result<Json, Report<TransformError>> {
    let request = item.request;
    let params = MediasquareAdapter::params(request);
    let mediatypes =
        serde_json::to_value(&item.media).change_context(TransformError::Serialization {
            message: format!("failed to serialize media types for {}", request.bid_id),
        })?;

    let mut code = json!({
        "owner": params.and_then(|p| p.owner.clone()),
        "code": params.and_then(|p| p.code.clone()),
        "adunit": request.ad_unit_code,
        "bidId": item.descriptor.id,
        "mediatypes": mediatypes,
        "floor": floor_map(item),
    });
    if let (Some(ortb2_imp), Some(entry)) = (&request.ortb2_imp, code.as_object_mut()) {
        entry.insert("ortb2Imp".to_string(), ortb2_imp.clone());
    }
    Ok(code)
}

/// Request floor keyed by every declared size plus `"*"`; empty without a
/// floor.
fn floor_map(item: &BatchItem<'_>) -> Json {
    let mut floors = Map::new();
    let Some(floor) = &item.request.floor else {
        return Json::Object(floors);
    };
    let entry = json!({ "floor": floor.floor, "currency": floor.currency });
    for size in sizes::resolve_all(&item.media, item.request.sizes.as_ref()) {
        floors.insert(size.to_string(), entry.clone());
    }
    floors.insert("*".to_string(), entry);
    Json::Object(floors)
}

fn gdpr_block(privacy: &PrivacyContext) -> Option<Json> {
    if privacy.gdpr_applies.is_none() && privacy.consent_string.is_none() {
        return None;
    }
    Some(json!({
        "consent_required": privacy.gdpr_applies.unwrap_or(false),
        "consent_string": privacy.consent_string,
    }))
}

// ============================================================================
// Response
// ============================================================================

fn string_value(value: Option<&Json>) -> Option<String> {
    match value? {
        Json::String(s) if !s.is_empty() => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_value(value: Option<&Json>) -> Option<u32> {
    match value? {
        Json::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Win notification value; numbers lose a trailing `.0`.
fn scalar(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Number(n) => n.as_f64().map(|f| f.to_string()),
        _ => None,
    }
}

fn decode_response(value: &Json) -> Result<DecodedAd, Report<TransformError>> {
    let Some(bid_id) = string_value(value.get("bid_id")) else {
        return Err(Report::new(TransformError::InvalidResponse {
            message: "Mediasquare response without bid_id".to_string(),
        }));
    };
    let Some(cpm) = value.get("cpm").and_then(Json::as_f64) else {
        return Err(Report::new(TransformError::InvalidResponse {
            message: format!("Mediasquare response {bid_id} has no numeric cpm"),
        }));
    };

    let mut block = Map::new();
    block.insert("bidder".to_string(), value.get("bidder").cloned().unwrap_or(Json::Null));
    block.insert("code".to_string(), value.get("code").cloned().unwrap_or(Json::Null));
    for field in OPTIONAL_BLOCK_FIELDS {
        if let Some(field_value) = value.get(*field) {
            block.insert((*field).to_string(), field_value.clone());
        }
    }
    let mut extensions = Map::new();
    extensions.insert(EXTENSION_KEY.to_string(), Json::Object(block));

    let mut ad = DecodedAd {
        correlation_id: Some(bid_id),
        cpm,
        width: int_value(value.get("width")),
        height: int_value(value.get("height")),
        currency: string_value(value.get("currency")),
        ttl: int_value(value.get("ttl")).filter(|ttl| *ttl > 0),
        creative_id: string_value(value.get("creative_id")),
        deal_id: string_value(value.get("deal_id")),
        net_revenue: value.get("net_revenue").and_then(Json::as_bool),
        banner: value.get("ad").and_then(Json::as_str).map(str::to_string),
        meta: BidMeta {
            advertiser_domains: value
                .get("adomain")
                .and_then(Json::as_array)
                .into_iter()
                .flatten()
                .filter_map(Json::as_str)
                .map(str::to_string)
                .collect(),
            dsa: value.get("dsa").cloned(),
            ..BidMeta::default()
        },
        extensions,
        ..DecodedAd::default()
    };

    if let Some(native) = value.get("native").filter(|native| native.is_object()) {
        ad.ad_type = Some(MediaType::Native);
        ad.native = Some(DecodedNative::new(NativeSource::Named(native.clone())));
    } else if let Some(video) = value.get("video").filter(|video| video.is_object()) {
        ad.ad_type = Some(MediaType::Video);
        ad.video = Some(DecodedVideo {
            vast_xml: string_value(video.get("xml")),
            vast_url: string_value(video.get("url")),
            ..DecodedVideo::default()
        });
        ad.renderer_url = Some(
            string_value(video.get("renderer")).unwrap_or_else(|| OUTSTREAM_RENDERER_URL.to_string()),
        );
    } else {
        ad.ad_type = Some(MediaType::Banner);
    }
    Ok(ad)
}

/// Register the Mediasquare adapter when `[bidders.mediasquare]` is present
/// and enabled.
#[must_use]
pub fn register_providers(settings: &Settings) -> Vec<Arc<dyn BidderAdapter>> {
    let mut adapters: Vec<Arc<dyn BidderAdapter>> = Vec::new();

    match settings.bidder_config::<MediasquareConfig>(BIDDER_CODE) {
        Ok(Some(config)) => {
            log::info!(
                "Registering Mediasquare adapter (endpoint: {})",
                config.endpoint.as_deref().unwrap_or(ENDPOINT)
            );
            adapters.push(Arc::new(MediasquareAdapter::new(&config)));
        }
        Ok(None) => {
            log::debug!("Mediasquare adapter config absent or disabled");
        }
        Err(e) => {
            log::error!("Failed to load Mediasquare configuration: {:?}", e);
        }
    }

    adapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::builder::RequestBuilder;
    use crate::auction::context::AuctionContext;
    use crate::auction::interpreter::ResponseInterpreter;
    use crate::auction::types::Floor;
    use crate::diagnostics::{CollectingSink, Component};
    use crate::test_support::tests::{ad_unit, auction_context, create_test_settings, empty_context};

    fn params() -> Json {
        json!({ "owner": "test", "code": "publishername_atf_desktop_rg_pave" })
    }

    fn request(media_types: Json) -> AdUnitRequest {
        ad_unit(json!({
            "adUnitCode": "banner-div",
            "bidId": "aaaa1234",
            "transactionId": "cccc1234",
            "bidder": "mediasquare",
            "params": params(),
            "ortb2Imp": { "ext": { "tid": "cccc1234" } },
            "mediaTypes": media_types
        }))
    }

    fn banner() -> AdUnitRequest {
        request(json!({ "banner": { "sizes": [[300, 250]] } }))
    }

    fn context() -> AuctionContext {
        auction_context(json!({
            "auctionId": "bbbb1234",
            "consent": {
                "gdpr": { "consentString": "BOzZdA0OzZdA0AGABBENDJ-AAAAvh7", "gdprApplies": true },
                "usPrivacy": "111222333"
            },
            "referer": {
                "page": "https://www.prebid.org",
                "canonicalUrl": "https://www.prebid.org/the/link/to/the/page"
            },
            "userIds": [{ "source": "superid.com", "uids": [{ "id": "12345678", "atype": 1 }] }],
            "ortb2": {
                "regs": { "ext": { "dsa": {
                    "dsarequired": "1",
                    "pubrender": "2",
                    "datatopub": "3",
                    "transparency": [{ "domain": "test.com", "dsaparams": [1, 2, 3] }]
                } } },
                "source": { "ext": { "schain": {
                    "ver": "1.0",
                    "complete": 1,
                    "nodes": [{ "asi": "exchange1.com", "sid": "1234", "hp": 1 }]
                } } }
            }
        }))
    }

    fn build(requests: &[AdUnitRequest], ctx: &AuctionContext) -> Vec<WirePayload> {
        RequestBuilder::default().build(
            &MediasquareAdapter::default(),
            requests,
            ctx,
            &CollectingSink::new(),
        )
    }

    fn response() -> Json {
        json!({
            "transaction_id": "cccc1234",
            "cpm": 22.256608,
            "width": 300,
            "height": 250,
            "creative_id": "158534630",
            "currency": "USD",
            "originalCpm": 25.0123,
            "originalCurrency": "USD",
            "net_revenue": true,
            "ttl": 300,
            "ad": "< --- creative code --- >",
            "bidder": "msqClassic",
            "code": "test/publishername_atf_desktop_rg_pave",
            "bid_id": "aaaa1234",
            "adomain": ["test.com"],
            "context": "instream",
            "increment": 1.0,
            "ova": "cleared",
            "dsa": {
                "behalf": "some-behalf",
                "paid": "some-paid",
                "transparency": [{ "domain": "test.com", "dsaparams": [1, 2, 3] }],
                "adrender": 1
            }
        })
    }

    fn interpret(entry: Json, payload: &WirePayload) -> Vec<NormalizedBid> {
        ResponseInterpreter::new().interpret(
            &MediasquareAdapter::default(),
            &ExchangeResponse::ok(json!({ "responses": [entry] })),
            payload,
            &CollectingSink::new(),
        )
    }

    #[test]
    fn test_bidder_code_and_alias() {
        let adapter = MediasquareAdapter::default();
        assert_eq!(adapter.code(), "mediasquare");
        assert_eq!(adapter.aliases(), &["msq"]);
        assert!(adapter.matches("MSQ"));
    }

    #[test]
    fn test_is_bid_request_valid() {
        let adapter = MediasquareAdapter::default();
        assert!(adapter.is_bid_request_valid(&banner()));

        let missing_code = ad_unit(json!({
            "adUnitCode": "banner-div",
            "bidId": "aaaa1234",
            "bidder": "msq",
            "params": { "owner": "test" },
            "mediaTypes": { "banner": { "sizes": [[300, 250]] } }
        }));
        assert!(!adapter.is_bid_request_valid(&missing_code));
    }

    #[test]
    fn test_build_request() {
        let payloads = build(&[banner()], &context());
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].url, "https://pbs-front.mediasquare.fr/msq_prebid");
        assert_eq!(payloads[0].method, http::Method::POST);

        let body = &payloads[0].body;
        let code = &body["codes"][0];
        assert_eq!(code["owner"], "test");
        assert_eq!(code["code"], "publishername_atf_desktop_rg_pave");
        assert_eq!(code["adunit"], "banner-div");
        assert_eq!(code["bidId"], "aaaa1234");
        assert!(code.get("auctionId").is_none());
        assert!(code.get("transactionId").is_none());
        assert_eq!(code["mediatypes"], json!({ "banner": { "sizes": [[300, 250]] } }));
        assert_eq!(code["ortb2Imp"]["ext"]["tid"], "cccc1234");
        assert_eq!(code["floor"], json!({}));

        assert!(body["ortb2"].is_object());
        assert_eq!(body["eids"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["dsa"]["dsarequired"], "1");
        assert_eq!(body["schain"]["nodes"][0]["asi"], "exchange1.com");
        assert_eq!(
            body["gdpr"],
            json!({ "consent_required": true, "consent_string": "BOzZdA0OzZdA0AGABBENDJ-AAAAvh7" })
        );
        assert_eq!(body["uspConsent"], "111222333");
        assert_eq!(body["referer"], "https%3A%2F%2Fwww.prebid.org");
    }

    #[test]
    fn test_build_request_with_floor() {
        let mut floored = banner();
        floored.floor = Some(Floor {
            floor: 1.0,
            currency: "USD".to_string(),
        });

        let payloads = build(&[floored], &context());
        let floor = &payloads[0].body["codes"][0]["floor"];
        assert_eq!(floor["300x250"]["floor"], 1.0);
        assert_eq!(floor["300x250"]["currency"], "USD");
        assert_eq!(floor["*"]["floor"], 1.0);
    }

    #[test]
    fn test_requests_share_one_payload_and_test_endpoint() {
        let mut second = banner();
        second.bid_id = "dddd5678".to_string();
        let payloads = build(&[banner(), second], &empty_context());
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].body["codes"].as_array().map(Vec::len), Some(2));
        assert!(payloads[0].body.get("gdpr").is_none());

        let test_request = ad_unit(json!({
            "adUnitCode": "banner-div",
            "bidId": "aaaa1234",
            "bidder": "mediasquare",
            "params": { "owner": "test", "code": "publishername_atf_desktop_rg_pave", "test": true },
            "mediaTypes": { "banner": { "sizes": [[300, 250]] } }
        }));
        let payloads = build(&[test_request], &empty_context());
        assert_eq!(payloads[0].url, "https://bidder-test.mediasquare.fr/msq_prebid");
    }

    #[test]
    fn test_interpret_response() {
        let payloads = build(&[banner()], &context());
        let bids = interpret(response(), &payloads[0]);

        assert_eq!(bids.len(), 1);
        let bid = &bids[0];
        assert_eq!(bid.cpm, 22.256608);
        assert_eq!(bid.ad(), Some("< --- creative code --- >"));
        assert_eq!((bid.width, bid.height), (300, 250));
        assert_eq!(bid.creative_id.as_deref(), Some("158534630"));
        assert_eq!(bid.currency, "USD");
        assert!(bid.net_revenue);
        assert_eq!(bid.ttl, 300);
        assert_eq!(bid.request_id, "aaaa1234");
        assert_eq!(bid.meta.advertiser_domains, vec!["test.com"]);
        assert_eq!(bid.meta.dsa.as_ref().map(|dsa| &dsa["behalf"]), Some(&json!("some-behalf")));

        let value = serde_json::to_value(bid).expect("should serialize bid");
        assert_eq!(
            value["mediasquare"],
            json!({
                "bidder": "msqClassic",
                "code": "test/publishername_atf_desktop_rg_pave",
                "context": "instream",
                "increment": 1.0,
                "ova": "cleared"
            })
        );
    }

    #[test]
    fn test_match_and_has_consent_are_echoed() {
        let payloads = build(&[banner()], &context());
        let mut entry = response();
        entry["match"] = json!(true);
        entry["hasConsent"] = json!(true);

        let bids = interpret(entry, &payloads[0]);
        let block = &bids[0].extensions["mediasquare"];
        assert_eq!(block["match"], true);
        assert_eq!(block["hasConsent"], true);
    }

    #[test]
    fn test_win_notification_carries_block() {
        let payloads = build(&[banner()], &context());
        let mut entry = response();
        entry["match"] = json!(true);
        entry["hasConsent"] = json!(true);
        let bids = interpret(entry, &payloads[0]);

        let adapter = MediasquareAdapter::default();
        let urls = adapter.win_notifications(&bids[0]);
        assert_eq!(urls.len(), 1);

        let url = url::Url::parse(&urls[0]).expect("should be a valid URL");
        assert_eq!(url.path(), "/winning");
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("increment").map(String::as_str), Some("1"));
        assert_eq!(query.get("ova").map(String::as_str), Some("cleared"));
        assert_eq!(query.get("match").map(String::as_str), Some("true"));
        assert_eq!(query.get("size").map(String::as_str), Some("300x250"));
        assert_eq!(query.get("requestId").map(String::as_str), Some("aaaa1234"));

        let mut plain = bids[0].clone();
        plain.extensions.clear();
        assert!(adapter.win_notifications(&plain).is_empty());
    }

    #[test]
    fn test_user_syncs_from_cookies() {
        let adapter = MediasquareAdapter::default();
        let options = SyncOptions::default();
        let privacy = PrivacyContext::default();

        let without = [ExchangeResponse::ok(json!({ "responses": [response()] }))];
        assert!(adapter.user_syncs(&options, &without, &privacy).is_empty());

        let with = [ExchangeResponse::ok(json!({
            "responses": [response()],
            "cookies": [{ "type": "image", "url": "http://www.cookie.sync.org/" }]
        }))];
        assert_eq!(
            adapter.user_syncs(&options, &with, &privacy),
            vec![UserSync::image("http://www.cookie.sync.org/")]
        );

        assert!(adapter.user_syncs(&options, &[], &privacy).is_empty());
        assert!(adapter
            .user_syncs(&options, &[ExchangeResponse::ok(json!({}))], &privacy)
            .is_empty());
    }

    #[test]
    fn test_interpret_native() {
        let payloads = build(
            &[request(json!({ "native": { "title": { "required": true, "len": 80 } } }))],
            &context(),
        );
        let mut entry = response();
        entry["native"] = json!({ "title": "native title" });

        let bids = interpret(entry, &payloads[0]);
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].media_type, MediaType::Native);
        let native = bids[0].native().expect("should be native");
        assert_eq!(native.title.as_deref(), Some("native title"));
    }

    #[test]
    fn test_interpret_video_with_renderer() {
        let payloads = build(
            &[request(json!({ "video": {
                "context": "instream",
                "playerSize": [640, 480],
                "mimes": ["video/mp4"]
            } }))],
            &context(),
        );
        let mut entry = response();
        entry["video"] = json!({ "xml": "my vast XML", "url": "my vast url" });

        let bids = interpret(entry, &payloads[0]);
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].media_type, MediaType::Video);
        assert_eq!(bids[0].vast_xml(), Some("my vast XML"));
        assert_eq!(bids[0].vast_url(), Some("my vast url"));
        let renderer = bids[0].renderer.as_ref().expect("should have a renderer");
        assert_eq!(renderer.url, OUTSTREAM_RENDERER_URL);
        assert_eq!(renderer.ad_unit_code, "banner-div");
    }

    #[test]
    fn test_malformed_entries_are_reported() {
        let payloads = build(&[banner()], &context());
        let sink = CollectingSink::new();
        let bids = ResponseInterpreter::new().interpret(
            &MediasquareAdapter::default(),
            &ExchangeResponse::ok(json!({ "responses": [{ "cpm": 1.0 }, response()] })),
            &payloads[0],
            &sink,
        );
        assert_eq!(bids.len(), 1);
        assert_eq!(sink.count_for(Component::ResponseInterpreter), 1);

        let sink = CollectingSink::new();
        let bids = ResponseInterpreter::new().interpret(
            &MediasquareAdapter::default(),
            &ExchangeResponse::ok(json!({ "responses": "broken" })),
            &payloads[0],
            &sink,
        );
        assert!(bids.is_empty());
        assert_eq!(sink.count_for(Component::ResponseInterpreter), 1);
    }

    #[test]
    fn test_register_providers() {
        let adapters = register_providers(&create_test_settings());
        assert_eq!(adapters.len(), 1);
        assert!(adapters[0].matches("msq"));
        assert_eq!(adapters[0].policy().ttl_seconds, 300);
    }
}
