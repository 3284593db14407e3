//! TheAdx OpenRTB adapter.
//!
//! One request per ad unit, posted to `<endpoint>?tagid=<tag>`. The response
//! carries a single bid for the single impression, so bids are correlated by
//! payload rather than by id.

use std::sync::Arc;

use error_stack::Report;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use validator::Validate;

use crate::auction::adapter::{
    Batch, BatchItem, BidPolicy, BidderAdapter, DecodeResult, DecodedAd, DecodedVideo,
    EncodeContext, EncodedRequest, PartitionPolicy, PolicyOverrides,
};
use crate::auction::identity::{FlatField, IdentitySchema};
use crate::auction::types::{
    AdUnitRequest, BidMeta, BidderParams, ExchangeResponse, MediaType, MediaTypeBlock,
    SyncOptions, UserSync, WirePayload,
};
use crate::auction::context::PrivacyContext;
use crate::error::TransformError;
use crate::native::catalog::AssetCatalog;
use crate::native::{self, DecodedNative, NativeSource};
use crate::settings::{option_string_from_string_or_number, IntegrationConfig, Settings};
use crate::sizes;

pub const BIDDER_CODE: &str = "theadx";
const ALIASES: &[&str] = &["theAdx"];

const ENDPOINT: &str = "https://ssp.theadx.com/request";
const TR_ENDPOINT: &str = "https://ssptr.theadx.com/request";

/// TTL applied when the response has no `ext` block at all.
const DEFAULT_TTL_SECONDS: u32 = 3000;
/// TTL applied when `ext` is present without a usable `ttl`.
const EXT_TTL_SECONDS: u32 = 2000;

const IDENTITY_FIELDS: &[FlatField] = &[
    FlatField::new("uidapi.com", "uid2"),
    FlatField::new("id5-sync.com", "id5id").with_ext("linkType", "id5_linktype"),
    FlatField::new("netid.de", "netid"),
    FlatField::new("pubcid.org", "sharedid"),
];

#[must_use]
pub fn matches_code(code: &str) -> bool {
    BIDDER_CODE.eq_ignore_ascii_case(code) || ALIASES.iter().any(|a| a.eq_ignore_ascii_case(code))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TheAdxParams {
    /// Publisher id.
    #[serde(
        default,
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub pid: Option<String>,
    #[serde(
        default,
        alias = "tag_id",
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub tag_id: Option<String>,
    /// Website id.
    #[serde(
        default,
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub wid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deals: Vec<Json>,
}

impl TheAdxParams {
    fn endpoint(&self) -> &'static str {
        match self.region.as_deref() {
            Some(region) if region.eq_ignore_ascii_case("tr") => TR_ENDPOINT,
            _ => ENDPOINT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TheAdxConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    #[validate(nested)]
    pub policy: PolicyOverrides,
}

fn default_enabled() -> bool {
    true
}

impl Default for TheAdxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: PolicyOverrides::default(),
        }
    }
}

impl IntegrationConfig for TheAdxConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub struct TheAdxAdapter {
    policy: BidPolicy,
}

impl TheAdxAdapter {
    #[must_use]
    pub fn new(config: &TheAdxConfig) -> Self {
        Self {
            policy: config.policy.apply(BidPolicy::with_ttl(DEFAULT_TTL_SECONDS)),
        }
    }

    fn params(request: &AdUnitRequest) -> Option<&TheAdxParams> {
        match &request.params {
            BidderParams::TheAdx(params) => Some(params),
            _ => None,
        }
    }
}

impl Default for TheAdxAdapter {
    fn default() -> Self {
        Self::new(&TheAdxConfig::default())
    }
}

impl BidderAdapter for TheAdxAdapter {
    fn code(&self) -> &'static str {
        BIDDER_CODE
    }

    fn aliases(&self) -> &'static [&'static str] {
        ALIASES
    }

    fn partition_policy(&self) -> PartitionPolicy {
        PartitionPolicy::PerRequest
    }

    fn policy(&self) -> &BidPolicy {
        &self.policy
    }

    fn identity_schema(&self) -> IdentitySchema {
        IdentitySchema::Flat(IDENTITY_FIELDS)
    }

    fn validate_bid_request(&self, request: &AdUnitRequest) -> Result<(), Report<TransformError>> {
        let missing = match Self::params(request) {
            None => "pid",
            Some(params) if params.pid.as_deref().map_or(true, str::is_empty) => "pid",
            Some(params) if params.tag_id.as_deref().map_or(true, str::is_empty) => "tagId",
            Some(_) => return Ok(()),
        };
        Err(Report::new(TransformError::InvalidBidRequest {
            message: format!("TheAdx requires {missing}"),
        }))
    }

    fn tag_id(&self, request: &AdUnitRequest) -> Option<String> {
        Self::params(request).and_then(|params| params.tag_id.clone())
    }

    fn encode(
        &self,
        batch: &Batch<'_>,
        ctx: &EncodeContext<'_>,
    ) -> Result<EncodedRequest, Report<TransformError>> {
        let Some(first) = batch.items.first() else {
            return Err(Report::new(TransformError::Adapter {
                message: "TheAdx batch is empty".to_string(),
            }));
        };
        let params = Self::params(first.request).cloned().unwrap_or_default();
        let tag_id = params.tag_id.clone().unwrap_or_default();

        let imps: Vec<Json> = batch
            .items
            .iter()
            .map(|item| build_imp(item, &tag_id, &params))
            .collect();

        let mut payload = Map::new();
        payload.insert("id".to_string(), json!(first.request.bid_id));
        payload.insert("site".to_string(), build_site(&params, ctx));
        payload.insert("device".to_string(), build_device(ctx));
        payload.insert("imp".to_string(), Json::Array(imps));
        if let Some(identity) = ctx.identity {
            payload.insert("ext".to_string(), identity.clone());
        }

        let url = format!(
            "{}?tagid={}",
            params.endpoint(),
            urlencoding::encode(&tag_id)
        );
        Ok(EncodedRequest::post(url, Json::Object(payload)).with_credentials())
    }

    fn decode(&self, body: &Json, payload: &WirePayload) -> DecodeResult {
        let Some(bid) = body
            .get("seatbid")
            .and_then(|seats| seats.get(0))
            .and_then(|seat| seat.get("bid"))
            .and_then(|bids| bids.get(0))
        else {
            return Ok(Vec::new());
        };
        Ok(vec![decode_bid(body, bid, requested_media_type(payload))])
    }

    fn user_syncs(
        &self,
        options: &SyncOptions,
        responses: &[ExchangeResponse],
        _privacy: &PrivacyContext,
    ) -> Vec<UserSync> {
        let mut syncs = Vec::new();
        if !options.iframe_enabled && !options.pixel_enabled {
            return syncs;
        }
        for response in responses {
            let Some(sync) = response.body.get("ext").and_then(|ext| ext.get("sync")) else {
                continue;
            };
            if options.iframe_enabled {
                syncs.extend(string_urls(sync.get("iframe")).map(UserSync::iframe));
            }
            if options.pixel_enabled {
                syncs.extend(string_urls(sync.get("image")).map(UserSync::image));
            }
        }
        syncs
    }
}

fn string_urls(value: Option<&Json>) -> impl Iterator<Item = &str> {
    value
        .and_then(Json::as_array)
        .into_iter()
        .flatten()
        .filter_map(Json::as_str)
}

// ============================================================================
// Request
// ============================================================================

fn build_imp(item: &BatchItem<'_>, tag_id: &str, params: &TheAdxParams) -> Json {
    let size = sizes::resolve(&item.media, item.request.sizes.as_ref());
    let dimensions = json!({
        "w": size.map(|s| s.width),
        "h": size.map(|s| s.height),
    });

    let mut imp = Map::new();
    imp.insert("id".to_string(), json!(item.descriptor.id));
    imp.insert("tagid".to_string(), json!(tag_id));

    if item.media.video.is_some() {
        let mut video = dimensions;
        if let Some(placement) = &item.placement {
            video["maxduration"] = json!(placement.max_duration);
            if let Some(min) = placement.min_duration {
                video["minduration"] = json!(min);
            }
        }
        imp.insert("video".to_string(), video);
    } else if item.media.banner.is_some() {
        imp.insert("banner".to_string(), dimensions);
    } else if let Some(spec) = &item.media.native {
        let assets = native::request_assets(spec, AssetCatalog::openrtb());
        imp.insert(
            "native".to_string(),
            json!({ "request": { "assets": assets } }),
        );
    }

    if !params.deals.is_empty() {
        imp.insert(
            "pmp".to_string(),
            json!({ "deals": params.deals, "private_auction": 0 }),
        );
    }
    Json::Object(imp)
}

fn build_site(params: &TheAdxParams, ctx: &EncodeContext<'_>) -> Json {
    let mut site = Map::new();
    if let Some(domain) = &ctx.site.domain {
        site.insert("domain".to_string(), json!(domain));
    }
    if let Some(page) = &ctx.site.page {
        site.insert("page".to_string(), json!(page));
    }
    if let Some(search) = &ctx.site.search {
        site.insert("search".to_string(), json!(search));
    }
    if let Some(wid) = &params.wid {
        site.insert("id".to_string(), json!(wid));
    }
    site.insert("publisher".to_string(), json!({ "id": params.pid }));
    if let Some(keywords) = ctx.auction.ortb2_path(&["site", "keywords"]) {
        site.insert("keywords".to_string(), keywords.clone());
    }
    Json::Object(site)
}

fn build_device(ctx: &EncodeContext<'_>) -> Json {
    let device = ctx.device;
    let mut out = Map::new();
    out.insert("js".to_string(), json!(1));
    out.insert("language".to_string(), json!(device.language));
    out.insert("ua".to_string(), json!(device.ua));
    out.insert("devicetype".to_string(), json!(device.devicetype));
    out.insert("dnt".to_string(), json!(u8::from(device.dnt)));
    if let Some(connection) = &device.connection_type {
        out.insert("connectiontype".to_string(), json!(connection));
    }
    Json::Object(out)
}

// ============================================================================
// Response
// ============================================================================

/// Media type the impression asked for, with video taking precedence over
/// banner and banner over native.
fn requested_media_type(payload: &WirePayload) -> Option<MediaType> {
    let descriptor = payload.impressions.first()?;
    match &descriptor.media {
        MediaTypeBlock::Multi { types, .. } => [MediaType::Video, MediaType::Banner, MediaType::Native]
            .into_iter()
            .find(|candidate| types.contains(candidate)),
        block => block.media_type(),
    }
}

fn int_value(value: Option<&Json>) -> Option<u32> {
    match value? {
        Json::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|v| u32::try_from(v).ok()),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_value(value: Option<&Json>) -> Option<String> {
    match value? {
        Json::String(s) if !s.is_empty() => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode_bid(
    body: &Json,
    bid: &Json,
    media_type: Option<MediaType>,
) -> Result<DecodedAd, Report<TransformError>> {
    let Some(cpm) = bid.get("price").and_then(Json::as_f64) else {
        return Err(Report::new(TransformError::InvalidResponse {
            message: "TheAdx bid has no price".to_string(),
        }));
    };
    let ext = bid.get("ext");
    let ttl = ext.map(|ext| {
        int_value(ext.get("ttl"))
            .filter(|ttl| *ttl > 0)
            .unwrap_or(EXT_TTL_SECONDS)
    });

    let mut ad = DecodedAd {
        correlation_id: None,
        cpm,
        width: int_value(bid.get("w")),
        height: int_value(bid.get("h")),
        ad_type: media_type,
        currency: string_value(body.get("cur")),
        ttl,
        creative_id: string_value(bid.get("crid")),
        deal_id: string_value(bid.get("dealid")),
        net_revenue: Some(true),
        meta: BidMeta {
            advertiser_domains: bid
                .get("adomain")
                .and_then(Json::as_array)
                .into_iter()
                .flatten()
                .filter_map(Json::as_str)
                .map(str::to_string)
                .collect(),
            ..BidMeta::default()
        },
        ..DecodedAd::default()
    };

    match media_type {
        Some(MediaType::Video) => {
            ad.video = string_value(ext.and_then(|e| e.get("vast_url"))).map(|vast_url| {
                DecodedVideo {
                    vast_url: Some(vast_url),
                    cache_key: string_value(ext.and_then(|e| e.get("rid"))),
                    ..DecodedVideo::default()
                }
            });
        }
        Some(MediaType::Native) => {
            ad.native = ext.and_then(|e| e.get("native")).map(|native| {
                let mut decoded = DecodedNative::new(NativeSource::OpenRtb(native.clone()));
                if let Some(nurl) = string_value(bid.get("nurl")) {
                    decoded.leading_impression_trackers.push(nurl);
                    decoded
                        .leading_impression_trackers
                        .extend(string_value(ext.and_then(|e| e.get("impu"))));
                    decoded
                        .leading_click_trackers
                        .extend(string_value(ext.and_then(|e| e.get("cliu"))));
                }
                decoded
            });
        }
        _ => ad.banner = string_value(bid.get("adm")),
    }
    Ok(ad)
}

/// Register the TheAdx adapter when `[bidders.theadx]` is present and enabled.
#[must_use]
pub fn register_providers(settings: &Settings) -> Vec<Arc<dyn BidderAdapter>> {
    let mut adapters: Vec<Arc<dyn BidderAdapter>> = Vec::new();

    match settings.bidder_config::<TheAdxConfig>(BIDDER_CODE) {
        Ok(Some(config)) => {
            log::info!("Registering TheAdx adapter");
            adapters.push(Arc::new(TheAdxAdapter::new(&config)));
        }
        Ok(None) => {
            log::debug!("TheAdx adapter config absent or disabled");
        }
        Err(e) => {
            log::error!("Failed to load TheAdx configuration: {:?}", e);
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
    use crate::auction::types::NormalizedBid;
    use crate::diagnostics::CollectingSink;
    use crate::test_support::tests::{ad_unit, auction_context, create_test_settings, empty_context};

    fn request(media_types: Json, params: Json) -> AdUnitRequest {
        ad_unit(json!({
            "bidder": "theadx",
            "params": params,
            "adUnitCode": "div-gpt-ad-1460505748561-0",
            "bidId": "30b31c1838de1e",
            "mediaTypes": media_types
        }))
    }

    fn banner() -> AdUnitRequest {
        request(
            json!({ "banner": { "sizes": [[300, 250], [300, 600]] } }),
            json!({ "pid": 1, "tagId": "1", "wid": 42, "deals": [{ "id": "deal-1", "bidfloor": 1.5 }] }),
        )
    }

    fn build(requests: &[AdUnitRequest], ctx: &AuctionContext) -> Vec<WirePayload> {
        RequestBuilder::default().build(
            &TheAdxAdapter::default(),
            requests,
            ctx,
            &CollectingSink::new(),
        )
    }

    fn interpret(adapter: &TheAdxAdapter, body: Json, payload: &WirePayload) -> Vec<NormalizedBid> {
        ResponseInterpreter::new().interpret(
            adapter,
            &ExchangeResponse::ok(body),
            payload,
            &CollectingSink::new(),
        )
    }

    #[test]
    fn test_is_bid_request_valid() {
        let adapter = TheAdxAdapter::default();
        assert!(adapter.is_bid_request_valid(&banner()));
        assert!(!adapter.is_bid_request_valid(&request(
            json!({ "banner": {} }),
            json!({ "pid": 1 })
        )));
        assert!(!adapter.is_bid_request_valid(&request(
            json!({ "banner": {} }),
            json!({ "tagId": "1" })
        )));
        assert!(!adapter.is_bid_request_valid(&request(json!({ "banner": {} }), json!({}))));
    }

    #[test]
    fn test_one_request_per_ad_unit() {
        let mut second = banner();
        second.bid_id = "4a8c1f2d9e0b37".to_string();
        let payloads = build(&[banner(), second], &empty_context());

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].url, "https://ssp.theadx.com/request?tagid=1");
        assert!(payloads[0].with_credentials);
        assert_eq!(payloads[1].body["id"], "4a8c1f2d9e0b37");
    }

    #[test]
    fn test_region_endpoint() {
        let tr = request(
            json!({ "banner": { "sizes": [300, 250] } }),
            json!({ "pid": 1, "tagId": "7", "region": "TR" }),
        );
        let payloads = build(&[tr], &empty_context());
        assert_eq!(payloads[0].url, "https://ssptr.theadx.com/request?tagid=7");
    }

    #[test]
    fn test_banner_payload() {
        let ctx = auction_context(json!({
            "referer": { "page": "https://www.example.com/article?q=1" },
            "device": { "userAgent": "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X)", "language": "en", "doNotTrack": true },
            "ortb2": { "site": { "keywords": "news,sport" } }
        }));
        let payloads = build(&[banner()], &ctx);
        let body = &payloads[0].body;

        assert_eq!(body["id"], "30b31c1838de1e");
        assert_eq!(
            body["site"],
            json!({
                "domain": "www.example.com",
                "page": "https://www.example.com/article?q=1",
                "search": "?q=1",
                "id": "42",
                "publisher": { "id": "1" },
                "keywords": "news,sport"
            })
        );
        assert_eq!(
            body["device"],
            json!({
                "js": 1,
                "language": "en",
                "ua": "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X)",
                "devicetype": 1,
                "dnt": 1
            })
        );
        assert_eq!(
            body["imp"][0],
            json!({
                "id": "30b31c1838de1e",
                "tagid": "1",
                "banner": { "w": 300, "h": 250 },
                "pmp": { "deals": [{ "id": "deal-1", "bidfloor": 1.5 }], "private_auction": 0 }
            })
        );
        assert!(body.get("ext").is_none());
    }

    #[test]
    fn test_video_and_native_imps() {
        let video = request(
            json!({ "video": { "context": "instream", "playerSize": [640, 480] } }),
            json!({ "pid": 1, "tagId": "1" }),
        );
        let payloads = build(&[video], &empty_context());
        assert_eq!(payloads[0].body["imp"][0]["video"], json!({ "w": 640, "h": 480 }));

        let native = request(
            json!({ "native": {
                "title": { "required": true, "len": 80 },
                "image": { "required": true, "sizes": [150, 50] },
                "sponsoredBy": { "required": false }
            }}),
            json!({ "pid": 1, "tagId": "1" }),
        );
        let payloads = build(&[native], &empty_context());
        assert_eq!(
            payloads[0].body["imp"][0]["native"]["request"]["assets"],
            json!([
                { "id": 3, "required": 1, "img": { "wmin": 150, "hmin": 50, "type": 3 } },
                { "id": 5, "required": 0, "data": { "type": 1 } },
                { "id": 0, "required": 1, "title": { "len": 80 } }
            ])
        );
    }

    #[test]
    fn test_identity_fields() {
        let ctx = auction_context(json!({
            "userIds": [
                { "source": "uidapi.com", "uids": [{ "id": "uid2-value" }] },
                { "source": "id5-sync.com", "uids": [{ "id": "id5-value", "ext": { "linkType": 2 } }] },
                { "source": "netid.de", "uids": [{ "id": "netid-value" }] },
                { "source": "pubcid.org", "uids": [{ "id": "shared-value" }] },
                { "source": "adserver.org", "uids": [{ "id": "ignored" }] }
            ]
        }));
        let payloads = build(&[banner()], &ctx);
        assert_eq!(
            payloads[0].body["ext"],
            json!({
                "uid2": "uid2-value",
                "id5id": "id5-value",
                "id5_linktype": 2,
                "netid": "netid-value",
                "sharedid": "shared-value"
            })
        );
    }

    #[test]
    fn test_interpret_banner() {
        let adapter = TheAdxAdapter::default();
        let payloads = build(&[banner()], &empty_context());
        let response = json!({
            "id": "abc",
            "cur": "TRY",
            "seatbid": [{ "bid": [{
                "price": 1.25, "w": 300, "h": 250, "adm": "<div>creative</div>",
                "crid": 5512, "dealid": "deal-1", "adomain": ["advertiser.com"],
                "ext": { "ttl": "1000" }
            }]}]
        });

        let bids = interpret(&adapter, response, &payloads[0]);
        assert_eq!(bids.len(), 1);
        let bid = &bids[0];
        assert_eq!(bid.request_id, "30b31c1838de1e");
        assert_eq!(bid.cpm, 1.25);
        assert_eq!(bid.currency, "TRY");
        assert_eq!(bid.ttl, 1000);
        assert_eq!(bid.ad(), Some("<div>creative</div>"));
        assert_eq!(bid.creative_id.as_deref(), Some("5512"));
        assert_eq!(bid.deal_id.as_deref(), Some("deal-1"));
        assert_eq!(bid.meta.advertiser_domains, vec!["advertiser.com"]);
        assert!(bid.net_revenue);
    }

    #[test]
    fn test_ttl_fallbacks() {
        let adapter = TheAdxAdapter::default();
        let payloads = build(&[banner()], &empty_context());
        let response = |ext: Option<Json>| {
            let mut bid = json!({ "price": 1.0, "adm": "<div/>", "w": 300, "h": 250 });
            if let Some(ext) = ext {
                bid["ext"] = ext;
            }
            json!({ "cur": "USD", "seatbid": [{ "bid": [bid] }] })
        };

        assert_eq!(interpret(&adapter, response(Some(json!({}))), &payloads[0])[0].ttl, 2000);
        assert_eq!(interpret(&adapter, response(None), &payloads[0])[0].ttl, 3000);
    }

    #[test]
    fn test_interpret_video() {
        let adapter = TheAdxAdapter::default();
        let video = request(
            json!({ "video": { "context": "instream", "playerSize": [640, 480] } }),
            json!({ "pid": 1, "tagId": "1" }),
        );
        let payloads = build(&[video], &empty_context());
        let response = json!({
            "cur": "USD",
            "seatbid": [{ "bid": [{
                "price": 2.0, "w": 640, "h": 480,
                "ext": { "vast_url": "https://ssp.theadx.com/vast/1", "rid": "cache-1" }
            }]}]
        });

        let bids = interpret(&adapter, response, &payloads[0]);
        assert_eq!(bids[0].media_type, MediaType::Video);
        assert_eq!(bids[0].vast_url(), Some("https://ssp.theadx.com/vast/1"));
        assert_eq!(
            serde_json::to_value(&bids[0]).expect("should serialize")["videoCacheKey"],
            "cache-1"
        );
    }

    #[test]
    fn test_interpret_native() {
        let adapter = TheAdxAdapter::default();
        let native = request(
            json!({ "native": { "title": { "required": true }, "image": { "required": true } } }),
            json!({ "pid": 1, "tagId": "1" }),
        );
        let payloads = build(&[native], &empty_context());
        let response = json!({
            "cur": "USD",
            "seatbid": [{ "bid": [{
                "price": 1.0,
                "nurl": "https://ssp.theadx.com/win",
                "ext": {
                    "impu": "https://ssp.theadx.com/imp",
                    "cliu": "https://ssp.theadx.com/click",
                    "native": {
                        "assets": [
                            { "id": 0, "title": { "text": "Title text" } },
                            { "id": 3, "img": { "url": "https://cdn.theadx.com/i.png", "w": 300, "h": 250 } },
                            { "id": 99, "data": { "value": "custom" } }
                        ],
                        "link": { "url": "https://advertiser.com", "clicktrackers": ["https://tracker.com/c"] },
                        "imptrackers": ["https://tracker.com/i"],
                        "jstracker": "<script src=\"https://tracker.com/j.js\"></script>"
                    }
                }
            }]}]
        });

        let bids = interpret(&adapter, response, &payloads[0]);
        let ad = bids[0].native().expect("should be native");
        assert_eq!(ad.title.as_deref(), Some("Title text"));
        assert_eq!(ad.image.as_ref().map(|i| (i.width, i.height)), Some((Some(300), Some(250))));
        assert_eq!(ad.click_url.as_deref(), Some("https://advertiser.com"));
        assert_eq!(
            ad.impression_trackers,
            vec![
                "https://ssp.theadx.com/win",
                "https://ssp.theadx.com/imp",
                "https://tracker.com/i"
            ]
        );
        assert_eq!(
            ad.click_trackers,
            vec!["https://ssp.theadx.com/click", "https://tracker.com/c"]
        );
        assert_eq!(ad.javascript_trackers.len(), 1);
        assert_eq!(ad.ext.get("asset99"), Some(&json!("custom")));
    }

    #[test]
    fn test_empty_seatbid() {
        let payloads = build(&[banner()], &empty_context());
        assert!(interpret(&TheAdxAdapter::default(), json!({ "seatbid": [] }), &payloads[0]).is_empty());
        assert!(interpret(&TheAdxAdapter::default(), json!({ "seatbid": [{ "bid": [] }] }), &payloads[0]).is_empty());
    }

    #[test]
    fn test_user_syncs() {
        let adapter = TheAdxAdapter::default();
        let responses = vec![ExchangeResponse::ok(json!({
            "ext": { "sync": {
                "iframe": ["https://ssp.theadx.com/sync.html"],
                "image": ["https://ssp.theadx.com/sync.gif", "https://partner.com/p.gif"]
            }}
        }))];
        let privacy = PrivacyContext::default();

        let both = adapter.user_syncs(
            &SyncOptions { iframe_enabled: true, pixel_enabled: true },
            &responses,
            &privacy,
        );
        assert_eq!(
            both,
            vec![
                UserSync::iframe("https://ssp.theadx.com/sync.html"),
                UserSync::image("https://ssp.theadx.com/sync.gif"),
                UserSync::image("https://partner.com/p.gif"),
            ]
        );
        assert!(adapter.user_syncs(&SyncOptions::default(), &responses, &privacy).is_empty());
    }

    #[test]
    fn test_register_providers() {
        let adapters = register_providers(&create_test_settings());
        assert_eq!(adapters.len(), 1);
        assert!(adapters[0].matches("theAdx"));
        assert_eq!(adapters[0].policy().ttl_seconds, 2000);
    }
}
