//! Viant OpenRTB 2.5 adapter.
//!
//! Banner requests share one payload; video and native requests each get
//! their own. Bids come back as a standard `seatbid[].bid[]` list correlated
//! by `impid`.

use std::sync::Arc;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use validator::Validate;

use crate::auction::adapter::{
    Batch, BatchItem, BidPolicy, BidderAdapter, DecodeResult, DecodedAd, DecodedVideo,
    EncodeContext, EncodedRequest, PartitionPolicy, PolicyOverrides,
};
use crate::auction::identity::IdentitySchema;
use crate::auction::types::{
    AdUnitRequest, BidMeta, BidderParams, MediaType, NormalizedBid, VideoSpec, WirePayload,
};
use crate::error::TransformError;
use crate::native::catalog::AssetCatalog;
use crate::native::{self, DecodedNative, NativeSource};
use crate::openrtb::{self, Banner, Format, Imp, OpenRtbRequest, OpenRtbResponse, Regs, RegsExt};
use crate::settings::{option_string_from_string_or_number, IntegrationConfig, Settings};
use crate::sizes;

pub const BIDDER_CODE: &str = "viant";
const ALIASES: &[&str] = &["viantortb"];

const ENDPOINT: &str = "https://bidders-us.adelphic.net/d/rtb/v25/prebid/bidder";
const ADAPTER_VERSION: &str = "2.0.0";
const DEFAULT_TTL_SECONDS: u32 = 300;
const NATIVE_VERSION: &str = "1.2";
const AUCTION_PRICE_MACRO: &str = "${AUCTION_PRICE}";

#[must_use]
pub fn matches_code(code: &str) -> bool {
    BIDDER_CODE.eq_ignore_ascii_case(code) || ALIASES.iter().any(|a| a.eq_ignore_ascii_case(code))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViantParams {
    #[serde(
        default,
        alias = "publisher_id",
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub publisher_id: Option<String>,
    #[serde(
        default,
        alias = "placement_id",
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub placement_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ViantConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Override the bidder endpoint, e.g. for a staging host.
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

impl Default for ViantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            policy: PolicyOverrides::default(),
        }
    }
}

impl IntegrationConfig for ViantConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub struct ViantAdapter {
    endpoint: String,
    policy: BidPolicy,
}

impl ViantAdapter {
    #[must_use]
    pub fn new(config: &ViantConfig) -> Self {
        Self {
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| ENDPOINT.to_string()),
            policy: config.policy.apply(BidPolicy::with_ttl(DEFAULT_TTL_SECONDS)),
        }
    }

    fn params(request: &AdUnitRequest) -> Option<&ViantParams> {
        match &request.params {
            BidderParams::Viant(params) => Some(params),
            _ => None,
        }
    }
}

impl Default for ViantAdapter {
    fn default() -> Self {
        Self::new(&ViantConfig::default())
    }
}

impl BidderAdapter for ViantAdapter {
    fn code(&self) -> &'static str {
        BIDDER_CODE
    }

    fn aliases(&self) -> &'static [&'static str] {
        ALIASES
    }

    fn partition_policy(&self) -> PartitionPolicy {
        PartitionPolicy::GroupBanner
    }

    fn policy(&self) -> &BidPolicy {
        &self.policy
    }

    fn identity_schema(&self) -> IdentitySchema {
        IdentitySchema::OpenRtbEids
    }

    fn validate_bid_request(&self, request: &AdUnitRequest) -> Result<(), Report<TransformError>> {
        let has_publisher = Self::params(request)
            .and_then(|params| params.publisher_id.as_deref())
            .is_some_and(|id| !id.is_empty());
        if !has_publisher {
            return Err(Report::new(TransformError::InvalidBidRequest {
                message: "publisherId is not present in bidder params".to_string(),
            }));
        }
        if request.media_types.is_empty() {
            return Err(Report::new(TransformError::InvalidBidRequest {
                message: "one of mediaTypes.banner, mediaTypes.video or mediaTypes.native is required"
                    .to_string(),
            }));
        }
        Ok(())
    }

    fn tag_id(&self, request: &AdUnitRequest) -> Option<String> {
        Self::params(request).and_then(|params| params.placement_id.clone())
    }

    fn encode(
        &self,
        batch: &Batch<'_>,
        ctx: &EncodeContext<'_>,
    ) -> Result<EncodedRequest, Report<TransformError>> {
        let Some(first) = batch.items.first() else {
            return Err(Report::new(TransformError::Adapter {
                message: "Viant batch is empty".to_string(),
            }));
        };
        let publisher_id = Self::params(first.request).and_then(|p| p.publisher_id.clone());

        let imp = batch
            .items
            .iter()
            .map(|item| build_imp(item, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        let ortb2 = |key: &str| ctx.auction.ortb2_path(&[key]).cloned();

        let request = OpenRtbRequest {
            id: ctx
                .auction
                .auction_id
                .clone()
                .unwrap_or_else(|| first.request.bid_id.clone()),
            imp,
            site: Some(build_site(ortb2("site"), ctx, publisher_id.as_deref())),
            app: ortb2("app"),
            device: Some(build_device(ortb2("device"), ctx)),
            user: build_user(ortb2("user"), ctx.identity),
            regs: build_regs(ortb2("regs"), ctx),
            source: ortb2("source"),
            cur: vec![ctx.policy.currency.clone()],
            test: None,
            ext: Some(json!({ "viant": { "adapterVersion": ADAPTER_VERSION } })),
            extra: Default::default(),
        };

        let body = serde_json::to_value(&request).change_context(TransformError::Serialization {
            message: "failed to serialize Viant request".to_string(),
        })?;
        Ok(EncodedRequest::post(self.endpoint.clone(), body))
    }

    fn decode(&self, body: &Json, payload: &WirePayload) -> DecodeResult {
        let response: OpenRtbResponse = serde_json::from_value(body.clone()).change_context(
            TransformError::InvalidResponse {
                message: "Viant response is not an OpenRTB bid response".to_string(),
            },
        )?;
        let currency = response.cur.clone();

        Ok(response
            .seatbid
            .into_iter()
            .flat_map(|seat| seat.bid)
            .map(|bid| Ok(decode_bid(bid, currency.clone(), payload)))
            .collect())
    }

    fn win_notifications(&self, bid: &NormalizedBid) -> Vec<String> {
        let Some(url) = bid.burl.as_ref().or(bid.nurl.as_ref()) else {
            return Vec::new();
        };
        let priced = url.replace(AUCTION_PRICE_MACRO, &bid.cpm.to_string());
        if priced == *url {
            vec![priced]
        } else {
            vec![url.clone(), priced]
        }
    }
}

// ============================================================================
// Request
// ============================================================================

fn build_imp(item: &BatchItem<'_>, ctx: &EncodeContext<'_>) -> Result<Imp, Report<TransformError>> {
    let request = item.request;
    let legacy = request.sizes.as_ref();

    let banner = item.media.banner.as_ref().map(|spec| Banner {
        format: sizes::resolve_all(&item.media, legacy)
            .into_iter()
            .map(|size| Format {
                w: size.width,
                h: size.height,
            })
            .collect(),
        pos: spec.pos,
        topframe: Some(u8::from(ctx.auction.referer.reached_top)),
    });

    let video = item
        .media
        .video
        .as_ref()
        .map(|spec| build_video(spec, item));

    let native_imp = item
        .media
        .native
        .as_ref()
        .map(|spec| {
            let native_request = json!({
                "ver": NATIVE_VERSION,
                "assets": native::request_assets(spec, AssetCatalog::openrtb()),
            });
            serde_json::to_string(&native_request).map(|request| openrtb::Native {
                request,
                ver: Some(NATIVE_VERSION.to_string()),
            })
        })
        .transpose()
        .change_context(TransformError::Serialization {
            message: format!("failed to serialize native request for {}", request.bid_id),
        })?;

    Ok(Imp {
        id: item.descriptor.id.clone(),
        tagid: item.descriptor.tag_id.clone(),
        banner,
        video,
        native: native_imp,
        bidfloor: request.floor.as_ref().map(|floor| floor.floor),
        bidfloorcur: request.floor.as_ref().map(|floor| floor.currency.clone()),
        secure: Some(1),
        pmp: request.ortb2_imp_path(&["pmp"]).cloned(),
        ext: request.ortb2_imp_path(&["ext"]).cloned(),
    })
}

fn build_video(spec: &VideoSpec, item: &BatchItem<'_>) -> openrtb::Video {
    let size = sizes::resolve(&item.media, item.request.sizes.as_ref());
    let (minduration, maxduration) = match &item.placement {
        Some(placement) => (placement.min_duration, Some(placement.max_duration)),
        None => (spec.minduration, spec.maxduration),
    };
    openrtb::Video {
        mimes: spec.mimes.clone(),
        w: size.map(|s| s.width),
        h: size.map(|s| s.height),
        minduration,
        maxduration,
        protocols: spec.protocols.clone(),
        startdelay: spec.startdelay,
        placement: spec.placement,
        plcmt: spec.plcmt,
        skip: spec.skip,
        playbackmethod: spec.playbackmethod.clone(),
        api: spec.api.clone(),
        pos: spec.pos,
    }
}

fn object(value: Option<Json>) -> Map<String, Json> {
    match value {
        Some(Json::Object(map)) => map,
        _ => Map::new(),
    }
}

/// First-party `ortb2.site` with the page fields and publisher filled in
/// where the host left them out.
fn build_site(ortb2_site: Option<Json>, ctx: &EncodeContext<'_>, publisher_id: Option<&str>) -> Json {
    let mut site = object(ortb2_site);
    for (key, value) in [
        ("page", &ctx.site.page),
        ("domain", &ctx.site.domain),
        ("ref", &ctx.site.referrer),
    ] {
        if let Some(value) = value {
            site.entry(key).or_insert_with(|| json!(value));
        }
    }
    if let Some(publisher_id) = publisher_id {
        let publisher = site.entry("publisher").or_insert_with(|| json!({}));
        if let Some(publisher) = publisher.as_object_mut() {
            publisher.insert("id".to_string(), json!(publisher_id));
        }
    }
    Json::Object(site)
}

fn build_device(ortb2_device: Option<Json>, ctx: &EncodeContext<'_>) -> Json {
    let mut device = object(ortb2_device);
    let derived = ctx.device;
    let mut fill = |key: &str, value: Json| {
        if !value.is_null() {
            device.entry(key).or_insert(value);
        }
    };
    fill("ua", json!(derived.ua));
    fill("language", json!(derived.language));
    fill("devicetype", json!(derived.devicetype));
    fill("w", json!(derived.w));
    fill("h", json!(derived.h));
    fill("dnt", json!(u8::from(derived.dnt)));
    Json::Object(device)
}

fn build_user(ortb2_user: Option<Json>, eids: Option<&Json>) -> Option<Json> {
    let mut user = object(ortb2_user);
    if let Some(eids) = eids {
        let ext = user.entry("ext").or_insert_with(|| json!({}));
        if let Some(ext) = ext.as_object_mut() {
            ext.insert("eids".to_string(), eids.clone());
        }
    }
    (!user.is_empty()).then_some(Json::Object(user))
}

fn build_regs(ortb2_regs: Option<Json>, ctx: &EncodeContext<'_>) -> Option<Regs> {
    let mut regs: Regs = ortb2_regs
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    let privacy = ctx.privacy;

    if privacy.gdpr_applies.is_some() || privacy.us_privacy.is_some() {
        let ext = regs.ext.get_or_insert_with(RegsExt::default);
        if let Some(flag) = privacy.gdpr_flag() {
            ext.gdpr = Some(flag);
        }
        if let Some(usp) = &privacy.us_privacy {
            ext.us_privacy = Some(usp.clone());
        }
    }
    if privacy.coppa {
        regs.coppa = Some(1);
    }
    if let Some(gpp) = &privacy.gpp {
        regs.extra.insert("gpp".to_string(), json!(gpp));
        regs.extra.insert("gpp_sid".to_string(), json!(privacy.gpp_sid));
    }

    let empty = regs.coppa.is_none() && regs.ext.is_none() && regs.extra.is_empty();
    (!empty).then_some(regs)
}

// ============================================================================
// Response
// ============================================================================

fn markup_type(mtype: Option<u8>) -> Option<MediaType> {
    match mtype? {
        1 => Some(MediaType::Banner),
        2 => Some(MediaType::Video),
        4 => Some(MediaType::Native),
        _ => None,
    }
}

/// Native markup is either the Native response itself or wrapped in a
/// `native` key.
fn native_markup(adm: &str) -> Option<Json> {
    let value: Json = serde_json::from_str(adm).ok()?;
    match value.get("native") {
        Some(inner) => Some(inner.clone()),
        None => Some(value),
    }
}

fn decode_bid(bid: openrtb::Bid, currency: Option<String>, payload: &WirePayload) -> DecodedAd {
    let declared = payload
        .descriptor(&bid.impid)
        .and_then(|descriptor| descriptor.media.media_type());
    let media_type = markup_type(bid.mtype).or(declared);

    let mut ad = DecodedAd {
        correlation_id: Some(bid.impid),
        cpm: bid.price,
        width: bid.w,
        height: bid.h,
        ad_type: media_type,
        currency,
        ttl: bid.exp.filter(|exp| *exp > 0),
        creative_id: bid.crid,
        deal_id: bid.dealid,
        burl: bid.burl,
        nurl: bid.nurl,
        meta: BidMeta {
            advertiser_domains: bid.adomain,
            ..BidMeta::default()
        },
        ..DecodedAd::default()
    };

    match (media_type, bid.adm) {
        (Some(MediaType::Video), adm) => {
            ad.video = Some(DecodedVideo {
                vast_url: adm.is_none().then(|| ad.nurl.clone()).flatten(),
                vast_xml: adm,
                ..DecodedVideo::default()
            });
        }
        (Some(MediaType::Native), Some(adm)) => {
            ad.native = native_markup(&adm)
                .map(|markup| DecodedNative::new(NativeSource::OpenRtb(markup)));
        }
        (_, adm) => ad.banner = adm,
    }
    ad
}

/// Register the Viant adapter when `[bidders.viant]` is present and enabled.
#[must_use]
pub fn register_providers(settings: &Settings) -> Vec<Arc<dyn BidderAdapter>> {
    let mut adapters: Vec<Arc<dyn BidderAdapter>> = Vec::new();

    match settings.bidder_config::<ViantConfig>(BIDDER_CODE) {
        Ok(Some(config)) => {
            log::info!(
                "Registering Viant adapter (endpoint: {})",
                config.endpoint.as_deref().unwrap_or(ENDPOINT)
            );
            adapters.push(Arc::new(ViantAdapter::new(&config)));
        }
        Ok(None) => {
            log::debug!("Viant adapter config absent or disabled");
        }
        Err(e) => {
            log::error!("Failed to load Viant configuration: {:?}", e);
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
    use crate::auction::types::ExchangeResponse;
    use crate::diagnostics::{CollectingSink, Component};
    use crate::test_support::tests::{
        ad_unit, auction_context, banner_request, create_test_settings, empty_context,
    };

    fn params() -> Json {
        json!({ "publisherId": "464", "placementId": "1" })
    }

    fn with_media(bid_id: &str, media_types: Json) -> AdUnitRequest {
        ad_unit(json!({
            "bidder": "viant",
            "params": params(),
            "adUnitCode": format!("code-{bid_id}"),
            "bidId": bid_id,
            "mediaTypes": media_types
        }))
    }

    fn build(requests: &[AdUnitRequest], ctx: &AuctionContext) -> Vec<WirePayload> {
        RequestBuilder::default().build(&ViantAdapter::default(), requests, ctx, &CollectingSink::new())
    }

    fn interpret(body: Json, payload: &WirePayload) -> Vec<NormalizedBid> {
        ResponseInterpreter::new().interpret(
            &ViantAdapter::default(),
            &ExchangeResponse::ok(body),
            payload,
            &CollectingSink::new(),
        )
    }

    #[test]
    fn test_is_bid_request_valid() {
        let adapter = ViantAdapter::default();
        assert!(adapter.is_bid_request_valid(&banner_request("viant", params())));
        assert!(adapter.is_bid_request_valid(&banner_request("viantortb", json!({ "publisherId": 464 }))));
        assert!(!adapter.is_bid_request_valid(&banner_request("viant", json!({ "placementId": "1" }))));

        let no_media = ad_unit(json!({
            "bidder": "viant",
            "params": params(),
            "adUnitCode": "code",
            "bidId": "b1",
            "sizes": [[300, 250]]
        }));
        assert!(!adapter.is_bid_request_valid(&no_media));
    }

    #[test]
    fn test_banner_group_and_separate_video_native() {
        let requests = vec![
            with_media("b1", json!({ "banner": { "sizes": [[728, 90]] } })),
            with_media("v1", json!({ "video": { "context": "instream", "playerSize": [640, 480], "mimes": ["video/mp4"], "protocols": [2, 3] } })),
            with_media("b2", json!({ "banner": { "sizes": [[300, 250], [300, 600]], "pos": 1 } })),
            with_media("n1", json!({ "native": { "title": { "required": true, "len": 80 } } })),
        ];
        let payloads = build(&requests, &empty_context());

        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0].url, ENDPOINT);
        assert!(!payloads[0].with_credentials);

        let banner_imps = payloads[0].body["imp"].as_array().expect("should have imps");
        assert_eq!(banner_imps.len(), 2);
        assert_eq!(banner_imps[1]["id"], "b2");
        assert_eq!(banner_imps[1]["tagid"], "1");
        assert_eq!(
            banner_imps[1]["banner"],
            json!({ "format": [{ "w": 300, "h": 250 }, { "w": 300, "h": 600 }], "pos": 1, "topframe": 0 })
        );

        let video = &payloads[1].body["imp"][0]["video"];
        assert_eq!(
            *video,
            json!({ "mimes": ["video/mp4"], "w": 640, "h": 480, "protocols": [2, 3] })
        );

        let native = &payloads[2].body["imp"][0]["native"];
        assert_eq!(native["ver"], "1.2");
        let native_request: Json = serde_json::from_str(
            native["request"].as_str().expect("native request should be a string"),
        )
        .expect("native request should be JSON");
        assert_eq!(
            native_request,
            json!({ "ver": "1.2", "assets": [{ "id": 0, "required": 1, "title": { "len": 80 } }] })
        );

        for payload in &payloads {
            assert_eq!(payload.body["ext"]["viant"]["adapterVersion"], "2.0.0");
            assert_eq!(payload.body["site"]["publisher"]["id"], "464");
        }
    }

    #[test]
    fn test_privacy_and_first_party_data() {
        let ctx = auction_context(json!({
            "auctionId": "auction-1",
            "consent": {
                "gdpr": { "consentString": "CONSENT", "gdprApplies": true },
                "usPrivacy": "1YNN"
            },
            "referer": { "page": "https://www.example.com/page", "ref": "https://google.com" },
            "userIds": [{ "source": "liveramp.com", "uids": [{ "id": "ramp-1", "atype": 3 }] }],
            "ortb2": {
                "site": { "name": "Example", "publisher": { "name": "Pub" } },
                "user": { "keywords": "a,b" },
                "device": { "ua": "Mozilla/5.0 (Windows NT 10.0)", "w": 1920 }
            }
        }));
        let mut request = banner_request("viant", params());
        request.ortb2_imp = Some(json!({
            "pmp": { "private_auction": 1, "deals": [{ "id": "deal-9" }] },
            "ext": { "gpid": "/123/slot" }
        }));

        let payloads = build(&[request], &ctx);
        let body = &payloads[0].body;

        assert_eq!(body["id"], "auction-1");
        assert_eq!(body["regs"], json!({ "ext": { "gdpr": 1, "us_privacy": "1YNN" } }));
        assert_eq!(
            body["site"],
            json!({
                "name": "Example",
                "publisher": { "name": "Pub", "id": "464" },
                "page": "https://www.example.com/page",
                "domain": "www.example.com",
                "ref": "https://google.com"
            })
        );
        assert_eq!(
            body["user"],
            json!({
                "keywords": "a,b",
                "ext": { "eids": [{ "source": "liveramp.com", "uids": [{ "id": "ramp-1", "atype": 3 }] }] }
            })
        );
        assert_eq!(body["device"]["ua"], "Mozilla/5.0 (Windows NT 10.0)");
        assert_eq!(body["device"]["devicetype"], 2);
        assert_eq!(body["imp"][0]["pmp"]["deals"][0]["id"], "deal-9");
        assert_eq!(body["imp"][0]["ext"]["gpid"], "/123/slot");
        assert_eq!(body["imp"][0]["secure"], 1);
    }

    #[test]
    fn test_interpret_banner_by_impid() {
        let requests = vec![
            with_media("b1", json!({ "banner": { "sizes": [[728, 90]] } })),
            with_media("b2", json!({ "banner": { "sizes": [[300, 250]] } })),
        ];
        let payloads = build(&requests, &empty_context());
        let response = json!({
            "id": "resp",
            "cur": "USD",
            "seatbid": [{ "bid": [
                { "impid": "b2", "price": 1.5, "adm": "<div>b2</div>", "w": 300, "h": 250, "crid": "c2", "adomain": ["viant.com"], "burl": "https://win.example/b?p=${AUCTION_PRICE}" },
                { "impid": "b1", "price": 0.8, "adm": "<div>b1</div>", "w": 728, "h": 90, "crid": "c1", "exp": 120 }
            ]}]
        });

        let bids = interpret(response, &payloads[0]);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].request_id, "b2");
        assert_eq!(bids[0].ad_unit_code, "code-b2");
        assert_eq!(bids[0].ttl, 300);
        assert_eq!(bids[0].meta.advertiser_domains, vec!["viant.com"]);
        assert_eq!(bids[1].request_id, "b1");
        assert_eq!(bids[1].ttl, 120);
        assert_eq!(bids[1].media_type, MediaType::Banner);

        assert_eq!(
            ViantAdapter::default().win_notifications(&bids[0]),
            vec![
                "https://win.example/b?p=${AUCTION_PRICE}".to_string(),
                "https://win.example/b?p=1.5".to_string()
            ]
        );
        assert!(ViantAdapter::default().win_notifications(&bids[1]).is_empty());
    }

    #[test]
    fn test_interpret_video_and_native() {
        let video = build(
            &[with_media("v1", json!({ "video": { "context": "instream", "playerSize": [640, 480] } }))],
            &empty_context(),
        );
        let bids = interpret(
            json!({ "seatbid": [{ "bid": [{ "impid": "v1", "price": 3.0, "adm": "<VAST version=\"4.0\"></VAST>", "mtype": 2 }] }] }),
            &video[0],
        );
        assert_eq!(bids[0].media_type, MediaType::Video);
        assert_eq!(bids[0].vast_xml(), Some("<VAST version=\"4.0\"></VAST>"));
        assert_eq!((bids[0].width, bids[0].height), (640, 480));

        let bids = interpret(
            json!({ "seatbid": [{ "bid": [{ "impid": "v1", "price": 3.0, "nurl": "https://vast.example/v.xml" }] }] }),
            &video[0],
        );
        assert_eq!(bids[0].vast_url(), Some("https://vast.example/v.xml"));

        let native = build(
            &[with_media("n1", json!({ "native": { "title": { "required": true } } }))],
            &empty_context(),
        );
        let adm = json!({ "native": {
            "assets": [{ "id": 0, "title": { "text": "Viant title" } }],
            "link": { "url": "https://advertiser.example" },
            "imptrackers": ["https://imp.example"]
        }})
        .to_string();
        let bids = interpret(
            json!({ "seatbid": [{ "bid": [{ "impid": "n1", "price": 1.0, "adm": adm }] }] }),
            &native[0],
        );
        let ad = bids[0].native().expect("should be native");
        assert_eq!(ad.title.as_deref(), Some("Viant title"));
        assert_eq!(ad.impression_trackers, vec!["https://imp.example"]);
    }

    #[test]
    fn test_no_bid_and_malformed_bodies() {
        let payloads = build(&[banner_request("viant", params())], &empty_context());
        assert!(interpret(json!({ "nbr": 0 }), &payloads[0]).is_empty());

        let sink = CollectingSink::new();
        let bids = ResponseInterpreter::new().interpret(
            &ViantAdapter::default(),
            &ExchangeResponse::ok(json!({ "seatbid": "broken" })),
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
        assert!(adapters[0].matches("viantortb"));
        assert_eq!(adapters[0].policy().ttl_seconds, 300);
    }
}
