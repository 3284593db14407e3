//! AppNexus (Xandr) UT v3 adapter.
//!
//! Every non-pod request of an auction shares one `tags` payload, chunked at
//! the batch limit; ad pods get their own payloads with one tag per slot.
//! The exchange echoes each tag's `uuid`, which is the bid id.

use std::sync::Arc;

use error_stack::Report;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use validator::Validate;

use crate::auction::adapter::{
    Batch, BatchItem, BidPolicy, BidderAdapter, DecodeResult, DecodedAd, DecodedVideo,
    EncodeContext, EncodedRequest, PartitionPolicy, PolicyOverrides,
};
use crate::auction::context::{AuctionContext, PrivacyContext, RefererInfo};
use crate::auction::identity::IdentitySchema;
use crate::auction::types::{
    AdUnitRequest, BidMeta, BidderParams, ExchangeResponse, MediaType, SyncOptions, UserSync,
    VideoContext, VideoSpec, WirePayload,
};
use crate::error::TransformError;
use crate::keywords::{self, KeywordSet};
use crate::native::catalog::{AssetCatalog, AssetKind};
use crate::native::{DecodedNative, NativeSource};
use crate::settings::{option_string_from_string_or_number, IntegrationConfig, Settings};
use crate::sizes::{self, Size};

pub const BIDDER_CODE: &str = "appnexus";
const ALIASES: &[&str] = &["appnexusAst"];

const ENDPOINT: &str = "https://ib.adnxs.com/ut/v3/prebid";
const SIMPLE_ENDPOINT: &str = "https://ib.adnxs-simple.com/ut/v3/prebid";
const IFRAME_SYNC_URL: &str = "https://acdn.adnxs.com/dmp/async_usersync.html";
const PIXEL_SYNC_URL: &str = "https://px.ads.linkedin.com/setuid?partner=appNexus";
const DEFAULT_TTL_SECONDS: u32 = 300;

const HB_SOURCE: u32 = 1;
const HB_SOURCE_ADPOD: u32 = 7;
const OMID_FRAMEWORK: u64 = 6;

/// True when `code` names this adapter or one of its aliases.
#[must_use]
pub fn matches_code(code: &str) -> bool {
    BIDDER_CODE.eq_ignore_ascii_case(code) || ALIASES.iter().any(|a| a.eq_ignore_ascii_case(code))
}

// ============================================================================
// Params and configuration
// ============================================================================

/// Publisher-supplied AppNexus parameters. Both camelCase and snake_case
/// spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppNexusParams {
    #[serde(
        default,
        alias = "placement_id",
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub placement_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub member: Option<String>,
    #[serde(default, alias = "inv_code", skip_serializing_if = "Option::is_none")]
    pub inv_code: Option<String>,
    #[serde(
        default,
        alias = "publisher_id",
        deserialize_with = "option_string_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub publisher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Json>,
    #[serde(default, alias = "private_sizes", skip_serializing_if = "Option::is_none")]
    pub private_sizes: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve: Option<f64>,
    #[serde(default, alias = "use_payment_rule", skip_serializing_if = "Option::is_none")]
    pub use_payment_rule: Option<bool>,
    /// `"above"` or `"below"` the fold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<Json>,
    /// Banner API frameworks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frameworks: Option<Json>,
    #[serde(default, alias = "allow_smaller_sizes", skip_serializing_if = "Option::is_none")]
    pub allow_smaller_sizes: Option<bool>,
    #[serde(default, alias = "traffic_source_code", skip_serializing_if = "Option::is_none")]
    pub traffic_source_code: Option<String>,
    #[serde(default, alias = "supply_type", skip_serializing_if = "Option::is_none")]
    pub supply_type: Option<String>,
    #[serde(default, alias = "ext_inv_code", skip_serializing_if = "Option::is_none")]
    pub ext_inv_code: Option<String>,
    #[serde(default, alias = "external_imp_id", skip_serializing_if = "Option::is_none")]
    pub external_imp_id: Option<String>,
}

/// `[bidders.appnexus]` settings block.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppNexusConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Flag requests as test traffic (`X-Is-Test: 1`).
    #[serde(default)]
    pub test_mode: bool,
    #[serde(flatten)]
    #[validate(nested)]
    pub policy: PolicyOverrides,
}

fn default_enabled() -> bool {
    true
}

impl Default for AppNexusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            test_mode: false,
            policy: PolicyOverrides::default(),
        }
    }
}

impl IntegrationConfig for AppNexusConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// ============================================================================
// Adapter
// ============================================================================

pub struct AppNexusAdapter {
    config: AppNexusConfig,
    policy: BidPolicy,
}

impl AppNexusAdapter {
    #[must_use]
    pub fn new(config: AppNexusConfig) -> Self {
        let policy = config.policy.apply(BidPolicy::with_ttl(DEFAULT_TTL_SECONDS));
        Self { config, policy }
    }

    fn params(request: &AdUnitRequest) -> Option<&AppNexusParams> {
        match &request.params {
            BidderParams::AppNexus(params) => Some(params),
            _ => None,
        }
    }
}

impl Default for AppNexusAdapter {
    fn default() -> Self {
        Self::new(AppNexusConfig::default())
    }
}

impl BidderAdapter for AppNexusAdapter {
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

    fn native_catalog(&self) -> &'static AssetCatalog {
        AssetCatalog::appnexus()
    }

    fn native_ext_key(&self, field: &str) -> String {
        custom_native_key(field)
    }

    fn identity_schema(&self) -> IdentitySchema {
        IdentitySchema::EidList {
            rti_partners: &[("adserver.org", "TDID"), ("uidapi.com", "UID2")],
        }
    }

    fn validate_bid_request(&self, request: &AdUnitRequest) -> Result<(), Report<TransformError>> {
        let Some(params) = Self::params(request) else {
            return Err(Report::new(TransformError::InvalidBidRequest {
                message: "params are not AppNexus params".to_string(),
            }));
        };
        if params.placement_id.is_some() || (params.member.is_some() && params.inv_code.is_some()) {
            Ok(())
        } else {
            Err(Report::new(TransformError::InvalidBidRequest {
                message: "placementId or member and invCode are required".to_string(),
            }))
        }
    }

    fn tag_id(&self, request: &AdUnitRequest) -> Option<String> {
        Self::params(request).and_then(|params| params.placement_id.clone())
    }

    fn encode(
        &self,
        batch: &Batch<'_>,
        ctx: &EncodeContext<'_>,
    ) -> Result<EncodedRequest, Report<TransformError>> {
        let tags: Vec<Json> = batch
            .items
            .iter()
            .map(|item| build_tag(item, batch.is_pod, ctx))
            .collect();

        let first_params = batch.items.iter().find_map(|item| Self::params(item.request));
        let host_version = host_version(ctx.auction);

        let mut payload = Map::new();
        payload.insert("tags".to_string(), Json::Array(tags));
        payload.insert(
            "sdk".to_string(),
            json!({ "source": "pbjs", "version": host_version }),
        );

        if let Some(user) = build_user(first_params, ctx.privacy) {
            payload.insert("user".to_string(), user);
        }
        if let Some(member) = first_params.and_then(|p| p.member.as_deref()) {
            payload.insert("member_id".to_string(), numeric(member));
        }
        if let Some(publisher) = first_params.and_then(|p| p.publisher_id.as_deref()) {
            payload.insert("publisher_id".to_string(), numeric(publisher));
        }
        if let Some(app) = first_params.and_then(|p| p.app.as_ref()) {
            if let Some(id) = app.get("id") {
                payload.insert("app".to_string(), json!({ "appid": id }));
            }
        }
        if let Some(device) = build_device(ctx.auction, first_params) {
            payload.insert("device".to_string(), device);
        }
        if !ctx.keywords.is_empty() {
            payload.insert("keywords".to_string(), json!(ctx.keywords));
        }
        if let Some(schain) = ctx.auction.ortb2_path(&["source", "ext", "schain"]) {
            payload.insert("schain".to_string(), schain.clone());
        }
        if let Some(tid) = ctx.auction.ortb2_path(&["source", "tid"]) {
            payload.insert("source".to_string(), json!({ "tid": tid }));
        }
        insert_privacy(&mut payload, ctx);
        if let Some(dsa) = build_dsa(ctx.auction) {
            payload.insert("dsa".to_string(), dsa);
        }
        if let Some(referrer) = referrer_detection(&ctx.auction.referer) {
            payload.insert("referrer_detection".to_string(), referrer);
        }
        if let Some(eids) = ctx.identity {
            payload.insert("eids".to_string(), eids.clone());
        }
        if tags_use_omid(&payload) {
            payload.insert(
                "iab_support".to_string(),
                json!({ "omidpn": "Appnexus", "omidpv": host_version }),
            );
        }

        let url = if ctx.privacy.restricts_storage() {
            SIMPLE_ENDPOINT
        } else {
            ENDPOINT
        };
        let mut request = EncodedRequest::post(url, Json::Object(payload)).with_credentials();
        if self.config.test_mode {
            request
                .headers
                .insert("X-Is-Test".to_string(), "1".to_string());
        }
        Ok(request)
    }

    fn decode(&self, body: &Json, payload: &WirePayload) -> DecodeResult {
        let Some(tags) = body.get("tags").and_then(Json::as_array) else {
            return Err(Report::new(TransformError::InvalidResponse {
                message: "AppNexus response has no tags array".to_string(),
            }));
        };

        Ok(tags
            .iter()
            .filter(|tag| !tag.get("nobid").and_then(Json::as_bool).unwrap_or(false))
            .map(|tag| {
                let ad = tag
                    .get("ads")
                    .and_then(Json::as_array)
                    .and_then(|ads| ads.iter().find(|ad| ad.get("rtb").is_some()));
                match ad {
                    Some(ad) => decode_ad(tag, ad, payload),
                    None => Err(Report::new(TransformError::InvalidResponse {
                        message: format!(
                            "AppNexus tag {} has no rtb ad",
                            json_string(tag.get("uuid")).unwrap_or_default()
                        ),
                    })),
                }
            })
            .collect())
    }

    fn user_syncs(
        &self,
        options: &SyncOptions,
        _responses: &[ExchangeResponse],
        privacy: &PrivacyContext,
    ) -> Vec<UserSync> {
        let mut syncs = Vec::new();
        if options.iframe_enabled && !privacy.restricts_storage() {
            syncs.push(UserSync::iframe(IFRAME_SYNC_URL));
        }
        if options.pixel_enabled {
            syncs.push(UserSync::image(PIXEL_SYNC_URL));
        }
        syncs
    }
}

// ============================================================================
// Request encoding
// ============================================================================

fn host_version(ctx: &AuctionContext) -> String {
    ctx.host_version
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
}

/// Identifiers go out as numbers when they look like numbers.
fn numeric(value: &str) -> Json {
    value
        .trim()
        .parse::<u64>()
        .map_or_else(|_| Json::String(value.to_string()), Json::from)
}

fn size_objects(sizes: &[Size]) -> Json {
    json!(sizes)
}

fn int_list(value: Option<&Json>) -> Option<Vec<u64>> {
    let items = value?.as_array()?;
    items.iter().map(Json::as_u64).collect()
}

fn tag_position(params: &AppNexusParams, request: &AdUnitRequest) -> Option<u32> {
    if let Some(position) = params.position.as_deref() {
        return Some(match position {
            "above" => 1,
            "below" => 2,
            _ => 0,
        });
    }
    let media = &request.media_types;
    let pos = media
        .banner
        .as_ref()
        .and_then(|banner| banner.pos)
        .or_else(|| media.video.as_ref().and_then(|video| video.pos))?;
    match pos {
        0 | 1 => Some(pos),
        3 => Some(2),
        _ => None,
    }
}

fn build_tag(item: &BatchItem<'_>, is_pod: bool, ctx: &EncodeContext<'_>) -> Json {
    let request = item.request;
    let params = AppNexusAdapter::params(request).cloned().unwrap_or_default();

    let mut tag_sizes = sizes::resolve_all(&item.media, request.sizes.as_ref());
    if tag_sizes.is_empty() && item.media.native.is_some() {
        tag_sizes.push(Size::ONE_BY_ONE);
    }

    let mut tag = Map::new();
    tag.insert("sizes".to_string(), size_objects(&tag_sizes));
    if let Some(primary) = tag_sizes.first() {
        tag.insert("primary_size".to_string(), json!(primary));
    }
    if !request.media_types.is_empty() {
        tag.insert("ad_types".to_string(), json!(item.media.declared()));
    }
    tag.insert("uuid".to_string(), json!(request.bid_id));
    if let Some(placement) = params.placement_id.as_deref() {
        tag.insert("id".to_string(), numeric(placement));
    }
    if let Some(code) = params.inv_code.as_deref() {
        tag.insert("code".to_string(), json!(code));
    }
    tag.insert(
        "allow_smaller_sizes".to_string(),
        json!(params.allow_smaller_sizes.unwrap_or(false)),
    );
    tag.insert(
        "use_pmt_rule".to_string(),
        json!(params.use_payment_rule.unwrap_or(false)),
    );
    tag.insert("prebid".to_string(), json!(true));
    tag.insert("disable_psa".to_string(), json!(true));
    tag.insert(
        "hb_source".to_string(),
        json!(if is_pod { HB_SOURCE_ADPOD } else { HB_SOURCE }),
    );

    let reserve = request.floor.as_ref().map(|f| f.floor).or(params.reserve);
    if let Some(reserve) = reserve {
        tag.insert("reserve".to_string(), json!(reserve));
    }
    if let Some(publisher) = params.publisher_id.as_deref() {
        tag.insert("publisher_id".to_string(), numeric(publisher));
    }
    if let Some(private) = params.private_sizes.as_ref() {
        tag.insert(
            "private_sizes".to_string(),
            size_objects(&sizes::parse_sizes(private)),
        );
    }
    if let Some(position) = tag_position(&params, request) {
        tag.insert("position".to_string(), json!(position));
    }
    for (key, value) in [
        ("traffic_source_code", &params.traffic_source_code),
        ("supply_type", &params.supply_type),
        ("ext_inv_code", &params.ext_inv_code),
        ("external_imp_id", &params.external_imp_id),
    ] {
        if let Some(value) = value {
            tag.insert(key.to_string(), json!(value));
        }
    }
    if let Some(gpid) = request.gpid() {
        tag.insert("gpid".to_string(), json!(gpid));
    }
    if let Some(tid) = request.ortb2_imp_path(&["ext", "tid"]) {
        tag.insert("tid".to_string(), tid.clone());
    }

    let tag_keywords = KeywordSet::merge([
        params
            .keywords
            .as_ref()
            .map(|kw| KeywordSet::from_json_map(kw, ctx.sink))
            .unwrap_or_default(),
        request
            .ortb2_imp_path(&["ext", "data", "keywords"])
            .and_then(Json::as_str)
            .map(keywords::parse_keyword_string)
            .unwrap_or_default(),
    ]);
    if !tag_keywords.is_empty() {
        tag.insert("keywords".to_string(), json!(tag_keywords));
    }

    if let Some(frameworks) = int_list(params.frameworks.as_ref()) {
        tag.insert("banner_frameworks".to_string(), json!(frameworks));
    }

    if let Some(native) = &item.media.native {
        let mut layout = Map::new();
        for (name, asset) in native {
            let Some(entry) = AssetKind::from_name(name)
                .and_then(|kind| AssetCatalog::appnexus().lookup(kind))
            else {
                continue;
            };
            let mut value = Map::new();
            value.insert("required".to_string(), json!(asset.required));
            if let Some(asset_sizes) = &asset.sizes {
                value.insert(
                    "sizes".to_string(),
                    size_objects(&sizes::parse_sizes(asset_sizes)),
                );
            }
            layout.insert(entry.wire_field_name.to_string(), Json::Object(value));
        }
        layout.insert("privacy_supported".to_string(), json!(true));
        tag.insert("native".to_string(), json!({ "layouts": [layout] }));
    }

    if let Some(video) = &item.media.video {
        insert_video(&mut tag, &params, video, item, request.renderer.is_some());
    }

    Json::Object(tag)
}

const VIDEO_PARAMS: &[&str] = &[
    "id",
    "minduration",
    "maxduration",
    "skippable",
    "playback_method",
    "frameworks",
    "context",
    "skipoffset",
];

fn playback_method_code(name: &str) -> Option<u64> {
    match name {
        "auto_play_sound_on" => Some(1),
        "auto_play_sound_off" => Some(2),
        "click_to_play" => Some(3),
        "mouse_over" => Some(4),
        "auto_play_sound_unknown" => Some(5),
        _ => None,
    }
}

fn video_context_code(name: &str) -> Option<u64> {
    match name {
        "pre_roll" => Some(1),
        "mid_roll" => Some(2),
        "post_roll" => Some(3),
        "outstream" => Some(4),
        "in-banner" => Some(5),
        "in-feed" => Some(6),
        "interstitial" => Some(7),
        "accompanying_content_pre_roll" => Some(8),
        "accompanying_content_mid_roll" => Some(9),
        "accompanying_content_post_roll" => Some(10),
        _ => None,
    }
}

/// UT video context derived from OpenRTB `plcmt`, `placement` and `startdelay`.
fn ortb_video_context(video: &VideoSpec) -> Option<u64> {
    let roll = match video.startdelay {
        Some(0) => Some(0),
        Some(-1) => Some(1),
        Some(-2) => Some(2),
        Some(delay) if delay > 0 => Some(1),
        _ => None,
    };
    if let Some(plcmt) = video.plcmt {
        return match plcmt {
            1 => roll.map(|r| 1 + r),
            2 => Some(8 + roll.unwrap_or(0)),
            3 => Some(7),
            4 => Some(4),
            _ => None,
        };
    }
    if let Some(placement) = video.placement {
        return match placement {
            1 => roll.map(|r| 1 + r),
            2 => Some(5),
            3 => Some(4),
            4 => Some(6),
            5 => Some(7),
            _ => None,
        };
    }
    roll.map(|r| 1 + r)
}

/// OpenRTB `api` values as UT frameworks. MRAID-1 and MRAID-2 swap codes;
/// OMID has no UT equivalent.
fn frameworks_from_api(api: &[u32]) -> Vec<u64> {
    api.iter()
        .filter_map(|value| match value {
            4 => Some(5),
            5 => Some(4),
            1..=3 => Some(u64::from(*value)),
            _ => None,
        })
        .collect()
}

fn insert_video(
    tag: &mut Map<String, Json>,
    params: &AppNexusParams,
    video: &VideoSpec,
    item: &BatchItem<'_>,
    has_renderer: bool,
) {
    let mut out = Map::new();
    let mut param_frameworks = None;

    if let Some(Json::Object(video_params)) = &params.video {
        for (key, value) in video_params {
            if !VIDEO_PARAMS.contains(&key.as_str()) {
                continue;
            }
            match key.as_str() {
                "frameworks" => param_frameworks = int_list(Some(value)),
                "playback_method" => {
                    let first = value
                        .as_array()
                        .and_then(|values| values.first())
                        .unwrap_or(value);
                    if let Some(code) = first.as_str().and_then(playback_method_code) {
                        out.insert(key.clone(), json!(code));
                    }
                }
                "context" => {
                    if let Some(code) = value.as_str().and_then(video_context_code) {
                        out.insert(key.clone(), json!(code));
                    }
                }
                _ => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
    }

    if !out.contains_key("minduration") {
        if let Some(min) = video.minduration {
            out.insert("minduration".to_string(), json!(min));
        }
    }
    if !out.contains_key("maxduration") {
        if let Some(max) = video.maxduration {
            out.insert("maxduration".to_string(), json!(max));
        }
    }
    if !out.contains_key("playback_method") {
        if let Some(method) = video.playbackmethod.first().filter(|m| (1..=6).contains(*m)) {
            out.insert("playback_method".to_string(), json!(method));
        }
    }
    if !out.contains_key("skippable") {
        if let Some(skip) = video.skip {
            out.insert("skippable".to_string(), json!(skip == 1));
        }
    }
    if !out.contains_key("context") {
        if let Some(context) = ortb_video_context(video) {
            out.insert("context".to_string(), json!(context));
        }
    }

    if let Some(placement) = &item.placement {
        if let Some(min) = placement.min_duration {
            out.insert("minduration".to_string(), json!(min));
        }
        out.insert("maxduration".to_string(), json!(placement.max_duration));
    }
    if has_renderer && video.context() == VideoContext::Outstream {
        out.insert("custom_renderer_present".to_string(), json!(true));
    }

    let frameworks = param_frameworks.unwrap_or_else(|| frameworks_from_api(&video.api));
    if !frameworks.is_empty() {
        tag.insert("video_frameworks".to_string(), json!(frameworks));
    }
    if video.context() != VideoContext::Outstream {
        tag.insert("require_asset_url".to_string(), json!(true));
    }
    tag.insert("video".to_string(), Json::Object(out));
}

fn tags_use_omid(payload: &Map<String, Json>) -> bool {
    let Some(tags) = payload.get("tags").and_then(Json::as_array) else {
        return false;
    };
    tags.iter().any(|tag| {
        ["banner_frameworks", "video_frameworks"].iter().any(|key| {
            int_list(tag.get(*key)).is_some_and(|list| list.contains(&OMID_FRAMEWORK))
        })
    })
}

fn build_user(params: Option<&AppNexusParams>, privacy: &PrivacyContext) -> Option<Json> {
    let mut user = Map::new();
    if let Some(Json::Object(source)) = params.and_then(|p| p.user.as_ref()) {
        for (key, value) in source {
            match key.as_str() {
                "externalUid" | "external_uid" => {
                    user.insert("external_uid".to_string(), value.clone());
                }
                "segments" => {
                    let segments: Vec<Json> = value
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(|segment| match segment {
                            Json::Number(id) => Some(json!({ "id": id })),
                            Json::Object(_) => Some(segment.clone()),
                            _ => None,
                        })
                        .collect();
                    user.insert("segments".to_string(), json!(segments));
                }
                "age" | "gender" | "dnt" | "language" => {
                    user.insert(key.clone(), value.clone());
                }
                _ => {}
            }
        }
    }
    if privacy.coppa {
        user.insert("coppa".to_string(), json!(true));
    }
    (!user.is_empty()).then_some(Json::Object(user))
}

fn device_type_label(code: u64) -> Option<&'static str> {
    match code {
        1 => Some("Mobile/Tablet - General"),
        2 => Some("Personal Computer"),
        3 => Some("Connected TV"),
        4 => Some("Phone"),
        5 => Some("Tablet"),
        6 => Some("Connected Device"),
        7 => Some("Set Top Box"),
        _ => None,
    }
}

fn build_device(ctx: &AuctionContext, params: Option<&AppNexusParams>) -> Option<Json> {
    let mut device = Map::new();

    if let Some(Json::Object(ortb)) = ctx.ortb2_path(&["device"]) {
        for (from, to) in [
            ("ua", "useragent"),
            ("make", "make"),
            ("model", "model"),
            ("os", "os"),
            ("osv", "os_version"),
            ("w", "w"),
            ("h", "h"),
        ] {
            if let Some(value) = ortb.get(from) {
                device.insert(to.to_string(), value.clone());
            }
        }
        if let Some(label) = ortb
            .get("devicetype")
            .and_then(Json::as_u64)
            .and_then(device_type_label)
        {
            device.insert("devicetype".to_string(), json!(label));
        }
    }

    if let Some(app) = params.and_then(|p| p.app.as_ref()) {
        if let Some(device_id) = app.get("device_id") {
            device.insert("device_id".to_string(), device_id.clone());
        }
        if let Some(geo) = app.get("geo") {
            device.insert("geo".to_string(), geo.clone());
        }
    }

    (!device.is_empty()).then_some(Json::Object(device))
}

fn insert_privacy(payload: &mut Map<String, Json>, ctx: &EncodeContext<'_>) {
    let privacy = ctx.privacy;
    if privacy.gdpr_applies.is_some() || privacy.consent_string.is_some() {
        let mut gdpr = Map::new();
        if let Some(consent) = &privacy.consent_string {
            gdpr.insert("consent_string".to_string(), json!(consent));
        }
        if let Some(applies) = privacy.gdpr_applies {
            gdpr.insert("consent_required".to_string(), json!(applies));
        }
        let addtl = privacy.addtl_consent_ids();
        if !addtl.is_empty() {
            gdpr.insert("addtl_consent".to_string(), json!(addtl));
        }
        payload.insert("gdpr_consent".to_string(), Json::Object(gdpr));
    }
    if let Some(usp) = &privacy.us_privacy {
        payload.insert("us_privacy".to_string(), json!(usp));
    }
    if let Some(gpp) = &privacy.gpp {
        payload.insert(
            "privacy".to_string(),
            json!({ "gpp": gpp, "gpp_sid": privacy.gpp_sid }),
        );
    }
}

/// `ortb2.regs.ext.dsa`; transparency entries with non-numeric params are
/// dropped.
fn build_dsa(ctx: &AuctionContext) -> Option<Json> {
    let Some(Json::Object(source)) = ctx.ortb2_path(&["regs", "ext", "dsa"]) else {
        return None;
    };
    let mut dsa = Map::new();
    for key in ["dsarequired", "pubrender", "datatopub"] {
        if let Some(value) = source.get(key).filter(|v| v.is_number()) {
            dsa.insert(key.to_string(), value.clone());
        }
    }
    if let Some(entries) = source.get("transparency").and_then(Json::as_array) {
        let valid: Vec<Json> = entries
            .iter()
            .filter(|entry| {
                let domain_ok = entry.get("domain").is_some_and(Json::is_string);
                let params_ok = entry
                    .get("dsaparams")
                    .and_then(Json::as_array)
                    .is_some_and(|params| params.iter().all(Json::is_number));
                domain_ok && params_ok
            })
            .cloned()
            .collect();
        if !valid.is_empty() {
            dsa.insert("transparency".to_string(), json!(valid));
        }
    }
    (!dsa.is_empty()).then_some(Json::Object(dsa))
}

fn referrer_detection(referer: &RefererInfo) -> Option<Json> {
    let top = referer.topmost_location.as_deref();
    if top.is_none() && referer.stack.is_empty() {
        return None;
    }
    let mut detection = Map::new();
    if let Some(top) = top {
        detection.insert(
            "rd_ref".to_string(),
            json!(urlencoding::encode(top).into_owned()),
        );
    }
    detection.insert("rd_top".to_string(), json!(referer.reached_top));
    detection.insert("rd_ifs".to_string(), json!(referer.num_iframes));
    detection.insert(
        "rd_stk".to_string(),
        json!(referer
            .stack
            .iter()
            .map(|url| urlencoding::encode(url).into_owned())
            .collect::<Vec<_>>()
            .join(",")),
    );
    if let Some(canonical) = &referer.canonical_url {
        detection.insert("rd_can".to_string(), json!(canonical));
    }
    Some(Json::Object(detection))
}

// ============================================================================
// Response decoding
// ============================================================================

static CUSTOM_NATIVE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(title|body|image|icon|socialicon|socialurl|displayurl|ctatext)(\d+)$")
        .expect("custom native field regex should compile")
});

/// `title1` -> `customTitle1`, `ctatext2` -> `customCta2`, and so on. Other
/// fields keep their name.
fn custom_native_key(field: &str) -> String {
    let Some(captures) = CUSTOM_NATIVE_FIELD.captures(field) else {
        return field.to_string();
    };
    let prefix = match &captures[1] {
        "title" => "customTitle",
        "body" => "customBody",
        "image" => "customImage",
        "icon" => "customIcon",
        "socialicon" => "customSocialIcon",
        "socialurl" => "customSocialUrl",
        "displayurl" => "customDisplayUrl",
        _ => "customCta",
    };
    format!("{prefix}{}", &captures[2])
}

fn tracking_pixel(url: &str) -> String {
    format!(
        "<div style=\"position:absolute;left:0px;top:0px;visibility:hidden;\"><img src=\"{url}\"></div>"
    )
}

fn json_string(value: Option<&Json>) -> Option<String> {
    match value? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_u32(value: Option<&Json>) -> Option<u32> {
    value
        .and_then(Json::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn decode_meta(ad: &Json) -> BidMeta {
    let buyer_member_id = json_string(ad.get("buyer_member_id"));
    let advertiser_domains = match ad.get("adomain") {
        Some(Json::String(domain)) => vec![domain.clone()],
        Some(Json::Array(domains)) => domains
            .iter()
            .filter_map(Json::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    BidMeta {
        advertiser_domains,
        advertiser_id: json_string(ad.get("advertiser_id")),
        brand_id: json_string(ad.get("brand_id")),
        deal_priority: json_u32(ad.get("deal_priority")),
        deal_code: json_string(ad.get("deal_code")),
        dchain: buyer_member_id.as_ref().map(|bsid| {
            json!({ "ver": "1.0", "complete": 0, "nodes": [{ "bsid": bsid }] })
        }),
        buyer_member_id,
        dsa: ad.get("dsa").cloned(),
        media_type: None,
    }
}

fn decode_ad(
    tag: &Json,
    ad: &Json,
    payload: &WirePayload,
) -> Result<DecodedAd, Report<TransformError>> {
    let uuid = json_string(tag.get("uuid"));
    let Some(cpm) = ad.get("cpm").and_then(Json::as_f64) else {
        return Err(Report::new(TransformError::InvalidResponse {
            message: format!("AppNexus ad for tag {uuid:?} has no cpm"),
        }));
    };
    let rtb = ad.get("rtb").unwrap_or(&Json::Null);
    let notify_url = json_string(ad.get("notify_url"));

    let banner = rtb.get("banner").map(|banner| {
        let mut markup = json_string(banner.get("content")).unwrap_or_default();
        let impression_urls = rtb
            .get("trackers")
            .and_then(|trackers| trackers.get(0))
            .and_then(|tracker| tracker.get("impression_urls"))
            .and_then(Json::as_array);
        for url in impression_urls.into_iter().flatten().filter_map(Json::as_str) {
            markup.push_str(&tracking_pixel(url));
        }
        markup
    });

    let context = uuid
        .as_deref()
        .and_then(|id| payload.descriptor(id))
        .and_then(|descriptor| descriptor.media.video_context());
    let video = rtb.get("video").map(|video| {
        let asset_url = json_string(video.get("asset_url"));
        let mut decoded = DecodedVideo {
            duration_ms: video.get("duration_ms").and_then(Json::as_u64),
            ..DecodedVideo::default()
        };
        match context {
            Some(VideoContext::Outstream) => {
                decoded.vast_xml = json_string(video.get("content"));
                decoded.vast_imp_url = notify_url.clone();
            }
            Some(VideoContext::Adpod) => decoded.vast_url = asset_url,
            _ => {
                decoded.vast_url = match (&notify_url, asset_url) {
                    (Some(notify), Some(asset)) => {
                        Some(format!("{notify}&redir={}", urlencoding::encode(&asset)))
                    }
                    (None, asset) => asset,
                    (Some(_), None) => None,
                };
                decoded.vast_imp_url = notify_url.clone();
            }
        }
        decoded
    });

    let native = rtb
        .get("native")
        .map(|native| DecodedNative::new(NativeSource::Named(native.clone())));

    let (width, height) = match (rtb.get("banner"), rtb.get("video")) {
        (Some(banner), _) => (json_u32(banner.get("width")), json_u32(banner.get("height"))),
        (None, Some(video)) => (
            json_u32(video.get("player_width")),
            json_u32(video.get("player_height")),
        ),
        _ => (None, None),
    };

    Ok(DecodedAd {
        correlation_id: uuid,
        cpm,
        width,
        height,
        ad_type: ad
            .get("ad_type")
            .and_then(|t| serde_json::from_value::<MediaType>(t.clone()).ok()),
        banner,
        video,
        native,
        currency: Some("USD".to_string()),
        ttl: None,
        creative_id: json_string(ad.get("creative_id")),
        deal_id: json_string(ad.get("deal_id")),
        net_revenue: None,
        renderer_url: json_string(ad.get("renderer_url")),
        burl: None,
        nurl: None,
        meta: decode_meta(ad),
        extensions: Map::new(),
    })
}

// ============================================================================
// Registration
// ============================================================================

/// Register the AppNexus adapter when `[bidders.appnexus]` is present and
/// enabled.
#[must_use]
pub fn register_providers(settings: &Settings) -> Vec<Arc<dyn BidderAdapter>> {
    let mut adapters: Vec<Arc<dyn BidderAdapter>> = Vec::new();

    match settings.bidder_config::<AppNexusConfig>(BIDDER_CODE) {
        Ok(Some(config)) => {
            log::info!(
                "Registering AppNexus adapter (test_mode: {})",
                config.test_mode
            );
            adapters.push(Arc::new(AppNexusAdapter::new(config)));
        }
        Ok(None) => {
            log::debug!("AppNexus adapter config absent or disabled");
        }
        Err(e) => {
            log::error!("Failed to load AppNexus configuration: {:?}", e);
        }
    }

    adapters
}

// ============================================================================
// Tests
// ============================================================================
