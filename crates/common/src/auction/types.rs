//! Core types for ad-unit requests, wire payloads and normalized bids.
//!
//! Input types deserialize from the host's camelCase JSON. Output types are
//! newly allocated per call and owned by the caller.

use std::collections::BTreeMap;
use std::fmt;

use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::adpod::PodPlacement;
use crate::auction::context::{DeviceContext, PrivacyContext, SiteContext};
use crate::integrations::appnexus::AppNexusParams;
use crate::integrations::mediasquare::MediasquareParams;
use crate::integrations::theadx::TheAdxParams;
use crate::integrations::viant::ViantParams;
use crate::native::NativeAd;
use crate::native::catalog::AssetKind;
use crate::sizes::Size;

// ============================================================================
// Media types
// ============================================================================

/// Media type enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Banner,
    Video,
    Native,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Banner => "banner",
            Self::Video => "video",
            Self::Native => "native",
        })
    }
}

/// Video placement context as declared by the publisher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoContext {
    #[default]
    Instream,
    Outstream,
    Adpod,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for VideoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Instream => "instream",
            Self::Outstream => "outstream",
            Self::Adpod => "adpod",
            Self::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BannerSpec {
    /// `[w, h]` or `[[w, h], ...]`; normalized by [`crate::sizes`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoSpec {
    #[serde(default)]
    pub context: Option<VideoContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_size: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_pod_duration_sec: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duration_range_sec: Vec<u32>,
    #[serde(default)]
    pub require_exact_duration: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mimes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minduration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxduration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub playbackmethod: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plcmt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startdelay: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<u32>,
}

impl VideoSpec {
    #[must_use]
    pub fn context(&self) -> VideoContext {
        self.context.unwrap_or_default()
    }

    #[must_use]
    pub fn is_adpod(&self) -> bool {
        self.context == Some(VideoContext::Adpod)
    }
}

/// A single requested native asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NativeAssetRequest {
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<u32>,
}

/// Native asset requirements keyed by the host's asset name (`title`,
/// `sponsoredBy`, `image`, ...).
pub type NativeSpec = BTreeMap<String, NativeAssetRequest>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaTypes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<BannerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeSpec>,
}

impl MediaTypes {
    /// Declared media types in `banner, video, native` order.
    #[must_use]
    pub fn declared(&self) -> Vec<MediaType> {
        let mut declared = Vec::with_capacity(3);
        if self.banner.is_some() {
            declared.push(MediaType::Banner);
        }
        if self.video.is_some() {
            declared.push(MediaType::Video);
        }
        if self.native.is_some() {
            declared.push(MediaType::Native);
        }
        declared
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.banner.is_none() && self.video.is_none() && self.native.is_none()
    }

    #[must_use]
    pub fn adpod(&self) -> Option<&VideoSpec> {
        self.video.as_ref().filter(|video| video.is_adpod())
    }
}

// ============================================================================
// Bidder params
// ============================================================================

/// Exchange-specific bidder parameters, keyed by bidder code.
///
/// Deserializes from the host's `{ "bidder": ..., "params": {...} }` pair.
/// Parameters that fail their exchange's schema become [`BidderParams::Malformed`]
/// so the request can be dropped with a diagnostic instead of failing the
/// whole ad-unit list.
#[derive(Debug, Clone, PartialEq)]
pub enum BidderParams {
    AppNexus(AppNexusParams),
    Mediasquare(MediasquareParams),
    TheAdx(TheAdxParams),
    Viant(ViantParams),
    Malformed { bidder: String, reason: String },
    Unknown { bidder: String, params: Json },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawBidderParams {
    bidder: String,
    #[serde(default)]
    params: Json,
}

impl BidderParams {
    /// Bidder code as supplied by the host.
    #[must_use]
    pub fn bidder(&self) -> &str {
        match self {
            Self::AppNexus(_) => crate::integrations::appnexus::BIDDER_CODE,
            Self::Mediasquare(_) => crate::integrations::mediasquare::BIDDER_CODE,
            Self::TheAdx(_) => crate::integrations::theadx::BIDDER_CODE,
            Self::Viant(_) => crate::integrations::viant::BIDDER_CODE,
            Self::Malformed { bidder, .. } | Self::Unknown { bidder, .. } => bidder,
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(
        bidder: &str,
        params: Json,
        wrap: fn(T) -> Self,
    ) -> Self {
        let params = if params.is_null() {
            Json::Object(serde_json::Map::new())
        } else {
            params
        };
        match serde_json::from_value::<T>(params) {
            Ok(parsed) => wrap(parsed),
            Err(err) => Self::Malformed {
                bidder: bidder.to_string(),
                reason: err.to_string(),
            },
        }
    }
}

impl From<RawBidderParams> for BidderParams {
    fn from(raw: RawBidderParams) -> Self {
        use crate::integrations::{appnexus, mediasquare, theadx, viant};

        let code = raw.bidder.as_str();
        if appnexus::matches_code(code) {
            Self::parse(code, raw.params, Self::AppNexus)
        } else if mediasquare::matches_code(code) {
            Self::parse(code, raw.params, Self::Mediasquare)
        } else if theadx::matches_code(code) {
            Self::parse(code, raw.params, Self::TheAdx)
        } else if viant::matches_code(code) {
            Self::parse(code, raw.params, Self::Viant)
        } else {
            Self::Unknown {
                bidder: raw.bidder,
                params: raw.params,
            }
        }
    }
}

impl<'de> Deserialize<'de> for BidderParams {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawBidderParams::deserialize(deserializer).map(Self::from)
    }
}

impl Serialize for BidderParams {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let params = match self {
            Self::AppNexus(p) => serde_json::to_value(p),
            Self::Mediasquare(p) => serde_json::to_value(p),
            Self::TheAdx(p) => serde_json::to_value(p),
            Self::Viant(p) => serde_json::to_value(p),
            Self::Malformed { .. } => Ok(Json::Null),
            Self::Unknown { params, .. } => Ok(params.clone()),
        }
        .map_err(serde::ser::Error::custom)?;

        RawBidderParams {
            bidder: self.bidder().to_string(),
            params,
        }
        .serialize(serializer)
    }
}

// ============================================================================
// Ad unit request
// ============================================================================

/// Outstream renderer declared on the ad unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RendererSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Json>,
}

/// Floor resolved by the host's floor module for this request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Floor {
    pub floor: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// One publisher placement requesting bids from one bidder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdUnitRequest {
    pub ad_unit_code: String,
    pub bid_id: String,
    #[serde(default)]
    pub media_types: MediaTypes,
    /// Legacy flat size list, consulted only when `media_types` has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Json>,
    #[serde(flatten)]
    pub params: BidderParams,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deal_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ortb2_imp: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<Floor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl AdUnitRequest {
    /// Look up a dotted path inside `ortb2Imp`.
    #[must_use]
    pub fn ortb2_imp_path(&self, path: &[&str]) -> Option<&Json> {
        let mut current = self.ortb2_imp.as_ref()?;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// `ortb2Imp.ext.gpid`, falling back to `ortb2Imp.ext.data.pbadslot`.
    #[must_use]
    pub fn gpid(&self) -> Option<&str> {
        self.ortb2_imp_path(&["ext", "gpid"])
            .or_else(|| self.ortb2_imp_path(&["ext", "data", "pbadslot"]))
            .and_then(Json::as_str)
    }
}

// ============================================================================
// Wire payloads
// ============================================================================

/// Deal information carried on an impression.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DealInfo {
    pub deal_ids: Vec<String>,
    pub private_auction: bool,
}

/// The media block of a single wire impression.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaTypeBlock {
    Banner {
        sizes: Vec<Size>,
    },
    Video {
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<Size>,
        context: VideoContext,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_duration: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_duration: Option<u32>,
    },
    Native {
        assets: Vec<AssetKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<Size>,
    },
    /// Several media types on one tag; the exchange picks.
    Multi {
        types: Vec<MediaType>,
        sizes: Vec<Size>,
    },
}

impl MediaTypeBlock {
    /// The single media type this block declares, if unambiguous.
    #[must_use]
    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            Self::Banner { .. } => Some(MediaType::Banner),
            Self::Video { .. } => Some(MediaType::Video),
            Self::Native { .. } => Some(MediaType::Native),
            Self::Multi { types, .. } if types.len() == 1 => types.first().copied(),
            Self::Multi { .. } => None,
        }
    }

    #[must_use]
    pub fn video_context(&self) -> Option<VideoContext> {
        match self {
            Self::Video { context, .. } => Some(*context),
            _ => None,
        }
    }

    /// First size the block carries.
    #[must_use]
    pub fn primary_size(&self) -> Option<Size> {
        match self {
            Self::Banner { sizes } | Self::Multi { sizes, .. } => sizes.first().copied(),
            Self::Video { size, .. } | Self::Native { size, .. } => *size,
        }
    }
}

/// One impression on the wire. Every descriptor traces back to exactly one
/// `bid_id`; adpod requests yield many descriptors for the same bid.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImpressionDescriptor {
    /// Correlation value the exchange echoes back (tag uuid or imp id).
    pub id: String,
    pub bid_id: String,
    pub ad_unit_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
    pub media: MediaTypeBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal: Option<DealInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<PodPlacement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererSpec>,
}

/// One outbound request unit, ready for the host's transport.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WirePayload {
    pub bidder: String,
    #[serde(with = "method_serde")]
    pub method: Method,
    pub url: String,
    pub body: Json,
    pub impressions: Vec<ImpressionDescriptor>,
    pub site: SiteContext,
    pub device: DeviceContext,
    pub privacy: PrivacyContext,
    pub with_credentials: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl WirePayload {
    /// Descriptor whose correlation id matches `id`.
    #[must_use]
    pub fn descriptor(&self, id: &str) -> Option<&ImpressionDescriptor> {
        self.impressions.iter().find(|imp| imp.id == id)
    }

    /// The only descriptor, when the payload carries exactly one impression.
    #[must_use]
    pub fn sole_descriptor(&self) -> Option<&ImpressionDescriptor> {
        match self.impressions.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

mod method_serde {
    use http::Method;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(method.as_str())
    }
}

/// Response handed back by the host's transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub body: Json,
}

fn default_status() -> u16 {
    200
}

impl ExchangeResponse {
    #[must_use]
    pub fn ok(body: Json) -> Self {
        Self { status: 200, body }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// Normalized bids
// ============================================================================

/// Renderer configuration for outstream video. The host executes it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RendererConfig {
    pub url: String,
    pub ad_unit_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Json>,
}

/// Creative carried by a bid.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Creative {
    Banner {
        ad: String,
    },
    #[serde(rename_all = "camelCase")]
    Video {
        #[serde(skip_serializing_if = "Option::is_none")]
        vast_xml: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        vast_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        vast_imp_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        video_cache_key: Option<String>,
    },
    Native {
        native: Box<NativeAd>,
    },
}

/// Video details attached to video bids.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub context: VideoContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_tier: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidMeta {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub advertiser_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertiser_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_member_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsa: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dchain: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
}

/// Exchange-agnostic bid record returned to the host.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBid {
    pub request_id: String,
    pub ad_unit_code: String,
    pub bidder: String,
    pub cpm: f64,
    pub currency: String,
    pub width: u32,
    pub height: u32,
    #[serde(flatten)]
    pub creative: Creative,
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creative_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    pub net_revenue: bool,
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererConfig>,
    /// Billing notice URL, fired by the host when the bid is billed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burl: Option<String>,
    /// Win notice URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nurl: Option<String>,
    pub meta: BidMeta,
    /// Exchange-specific top-level fields, e.g. `mediasquare`.
    #[serde(flatten)]
    pub extensions: Map<String, Json>,
}

impl NormalizedBid {
    #[must_use]
    pub fn ad(&self) -> Option<&str> {
        match &self.creative {
            Creative::Banner { ad } => Some(ad),
            _ => None,
        }
    }

    #[must_use]
    pub fn native(&self) -> Option<&NativeAd> {
        match &self.creative {
            Creative::Native { native } => Some(native),
            _ => None,
        }
    }

    #[must_use]
    pub fn vast_xml(&self) -> Option<&str> {
        match &self.creative {
            Creative::Video { vast_xml, .. } => vast_xml.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn vast_url(&self) -> Option<&str> {
        match &self.creative {
            Creative::Video { vast_url, .. } => vast_url.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// User syncs
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    #[serde(default)]
    pub iframe_enabled: bool,
    #[serde(default)]
    pub pixel_enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Iframe,
    Image,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserSync {
    #[serde(rename = "type")]
    pub sync_type: SyncType,
    pub url: String,
}

impl UserSync {
    #[must_use]
    pub fn iframe(url: impl Into<String>) -> Self {
        Self {
            sync_type: SyncType::Iframe,
            url: url.into(),
        }
    }

    #[must_use]
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            sync_type: SyncType::Image,
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::ad_unit;
    use serde_json::json;

    #[test]
    fn test_ad_unit_request_deserializes_known_bidder() {
        let request = ad_unit(json!({
            "adUnitCode": "div-1",
            "bidId": "bid-1",
            "bidder": "appnexus",
            "params": { "placementId": 10433394 },
            "mediaTypes": { "banner": { "sizes": [[300, 250]] } },
            "ortb2Imp": { "ext": { "gpid": "/123/div-1" } }
        }));

        assert_eq!(request.params.bidder(), "appnexus");
        assert!(matches!(request.params, BidderParams::AppNexus(_)));
        assert_eq!(request.media_types.declared(), vec![MediaType::Banner]);
        assert_eq!(request.gpid(), Some("/123/div-1"));
    }

    #[test]
    fn test_malformed_params_do_not_fail_deserialization() {
        let request = ad_unit(json!({
            "adUnitCode": "div-1",
            "bidId": "bid-1",
            "bidder": "viant",
            "params": { "publisherId": ["not", "a", "string"] }
        }));

        match &request.params {
            BidderParams::Malformed { bidder, reason } => {
                assert_eq!(bidder, "viant");
                assert!(!reason.is_empty());
            }
            other => panic!("expected malformed params, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_bidder_is_preserved() {
        let request = ad_unit(json!({
            "adUnitCode": "div-1",
            "bidId": "bid-1",
            "bidder": "someexchange",
            "params": { "zone": 4 }
        }));

        match &request.params {
            BidderParams::Unknown { bidder, params } => {
                assert_eq!(bidder, "someexchange");
                assert_eq!(params["zone"], 4);
            }
            other => panic!("expected unknown params, got {other:?}"),
        }
    }

    #[test]
    fn test_video_context_unknown_value() {
        let spec: VideoSpec =
            serde_json::from_value(json!({ "context": "in-feed" })).expect("should parse");
        assert_eq!(spec.context(), VideoContext::Unknown);
        assert!(!spec.is_adpod());
    }

    #[test]
    fn test_creative_flattens_into_bid() {
        let bid = NormalizedBid {
            request_id: "bid-1".to_string(),
            ad_unit_code: "div-1".to_string(),
            bidder: "appnexus".to_string(),
            cpm: 0.5,
            currency: "USD".to_string(),
            width: 300,
            height: 250,
            creative: Creative::Video {
                vast_xml: None,
                vast_url: Some("https://vast.example/1".to_string()),
                vast_imp_url: None,
                video_cache_key: None,
            },
            ttl: 300,
            creative_id: Some("29681110".to_string()),
            deal_id: None,
            net_revenue: true,
            media_type: MediaType::Video,
            video: None,
            renderer: None,
            burl: None,
            nurl: None,
            meta: BidMeta::default(),
            extensions: Map::new(),
        };

        let value = serde_json::to_value(&bid).expect("should serialize");
        assert_eq!(value["vastUrl"], "https://vast.example/1");
        assert_eq!(value["requestId"], "bid-1");
        assert_eq!(value["mediaType"], "video");
        assert!(value.get("vastXml").is_none());
    }
}
