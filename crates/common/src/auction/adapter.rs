//! Trait definition for exchange adapters.

use std::collections::BTreeMap;

use error_stack::Report;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use validator::Validate;

use crate::adpod::{PodPlacement, DEFAULT_MAX_IMPRESSIONS_PER_REQUEST};
use crate::auction::builder::RequestBuilder;
use crate::auction::context::{AuctionContext, DeviceContext, PrivacyContext, SiteContext};
use crate::auction::identity::IdentitySchema;
use crate::auction::interpreter::ResponseInterpreter;
use crate::auction::types::{
    AdUnitRequest, BidMeta, ExchangeResponse, ImpressionDescriptor, MediaType, MediaTypes,
    NormalizedBid, SyncOptions, UserSync, VideoContext, WirePayload,
};
use crate::diagnostics::DiagnosticSink;
use crate::error::TransformError;
use crate::keywords::KeywordSet;
use crate::native::catalog::AssetCatalog;
use crate::native::DecodedNative;

// ============================================================================
// Policy
// ============================================================================

/// Caller-controlled pricing and batching policy for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidPolicy {
    /// TTL applied when the response carries none.
    pub ttl_seconds: u32,
    /// Keep bids with `cpm == 0`.
    pub allow_zero_cpm: bool,
    /// Currency applied when the response carries none.
    pub currency: String,
    pub net_revenue: bool,
    pub max_impressions_per_request: usize,
}

impl BidPolicy {
    #[must_use]
    pub fn with_ttl(ttl_seconds: u32) -> Self {
        Self {
            ttl_seconds,
            allow_zero_cpm: false,
            currency: "USD".to_string(),
            net_revenue: true,
            max_impressions_per_request: DEFAULT_MAX_IMPRESSIONS_PER_REQUEST,
        }
    }
}

/// Optional per-bidder overrides read from `[bidders.<code>]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PolicyOverrides {
    #[serde(default)]
    #[validate(range(min = 1))]
    pub ttl_seconds: Option<u32>,
    #[serde(default)]
    pub allow_zero_cpm: Option<bool>,
    #[serde(default)]
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[serde(default)]
    pub net_revenue: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 1, max = 100))]
    pub max_impressions_per_request: Option<usize>,
}

impl PolicyOverrides {
    #[must_use]
    pub fn apply(&self, defaults: BidPolicy) -> BidPolicy {
        BidPolicy {
            ttl_seconds: self.ttl_seconds.unwrap_or(defaults.ttl_seconds),
            allow_zero_cpm: self.allow_zero_cpm.unwrap_or(defaults.allow_zero_cpm),
            currency: self.currency.clone().unwrap_or(defaults.currency),
            net_revenue: self.net_revenue.unwrap_or(defaults.net_revenue),
            max_impressions_per_request: self
                .max_impressions_per_request
                .unwrap_or(defaults.max_impressions_per_request),
        }
    }
}

/// How validated requests are grouped into wire payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionPolicy {
    /// Banner requests share a payload; each video and each native request
    /// gets its own. A multi-format request joins every group it qualifies
    /// for with only that media type.
    GroupBanner,
    /// One payload per request.
    PerRequest,
    /// Every non-pod request in one payload, chunked by the batch limit.
    Combined,
}

// ============================================================================
// Encoding
// ============================================================================

/// One impression of a batch handed to [`BidderAdapter::encode`].
#[derive(Debug, Clone)]
pub struct BatchItem<'a> {
    pub request: &'a AdUnitRequest,
    /// Media types for this impression. May be a single-type slice of the
    /// request's declaration.
    pub media: MediaTypes,
    pub placement: Option<PodPlacement>,
    pub descriptor: ImpressionDescriptor,
}

/// Requests that end up in one wire payload.
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    pub items: Vec<BatchItem<'a>>,
    /// Set when every item belongs to one ad pod.
    pub is_pod: bool,
}

/// Everything computed once per `build` call.
pub struct EncodeContext<'a> {
    pub auction: &'a AuctionContext,
    pub site: &'a SiteContext,
    pub device: &'a DeviceContext,
    pub privacy: &'a PrivacyContext,
    /// Auction-level keywords: host keywords, then first-party data, then
    /// taxonomy segments.
    pub keywords: &'a KeywordSet,
    /// Identity envelope re-encoded with the adapter's schema.
    pub identity: Option<&'a Json>,
    pub policy: &'a BidPolicy,
    pub sink: &'a dyn DiagnosticSink,
}

/// Wire request produced by an adapter, before contexts are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRequest {
    pub method: Method,
    pub url: String,
    pub body: Json,
    pub with_credentials: bool,
    pub headers: BTreeMap<String, String>,
}

impl EncodedRequest {
    #[must_use]
    pub fn post(url: impl Into<String>, body: Json) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body,
            with_credentials: false,
            headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self) -> Self {
        self.with_credentials = true;
        self
    }
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedVideo {
    pub vast_xml: Option<String>,
    pub vast_url: Option<String>,
    pub vast_imp_url: Option<String>,
    pub cache_key: Option<String>,
    pub duration_ms: Option<u64>,
}

/// One ad entry decoded from an exchange response, before correlation and
/// policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedAd {
    /// Correlation value echoed by the exchange. `None` means the payload's
    /// sole impression.
    pub correlation_id: Option<String>,
    pub cpm: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Media type the exchange says it returned, if any.
    pub ad_type: Option<MediaType>,
    pub banner: Option<String>,
    pub video: Option<DecodedVideo>,
    pub native: Option<DecodedNative>,
    pub currency: Option<String>,
    pub ttl: Option<u32>,
    pub creative_id: Option<String>,
    pub deal_id: Option<String>,
    pub net_revenue: Option<bool>,
    pub renderer_url: Option<String>,
    pub burl: Option<String>,
    pub nurl: Option<String>,
    pub meta: BidMeta,
    /// Exchange-specific fields copied onto the top level of the bid.
    pub extensions: Map<String, Json>,
}

/// Result of decoding one response body. The outer error rejects the whole
/// body; inner errors reject single ad entries.
pub type DecodeResult = Result<Vec<Result<DecodedAd, Report<TransformError>>>, Report<TransformError>>;

// ============================================================================
// Trait
// ============================================================================

/// Trait implemented by every exchange adapter (AppNexus, Mediasquare, TheAdx,
/// Viant).
///
/// Adapters only describe their wire format. Partitioning, ad pod expansion,
/// correlation and pricing policy live in [`crate::auction::builder`] and
/// [`crate::auction::interpreter`].
pub trait BidderAdapter: Send + Sync {
    /// Bidder code, e.g. `"appnexus"`.
    fn code(&self) -> &'static str;

    /// Alternative codes the host may use for this adapter.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn supported_media_types(&self) -> &'static [MediaType] {
        &[MediaType::Banner, MediaType::Video, MediaType::Native]
    }

    fn partition_policy(&self) -> PartitionPolicy;

    fn policy(&self) -> &BidPolicy;

    /// Catalog used for native requests and responses.
    fn native_catalog(&self) -> &'static AssetCatalog {
        AssetCatalog::openrtb()
    }

    /// Name under which an unrecognized native field is kept in `native.ext`.
    fn native_ext_key(&self, field: &str) -> String {
        field.to_string()
    }

    /// How the identity envelope is re-encoded for this exchange.
    fn identity_schema(&self) -> IdentitySchema {
        IdentitySchema::None
    }

    /// Check exchange-specific required parameters.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::InvalidBidRequest`] describing the first
    /// missing parameter.
    fn validate_bid_request(&self, request: &AdUnitRequest) -> Result<(), Report<TransformError>>;

    fn is_bid_request_valid(&self, request: &AdUnitRequest) -> bool {
        self.validate_bid_request(request).is_ok()
    }

    /// Exchange-side placement identifier recorded on the descriptor.
    fn tag_id(&self, _request: &AdUnitRequest) -> Option<String> {
        None
    }

    /// Deal ids the impression is eligible for.
    fn deal_ids(&self, request: &AdUnitRequest) -> Vec<String> {
        request.deal_ids.clone()
    }

    /// Produce the wire request for one batch.
    ///
    /// # Errors
    ///
    /// Returns an error when the batch cannot be serialized; the builder
    /// drops that batch with a diagnostic.
    fn encode(
        &self,
        batch: &Batch<'_>,
        ctx: &EncodeContext<'_>,
    ) -> Result<EncodedRequest, Report<TransformError>>;

    /// Split a response body into ad entries.
    fn decode(&self, body: &Json, payload: &WirePayload) -> DecodeResult;

    /// Sync pixels to drop after the auction.
    fn user_syncs(
        &self,
        _options: &SyncOptions,
        _responses: &[ExchangeResponse],
        _privacy: &PrivacyContext,
    ) -> Vec<UserSync> {
        Vec::new()
    }

    /// Whether a video bid in `context` gets a renderer when the response
    /// names one.
    fn renders_video(&self, context: VideoContext) -> bool {
        context == VideoContext::Outstream
    }

    /// Pixels to fire when one of this adapter's bids wins.
    fn win_notifications(&self, _bid: &NormalizedBid) -> Vec<String> {
        Vec::new()
    }

    fn supports_media_type(&self, media_type: MediaType) -> bool {
        self.supported_media_types().contains(&media_type)
    }

    /// True when `code` names this adapter.
    fn matches(&self, code: &str) -> bool {
        self.code().eq_ignore_ascii_case(code)
            || self.aliases().iter().any(|alias| alias.eq_ignore_ascii_case(code))
    }
}

impl dyn BidderAdapter {
    /// Host `buildRequests` hook over [`RequestBuilder::build`].
    pub fn build_requests(
        &self,
        builder: &RequestBuilder,
        requests: &[AdUnitRequest],
        ctx: &AuctionContext,
        sink: &dyn DiagnosticSink,
    ) -> Vec<WirePayload> {
        builder.build(self, requests, ctx, sink)
    }

    /// Host `interpretResponse` hook over [`ResponseInterpreter::interpret`].
    pub fn interpret_response(
        &self,
        response: &ExchangeResponse,
        payload: &WirePayload,
        sink: &dyn DiagnosticSink,
    ) -> Vec<NormalizedBid> {
        ResponseInterpreter::new().interpret(self, response, payload, sink)
    }
}
