//! Turns validated ad-unit requests into wire payloads.
//!
//! The builder owns everything that is the same across exchanges:
//! validation, partitioning, ad pod expansion, batch chunking, impression
//! descriptors, keyword aggregation and the site / device / privacy blocks.
//! Adapters only render a [`Batch`] into their wire body.

use crate::adpod::{self, PodSpec};
use crate::auction::adapter::{
    Batch, BatchItem, BidderAdapter, EncodeContext, PartitionPolicy,
};
use crate::auction::context::{AuctionContext, DeviceContext, PrivacyContext, SiteContext};
use crate::auction::identity;
use crate::auction::types::{
    AdUnitRequest, BannerSpec, BidderParams, DealInfo, ImpressionDescriptor, MediaType,
    MediaTypeBlock, MediaTypes, WirePayload,
};
use crate::diagnostics::{Component, Diagnostic, DiagnosticSink};
use crate::keywords::{self, KeywordSet, TaxonomyMap};
use crate::native::catalog::{AssetCatalog, AssetKind};
use crate::settings::Settings;
use crate::sizes;

/// Builds wire payloads for one adapter at a time. Holds no per-call state,
/// so one builder can serve concurrent auctions.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    taxonomies: TaxonomyMap,
}

impl RequestBuilder {
    #[must_use]
    pub fn new(taxonomies: TaxonomyMap) -> Self {
        Self { taxonomies }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.keywords.taxonomy_map())
    }

    /// Auction-level keywords: host keywords, first-party keyword strings,
    /// then taxonomy segments.
    #[must_use]
    pub fn auction_keywords(&self, ctx: &AuctionContext, sink: &dyn DiagnosticSink) -> KeywordSet {
        let host = ctx
            .auction_keywords
            .as_ref()
            .map(|value| KeywordSet::from_json_map(value, sink))
            .unwrap_or_default();
        KeywordSet::merge([
            host,
            keywords::from_ortb2(&ctx.ortb2),
            keywords::segment_sources(&ctx.ortb2, &self.taxonomies),
        ])
    }

    /// Build every payload for `requests`.
    ///
    /// Invalid requests, malformed pods and batches the adapter fails to
    /// encode are reported to `sink` and left out. The output depends only on
    /// the inputs.
    pub fn build(
        &self,
        adapter: &dyn BidderAdapter,
        requests: &[AdUnitRequest],
        ctx: &AuctionContext,
        sink: &dyn DiagnosticSink,
    ) -> Vec<WirePayload> {
        let valid: Vec<&AdUnitRequest> = requests
            .iter()
            .filter(|request| accept(adapter, request, sink))
            .collect();

        if valid.is_empty() {
            log::debug!("{}: no valid bid requests to build", adapter.code());
            return Vec::new();
        }

        let site = SiteContext::from_auction(ctx);
        let device = DeviceContext::from_auction(ctx);
        let privacy = PrivacyContext::from_auction(ctx);
        let keywords = self.auction_keywords(ctx, sink);
        let identity = identity::encode(&adapter.identity_schema(), &ctx.user_ids);
        let policy = adapter.policy();

        let encode_ctx = EncodeContext {
            auction: ctx,
            site: &site,
            device: &device,
            privacy: &privacy,
            keywords: &keywords,
            identity: identity.as_ref(),
            policy,
            sink,
        };

        let batches = partition(adapter, &valid, policy.max_impressions_per_request, sink);
        let mut payloads = Vec::with_capacity(batches.len());

        for batch in batches {
            match adapter.encode(&batch, &encode_ctx) {
                Ok(encoded) => payloads.push(WirePayload {
                    bidder: adapter.code().to_string(),
                    method: encoded.method,
                    url: encoded.url,
                    body: encoded.body,
                    impressions: batch.items.into_iter().map(|item| item.descriptor).collect(),
                    site: site.clone(),
                    device: device.clone(),
                    privacy: privacy.clone(),
                    with_credentials: encoded.with_credentials,
                    headers: encoded.headers,
                }),
                Err(report) => {
                    let subject = batch
                        .items
                        .first()
                        .map_or_else(String::new, |item| item.request.bid_id.clone());
                    sink.report(Diagnostic::warn(
                        Component::RequestBuilder,
                        subject,
                        format!("batch dropped: {}", report.current_context()),
                    ));
                }
            }
        }

        log::debug!(
            "{}: built {} payload(s) from {} request(s)",
            adapter.code(),
            payloads.len(),
            requests.len()
        );
        payloads
    }
}

fn accept(adapter: &dyn BidderAdapter, request: &AdUnitRequest, sink: &dyn DiagnosticSink) -> bool {
    if let BidderParams::Malformed { reason, .. } = &request.params {
        sink.report(Diagnostic::warn(
            Component::Validation,
            request.bid_id.as_str(),
            format!("malformed params: {reason}"),
        ));
        return false;
    }
    if !adapter.matches(request.params.bidder()) {
        sink.report(Diagnostic::warn(
            Component::Validation,
            request.bid_id.as_str(),
            format!(
                "request for bidder '{}' handed to {}",
                request.params.bidder(),
                adapter.code()
            ),
        ));
        return false;
    }
    if let Err(report) = adapter.validate_bid_request(request) {
        sink.report(Diagnostic::warn(
            Component::Validation,
            request.bid_id.as_str(),
            report.current_context().to_string(),
        ));
        return false;
    }
    true
}

/// Declared media types the adapter supports. A request with no typed media
/// but a legacy size list is a banner request.
fn effective_media(adapter: &dyn BidderAdapter, request: &AdUnitRequest) -> MediaTypes {
    let mut media = request.media_types.clone();
    if media.is_empty() {
        if let Some(legacy) = &request.sizes {
            media.banner = Some(BannerSpec {
                sizes: Some(legacy.clone()),
                pos: None,
            });
        }
    }
    if !adapter.supports_media_type(MediaType::Banner) {
        media.banner = None;
    }
    if !adapter.supports_media_type(MediaType::Video) {
        media.video = None;
    }
    if !adapter.supports_media_type(MediaType::Native) {
        media.native = None;
    }
    media
}

fn slice(media: &MediaTypes, media_type: MediaType) -> MediaTypes {
    match media_type {
        MediaType::Banner => MediaTypes {
            banner: media.banner.clone(),
            ..MediaTypes::default()
        },
        MediaType::Video => MediaTypes {
            video: media.video.clone(),
            ..MediaTypes::default()
        },
        MediaType::Native => MediaTypes {
            native: media.native.clone(),
            ..MediaTypes::default()
        },
    }
}

fn native_assets(media: &MediaTypes, catalog: &AssetCatalog) -> Vec<AssetKind> {
    media
        .native
        .iter()
        .flat_map(|native| native.keys())
        .filter_map(|name| AssetKind::from_name(name))
        .filter(|kind| catalog.lookup(*kind).is_some())
        .collect()
}

fn media_block(
    adapter: &dyn BidderAdapter,
    request: &AdUnitRequest,
    media: &MediaTypes,
    placement: Option<&adpod::PodPlacement>,
) -> MediaTypeBlock {
    let legacy = request.sizes.as_ref();
    let declared = media.declared();

    match declared.as_slice() {
        [MediaType::Video] => {
            let video = media.video.clone().unwrap_or_default();
            MediaTypeBlock::Video {
                size: sizes::resolve(media, legacy),
                context: video.context(),
                min_duration: placement.and_then(|p| p.min_duration).or(video.minduration),
                max_duration: placement.map(|p| p.max_duration).or(video.maxduration),
            }
        }
        [MediaType::Native] => MediaTypeBlock::Native {
            assets: native_assets(media, adapter.native_catalog()),
            size: sizes::native_image_size(media).or_else(|| sizes::resolve(media, legacy)),
        },
        [MediaType::Banner] => MediaTypeBlock::Banner {
            sizes: sizes::resolve_all(media, legacy),
        },
        types => MediaTypeBlock::Multi {
            types: types.to_vec(),
            sizes: sizes::resolve_all(media, legacy),
        },
    }
}

fn item<'a>(
    adapter: &dyn BidderAdapter,
    request: &'a AdUnitRequest,
    media: MediaTypes,
    placement: Option<adpod::PodPlacement>,
) -> BatchItem<'a> {
    let deal_ids = adapter.deal_ids(request);
    let descriptor = ImpressionDescriptor {
        id: request.bid_id.clone(),
        bid_id: request.bid_id.clone(),
        ad_unit_code: request.ad_unit_code.clone(),
        tag_id: adapter.tag_id(request),
        media: media_block(adapter, request, &media, placement.as_ref()),
        deal: (!deal_ids.is_empty()).then(|| DealInfo {
            deal_ids,
            private_auction: false,
        }),
        placement,
        renderer: request.renderer.clone(),
    };
    BatchItem {
        request,
        media,
        placement,
        descriptor,
    }
}

/// Expand an ad pod request into batches. Malformed pods are reported and
/// yield nothing.
fn pod_batches<'a>(
    adapter: &dyn BidderAdapter,
    request: &'a AdUnitRequest,
    media: &MediaTypes,
    max_per_request: usize,
    sink: &dyn DiagnosticSink,
) -> Vec<Batch<'a>> {
    let Some(video) = media.adpod() else {
        return Vec::new();
    };
    let placements = match PodSpec::from_video(video).and_then(|spec| spec.placements()) {
        Ok(placements) => placements,
        Err(err) => {
            sink.report(Diagnostic::warn(
                Component::AdPod,
                request.bid_id.as_str(),
                err.to_string(),
            ));
            return Vec::new();
        }
    };

    let video_only = slice(media, MediaType::Video);
    adpod::batch(placements, max_per_request)
        .into_iter()
        .map(|chunk| Batch {
            items: chunk
                .into_iter()
                .map(|placement| item(adapter, request, video_only.clone(), Some(placement)))
                .collect(),
            is_pod: true,
        })
        .collect()
}

fn chunked(items: Vec<BatchItem<'_>>, max_per_request: usize) -> Vec<Batch<'_>> {
    adpod::batch(items, max_per_request)
        .into_iter()
        .map(|items| Batch {
            items,
            is_pod: false,
        })
        .collect()
}

fn single(item: BatchItem<'_>) -> Batch<'_> {
    Batch {
        items: vec![item],
        is_pod: false,
    }
}

/// Group validated requests per the adapter's [`PartitionPolicy`].
pub fn partition<'a>(
    adapter: &dyn BidderAdapter,
    requests: &[&'a AdUnitRequest],
    max_per_request: usize,
    sink: &dyn DiagnosticSink,
) -> Vec<Batch<'a>> {
    match adapter.partition_policy() {
        PartitionPolicy::GroupBanner => {
            let mut banners = Vec::new();
            let mut videos = Vec::new();
            let mut natives = Vec::new();

            for &request in requests {
                let media = effective_media(adapter, request);
                if media.is_empty() {
                    report_no_media(adapter, request, sink);
                    continue;
                }
                for media_type in media.declared() {
                    match media_type {
                        MediaType::Banner => {
                            banners.push(item(adapter, request, slice(&media, media_type), None));
                        }
                        MediaType::Video if media.adpod().is_some() => {
                            videos.extend(pod_batches(adapter, request, &media, max_per_request, sink));
                        }
                        MediaType::Video => {
                            videos.push(single(item(adapter, request, slice(&media, media_type), None)));
                        }
                        MediaType::Native => {
                            natives.push(single(item(adapter, request, slice(&media, media_type), None)));
                        }
                    }
                }
            }

            let mut batches = chunked(banners, max_per_request);
            batches.extend(videos);
            batches.extend(natives);
            batches
        }
        PartitionPolicy::PerRequest => {
            let mut batches = Vec::new();
            for &request in requests {
                let media = effective_media(adapter, request);
                if media.is_empty() {
                    report_no_media(adapter, request, sink);
                } else if media.adpod().is_some() {
                    batches.extend(pod_batches(adapter, request, &media, max_per_request, sink));
                } else {
                    batches.push(single(item(adapter, request, media, None)));
                }
            }
            batches
        }
        PartitionPolicy::Combined => {
            let mut combined = Vec::new();
            let mut pods = Vec::new();
            for &request in requests {
                let media = effective_media(adapter, request);
                if media.adpod().is_some() {
                    pods.extend(pod_batches(adapter, request, &media, max_per_request, sink));
                } else {
                    combined.push(item(adapter, request, media, None));
                }
            }
            let mut batches = chunked(combined, max_per_request);
            batches.extend(pods);
            batches
        }
    }
}

fn report_no_media(adapter: &dyn BidderAdapter, request: &AdUnitRequest, sink: &dyn DiagnosticSink) {
    sink.report(Diagnostic::warn(
        Component::Validation,
        request.bid_id.as_str(),
        format!("no media type supported by {}", adapter.code()),
    ));
}
