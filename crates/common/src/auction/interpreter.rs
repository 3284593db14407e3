//! Turns exchange responses back into normalized bids.
//!
//! Adapters split a response body into [`DecodedAd`] entries. Everything
//! after that is shared: correlation against the payload's descriptors,
//! price checks, media type resolution, creative assembly and policy
//! defaults.

use crate::auction::adapter::{BidderAdapter, DecodedAd};
use crate::auction::types::{
    Creative, ExchangeResponse, ImpressionDescriptor, MediaType, NormalizedBid, RendererConfig,
    VideoContext, VideoInfo, WirePayload,
};
use crate::diagnostics::{Component, Diagnostic, DiagnosticSink};
use crate::native;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseInterpreter;

impl ResponseInterpreter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Normalize every usable bid in `response`.
    ///
    /// Never fails. A non-2xx status, an empty body or an undecodable body
    /// yields no bids; single bad entries are reported to `sink` and skipped.
    /// Every returned bid's `request_id` is the `bid_id` of one of the
    /// payload's descriptors.
    pub fn interpret(
        &self,
        adapter: &dyn BidderAdapter,
        response: &ExchangeResponse,
        payload: &WirePayload,
        sink: &dyn DiagnosticSink,
    ) -> Vec<NormalizedBid> {
        if !response.is_success() {
            sink.report(Diagnostic::info(
                Component::ResponseInterpreter,
                payload.bidder.as_str(),
                format!("exchange answered with status {}", response.status),
            ));
            return Vec::new();
        }
        if is_no_bid(&response.body) {
            log::debug!("{}: empty response body", adapter.code());
            return Vec::new();
        }

        let entries = match adapter.decode(&response.body, payload) {
            Ok(entries) => entries,
            Err(report) => {
                log::warn!("{}: failed to decode response: {:?}", adapter.code(), report);
                sink.report(Diagnostic::warn(
                    Component::ResponseInterpreter,
                    payload.bidder.as_str(),
                    report.current_context().to_string(),
                ));
                return Vec::new();
            }
        };

        let mut bids = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Ok(ad) => {
                    if let Some(bid) = normalize(adapter, ad, payload, sink) {
                        bids.push(bid);
                    }
                }
                Err(report) => sink.report(Diagnostic::warn(
                    Component::ResponseInterpreter,
                    payload.bidder.as_str(),
                    report.current_context().to_string(),
                )),
            }
        }
        bids
    }
}

fn is_no_bid(body: &serde_json::Value) -> bool {
    match body {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn correlate<'a>(ad: &DecodedAd, payload: &'a WirePayload) -> Option<&'a ImpressionDescriptor> {
    match &ad.correlation_id {
        Some(id) => payload.descriptor(id),
        None => payload.sole_descriptor(),
    }
}

fn has_block(ad: &DecodedAd, media_type: MediaType) -> bool {
    match media_type {
        MediaType::Banner => ad.banner.is_some(),
        MediaType::Video => ad.video.is_some(),
        MediaType::Native => ad.native.is_some(),
    }
}

/// The declared media type when its creative is present, otherwise the first
/// present creative in `banner, video, native` order.
fn resolve_media_type(ad: &DecodedAd, descriptor: &ImpressionDescriptor) -> Option<MediaType> {
    let declared = ad.ad_type.or_else(|| descriptor.media.media_type());
    if let Some(media_type) = declared.filter(|t| has_block(ad, *t)) {
        return Some(media_type);
    }
    [MediaType::Banner, MediaType::Video, MediaType::Native]
        .into_iter()
        .find(|t| has_block(ad, *t))
}

fn normalize(
    adapter: &dyn BidderAdapter,
    ad: DecodedAd,
    payload: &WirePayload,
    sink: &dyn DiagnosticSink,
) -> Option<NormalizedBid> {
    let subject = ad.correlation_id.clone().unwrap_or_default();
    let warn = |message: String| {
        sink.report(Diagnostic::warn(
            Component::ResponseInterpreter,
            subject.as_str(),
            message,
        ));
    };

    let Some(descriptor) = correlate(&ad, payload) else {
        warn(match &ad.correlation_id {
            Some(id) => format!("no impression matches correlation id '{id}'"),
            None => "ad without correlation id in a multi-impression payload".to_string(),
        });
        return None;
    };

    let policy = adapter.policy();
    if ad.cpm.is_nan() || ad.cpm < 0.0 {
        warn(format!("invalid cpm {}", ad.cpm));
        return None;
    }
    if ad.cpm == 0.0 && !policy.allow_zero_cpm {
        sink.report(Diagnostic::debug(
            Component::ResponseInterpreter,
            descriptor.bid_id.as_str(),
            "zero cpm bid dropped",
        ));
        return None;
    }

    let Some(media_type) = resolve_media_type(&ad, descriptor) else {
        warn("ad carries no creative".to_string());
        return None;
    };

    let context = descriptor.media.video_context().unwrap_or_default();
    let (creative, video) = match media_type {
        MediaType::Banner => (
            Creative::Banner {
                ad: ad.banner.clone().unwrap_or_default(),
            },
            None,
        ),
        MediaType::Video => {
            let decoded = ad.video.clone().unwrap_or_default();
            if decoded.vast_xml.is_none() && decoded.vast_url.is_none() && ad.renderer_url.is_none() {
                warn("video ad without VAST markup, URL or renderer".to_string());
                return None;
            }
            let info = VideoInfo {
                context,
                duration_seconds: decoded
                    .duration_ms
                    .and_then(|ms| u32::try_from(ms / 1000).ok()),
                deal_tier: if context == VideoContext::Adpod {
                    ad.meta.deal_priority
                } else {
                    None
                },
            };
            (
                Creative::Video {
                    vast_xml: decoded.vast_xml,
                    vast_url: decoded.vast_url,
                    vast_imp_url: decoded.vast_imp_url,
                    video_cache_key: decoded.cache_key,
                },
                Some(info),
            )
        }
        MediaType::Native => {
            let decoded = ad.native.as_ref()?;
            let recovered = native::recover(
                decoded,
                adapter.native_catalog(),
                &|field| adapter.native_ext_key(field),
                descriptor.bid_id.as_str(),
                sink,
            );
            (
                Creative::Native {
                    native: Box::new(recovered),
                },
                None,
            )
        }
    };

    let renderer = match (&ad.renderer_url, media_type) {
        (Some(url), MediaType::Video) if adapter.renders_video(context) => Some(RendererConfig {
            url: url.clone(),
            ad_unit_code: descriptor.ad_unit_code.clone(),
            config: descriptor
                .renderer
                .as_ref()
                .and_then(|renderer| renderer.options.clone()),
        }),
        _ => None,
    };

    let primary = descriptor.media.primary_size();
    let mut meta = ad.meta;
    meta.media_type = Some(media_type);

    Some(NormalizedBid {
        request_id: descriptor.bid_id.clone(),
        ad_unit_code: descriptor.ad_unit_code.clone(),
        bidder: payload.bidder.clone(),
        cpm: ad.cpm,
        currency: ad.currency.unwrap_or_else(|| policy.currency.clone()),
        width: ad.width.or(primary.map(|s| s.width)).unwrap_or(0),
        height: ad.height.or(primary.map(|s| s.height)).unwrap_or(0),
        creative,
        ttl: ad.ttl.unwrap_or(policy.ttl_seconds),
        creative_id: ad.creative_id,
        deal_id: ad.deal_id,
        net_revenue: ad.net_revenue.unwrap_or(policy.net_revenue),
        media_type,
        video,
        renderer,
        burl: ad.burl,
        nurl: ad.nurl,
        meta,
        extensions: ad.extensions,
    })
}
