//! One-stop facade over the registry, builder and interpreter.

use std::collections::BTreeMap;

use crate::auction::builder::RequestBuilder;
use crate::auction::context::{AuctionContext, PrivacyContext};
use crate::auction::interpreter::ResponseInterpreter;
use crate::auction::types::{
    AdUnitRequest, ExchangeResponse, NormalizedBid, SyncOptions, UserSync, WirePayload,
};
use crate::diagnostics::{Component, Diagnostic, DiagnosticSink};
use crate::integrations::AdapterRegistry;
use crate::settings::Settings;

/// Routes ad unit requests to their exchange adapters and wire responses
/// back through the interpreter. Holds no per-auction state.
#[derive(Clone, Default)]
pub struct Transformer {
    registry: AdapterRegistry,
    builder: RequestBuilder,
    interpreter: ResponseInterpreter,
}

impl Transformer {
    #[must_use]
    pub fn new(registry: AdapterRegistry, builder: RequestBuilder) -> Self {
        Self {
            registry,
            builder,
            interpreter: ResponseInterpreter::new(),
        }
    }

    /// Registers every enabled adapter and the configured keyword taxonomies.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            AdapterRegistry::from_settings(settings),
            RequestBuilder::from_settings(settings),
        )
    }

    #[must_use]
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Build payloads for requests addressed to any registered bidder.
    ///
    /// Requests are grouped by bidder in first-seen order. Requests for a
    /// bidder with no registered adapter are reported and skipped.
    pub fn build_requests(
        &self,
        requests: &[AdUnitRequest],
        ctx: &AuctionContext,
        sink: &dyn DiagnosticSink,
    ) -> Vec<WirePayload> {
        let mut order: Vec<&'static str> = Vec::new();
        let mut grouped: BTreeMap<&'static str, Vec<AdUnitRequest>> = BTreeMap::new();

        for request in requests {
            let bidder = request.params.bidder();
            let Some(adapter) = self.registry.get(bidder) else {
                sink.report(Diagnostic::warn(
                    Component::Validation,
                    request.bid_id.as_str(),
                    format!("no adapter registered for bidder `{bidder}`"),
                ));
                continue;
            };
            let code = adapter.code();
            if !grouped.contains_key(code) {
                order.push(code);
            }
            grouped.entry(code).or_default().push(request.clone());
        }

        let mut payloads = Vec::new();
        for code in order {
            let (Some(adapter), Some(group)) = (self.registry.get(code), grouped.get(code)) else {
                continue;
            };
            payloads.extend(self.builder.build(adapter.as_ref(), group, ctx, sink));
        }
        payloads
    }

    /// Normalize the bids in `response`, which answered `payload`.
    pub fn interpret_response(
        &self,
        response: &ExchangeResponse,
        payload: &WirePayload,
        sink: &dyn DiagnosticSink,
    ) -> Vec<NormalizedBid> {
        match self.registry.get(&payload.bidder) {
            Some(adapter) => self.interpreter.interpret(adapter.as_ref(), response, payload, sink),
            None => {
                sink.report(Diagnostic::warn(
                    Component::ResponseInterpreter,
                    payload.bidder.as_str(),
                    "no adapter registered for payload bidder",
                ));
                Vec::new()
            }
        }
    }

    /// Sync pixels for `bidder`. Unknown bidders have none.
    #[must_use]
    pub fn user_syncs(
        &self,
        bidder: &str,
        options: &SyncOptions,
        responses: &[ExchangeResponse],
        privacy: &PrivacyContext,
    ) -> Vec<UserSync> {
        self.registry
            .get(bidder)
            .map(|adapter| adapter.user_syncs(options, responses, privacy))
            .unwrap_or_default()
    }

    /// Pixels to fire for a winning bid.
    #[must_use]
    pub fn win_notifications(&self, bid: &NormalizedBid) -> Vec<String> {
        self.registry
            .get(&bid.bidder)
            .map(|adapter| adapter.win_notifications(bid))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::test_support::tests::{banner_request, create_test_settings, empty_context};
    use serde_json::json;

    #[test]
    fn test_build_requests_routes_by_bidder() {
        let transformer = Transformer::from_settings(&create_test_settings());
        let sink = CollectingSink::new();
        let requests = vec![
            banner_request("viant", json!({ "publisherId": "464" })),
            banner_request("appnexus", json!({ "placementId": 13144370 })),
            banner_request("rubicon", json!({ "accountId": 1 })),
            banner_request("theAdx", json!({ "pid": 1, "tagId": "tag-1" })),
        ];

        let payloads = transformer.build_requests(&requests, &empty_context(), &sink);

        let bidders: Vec<&str> = payloads.iter().map(|p| p.bidder.as_str()).collect();
        assert_eq!(bidders, vec!["viant", "appnexus", "theadx"]);
        assert_eq!(sink.count_for(Component::Validation), 1);
    }

    #[test]
    fn test_interpret_response_unknown_bidder() {
        let transformer = Transformer::default();
        let sink = CollectingSink::new();
        let payload = WirePayload {
            bidder: "rubicon".to_string(),
            method: http::Method::POST,
            url: "https://example.com".to_string(),
            body: json!({}),
            impressions: Vec::new(),
            site: Default::default(),
            device: Default::default(),
            privacy: Default::default(),
            with_credentials: false,
            headers: Default::default(),
        };

        let bids = transformer.interpret_response(&ExchangeResponse::ok(json!({ "tags": [] })), &payload, &sink);
        assert!(bids.is_empty());
        assert_eq!(sink.count_for(Component::ResponseInterpreter), 1);
        assert!(transformer
            .user_syncs("rubicon", &SyncOptions::default(), &[], &PrivacyContext::default())
            .is_empty());
    }
}
