//! Request building and response interpretation for exchange adapters.
//!
//! The engine is split the same way for every exchange: a [`RequestBuilder`]
//! turns ad unit requests into [`WirePayload`]s through an adapter's
//! `encode`, and a [`ResponseInterpreter`] turns the exchange's answer back
//! into [`NormalizedBid`]s through its `decode`.
//!
//! Note: The adapters themselves live in the `integrations` module
//! (e.g., `crate::integrations::appnexus`, `crate::integrations::viant`).

pub mod adapter;
pub mod builder;
pub mod context;
pub mod identity;
pub mod interpreter;
pub mod transformer;
pub mod types;

pub use adapter::{BidPolicy, BidderAdapter, PartitionPolicy};
pub use builder::RequestBuilder;
pub use context::AuctionContext;
pub use interpreter::ResponseInterpreter;
pub use transformer::Transformer;
pub use types::{AdUnitRequest, ExchangeResponse, MediaType, NormalizedBid, WirePayload};
