//! Header-bidding request/response transformation engine.
//!
//! Turns a page's ad unit requests into exchange wire payloads and exchange
//! responses back into normalized bids. The engine performs no I/O: the host
//! sends the payloads and hands the answers back.
//!
//! # Modules
//!
//! - [`adpod`]: Ad pod placement expansion and batching
//! - [`auction`]: Request builder, response interpreter and the adapter trait
//! - [`diagnostics`]: Per-item diagnostics sinks
//! - [`error`]: Error types and error handling utilities
//! - [`integrations`]: Exchange adapters (AppNexus, TheAdx, Viant) and their registry
//! - [`keywords`]: Keyword aggregation
//! - [`native`]: Native asset catalogs and asset recovery
//! - [`openrtb`]: OpenRTB 2.5 request/response subset
//! - [`rtd`]: Real-time data providers
//! - [`settings`]: Configuration management and validation
//! - [`sizes`]: Creative size resolution
//! - [`test_support`]: Testing utilities and fixtures
//! - [`userid`]: User-ID submodules

pub mod adpod;
pub mod auction;
pub mod diagnostics;
pub mod error;
pub mod integrations;
pub mod keywords;
pub mod native;
pub mod openrtb;
pub mod rtd;
pub mod settings;
pub mod sizes;
pub mod userid;
