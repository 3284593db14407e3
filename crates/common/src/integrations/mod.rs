//! Exchange adapters and the registry that discovers them from settings.

use std::sync::Arc;

use crate::auction::adapter::BidderAdapter;
use crate::settings::Settings;

pub mod appnexus;
pub mod mediasquare;
mod registry;
pub mod theadx;
pub mod viant;

pub use registry::AdapterRegistry;

type AdapterBuilder = fn(&Settings) -> Vec<Arc<dyn BidderAdapter>>;

/// Every adapter builder, in registration order.
pub(crate) fn builders() -> &'static [AdapterBuilder] {
    &[
        appnexus::register_providers,
        mediasquare::register_providers,
        theadx::register_providers,
        viant::register_providers,
    ]
}
