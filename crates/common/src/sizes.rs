//! Width x height extraction from heterogeneous size declarations.
//!
//! Hosts send sizes as a single pair `[300, 250]`, a list of pairs
//! `[[300, 250], [728, 90]]`, or the legacy string form `"300x250"`. Typed
//! media-type lists always win over the legacy flat array on the ad unit.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::auction::types::MediaTypes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Fallback used by exchanges that require a size on native impressions.
    pub const ONE_BY_ONE: Self = Self::new(1, 1);
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn dimension(value: &Json) -> Option<u32> {
    match value {
        Json::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|v| u32::try_from(v).ok()),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_pair(value: &Json) -> Option<Size> {
    match value {
        Json::Array(pair) if pair.len() == 2 => {
            Some(Size::new(dimension(&pair[0])?, dimension(&pair[1])?))
        }
        Json::String(s) => {
            let (w, h) = s.split_once(['x', 'X'])?;
            Some(Size::new(w.trim().parse().ok()?, h.trim().parse().ok()?))
        }
        _ => None,
    }
}

/// Normalize a size declaration into an ordered list. Malformed entries are
/// skipped.
#[must_use]
pub fn parse_sizes(value: &Json) -> Vec<Size> {
    match value {
        Json::Array(items) if items.iter().all(|item| !item.is_array() && !item.is_string()) => {
            parse_pair(value).into_iter().collect()
        }
        Json::Array(items) => items.iter().filter_map(parse_pair).collect(),
        Json::String(_) => parse_pair(value).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Typed size lists in precedence order: `banner.sizes`, `video.playerSize`,
/// `video.sizes`.
fn typed_sources(media: &MediaTypes) -> impl Iterator<Item = &Json> {
    let banner = media.banner.as_ref().and_then(|b| b.sizes.as_ref());
    let player = media.video.as_ref().and_then(|v| v.player_size.as_ref());
    let video = media.video.as_ref().and_then(|v| v.sizes.as_ref());
    [banner, player, video].into_iter().flatten()
}

/// All sizes from the first typed source that yields any, else from the
/// legacy array.
#[must_use]
pub fn resolve_all(media: &MediaTypes, legacy: Option<&Json>) -> Vec<Size> {
    typed_sources(media)
        .map(parse_sizes)
        .find(|sizes| !sizes.is_empty())
        .or_else(|| legacy.map(parse_sizes))
        .unwrap_or_default()
}

/// First size only. `None` when the request carries no size information at
/// all; callers pick their own default.
#[must_use]
pub fn resolve(media: &MediaTypes, legacy: Option<&Json>) -> Option<Size> {
    resolve_all(media, legacy).into_iter().next()
}

/// Size of the main native image asset, if declared.
#[must_use]
pub fn native_image_size(media: &MediaTypes) -> Option<Size> {
    media
        .native
        .as_ref()?
        .get("image")?
        .sizes
        .as_ref()
        .and_then(|sizes| parse_sizes(sizes).into_iter().next())
}
