//! Static mapping between native asset kinds and exchange wire identifiers.
//!
//! Two tables ship with the crate:
//!
//! - [`AssetCatalog::openrtb`] for exchanges speaking OpenRTB Native, where each
//!   asset has a numeric id, a field name (`title`, `img`, `data`) and a subtype.
//! - [`AssetCatalog::appnexus`] for the UT format, where assets are addressed
//!   by named fields and carry no numeric id.
//!
//! Both are built once and shared read-only. Unknown kinds and ids resolve to
//! `None`; callers drop the asset and continue.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::Serialize;

/// Native asset kinds understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    Title,
    Body,
    Body2,
    SponsoredBy,
    Image,
    Icon,
    Cta,
    Rating,
    Likes,
    Downloads,
    Price,
    SalePrice,
    Phone,
    Address,
    DisplayUrl,
    PrivacyLink,
}

impl AssetKind {
    pub const ALL: [Self; 16] = [
        Self::Title,
        Self::Body,
        Self::Body2,
        Self::SponsoredBy,
        Self::Image,
        Self::Icon,
        Self::Cta,
        Self::Rating,
        Self::Likes,
        Self::Downloads,
        Self::Price,
        Self::SalePrice,
        Self::Phone,
        Self::Address,
        Self::DisplayUrl,
        Self::PrivacyLink,
    ];

    /// Host-facing name, as used in `mediaTypes.native` and on the bid.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Body => "body",
            Self::Body2 => "body2",
            Self::SponsoredBy => "sponsoredBy",
            Self::Image => "image",
            Self::Icon => "icon",
            Self::Cta => "cta",
            Self::Rating => "rating",
            Self::Likes => "likes",
            Self::Downloads => "downloads",
            Self::Price => "price",
            Self::SalePrice => "salePrice",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::DisplayUrl => "displayUrl",
            Self::PrivacyLink => "privacyLink",
        }
    }

    /// Parse a host asset name. Case-insensitive, since publishers write both
    /// `displayUrl` and `displayurl`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn is_image(self) -> bool {
        matches!(self, Self::Image | Self::Icon)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How one asset kind appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub kind: AssetKind,
    /// Numeric asset id, for formats that address assets by id.
    pub wire_id: Option<u32>,
    /// Field name in the request.
    pub wire_field_name: &'static str,
    /// OpenRTB `img.type` / `data.type`.
    pub wire_subtype: Option<u32>,
    /// Field name the exchange uses in its response.
    pub response_field: &'static str,
}

#[derive(Debug)]
pub struct AssetCatalog {
    entries: Vec<AssetEntry>,
    reverse: BTreeMap<u32, AssetKind>,
}

impl AssetCatalog {
    /// Build a catalog. When two entries share a wire id the later one wins
    /// the reverse lookup; `aliases` add extra reverse-only ids.
    fn build(entries: Vec<AssetEntry>, aliases: &[(u32, AssetKind)]) -> Self {
        let mut reverse = BTreeMap::new();
        for entry in &entries {
            if let Some(id) = entry.wire_id {
                reverse.insert(id, entry.kind);
            }
        }
        for (id, kind) in aliases {
            reverse.entry(*id).or_insert(*kind);
        }
        Self { entries, reverse }
    }

    #[must_use]
    pub fn lookup(&self, kind: AssetKind) -> Option<&AssetEntry> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }

    #[must_use]
    pub fn reverse_lookup(&self, wire_id: u32) -> Option<AssetKind> {
        self.reverse.get(&wire_id).copied()
    }

    /// Entry whose response field is `name`.
    #[must_use]
    pub fn lookup_field(&self, name: &str) -> Option<&AssetEntry> {
        self.entries.iter().find(|entry| entry.response_field == name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &AssetEntry> {
        self.entries.iter()
    }

    /// OpenRTB Native table.
    #[must_use]
    pub fn openrtb() -> &'static Self {
        &OPENRTB
    }

    /// AppNexus UT named-field table.
    #[must_use]
    pub fn appnexus() -> &'static Self {
        &APPNEXUS
    }
}

const fn ortb(kind: AssetKind, id: u32, field: &'static str, subtype: Option<u32>) -> AssetEntry {
    AssetEntry {
        kind,
        wire_id: Some(id),
        wire_field_name: field,
        wire_subtype: subtype,
        response_field: field,
    }
}

const fn named(kind: AssetKind, request: &'static str, response: &'static str) -> AssetEntry {
    AssetEntry {
        kind,
        wire_id: None,
        wire_field_name: request,
        wire_subtype: None,
        response_field: response,
    }
}

// Rating and phone share id 7 on the wire. Responses carry phone under 7 and
// rating under 10.
static OPENRTB: Lazy<AssetCatalog> = Lazy::new(|| {
    use AssetKind::*;
    AssetCatalog::build(
        vec![
            ortb(Title, 0, "title", None),
            ortb(Cta, 1, "data", Some(12)),
            ortb(Icon, 2, "img", Some(1)),
            ortb(Image, 3, "img", Some(3)),
            ortb(Body, 4, "data", Some(2)),
            ortb(SponsoredBy, 5, "data", Some(1)),
            ortb(Body2, 6, "data", Some(10)),
            ortb(Rating, 7, "data", Some(3)),
            ortb(Phone, 7, "data", Some(8)),
            ortb(PrivacyLink, 8, "data", Some(501)),
            ortb(DisplayUrl, 9, "data", Some(11)),
            ortb(Address, 11, "data", Some(5)),
            ortb(Downloads, 12, "data", Some(5)),
            ortb(Likes, 13, "data", Some(4)),
            ortb(Price, 14, "data", Some(6)),
            ortb(SalePrice, 15, "data", Some(7)),
        ],
        &[(10, Rating)],
    )
});

static APPNEXUS: Lazy<AssetCatalog> = Lazy::new(|| {
    use AssetKind::*;
    AssetCatalog::build(
        vec![
            named(Title, "title", "title"),
            named(Body, "description", "desc"),
            named(Body2, "desc2", "desc2"),
            named(Image, "main_image", "main_img"),
            named(Icon, "icon", "icon"),
            named(Cta, "ctatext", "ctatext"),
            named(Rating, "rating", "rating"),
            named(SponsoredBy, "sponsored_by", "sponsored"),
            named(PrivacyLink, "privacy_link", "privacy_link"),
            named(DisplayUrl, "displayurl", "displayurl"),
            named(Address, "address", "address"),
            named(Downloads, "downloads", "downloads"),
            named(Likes, "likes", "likes"),
            named(Phone, "phone", "phone"),
            named(Price, "price", "price"),
            named(SalePrice, "saleprice", "saleprice"),
        ],
        &[],
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openrtb_forward_lookup() {
        let catalog = AssetCatalog::openrtb();

        let image = catalog.lookup(AssetKind::Image).expect("should map image");
        assert_eq!(image.wire_id, Some(3));
        assert_eq!(image.wire_field_name, "img");
        assert_eq!(image.wire_subtype, Some(3));

        let rating = catalog.lookup(AssetKind::Rating).expect("should map rating");
        assert_eq!(rating.wire_id, Some(7));
        assert_eq!(rating.wire_subtype, Some(3));
    }

    #[test]
    fn test_openrtb_reverse_lookup() {
        let catalog = AssetCatalog::openrtb();

        assert_eq!(catalog.reverse_lookup(0), Some(AssetKind::Title));
        assert_eq!(catalog.reverse_lookup(7), Some(AssetKind::Phone));
        assert_eq!(catalog.reverse_lookup(10), Some(AssetKind::Rating));
        assert_eq!(catalog.reverse_lookup(99), None);
    }

    #[test]
    fn test_appnexus_named_fields() {
        let catalog = AssetCatalog::appnexus();

        let body = catalog.lookup(AssetKind::Body).expect("should map body");
        assert_eq!(body.wire_field_name, "description");
        assert_eq!(body.response_field, "desc");
        assert_eq!(
            catalog.lookup_field("main_img").map(|e| e.kind),
            Some(AssetKind::Image)
        );
        assert!(catalog.lookup_field("customThing").is_none());
        assert_eq!(catalog.reverse_lookup(0), None);
    }

    #[test]
    fn test_asset_kind_names_are_case_insensitive() {
        assert_eq!(AssetKind::from_name("displayurl"), Some(AssetKind::DisplayUrl));
        assert_eq!(AssetKind::from_name("salePrice"), Some(AssetKind::SalePrice));
        assert_eq!(AssetKind::from_name("clickUrl"), None);
    }
}
