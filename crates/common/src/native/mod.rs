//! Native ad assembly.
//!
//! Exchanges return native creatives either as a named-field object (UT
//! format) or as an OpenRTB Native asset list. Both are folded into one
//! [`NativeAd`] using an [`AssetCatalog`]. Recognized assets land in typed
//! fields; everything else is kept in [`NativeAd::ext`] so custom assets are
//! never lost.

pub mod catalog;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as Json;

use crate::auction::types::NativeSpec;
use crate::diagnostics::{Component, Diagnostic, DiagnosticSink};
use crate::sizes;

use self::catalog::{AssetCatalog, AssetKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NativeImage {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl NativeImage {
    fn from_json(value: &Json) -> Option<Self> {
        let url = value.get("url")?.as_str()?.to_string();
        let dim = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|key| value.get(key).and_then(Json::as_u64))
                .and_then(|v| u32::try_from(v).ok())
        };
        Some(Self {
            url,
            width: dim(["width", "w"]),
            height: dim(["height", "h"]),
        })
    }
}

/// Native creative handed back to the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeAd {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsored_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<NativeImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<NativeImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub click_trackers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub impression_trackers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub javascript_trackers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Json>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ext: BTreeMap<String, Json>,
}

impl NativeAd {
    fn text_slot(&mut self, kind: AssetKind) -> Option<&mut Option<String>> {
        Some(match kind {
            AssetKind::Title => &mut self.title,
            AssetKind::Body => &mut self.body,
            AssetKind::Body2 => &mut self.body2,
            AssetKind::SponsoredBy => &mut self.sponsored_by,
            AssetKind::Cta => &mut self.cta,
            AssetKind::Rating => &mut self.rating,
            AssetKind::Likes => &mut self.likes,
            AssetKind::Downloads => &mut self.downloads,
            AssetKind::Price => &mut self.price,
            AssetKind::SalePrice => &mut self.sale_price,
            AssetKind::Phone => &mut self.phone,
            AssetKind::Address => &mut self.address,
            AssetKind::DisplayUrl => &mut self.display_url,
            AssetKind::PrivacyLink => &mut self.privacy_link,
            AssetKind::Image | AssetKind::Icon => return None,
        })
    }

    /// Store `value` in the typed field for `kind`. Returns `false` when the
    /// value has the wrong shape for that kind.
    pub fn set_asset(&mut self, kind: AssetKind, value: &Json) -> bool {
        if kind.is_image() {
            let Some(image) = NativeImage::from_json(value) else {
                return false;
            };
            match kind {
                AssetKind::Icon => self.icon = Some(image),
                _ => self.image = Some(image),
            }
            return true;
        }

        let text = match value {
            Json::String(s) => s.clone(),
            Json::Number(n) => n.to_string(),
            _ => return false,
        };
        if let Some(slot) = self.text_slot(kind) {
            *slot = Some(text);
        }
        true
    }
}

/// A native creative as it came off the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeSource {
    /// Named-field object, e.g. `{"title": .., "desc": .., "main_img": {..}}`.
    Named(Json),
    /// OpenRTB Native response, `{"assets": [..], "link": {..}, "imptrackers": [..]}`.
    OpenRtb(Json),
}

/// Native payload plus trackers the exchange sends outside the native object.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNative {
    pub source: NativeSource,
    /// Prepended to the impression trackers, in order.
    pub leading_impression_trackers: Vec<String>,
    /// Prepended to the click trackers, in order.
    pub leading_click_trackers: Vec<String>,
}

impl DecodedNative {
    #[must_use]
    pub fn new(source: NativeSource) -> Self {
        Self {
            source,
            leading_impression_trackers: Vec::new(),
            leading_click_trackers: Vec::new(),
        }
    }
}

fn string_list(value: Option<&Json>) -> Vec<String> {
    match value {
        Some(Json::Array(items)) => items
            .iter()
            .filter_map(Json::as_str)
            .map(str::to_string)
            .collect(),
        Some(Json::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// OpenRTB Native request assets for `spec`, ordered by asset name.
/// Asset names the catalog does not know are skipped.
#[must_use]
pub fn request_assets(spec: &NativeSpec, catalog: &AssetCatalog) -> Vec<Json> {
    spec.iter()
        .filter_map(|(name, asset)| {
            let entry = AssetKind::from_name(name).and_then(|kind| catalog.lookup(kind))?;
            let id = entry.wire_id?;

            let mut body = serde_json::Map::new();
            if let Some(len) = asset.len {
                body.insert("len".to_string(), Json::from(len));
            }
            if let Some(size) = asset
                .sizes
                .as_ref()
                .and_then(|value| sizes::parse_sizes(value).into_iter().next())
            {
                body.insert("wmin".to_string(), Json::from(size.width));
                body.insert("hmin".to_string(), Json::from(size.height));
            }
            if let Some(subtype) = entry.wire_subtype {
                body.insert("type".to_string(), Json::from(subtype));
            }

            let mut out = serde_json::Map::new();
            out.insert("id".to_string(), Json::from(id));
            out.insert("required".to_string(), Json::from(u8::from(asset.required)));
            out.insert(entry.wire_field_name.to_string(), Json::Object(body));
            Some(Json::Object(out))
        })
        .collect()
}

/// Build a [`NativeAd`] from a decoded payload.
///
/// `ext_key` names unrecognized fields inside [`NativeAd::ext`].
pub fn recover(
    decoded: &DecodedNative,
    catalog: &AssetCatalog,
    ext_key: &dyn Fn(&str) -> String,
    subject: &str,
    sink: &dyn DiagnosticSink,
) -> NativeAd {
    let mut ad = match &decoded.source {
        NativeSource::Named(object) => recover_named(object, catalog, ext_key, subject, sink),
        NativeSource::OpenRtb(object) => recover_openrtb(object, catalog, ext_key, subject, sink),
    };

    if !decoded.leading_impression_trackers.is_empty() {
        let mut trackers = decoded.leading_impression_trackers.clone();
        trackers.append(&mut ad.impression_trackers);
        ad.impression_trackers = trackers;
    }
    if !decoded.leading_click_trackers.is_empty() {
        let mut trackers = decoded.leading_click_trackers.clone();
        trackers.append(&mut ad.click_trackers);
        ad.click_trackers = trackers;
    }
    ad
}

fn recover_named(
    object: &Json,
    catalog: &AssetCatalog,
    ext_key: &dyn Fn(&str) -> String,
    subject: &str,
    sink: &dyn DiagnosticSink,
) -> NativeAd {
    let mut ad = NativeAd::default();
    let Some(fields) = object.as_object() else {
        sink.report(Diagnostic::warn(
            Component::Native,
            subject,
            "native payload is not an object",
        ));
        return ad;
    };

    for (key, value) in fields {
        if let Some(entry) = catalog.lookup_field(key) {
            if !ad.set_asset(entry.kind, value) {
                ad.ext.insert(ext_key(key), value.clone());
            }
            continue;
        }

        match key.as_str() {
            "link" => {
                ad.click_url = value.get("url").and_then(Json::as_str).map(str::to_string);
                ad.click_trackers = string_list(value.get("click_trackers"));
            }
            "impression_trackers" => ad.impression_trackers = string_list(Some(value)),
            "javascriptTrackers" | "javascript_trackers" => {
                ad.javascript_trackers = string_list(Some(value));
            }
            "video" => {
                ad.video = Some(value.clone());
                ad.ext.insert(ext_key(key), value.clone());
            }
            _ => {
                ad.ext.insert(ext_key(key), value.clone());
            }
        }
    }
    ad
}

fn recover_openrtb(
    object: &Json,
    catalog: &AssetCatalog,
    ext_key: &dyn Fn(&str) -> String,
    subject: &str,
    sink: &dyn DiagnosticSink,
) -> NativeAd {
    let mut ad = NativeAd::default();

    for asset in object
        .get("assets")
        .and_then(Json::as_array)
        .into_iter()
        .flatten()
    {
        let id = asset
            .get("id")
            .and_then(Json::as_u64)
            .and_then(|id| u32::try_from(id).ok());
        let kind = id.and_then(|id| catalog.reverse_lookup(id));

        let content = ["title", "img", "data", "video"]
            .iter()
            .find_map(|field| asset.get(field));
        let value = content.map(|content| {
            content
                .get("text")
                .or_else(|| content.get("value"))
                .cloned()
                .unwrap_or_else(|| content.clone())
        });

        match (kind, value) {
            (Some(kind), Some(value)) if ad.set_asset(kind, &value) => {}
            (_, Some(value)) => {
                let key = id.map_or_else(|| "asset".to_string(), |id| format!("asset{id}"));
                ad.ext.insert(ext_key(&key), value);
            }
            (_, None) => sink.report(Diagnostic::debug(
                Component::Native,
                subject,
                format!("native asset {id:?} has no content"),
            )),
        }
    }

    if let Some(link) = object.get("link") {
        ad.click_url = link.get("url").and_then(Json::as_str).map(str::to_string);
        ad.click_trackers = string_list(link.get("clicktrackers"));
    }
    ad.impression_trackers = string_list(object.get("imptrackers"));
    ad.javascript_trackers = string_list(object.get("jstracker"));
    ad
}
