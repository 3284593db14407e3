//! Auction-wide context supplied once per `build` call, and the site, device
//! and privacy blocks derived from it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// GDPR consent as handed over by the host's consent module.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GdprConsent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdpr_applies: Option<bool>,
    /// Google additional consent string, `1~7.12.35...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addtl_consent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose_one_consent: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GppConsent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpp_string: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applicable_sections: Vec<i32>,
}

/// Consent strings. Opaque to the engine and copied verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdpr: Option<GdprConsent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub us_privacy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpp: Option<GppConsent>,
}

impl ConsentSignals {
    #[must_use]
    pub fn gdpr_applies(&self) -> bool {
        self.gdpr
            .as_ref()
            .and_then(|gdpr| gdpr.gdpr_applies)
            .unwrap_or(false)
    }

    /// Device storage access (TCF purpose 1) is allowed. True when GDPR does
    /// not apply.
    #[must_use]
    pub fn has_purpose_one_consent(&self) -> bool {
        match &self.gdpr {
            Some(gdpr) if gdpr.gdpr_applies == Some(true) => gdpr.purpose_one_consent == Some(true),
            _ => true,
        }
    }
}

/// Page location information gathered by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefererInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topmost_location: Option<String>,
    #[serde(default)]
    pub reached_top: bool,
    #[serde(default)]
    pub num_iframes: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
}

/// Browser and device signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub do_not_track: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
}

/// A single user identifier inside an identity envelope entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Uid {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atype: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Json>,
}

/// One `{source, uids}` entry of the identity envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserIdEntry {
    pub source: String,
    #[serde(default)]
    pub uids: Vec<Uid>,
}

impl UserIdEntry {
    #[must_use]
    pub fn first_uid(&self) -> Option<&Uid> {
        self.uids.first()
    }
}

/// Cross-cutting auction data. Read-only for the duration of a `build` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<String>,
    #[serde(default)]
    pub consent: ConsentSignals,
    #[serde(default)]
    pub referer: RefererInfo,
    /// First-party `ortb2` object (site, user, app, device, regs, source).
    #[serde(default)]
    pub ortb2: Json,
    /// Host-level auction keywords, `{key: value | [values]}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_keywords: Option<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<UserIdEntry>,
    #[serde(default)]
    pub device: DeviceSignals,
    #[serde(default)]
    pub coppa: bool,
    /// Host library version reported to exchanges that ask for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_version: Option<String>,
}

impl AuctionContext {
    /// Look up a path inside `ortb2`.
    #[must_use]
    pub fn ortb2_path(&self, path: &[&str]) -> Option<&Json> {
        let mut current = &self.ortb2;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    #[must_use]
    pub fn user_id(&self, source: &str) -> Option<&UserIdEntry> {
        self.user_ids.iter().find(|entry| entry.source == source)
    }
}

// ============================================================================
// Derived blocks
// ============================================================================

/// Site block derived from the referer information.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SiteContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// Query string of the page, including the leading `?`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl SiteContext {
    #[must_use]
    pub fn from_auction(ctx: &AuctionContext) -> Self {
        let page = ctx.referer.page.clone();
        let parsed = page.as_deref().and_then(|page| url::Url::parse(page).ok());

        let domain = ctx.referer.domain.clone().or_else(|| {
            parsed
                .as_ref()
                .and_then(|url| url.host_str().map(str::to_string))
        });
        let search = parsed
            .as_ref()
            .and_then(url::Url::query)
            .filter(|query| !query.is_empty())
            .map(|query| format!("?{query}"));

        Self {
            page,
            domain,
            referrer: ctx.referer.r#ref.clone(),
            search,
        }
    }
}

/// OpenRTB device type codes inferred from the user agent.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(into = "u8")]
pub enum DeviceType {
    MobileTablet,
    PersonalComputer,
    ConnectedTv,
}

impl From<DeviceType> for u8 {
    fn from(value: DeviceType) -> Self {
        match value {
            DeviceType::MobileTablet => 1,
            DeviceType::PersonalComputer => 2,
            DeviceType::ConnectedTv => 3,
        }
    }
}

static MOBILE_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(ios|ipod|ipad|iphone|android)").expect("mobile UA regex should compile")
});

static CTV_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(smart[-]?tv|hbbtv|appletv|googletv|hdmi|netcast\.tv|viera|nettv|roku|\bdtv\b|sonydtv|inettvbrowser|\btv\b)",
    )
    .expect("CTV UA regex should compile")
});

impl DeviceType {
    #[must_use]
    pub fn from_user_agent(user_agent: &str) -> Self {
        if MOBILE_UA.is_match(user_agent) {
            Self::MobileTablet
        } else if CTV_UA.is_match(user_agent) {
            Self::ConnectedTv
        } else {
            Self::PersonalComputer
        }
    }
}

/// Device block derived from [`DeviceSignals`] and `ortb2.device`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DeviceContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub dnt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devicetype: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
}

impl DeviceContext {
    #[must_use]
    pub fn from_auction(ctx: &AuctionContext) -> Self {
        let ua = ctx.device.user_agent.clone().or_else(|| {
            ctx.ortb2_path(&["device", "ua"])
                .and_then(Json::as_str)
                .map(str::to_string)
        });
        let language = ctx.device.language.clone().or_else(|| {
            ctx.ortb2_path(&["device", "language"])
                .and_then(Json::as_str)
                .map(str::to_string)
        });
        let json_u32 = |key: &str| {
            ctx.ortb2_path(&["device", key])
                .and_then(Json::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };

        Self {
            devicetype: ua.as_deref().map(DeviceType::from_user_agent),
            ua,
            language,
            dnt: ctx.device.do_not_track,
            connection_type: ctx.device.connection_type.clone(),
            w: ctx.device.screen_width.or_else(|| json_u32("w")),
            h: ctx.device.screen_height.or_else(|| json_u32("h")),
        }
    }
}

/// Privacy block copied verbatim from the consent signals.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PrivacyContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdpr_applies: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addtl_consent: Option<String>,
    pub purpose_one_consent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us_privacy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpp: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gpp_sid: Vec<i32>,
    pub coppa: bool,
}

impl PrivacyContext {
    /// Consent strings come from the consent signals; GPP falls back to
    /// `ortb2.regs.gpp` / `ortb2.regs.gpp_sid`.
    #[must_use]
    pub fn from_auction(ctx: &AuctionContext) -> Self {
        let gdpr = ctx.consent.gdpr.as_ref();
        let consent_gpp = ctx
            .consent
            .gpp
            .as_ref()
            .and_then(|gpp| gpp.gpp_string.clone().map(|s| (s, gpp.applicable_sections.clone())));

        let (gpp, gpp_sid) = match consent_gpp {
            Some((gpp, sid)) => (Some(gpp), sid),
            None => {
                let gpp = ctx
                    .ortb2_path(&["regs", "gpp"])
                    .and_then(Json::as_str)
                    .map(str::to_string);
                let sid = ctx
                    .ortb2_path(&["regs", "gpp_sid"])
                    .and_then(Json::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(Json::as_i64)
                            .filter_map(|v| i32::try_from(v).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                (gpp, sid)
            }
        };

        Self {
            gdpr_applies: gdpr.and_then(|g| g.gdpr_applies),
            consent_string: gdpr.and_then(|g| g.consent_string.clone()),
            addtl_consent: gdpr.and_then(|g| g.addtl_consent.clone()),
            purpose_one_consent: ctx.consent.has_purpose_one_consent(),
            us_privacy: ctx.consent.us_privacy.clone(),
            gpp,
            gpp_sid,
            coppa: ctx.coppa,
        }
    }

    /// `regs.ext.gdpr` style flag.
    #[must_use]
    pub fn gdpr_flag(&self) -> Option<u8> {
        self.gdpr_applies.map(u8::from)
    }

    /// GDPR applies and storage consent was not given.
    #[must_use]
    pub fn restricts_storage(&self) -> bool {
        self.gdpr_applies == Some(true) && !self.purpose_one_consent
    }

    /// Parse the additional-consent string `1~7.12.35` into provider ids.
    #[must_use]
    pub fn addtl_consent_ids(&self) -> Vec<u64> {
        let Some(addtl) = self.addtl_consent.as_deref() else {
            return Vec::new();
        };
        let Some((_, providers)) = addtl.split_once('~') else {
            return Vec::new();
        };
        providers
            .split('.')
            .filter_map(|id| id.trim().parse::<u64>().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::auction_context;
    use serde_json::json;

    #[test]
    fn test_site_context_from_referer() {
        let ctx = auction_context(json!({
            "referer": {
                "page": "https://news.example.com/article?utm_source=x&id=4",
                "ref": "https://search.example"
            }
        }));
        let site = SiteContext::from_auction(&ctx);

        assert_eq!(site.domain.as_deref(), Some("news.example.com"));
        assert_eq!(site.search.as_deref(), Some("?utm_source=x&id=4"));
        assert_eq!(site.referrer.as_deref(), Some("https://search.example"));
    }

    #[test]
    fn test_device_type_from_user_agent() {
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X)"),
            DeviceType::MobileTablet
        );
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (Linux; Tizen 2.3) SmartTV Safari"),
            DeviceType::ConnectedTv
        );
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0"),
            DeviceType::PersonalComputer
        );
    }

    #[test]
    fn test_privacy_context_passes_strings_verbatim() {
        let ctx = auction_context(json!({
            "consent": {
                "gdpr": {
                    "consentString": "BOJ/P2HOJ/P2HABABMAAAAAZ+A==",
                    "gdprApplies": true,
                    "addtlConsent": "1~7.12.35.62.66.70.89.93.108",
                    "purposeOneConsent": false
                },
                "usPrivacy": "1YNN"
            },
            "ortb2": { "regs": { "gpp": "DBACNYA~CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA~1NNN", "gpp_sid": [7] } }
        }));
        let privacy = PrivacyContext::from_auction(&ctx);

        assert_eq!(privacy.consent_string.as_deref(), Some("BOJ/P2HOJ/P2HABABMAAAAAZ+A=="));
        assert_eq!(privacy.us_privacy.as_deref(), Some("1YNN"));
        assert_eq!(privacy.gpp_sid, vec![7]);
        assert!(privacy.restricts_storage());
        assert_eq!(privacy.gdpr_flag(), Some(1));
        assert_eq!(
            privacy.addtl_consent_ids(),
            vec![7, 12, 35, 62, 66, 70, 89, 93, 108]
        );
    }

    #[test]
    fn test_purpose_one_defaults_to_allowed_without_gdpr() {
        let ctx = auction_context(json!({}));
        assert!(ctx.consent.has_purpose_one_consent());
        assert!(!PrivacyContext::from_auction(&ctx).restricts_storage());
    }
}
