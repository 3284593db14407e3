//! MediaWallah OpenLink id.
//!
//! The id lives in the `mwol` cookie as `eid:<id>,ibaOptout:1,ccpaOptout:1`
//! (URL-encoded). A missing cookie gets a fresh UUID. Every lookup rewrites
//! the cookie and yields a registration pixel for the host to fire.

use std::sync::Arc;

use chrono::{Duration, Utc};
use error_stack::Report;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use uuid::Uuid;
use validator::Validate;

use super::{EidSource, IdResult, IdStorage, UserIdSubmodule};
use crate::error::TransformError;
use crate::settings::{option_string_from_string_or_number, IntegrationConfig, Settings};

const SUBMODULE_NAME: &str = "mwOpenLinkId";
const CONFIG_KEY: &str = "mw_open_link";
const COOKIE_NAME: &str = "mwol";
const COOKIE_LIFETIME_DAYS: i64 = 365;
const PIXEL_URL: &str = "https://ol.mediawallahscript.com/";

const EID_SOURCE: EidSource = EidSource {
    key: SUBMODULE_NAME,
    source: "mediawallahscript.com",
    atype: 1,
};

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct MwOpenLinkConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(
        default,
        alias = "accountId",
        deserialize_with = "option_string_from_string_or_number"
    )]
    #[validate(required, length(min = 1))]
    pub account_id: Option<String>,
    #[serde(
        default,
        alias = "partnerId",
        deserialize_with = "option_string_from_string_or_number"
    )]
    #[validate(required, length(min = 1))]
    pub partner_id: Option<String>,
    /// Publisher-side user id forwarded on the registration pixel.
    #[serde(default, deserialize_with = "option_string_from_string_or_number")]
    pub uid: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl IntegrationConfig for MwOpenLinkConfig {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Parsed `mwol` cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MwOlId {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eid: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub iba_optout: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ccpa_optout: bool,
}

impl MwOlId {
    #[must_use]
    pub fn generate() -> Self {
        Self {
            eid: Some(Uuid::new_v4().to_string()),
            ..Self::default()
        }
    }

    /// Parse the decoded cookie body. Unknown components are ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut id = Self::default();
        for component in raw.split(',') {
            let (key, value) = component.split_once(':').unwrap_or((component, ""));
            match key {
                "eid" if !value.is_empty() => id.eid = Some(value.to_string()),
                "ibaOptout" => id.iba_optout = value == "1",
                "ccpaOptout" => id.ccpa_optout = value == "1",
                _ => {}
            }
        }
        id
    }

    /// Cookie body before URL encoding.
    #[must_use]
    pub fn serialize_cookie(&self) -> String {
        let mut components = Vec::with_capacity(3);
        if let Some(eid) = &self.eid {
            components.push(format!("eid:{eid}"));
        }
        if self.iba_optout {
            components.push("ibaOptout:1".to_string());
        }
        if self.ccpa_optout {
            components.push("ccpaOptout:1".to_string());
        }
        components.join(",")
    }
}

pub struct MwOpenLinkSubmodule {
    config: MwOpenLinkConfig,
}

impl MwOpenLinkSubmodule {
    #[must_use]
    pub fn new(config: MwOpenLinkConfig) -> Self {
        Self { config }
    }

    fn read_cookie(storage: &dyn IdStorage) -> Option<MwOlId> {
        let raw = storage.get_cookie(COOKIE_NAME)?;
        let decoded = match urlencoding::decode(&raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(e) => {
                log::warn!("mwOpenLinkId: ignoring undecodable cookie: {}", e);
                return None;
            }
        };
        Some(MwOlId::parse(&decoded))
    }

    fn write_cookie(storage: &dyn IdStorage, id: &MwOlId) {
        let value = urlencoding::encode(&id.serialize_cookie()).into_owned();
        let expires = Utc::now() + Duration::days(COOKIE_LIFETIME_DAYS);
        storage.set_cookie(COOKIE_NAME, &value, expires, "lax");
    }

    /// Registration pixel for `olid`.
    #[must_use]
    pub fn pixel_url(&self, olid: &str) -> String {
        let cache_buster: f64 = rand::thread_rng().gen();
        format!(
            "{PIXEL_URL}?account_id={}&partner_id={}&uid={}&olid={}&cb={}",
            urlencoding::encode(self.config.account_id.as_deref().unwrap_or_default()),
            urlencoding::encode(self.config.partner_id.as_deref().unwrap_or_default()),
            urlencoding::encode(self.config.uid.as_deref().unwrap_or_default()),
            urlencoding::encode(olid),
            cache_buster
        )
    }

    fn is_valid_config(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        if !present(&self.config.account_id) {
            log::error!("User ID - mwOlId submodule requires accountId to be defined");
            return false;
        }
        if !present(&self.config.partner_id) {
            log::error!("User ID - mwOlId submodule requires partnerId to be defined");
            return false;
        }
        true
    }
}

impl UserIdSubmodule for MwOpenLinkSubmodule {
    fn name(&self) -> &'static str {
        SUBMODULE_NAME
    }

    fn get_id(&self, storage: &dyn IdStorage) -> Result<Option<IdResult>, Report<TransformError>> {
        if !self.is_valid_config() {
            return Ok(None);
        }

        let id = Self::read_cookie(storage)
            .filter(|id| id.eid.is_some())
            .unwrap_or_else(MwOlId::generate);
        Self::write_cookie(storage, &id);

        let Some(eid) = id.eid.as_deref() else {
            return Err(Report::new(TransformError::UserId {
                message: "mwOpenLinkId produced no eid".to_string(),
            }));
        };
        let pixel_url = self.pixel_url(eid);

        let value = serde_json::to_value(&id).map_err(|e| {
            Report::new(TransformError::UserId {
                message: format!("failed to serialize mwOpenLinkId: {e}"),
            })
        })?;
        Ok(Some(IdResult {
            id: value,
            pixel_url: Some(pixel_url),
        }))
    }

    fn decode(&self, value: &Json) -> Option<Json> {
        let eid = value.as_object()?.get("eid")?.as_str()?;
        if eid.is_empty() {
            return None;
        }
        Some(json!({ SUBMODULE_NAME: eid }))
    }

    fn eid_source(&self) -> EidSource {
        EID_SOURCE
    }
}

/// Register the submodule when `[user_id.mw_open_link]` is present and enabled.
#[must_use]
pub fn register_submodules(settings: &Settings) -> Vec<Arc<dyn UserIdSubmodule>> {
    let mut submodules: Vec<Arc<dyn UserIdSubmodule>> = Vec::new();

    match settings.user_id_config::<MwOpenLinkConfig>(CONFIG_KEY) {
        Ok(Some(config)) => {
            log::info!("Registering mwOpenLinkId user ID submodule");
            submodules.push(Arc::new(MwOpenLinkSubmodule::new(config)));
        }
        Ok(None) => {
            log::debug!("mwOpenLinkId config absent or disabled");
        }
        Err(e) => {
            log::error!("Failed to load mwOpenLinkId configuration: {:?}", e);
        }
    }

    submodules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::userid::MemoryIdStorage;

    fn submodule() -> MwOpenLinkSubmodule {
        MwOpenLinkSubmodule::new(MwOpenLinkConfig {
            enabled: true,
            account_id: Some("1000".to_string()),
            partner_id: Some("2000".to_string()),
            uid: Some("publisher-uid".to_string()),
        })
    }

    #[test]
    fn test_cookie_format() {
        let id = MwOlId {
            eid: Some("abc-123".to_string()),
            iba_optout: true,
            ccpa_optout: true,
        };
        assert_eq!(id.serialize_cookie(), "eid:abc-123,ibaOptout:1,ccpaOptout:1");
        assert_eq!(MwOlId::parse("eid:abc-123,ibaOptout:1,ccpaOptout:1"), id);

        let partial = MwOlId::parse("eid:xyz,ibaOptout:0,other:5");
        assert_eq!(partial.eid.as_deref(), Some("xyz"));
        assert!(!partial.iba_optout);
        assert!(!partial.ccpa_optout);
    }

    #[test]
    fn test_get_id_creates_and_persists_id() {
        let storage = MemoryIdStorage::new();
        let result = submodule()
            .get_id(&storage)
            .expect("should not fail")
            .expect("should produce an id");

        let eid = result.id["eid"].as_str().expect("should have eid").to_string();
        assert!(Uuid::parse_str(&eid).is_ok());

        let cookie = storage.cookie("mwol").expect("should write cookie");
        assert_eq!(cookie.value, format!("eid%3A{eid}"));
        assert_eq!(cookie.same_site, "lax");
        let lifetime = cookie.expires - Utc::now();
        assert!(lifetime > Duration::days(364) && lifetime <= Duration::days(365));

        let pixel = result.pixel_url.expect("should return pixel");
        assert!(pixel.starts_with(&format!(
            "https://ol.mediawallahscript.com/?account_id=1000&partner_id=2000&uid=publisher-uid&olid={eid}&cb="
        )));
    }

    #[test]
    fn test_get_id_reuses_stored_id() {
        let storage = MemoryIdStorage::new();
        storage.set_cookie("mwol", "eid%3Astored-id%2CibaOptout%3A1", Utc::now(), "lax");

        let result = submodule()
            .get_id(&storage)
            .expect("should not fail")
            .expect("should produce an id");

        assert_eq!(result.id, json!({ "eid": "stored-id", "ibaOptout": true }));
        assert_eq!(
            storage.get_cookie("mwol").as_deref(),
            Some("eid%3Astored-id%2CibaOptout%3A1")
        );
    }

    #[test]
    fn test_invalid_config_yields_nothing() {
        let missing_partner = MwOpenLinkSubmodule::new(MwOpenLinkConfig {
            enabled: true,
            account_id: Some("1000".to_string()),
            ..MwOpenLinkConfig::default()
        });
        let storage = MemoryIdStorage::new();

        assert!(missing_partner.get_id(&storage).expect("should not fail").is_none());
        assert!(storage.get_cookie("mwol").is_none());
        assert!(MwOpenLinkConfig::default().validate().is_err());
    }

    #[test]
    fn test_decode_and_eid() {
        let module = submodule();
        let decoded = module
            .decode(&json!({ "eid": "abc-123" }))
            .expect("should decode");
        assert_eq!(decoded, json!({ "mwOpenLinkId": "abc-123" }));
        assert!(module.decode(&json!("abc-123")).is_none());
        assert!(module.decode(&json!({ "ibaOptout": true })).is_none());

        let eid = module.to_eid(&decoded).expect("should map to eid");
        assert_eq!(
            serde_json::to_value(eid).expect("should serialize"),
            json!({ "source": "mediawallahscript.com", "uids": [{ "id": "abc-123", "atype": 1 }] })
        );
    }
}
