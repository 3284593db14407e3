//! User-ID submodules.
//!
//! A submodule obtains or creates an identifier through host-owned storage,
//! decodes the stored value for bid requests and describes how the id is
//! exposed as an extended id (`user.ext.eids`) entry.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use error_stack::Report;
use serde_json::Value as Json;

use crate::auction::context::{Uid, UserIdEntry};
use crate::error::TransformError;
use crate::settings::Settings;

pub mod mw_open_link;

/// Cookie storage owned by the host.
pub trait IdStorage: Send + Sync {
    fn get_cookie(&self, name: &str) -> Option<String>;

    fn set_cookie(&self, name: &str, value: &str, expires: DateTime<Utc>, same_site: &str);
}

/// A stored cookie value with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub value: String,
    pub expires: DateTime<Utc>,
    pub same_site: String,
}

/// In-memory [`IdStorage`] for tests and offline hosts.
#[derive(Debug, Default)]
pub struct MemoryIdStorage {
    cookies: Mutex<BTreeMap<String, StoredCookie>>,
}

impl MemoryIdStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<StoredCookie> {
        self.cookies
            .lock()
            .ok()
            .and_then(|cookies| cookies.get(name).cloned())
    }

    /// Every stored cookie, keyed by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, StoredCookie> {
        self.cookies
            .lock()
            .map(|cookies| cookies.clone())
            .unwrap_or_default()
    }
}

impl IdStorage for MemoryIdStorage {
    fn get_cookie(&self, name: &str) -> Option<String> {
        self.cookie(name).map(|cookie| cookie.value)
    }

    fn set_cookie(&self, name: &str, value: &str, expires: DateTime<Utc>, same_site: &str) {
        if let Ok(mut cookies) = self.cookies.lock() {
            cookies.insert(
                name.to_string(),
                StoredCookie {
                    value: value.to_string(),
                    expires,
                    same_site: same_site.to_string(),
                },
            );
        }
    }
}

/// Result of [`UserIdSubmodule::get_id`].
#[derive(Debug, Clone, PartialEq)]
pub struct IdResult {
    /// Value handed back to [`UserIdSubmodule::decode`].
    pub id: Json,
    /// Registration pixel the host should fire.
    pub pixel_url: Option<String>,
}

/// How a decoded id maps onto an extended id entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EidSource {
    /// Key of the id inside the decoded object.
    pub key: &'static str,
    pub source: &'static str,
    pub atype: u32,
}

pub trait UserIdSubmodule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read or create the id.
    ///
    /// Returns `Ok(None)` when the submodule has nothing to contribute.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::UserId`] when a stored value cannot be
    /// processed.
    fn get_id(&self, storage: &dyn IdStorage) -> Result<Option<IdResult>, Report<TransformError>>;

    /// Decode the stored value into `{<key>: <id>}`.
    fn decode(&self, value: &Json) -> Option<Json>;

    fn eid_source(&self) -> EidSource;

    /// The decoded id as an extended id entry.
    fn to_eid(&self, decoded: &Json) -> Option<UserIdEntry> {
        let source = self.eid_source();
        let id = decoded.get(source.key)?.as_str()?;
        Some(UserIdEntry {
            source: source.source.to_string(),
            uids: vec![Uid {
                id: id.to_string(),
                atype: Some(source.atype),
                ext: None,
            }],
        })
    }
}

type SubmoduleBuilder = fn(&Settings) -> Vec<Arc<dyn UserIdSubmodule>>;

fn submodule_builders() -> &'static [SubmoduleBuilder] {
    &[mw_open_link::register_submodules]
}

/// Every enabled user-ID submodule.
#[derive(Clone, Default)]
pub struct UserIdModule {
    submodules: Vec<Arc<dyn UserIdSubmodule>>,
}

impl UserIdModule {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut submodules = Vec::new();
        for builder in submodule_builders() {
            submodules.extend(builder(settings));
        }
        Self { submodules }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.submodules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.submodules.is_empty()
    }

    /// Resolve every submodule's id into extended id entries, plus the
    /// pixels the host should fire. Failing submodules are logged and skipped.
    #[must_use]
    pub fn resolve(&self, storage: &dyn IdStorage) -> (Vec<UserIdEntry>, Vec<String>) {
        let mut eids = Vec::new();
        let mut pixels = Vec::new();

        for submodule in &self.submodules {
            match submodule.get_id(storage) {
                Ok(Some(result)) => {
                    if let Some(eid) = submodule
                        .decode(&result.id)
                        .and_then(|decoded| submodule.to_eid(&decoded))
                    {
                        eids.push(eid);
                    }
                    pixels.extend(result.pixel_url);
                }
                Ok(None) => {
                    log::debug!("User ID submodule {} returned no id", submodule.name());
                }
                Err(e) => {
                    log::warn!("User ID submodule {} failed: {:?}", submodule.name(), e);
                }
            }
        }

        (eids, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::create_test_settings;

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryIdStorage::new();
        assert!(storage.get_cookie("mwol").is_none());

        let expires = Utc::now();
        storage.set_cookie("mwol", "eid%3Aabc", expires, "lax");
        assert_eq!(storage.get_cookie("mwol").as_deref(), Some("eid%3Aabc"));
        assert_eq!(
            storage.cookie("mwol").map(|cookie| cookie.same_site),
            Some("lax".to_string())
        );
        assert_eq!(storage.snapshot().len(), 1);
    }

    #[test]
    fn test_module_resolves_eids_and_pixels() {
        let module = UserIdModule::from_settings(&create_test_settings());
        assert_eq!(module.len(), 1);

        let storage = MemoryIdStorage::new();
        let (eids, pixels) = module.resolve(&storage);

        assert_eq!(eids.len(), 1);
        assert_eq!(eids[0].source, "mediawallahscript.com");
        assert_eq!(eids[0].uids[0].atype, Some(1));
        assert_eq!(pixels.len(), 1);
        assert!(pixels[0].starts_with("https://ol.mediawallahscript.com/?account_id=1000&partner_id=2000"));
    }
}
