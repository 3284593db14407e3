//! Settings loading and per-module configuration lookup.
//!
//! Settings are read from TOML and merged with environment variables prefixed
//! with `HB_TRANSFORM__`. For example `HB_TRANSFORM__BIDDERS__APPNEXUS__ENABLED=false`
//! overrides `bidders.appnexus.enabled`.

use std::collections::BTreeMap;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use validator::Validate;

use crate::error::TransformError;
use crate::keywords::TaxonomyMap;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "HB_TRANSFORM";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

/// Implemented by every bidder, RTD and user-ID configuration block.
pub trait IntegrationConfig: DeserializeOwned + Validate {
    fn is_enabled(&self) -> bool;
}

/// Keyword aggregation settings.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct KeywordSettings {
    /// Maps an audience segment taxonomy id to the keyword key its segments
    /// are merged under.
    #[serde(default = "default_segment_taxonomies")]
    pub segment_taxonomies: BTreeMap<String, String>,
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self {
            segment_taxonomies: default_segment_taxonomies(),
        }
    }
}

fn default_segment_taxonomies() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("526".to_string(), "1plusX".to_string()),
        ("527".to_string(), "1plusX".to_string()),
        ("540".to_string(), "perid".to_string()),
        ("541".to_string(), "perid".to_string()),
    ])
}

impl KeywordSettings {
    /// Taxonomy table with numeric ids. Keys that are not numbers are skipped.
    #[must_use]
    pub fn taxonomy_map(&self) -> TaxonomyMap {
        let mut map = TaxonomyMap::empty();
        for (id, key) in &self.segment_taxonomies {
            match id.trim().parse::<u32>() {
                Ok(id) => map.insert(id, key.clone()),
                Err(_) => log::warn!("Ignoring non-numeric segment taxonomy id '{}'", id),
            }
        }
        map
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct Settings {
    /// Raw `[bidders.<code>]` tables, decoded on demand by each adapter.
    #[serde(default)]
    pub bidders: BTreeMap<String, Json>,
    /// Raw `[rtd.<name>]` tables.
    #[serde(default)]
    pub rtd: BTreeMap<String, Json>,
    /// Raw `[user_id.<name>]` tables.
    #[serde(default)]
    pub user_id: BTreeMap<String, Json>,
    #[serde(default)]
    #[validate(nested)]
    pub keywords: KeywordSettings,
}

impl Settings {
    /// Parse settings from a TOML string and merge environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Configuration`] when the TOML is malformed or
    /// the merged configuration does not deserialize.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<TransformError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR)
            .try_parsing(true);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(TransformError::Configuration {
                message: "Failed to build configuration".to_string(),
            })?;

        let settings: Self =
            config
                .try_deserialize()
                .change_context(TransformError::Configuration {
                    message: "Failed to deserialize configuration".to_string(),
                })?;

        settings.validate().map_err(|err| {
            Report::new(TransformError::Configuration {
                message: format!("Settings validation failed: {err}"),
            })
        })?;

        Ok(settings)
    }

    /// Look up and validate the `[bidders.<code>]` block.
    ///
    /// Returns `Ok(None)` when the block is absent or disabled.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Configuration`] when the block is present but
    /// malformed or fails validation.
    pub fn bidder_config<T: IntegrationConfig>(
        &self,
        code: &str,
    ) -> Result<Option<T>, Report<TransformError>> {
        section_config(&self.bidders, "bidders", code)
    }

    /// Look up and validate the `[rtd.<name>]` block.
    ///
    /// # Errors
    ///
    /// See [`Settings::bidder_config`].
    pub fn rtd_config<T: IntegrationConfig>(
        &self,
        name: &str,
    ) -> Result<Option<T>, Report<TransformError>> {
        section_config(&self.rtd, "rtd", name)
    }

    /// Look up and validate the `[user_id.<name>]` block.
    ///
    /// # Errors
    ///
    /// See [`Settings::bidder_config`].
    pub fn user_id_config<T: IntegrationConfig>(
        &self,
        name: &str,
    ) -> Result<Option<T>, Report<TransformError>> {
        section_config(&self.user_id, "user_id", name)
    }
}

fn section_config<T: IntegrationConfig>(
    section: &BTreeMap<String, Json>,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, Report<TransformError>> {
    let Some(raw) = section.get(key) else {
        return Ok(None);
    };

    let config: T =
        serde_json::from_value(raw.clone()).change_context(TransformError::Configuration {
            message: format!("Invalid configuration for {section_name}.{key}"),
        })?;

    config.validate().map_err(|err| {
        Report::new(TransformError::Configuration {
            message: format!("{section_name}.{key} failed validation: {err}"),
        })
    })?;

    if !config.is_enabled() {
        return Ok(None);
    }

    Ok(Some(config))
}

/// Deserialize an identifier the host may send either as a string or a number.
///
/// # Errors
///
/// Fails for any JSON type other than string or integer.
pub fn string_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl Visitor<'_> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer identifier")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Optional variant of [`string_from_string_or_number`].
///
/// # Errors
///
/// Fails for any JSON type other than null, string or integer.
pub fn option_string_from_string_or_number<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "string_from_string_or_number")] String);

    Option::<Wrapper>::deserialize(deserializer).map(|wrapper| wrapper.map(|w| w.0))
}
