//! Declarative re-encoding of the user identity envelope.
//!
//! Each exchange wants the same `{source, uids}` envelope in a different
//! shape. Adapters describe the shape with an [`IdentitySchema`]; this module
//! does the copying.

use serde_json::{json, Map, Value as Json};

use crate::auction::context::UserIdEntry;

/// Copy one source's first id into a flat field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatField {
    /// Envelope source, e.g. `"uidapi.com"`.
    pub source: &'static str,
    pub field: &'static str,
    /// Also copy `uids[0].ext.<key>` into the named field.
    pub ext: Option<(&'static str, &'static str)>,
}

impl FlatField {
    #[must_use]
    pub const fn new(source: &'static str, field: &'static str) -> Self {
        Self {
            source,
            field,
            ext: None,
        }
    }

    #[must_use]
    pub const fn with_ext(mut self, ext_key: &'static str, field: &'static str) -> Self {
        self.ext = Some((ext_key, field));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySchema {
    /// The exchange takes no identity block.
    None,
    /// Object of named fields, one per known source.
    Flat(&'static [FlatField]),
    /// `[{source, id, rti_partner?}]`, one entry per uid.
    EidList {
        rti_partners: &'static [(&'static str, &'static str)],
    },
    /// OpenRTB `user.ext.eids`, copied unchanged.
    OpenRtbEids,
}

/// Re-encode `user_ids` with `schema`. `None` when nothing was copied.
#[must_use]
pub fn encode(schema: &IdentitySchema, user_ids: &[UserIdEntry]) -> Option<Json> {
    let encoded = match schema {
        IdentitySchema::None => return None,
        IdentitySchema::Flat(fields) => encode_flat(fields, user_ids),
        IdentitySchema::EidList { rti_partners } => encode_eid_list(rti_partners, user_ids),
        IdentitySchema::OpenRtbEids => {
            let eids: Vec<Json> = user_ids
                .iter()
                .filter(|entry| !entry.uids.is_empty())
                .filter_map(|entry| serde_json::to_value(entry).ok())
                .collect();
            Json::Array(eids)
        }
    };

    match &encoded {
        Json::Array(items) if items.is_empty() => None,
        Json::Object(map) if map.is_empty() => None,
        _ => Some(encoded),
    }
}

fn encode_flat(fields: &[FlatField], user_ids: &[UserIdEntry]) -> Json {
    let mut out = Map::new();
    for field in fields {
        let Some(uid) = user_ids
            .iter()
            .find(|entry| entry.source == field.source)
            .and_then(UserIdEntry::first_uid)
        else {
            continue;
        };
        out.insert(field.field.to_string(), Json::String(uid.id.clone()));

        if let Some((ext_key, target)) = field.ext {
            if let Some(value) = uid.ext.as_ref().and_then(|ext| ext.get(ext_key)) {
                out.insert(target.to_string(), value.clone());
            }
        }
    }
    Json::Object(out)
}

fn encode_eid_list(rti_partners: &[(&str, &str)], user_ids: &[UserIdEntry]) -> Json {
    let mut eids = Vec::new();
    for entry in user_ids {
        let partner = rti_partners
            .iter()
            .find(|(source, _)| *source == entry.source)
            .map(|(_, partner)| *partner);
        for uid in &entry.uids {
            let mut eid = json!({ "source": entry.source, "id": uid.id });
            if let Some(partner) = partner {
                eid["rti_partner"] = json!(partner);
            }
            eids.push(eid);
        }
    }
    Json::Array(eids)
}
