//! Keyword and audience segment aggregation.
//!
//! Keywords from every source are folded into one ordered [`KeywordSet`].
//! Later sources append to earlier values for the same key and never replace
//! them. Values are de-duplicated in first-seen order. A key with no values is
//! a "bare" keyword and stays in the set.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as Json;

use crate::diagnostics::{Component, Diagnostic, DiagnosticSink};

/// One key and its ordered, de-duplicated values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordEntry {
    pub key: String,
    #[serde(rename = "value", skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Ordered keyword collection. Serializes as `[{"key": .., "value": [..]}]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeywordSet {
    entries: Vec<KeywordEntry>,
}

impl KeywordSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    /// Values recorded for `key`, `None` when the key is absent.
    #[must_use]
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.values.as_slice())
    }

    fn entry_mut(&mut self, key: &str) -> &mut KeywordEntry {
        let index = match self.entries.iter().position(|entry| entry.key == key) {
            Some(index) => index,
            None => {
                self.entries.push(KeywordEntry {
                    key: key.to_string(),
                    values: Vec::new(),
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    /// Record `key` without adding a value.
    pub fn add_bare(&mut self, key: &str) {
        if key.is_empty() {
            return;
        }
        self.entry_mut(key);
    }

    /// Append `value` under `key` unless already present.
    pub fn add_value(&mut self, key: &str, value: &str) {
        if key.is_empty() {
            return;
        }
        let entry = self.entry_mut(key);
        if !entry.values.iter().any(|existing| existing == value) {
            entry.values.push(value.to_string());
        }
    }

    /// Fold `other` into `self` keeping accumulate-don't-overwrite order.
    pub fn extend(&mut self, other: &KeywordSet) {
        for entry in &other.entries {
            if entry.values.is_empty() {
                self.add_bare(&entry.key);
            }
            for value in &entry.values {
                self.add_value(&entry.key, value);
            }
        }
    }

    /// Merge an ordered sequence of sources.
    #[must_use]
    pub fn merge<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = KeywordSet>,
    {
        sources.into_iter().fold(Self::new(), |mut merged, source| {
            merged.extend(&source);
            merged
        })
    }

    /// Build from a `{key: value | [values]}` map.
    ///
    /// Strings and numbers become values; `""` and `[""]` make a bare
    /// keyword; objects (and objects inside arrays) are dropped with a
    /// diagnostic.
    pub fn from_json_map(map: &Json, sink: &dyn DiagnosticSink) -> Self {
        let mut set = Self::new();
        let Some(object) = map.as_object() else {
            if !map.is_null() {
                sink.report(Diagnostic::warn(
                    Component::Keywords,
                    "keywords",
                    "keyword source is not an object; ignored",
                ));
            }
            return set;
        };

        for (key, value) in object {
            match value {
                Json::Array(items) => {
                    let mut added = false;
                    let mut only_empty = true;
                    for item in items {
                        match scalar_to_string(item) {
                            Some(s) if s.is_empty() => {}
                            Some(s) => {
                                set.add_value(key, &s);
                                added = true;
                                only_empty = false;
                            }
                            None => {
                                only_empty = false;
                                sink.report(Diagnostic::warn(
                                    Component::Keywords,
                                    key.as_str(),
                                    "non-scalar keyword value dropped",
                                ));
                            }
                        }
                    }
                    if !added && only_empty {
                        set.add_bare(key);
                    }
                }
                Json::Null => set.add_bare(key),
                other => match scalar_to_string(other) {
                    Some(s) if s.is_empty() => set.add_bare(key),
                    Some(s) => set.add_value(key, &s),
                    None => sink.report(Diagnostic::warn(
                        Component::Keywords,
                        key.as_str(),
                        "non-scalar keyword value dropped",
                    )),
                },
            }
        }
        set
    }
}

fn scalar_to_string(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse the comma-separated form `"a=b, c, d=e"`. Pairs with `=` add a
/// value, anything else is a bare keyword.
#[must_use]
pub fn parse_keyword_string(keywords: &str) -> KeywordSet {
    let mut set = KeywordSet::new();
    for part in keywords.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((key, value)) if !value.trim().is_empty() => {
                set.add_value(key.trim(), value.trim());
            }
            Some((key, _)) => set.add_bare(key.trim()),
            None => set.add_bare(part),
        }
    }
    set
}

/// Keyword strings from first-party data, in this order: `site`,
/// `site.content`, `user`, `app`, `app.content`.
#[must_use]
pub fn from_ortb2(ortb2: &Json) -> KeywordSet {
    const PATHS: [&[&str]; 5] = [
        &["site", "keywords"],
        &["site", "content", "keywords"],
        &["user", "keywords"],
        &["app", "keywords"],
        &["app", "content", "keywords"],
    ];

    let sources = PATHS.iter().filter_map(|path| {
        path.iter()
            .try_fold(ortb2, |node, segment| node.get(segment))
            .and_then(Json::as_str)
            .map(parse_keyword_string)
    });
    KeywordSet::merge(sources)
}

// ============================================================================
// Segment taxonomies
// ============================================================================

/// Maps a segment taxonomy id to the synthetic keyword its segments are
/// merged under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyMap {
    keys: BTreeMap<u32, String>,
}

impl Default for TaxonomyMap {
    fn default() -> Self {
        let mut map = Self::empty();
        map.insert(526, "1plusX".to_string());
        map.insert(527, "1plusX".to_string());
        map.insert(540, "perid".to_string());
        map.insert(541, "perid".to_string());
        map
    }
}

impl TaxonomyMap {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            keys: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, taxonomy: u32, key: String) {
        self.keys.insert(taxonomy, key);
    }

    #[must_use]
    pub fn key_for(&self, taxonomy: u32) -> Option<&str> {
        self.keys.get(&taxonomy).map(String::as_str)
    }
}

fn segtax(data: &Json) -> Option<u32> {
    match data.get("ext")?.get("segtax")? {
        Json::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn add_segments(set: &mut KeywordSet, data: Option<&Json>, taxonomies: &TaxonomyMap) {
    let Some(entries) = data.and_then(Json::as_array) else {
        return;
    };
    for entry in entries {
        let Some(taxonomy) = segtax(entry) else {
            continue;
        };
        let Some(key) = taxonomies.key_for(taxonomy) else {
            log::debug!("Dropping segments with unmapped taxonomy {}", taxonomy);
            continue;
        };
        let segments = entry.get("segment").and_then(Json::as_array);
        for id in segments.into_iter().flatten().filter_map(|s| s.get("id")) {
            if let Some(id) = scalar_to_string(id).filter(|id| !id.is_empty()) {
                set.add_value(key, &id);
            }
        }
    }
}

/// Audience segments from `user.data` then `site.content.data`, keyed by the
/// taxonomy table. Segments with an unmapped taxonomy are skipped.
#[must_use]
pub fn segment_sources(ortb2: &Json, taxonomies: &TaxonomyMap) -> KeywordSet {
    let mut set = KeywordSet::new();
    add_segments(
        &mut set,
        ortb2.get("user").and_then(|user| user.get("data")),
        taxonomies,
    );
    add_segments(
        &mut set,
        ortb2
            .get("site")
            .and_then(|site| site.get("content"))
            .and_then(|content| content.get("data")),
        taxonomies,
    );
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use serde_json::json;

    fn set_of(pairs: &[(&str, &[&str])]) -> KeywordSet {
        let mut set = KeywordSet::new();
        for (key, values) in pairs {
            if values.is_empty() {
                set.add_bare(key);
            }
            for value in *values {
                set.add_value(key, value);
            }
        }
        set
    }

    #[test]
    fn test_merge_accumulates_and_dedupes() {
        let first = set_of(&[("k", &["a", "b"]), ("other", &["x"])]);
        let second = set_of(&[("k", &["b", "c"]), ("new", &[])]);

        let merged = KeywordSet::merge([first, second]);

        assert_eq!(
            merged.values("k"),
            Some(["a", "b", "c"].map(String::from).as_slice())
        );
        assert_eq!(merged.values("new"), Some([].as_slice()));
        let keys: Vec<_> = merged.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["k", "other", "new"]);
    }

    #[test]
    fn test_bare_keyword_gains_values_later() {
        let merged = KeywordSet::merge([set_of(&[("k", &[])]), set_of(&[("k", &["v"])])]);
        assert_eq!(merged.values("k"), Some(["v".to_string()].as_slice()));
    }

    #[test]
    fn test_from_json_map_value_shapes() {
        let sink = CollectingSink::new();
        let set = KeywordSet::from_json_map(
            &json!({
                "single": "val",
                "singleArr": ["val"],
                "singleArrNum": [5],
                "multiValMixed": ["value1", 2, "value3"],
                "singleValNum": 123,
                "emptyStr": "",
                "emptyArr": [""],
                "badValue": { "foo": "bar" }
            }),
            &sink,
        );

        let wire = serde_json::to_value(&set).expect("should serialize");
        let entries = wire.as_array().expect("should be an array");
        assert_eq!(entries.len(), 7);
        assert_eq!(set.values("singleArrNum"), Some(["5".to_string()].as_slice()));
        assert_eq!(
            set.values("multiValMixed"),
            Some(["value1", "2", "value3"].map(String::from).as_slice())
        );
        assert_eq!(set.values("emptyStr"), Some([].as_slice()));
        assert_eq!(set.values("emptyArr"), Some([].as_slice()));
        assert_eq!(set.values("badValue"), None);
        assert_eq!(sink.count_for(Component::Keywords), 1);

        let bare = entries
            .iter()
            .find(|e| e["key"] == "emptyStr")
            .expect("should have bare key");
        assert!(bare.get("value").is_none());
    }

    #[test]
    fn test_parse_keyword_string() {
        let set = parse_keyword_string("ortb2=yes,ortb2test, multiValMixed=4, singleValNum=456, ,k=");
        let keys: Vec<_> = set.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["ortb2", "ortb2test", "multiValMixed", "singleValNum", "k"]);
        assert_eq!(set.values("ortb2"), Some(["yes".to_string()].as_slice()));
        assert_eq!(set.values("ortb2test"), Some([].as_slice()));
    }

    #[test]
    fn test_map_keys_keep_declaration_order() {
        let sink = CollectingSink::new();
        let set = KeywordSet::from_json_map(
            &serde_json::from_str(r#"{"zeta": "1", "alpha": "2", "mid": ["3", "4"]}"#)
                .expect("should parse keyword map"),
            &sink,
        );

        let keys: Vec<_> = set.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            set.values("mid"),
            Some(["3".to_string(), "4".to_string()].as_slice())
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_auction_then_ortb2_keyword_order() {
        let sink = CollectingSink::new();
        let auction = KeywordSet::from_json_map(
            &json!({ "gender": "m", "music": ["rock", "pop"], "test": "", "tools": "power" }),
            &sink,
        );
        let ortb2 = from_ortb2(&json!({
            "site": {
                "keywords": "power tools, drills, tools=industrial",
                "content": { "keywords": "video, source=streaming" }
            },
            "user": { "keywords": "tools=home,renting" },
            "app": {
                "keywords": "app=iphone 11",
                "content": { "keywords": "appcontent=home repair, dyi" }
            }
        }));

        let merged = KeywordSet::merge([auction, ortb2]);
        let keys: Vec<_> = merged.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "gender", "music", "test", "tools", "power tools", "drills", "video", "source",
                "renting", "app", "appcontent", "dyi"
            ]
        );
        assert_eq!(
            merged.values("tools"),
            Some(["power", "industrial", "home"].map(String::from).as_slice())
        );
    }

    #[test]
    fn test_segments_by_taxonomy() {
        let ortb2 = json!({
            "site": {
                "keywords": "drill",
                "content": {
                    "data": [
                        { "name": "siteseg1", "ext": { "segtax": 540 }, "segment": [{ "id": "s123" }, { "id": "s234" }] },
                        { "name": "sitseg2", "ext": { "segtax": 1 }, "segment": [{ "id": "unknown" }] },
                        { "name": "siteseg3", "ext": { "segtax": 526 }, "segment": [{ "id": "dog" }] }
                    ]
                }
            },
            "user": {
                "data": [{ "name": "userseg1", "ext": { "segtax": 526 }, "segment": [{ "id": "cat" }] }]
            }
        });

        let merged = KeywordSet::merge([
            from_ortb2(&ortb2),
            segment_sources(&ortb2, &TaxonomyMap::default()),
        ]);

        let wire = serde_json::to_value(&merged).expect("should serialize");
        assert_eq!(
            wire,
            json!([
                { "key": "drill" },
                { "key": "1plusX", "value": ["cat", "dog"] },
                { "key": "perid", "value": ["s123", "s234"] }
            ])
        );
    }

    #[test]
    fn test_custom_taxonomy_map() {
        let mut taxonomies = TaxonomyMap::empty();
        taxonomies.insert(4, "iab".to_string());
        let ortb2 = json!({
            "user": { "data": [{ "ext": { "segtax": "4" }, "segment": [{ "id": 12 }] }] }
        });

        let set = segment_sources(&ortb2, &taxonomies);
        assert_eq!(set.values("iab"), Some(["12".to_string()].as_slice()));
    }
}
