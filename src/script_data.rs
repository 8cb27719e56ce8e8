/// Data structures for stored user scripts
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Name used when a script has no `@name` directive
pub const DEFAULT_SCRIPT_NAME: &str = "Unnamed Script";

/// Value of a metadata directive: a single string, or all values in source
/// order when the directive repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Single(String),
    Many(Vec<String>),
}

impl MetaValue {
    /// Append another occurrence of the same directive
    pub fn push(&mut self, value: String) {
        match self {
            MetaValue::Single(first) => {
                let first = std::mem::take(first);
                *self = MetaValue::Many(vec![first, value]);
            }
            MetaValue::Many(values) => values.push(value),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            MetaValue::Single(value) => vec![value.as_str()],
            MetaValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.values().into_iter().next()
    }
}

/// A user script as persisted in `chrome.storage.local`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRecord {
    pub id: String,
    /// Older records may hold every value of a repeated `@name`
    #[serde(deserialize_with = "first_name")]
    pub name: String,
    /// Regex-ready patterns derived from the `@match` directives
    #[serde(default)]
    pub matches: Vec<String>,
    /// Script body with the metadata block removed
    pub code: String,
    /// Full original text, metadata block included
    #[serde(default)]
    pub source: String,
    pub enabled: bool,
    pub last_updated: f64,
    /// Remaining lowercase directives (`version`, `description`, `match`, ...)
    #[serde(flatten)]
    pub meta: BTreeMap<String, MetaValue>,
}

impl ScriptRecord {
    /// Key used for the in-page idempotency flag
    pub fn marker_key(&self) -> &str {
        if self.id.is_empty() { &self.name } else { &self.id }
    }
}

fn first_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = MetaValue::deserialize(deserializer)?;
    Ok(value
        .first()
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_SCRIPT_NAME)
        .to_string())
}

/// Payload of a `saveScript` command. Only `code` is authoritative; the rest is
/// what the popup pre-parsed and is ignored by the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewScript {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Milliseconds since the Unix epoch
#[cfg(target_arch = "wasm32")]
pub fn now_millis() -> f64 {
    js_sys::Date::now()
}

/// Milliseconds since the Unix epoch
#[cfg(not(target_arch = "wasm32"))]
pub fn now_millis() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_value_push() {
        let mut value = MetaValue::Single("a".to_string());
        value.push("b".to_string());
        value.push("c".to_string());

        assert_eq!(value.values(), vec!["a", "b", "c"]);
        assert_eq!(value.first(), Some("a"));
    }

    #[test]
    fn test_record_json_shape() {
        let mut meta = BTreeMap::new();
        meta.insert("version".to_string(), MetaValue::Single("1.0".to_string()));
        meta.insert(
            "match".to_string(),
            MetaValue::Many(vec!["a.com".to_string(), "b.com".to_string()]),
        );

        let record = ScriptRecord {
            id: "abc".to_string(),
            name: "Test".to_string(),
            matches: vec!["a\\.com".to_string()],
            code: "alert(1)".to_string(),
            source: "alert(1)".to_string(),
            enabled: true,
            last_updated: 1698508200000.0,
            meta,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["lastUpdated"], 1698508200000.0);
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["match"][1], "b.com");

        let back: ScriptRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_marker_key_falls_back_to_name() {
        let record: ScriptRecord = serde_json::from_str(
            r#"{"id":"","name":"Legacy","code":"","enabled":true,"lastUpdated":0}"#,
        )
        .unwrap();

        assert_eq!(record.marker_key(), "Legacy");
        assert!(record.matches.is_empty());
    }

    #[test]
    fn test_name_list_reads_as_first_name() {
        let record: ScriptRecord = serde_json::from_str(
            r#"{"id":"b","name":["One","Two"],"code":"","enabled":true,"lastUpdated":0}"#,
        )
        .unwrap();
        assert_eq!(record.name, "One");

        let record: ScriptRecord = serde_json::from_str(
            r#"{"id":"c","name":[],"code":"","enabled":true,"lastUpdated":0}"#,
        )
        .unwrap();
        assert_eq!(record.name, DEFAULT_SCRIPT_NAME);
    }

    #[test]
    fn test_new_script_optional_fields() {
        let script: NewScript = serde_json::from_str(r#"{"code":"x()"}"#).unwrap();
        assert_eq!(script.code, "x()");
        assert_eq!(script.name, None);
        assert_eq!(script.enabled, None);
    }
}
