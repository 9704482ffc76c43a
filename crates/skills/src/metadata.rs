//! The `metadata` frontmatter value and its `openclaw` namespace.
//!
//! Hand-authored manifests often carry `metadata` as a one-line JSON string
//! that is not quite JSON. It is read through an ordered chain of parsers,
//! stopping at the first that accepts it:
//!
//! 1. strict JSON
//! 2. relaxed JSON (unquoted keys, single quotes, trailing commas)
//! 3. YAML
//!
//! When none accepts it the result is an empty mapping plus a diagnostic.

use {
    serde::Serialize,
    serde_json::{Map, Value},
};

/// Namespaces that may carry the openclaw block, in lookup order.
const NAMESPACES: &[&str] = &["openclaw", "clawdbot", "moltbot"];

/// Which parser accepted a `metadata` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFormat {
    Json,
    RelaxedJson,
    Yaml,
}

/// Outcome of reading a `metadata` string.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataParse {
    pub value: Value,
    /// `None` when every parser rejected the input.
    pub format: Option<MetadataFormat>,
    pub diagnostic: Option<String>,
}

type MetadataParser = fn(&str) -> Option<Value>;

const PARSERS: &[(MetadataFormat, MetadataParser)] = &[
    (MetadataFormat::Json, parse_json),
    (MetadataFormat::RelaxedJson, parse_relaxed_json),
    (MetadataFormat::Yaml, parse_yaml),
];

fn parse_json(raw: &str) -> Option<Value> {
    serde_json::from_str(raw).ok()
}

fn parse_relaxed_json(raw: &str) -> Option<Value> {
    json5::from_str(raw).ok()
}

fn parse_yaml(raw: &str) -> Option<Value> {
    let value: serde_yaml::Value = serde_yaml::from_str(raw).ok()?;
    serde_json::to_value(value).ok()
}

/// Parse a serialized `metadata` string.
pub fn parse_metadata_str(raw: &str) -> MetadataParse {
    if raw.trim().is_empty() {
        return MetadataParse {
            value: Value::Object(Map::new()),
            format: None,
            diagnostic: None,
        };
    }

    PARSERS
        .iter()
        .find_map(|(format, parse)| {
            parse(raw).map(|value| MetadataParse {
                // A literal `null` reads the same as no metadata at all.
                value: if value.is_null() {
                    Value::Object(Map::new())
                } else {
                    value
                },
                format: Some(*format),
                diagnostic: None,
            })
        })
        .unwrap_or_else(|| MetadataParse {
            value: Value::Object(Map::new()),
            format: None,
            diagnostic: Some(format!("failed to parse metadata: {raw}")),
        })
}

/// Normalize the frontmatter `metadata` value.
///
/// Absent or `null` becomes an empty mapping, strings go through
/// [`parse_metadata_str`], anything else is kept as written.
pub fn normalize_metadata(value: Option<&Value>) -> MetadataParse {
    match value {
        None | Some(Value::Null) => MetadataParse {
            value: Value::Object(Map::new()),
            format: None,
            diagnostic: None,
        },
        Some(Value::String(raw)) => parse_metadata_str(raw),
        Some(other) => MetadataParse {
            value: other.clone(),
            format: None,
            diagnostic: None,
        },
    }
}

/// The openclaw block inside `metadata`, trying legacy namespaces when
/// `openclaw` itself is absent.
pub fn openclaw_namespace(metadata: &Value) -> Option<&Map<String, Value>> {
    NAMESPACES
        .iter()
        .find_map(|ns| metadata.get(*ns).and_then(Value::as_object))
}

// ── Typed view ───────────────────────────────────────────────────────────────

/// Requirements declared under `metadata.openclaw.requires`.
///
/// Values that are not lists of strings are ignored; an empty list means
/// the category is not declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementSpec {
    pub bins: Vec<String>,
    pub any_bins: Vec<String>,
    pub env: Vec<String>,
    pub config: Vec<String>,
    pub os: Vec<String>,
}

impl RequirementSpec {
    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            bins: string_list(map.get("bins")),
            any_bins: string_list(map.get("anyBins")),
            env: string_list(map.get("env")),
            config: string_list(map.get("config")),
            os: string_list(map.get("os")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
            && self.any_bins.is_empty()
            && self.env.is_empty()
            && self.config.is_empty()
            && self.os.is_empty()
    }
}

/// Typed, tolerant view of `metadata.openclaw`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenClawMeta {
    /// `None` when no `requires` mapping is declared.
    pub requires: Option<RequirementSpec>,
    /// Only a literal `true` counts.
    pub always: bool,
    pub primary_env: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl OpenClawMeta {
    pub fn from_metadata(metadata: &Value) -> Self {
        let Some(ns) = openclaw_namespace(metadata) else {
            return Self::default();
        };
        Self {
            requires: ns
                .get("requires")
                .and_then(Value::as_object)
                .map(RequirementSpec::from_map),
            always: ns.get("always") == Some(&Value::Bool(true)),
            primary_env: non_empty_str(ns.get("primaryEnv")),
            category: non_empty_str(ns.get("category")),
            tags: string_list(ns.get("tags")),
        }
    }

    /// Declared env requirements, empty when none.
    pub fn required_env(&self) -> &[String] {
        self.requires
            .as_ref()
            .map(|r| r.env.as_slice())
            .unwrap_or_default()
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
