//! Host configuration schema, as far as the skills loader reads it.
//!
//! The host owns the full document; this crate keeps it verbatim for
//! dotted-path lookups (`requires.config`) and exposes a typed view of the
//! `skills` section.

use std::collections::{BTreeMap, HashMap};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Root host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Value")]
pub struct HostConfig {
    raw: Value,
    skills: SkillsConfig,
}

impl HostConfig {
    /// Build from an already-parsed document.
    ///
    /// Only the `skills` section is validated against the schema; every
    /// other key is kept as-is for [`HostConfig::get_path`].
    pub fn from_value(raw: Value) -> serde_json::Result<Self> {
        let skills = match raw.get("skills") {
            Some(section) if !section.is_null() => serde_json::from_value(section.clone())?,
            _ => SkillsConfig::default(),
        };
        Ok(Self { raw, skills })
    }

    /// Typed `skills` section.
    pub fn skills(&self) -> &SkillsConfig {
        &self.skills
    }

    /// The full document this config was built from.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Resolve a dotted path (`"channels.slack.token"`) against the raw
    /// document.
    ///
    /// Returns `None` when any segment is missing, and `Some` for present
    /// values even when they are `null` or falsy. Numeric segments index
    /// into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }
        path.split('.').try_fold(&self.raw, |current, part| match current {
            Value::Object(map) => map.get(part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

impl TryFrom<Value> for HostConfig {
    type Error = serde_json::Error;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        Self::from_value(raw)
    }
}

/// Truthiness used when checking `requires.config` paths.
///
/// `null`, `false`, `0`, and `""` are falsy. Every other value is truthy,
/// including empty arrays and objects.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ── Skills section ───────────────────────────────────────────────────────────

/// `skills.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkillsConfig {
    /// Workspace skills directory (highest priority). Defaults to `./skills`.
    pub workspace_path: String,
    /// Bundled skills directory (lowest of the fixed sources).
    pub bundled_path: Option<String>,
    /// When set, only bundled skills named here are loaded.
    pub allow_bundled: Option<Vec<String>>,
    pub load: SkillsLoadConfig,
    /// Per-skill overrides keyed by skill name.
    pub entries: HashMap<String, SkillConfigEntry>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            workspace_path: "./skills".into(),
            bundled_path: None,
            allow_bundled: None,
            load: SkillsLoadConfig::default(),
            entries: HashMap::new(),
        }
    }
}

impl SkillsConfig {
    /// Override entry for a skill, by exact name.
    pub fn entry(&self, name: &str) -> Option<&SkillConfigEntry> {
        self.entries.get(name)
    }

    /// Whether a bundled skill passes the `allowBundled` list.
    ///
    /// Without an explicit list every bundled skill is allowed.
    pub fn is_bundled_allowed(&self, name: &str) -> bool {
        self.allow_bundled
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|n| n == name))
    }

    /// Names of entries not explicitly disabled, sorted.
    pub fn enabled_entries(&self) -> Vec<&str> {
        self.entry_names(|e| !e.is_disabled())
    }

    /// Names of entries with `enabled = false`, sorted.
    pub fn disabled_entries(&self) -> Vec<&str> {
        self.entry_names(SkillConfigEntry::is_disabled)
    }

    fn entry_names(&self, pred: impl Fn(&SkillConfigEntry) -> bool) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// `skills.load.*` configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkillsLoadConfig {
    /// Additional directories scanned after the fixed sources. `~` expands
    /// to the home directory.
    pub extra_dirs: Vec<String>,
}

/// Host-side override for one skill (`skills.entries.<name>`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkillConfigEntry {
    pub enabled: Option<bool>,
    pub env: Option<BTreeMap<String, String>>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    pub config: Option<Map<String, Value>>,
}

impl SkillConfigEntry {
    /// Only an explicit `enabled = false` disables a skill.
    pub fn is_disabled(&self) -> bool {
        self.enabled == Some(false)
    }

    /// The api key, if set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }

    /// A non-empty value from this entry's `env` mapping.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .as_ref()
            .and_then(|env| env.get(name))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
