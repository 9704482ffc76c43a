use std::{collections::BTreeMap, fmt, path::PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Serialize, Serializer},
    serde_json::{Map, Value},
};

use crate::{
    metadata::{OpenClawMeta, openclaw_namespace},
    overrides::{ConfigSource, mask_sensitive_value},
    requirements::GateResult,
};

/// Canonical manifest filename inside a skill directory.
pub const MANIFEST_FILENAME: &str = "SKILL.md";

// ── Sources ──────────────────────────────────────────────────────────────────

/// Class of directory a skill was loaded from, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillSource {
    /// `skills.workspacePath` (default `./skills`).
    Workspace,
    /// Per-user directory: `~/.openclaw/skills`.
    Local,
    /// `skills.bundledPath`; subject to `skills.allowBundled`.
    Bundled,
    /// Any of `skills.load.extraDirs`.
    Extra,
}

impl SkillSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Local => "local",
            Self::Bundled => "bundled",
            Self::Extra => "extra",
        }
    }
}

impl fmt::Display for SkillSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Manifest ─────────────────────────────────────────────────────────────────

/// One skill's declared identity, parsed from a `SKILL.md` document.
///
/// Built once per parse and never mutated afterwards; later stages derive
/// new values from it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillManifest {
    /// Empty when the document declares no name.
    pub name: String,
    /// Empty when the document declares no description.
    pub description: String,
    /// Parsed `metadata` value. A mapping unless the document was malformed.
    pub metadata: Value,
    /// Markdown body with the frontmatter removed.
    pub content: String,
    pub source_path: PathBuf,
    pub source_directory: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_invocable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_model_invocation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_dispatch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_arg_mode: Option<String>,
    /// Non-fatal problems noticed while parsing (e.g. unreadable metadata).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parse_warnings: Vec<String>,
}

impl SkillManifest {
    /// Typed view of the `metadata.openclaw` namespace.
    pub fn openclaw(&self) -> OpenClawMeta {
        OpenClawMeta::from_metadata(&self.metadata)
    }

    /// The raw `metadata.openclaw` mapping, if present.
    pub fn openclaw_namespace(&self) -> Option<&Map<String, Value>> {
        openclaw_namespace(&self.metadata)
    }

    /// Category from `metadata.category`, falling back to
    /// `metadata.openclaw.category`.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        let top = self.metadata.get("category").and_then(Value::as_str);
        let ns = self
            .openclaw_namespace()
            .and_then(|ns| ns.get("category"))
            .and_then(Value::as_str);
        top.into_iter().chain(ns)
    }

    /// Tags from `metadata.tags` and `metadata.openclaw.tags`.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        let top = self.metadata.get("tags").and_then(Value::as_array);
        let ns = self
            .openclaw_namespace()
            .and_then(|ns| ns.get("tags"))
            .and_then(Value::as_array);
        top.into_iter()
            .chain(ns)
            .flatten()
            .filter_map(Value::as_str)
    }
}

// ── Resolved skill ───────────────────────────────────────────────────────────

/// Usage counters attached to every freshly loaded skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub load_count: u32,
    pub last_used_ms: Option<u64>,
    pub usage_count: u64,
}

impl Default for UsageStats {
    fn default() -> Self {
        Self {
            load_count: 1,
            last_used_ms: None,
            usage_count: 0,
        }
    }
}

/// A skill that went through the whole pipeline and may enter the registry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSkill {
    /// `<name>-<loaded_at_ms>`; differs between loads.
    pub id: String,
    #[serde(flatten)]
    pub manifest: SkillManifest,
    pub enabled: bool,
    pub config_applied: bool,
    pub config_source: Option<ConfigSource>,
    #[serde(serialize_with = "serialize_masked_env")]
    pub env: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_masked_api_key")]
    pub api_key: Option<Secret<String>>,
    pub custom_config: Map<String, Value>,
    pub requirements: GateResult,
    pub validation_warnings: Vec<String>,
    pub source: SkillSource,
    /// Position of the source directory in scan order; lower wins.
    pub priority: usize,
    /// The skill's own directory.
    pub directory: PathBuf,
    pub loaded_at_ms: u64,
    pub can_invoke: bool,
    pub stats: UsageStats,
}

impl ResolvedSkill {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    /// Loaded even though some requirement is unmet (`always: true`).
    pub fn is_forced(&self) -> bool {
        self.requirements.is_forced()
    }
}

fn serialize_masked_env<S: Serializer>(
    env: &BTreeMap<String, String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        env.iter()
            .map(|(key, value)| (key, mask_sensitive_value(key, value))),
    )
}

fn serialize_masked_api_key<S: Serializer>(
    api_key: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match api_key {
        Some(key) => {
            serializer.serialize_some(&mask_sensitive_value("apiKey", key.expose_secret()))
        },
        None => serializer.serialize_none(),
    }
}

// ── Skipped candidates ───────────────────────────────────────────────────────

/// Why a candidate directory did not produce a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "reason", content = "detail")]
pub enum SkipReason {
    /// The manifest file could not be read.
    Parse(String),
    /// Structural validation errors.
    Invalid(Vec<String>),
    /// Unmet requirements without `always: true`.
    Requirements(Vec<String>),
    /// Bundled skill missing from `skills.allowBundled`.
    NotAllowed,
    /// `enabled = false` in the skill's override entry.
    Disabled,
    /// Only a legacy skill file was found; those are not loaded.
    LegacyFormat(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "parse error: {e}"),
            Self::Invalid(errors) => write!(f, "invalid: {}", errors.join(", ")),
            Self::Requirements(missing) => {
                write!(f, "requirements not met: {}", missing.join("; "))
            },
            Self::NotAllowed => f.write_str("not in skills.allowBundled"),
            Self::Disabled => f.write_str("disabled by config"),
            Self::LegacyFormat(path) => write!(f, "legacy format: {}", path.display()),
        }
    }
}

/// A candidate directory that was scanned but not loaded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSkill {
    /// Declared name when the manifest got far enough to have one.
    pub name: Option<String>,
    pub directory: PathBuf,
    pub source: SkillSource,
    pub reason: SkipReason,
}
