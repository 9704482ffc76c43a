//! Per-skill host overrides (`skills.entries.<name>`).

use std::{collections::BTreeMap, fmt, sync::Arc};

use {
    secrecy::Secret,
    serde::Serialize,
    serde_json::{Map, Value},
    skillgate_config::{HostConfig, SkillConfigEntry},
};

use crate::{env::EnvironmentReader, types::SkillManifest};

/// Key fragments that mark a value as sensitive.
const SENSITIVE_KEYS: &[&str] = &["key", "token", "secret", "password", "api", "auth"];

/// Values at or below this length are shown unmasked.
const MASK_MIN_LEN: usize = 8;

/// Mask a value for display when its key looks sensitive.
///
/// Sensitive values longer than eight characters keep their first and last
/// four characters: `abcd1234efgh` becomes `abcd...efgh`.
pub fn mask_sensitive_value(key: &str, value: &str) -> String {
    let key = key.to_lowercase();
    let sensitive = SENSITIVE_KEYS.iter().any(|s| key.contains(s));
    let chars: Vec<char> = value.chars().collect();
    if !sensitive || chars.len() <= MASK_MIN_LEN {
        return value.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Where an applied override came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfigSource {
    #[serde(rename = "skills.entries")]
    Entries,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entries => f.write_str("skills.entries"),
        }
    }
}

/// Effective settings for one manifest after applying its override entry.
#[derive(Debug, Clone)]
pub struct ResolvedOverrides {
    pub enabled: bool,
    pub config_applied: bool,
    pub config_source: Option<ConfigSource>,
    pub env: BTreeMap<String, String>,
    pub api_key: Option<Secret<String>>,
    pub custom_config: Map<String, Value>,
}

impl ResolvedOverrides {
    fn defaults() -> Self {
        Self {
            enabled: true,
            config_applied: false,
            config_source: None,
            env: BTreeMap::new(),
            api_key: None,
            custom_config: Map::new(),
        }
    }
}

/// The entry's own values, without merging anything from the manifest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalConfig {
    pub enabled: bool,
    pub env: BTreeMap<String, String>,
    pub api_key: Option<String>,
    pub config: Map<String, Value>,
}

/// Merges `skills.entries` overrides into manifests.
pub struct ConfigOverrideResolver {
    config: Arc<HostConfig>,
    env: Arc<dyn EnvironmentReader>,
}

impl ConfigOverrideResolver {
    pub fn new(config: Arc<HostConfig>, env: Arc<dyn EnvironmentReader>) -> Self {
        Self { config, env }
    }

    /// The override entry for a manifest: by exact name, then by skill key.
    pub fn entry_for(&self, manifest: &SkillManifest) -> Option<&SkillConfigEntry> {
        let skills = self.config.skills();
        skills.entry(&manifest.name).or_else(|| {
            self.lookup_by_skill_key(manifest)
                .and_then(|key| skills.entry(&key))
        })
    }

    /// Alternate lookup key for a manifest's override entry.
    ///
    /// Always `None`: entries are matched by name only. Kept as the single
    /// place to add alias resolution.
    fn lookup_by_skill_key(&self, _manifest: &SkillManifest) -> Option<String> {
        None
    }

    pub fn resolve(&self, manifest: &SkillManifest) -> ResolvedOverrides {
        let Some(entry) = self.entry_for(manifest) else {
            return ResolvedOverrides::defaults();
        };

        if entry.is_disabled() {
            return ResolvedOverrides {
                enabled: false,
                config_applied: true,
                config_source: Some(ConfigSource::Entries),
                ..ResolvedOverrides::defaults()
            };
        }

        let meta = manifest.openclaw();
        let primary_env = meta.primary_env.as_deref();

        ResolvedOverrides {
            enabled: true,
            config_applied: true,
            config_source: Some(ConfigSource::Entries),
            env: self.merge_env(meta.required_env(), primary_env, entry),
            api_key: resolve_api_key(primary_env, entry),
            custom_config: merge_custom_config(manifest, entry),
        }
    }

    /// Required vars from the process, then the entry's `env`, then the
    /// entry's `apiKey` into `primaryEnv` if that is still unset.
    fn merge_env(
        &self,
        required: &[String],
        primary_env: Option<&str>,
        entry: &SkillConfigEntry,
    ) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = required
            .iter()
            .filter_map(|name| self.env.var(name).map(|v| (name.clone(), v)))
            .collect();

        if let Some(overrides) = &entry.env {
            env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        if let (Some(primary), Some(api_key)) = (primary_env, entry.api_key())
            && env.get(primary).is_none_or(|v| v.is_empty())
        {
            env.insert(primary.to_string(), api_key.to_string());
        }
        env
    }

    /// Whether a bundled skill passes `skills.allowBundled`.
    pub fn is_skill_allowed(&self, name: &str) -> bool {
        self.config.skills().is_bundled_allowed(name)
    }

    pub fn final_config(&self, name: &str) -> FinalConfig {
        let Some(entry) = self.config.skills().entry(name) else {
            return FinalConfig {
                enabled: true,
                env: BTreeMap::new(),
                api_key: None,
                config: Map::new(),
            };
        };
        FinalConfig {
            enabled: !entry.is_disabled(),
            env: entry.env.clone().unwrap_or_default(),
            api_key: entry.api_key().map(str::to_string),
            config: entry.config.clone().unwrap_or_default(),
        }
    }
}

/// Explicit `apiKey`, else the entry's `env[primaryEnv]`.
fn resolve_api_key(primary_env: Option<&str>, entry: &SkillConfigEntry) -> Option<Secret<String>> {
    entry
        .api_key()
        .or_else(|| primary_env.and_then(|p| entry.env_var(p)))
        .map(|k| Secret::new(k.to_string()))
}

/// The manifest's openclaw namespace, overlaid by the entry's `config`.
fn merge_custom_config(manifest: &SkillManifest, entry: &SkillConfigEntry) -> Map<String, Value> {
    let mut merged = manifest.openclaw_namespace().cloned().unwrap_or_default();
    if let Some(config) = &entry.config {
        merged.extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}
