//! The name-unique skill registry produced by one load, and its queries.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use {serde::Serialize, tracing::debug};

use crate::types::{ResolvedSkill, SkillSource, SkippedSkill, SkipReason};

/// Immutable snapshot of one load.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    skills: BTreeMap<String, ResolvedSkill>,
    /// Source directory → names it produced, including ones that lost a
    /// name collision.
    by_directory: BTreeMap<PathBuf, Vec<String>>,
    skipped: Vec<SkippedSkill>,
    loaded_at_ms: Option<u64>,
    scan_duration_ms: u64,
}

impl Registry {
    pub(crate) fn new(loaded_at_ms: u64) -> Self {
        Self {
            loaded_at_ms: Some(loaded_at_ms),
            ..Self::default()
        }
    }

    /// Offer a candidate. It takes the name only if no candidate from an
    /// equal or higher priority directory holds it already.
    pub(crate) fn offer(&mut self, skill: ResolvedSkill) -> bool {
        if let Some(existing) = self.skills.get(skill.name())
            && existing.priority <= skill.priority
        {
            debug!(
                skill = skill.name(),
                kept = %existing.directory.display(),
                ignored = %skill.directory.display(),
                "name conflict, keeping higher-priority skill"
            );
            return false;
        }
        if let Some(replaced) = self.skills.insert(skill.name().to_string(), skill) {
            debug!(
                skill = replaced.name(),
                replaced = %replaced.directory.display(),
                "name conflict, replaced lower-priority skill"
            );
        }
        true
    }

    pub(crate) fn record_directory(&mut self, directory: PathBuf, names: Vec<String>) {
        self.by_directory.insert(directory, names);
    }

    pub(crate) fn record_skip(&mut self, skipped: SkippedSkill) {
        self.skipped.push(skipped);
    }

    pub(crate) fn finish(&mut self, scan_duration_ms: u64) {
        self.scan_duration_ms = scan_duration_ms;
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<&ResolvedSkill> {
        self.skills.get(name)
    }

    /// All skills, ordered by name.
    pub fn all(&self) -> impl Iterator<Item = &ResolvedSkill> {
        self.skills.values()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ResolvedSkill> {
        self.all().filter(|s| s.enabled)
    }

    /// Skills whose `metadata.category` or `metadata.openclaw.category`
    /// equals `category`.
    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ResolvedSkill> {
        self.all()
            .filter(move |s| s.manifest.categories().any(|c| c == category))
    }

    /// Case-insensitive substring match on name, description and tags.
    pub fn search(&self, query: &str) -> Vec<&ResolvedSkill> {
        let query = query.to_lowercase();
        self.all()
            .filter(|s| {
                s.name().to_lowercase().contains(&query)
                    || s.manifest.description.to_lowercase().contains(&query)
                    || s.manifest.tags().any(|t| t.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn by_directory(&self) -> &BTreeMap<PathBuf, Vec<String>> {
        &self.by_directory
    }

    pub fn names_from(&self, directory: &Path) -> &[String] {
        self.by_directory
            .get(directory)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn skipped(&self) -> &[SkippedSkill] {
        &self.skipped
    }

    /// `None` until a load has completed.
    pub fn loaded_at_ms(&self) -> Option<u64> {
        self.loaded_at_ms
    }

    pub fn scan_duration_ms(&self) -> u64 {
        self.scan_duration_ms
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.skills.len(),
            ..RegistryStats::default()
        };

        for skill in self.all() {
            *stats.by_source.entry(skill.source).or_default() += 1;
            if skill.config_applied {
                stats.by_status.config_overridden += 1;
            }
            match (skill.enabled, skill.requirements.missing.is_empty()) {
                (false, _) => stats.by_status.disabled += 1,
                (true, true) => stats.by_status.ready += 1,
                (true, false) => stats.by_status.requirements_missing += 1,
            }
        }

        // Skills turned off in config never enter the registry; count them here.
        stats.by_status.disabled += self
            .skipped
            .iter()
            .filter(|s| s.reason == SkipReason::Disabled)
            .count();
        stats.enabled = stats.by_status.ready + stats.by_status.requirements_missing;
        stats.disabled = stats.by_status.disabled;
        stats.skipped = self.skipped.len();
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub ready: usize,
    /// Loaded through `always: true` despite unmet requirements.
    pub requirements_missing: usize,
    pub disabled: usize,
    pub config_overridden: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub skipped: usize,
    pub by_source: BTreeMap<SkillSource, usize>,
    pub by_status: StatusCounts,
}
