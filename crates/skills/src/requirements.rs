//! Requirement gating: can this skill run on this host right now?

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use {
    serde::Serialize,
    serde_json::Value,
    skillgate_config::{HostConfig, SkillConfigEntry, is_truthy},
    tokio::sync::Mutex,
    tracing::debug,
};

use crate::{
    env::EnvironmentReader,
    metadata::RequirementSpec,
    probe::{CommandProbe, ProbeOutcome},
    types::SkillManifest,
};

/// Returns the current OS identifier used for platform filtering.
pub fn current_os() -> &'static str {
    if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else {
        std::env::consts::OS
    }
}

fn canonical_os(os: &str) -> String {
    match os.to_ascii_lowercase().as_str() {
        "win32" => "windows".to_string(),
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequirementKind {
    Bins,
    AnyBins,
    Env,
    Config,
    Os,
}

/// One failed category and the items that failed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRequirement {
    pub kind: RequirementKind,
    pub items: Vec<String>,
}

impl fmt::Display for MissingRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            RequirementKind::Bins => "missing binaries",
            RequirementKind::AnyBins => "none of the binaries found",
            RequirementKind::Env => "missing environment variables",
            RequirementKind::Config => "missing config",
            RequirementKind::Os => "unsupported platform",
        };
        write!(f, "{label}: {}", self.items.join(", "))
    }
}

/// Where an env requirement was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvSource {
    Process,
    EntryEnv,
    EntryApiKey,
}

/// What a `requires.config` path resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "state", content = "value")]
pub enum ConfigState {
    Absent,
    /// Present but falsy; counts as missing.
    Falsy(Value),
    Present(Value),
}

impl ConfigState {
    fn of(value: Option<&Value>) -> Self {
        match value {
            None => Self::Absent,
            Some(v) if is_truthy(v) => Self::Present(v.clone()),
            Some(v) => Self::Falsy(v.clone()),
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsCheck {
    pub current: String,
    pub allowed: Vec<String>,
    pub matched: bool,
}

/// Per-category outcomes, recorded even when `always` forced the gate open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDetails {
    pub bins: BTreeMap<String, ProbeOutcome>,
    pub any_bins: BTreeMap<String, ProbeOutcome>,
    /// `None` for unresolved variables.
    pub env: BTreeMap<String, Option<EnvSource>>,
    pub config: BTreeMap<String, ConfigState>,
    pub os: Option<OsCheck>,
    pub always: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub passed: bool,
    pub missing: Vec<MissingRequirement>,
    pub warnings: Vec<String>,
    pub details: GateDetails,
}

impl Default for GateResult {
    fn default() -> Self {
        Self {
            passed: true,
            missing: Vec::new(),
            warnings: Vec::new(),
            details: GateDetails::default(),
        }
    }
}

impl GateResult {
    /// Every missing item, across categories.
    pub fn missing_items(&self) -> impl Iterator<Item = &str> {
        self.missing
            .iter()
            .flat_map(|m| m.items.iter().map(String::as_str))
    }

    /// Human-readable line per failed category.
    pub fn missing_summary(&self) -> Vec<String> {
        self.missing.iter().map(ToString::to_string).collect()
    }

    /// Passed only because of `always: true`.
    pub fn is_forced(&self) -> bool {
        self.details.always && !self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub available: usize,
    pub unavailable: usize,
}

// ── Gate ─────────────────────────────────────────────────────────────────────

/// Evaluates `metadata.openclaw.requires` against the host.
///
/// Probe results are cached for the gate's lifetime, so a binary name is
/// probed at most once no matter how many skills or loads reference it.
pub struct RequirementGate {
    config: Arc<HostConfig>,
    probe: Arc<dyn CommandProbe>,
    env: Arc<dyn EnvironmentReader>,
    platform: String,
    bin_cache: Mutex<HashMap<String, ProbeOutcome>>,
}

impl RequirementGate {
    pub fn new(
        config: Arc<HostConfig>,
        probe: Arc<dyn CommandProbe>,
        env: Arc<dyn EnvironmentReader>,
    ) -> Self {
        Self {
            config,
            probe,
            env,
            platform: current_os().to_string(),
            bin_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Override the platform identifier used for `requires.os`.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Check a manifest. `skill_key` selects the `skills.entries` override
    /// consulted for env requirements.
    pub async fn check(&self, manifest: &SkillManifest, skill_key: &str) -> GateResult {
        let meta = manifest.openclaw();
        let mut result = GateResult::default();
        result.details.always = meta.always;

        let Some(req) = meta.requires.as_ref().filter(|r| !r.is_empty()) else {
            return result;
        };

        let entry = self.config.skills().entry(skill_key);
        self.check_bins(req, &mut result).await;
        self.check_env(req, entry, meta.primary_env.as_deref(), &mut result);
        self.check_config(req, &mut result);
        self.check_any_bins(req, &mut result).await;
        self.check_os(req, &mut result);

        result.passed = result.missing.is_empty();
        if meta.always {
            result.passed = true;
            let warning = if result.missing.is_empty() {
                "always: true, requirement checks skipped".to_string()
            } else {
                format!(
                    "requirements not met but loading anyway (always: true): {}",
                    result.missing_summary().join("; ")
                )
            };
            result.warnings.push(warning);
        }
        result
    }

    async fn check_bins(&self, req: &RequirementSpec, result: &mut GateResult) {
        let mut missing = Vec::new();
        for bin in &req.bins {
            let outcome = self.bin_outcome(bin).await;
            if !outcome.is_available() {
                missing.push(bin.clone());
            }
            result.details.bins.insert(bin.clone(), outcome);
        }
        push_missing(result, RequirementKind::Bins, missing);
    }

    async fn check_any_bins(&self, req: &RequirementSpec, result: &mut GateResult) {
        if req.any_bins.is_empty() {
            return;
        }
        let mut found = false;
        for bin in &req.any_bins {
            let outcome = self.bin_outcome(bin).await;
            found |= outcome.is_available();
            result.details.any_bins.insert(bin.clone(), outcome);
        }
        if !found {
            push_missing(result, RequirementKind::AnyBins, req.any_bins.clone());
        }
    }

    fn check_env(
        &self,
        req: &RequirementSpec,
        entry: Option<&SkillConfigEntry>,
        primary_env: Option<&str>,
        result: &mut GateResult,
    ) {
        let mut missing = Vec::new();
        for name in &req.env {
            let source = self.env_source(name, entry, primary_env);
            if source.is_none() {
                missing.push(name.clone());
            }
            result.details.env.insert(name.clone(), source);
        }
        push_missing(result, RequirementKind::Env, missing);
    }

    /// Process env, then the entry's `env`, then the entry's `apiKey` when
    /// `name` is the manifest's `primaryEnv`.
    fn env_source(
        &self,
        name: &str,
        entry: Option<&SkillConfigEntry>,
        primary_env: Option<&str>,
    ) -> Option<EnvSource> {
        if self.env.is_set(name) {
            return Some(EnvSource::Process);
        }
        let entry = entry?;
        if entry.env_var(name).is_some() {
            return Some(EnvSource::EntryEnv);
        }
        (primary_env == Some(name) && entry.api_key().is_some()).then_some(EnvSource::EntryApiKey)
    }

    fn check_config(&self, req: &RequirementSpec, result: &mut GateResult) {
        let mut missing = Vec::new();
        for path in &req.config {
            let state = ConfigState::of(self.config.get_path(path));
            if !state.is_satisfied() {
                missing.push(path.clone());
            }
            result.details.config.insert(path.clone(), state);
        }
        push_missing(result, RequirementKind::Config, missing);
    }

    fn check_os(&self, req: &RequirementSpec, result: &mut GateResult) {
        if req.os.is_empty() {
            return;
        }
        let current = canonical_os(&self.platform);
        let matched = req.os.iter().any(|os| canonical_os(os) == current);
        if !matched {
            push_missing(result, RequirementKind::Os, vec![self.platform.clone()]);
        }
        result.details.os = Some(OsCheck {
            current: self.platform.clone(),
            allowed: req.os.clone(),
            matched,
        });
    }

    async fn bin_outcome(&self, name: &str) -> ProbeOutcome {
        // Held across the probe so concurrent checks never probe a name twice.
        let mut cache = self.bin_cache.lock().await;
        if let Some(outcome) = cache.get(name) {
            return *outcome;
        }
        let outcome = self.probe.probe(name).await;
        debug!(bin = name, ?outcome, "probed binary");
        cache.insert(name.to_string(), outcome);
        outcome
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let cache = self.bin_cache.lock().await;
        let available = cache.values().filter(|o| o.is_available()).count();
        CacheStats {
            entries: cache.len(),
            available,
            unavailable: cache.len() - available,
        }
    }

    pub async fn clear_cache(&self) {
        self.bin_cache.lock().await.clear();
    }
}

fn push_missing(result: &mut GateResult, kind: RequirementKind, items: Vec<String>) {
    if !items.is_empty() {
        result.missing.push(MissingRequirement { kind, items });
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::env::StaticEnv,
        async_trait::async_trait,
        rstest::rstest,
        serde_json::json,
        std::{
            collections::HashSet,
            sync::atomic::{AtomicUsize, Ordering},
        },
    };

    #[derive(Default)]
    struct FakeProbe {
        available: HashSet<String>,
        timed_out: HashSet<String>,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn with(names: &[&str]) -> Self {
            Self {
                available: names.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl CommandProbe for FakeProbe {
        async fn probe(&self, name: &str) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.available.contains(name) {
                ProbeOutcome::Available
            } else if self.timed_out.contains(name) {
                ProbeOutcome::TimedOut
            } else {
                ProbeOutcome::Unavailable
            }
        }
    }

    fn manifest(name: &str, openclaw: Value) -> SkillManifest {
        SkillManifest {
            name: name.into(),
            metadata: json!({ "openclaw": openclaw }),
            ..Default::default()
        }
    }

    fn gate(config: Value, probe: Arc<FakeProbe>, env: StaticEnv) -> RequirementGate {
        RequirementGate::new(
            Arc::new(HostConfig::from_value(config).unwrap()),
            probe,
            Arc::new(env),
        )
    }

    fn empty_gate(probe: Arc<FakeProbe>) -> RequirementGate {
        gate(json!({}), probe, StaticEnv::new())
    }

    #[tokio::test]
    async fn no_requirements_passes() {
        let gate = empty_gate(Arc::new(FakeProbe::default()));
        let result = gate.check(&SkillManifest::default(), "x").await;
        assert!(result.passed);
        assert!(result.missing.is_empty());

        let result = gate.check(&manifest("x", json!({ "requires": {} })), "x").await;
        assert!(result.passed);
        assert!(result.missing.is_empty());
    }

    #[tokio::test]
    async fn missing_bin_fails() {
        let gate = empty_gate(Arc::new(FakeProbe::default()));
        let result = gate
            .check(&manifest("x", json!({ "requires": { "bins": ["toolA"] } })), "x")
            .await;
        assert!(!result.passed);
        assert_eq!(result.missing_items().collect::<Vec<_>>(), vec!["toolA"]);
        assert_eq!(result.missing_summary(), vec!["missing binaries: toolA"]);
        assert!(result.warnings.is_empty());
        assert!(!result.is_forced());
    }

    #[tokio::test]
    async fn always_forces_pass_but_keeps_details() {
        let gate = empty_gate(Arc::new(FakeProbe::default()));
        let result = gate
            .check(
                &manifest("x", json!({ "requires": { "bins": ["toolA"] }, "always": true })),
                "x",
            )
            .await;
        assert!(result.passed);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("toolA"));
        assert_eq!(result.details.bins["toolA"], ProbeOutcome::Unavailable);
        assert!(result.details.always);
        assert!(result.is_forced());
    }

    #[tokio::test]
    async fn always_without_failures_still_warns() {
        let gate = empty_gate(Arc::new(FakeProbe::with(&["gh"])));
        let result = gate
            .check(
                &manifest("x", json!({ "requires": { "bins": ["gh"] }, "always": true })),
                "x",
            )
            .await;
        assert!(result.passed);
        assert_eq!(result.warnings, vec!["always: true, requirement checks skipped"]);
        assert!(result.missing.is_empty());
        assert!(!result.is_forced());
    }

    #[tokio::test]
    async fn probes_each_name_once() {
        let probe = Arc::new(FakeProbe::with(&["gh"]));
        let gate = empty_gate(probe.clone());
        let a = manifest("a", json!({ "requires": { "bins": ["gh", "jq"] } }));
        let b = manifest("b", json!({ "requires": { "bins": ["gh"], "anyBins": ["jq"] } }));
        gate.check(&a, "a").await;
        gate.check(&b, "b").await;
        gate.check(&a, "a").await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.cache_stats().await, CacheStats {
            entries: 2,
            available: 1,
            unavailable: 1,
        });

        gate.clear_cache().await;
        assert_eq!(gate.cache_stats().await.entries, 0);
        gate.check(&b, "b").await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn timed_out_probe_is_missing() {
        let probe = Arc::new(FakeProbe {
            timed_out: ["slow".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let gate = empty_gate(probe);
        let result = gate
            .check(&manifest("x", json!({ "requires": { "bins": ["slow"] } })), "x")
            .await;
        assert!(!result.passed);
        assert_eq!(result.details.bins["slow"], ProbeOutcome::TimedOut);
    }

    #[tokio::test]
    async fn any_bins_needs_one() {
        let gate = empty_gate(Arc::new(FakeProbe::with(&["rg"])));
        let ok = gate
            .check(&manifest("x", json!({ "requires": { "anyBins": ["ag", "rg"] } })), "x")
            .await;
        assert!(ok.passed);

        let bad = gate
            .check(&manifest("y", json!({ "requires": { "anyBins": ["ag", "ack"] } })), "y")
            .await;
        assert!(!bad.passed);
        assert_eq!(bad.missing, vec![MissingRequirement {
            kind: RequirementKind::AnyBins,
            items: vec!["ag".into(), "ack".into()],
        }]);
    }

    #[tokio::test]
    async fn env_resolution_order() {
        let config = json!({
            "skills": { "entries": {
                "from-entry": { "env": { "TOKEN": "t" } },
                "from-key": { "apiKey": "secretvalue123" },
                "wrong-key": { "apiKey": "secretvalue123" }
            } }
        });
        let env = StaticEnv::new().with("HOME_VAR", "1");
        let gate = gate(config, Arc::new(FakeProbe::default()), env);

        let process = manifest("p", json!({ "requires": { "env": ["HOME_VAR"] } }));
        let result = gate.check(&process, "p").await;
        assert!(result.passed);
        assert_eq!(result.details.env["HOME_VAR"], Some(EnvSource::Process));

        let entry = manifest("from-entry", json!({ "requires": { "env": ["TOKEN"] } }));
        let result = gate.check(&entry, "from-entry").await;
        assert_eq!(result.details.env["TOKEN"], Some(EnvSource::EntryEnv));

        let key = manifest(
            "from-key",
            json!({ "requires": { "env": ["X_KEY"] }, "primaryEnv": "X_KEY" }),
        );
        let result = gate.check(&key, "from-key").await;
        assert!(result.passed);
        assert_eq!(result.details.env["X_KEY"], Some(EnvSource::EntryApiKey));

        // apiKey only fills the declared primaryEnv slot.
        let wrong = manifest(
            "wrong-key",
            json!({ "requires": { "env": ["OTHER"] }, "primaryEnv": "X_KEY" }),
        );
        let result = gate.check(&wrong, "wrong-key").await;
        assert!(!result.passed);
        assert_eq!(result.details.env["OTHER"], None);
    }

    #[tokio::test]
    async fn config_paths_need_truthy_values() {
        let config = json!({
            "browser": { "enabled": true, "retries": 0 },
        });
        let gate = gate(config, Arc::new(FakeProbe::default()), StaticEnv::new());
        let m = manifest(
            "x",
            json!({ "requires": { "config": ["browser.enabled", "browser.retries", "browser.path"] } }),
        );
        let result = gate.check(&m, "x").await;
        assert!(!result.passed);
        assert_eq!(result.missing, vec![MissingRequirement {
            kind: RequirementKind::Config,
            items: vec!["browser.retries".into(), "browser.path".into()],
        }]);
        assert_eq!(
            result.details.config["browser.enabled"],
            ConfigState::Present(json!(true))
        );
        assert_eq!(
            result.details.config["browser.retries"],
            ConfigState::Falsy(json!(0))
        );
        assert_eq!(result.details.config["browser.path"], ConfigState::Absent);
    }

    #[rstest]
    #[case("linux", &["linux"], true)]
    #[case("linux", &["darwin", "linux"], true)]
    #[case("darwin", &["linux"], false)]
    #[case("windows", &["win32"], true)]
    #[case("win32", &["windows"], true)]
    #[tokio::test]
    async fn os_allow_list(
        #[case] platform: &str,
        #[case] allowed: &[&str],
        #[case] expected: bool,
    ) {
        let gate = empty_gate(Arc::new(FakeProbe::default())).with_platform(platform);
        let result = gate
            .check(&manifest("x", json!({ "requires": { "os": allowed } })), "x")
            .await;
        assert_eq!(result.passed, expected);
        assert_eq!(result.details.os.unwrap().matched, expected);
    }

    #[tokio::test]
    async fn categories_fail_independently() {
        let gate = empty_gate(Arc::new(FakeProbe::default())).with_platform("linux");
        let m = manifest(
            "x",
            json!({ "requires": { "bins": ["a"], "env": ["B"], "os": ["darwin"] } }),
        );
        let result = gate.check(&m, "x").await;
        let kinds: Vec<_> = result.missing.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![
            RequirementKind::Bins,
            RequirementKind::Env,
            RequirementKind::Os
        ]);
        assert_eq!(result.missing[2].to_string(), "unsupported platform: linux");
    }

    #[test]
    fn current_os_is_known() {
        assert_ne!(current_os(), "");
        assert_ne!(current_os(), "unknown");
        if cfg!(not(any(target_os = "macos", target_os = "windows"))) {
            assert_eq!(current_os(), std::env::consts::OS);
        }
    }
}
