#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Full loads against temp directory trees with fake capabilities.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    skillgate_config::HostConfig,
    skillgate_skills::{
        CommandProbe, ProbeOutcome, SkillRegistryBuilder, SkillSource, SkipReason, SourceLayout,
        StaticEnv,
    },
};

#[derive(Default)]
struct CountingProbe {
    available: HashSet<String>,
    calls: AtomicUsize,
}

impl CountingProbe {
    fn with(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            available: names.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CommandProbe for CountingProbe {
    async fn probe(&self, name: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.contains(name) {
            ProbeOutcome::Available
        } else {
            ProbeOutcome::Unavailable
        }
    }
}

fn write_skill(dir: &Path, name: &str, description: &str, openclaw: Value) {
    let skill_dir = dir.join(name);
    fs::create_dir_all(&skill_dir).unwrap();
    let doc = format!(
        "---\nname: {name}\ndescription: {description}\nmetadata: '{}'\n---\n\n# {name}\n\nInstructions.\n",
        json!({ "openclaw": openclaw })
    );
    fs::write(skill_dir.join("SKILL.md"), doc).unwrap();
}

struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        fs::create_dir_all(root.join("skills")).unwrap();
        Self { _tmp: tmp, root }
    }

    fn workspace(&self) -> PathBuf {
        self.root.join("skills")
    }

    fn dir(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn builder(
        &self,
        config: Value,
        probe: Arc<CountingProbe>,
        env: StaticEnv,
    ) -> SkillRegistryBuilder {
        SkillRegistryBuilder::with_capabilities(
            HostConfig::from_value(config).unwrap(),
            probe,
            Arc::new(env),
        )
        .with_layout(SourceLayout {
            base_dir: self.root.clone(),
            home_dir: Some(self.root.join("home")),
            local_dir: None,
        })
        .with_platform("linux")
    }
}

#[tokio::test]
async fn workspace_wins_over_bundled() {
    let fx = Fixture::new();
    let bundled = fx.dir("bundled");
    write_skill(&bundled, "gh", "bundled copy", json!({}));
    write_skill(&bundled, "weather", "forecasts", json!({}));
    write_skill(&fx.workspace(), "gh", "workspace copy", json!({}));

    let builder = fx.builder(
        json!({ "skills": { "bundledPath": bundled } }),
        CountingProbe::with(&[]),
        StaticEnv::new(),
    );
    let reg = builder.load().await.unwrap();

    assert_eq!(reg.len(), 2);
    let gh = reg.get("gh").unwrap();
    assert_eq!(gh.manifest.description, "workspace copy");
    assert_eq!(gh.source, SkillSource::Workspace);
    assert_eq!(reg.get("weather").unwrap().source, SkillSource::Bundled);
    // The losing candidate still shows up as a contribution of its directory.
    assert_eq!(reg.names_from(&bundled), ["gh", "weather"]);
}

#[tokio::test]
async fn local_and_extra_directories() {
    let fx = Fixture::new();
    let local = fx.dir("home/.openclaw/skills");
    let extra = fx.dir("home/extra-skills");
    write_skill(&local, "notes", "local notes", json!({}));
    write_skill(&extra, "notes", "extra notes", json!({}));
    write_skill(&extra, "todo", "extra todo", json!({}));

    let builder = fx.builder(
        json!({ "skills": { "load": { "extraDirs": ["~/extra-skills", "~/missing"] } } }),
        CountingProbe::with(&[]),
        StaticEnv::new(),
    );
    let reg = builder.load().await.unwrap();
    assert_eq!(reg.get("notes").unwrap().source, SkillSource::Local);
    assert_eq!(reg.get("todo").unwrap().source, SkillSource::Extra);
}

#[tokio::test]
async fn unmet_requirements_skip_unless_always() {
    let fx = Fixture::new();
    let ws = fx.workspace();
    write_skill(&ws, "needs-tool", "d", json!({ "requires": { "bins": ["toolA"] } }));
    write_skill(
        &ws,
        "forced",
        "d",
        json!({ "requires": { "bins": ["toolA"] }, "always": true }),
    );
    write_skill(&ws, "has-tool", "d", json!({ "requires": { "bins": ["gh"] } }));

    let probe = CountingProbe::with(&["gh"]);
    let builder = fx.builder(json!({}), probe.clone(), StaticEnv::new());
    let reg = builder.load().await.unwrap();

    assert!(reg.get("needs-tool").is_none());
    let skipped = reg
        .skipped()
        .iter()
        .find(|s| s.name.as_deref() == Some("needs-tool"))
        .unwrap();
    assert_eq!(
        skipped.reason,
        SkipReason::Requirements(vec!["missing binaries: toolA".into()])
    );

    let forced = reg.get("forced").unwrap();
    assert!(forced.requirements.passed);
    assert!(forced.is_forced());
    assert!(!forced.requirements.warnings.is_empty());
    assert!(reg.get("has-tool").is_some());

    let stats = reg.stats();
    assert_eq!(stats.by_status.ready, 1);
    assert_eq!(stats.by_status.requirements_missing, 1);

    // toolA is referenced twice but probed once; a second load reuses the cache.
    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    builder.load().await.unwrap();
    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disabled_entry_is_excluded() {
    let fx = Fixture::new();
    write_skill(&fx.workspace(), "x", "d", json!({}));
    write_skill(&fx.workspace(), "y", "d", json!({}));

    let builder = fx.builder(
        json!({ "skills": { "entries": {
            "x": { "enabled": false, "apiKey": "secretvalue123", "env": { "A": "1" } }
        } } }),
        CountingProbe::with(&[]),
        StaticEnv::new(),
    );
    let reg = builder.load().await.unwrap();

    assert!(reg.get("x").is_none());
    assert_eq!(reg.enabled().map(|s| s.name()).collect::<Vec<_>>(), vec!["y"]);
    assert!(
        reg.skipped()
            .iter()
            .any(|s| s.name.as_deref() == Some("x") && s.reason == SkipReason::Disabled)
    );
    assert_eq!(reg.stats().disabled, 1);
}

#[tokio::test]
async fn api_key_promoted_into_primary_env() {
    let fx = Fixture::new();
    write_skill(
        &fx.workspace(),
        "search",
        "web search",
        json!({ "requires": { "env": ["X_KEY"] }, "primaryEnv": "X_KEY" }),
    );

    let builder = fx.builder(
        json!({ "skills": { "entries": { "search": { "apiKey": "secretvalue123" } } } }),
        CountingProbe::with(&[]),
        StaticEnv::new(),
    );
    let reg = builder.load().await.unwrap();

    let skill = reg.get("search").unwrap();
    assert!(skill.requirements.passed);
    assert!(skill.config_applied);
    assert_eq!(skill.env["X_KEY"], "secretvalue123");
    assert_eq!(skill.api_key(), Some("secretvalue123"));

    // Serialized output masks secrets.
    let out = serde_json::to_value(skill).unwrap();
    assert_eq!(out["env"]["X_KEY"], json!("secr...e123"));
    assert_eq!(out["apiKey"], json!("secr...e123"));
    assert_eq!(out["configSource"], json!("skills.entries"));
}

#[tokio::test]
async fn bundled_allow_list() {
    let fx = Fixture::new();
    let bundled = fx.dir("bundled");
    write_skill(&bundled, "weather", "d", json!({}));
    write_skill(&bundled, "gh", "d", json!({}));
    // The allow-list only applies to bundled skills.
    write_skill(&fx.workspace(), "notes", "d", json!({}));

    let builder = fx.builder(
        json!({ "skills": { "bundledPath": bundled, "allowBundled": ["weather"] } }),
        CountingProbe::with(&[]),
        StaticEnv::new(),
    );
    let reg = builder.load().await.unwrap();

    assert!(reg.get("weather").is_some());
    assert!(reg.get("notes").is_some());
    assert!(reg.get("gh").is_none());
    assert!(
        reg.skipped()
            .iter()
            .any(|s| s.name.as_deref() == Some("gh") && s.reason == SkipReason::NotAllowed)
    );
}

#[tokio::test]
async fn legacy_and_invalid_candidates_are_skipped() {
    let fx = Fixture::new();
    let ws = fx.workspace();
    fs::create_dir_all(ws.join("old")).unwrap();
    fs::write(ws.join("old/skill.json"), "{}").unwrap();
    fs::create_dir_all(ws.join("nameless")).unwrap();
    fs::write(ws.join("nameless/SKILL.md"), "---\ndescription: no name\n---\n").unwrap();
    fs::create_dir_all(ws.join("not-a-skill")).unwrap();
    fs::create_dir_all(ws.join("legacy-heading")).unwrap();
    fs::write(ws.join("legacy-heading/SKILL.md"), "# My Tool\nDoes things.\n").unwrap();

    let builder = fx.builder(json!({}), CountingProbe::with(&[]), StaticEnv::new());
    let reg = builder.load().await.unwrap();

    assert_eq!(reg.all().map(|s| s.name()).collect::<Vec<_>>(), vec!["my-tool"]);
    assert_eq!(reg.get("my-tool").unwrap().manifest.description, "My Tool");

    let reasons: Vec<_> = reg.skipped().iter().map(|s| &s.reason).collect();
    assert_eq!(reasons.len(), 2);
    assert!(matches!(reasons[0], SkipReason::Invalid(_)));
    assert!(matches!(reasons[1], SkipReason::LegacyFormat(_)));
}

#[tokio::test]
async fn repeated_loads_are_equivalent() {
    let fx = Fixture::new();
    write_skill(
        &fx.workspace(),
        "search",
        "d",
        json!({ "primaryEnv": "X_KEY", "region": "us" }),
    );
    write_skill(&fx.workspace(), "plain", "d", json!({}));

    let builder = fx.builder(
        json!({ "skills": { "entries": { "search": {
            "apiKey": "secretvalue123",
            "config": { "region": "eu" }
        } } } }),
        CountingProbe::with(&[]),
        StaticEnv::new().with("UNRELATED", "1"),
    );

    let first = builder.load().await.unwrap();
    let second = builder.load().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    let summary = |reg: &skillgate_skills::Registry| {
        reg.all()
            .map(|s| {
                (
                    s.name().to_string(),
                    s.enabled,
                    s.env.clone(),
                    s.api_key().map(str::to_string),
                    s.custom_config.clone(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&first), summary(&second));
    assert_eq!(
        first.get("search").unwrap().custom_config["region"],
        json!("eu")
    );
    assert!(builder.last_error().is_none());
}
