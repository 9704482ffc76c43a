//! Full-load orchestration: directories → candidates → registry snapshot.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use {
    skillgate_config::HostConfig,
    tracing::{debug, info, warn},
};

use crate::{
    discover::{Candidate, SourceDir, SourceLayout, scan_directory, source_directories},
    env::{EnvironmentReader, ProcessEnv},
    error::{Error, Result},
    overrides::ConfigOverrideResolver,
    parse::{parse_manifest_file, validate},
    probe::{CommandProbe, SystemProbe},
    registry::Registry,
    requirements::RequirementGate,
    types::{ResolvedSkill, SkillSource, SkippedSkill, SkipReason, UsageStats},
};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Clears the in-progress flag when a load ends, however it ends.
struct LoadGuard<'a>(&'a AtomicBool);

impl<'a> LoadGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::LoadInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Builds [`Registry`] snapshots from the configured skill directories.
///
/// One load runs at a time; a concurrent [`load`](Self::load) fails with
/// [`Error::LoadInProgress`]. Readers get the last complete snapshot.
pub struct SkillRegistryBuilder {
    config: Arc<HostConfig>,
    gate: RequirementGate,
    resolver: ConfigOverrideResolver,
    layout: Option<SourceLayout>,
    loading: AtomicBool,
    current: RwLock<Arc<Registry>>,
    last_error: Mutex<Option<String>>,
}

impl SkillRegistryBuilder {
    /// Builder using the process environment and the system probe.
    pub fn new(config: HostConfig) -> Self {
        Self::with_capabilities(config, Arc::new(SystemProbe::new()), Arc::new(ProcessEnv))
    }

    pub fn with_capabilities(
        config: HostConfig,
        probe: Arc<dyn CommandProbe>,
        env: Arc<dyn EnvironmentReader>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            gate: RequirementGate::new(Arc::clone(&config), probe, Arc::clone(&env)),
            resolver: ConfigOverrideResolver::new(Arc::clone(&config), env),
            config,
            layout: None,
            loading: AtomicBool::new(false),
            current: RwLock::new(Arc::new(Registry::default())),
            last_error: Mutex::new(None),
        }
    }

    /// Resolve directories against `layout` instead of the process's
    /// working and home directories.
    #[must_use]
    pub fn with_layout(mut self, layout: SourceLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.gate = self.gate.with_platform(platform);
        self
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn gate(&self) -> &RequirementGate {
        &self.gate
    }

    pub fn resolver(&self) -> &ConfigOverrideResolver {
        &self.resolver
    }

    /// The last completed snapshot; empty before the first load.
    pub fn registry(&self) -> Arc<Registry> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Error message of the most recent load, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Rebuild the registry from scratch and publish it.
    pub async fn load(&self) -> Result<Arc<Registry>> {
        let _guard = LoadGuard::acquire(&self.loading)?;
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = None;

        match self.build().await {
            Ok(registry) => {
                let registry = Arc::new(registry);
                *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&registry);
                Ok(registry)
            },
            Err(e) => {
                warn!(error = %e, "skill loading failed");
                *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(e.to_string());
                Err(e)
            },
        }
    }

    /// Drop the current snapshot and the gate's probe cache.
    pub async fn reset(&self) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(Registry::default());
        self.gate.clear_cache().await;
    }

    async fn build(&self) -> Result<Registry> {
        let started = Instant::now();
        let layout = match &self.layout {
            Some(layout) => layout.clone(),
            None => SourceLayout::detect()?,
        };
        let dirs = source_directories(self.config.skills(), &layout);
        debug!(
            dirs = ?dirs.iter().map(|d| d.path.display().to_string()).collect::<Vec<_>>(),
            "skill directories in priority order"
        );

        let loaded_at_ms = now_ms();
        let mut registry = Registry::new(loaded_at_ms);

        for dir in &dirs {
            let candidates = match scan_directory(&dir.path) {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(path = %dir.path.display(), error = %e, "failed to scan skill directory");
                    continue;
                },
            };

            let mut names = Vec::new();
            for candidate in candidates {
                match self.load_candidate(dir, candidate, loaded_at_ms).await {
                    Ok(skill) => {
                        names.push(skill.name().to_string());
                        registry.offer(skill);
                    },
                    Err(skipped) => {
                        log_skip(&skipped);
                        registry.record_skip(skipped);
                    },
                }
            }
            if !names.is_empty() {
                registry.record_directory(dir.path.clone(), names);
            }
        }

        registry.finish(started.elapsed().as_millis() as u64);
        info!(
            loaded = registry.len(),
            skipped = registry.skipped().len(),
            dirs = dirs.len(),
            duration_ms = registry.scan_duration_ms(),
            "skills loaded"
        );
        Ok(registry)
    }

    /// Run one candidate through parse, validate, gate, allow-list and
    /// overrides.
    async fn load_candidate(
        &self,
        dir: &SourceDir,
        candidate: Candidate,
        loaded_at_ms: u64,
    ) -> std::result::Result<ResolvedSkill, SkippedSkill> {
        let skip = |name: Option<&str>, directory: PathBuf, reason: SkipReason| SkippedSkill {
            name: name.map(str::to_string),
            directory,
            source: dir.source,
            reason,
        };

        let (directory, manifest_path) = match candidate {
            Candidate::Manifest {
                directory,
                manifest,
            } => (directory, manifest),
            Candidate::Legacy { directory, file } => {
                return Err(skip(None, directory, SkipReason::LegacyFormat(file)));
            },
        };

        let manifest = match parse_manifest_file(&manifest_path).await {
            Ok(manifest) => manifest,
            Err(e) => return Err(skip(None, directory, SkipReason::Parse(e.to_string()))),
        };
        let name = manifest.name.as_str();

        let validation = validate(&manifest);
        if !validation.is_valid {
            return Err(skip(Some(name), directory, SkipReason::Invalid(validation.errors)));
        }

        let requirements = self.gate.check(&manifest, name).await;
        if !requirements.passed {
            return Err(skip(
                Some(name),
                directory,
                SkipReason::Requirements(requirements.missing_summary()),
            ));
        }
        if requirements.is_forced() {
            warn!(
                skill = name,
                missing = ?requirements.missing_summary(),
                "loading despite unmet requirements (always: true)"
            );
        }

        if dir.source == SkillSource::Bundled && !self.resolver.is_skill_allowed(name) {
            return Err(skip(Some(name), directory, SkipReason::NotAllowed));
        }

        let overrides = self.resolver.resolve(&manifest);
        if !overrides.enabled {
            return Err(skip(Some(name), directory, SkipReason::Disabled));
        }

        for warning in &validation.warnings {
            warn!(skill = name, %warning, "skill manifest warning");
        }
        debug!(skill = name, source = %dir.source, path = %directory.display(), "loaded skill");

        Ok(ResolvedSkill {
            id: format!("{name}-{loaded_at_ms}"),
            enabled: overrides.enabled,
            config_applied: overrides.config_applied,
            config_source: overrides.config_source,
            env: overrides.env,
            api_key: overrides.api_key,
            custom_config: overrides.custom_config,
            requirements,
            validation_warnings: validation.warnings,
            source: dir.source,
            priority: dir.priority,
            directory,
            loaded_at_ms,
            can_invoke: manifest.user_invocable != Some(false),
            stats: UsageStats::default(),
            manifest,
        })
    }
}

fn log_skip(skipped: &SkippedSkill) {
    let name = skipped.name.as_deref().unwrap_or("<unnamed>");
    let path = skipped.directory.display();
    match &skipped.reason {
        SkipReason::Disabled => info!(skill = name, %path, "skill disabled by config"),
        SkipReason::LegacyFormat(file) => {
            info!(%path, file = %file.display(), "legacy skill format is not loadable, skipping")
        },
        reason => warn!(skill = name, %path, %reason, "skipping skill"),
    }
}
