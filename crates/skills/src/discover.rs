//! Source directory enumeration and per-directory candidate scanning.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use {
    skillgate_config::SkillsConfig,
    tracing::debug,
};

use crate::{
    error::{Context, Result},
    types::{MANIFEST_FILENAME, SkillSource},
};

/// Pre-`SKILL.md` skill files. Recognised so they can be reported, never
/// loaded.
pub const LEGACY_FILENAMES: &[&str] = &[
    "skill.json",
    "skill.yaml",
    "skill.yml",
    "skill.js",
    "skill.md",
];

/// A scanned source directory. Lower `priority` wins name collisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDir {
    pub path: PathBuf,
    pub source: SkillSource,
    pub priority: usize,
}

/// Host paths that relative and `~` directories resolve against.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    /// Base for relative paths; normally the working directory.
    pub base_dir: PathBuf,
    pub home_dir: Option<PathBuf>,
    /// Per-user skills; defaults to `~/.openclaw/skills`. Skills kept in the
    /// older `~/.clawdbot/skills` location need to be moved or listed in
    /// `skills.load.extraDirs`.
    pub local_dir: Option<PathBuf>,
}

impl SourceLayout {
    /// Layout of the running process.
    pub fn detect() -> Result<Self> {
        let base_dir = std::env::current_dir().context("failed to resolve working directory")?;
        let home_dir = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
        Ok(Self {
            base_dir,
            home_dir,
            local_dir: None,
        })
    }

    fn local_dir(&self) -> Option<PathBuf> {
        self.local_dir.clone().or_else(|| {
            self.home_dir
                .as_ref()
                .map(|home| home.join(".openclaw").join("skills"))
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let expanded = expand_tilde(path, self.home_dir.as_deref());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with('/') || rest.starts_with('\\') => {
            home.join(&rest[1..])
        },
        _ => PathBuf::from(path),
    }
}

/// Existing source directories, highest priority first: workspace, local,
/// bundled, then each extra dir. A directory reachable through more than one
/// entry keeps its first position.
pub fn source_directories(config: &SkillsConfig, layout: &SourceLayout) -> Vec<SourceDir> {
    let mut candidates = vec![(layout.resolve(&config.workspace_path), SkillSource::Workspace)];
    if let Some(local) = layout.local_dir() {
        candidates.push((local, SkillSource::Local));
    }
    if let Some(bundled) = &config.bundled_path {
        candidates.push((layout.resolve(bundled), SkillSource::Bundled));
    }
    candidates.extend(
        config
            .load
            .extra_dirs
            .iter()
            .map(|dir| (layout.resolve(dir), SkillSource::Extra)),
    );

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|(path, source)| {
            let exists = path.is_dir();
            if !exists {
                debug!(path = %path.display(), %source, "skill directory does not exist");
            }
            exists
        })
        .filter(|(path, _)| {
            let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            seen.insert(key)
        })
        .enumerate()
        .map(|(priority, (path, source))| SourceDir {
            path,
            source,
            priority,
        })
        .collect()
}

/// A skill directory found while scanning a source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Manifest { directory: PathBuf, manifest: PathBuf },
    /// Only a legacy skill file exists.
    Legacy { directory: PathBuf, file: PathBuf },
}

impl Candidate {
    pub fn directory(&self) -> &Path {
        match self {
            Self::Manifest { directory, .. } | Self::Legacy { directory, .. } => directory,
        }
    }
}

/// Immediate subdirectories of `dir` that hold a skill, sorted by name.
pub fn scan_directory(dir: &Path) -> std::io::Result<Vec<Candidate>> {
    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();

    Ok(subdirs.into_iter().filter_map(classify).collect())
}

fn classify(directory: PathBuf) -> Option<Candidate> {
    let manifest = directory.join(MANIFEST_FILENAME);
    if manifest.is_file() {
        return Some(Candidate::Manifest {
            directory,
            manifest,
        });
    }
    let file = LEGACY_FILENAMES
        .iter()
        .map(|name| directory.join(name))
        .find(|p| p.is_file())?;
    Some(Candidate::Legacy { directory, file })
}
