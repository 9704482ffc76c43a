use std::path::{Path, PathBuf};

use {
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::HostConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "skillgate.toml",
    "skillgate.yaml",
    "skillgate.yml",
    "skillgate.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<HostConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    let value = parse_config_value(&raw, path)?;
    Ok(HostConfig::from_value(value)?)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./skillgate.{toml,yaml,yml,json}` (project-local)
/// 2. `<config dir>/skillgate.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HostConfig::default()` if no config file is found or the one
/// found cannot be loaded.
pub fn discover_and_load() -> HostConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return HostConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            HostConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/skillgate/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "skillgate").map(|d| d.config_dir().to_path_buf())
}

fn parse_config_value(raw: &str, path: &Path) -> Result<Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}
