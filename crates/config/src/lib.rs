//! Host configuration consumed by the skills loader.
//!
//! Config files: `skillgate.toml`, `skillgate.yaml`, or `skillgate.json`
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution in all string values. The skills
//! loader only ever reads the resulting [`HostConfig`].

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, load_config},
    schema::{HostConfig, SkillConfigEntry, SkillsConfig, SkillsLoadConfig, is_truthy},
};
