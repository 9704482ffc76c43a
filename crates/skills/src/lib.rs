//! Skill loading: discovery, parsing, requirement gating, host overrides,
//! and the priority-ordered registry.
//!
//! Skills are directories containing a `SKILL.md` file with YAML frontmatter
//! and markdown instructions. A load walks every source directory in
//! priority order and runs each candidate through:
//!
//! 1. [`parse`]: tolerant frontmatter extraction and validation
//! 2. [`requirements`]: binaries, env vars, config paths, platform
//! 3. [`overrides`]: `skills.entries` enable/disable, env and secret merging
//! 4. [`registry`]: highest-priority directory wins each name

pub mod builder;
pub mod discover;
pub mod env;
pub mod error;
pub mod metadata;
pub mod overrides;
pub mod parse;
pub mod probe;
pub mod registry;
pub mod requirements;
pub mod types;

pub use {
    builder::SkillRegistryBuilder,
    discover::SourceLayout,
    env::{EnvironmentReader, ProcessEnv, StaticEnv},
    error::{Error, Result},
    overrides::{ConfigOverrideResolver, mask_sensitive_value},
    probe::{CommandProbe, ProbeOutcome, SystemProbe},
    registry::{Registry, RegistryStats},
    requirements::{GateResult, RequirementGate},
    types::{ResolvedSkill, SkillManifest, SkillSource, SkipReason, SkippedSkill},
};
