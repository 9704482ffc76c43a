use std::{collections::BTreeMap, path::PathBuf};

use {
    anyhow::{Context, bail},
    clap::Subcommand,
    serde::Serialize,
    skillgate_skills::{
        Registry, RegistryStats, ResolvedSkill, SkillRegistryBuilder, mask_sensitive_value,
        requirements::CacheStats,
    },
};

#[derive(Subcommand)]
pub enum SkillAction {
    /// List loaded skills.
    List {
        /// Also list candidates that were skipped, with the reason.
        #[arg(long)]
        all: bool,
    },
    /// Show one loaded skill.
    Info { name: String },
    /// Case-insensitive search over name, description and tags.
    Search { query: String },
    /// Skills in a category.
    Category { name: String },
    /// Registry statistics.
    Stats,
    /// Requirement check result for a skill, loaded or skipped.
    Check { name: String },
    /// The `skills.entries` override for a name, as configured.
    Config { name: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport<'a> {
    #[serde(flatten)]
    stats: RegistryStats,
    loaded_at_ms: Option<u64>,
    scan_duration_ms: u64,
    directories: &'a BTreeMap<PathBuf, Vec<String>>,
    probe_cache: CacheStats,
}

impl<'a> StatsReport<'a> {
    async fn collect(registry: &'a Registry, builder: &SkillRegistryBuilder) -> Self {
        Self {
            stats: registry.stats(),
            loaded_at_ms: registry.loaded_at_ms(),
            scan_duration_ms: registry.scan_duration_ms(),
            directories: registry.by_directory(),
            probe_cache: builder.gate().cache_stats().await,
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_list<'a>(
    skills: impl IntoIterator<Item = &'a ResolvedSkill>,
    json: bool,
) -> anyhow::Result<()> {
    let skills: Vec<_> = skills.into_iter().collect();
    if json {
        return print_json(&skills);
    }
    if skills.is_empty() {
        println!("No skills found.");
    }
    for skill in skills {
        let marker = if skill.is_forced() {
            " (requirements missing)"
        } else {
            ""
        };
        println!(
            "  {} — {} [{}]{marker}",
            skill.name(),
            skill.manifest.description,
            skill.source
        );
    }
    Ok(())
}

fn find<'a>(registry: &'a Registry, name: &str) -> anyhow::Result<&'a ResolvedSkill> {
    registry
        .get(name)
        .with_context(|| format!("skill '{name}' is not loaded"))
}

pub async fn handle_skills(
    action: SkillAction,
    builder: SkillRegistryBuilder,
    json: bool,
) -> anyhow::Result<()> {
    match action {
        SkillAction::List { all } => {
            let registry = builder.load().await?;
            print_list(registry.all(), json)?;
            if !all {
                return Ok(());
            }
            if json {
                return print_json(&registry.skipped());
            }
            for skipped in registry.skipped() {
                println!(
                    "  {} [{}] skipped: {}",
                    skipped.name.as_deref().unwrap_or("?"),
                    skipped.directory.display(),
                    skipped.reason
                );
            }
            Ok(())
        },
        SkillAction::Info { name } => {
            let registry = builder.load().await?;
            print_json(find(&registry, &name)?)
        },
        SkillAction::Search { query } => {
            let registry = builder.load().await?;
            print_list(registry.search(&query), json)
        },
        SkillAction::Category { name } => {
            let registry = builder.load().await?;
            print_list(registry.by_category(&name), json)
        },
        SkillAction::Stats => {
            let registry = builder.load().await?;
            print_json(&StatsReport::collect(&registry, &builder).await)
        },
        SkillAction::Check { name } => {
            let registry = builder.load().await?;
            if let Some(skill) = registry.get(&name) {
                return print_json(&skill.requirements);
            }
            let skipped = registry
                .skipped()
                .iter()
                .find(|s| s.name.as_deref() == Some(name.as_str()));
            match skipped {
                Some(skipped) => print_json(skipped),
                None => bail!("no skill named '{name}' was found"),
            }
        },
        // Reads config only; no load needed.
        SkillAction::Config { name } => {
            let mut config = builder.resolver().final_config(&name);
            config.env = config
                .env
                .into_iter()
                .map(|(k, v)| {
                    let masked = mask_sensitive_value(&k, &v);
                    (k, masked)
                })
                .collect();
            config.api_key = config.api_key.map(|k| mask_sensitive_value("apiKey", &k));
            print_json(&config)
        },
    }
}
