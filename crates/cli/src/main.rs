mod skill_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::Parser,
    skillgate_config::{HostConfig, discover_and_load, load_config},
    skillgate_skills::SkillRegistryBuilder,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "skillgate", about = "Load, gate and inspect agent skills")]
struct Cli {
    #[command(subcommand)]
    action: skill_commands::SkillAction,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Print listings as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Host config file (defaults to ./skillgate.* then the user config dir).
    #[arg(long, global = true, env = "SKILLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Platform used for `requires.os` checks (darwin, linux, windows).
    #[arg(long, global = true)]
    platform: Option<String>,
}

/// Initialise tracing. Logs go to stderr so command output stays parseable.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn host_config(cli: &Cli) -> anyhow::Result<HostConfig> {
    match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);
    debug!(version = env!("CARGO_PKG_VERSION"), "skillgate starting");

    let mut builder = SkillRegistryBuilder::new(host_config(&cli)?);
    if let Some(platform) = &cli.platform {
        builder = builder.with_platform(platform.clone());
    }

    skill_commands::handle_skills(cli.action, builder, cli.json).await
}
