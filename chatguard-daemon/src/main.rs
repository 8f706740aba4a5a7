use anyhow::Result;
use clap::Parser;

use chatguard_core::config::ChatguardConfig;
use chatguard_daemon::cli::DaemonCli;
use chatguard_daemon::logging;
use chatguard_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> environment -> command line
    let mut config = ChatguardConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!(
            "configuration OK: {} source(s), moderation {}, notifier {}",
            config.sources.len(),
            if config.moderation.enabled { "enabled" } else { "disabled" },
            if config.notifier.enabled { "enabled" } else { "disabled" },
        );
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "chatguard-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("chatguard-daemon shut down");
    Ok(())
}
