//! Source orchestration -- assembly, shared state wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `chatguard-daemon`.
//! It loads the rule lists and prompts once, builds the process-wide
//! moderation gate, player context store, punishment store and notifier,
//! and creates one [`ChatPipeline`] per configured `[[sources]]` entry.
//!
//! # Shared state
//!
//! ```text
//!             +-- ChatPipeline("HiTech") --+
//! RuleSets ---+                            +--> ModerationGate (1 call in flight)
//! Context  ---+-- ChatPipeline("Mobile") --+--> DaemonNotifier
//! ```
//!
//! # Shutdown Triggers
//!
//! - `SIGTERM` / `SIGINT` (Ctrl+C)
//! - every source has terminated (e.g. all log files vanished)

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use chatguard_core::config::ChatguardConfig;
use chatguard_core::metrics as m;
use chatguard_core::pipeline::Pipeline;
use chatguard_pipeline::{
    ChatPipeline, ChatPipelineBuilder, Classifier, HttpModerationConfig, HttpModerationModel,
    ModelStage, ModerationGate, PipelineConfig, PlayerContextStore, PunishmentStore, RuleLoader,
};

use crate::health::{DaemonHealth, SourceHealth, aggregate_status};
use crate::metrics_server;
use crate::notifier::DaemonNotifier;

/// Interval between periodic health reports in the main loop.
const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Pipeline type used for every source.
pub type SourcePipeline = ChatPipeline<HttpModerationModel, DaemonNotifier>;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: ChatguardConfig,
    /// One pipeline per source, in configuration order.
    pipelines: Vec<SourcePipeline>,
    /// Player context shared by all sources.
    context: Arc<PlayerContextStore>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from a file and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - Any source pipeline fails to build
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = ChatguardConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: ChatguardConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        // Rule lists and prompts are loaded once and shared read-only.
        let rules = Arc::new(RuleLoader::load_rule_sets(&config.rules).await);
        let context = Arc::new(PlayerContextStore::new(config.pipeline.context_capacity));

        let model_stage = if config.moderation.enabled {
            let model = HttpModerationModel::new(HttpModerationConfig::from_core(
                &config.moderation,
            ))
            .map_err(|e| anyhow::anyhow!("failed to build moderation model: {}", e))?;
            let gate = Arc::new(ModerationGate::with_timeout(
                model,
                Duration::from_secs(config.moderation.timeout_secs),
            ));
            let prompts = Arc::new(RuleLoader::load_prompts(&config.rules).await);
            tracing::info!(
                model = %config.moderation.model,
                channels = ?config.moderation.channels,
                timeout_secs = config.moderation.timeout_secs,
                "moderation model enabled"
            );
            Some(ModelStage::new(gate, prompts, &config.moderation.channels))
        } else {
            tracing::warn!("moderation model disabled, only keyword rules apply");
            None
        };

        let notifier = Arc::new(
            DaemonNotifier::from_config(&config.notifier)
                .map_err(|e| anyhow::anyhow!("failed to build notifier: {}", e))?,
        );
        let notify_timeout = Duration::from_secs(config.notifier.timeout_secs);
        let punishments = Arc::new(PunishmentStore::new(&config.punishment.store_path));

        let mut pipelines = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            let classifier =
                Classifier::new(Arc::clone(&rules), Arc::clone(&context), model_stage.clone());
            let pipeline = ChatPipelineBuilder::new()
                .config(PipelineConfig::from_core(source, &config.pipeline))
                .classifier(classifier)
                .notifier(Arc::clone(&notifier))
                .notify_timeout(notify_timeout)
                .punishment_store(Arc::clone(&punishments))
                .build()
                .map_err(|e| {
                    anyhow::anyhow!("failed to build pipeline for source '{}': {}", source.name, e)
                })?;
            pipelines.push(pipeline);
        }

        if config.metrics.enabled {
            record_daemon_metrics(pipelines.len());
        }

        tracing::info!(
            sources = pipelines.len(),
            notifier = notifier.kind(),
            notify_timeout_secs = config.notifier.timeout_secs,
            punishment_store = %config.punishment.store_path,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            pipelines,
            context,
            start_time: Instant::now(),
        })
    }

    /// Start all sources and run until a shutdown signal arrives
    /// or every source has terminated.
    pub async fn run(&mut self) -> Result<()> {
        self.start_all().await?;

        let sources_done: Vec<_> = self.pipelines.iter().map(|p| p.source_done()).collect();
        let all_done = async move {
            for token in sources_done {
                token.cancelled().await;
            }
        };
        tokio::pin!(all_done);

        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        let mut health_tick = tokio::time::interval(HEALTH_REPORT_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("entering main event loop");
        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    let signal = signal?;
                    tracing::info!(signal = signal, "shutdown signal received");
                    break;
                }
                _ = &mut all_done => {
                    tracing::error!("all log sources have terminated, shutting down");
                    break;
                }
                _ = health_tick.tick() => {
                    let health = self.health().await;
                    if health.status.is_healthy() {
                        tracing::debug!(uptime_secs = health.uptime_secs, "daemon healthy");
                    } else {
                        tracing::warn!(
                            status = %health.status,
                            uptime_secs = health.uptime_secs,
                            "daemon health degraded"
                        );
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Start every source pipeline in configuration order.
    ///
    /// On failure, pipelines that already started are stopped again.
    pub async fn start_all(&mut self) -> Result<()> {
        tracing::info!("starting all sources");
        for index in 0..self.pipelines.len() {
            if let Err(e) = self.pipelines[index].start().await {
                tracing::warn!("startup failed, rolling back already-started sources");
                for started in &mut self.pipelines[..index] {
                    if let Err(stop_err) = started.stop().await {
                        tracing::error!(
                            source = %started.source_name(),
                            error = %stop_err,
                            "rollback failed"
                        );
                    }
                }
                return Err(anyhow::anyhow!(
                    "failed to start source '{}': {}",
                    self.pipelines[index].source_name(),
                    e
                ));
            }
        }
        Ok(())
    }

    /// Stop all running source pipelines.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all sources");
        for pipeline in &mut self.pipelines {
            if let Err(e) = pipeline.stop().await {
                tracing::warn!(source = %pipeline.source_name(), error = %e, "failed to stop source");
            }
        }
        tracing::info!(
            players_tracked = self.context.player_count(),
            "all sources stopped"
        );
        Ok(())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let mut sources = Vec::with_capacity(self.pipelines.len());
        for pipeline in &self.pipelines {
            sources.push(SourceHealth {
                name: pipeline.source_name().to_owned(),
                status: pipeline.health_check().await,
            });
        }

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: aggregate_status(&sources),
            uptime_secs,
            sources,
        }
    }

    /// Source pipelines in configuration order.
    pub fn pipelines(&self) -> &[SourcePipeline] {
        &self.pipelines
    }

    /// Player context shared by all sources.
    pub fn context(&self) -> &Arc<PlayerContextStore> {
        &self.context
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &ChatguardConfig {
        &self.config
    }
}

/// Record daemon-level gauges (build info, watched sources).
fn record_daemon_metrics(source_count: usize) {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_SOURCES).set(source_count as f64);

    tracing::debug!(
        source_count = source_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to listen for Ctrl-C: {}", e))?;
    Ok("CTRL_C")
}
