//! Notifier selection.
//!
//! All source pipelines share one notifier whose concrete transport is
//! picked from `[notifier]` at startup.

use chatguard_core::config::NotifierConfig;
use chatguard_pipeline::dispatch::{LogNotifier, Notifier, TelegramConfig, TelegramNotifier};
use chatguard_pipeline::error::ChatPipelineError;

/// Transport used by the daemon.
pub enum DaemonNotifier {
    /// Telegram Bot API.
    Telegram(TelegramNotifier),
    /// Log-only, used when the notifier is disabled.
    Log(LogNotifier),
}

impl DaemonNotifier {
    /// Build the transport described by the configuration.
    pub fn from_config(config: &NotifierConfig) -> Result<Self, ChatPipelineError> {
        if !config.enabled {
            tracing::warn!("notifier disabled, notifications will only be logged");
            return Ok(Self::Log(LogNotifier));
        }
        let notifier = TelegramNotifier::new(TelegramConfig::from_core(config))?;
        tracing::info!(chat_id = %config.chat_id, "telegram notifier configured");
        Ok(Self::Telegram(notifier))
    }

    /// Short transport name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Telegram(_) => "telegram",
            Self::Log(_) => "log",
        }
    }
}

impl Notifier for DaemonNotifier {
    async fn send(&self, text: &str) -> Result<(), ChatPipelineError> {
        match self {
            Self::Telegram(inner) => inner.send(text).await,
            Self::Log(inner) => inner.send(text).await,
        }
    }
}
