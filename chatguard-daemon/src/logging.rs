//! Tracing setup for the daemon.
//!
//! Pipeline events are logged with `source`, `player` and `channel` fields,
//! so the JSON format is what log shippers should consume. `pretty` is for
//! watching a single server's chat from a terminal.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use chatguard_core::config::GeneralConfig;

/// HTTP client internals are only interesting when debugging a transport.
const QUIET_DEPENDENCIES: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn"];

/// Filter directives used when `RUST_LOG` is not set.
fn default_directives(level: &str) -> String {
    std::iter::once(level)
        .chain(QUIET_DEPENDENCIES.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer(format: &str) -> Result<BoxedLayer> {
    match format {
        "json" => Ok(tracing_subscriber::fmt::layer().json().boxed()),
        "pretty" => Ok(tracing_subscriber::fmt::layer().pretty().boxed()),
        other => Err(anyhow::anyhow!(
            "unknown log format '{}', expected 'json' or 'pretty'",
            other
        )),
    }
}

/// Install the global subscriber. Call once, before the orchestrator is built.
///
/// `RUST_LOG` replaces the configured level entirely when present.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let layer = format_layer(&config.log_format)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}
