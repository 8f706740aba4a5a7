//! Aggregated health reporting.
//!
//! Each watched log source reports through its pipeline's `health_check()`.
//! The overall daemon status is the worst status among all sources.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use chatguard_core::pipeline::HealthStatus;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all sources).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-source health reports.
    pub sources: Vec<SourceHealth>,
}

/// Health status for a single log source.
#[derive(Debug, Clone)]
pub struct SourceHealth {
    /// Source name from `[[sources]]` (e.g. "HiTech").
    pub name: String,
    /// Current health status of the source pipeline.
    pub status: HealthStatus,
}

/// Aggregate per-source health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
/// A daemon with no sources at all is Unhealthy.
pub fn aggregate_status(sources: &[SourceHealth]) -> HealthStatus {
    if sources.is_empty() {
        return HealthStatus::Unhealthy("no sources configured".to_owned());
    }

    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for source in sources {
        match &source.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", source.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", source.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}
