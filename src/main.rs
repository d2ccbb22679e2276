//! radtrack - Online-Session Tracker for RADIUS Accounting
//!
//! Binary entry point: loads the environment configuration, binds the
//! intake listener, and serves accounting events until shutdown.

use radtrack::config::TrackerConfig;
use radtrack::intake::{run_intake, IntakeStats};
use radtrack::tracker::TrackerStats;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides; default to info.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let config = Arc::new(TrackerConfig::from_env()?);

    info!("radtrack v{} starting", radtrack::VERSION);
    info!("  intake listener: {}", config.listen_addr);
    info!(
        "  session store:   {} (db {})",
        config.store_addr, config.store_db
    );
    info!(
        "  session TTL:     default {}s, ceiling {}s, margin {}s",
        config.default_ttl.as_secs(),
        config.max_ttl.as_secs(),
        config.ttl_margin.as_secs()
    );
    info!("  index TTL:       {}s", config.index_ttl.as_secs());
    info!(
        "  backoff:         {}ms..{}ms, jitter {}",
        config.backoff_base.as_millis(),
        config.backoff_max.as_millis(),
        config.backoff_jitter
    );
    info!("  janitor:         every {} interims", config.janitor_interval);

    let intake_stats = Arc::new(IntakeStats::new());
    let tracker_stats = Arc::new(TrackerStats::new());

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping tracker...");
    };

    tokio::select! {
        _ = run_intake(
            listener,
            Arc::clone(&config),
            Arc::clone(&intake_stats),
            Arc::clone(&tracker_stats),
        ) => {}
        _ = shutdown => {}
    }

    info!(
        events = tracker_stats.events_recorded.load(Ordering::Relaxed),
        ignored = tracker_stats.events_ignored.load(Ordering::Relaxed),
        store_failures = tracker_stats.store_failures.load(Ordering::Relaxed),
        sweeps = tracker_stats.janitor_sweeps.load(Ordering::Relaxed),
        "Tracker shutdown complete"
    );
    Ok(())
}
