use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinsync_core::{SyncConfig, SyncOrchestrator, SyncOutcome};
use tracker::{
    CacheConfig, ChangePoller, HttpMetadataSource, MetadataCache, PollConfig, RemoteConfig,
    RequestMethod,
};

mod remote;
mod spool;

use remote::HttpTransport;
use spool::Spool;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Main entry point for the clinsync worker.
///
/// Drains write-intent drafts from the spool directory through the
/// synchronization orchestrator and keeps the metadata cache fresh via the
/// remote change feed.
///
/// # Environment Variables
/// - `CLINSYNC_BASE_URL`: remote platform API base URL (required)
/// - `CLINSYNC_USERNAME` / `CLINSYNC_PASSWORD`: basic-auth credentials
/// - `CLINSYNC_METADATA_TYPE`: metadata collection to resolve against
///   (default: "trackedEntityTypes")
/// - `CLINSYNC_SPOOL_DIR`: draft spool directory (default: "/var/spool/clinsync")
/// - `CLINSYNC_SPOOL_INTERVAL_SECS`: seconds between spool scans (default: 5)
/// - `CLINSYNC_POLL_INTERVAL_SECS`: seconds between change-feed polls (default: 30)
/// - `CLINSYNC_UPSERT_REQUIRED`: select create-or-update instead of create
///   for unresolved references ("1"/"true"/"yes")
///
/// # Returns
/// * `Ok(())` - on clean shutdown (ctrl-c)
/// * `Err(anyhow::Error)` - if startup configuration is invalid
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinsync_run=info".parse()?)
                .add_directive("clinsync_core=info".parse()?)
                .add_directive("tracker=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base_url = std::env::var("CLINSYNC_BASE_URL")
        .map_err(|_| anyhow::anyhow!("CLINSYNC_BASE_URL must be set"))?;
    let username = std::env::var("CLINSYNC_USERNAME").ok();
    let password = std::env::var("CLINSYNC_PASSWORD").ok();
    let spool_dir = env_or("CLINSYNC_SPOOL_DIR", "/var/spool/clinsync");

    let source = Arc::new(HttpMetadataSource::new(RemoteConfig {
        base_url: base_url.clone(),
        resource_type: env_or("CLINSYNC_METADATA_TYPE", "trackedEntityTypes"),
        username: username.clone(),
        password: password.clone(),
        timeout_secs: env_u64("CLINSYNC_TIMEOUT_SECS", 30),
    })?);
    let cache = Arc::new(MetadataCache::new(source.clone(), CacheConfig::default()));

    let poller = ChangePoller::new(
        source.clone(),
        MetadataCache::staleness_handle(&cache),
        PollConfig {
            interval_secs: env_u64("CLINSYNC_POLL_INTERVAL_SECS", 30),
            ..PollConfig::default()
        },
    );
    let poller_task = tokio::spawn(poller.run());

    let transport = Arc::new(HttpTransport::new(
        base_url,
        username,
        password,
        env_u64("CLINSYNC_TIMEOUT_SECS", 30),
    )?);
    let orchestrator = SyncOrchestrator::new(
        cache,
        transport,
        SyncConfig {
            upsert_required: env_flag("CLINSYNC_UPSERT_REQUIRED"),
            ..SyncConfig::default()
        },
    );

    let spool = Spool::open(&spool_dir)?;
    tracing::info!(spool = %spool_dir, "clinsync worker started");

    let mut scan = tokio::time::interval(Duration::from_secs(
        env_u64("CLINSYNC_SPOOL_INTERVAL_SECS", 5).max(1),
    ));
    tokio::pin! {
        let shutdown = tokio::signal::ctrl_c();
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = scan.tick() => {
                for (path, draft) in spool.scan() {
                    let report = orchestrator.synchronize(draft).await;
                    match &report.outcome {
                        SyncOutcome::Completed { reference } => {
                            tracing::info!(
                                draft = %path.display(),
                                reference = %report.reference,
                                resulting = %reference,
                                "draft synchronized"
                            );
                        }
                        SyncOutcome::Failed { kind } => {
                            tracing::warn!(
                                draft = %path.display(),
                                reference = %report.reference,
                                method = report
                                    .method
                                    .map(RequestMethod::to_wire)
                                    .unwrap_or("-"),
                                kind = %kind,
                                "draft failed, needs manual reconciliation"
                            );
                        }
                    }
                    if let Err(err) = spool.finish(&path, report.is_completed()) {
                        tracing::warn!(draft = %path.display(), error = %err, "could not file draft");
                    }
                }
            }
        }
    }

    poller_task.abort();
    Ok(())
}
