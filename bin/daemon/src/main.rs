mod config;

use config::DaemonConfig;
use passbook_automation::{AutomationDriver, CdpConfig, CdpDriver};
use passbook_booking::{AuthPolicy, BookingPipeline, BookingPolicy, LibCalSite, SessionRegistry};
use passbook_scheduler::{
    Clock, FilePersistence, JobStore, OpeningRule, PlaintextFileSecretStore, Scheduler,
    SystemClock,
};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config =
        DaemonConfig::from_env().unwrap_or_else(|e| fail("failed to load configuration", e));
    tracing::info!(data_dir = %config.data_dir.display(), "Loaded configuration");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Storage
    let persistence = FilePersistence::open(&config.data_dir)
        .await
        .unwrap_or_else(|e| fail("failed to open job storage", e));
    let secrets = PlaintextFileSecretStore::open(config.data_dir.join("secrets"))
        .await
        .unwrap_or_else(|e| fail("failed to open secret storage", e));
    let store = Arc::new(JobStore::new(Arc::new(persistence), clock.clone()));

    // Browser automation
    let driver: Arc<dyn AutomationDriver> = Arc::new(CdpDriver::new(CdpConfig {
        executable: config.browser.executable.clone(),
        headless: config.browser.headless,
        launch_timeout: Duration::from_secs(config.browser.launch_timeout_seconds),
        ..CdpConfig::default()
    }));
    let site = Arc::new(
        LibCalSite::new(&config.site.base_url)
            .unwrap_or_else(|e| fail("invalid booking site", e)),
    );
    let registry = Arc::new(SessionRegistry::new(driver.clone(), clock.clone()));
    let pipeline = BookingPipeline::new(
        driver,
        site,
        registry.clone(),
        AuthPolicy {
            session_ttl: chrono::Duration::minutes(config.session.ttl_minutes),
            ..AuthPolicy::default()
        },
        BookingPolicy::default(),
    );

    let rule = OpeningRule::new(
        config.schedule.days_before,
        config.schedule.open_hour,
        &config.schedule.timezone,
    )
    .unwrap_or_else(|e| fail("invalid booking schedule", e));
    let scheduler = Scheduler::new(store, Arc::new(secrets), Arc::new(pipeline), rule, clock);

    // Recover jobs from the previous run
    let summary = scheduler
        .rehydrate()
        .await
        .unwrap_or_else(|e| fail("failed to restore jobs", e));
    tracing::info!(
        total = summary.total,
        rearmed = summary.rearmed,
        completed = summary.completed,
        failed = summary.failed,
        cancelled = summary.cancelled,
        orphaned = summary.orphaned,
        "Restored jobs"
    );

    // Spawn periodic session cleanup task
    let sweep_registry = registry.clone();
    let sweep_interval = Duration::from_secs(config.session.sweep_interval_seconds.max(1));
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            let released = sweep_registry.sweep_expired().await;
            if released > 0 {
                tracing::debug!(released_sessions = released, "Periodic session cleanup");
            }
        }
    });

    tracing::info!("passbook scheduler running");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }

    tracing::info!("Shutting down");
    sweeper.abort();
    scheduler.shutdown();
    let released = registry.release_all().await;
    if released > 0 {
        tracing::info!(released_sessions = released, "Closed open sessions");
    }
}

fn fail(context: &str, error: impl Display) -> ! {
    tracing::error!(error = %error, "{context}");
    std::process::exit(1)
}
