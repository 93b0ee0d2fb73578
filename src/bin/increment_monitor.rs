use chrono::Utc;
use clap::Parser;
use increment_monitor::config::MonitorSettings;
use increment_monitor::datasource::introspector::SqlIntrospector;
use increment_monitor::datasource::router::DatasourceRouter;
use increment_monitor::db::services::statistics_service;
use increment_monitor::monitor::estimator::FootprintEstimator;
use increment_monitor::monitor::store::SeaOrmStore;
use increment_monitor::monitor::{MonitorOrchestrator, ShardSpec, WindowEngine};
use increment_monitor::VERSION;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML settings file
    #[arg(short, long)]
    config: Option<String>,

    /// Only run configurations owned by this shard, as `<index>/<total>`
    #[arg(short, long)]
    shard: Option<String>,

    /// Run once and exit instead of looping
    #[arg(long)]
    once: bool,
}

fn init_logging(log_dir: &str) {
    // JSON file, rotated daily
    let file_appender = rolling::daily(log_dir, "increment-monitor.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn run_retention_sweep(db: Arc<DatabaseConnection>, retention_days: i64, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        match statistics_service::purge_created_before(&db, cutoff).await {
            Ok(deleted) => info!(deleted, %cutoff, "Purged expired statistics."),
            Err(e) => error!(error = %e, "Retention sweep failed."),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Keep the plain version output without going through clap.
    if std::env::args().any(|arg| arg == "--version") {
        println!("increment-monitor version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let settings = match MonitorSettings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load monitor settings: {e}");
            return Err(e.into());
        }
    };

    init_logging(&settings.log_dir);
    info!("Starting increment monitor, version: {}", VERSION);

    let mut opt = ConnectOptions::new(settings.database_url.to_owned());
    opt.max_connections(5);
    let db = match Database::connect(opt).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to connect to the monitor database: {}", e);
            return Err(e.into());
        }
    };

    let router = Arc::new(DatasourceRouter::new(settings.datasources.clone()));
    info!(datasources = ?router.names(), "Registered datasources.");

    let introspector = Arc::new(SqlIntrospector::new(router));
    let estimator = Arc::new(FootprintEstimator::new(
        introspector.clone(),
        settings.estimation.to_estimator_settings(),
    ));
    let store = Arc::new(SeaOrmStore::new(db.clone()));
    let engine = Arc::new(WindowEngine::new(introspector, estimator, store.clone()));
    let orchestrator = MonitorOrchestrator::new(engine, store);

    let shard = args.shard.or(settings.shard.clone());
    if let Some(spec) = shard.as_deref() {
        ShardSpec::parse(spec)?;
    }

    if args.once {
        let summary = orchestrator.run(shard.as_deref()).await?;
        info!(?summary, "Single run complete.");
        return Ok(());
    }

    tokio::spawn(run_retention_sweep(
        db.clone(),
        settings.retention_days,
        Duration::from_secs(settings.retention_interval_seconds),
    ));

    let mut ticker = interval(Duration::from_secs(settings.run_interval_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        interval_seconds = settings.run_interval_seconds,
        shard = ?shard,
        "Monitoring loop started."
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match orchestrator.run(shard.as_deref()).await {
                    Ok(summary) => {
                        if summary.failed > 0 {
                            warn!(?summary, "Monitoring run finished with failures.");
                        }
                    }
                    Err(e) => error!(error = %e, "Monitoring run could not start."),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, exiting.");
                break;
            }
        }
    }

    Ok(())
}
