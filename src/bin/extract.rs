use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cadence_forecaster::config::{Config, BULK_FETCH_DELAY_SECS};
use cadence_forecaster::db::{self, DbWriter};
use cadence_forecaster::error::Result;
use cadence_forecaster::prompt::ask_stdin;
use cadence_forecaster::strava::{extract_all, RateLimiter, StravaClient};

// ---------------------------------------------------------------------------
// Bulk extraction: snapshot every run (or one run) into the database
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let pool = db::connect(&cfg.db_path).await?;
    let writer = DbWriter::new(pool);
    let strava = StravaClient::connect(&cfg).await?;

    let only = ask_stdin("Enter run id to extract (blank for all runs): ")?;
    let activities = match only {
        Some(id) => vec![strava.get_activity(id).await?],
        None => strava.list_runs().await?,
    };
    info!(activities = activities.len(), "[EXTRACT] {} activities to extract", activities.len());

    let mut limiter = RateLimiter::new(Duration::from_secs(BULK_FETCH_DELAY_SECS));
    let report = extract_all(&strava, &activities, &writer, &mut limiter).await?;

    if !report.error_log.is_empty() {
        warn!(
            failed = report.error_log.len(),
            "[EXTRACT] failed activity ids: {:?}",
            report.error_log,
        );
    }
    Ok(())
}
