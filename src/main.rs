use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cadence_forecaster::config::{Config, RUN_SELECTION_SEED, TRAIN_FRACTION};
use cadence_forecaster::db::{self, DbWriter};
use cadence_forecaster::error::{AppError, Result};
use cadence_forecaster::forecast::{LinearTrendModel, WalkForward, WalkForwardConfig};
use cadence_forecaster::pipeline::{prepare_features, ResampleOptions};
use cadence_forecaster::prompt::ask_stdin;
use cadence_forecaster::recorder::{record_results, run_label};
use cadence_forecaster::strava::{choose_training_run, StravaClient};
use cadence_forecaster::types::{ActivitySummary, RawSample};

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

    let run_id = ask_stdin("Enter run id (blank for a random training run): ")?;
    let (activity, samples) = load_run(&cfg, &writer, run_id).await?;
    info!(
        activity_id = activity.id,
        samples = samples.len(),
        "[RUN] {} '{}' started {} ({} raw samples)",
        activity.id,
        activity.name,
        activity.start_date,
        samples.len(),
    );

    let opts = ResampleOptions { keep_position: cfg.keep_position };
    let features = prepare_features(samples, activity.start_date, opts)?;

    let driver = WalkForward::new(
        WalkForwardConfig { train_period: cfg.train_period, ..WalkForwardConfig::default() },
        LinearTrendModel::new,
    );
    let out = driver.run(features)?;

    let results = record_results(&writer, run_id, &out.predictions, &out.features).await?;
    info!(
        "[RUN] complete | label: {} | horizons: {} | feature rows: {}",
        run_label(run_id),
        results.len(),
        out.features.len(),
    );
    Ok(())
}

/// An extracted snapshot when one exists for the requested id, otherwise the
/// activity straight from the API. Without an id a training run is drawn.
async fn load_run(
    cfg: &Config,
    writer: &DbWriter,
    run_id: Option<u64>,
) -> Result<(ActivitySummary, Vec<RawSample>)> {
    if let Some(id) = run_id {
        if let Some(snapshot) = writer.load_activity(id).await? {
            info!(activity_id = id, "[RUN] using extracted snapshot of {id}");
            return Ok(snapshot);
        }
    }

    let strava = StravaClient::connect(cfg).await?;
    let id = match run_id {
        Some(id) => id,
        None => {
            let ids: Vec<u64> = strava.list_runs().await?.iter().map(|r| r.id).collect();
            let chosen = choose_training_run(&ids, TRAIN_FRACTION, RUN_SELECTION_SEED)
                .ok_or(AppError::InsufficientData {
                    what: "no training run to choose from",
                    found: ids.len(),
                })?;
            info!(activity_id = chosen, "[RUN] no id given, picked training run {chosen} of {}", ids.len());
            chosen
        }
    };

    let activity = strava.get_activity(id).await?;
    let samples = strava.get_streams(id).await?;
    Ok((activity, samples))
}
