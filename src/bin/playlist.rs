use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cadence_forecaster::config::Config;
use cadence_forecaster::db::{self, DbWriter};
use cadence_forecaster::error::{AppError, Result};
use cadence_forecaster::prompt::ask_stdin;
use cadence_forecaster::recorder::run_label;
use cadence_forecaster::spotify::{
    plan_playback, run_playback, track_id, SpotifyClient, TempoBins, HORIZON_SECS,
};

// ---------------------------------------------------------------------------
// Tempo-driven playback over a recorded forecast
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

    let run_id = ask_stdin("Enter run id of a recorded forecast (blank for the default run): ")?;
    let label = run_label(run_id);
    let results = writer.load_results(&label).await?;
    if results.is_empty() {
        return Err(AppError::InsufficientData {
            what: "no recorded forecast for this run, run `forecast` first",
            found: 0,
        });
    }
    info!(label = %label, horizons = results.len(), "[PLAYLIST] {} horizons recorded for '{}'", results.len(), label);

    let spotify = SpotifyClient::connect(&cfg).await?;
    let playlist_id = spotify.resolve_playlist(cfg.playlist_id.as_deref()).await?;
    let uris = spotify.playlist_tracks(&playlist_id).await?;
    let ids: Vec<String> = uris.iter().map(|u| track_id(u).to_string()).collect();
    let bins = TempoBins::from_tracks(spotify.audio_features(&ids).await?)?;
    info!(
        slower = bins.slower.len(),
        hold = bins.hold.len(),
        faster = bins.faster.len(),
        "[PLAYLIST] {} tracks binned at {:.1} / {:.1} bpm",
        bins.slower.len() + bins.hold.len() + bins.faster.len(),
        bins.cuts.0,
        bins.cuts.1,
    );

    let start = ask_stdin(&format!("Start at horizon (0-{}, blank for 0): ", results.len() - 1))?
        .unwrap_or(0) as usize;
    let mut rng = StdRng::from_entropy();
    let plan = plan_playback(&results, start, &bins, &mut rng)?;

    let device = spotify.device_id(&cfg.device_type).await?;
    if device.is_none() {
        warn!("[PLAYLIST] no '{}' device found, using the active device", cfg.device_type);
    }
    run_playback(&spotify, &plan, device.as_deref(), Duration::from_secs_f64(HORIZON_SECS)).await
}
