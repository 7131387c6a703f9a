use std::time::Duration;

use tracing::info;

use crate::error::Result;
use crate::spotify::client::SpotifyClient;
use crate::spotify::tempo::{PlannedStep, PlaybackAction};

/// Carry out a playback plan, waiting `pause` between horizons.
pub async fn run_playback(
    client: &SpotifyClient,
    plan: &[PlannedStep],
    device_id: Option<&str>,
    pause: Duration,
) -> Result<()> {
    for (i, step) in plan.iter().enumerate() {
        info!(
            horizon = step.horizon,
            bin = %step.bin,
            "[PLAYBACK] horizon {} at {:.0}s, music {}",
            step.horizon,
            step.elapsed_secs,
            step.bin,
        );
        for action in &step.actions {
            match action {
                PlaybackAction::Play(track) => {
                    info!(tempo = track.tempo, "[PLAYBACK] play {} ({:.1} bpm)", track.uri, track.tempo);
                    client.play_track(&track.uri, device_id).await?;
                }
                PlaybackAction::Switch(track) => {
                    info!(tempo = track.tempo, "[PLAYBACK] switch to {} ({:.1} bpm)", track.uri, track.tempo);
                    client.queue(&track.uri).await?;
                    client.next_track().await?;
                }
                PlaybackAction::Queue(track) => {
                    info!(tempo = track.tempo, "[PLAYBACK] queue {} ({:.1} bpm)", track.uri, track.tempo);
                    client.queue(&track.uri).await?;
                }
            }
        }
        if i + 1 < plan.len() {
            tokio::time::sleep(pause).await;
        }
    }
    Ok(())
}
