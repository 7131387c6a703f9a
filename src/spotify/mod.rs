pub mod client;
pub mod playback;
pub mod tempo;

pub use client::{track_id, SpotifyClient};
pub use playback::run_playback;
pub use tempo::{plan_playback, speed_change, PlannedStep, PlaybackAction, TempoBins, HORIZON_SECS};
