use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{FORECAST_PERIOD, INTERVAL_SECS, TEMPO_CHANGE_BAND};
use crate::db::models::ResultRecord;
use crate::error::{AppError, Result};
use crate::types::{TempoBin, TrackFeatures};

/// Length of one forecast horizon in seconds.
pub const HORIZON_SECS: f64 = (FORECAST_PERIOD as u32 * INTERVAL_SECS) as f64;

/// Playlist tracks split into tempo terciles.
#[derive(Debug, Clone, Default)]
pub struct TempoBins {
    pub slower: Vec<TrackFeatures>,
    pub hold: Vec<TrackFeatures>,
    pub faster: Vec<TrackFeatures>,
    /// Tercile cut points (q1/3, q2/3).
    pub cuts: (f64, f64),
}

impl TempoBins {
    /// Cut points are linear-interpolated quantiles; bins are right-inclusive,
    /// with the lowest tempo in the slower bin.
    pub fn from_tracks(tracks: Vec<TrackFeatures>) -> Result<Self> {
        if tracks.is_empty() {
            return Err(AppError::InsufficientData {
                what: "playlist has no tracks with audio features",
                found: 0,
            });
        }
        let mut tempos: Vec<f64> = tracks.iter().map(|t| t.tempo).collect();
        tempos.sort_by(f64::total_cmp);
        let cuts = (quantile(&tempos, 1.0 / 3.0), quantile(&tempos, 2.0 / 3.0));

        let mut bins = TempoBins { cuts, ..Default::default() };
        for track in tracks {
            match bin_for(track.tempo, cuts) {
                TempoBin::Slower => bins.slower.push(track),
                TempoBin::Hold => bins.hold.push(track),
                TempoBin::Faster => bins.faster.push(track),
            }
        }
        Ok(bins)
    }

    pub fn tracks(&self, bin: TempoBin) -> &[TrackFeatures] {
        match bin {
            TempoBin::Slower => &self.slower,
            TempoBin::Hold => &self.hold,
            TempoBin::Faster => &self.faster,
        }
    }

    /// Random track from `bin`, falling back to the nearest non-empty bin
    /// when ties in tempo left it empty.
    pub fn pick<R: Rng + ?Sized>(&self, bin: TempoBin, rng: &mut R) -> Option<&TrackFeatures> {
        let order = match bin {
            TempoBin::Slower => [TempoBin::Slower, TempoBin::Hold, TempoBin::Faster],
            TempoBin::Hold => [TempoBin::Hold, TempoBin::Slower, TempoBin::Faster],
            TempoBin::Faster => [TempoBin::Faster, TempoBin::Hold, TempoBin::Slower],
        };
        order.into_iter().find_map(|b| self.tracks(b).choose(rng))
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn bin_for(tempo: f64, (q1, q2): (f64, f64)) -> TempoBin {
    if tempo <= q1 {
        TempoBin::Slower
    } else if tempo <= q2 {
        TempoBin::Hold
    } else {
        TempoBin::Faster
    }
}

/// Music speed wanted for one horizon: faster when the forecast cadence is
/// more than the band above the observed cadence, slower when below it.
pub fn speed_change(predicted: f64, actual: f64) -> TempoBin {
    if predicted > actual * (1.0 + TEMPO_CHANGE_BAND) {
        TempoBin::Faster
    } else if predicted < actual * (1.0 - TEMPO_CHANGE_BAND) {
        TempoBin::Slower
    } else {
        TempoBin::Hold
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackAction {
    /// Start playback with this track.
    Play(TrackFeatures),
    /// Tempo changed: queue this track and skip to it.
    Switch(TrackFeatures),
    /// Current track ends within the horizon: queue this one after it.
    Queue(TrackFeatures),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    /// Index into the recorded results.
    pub horizon: usize,
    /// Seconds since run start at the horizon.
    pub elapsed_secs: f64,
    pub bin: TempoBin,
    pub actions: Vec<PlaybackAction>,
}

/// Plan playback over recorded results starting at `start`.
///
/// The first horizon plays a track from its bin. Each later horizon whose
/// bin differs switches to a track from the new bin. Whenever the queued
/// music would run out within the next horizon another track from the
/// current bin is queued.
pub fn plan_playback<R: Rng + ?Sized>(
    results: &[ResultRecord],
    start: usize,
    bins: &TempoBins,
    rng: &mut R,
) -> Result<Vec<PlannedStep>> {
    let Some(first) = results.get(start) else {
        return Err(AppError::Config(format!(
            "start horizon {start} is past the {} recorded horizons",
            results.len()
        )));
    };
    let no_tracks = || AppError::InsufficientData { what: "no track to play", found: 0 };

    let mut state = speed_change(first.yhat, first.cadence);
    let mut steps = Vec::with_capacity(results.len() - start);
    let mut playback_end = 0.0;

    for (horizon, row) in results.iter().enumerate().skip(start) {
        let elapsed = row.tick as f64;
        let wanted = speed_change(row.yhat, row.cadence);
        let mut actions = Vec::new();

        if horizon == start {
            let track = bins.pick(state, rng).ok_or_else(no_tracks)?.clone();
            playback_end = elapsed + track.duration_secs;
            actions.push(PlaybackAction::Play(track));
        } else if wanted != state {
            state = wanted;
            let track = bins.pick(state, rng).ok_or_else(no_tracks)?.clone();
            playback_end = elapsed + track.duration_secs;
            actions.push(PlaybackAction::Switch(track));
        }

        if playback_end - elapsed < HORIZON_SECS {
            let track = bins.pick(state, rng).ok_or_else(no_tracks)?.clone();
            playback_end += track.duration_secs;
            actions.push(PlaybackAction::Queue(track));
        }

        steps.push(PlannedStep { horizon, elapsed_secs: elapsed, bin: state, actions });
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn track(id: &str, tempo: f64, duration_secs: f64) -> TrackFeatures {
        TrackFeatures {
            id: id.to_string(),
            uri: format!("spotify:track:{id}"),
            tempo,
            duration_secs,
        }
    }

    fn playlist() -> Vec<TrackFeatures> {
        vec![
            track("a", 120.0, 200.0),
            track("b", 128.0, 200.0),
            track("c", 140.0, 200.0),
            track("d", 150.0, 200.0),
            track("e", 160.0, 200.0),
            track("f", 174.0, 200.0),
        ]
    }

    fn record(tick: i64, yhat: f64, cadence: f64) -> ResultRecord {
        ResultRecord {
            label: "train0".to_string(),
            tick,
            ds: Utc.with_ymd_and_hms(2021, 5, 2, 7, 30, 0).unwrap() + chrono::Duration::seconds(tick),
            yhat,
            yhat_lower: yhat - 2.0,
            yhat_upper: yhat + 2.0,
            cadence,
            distance: 0.0,
            altitude: 0.0,
            altitude_delta: 0.0,
            altitude_forecast: 0.0,
            temperature: 20.0,
            heartrate: 150.0,
        }
    }

    #[test]
    fn terciles_split_evenly() {
        let bins = TempoBins::from_tracks(playlist()).unwrap();
        let ids = |b: TempoBin| bins.tracks(b).iter().map(|t| t.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(TempoBin::Slower), vec!["a", "b"]);
        assert_eq!(ids(TempoBin::Hold), vec!["c", "d"]);
        assert_eq!(ids(TempoBin::Faster), vec!["e", "f"]);
        // (n-1)/3 = 5/3 → 128 + 2/3 * 12
        assert!((bins.cuts.0 - 136.0).abs() < 1e-9);
    }

    #[test]
    fn cut_points_are_right_inclusive() {
        let tracks = vec![track("a", 100.0, 1.0), track("b", 110.0, 1.0), track("c", 120.0, 1.0), track("d", 130.0, 1.0)];
        let bins = TempoBins::from_tracks(tracks).unwrap();
        // q1 = 110, q2 = 120
        assert_eq!(bins.tracks(TempoBin::Slower).len(), 2);
        assert_eq!(bins.tracks(TempoBin::Hold).len(), 1);
        assert_eq!(bins.tracks(TempoBin::Faster).len(), 1);
    }

    #[test]
    fn empty_playlist_is_rejected() {
        assert!(TempoBins::from_tracks(Vec::new()).is_err());
    }

    #[test]
    fn equal_tempos_fall_back_to_any_bin() {
        let bins = TempoBins::from_tracks(vec![track("a", 150.0, 1.0), track("b", 150.0, 1.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(bins.tracks(TempoBin::Faster).is_empty());
        assert!(bins.pick(TempoBin::Faster, &mut rng).is_some());
    }

    #[test]
    fn speed_change_band() {
        assert_eq!(speed_change(90.0, 85.0), TempoBin::Faster);
        assert_eq!(speed_change(80.0, 85.0), TempoBin::Slower);
        assert_eq!(speed_change(86.0, 85.0), TempoBin::Hold);
        assert_eq!(speed_change(85.0, 85.0), TempoBin::Hold);
    }

    #[test]
    fn plan_switches_on_bin_change_and_queues_before_track_ends() {
        let bins = TempoBins::from_tracks(playlist()).unwrap();
        let results: Vec<_> = (0..12)
            .map(|i| {
                let cadence = 85.0;
                let yhat = if i < 4 { 85.0 } else { 92.0 };
                record(210 + i * 30, yhat, cadence)
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(444);

        let plan = plan_playback(&results, 0, &bins, &mut rng).unwrap();
        assert_eq!(plan.len(), 12);
        assert!(matches!(plan[0].actions.as_slice(), [PlaybackAction::Play(t)] if bins.hold.contains(t)));
        assert!(plan[1].actions.is_empty());
        assert!(matches!(plan[4].actions.as_slice(), [PlaybackAction::Switch(t)] if bins.faster.contains(t)));
        assert_eq!(plan[4].bin, TempoBin::Faster);

        // Switch at 330 s with a 200 s track ends at 530 s; the horizon at
        // 510 s is the first with less than 30 s left.
        let queued: Vec<_> = plan
            .iter()
            .filter(|s| s.actions.iter().any(|a| matches!(a, PlaybackAction::Queue(_))))
            .map(|s| s.elapsed_secs)
            .collect();
        assert_eq!(queued, vec![510.0]);
    }

    #[test]
    fn plan_is_reproducible_with_a_seeded_rng() {
        let bins = TempoBins::from_tracks(playlist()).unwrap();
        let results: Vec<_> = (0..20).map(|i| record(i * 30, 80.0 + (i % 5) as f64 * 3.0, 86.0)).collect();
        let a = plan_playback(&results, 3, &bins, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = plan_playback(&results, 3, &bins, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].horizon, 3);
    }

    #[test]
    fn start_past_the_end_is_an_error() {
        let bins = TempoBins::from_tracks(playlist()).unwrap();
        let results = vec![record(0, 85.0, 85.0)];
        assert!(plan_playback(&results, 1, &bins, &mut StdRng::seed_from_u64(1)).is_err());
    }
}
