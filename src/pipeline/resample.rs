use tracing::debug;

use crate::config::INTERVAL_SECS;
use crate::error::{AppError, Result};
use crate::types::{IntervalRow, LatLng, RawSample};

#[derive(Debug, Clone, Copy, Default)]
pub struct ResampleOptions {
    /// Carry averaged lat/lng through to the interval rows.
    pub keep_position: bool,
}

/// Resample raw device samples onto the fixed 5-second grid.
///
/// `samples` must be ordered by `time`. The first sample is discarded
/// (devices report non-zero distance at time 0), then one row is produced
/// for every multiple of the tick width in `(0, max_time]`.
///
/// Ticks with an exact raw sample copy it. Missing ticks take the two raw
/// samples nearest in time and average every column, except distance which
/// is prorated from the later of the two neighbours.
pub fn resample(samples: &[RawSample], opts: ResampleOptions) -> Result<Vec<IntervalRow>> {
    if samples.len() < 2 {
        return Err(AppError::InsufficientData {
            what: "need at least 2 raw samples",
            found: samples.len(),
        });
    }
    let samples = &samples[1..];

    let max_time = samples.iter().map(|s| s.time).max().unwrap_or(0);
    let tick_count = max_time / INTERVAL_SECS;

    let mut rows = Vec::with_capacity(tick_count as usize);
    let mut interpolated = 0usize;

    for k in 1..=tick_count {
        let tick = k * INTERVAL_SECS;
        let idx = samples.partition_point(|s| s.time < tick);
        let row = match samples.get(idx) {
            Some(s) if s.time == tick => exact_row(tick, s, opts),
            _ => {
                interpolated += 1;
                let (a, b) = nearest_pair(samples, idx, tick);
                interpolated_row(tick, a, b, opts)
            }
        };
        rows.push(row);
    }

    debug!(
        raw = samples.len(),
        ticks = rows.len(),
        interpolated,
        "[RESAMPLE] {} raw samples -> {} ticks ({} interpolated)",
        samples.len(),
        rows.len(),
        interpolated,
    );
    Ok(rows)
}

fn exact_row(tick: u32, s: &RawSample, opts: ResampleOptions) -> IntervalRow {
    IntervalRow {
        tick,
        temperature: s.temperature,
        cadence: s.cadence,
        distance: s.distance,
        altitude: s.altitude,
        heartrate: s.heartrate,
        pace: s.pace,
        position: if opts.keep_position { s.position } else { None },
    }
}

/// The two samples closest to `tick`, ties broken toward the earlier sample.
/// `idx` is the first sample with `time >= tick`; in a time-ordered slice
/// the two nearest lie within two positions of it, widened backwards over
/// any earlier samples sharing the lowest candidate's time.
fn nearest_pair(samples: &[RawSample], idx: usize, tick: u32) -> (&RawSample, &RawSample) {
    let lo_time = samples[idx.saturating_sub(2).min(samples.len() - 1)].time;
    let lo = samples.partition_point(|s| s.time < lo_time);
    let hi = (idx + 2).min(samples.len());
    let mut candidates: Vec<usize> = (lo..hi).collect();
    candidates.sort_by_key(|&i| (samples[i].time.abs_diff(tick), i));

    let first = &samples[candidates[0]];
    let second = candidates.get(1).map(|&i| &samples[i]).unwrap_or(first);
    (first, second)
}

fn interpolated_row(tick: u32, a: &RawSample, b: &RawSample, opts: ResampleOptions) -> IntervalRow {
    let mean = |x: f64, y: f64| (x + y) / 2.0;
    let later = if b.time >= a.time { b } else { a };

    // Proration never pushes distance past the later neighbour's reading.
    let factor = if later.time == 0 {
        0.0
    } else {
        (f64::from(tick) / f64::from(later.time)).clamp(0.0, 1.0)
    };

    let position = if opts.keep_position {
        match (a.position, b.position) {
            (Some(p), Some(q)) => Some(LatLng {
                lat: mean(p.lat, q.lat),
                lng: mean(p.lng, q.lng),
            }),
            (p, q) => p.or(q),
        }
    } else {
        None
    };

    IntervalRow {
        tick,
        temperature: mean(a.temperature, b.temperature),
        cadence: mean(a.cadence, b.cadence),
        distance: later.distance * factor,
        altitude: mean(a.altitude, b.altitude),
        heartrate: mean(a.heartrate, b.heartrate),
        pace: mean(a.pace, b.pace),
        position,
    }
}
