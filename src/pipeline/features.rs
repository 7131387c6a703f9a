use chrono::{DateTime, Duration, Utc};

use crate::types::{FeatureRow, IntervalRow};

/// Attach lag, delta and forward altitude features to the resampled rows.
///
/// `start` anchors tick offsets to absolute timestamps. `horizon` is the
/// number of ticks summed into `altitude_forecast`; it must equal the
/// walk-forward forecast period.
pub fn build_features(rows: Vec<IntervalRow>, start: DateTime<Utc>, horizon: usize) -> Vec<FeatureRow> {
    let mut out = Vec::with_capacity(rows.len());
    let mut prev: Option<(f64, f64)> = None;

    for row in rows {
        // Row 0 has no predecessor: altitude repeats itself, distance starts from zero.
        let (prev_altitude, prev_distance) = prev.unwrap_or((row.altitude, 0.0));
        prev = Some((row.altitude, row.distance));

        out.push(FeatureRow {
            ds: start + Duration::seconds(i64::from(row.tick)),
            prev_altitude,
            altitude_delta: row.altitude - prev_altitude,
            prev_distance,
            distance_delta: row.distance - prev_distance,
            altitude_forecast: 0.0,
            interval: row,
        });
    }

    let deltas: Vec<f64> = out.iter().map(|r| r.altitude_delta).collect();
    for (i, row) in out.iter_mut().enumerate() {
        let end = (i + horizon).min(deltas.len());
        row.altitude_forecast = deltas[i..end].iter().sum();
    }

    out
}
