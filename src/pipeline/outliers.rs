use tracing::info;

use crate::types::RawSample;

/// Drop samples whose cadence z-score magnitude reaches `z_max`.
/// Uses the population standard deviation; a flat cadence series has no
/// outliers and is returned whole.
pub fn filter_cadence_outliers(samples: Vec<RawSample>, z_max: f64) -> Vec<RawSample> {
    if samples.is_empty() {
        return samples;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.cadence).sum::<f64>() / n;
    let var = samples.iter().map(|s| (s.cadence - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std == 0.0 || !std.is_finite() {
        return samples;
    }

    let before = samples.len();
    let kept: Vec<RawSample> = samples
        .into_iter()
        .filter(|s| ((s.cadence - mean) / std).abs() < z_max)
        .collect();

    let dropped = before - kept.len();
    if dropped > 0 {
        info!(dropped, "[OUTLIER] dropped {dropped} samples with |z| >= {z_max}");
    }
    kept
}
