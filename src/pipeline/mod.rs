pub mod features;
pub mod outliers;
pub mod resample;

use chrono::{DateTime, Utc};

use crate::config::{CADENCE_OUTLIER_Z, FORECAST_PERIOD};
use crate::error::Result;
use crate::types::{FeatureRow, RawSample};

pub use features::build_features;
pub use outliers::filter_cadence_outliers;
pub use resample::{resample, ResampleOptions};

/// Raw stream → outlier-filtered → 5s grid → feature table.
pub fn prepare_features(
    samples: Vec<RawSample>,
    start: DateTime<Utc>,
    opts: ResampleOptions,
) -> Result<Vec<FeatureRow>> {
    let samples = filter_cadence_outliers(samples, CADENCE_OUTLIER_Z);
    let rows = resample(&samples, opts)?;
    Ok(build_features(rows, start, FORECAST_PERIOD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(time: u32, cadence: f64) -> RawSample {
        RawSample {
            time,
            cadence,
            distance: f64::from(time) * 2.8,
            altitude: 10.0,
            heartrate: 150.0,
            temperature: 20.0,
            pace: 2.8,
            position: None,
            velocity_smooth: None,
            grade_smooth: None,
        }
    }

    #[test]
    fn spike_at_time_zero_is_filtered_before_the_first_sample_is_dropped() {
        // A 2000 spm reading at t=0, a marked 90 spm sample at t=5, steady 84 after.
        let mut raw = vec![sample(0, 2000.0), sample(5, 90.0)];
        raw.extend((2..=200).map(|k| sample(k * 5, 84.0)));
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();

        let features = prepare_features(raw, start, ResampleOptions::default()).unwrap();

        // The spike goes first, so the resampler discards the t=5 sample and
        // tick 5 is averaged from t=10 and t=15 instead of copying 90.
        assert_eq!(features.len(), 200);
        assert_eq!(features[0].interval.tick, 5);
        assert_eq!(features[0].interval.cadence, 84.0);
        assert!(features.iter().all(|f| f.interval.cadence == 84.0));
        assert_eq!(features[0].ds, start + chrono::Duration::seconds(5));
    }
}
