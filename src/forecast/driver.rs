use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::{FORECAST_PERIOD, INTERVAL_SECS, TRAIN_PERIOD};
use crate::error::{AppError, Result};
use crate::forecast::model::{FramePoint, Forecaster, Regressor};
use crate::forecast::quiet::OutputSilencer;
use crate::forecast::timing::StepTimings;
use crate::types::{FeatureRow, PredictionPoint};

#[derive(Debug, Clone, Copy)]
pub struct WalkForwardConfig {
    /// Initial training window (ticks).
    pub train_period: usize,
    /// Horizon forecast at each step (ticks).
    pub forecast_period: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_period: TRAIN_PERIOD,
            forecast_period: FORECAST_PERIOD,
        }
    }
}

pub struct WalkForwardOutput {
    /// Mean forecast per completed horizon, keyed by the horizon's first timestamp.
    pub predictions: BTreeMap<DateTime<Utc>, PredictionPoint>,
    pub features: Vec<FeatureRow>,
    pub timings: StepTimings,
}

/// Number of complete horizons that fit after the initial training window.
pub fn iteration_count(rows: usize, train_period: usize, forecast_period: usize) -> usize {
    if forecast_period == 0 {
        return 0;
    }
    rows.saturating_sub(train_period) / forecast_period
}

/// Walk-forward evaluator: refits a fresh model on a growing prefix of the
/// feature table and forecasts the following horizon, one step at a time.
///
/// Future regressor values come straight from the feature table, so only
/// cadence is genuinely forecast.
pub struct WalkForward<F> {
    cfg: WalkForwardConfig,
    regressors: Vec<Regressor>,
    make_model: F,
}

impl<F, M> WalkForward<F>
where
    F: Fn() -> M,
    M: Forecaster,
{
    pub fn new(cfg: WalkForwardConfig, make_model: F) -> Self {
        Self {
            cfg,
            regressors: Regressor::ALL.to_vec(),
            make_model,
        }
    }

    pub fn run(&self, features: Vec<FeatureRow>) -> Result<WalkForwardOutput> {
        let WalkForwardConfig { train_period, forecast_period } = self.cfg;
        if train_period == 0 || forecast_period == 0 {
            return Err(AppError::Config(
                "train_period and forecast_period must be positive".to_string(),
            ));
        }

        let iters = iteration_count(features.len(), train_period, forecast_period);
        info!(
            rows = features.len(),
            iters,
            "[WALK] {} rows, {} steps (train={} ticks, horizon={} ticks)",
            features.len(),
            iters,
            train_period,
            forecast_period,
        );

        let mut predictions = BTreeMap::new();
        let mut timings = StepTimings::new();

        for step in 0..iters {
            let started = Instant::now();
            let window = train_period + step * forecast_period;
            let point = self
                .step(&features, window)
                .map_err(|e| match e {
                    AppError::ModelFit(msg) => AppError::ModelFit(format!("step {step}: {msg}")),
                    other => other,
                })?;
            timings.record(started.elapsed());

            debug!(
                step,
                window,
                yhat = point.yhat,
                "[WALK] step {}/{} window={} ds={} yhat={:.2}",
                step + 1,
                iters,
                window,
                point.ds,
                point.yhat,
            );
            predictions.insert(point.ds, point);
        }

        if let Some((p50, p95, p99)) = timings.percentiles() {
            info!(
                steps = timings.len(),
                p50_us = p50,
                p95_us = p95,
                p99_us = p99,
                "[WALK] done | {} steps | step latency p50={}us p95={}us p99={}us",
                timings.len(),
                p50,
                p95,
                p99,
            );
        }

        Ok(WalkForwardOutput { predictions, features, timings })
    }

    /// One fit/predict cycle on `features[..window]`.
    fn step(&self, features: &[FeatureRow], window: usize) -> Result<PredictionPoint> {
        let forecast_period = self.cfg.forecast_period;

        let mut frame: Vec<FramePoint> = features[..window]
            .iter()
            .map(|row| FramePoint {
                ds: row.ds,
                regressors: self.regressor_values(row),
                y: Some(row.interval.cadence),
            })
            .collect();

        let mut model = (self.make_model)();
        {
            let _quiet = OutputSilencer::new()?;
            model.fit(&frame)
        }?;

        // Extend the time axis by one horizon and attach the known regressors.
        let last_ds = features[window - 1].ds;
        for k in 1..=forecast_period {
            let row = &features[window + k - 1];
            frame.push(FramePoint {
                ds: last_ds + Duration::seconds(i64::from(INTERVAL_SECS) * k as i64),
                regressors: self.regressor_values(row),
                y: None,
            });
        }

        let forecast = model.predict(&frame)?;
        if forecast.len() != frame.len() {
            return Err(AppError::ModelFit(format!(
                "model returned {} rows for a frame of {}",
                forecast.len(),
                frame.len()
            )));
        }

        let tail = &forecast[forecast.len() - forecast_period..];
        let n = tail.len() as f64;
        Ok(PredictionPoint {
            ds: tail[0].ds,
            tick: features[window].interval.tick,
            yhat: tail.iter().map(|f| f.yhat).sum::<f64>() / n,
            yhat_lower: tail.iter().map(|f| f.yhat_lower).sum::<f64>() / n,
            yhat_upper: tail.iter().map(|f| f.yhat_upper).sum::<f64>() / n,
        })
    }

    fn regressor_values(&self, row: &FeatureRow) -> Vec<f64> {
        self.regressors.iter().map(|r| r.value(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::model::{Forecast, LinearTrendModel};
    use crate::pipeline::build_features;
    use crate::types::IntervalRow;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 2, 7, 30, 0).unwrap()
    }

    fn feature_table(n: usize) -> Vec<FeatureRow> {
        let rows = (0..n)
            .map(|i| IntervalRow {
                tick: (i as u32 + 1) * 5,
                temperature: 18.0,
                cadence: 84.0 + (i % 4) as f64 + 0.5 * ((i / 10) % 3) as f64,
                distance: (i as f64 + 1.0) * 14.0,
                altitude: 10.0 + ((i % 9) as f64) * 0.7,
                heartrate: 150.0,
                pace: 2.8,
                position: None,
            })
            .collect();
        build_features(rows, start(), FORECAST_PERIOD)
    }

    /// Records history lengths; predicts each row's index in the frame.
    struct IndexModel {
        fits: Rc<RefCell<Vec<usize>>>,
        fail_on_fit: Option<usize>,
    }

    impl Forecaster for IndexModel {
        fn fit(&mut self, history: &[FramePoint]) -> Result<()> {
            let mut fits = self.fits.borrow_mut();
            fits.push(history.len());
            if self.fail_on_fit == Some(fits.len()) {
                return Err(AppError::ModelFit("singular".to_string()));
            }
            Ok(())
        }

        fn predict(&self, frame: &[FramePoint]) -> Result<Vec<Forecast>> {
            Ok(frame
                .iter()
                .enumerate()
                .map(|(i, p)| Forecast {
                    ds: p.ds,
                    yhat: i as f64,
                    yhat_lower: i as f64 - 1.0,
                    yhat_upper: i as f64 + 1.0,
                })
                .collect())
        }
    }

    #[test]
    fn iteration_count_formula() {
        assert_eq!(iteration_count(100, 36, 6), 10);
        assert_eq!(iteration_count(41, 36, 6), 0);
        assert_eq!(iteration_count(42, 36, 6), 1);
        assert_eq!(iteration_count(20, 36, 6), 0);
    }

    #[test]
    fn hundred_rows_give_ten_cycles_and_ten_points() {
        let fits = Rc::new(RefCell::new(Vec::new()));
        let built = Rc::new(RefCell::new(0usize));
        let driver = WalkForward::new(WalkForwardConfig::default(), || {
            *built.borrow_mut() += 1;
            IndexModel { fits: Rc::clone(&fits), fail_on_fit: None }
        });

        let out = driver.run(feature_table(100)).unwrap();

        assert_eq!(*built.borrow(), 10, "fresh model per step");
        assert_eq!(*fits.borrow(), (0..10).map(|k| 36 + 6 * k).collect::<Vec<_>>());
        assert_eq!(out.predictions.len(), 10);
        assert_eq!(out.features.len(), 100);
        assert_eq!(out.timings.len(), 10);

        let keys: Vec<_> = out.predictions.keys().copied().collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prediction_is_mean_of_the_horizon_tail() {
        let fits = Rc::new(RefCell::new(Vec::new()));
        let driver = WalkForward::new(WalkForwardConfig::default(), || IndexModel {
            fits: Rc::clone(&fits),
            fail_on_fit: None,
        });
        let features = feature_table(50);
        let out = driver.run(features.clone()).unwrap();

        // 50 rows → 2 steps: windows 36 and 42.
        let points: Vec<_> = out.predictions.values().copied().collect();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].ds, features[36].ds);
        assert_eq!(points[0].tick, features[36].interval.tick);
        assert!((points[0].yhat - 38.5).abs() < 1e-12);
        assert!((points[0].yhat_lower - 37.5).abs() < 1e-12);
        assert_eq!(points[1].ds, features[42].ds);
        assert!((points[1].yhat - 44.5).abs() < 1e-12);
    }

    #[test]
    fn fit_failure_aborts_the_run() {
        let fits = Rc::new(RefCell::new(Vec::new()));
        let driver = WalkForward::new(WalkForwardConfig::default(), || IndexModel {
            fits: Rc::clone(&fits),
            fail_on_fit: Some(1),
        });
        // The first fit of the run fails; nothing after it may execute.
        let err = driver.run(feature_table(100)).err().unwrap();
        assert!(matches!(err, AppError::ModelFit(ref m) if m.starts_with("step 0")));
        assert_eq!(fits.borrow().len(), 1);
    }

    #[test]
    fn short_table_yields_no_predictions() {
        let fits = Rc::new(RefCell::new(Vec::new()));
        let driver = WalkForward::new(WalkForwardConfig::default(), || IndexModel {
            fits: Rc::clone(&fits),
            fail_on_fit: None,
        });
        let out = driver.run(feature_table(30)).unwrap();
        assert!(out.predictions.is_empty());
        assert!(fits.borrow().is_empty());
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let driver = WalkForward::new(
            WalkForwardConfig { train_period: 36, forecast_period: 0 },
            LinearTrendModel::new,
        );
        assert!(matches!(driver.run(feature_table(60)), Err(AppError::Config(_))));
    }

    #[test]
    fn linear_model_walk_forward_end_to_end() {
        let driver = WalkForward::new(WalkForwardConfig::default(), LinearTrendModel::new);
        let out = driver.run(feature_table(72)).unwrap();
        assert_eq!(out.predictions.len(), 6);
        for p in out.predictions.values() {
            assert!(p.yhat.is_finite());
            assert!(p.yhat_lower <= p.yhat && p.yhat <= p.yhat_upper);
            assert!((70.0..100.0).contains(&p.yhat), "yhat={}", p.yhat);
        }
    }
}
