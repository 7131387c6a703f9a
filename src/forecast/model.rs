use chrono::{DateTime, Utc};

use crate::config::INTERVAL_Z;
use crate::error::{AppError, Result};
use crate::types::FeatureRow;

/// Ridge penalty (per training row) applied on the standardized scale.
/// Keeps the normal equations solvable when regressors are collinear,
/// e.g. cumulative distance against the trend at constant pace.
const RIDGE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Model frame
// ---------------------------------------------------------------------------

/// Exogenous series supplied to the model alongside the cadence history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regressor {
    Temperature,
    Distance,
    Altitude,
    AltitudeDelta,
    AltitudeForecast,
}

impl Regressor {
    pub const ALL: [Regressor; 5] = [
        Regressor::Temperature,
        Regressor::Distance,
        Regressor::Altitude,
        Regressor::AltitudeDelta,
        Regressor::AltitudeForecast,
    ];

    pub fn value(self, row: &FeatureRow) -> f64 {
        match self {
            Regressor::Temperature => row.interval.temperature,
            Regressor::Distance => row.interval.distance,
            Regressor::Altitude => row.interval.altitude,
            Regressor::AltitudeDelta => row.altitude_delta,
            Regressor::AltitudeForecast => row.altitude_forecast,
        }
    }
}

impl std::fmt::Display for Regressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Regressor::Temperature => "temp",
            Regressor::Distance => "distance",
            Regressor::Altitude => "altitude",
            Regressor::AltitudeDelta => "altitude_delta",
            Regressor::AltitudeForecast => "altitude_forecast",
        };
        write!(f, "{s}")
    }
}

/// One row handed to a forecaster. `y` is the observed cadence for history
/// rows and `None` for the future rows being predicted.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePoint {
    pub ds: DateTime<Utc>,
    pub regressors: Vec<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub ds: DateTime<Utc>,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// A regression model with exogenous regressors. The walk-forward driver
/// builds a fresh instance for every step, fits it once, predicts once.
pub trait Forecaster {
    fn fit(&mut self, history: &[FramePoint]) -> Result<()>;

    /// Returns one forecast per input row, in input order.
    fn predict(&self, frame: &[FramePoint]) -> Result<Vec<Forecast>>;
}

// ---------------------------------------------------------------------------
// Linear trend + regressors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Fitted {
    origin: DateTime<Utc>,
    y_mean: f64,
    /// Per design column: (mean, std, coefficient). Column 0 is the trend.
    columns: Vec<(f64, f64, f64)>,
    sigma: f64,
}

/// Ordinary least squares on a linear time trend plus every regressor,
/// with a symmetric normal prediction interval from the residual spread.
#[derive(Debug, Clone)]
pub struct LinearTrendModel {
    interval_z: f64,
    fitted: Option<Fitted>,
}

impl LinearTrendModel {
    pub fn new() -> Self {
        Self::with_interval_z(INTERVAL_Z)
    }

    pub fn with_interval_z(interval_z: f64) -> Self {
        Self { interval_z, fitted: None }
    }

    fn design_row(origin: DateTime<Utc>, point: &FramePoint) -> Vec<f64> {
        let t = (point.ds - origin).num_milliseconds() as f64 / 1000.0;
        let mut row = Vec::with_capacity(point.regressors.len() + 1);
        row.push(t);
        row.extend_from_slice(&point.regressors);
        row
    }
}

impl Default for LinearTrendModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Forecaster for LinearTrendModel {
    fn fit(&mut self, history: &[FramePoint]) -> Result<()> {
        if history.len() < 2 {
            return Err(AppError::ModelFit(format!(
                "need at least 2 history rows, got {}",
                history.len()
            )));
        }
        let origin = history[0].ds;
        let width = history[0].regressors.len() + 1;

        let mut xs = Vec::with_capacity(history.len());
        let mut ys = Vec::with_capacity(history.len());
        for point in history {
            let y = point
                .y
                .ok_or_else(|| AppError::ModelFit(format!("history row {} has no target", point.ds)))?;
            let x = Self::design_row(origin, point);
            if x.len() != width {
                return Err(AppError::ModelFit("regressor count differs between rows".to_string()));
            }
            if !y.is_finite() || x.iter().any(|v| !v.is_finite()) {
                return Err(AppError::ModelFit(format!("non-finite value at {}", point.ds)));
            }
            xs.push(x);
            ys.push(y);
        }

        let n = ys.len() as f64;
        let y_mean = ys.iter().sum::<f64>() / n;

        // Standardize columns; constant columns carry no information and get std 0.
        let mut stats = Vec::with_capacity(width);
        for j in 0..width {
            let mean = xs.iter().map(|x| x[j]).sum::<f64>() / n;
            let var = xs.iter().map(|x| (x[j] - mean).powi(2)).sum::<f64>() / n;
            stats.push((mean, var.sqrt()));
        }
        let z = |x: &[f64], j: usize| {
            let (mean, std) = stats[j];
            if std > 0.0 { (x[j] - mean) / std } else { 0.0 }
        };

        let mut gram = vec![vec![0.0; width]; width];
        let mut rhs = vec![0.0; width];
        for (x, &y) in xs.iter().zip(&ys) {
            let zs: Vec<f64> = (0..width).map(|j| z(x, j)).collect();
            for a in 0..width {
                rhs[a] += zs[a] * (y - y_mean);
                for b in 0..width {
                    gram[a][b] += zs[a] * zs[b];
                }
            }
        }
        for (a, row) in gram.iter_mut().enumerate() {
            row[a] += RIDGE * n;
        }

        let coef = solve_spd(gram, rhs)
            .ok_or_else(|| AppError::ModelFit("normal equations are not positive definite".to_string()))?;

        let sse: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, &y)| {
                let yhat = y_mean + (0..width).map(|j| coef[j] * z(x, j)).sum::<f64>();
                (y - yhat).powi(2)
            })
            .sum();
        let dof = (ys.len().saturating_sub(width + 1)).max(1) as f64;

        self.fitted = Some(Fitted {
            origin,
            y_mean,
            columns: stats.into_iter().zip(coef).map(|((m, s), c)| (m, s, c)).collect(),
            sigma: (sse / dof).sqrt(),
        });
        Ok(())
    }

    fn predict(&self, frame: &[FramePoint]) -> Result<Vec<Forecast>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| AppError::ModelFit("predict called before fit".to_string()))?;

        frame
            .iter()
            .map(|point| {
                let x = Self::design_row(fitted.origin, point);
                if x.len() != fitted.columns.len() || x.iter().any(|v| !v.is_finite()) {
                    return Err(AppError::ModelFit(format!("unusable prediction row at {}", point.ds)));
                }
                let yhat = fitted.y_mean
                    + x.iter()
                        .zip(&fitted.columns)
                        .map(|(&v, &(mean, std, c))| if std > 0.0 { c * (v - mean) / std } else { 0.0 })
                        .sum::<f64>();
                let half = self.interval_z * fitted.sigma;
                Ok(Forecast {
                    ds: point.ds,
                    yhat,
                    yhat_lower: yhat - half,
                    yhat_upper: yhat + half,
                })
            })
            .collect()
    }
}

/// Cholesky solve of `a · x = b` for symmetric positive definite `a`.
fn solve_spd(a: Vec<Vec<f64>>, b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let s: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = a[i][i] - s;
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (a[i][j] - s) / l[j][j];
            }
        }
    }

    // L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let s: f64 = (0..i).map(|k| l[i][k] * y[k]).sum();
        y[i] = (b[i] - s) / l[i][i];
    }
    // Lᵀ x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let s: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (y[i] - s) / l[i][i];
    }
    Some(x)
}
