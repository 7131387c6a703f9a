use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Activities and raw telemetry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    pub distance: Option<f64>,
    pub elapsed_time: Option<u64>,
}

impl ActivitySummary {
    pub fn is_run(&self) -> bool {
        self.activity_type == "Run"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// One device sample as delivered by the activity stream endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Seconds since activity start.
    pub time: u32,
    pub cadence: f64,
    /// Cumulative metres.
    pub distance: f64,
    pub altitude: f64,
    pub heartrate: f64,
    pub temperature: f64,
    /// distance / time, 0 at time 0.
    pub pace: f64,
    pub position: Option<LatLng>,
    pub velocity_smooth: Option<f64>,
    pub grade_smooth: Option<f64>,
}

// ---------------------------------------------------------------------------
// Resampled series
// ---------------------------------------------------------------------------

/// One row per 5-second tick.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalRow {
    /// Seconds since activity start, always a multiple of the tick width.
    pub tick: u32,
    pub temperature: f64,
    pub cadence: f64,
    pub distance: f64,
    pub altitude: f64,
    pub heartrate: f64,
    pub pace: f64,
    pub position: Option<LatLng>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Absolute timestamp of the tick (run start + tick seconds).
    pub ds: DateTime<Utc>,
    pub interval: IntervalRow,
    pub prev_altitude: f64,
    pub altitude_delta: f64,
    pub prev_distance: f64,
    pub distance_delta: f64,
    /// Net altitude change over the current and following horizon ticks.
    pub altitude_forecast: f64,
}

// ---------------------------------------------------------------------------
// Forecast output
// ---------------------------------------------------------------------------

/// Mean forecast over one completed horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub ds: DateTime<Utc>,
    pub tick: u32,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// A prediction joined with the observed row at the same timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub prediction: PredictionPoint,
    pub actual: FeatureRow,
}

// ---------------------------------------------------------------------------
// Music tempo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoBin {
    Slower,
    Hold,
    Faster,
}

impl std::fmt::Display for TempoBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TempoBin::Slower => "slower",
            TempoBin::Hold => "hold",
            TempoBin::Faster => "faster",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackFeatures {
    /// Bare track id (last segment of the `spotify:track:<id>` uri).
    pub id: String,
    pub uri: String,
    pub tempo: f64,
    pub duration_secs: f64,
}
