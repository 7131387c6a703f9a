/// Row types for the tables in migrations/. Used by sqlx for typed reads.
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub name: String,
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    pub distance: Option<f64>,
    pub elapsed_time: Option<i64>,
    pub extracted_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawSampleRow {
    pub activity_id: i64,
    pub seq: i64,
    pub time: i64,
    pub cadence: f64,
    pub distance: f64,
    pub altitude: f64,
    pub heartrate: f64,
    pub temperature: f64,
    pub pace: f64,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub velocity_smooth: Option<f64>,
    pub grade_smooth: Option<f64>,
}

/// Merged prediction/actual row as persisted for one forecast horizon.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ResultRecord {
    pub label: String,
    pub tick: i64,
    pub ds: DateTime<Utc>,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub cadence: f64,
    pub distance: f64,
    pub altitude: f64,
    pub altitude_delta: f64,
    pub altitude_forecast: f64,
    pub temperature: f64,
    pub heartrate: f64,
}
