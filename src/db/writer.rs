use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::db::models::{ActivityRow, RawSampleRow, ResultRecord};
use crate::error::Result;
use crate::types::{ActivitySummary, FeatureRow, LatLng, RawSample, ResultRow};

/// Persists extracted activities and forecast runs to SQLite.
/// Every write for one activity or one label happens in a single transaction
/// that first clears that key, so re-running replaces instead of appending.
#[derive(Clone)]
pub struct DbWriter {
    pool: sqlx::SqlitePool,
}

impl DbWriter {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Store the full feature table and the merged result table under `label`.
    pub async fn write_run(&self, label: &str, features: &[FeatureRow], results: &[ResultRow]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM feature_rows WHERE label = ?")
            .bind(label)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM forecast_results WHERE label = ?")
            .bind(label)
            .execute(&mut *tx)
            .await?;

        for f in features {
            let r = &f.interval;
            sqlx::query(
                r#"
                INSERT INTO feature_rows (
                    label, tick, ds, temperature, cadence, distance, altitude,
                    heartrate, pace, lat, lng,
                    prev_altitude, altitude_delta, prev_distance, distance_delta,
                    altitude_forecast
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(label)
            .bind(i64::from(r.tick))
            .bind(f.ds)
            .bind(r.temperature)
            .bind(r.cadence)
            .bind(r.distance)
            .bind(r.altitude)
            .bind(r.heartrate)
            .bind(r.pace)
            .bind(r.position.map(|p| p.lat))
            .bind(r.position.map(|p| p.lng))
            .bind(f.prev_altitude)
            .bind(f.altitude_delta)
            .bind(f.prev_distance)
            .bind(f.distance_delta)
            .bind(f.altitude_forecast)
            .execute(&mut *tx)
            .await?;
        }

        for row in results {
            let p = &row.prediction;
            let a = &row.actual;
            sqlx::query(
                r#"
                INSERT INTO forecast_results (
                    label, tick, ds, yhat, yhat_lower, yhat_upper,
                    cadence, distance, altitude, altitude_delta, altitude_forecast,
                    temperature, heartrate
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(label)
            .bind(i64::from(a.interval.tick))
            .bind(p.ds)
            .bind(p.yhat)
            .bind(p.yhat_lower)
            .bind(p.yhat_upper)
            .bind(a.interval.cadence)
            .bind(a.interval.distance)
            .bind(a.interval.altitude)
            .bind(a.altitude_delta)
            .bind(a.altitude_forecast)
            .bind(a.interval.temperature)
            .bind(a.interval.heartrate)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            label,
            features = features.len(),
            results = results.len(),
            "[DB] stored run '{label}': {} feature rows, {} result rows",
            features.len(),
            results.len(),
        );
        Ok(())
    }

    pub async fn load_results(&self, label: &str) -> Result<Vec<ResultRecord>> {
        let rows = sqlx::query_as::<_, ResultRecord>(
            "SELECT * FROM forecast_results WHERE label = ? ORDER BY tick",
        )
        .bind(label)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Snapshot one activity and its raw stream (bulk extraction).
    pub async fn write_activity(&self, activity: &ActivitySummary, samples: &[RawSample]) -> Result<()> {
        let activity_id = activity.id as i64;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO activities (id, name, activity_type, start_date, distance, elapsed_time, extracted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(activity_id)
        .bind(&activity.name)
        .bind(&activity.activity_type)
        .bind(activity.start_date)
        .bind(activity.distance)
        .bind(activity.elapsed_time.map(|t| t as i64))
        .bind(now_secs())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM raw_samples WHERE activity_id = ?")
            .bind(activity_id)
            .execute(&mut *tx)
            .await?;

        for (seq, s) in samples.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO raw_samples (
                    activity_id, seq, time, cadence, distance, altitude, heartrate,
                    temperature, pace, lat, lng, velocity_smooth, grade_smooth
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(activity_id)
            .bind(seq as i64)
            .bind(i64::from(s.time))
            .bind(s.cadence)
            .bind(s.distance)
            .bind(s.altitude)
            .bind(s.heartrate)
            .bind(s.temperature)
            .bind(s.pace)
            .bind(s.position.map(|p| p.lat))
            .bind(s.position.map(|p| p.lng))
            .bind(s.velocity_smooth)
            .bind(s.grade_smooth)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// A previously extracted activity, if the snapshot has it.
    pub async fn load_activity(&self, activity_id: u64) -> Result<Option<(ActivitySummary, Vec<RawSample>)>> {
        let id = activity_id as i64;
        let Some(activity) = sqlx::query_as::<_, ActivityRow>("SELECT * FROM activities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let samples = sqlx::query_as::<_, RawSampleRow>(
            "SELECT * FROM raw_samples WHERE activity_id = ? ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let summary = ActivitySummary {
            id: activity.id as u64,
            name: activity.name,
            activity_type: activity.activity_type,
            start_date: activity.start_date,
            distance: activity.distance,
            elapsed_time: activity.elapsed_time.map(|t| t as u64),
        };
        let samples = samples.into_iter().map(RawSample::from).collect();
        Ok(Some((summary, samples)))
    }
}

impl From<RawSampleRow> for RawSample {
    fn from(r: RawSampleRow) -> Self {
        let position = match (r.lat, r.lng) {
            (Some(lat), Some(lng)) => Some(LatLng { lat, lng }),
            _ => None,
        };
        RawSample {
            time: r.time.max(0) as u32,
            cadence: r.cadence,
            distance: r.distance,
            altitude: r.altitude,
            heartrate: r.heartrate,
            temperature: r.temperature,
            pace: r.pace,
            position,
            velocity_smooth: r.velocity_smooth,
            grade_smooth: r.grade_smooth,
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
