use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::db::DbWriter;
use crate::error::Result;
use crate::strava::client::StravaClient;
use crate::types::{ActivitySummary, RawSample};

/// Anything that can produce the raw stream of an activity.
pub trait StreamSource: Send + Sync {
    fn fetch_streams(&self, activity_id: u64) -> impl Future<Output = Result<Vec<RawSample>>> + Send;
}

impl StreamSource for StravaClient {
    fn fetch_streams(&self, activity_id: u64) -> impl Future<Output = Result<Vec<RawSample>>> + Send {
        self.get_streams(activity_id)
    }
}

/// Enforces a minimum spacing between the starts of successive operations.
#[derive(Debug)]
pub struct RateLimiter {
    spacing: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self { spacing, last: None }
    }

    /// Returns once at least `spacing` has passed since the previous call returned.
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last {
            tokio::time::sleep_until(last + self.spacing).await;
        }
        self.last = Some(Instant::now());
    }
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub extracted: usize,
    pub samples: usize,
    /// Activity ids whose stream fetch failed.
    pub error_log: Vec<u64>,
}

/// Fetch and store the raw stream of every activity, in order.
///
/// Fetch failures are logged and recorded in the report; extraction moves
/// on to the next activity. Database failures abort.
pub async fn extract_all<S: StreamSource>(
    source: &S,
    activities: &[ActivitySummary],
    writer: &DbWriter,
    limiter: &mut RateLimiter,
) -> Result<ExtractReport> {
    let mut report = ExtractReport::default();
    let total = activities.len();

    for (i, activity) in activities.iter().enumerate() {
        limiter.acquire().await;
        match source.fetch_streams(activity.id).await {
            Ok(samples) => {
                writer.write_activity(activity, &samples).await?;
                report.extracted += 1;
                report.samples += samples.len();
                info!(
                    activity_id = activity.id,
                    samples = samples.len(),
                    "[EXTRACT] {}/{} {} '{}' → {} samples",
                    i + 1,
                    total,
                    activity.id,
                    activity.name,
                    samples.len(),
                );
            }
            Err(e) => {
                warn!(activity_id = activity.id, "[EXTRACT] {}/{} {} failed: {e}", i + 1, total, activity.id);
                report.error_log.push(activity.id);
            }
        }
    }

    info!(
        extracted = report.extracted,
        failed = report.error_log.len(),
        samples = report.samples,
        "[EXTRACT] done | {} extracted | {} failed | {} samples",
        report.extracted,
        report.error_log.len(),
        report.samples,
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::error::AppError;
    use chrono::{TimeZone, Utc};

    struct FakeSource {
        failing: Vec<u64>,
    }

    impl StreamSource for FakeSource {
        fn fetch_streams(&self, activity_id: u64) -> impl Future<Output = Result<Vec<RawSample>>> + Send {
            let fail = self.failing.contains(&activity_id);
            async move {
                if fail {
                    return Err(AppError::Upstream { status: 500, url: format!("/activities/{activity_id}/streams") });
                }
                Ok((0..3)
                    .map(|t| RawSample {
                        time: t * 2,
                        cadence: 84.0,
                        distance: f64::from(t) * 5.5,
                        altitude: 12.0,
                        heartrate: 140.0,
                        temperature: 19.0,
                        pace: if t == 0 { 0.0 } else { 2.75 },
                        position: None,
                        velocity_smooth: None,
                        grade_smooth: None,
                    })
                    .collect())
            }
        }
    }

    fn run(id: u64) -> ActivitySummary {
        ActivitySummary {
            id,
            name: format!("run {id}"),
            activity_type: "Run".to_string(),
            start_date: Utc.with_ymd_and_hms(2020, 8, 1, 12, 0, 0).unwrap(),
            distance: Some(5000.0),
            elapsed_time: Some(1500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_successive_starts() {
        let mut limiter = RateLimiter::new(Duration::from_secs(10));
        let started = Instant::now();
        let mut starts = Vec::new();
        for _ in 0..4 {
            limiter.acquire().await;
            starts.push(started.elapsed());
        }
        assert_eq!(starts[0], Duration::ZERO);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(starts.windows(2).all(|w| w[1] - w[0] >= Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn failures_are_logged_and_extraction_continues() {
        let writer = DbWriter::new(memory_pool().await);
        let source = FakeSource { failing: vec![2] };
        let activities = vec![run(1), run(2), run(3)];
        let mut limiter = RateLimiter::new(Duration::ZERO);

        let report = extract_all(&source, &activities, &writer, &mut limiter).await.unwrap();
        assert_eq!(report.extracted, 2);
        assert_eq!(report.samples, 6);
        assert_eq!(report.error_log, vec![2]);

        assert!(writer.load_activity(2).await.unwrap().is_none());
        let (_, samples) = writer.load_activity(3).await.unwrap().unwrap();
        assert_eq!(samples.len(), 3);
    }
}
