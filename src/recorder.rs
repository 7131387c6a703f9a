use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::DEFAULT_RUN_LABEL;
use crate::db::DbWriter;
use crate::error::Result;
use crate::types::{FeatureRow, PredictionPoint, ResultRow};

/// Artifact label for a run: the activity id, or the default label.
pub fn run_label(run_id: Option<u64>) -> String {
    run_id.map_or_else(|| DEFAULT_RUN_LABEL.to_string(), |id| id.to_string())
}

/// Inner join on timestamp. Predictions with no feature row at the same
/// `ds` are dropped; so are feature rows with no prediction.
pub fn join_predictions(
    predictions: &BTreeMap<DateTime<Utc>, PredictionPoint>,
    features: &[FeatureRow],
) -> Vec<ResultRow> {
    let mut joined = Vec::with_capacity(predictions.len());
    for row in features {
        if let Some(p) = predictions.get(&row.ds) {
            joined.push(ResultRow { prediction: *p, actual: row.clone() });
        }
    }
    let dropped = predictions.len() - joined.len();
    if dropped > 0 {
        debug!(dropped, "[RECORD] {dropped} predictions had no matching feature row");
    }
    joined
}

/// Join and persist both artifacts under the run label.
pub async fn record_results(
    writer: &DbWriter,
    run_id: Option<u64>,
    predictions: &BTreeMap<DateTime<Utc>, PredictionPoint>,
    features: &[FeatureRow],
) -> Result<Vec<ResultRow>> {
    let label = run_label(run_id);
    let results = join_predictions(predictions, features);
    writer.write_run(&label, features, &results).await?;
    info!(
        label = %label,
        results = results.len(),
        "[RECORD] {} forecast horizons recorded as '{}'",
        results.len(),
        label,
    );
    Ok(results)
}
