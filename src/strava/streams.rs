use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::types::{LatLng, RawSample};

/// Stream keys requested for every activity.
pub const STREAM_KEYS: &str =
    "time,distance,latlng,altitude,velocity_smooth,heartrate,cadence,temp,grade_smooth";

/// Turn a `key_by_type=true` streams payload (`{"time": {"data": [...]}, ...}`)
/// into one `RawSample` per time point.
///
/// `time` is required; missing numeric streams default to 0 and missing
/// optional ones to `None`. Pace is distance / time, 0 at time 0.
pub fn parse_streams(payload: &Value) -> Result<Vec<RawSample>> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::Payload("streams payload was not an object".to_string()))?;

    let Some(times) = series(obj, "time") else {
        return Ok(Vec::new());
    };
    let number = |key: &str, i: usize| -> Option<f64> { series(obj, key)?.get(i)?.as_f64() };

    let mut samples = Vec::with_capacity(times.len());
    for (i, t) in times.iter().enumerate() {
        let Some(time) = t.as_u64() else {
            debug!(index = i, "[STRAVA] skipping sample with non-integer time {t}");
            continue;
        };
        let time = time as u32;
        let distance = number("distance", i).unwrap_or(0.0);
        let pace = if time == 0 { 0.0 } else { distance / f64::from(time) };
        let position = series(obj, "latlng")
            .and_then(|s| s.get(i))
            .and_then(Value::as_array)
            .and_then(|pair| match pair.as_slice() {
                [lat, lng] => Some(LatLng { lat: lat.as_f64()?, lng: lng.as_f64()? }),
                _ => None,
            });

        samples.push(RawSample {
            time,
            cadence: number("cadence", i).unwrap_or(0.0),
            distance,
            altitude: number("altitude", i).unwrap_or(0.0),
            heartrate: number("heartrate", i).unwrap_or(0.0),
            temperature: number("temp", i).unwrap_or(0.0),
            pace,
            position,
            velocity_smooth: number("velocity_smooth", i),
            grade_smooth: number("grade_smooth", i),
        });
    }
    Ok(samples)
}

fn series<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    obj.get(key)?.get("data")?.as_array()
}
