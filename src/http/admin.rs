// Cache and auto-refresh administration endpoints.
// Inspect and clear the cache, change its TTL, and control per-organization refresh tasks.

use std::time::Duration;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::AppState;
use crate::cache::CacheInfo;
use crate::error::{ProxyError, Result};

/// Interval used by `/auto-refresh/start` when the body names none.
const DEFAULT_INTERVAL_MINUTES: f64 = 10.0;

#[derive(Debug, Default, Deserialize)]
pub struct TtlRequest {
    pub seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    pub org: Option<String>,
    pub interval: Option<Minutes>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IntervalRequest {
    pub interval: Option<Minutes>,
}

/// Interval in minutes, sent either as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Minutes {
    Number(f64),
    Text(String),
}

impl Minutes {
    fn value(&self) -> Result<f64> {
        let minutes = match self {
            Minutes::Number(n) => *n,
            Minutes::Text(s) => s.trim().parse().map_err(|_| {
                ProxyError::InvalidArgument(format!("interval is not a number: {}", s))
            })?,
        };
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(ProxyError::InvalidArgument(
                "interval must be a positive number of minutes".to_string(),
            ));
        }
        Ok(minutes)
    }
}

fn minutes_to_duration(minutes: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(minutes * 60.0).map_err(|_| {
        ProxyError::InvalidArgument(format!("interval is too large: {} minutes", minutes))
    })
}

/// Parse an optional JSON body; an empty body yields the defaults.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidArgument(format!("invalid request body: {}", e)))
}

pub async fn cache_info(State(state): State<AppState>) -> Json<CacheInfo> {
    Json(state.cache.info())
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    state.cache.invalidate_all();
    Json(json!({
        "message": "Cache cleared",
        "timestamp": Utc::now(),
    }))
}

pub async fn set_cache_ttl(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    let request: TtlRequest = parse_body(&body)?;
    let seconds = match request.seconds {
        Some(seconds) if seconds > 0 => seconds,
        _ => {
            return Err(ProxyError::InvalidArgument(
                "seconds must be a positive integer".to_string(),
            ));
        }
    };

    state.cache.set_ttl(Duration::from_secs(seconds));
    Ok(Json(json!({
        "message": format!("Cache TTL set to {} seconds", seconds),
        "ttlSeconds": seconds,
    })))
}

pub async fn start_auto_refresh(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>> {
    let request: StartRequest = parse_body(&body)?;
    let org = request.org.unwrap_or_else(|| state.org.to_string());
    let minutes = match &request.interval {
        Some(interval) => interval.value()?,
        None => DEFAULT_INTERVAL_MINUTES,
    };

    let started = state.scheduler.start(&org, minutes_to_duration(minutes)?)?;
    let message = if started {
        format!("Auto-refresh started for {}", org)
    } else {
        format!("Auto-refresh already running for {}", org)
    };

    Ok(Json(json!({
        "message": message,
        "started": started,
        "org": org,
        "interval": format!("{} minutes", minutes),
    })))
}

pub async fn stop_auto_refresh(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> Json<Value> {
    let stopped = state.scheduler.stop(&org);
    let message = if stopped {
        format!("Auto-refresh stopped for {}", org)
    } else {
        format!("No auto-refresh running for {}", org)
    };
    Json(json!({ "message": message, "stopped": stopped }))
}

pub async fn stop_all_auto_refresh(State(state): State<AppState>) -> Json<Value> {
    let stopped = state.scheduler.stop_all();
    Json(json!({
        "message": "All auto-refresh tasks stopped",
        "stopped": stopped,
    }))
}

pub async fn change_interval(
    State(state): State<AppState>,
    Path(org): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let request: IntervalRequest = parse_body(&body)?;
    let minutes = request
        .interval
        .ok_or_else(|| ProxyError::InvalidArgument("interval is required".to_string()))?
        .value()?;

    let changed = state
        .scheduler
        .change_interval(&org, minutes_to_duration(minutes)?)?;
    let message = if changed {
        format!("Auto-refresh interval for {} set to {} minutes", org, minutes)
    } else {
        format!("No auto-refresh running for {}", org)
    };

    Ok(Json(json!({
        "message": message,
        "changed": changed,
        "org": org,
        "interval": format!("{} minutes", minutes),
    })))
}

pub async fn auto_refresh_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": state.scheduler.status(),
        "timestamp": Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_accept_numbers_and_strings() {
        let number: Minutes = serde_json::from_value(json!(2.5)).unwrap();
        let text: Minutes = serde_json::from_value(json!(" 3 ")).unwrap();

        assert_eq!(number.value().unwrap(), 2.5);
        assert_eq!(text.value().unwrap(), 3.0);
        assert_eq!(minutes_to_duration(2.5).unwrap(), Duration::from_secs(150));
    }

    #[test]
    fn test_minutes_reject_non_positive() {
        for raw in [json!(0), json!(-1), json!("0"), json!("later")] {
            let minutes: Minutes = serde_json::from_value(raw).unwrap();
            assert!(matches!(minutes.value(), Err(ProxyError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_oversized_minutes_rejected() {
        let minutes: Minutes = serde_json::from_value(json!(1e300)).unwrap();
        let minutes = minutes.value().unwrap();

        assert!(matches!(
            minutes_to_duration(minutes),
            Err(ProxyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_body_uses_defaults() {
        let request: StartRequest = parse_body(&Bytes::new()).unwrap();
        assert!(request.org.is_none());
        assert!(request.interval.is_none());

        let bad: Result<TtlRequest> = parse_body(&Bytes::from_static(b"{not json"));
        assert!(matches!(bad, Err(ProxyError::InvalidArgument(_))));
    }
}
