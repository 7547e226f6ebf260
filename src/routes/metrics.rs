//! `GET /metrics`: the Prometheus scrape endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{info, warn};

use super::AppState;
use crate::metrics::render;

// ---

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/metrics", get(handler))
}

async fn handler(State(state): State<AppState>) -> Response {
    // ---
    state.span.in_scope(|| {
        let snapshot = state.store.snapshot();
        match render(&snapshot, &state.validator) {
            Ok(body) => {
                info!(
                    fresh = snapshot.latest.len(),
                    sensors = snapshot.counts.len(),
                    "successful metrics request"
                );
                (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
            }
            Err(err) => {
                warn!(error = %err, "invalid metrics file requested");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    "invalid metrics file",
                )
                    .into_response()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::test_support::create_test_app;
    use crate::clock::Clock;
    use crate::models::celsius_to_fahrenheit;
    use crate::Reading;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use chrono::{DateTime, TimeDelta, Utc};
    use tower::ServiceExt;

    fn create_test_reading(id: i64, name: &str, timestamp: DateTime<Utc>) -> Reading {
        // ---
        Reading {
            timestamp,
            sensor_id: id,
            name: name.to_string(),
            channel: Some("1".to_string()),
            battery_ok: true,
            temperature_c: 21.5,
            temperature_f: celsius_to_fahrenheit(21.5),
            humidity: 40,
        }
    }

    async fn scrape(app: Router) -> (StatusCode, Option<String>, String) {
        // ---
        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_document() {
        // ---
        let (app, store, clock) = create_test_app(&[(3, "attic"), (4, "garage")]);
        store
            .record(create_test_reading(3, "attic", clock.now()))
            .unwrap();

        let (status, content_type, body) = scrape(app).await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/plain; version=0.0.4"));
        assert!(body.contains("wh31e_temperature_f{name=\"attic\",id=\"3\",channel=\"1\"} 70.7\n"));
        assert!(body.contains("wh31e_humidity{name=\"attic\",id=\"3\",channel=\"1\"} 40\n"));
        assert!(body.contains("wh31e_events_last_hour{name=\"attic\"} 1\n"));
        assert!(body.contains("wh31e_events_last_hour{name=\"garage\"} 0\n"));
        assert!(!body.contains("name=\"garage\",id="));
    }

    #[tokio::test]
    async fn test_stale_sensor_only_reports_count() {
        // ---
        let (app, store, clock) = create_test_app(&[(3, "attic")]);
        store
            .record(create_test_reading(3, "attic", clock.now()))
            .unwrap();
        clock.advance(TimeDelta::minutes(10));

        let (status, _, body) = scrape(app).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("wh31e_temperature_c"));
        assert!(body.contains("wh31e_events_last_hour{name=\"attic\"} 1\n"));
    }

    #[tokio::test]
    async fn test_invalid_metric_fails_whole_response() {
        // ---
        let (app, store, clock) = create_test_app(&[(3, "attic"), (9, "living room")]);
        store
            .record(create_test_reading(3, "attic", clock.now()))
            .unwrap();

        let (status, content_type, body) = scrape(app).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(content_type.unwrap().starts_with("text/plain"));
        assert_eq!(body, "invalid metrics file");
    }
}
