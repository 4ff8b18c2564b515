//! HTTP health endpoint

use crate::health::event::{pretty_json, safe_marshal};
use crate::health::host::host_health_bytes;
use crate::health::reporter::Reporter;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    pretty: Option<String>,
}

impl HealthQuery {
    /// Boolean parse accepting `1 t T TRUE true True`; anything else,
    /// including the false spellings and garbage, is not pretty
    fn is_pretty(&self) -> bool {
        matches!(
            self.pretty.as_deref(),
            Some("1" | "t" | "T" | "TRUE" | "true" | "True")
        )
    }
}

/// Router serving the current health snapshot and the host snapshot
pub fn health_router(reporter: Reporter) -> Router {
    Router::new()
        .route("/health", get(health_status))
        .route("/health/status", get(health_status))
        .route("/health/host", get(host_status))
        .with_state(reporter)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
}

/// Current health as JSON
pub async fn health_status(
    State(reporter): State<Reporter>,
    Query(query): Query<HealthQuery>,
) -> impl IntoResponse {
    let mut body = safe_marshal(&reporter.health());
    if query.is_pretty() {
        body = pretty_json(&body);
    }

    ([(header::CONTENT_TYPE, "application/json")], body)
}

/// Host snapshot as JSON
pub async fn host_status(Query(query): Query<HealthQuery>) -> impl IntoResponse {
    match tokio::task::spawn_blocking(|| host_health_bytes(Utc::now())).await {
        Ok(mut body) => {
            if query.is_pretty() {
                body = pretty_json(&body);
            }
            (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body)
        }
        Err(e) => {
            tracing::error!(error = %e, "Host snapshot task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "application/json")],
                br#"{"error":"internal","msg":"host snapshot failed"}"#.to_vec(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_info::BuildInfo;
    use crate::health::{HealthConfig, HealthState};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn reporter() -> Reporter {
        let build = BuildInfo::from_parts("gather", "v0.0.1", "abc", "0", "ci");
        let reporter = Reporter::new(HealthConfig::for_service("gather"), &build, None);
        reporter.set_health(HealthState::Healthy, "a-ok");
        reporter.add_stat("kernel", true);
        reporter
    }

    async fn get_body(uri: &str) -> (StatusCode, String) {
        let response = health_router(reporter())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_compact() {
        let (status, body) = get_body("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains('\n'));

        let event: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(event["service"], "gather");
        assert_eq!(event["state"], "green");
        assert_eq!(event["msg"], "a-ok");
        assert_eq!(event["data"]["kernel"], true);
    }

    #[tokio::test]
    async fn test_health_pretty() {
        for flag in ["1", "t", "T", "TRUE", "true", "True"] {
            let (_, body) = get_body(&format!("/health/status?pretty={}", flag)).await;
            assert!(body.contains('\n'), "pretty={} should indent", flag);
            let event: Value = serde_json::from_str(&body).unwrap();
            assert_eq!(event["event"], "status");
        }
    }

    #[tokio::test]
    async fn test_health_not_pretty() {
        for flag in ["0", "false", "yes", ""] {
            let (_, body) = get_body(&format!("/health?pretty={}", flag)).await;
            assert!(!body.contains('\n'), "pretty={} should not indent", flag);
        }
    }

    #[tokio::test]
    async fn test_host_snapshot() {
        let (status, body) = get_body("/health/host?pretty=true").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains('\n'));

        let event: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(event["etype"], "health");
        assert_eq!(event["event"], "host");
        assert!(event["memory"]["total"].as_u64().unwrap() > 0);
    }
}
