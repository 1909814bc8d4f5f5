//! Relay contract tests against a real upstream on localhost.

use super::*;
use crate::test_helpers::{
    create_test_app_state, create_test_app_state_with_timeout, saturated_listener,
    spawn_upstream, unreachable_url, upstream_url,
};
use crate::{app_router, with_relay_layers};
use axum::body::{Body, Bytes};
use axum::http::Request;
use http_body_util::BodyExt;
use std::time::{Duration, Instant};
use tower::ServiceExt;

const FLAT_BODY: &str = r#"{"answer.noerror": 10, "answer.servfail": 2}"#;

const GROUPED_BODY: &str = r#"{
    "kresd1": {"answer": {"noerror": 10, "total": 12}, "cache": {"hit": 3, "lookup": 4}},
    "kresd2": {"answer": {"noerror": 5, "total": 5}, "cache": {"hit": 1, "lookup": 4}}
}"#;

/// Upstream answering `/stats` with a fixed status and body.
async fn static_upstream(status: StatusCode, body: &'static str) -> url::Url {
    let router = Router::new().route(
        "/stats",
        get(move || async move { (status, [(header::CONTENT_TYPE, "application/json")], body) }),
    );
    upstream_url(spawn_upstream(router).await, "/stats")
}

async fn call(state: AppState, uri: &str) -> (StatusCode, Bytes) {
    let response = app_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

fn json(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_flat_stats_forwarded_verbatim() {
    let url = static_upstream(StatusCode::OK, FLAT_BODY).await;
    let (status, body) = call(create_test_app_state(url), "/api/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), FLAT_BODY.as_bytes());
    assert_eq!(json(&body), json!({"answer.noerror": 10, "answer.servfail": 2}));
}

#[tokio::test]
async fn test_grouped_stats_forwarded_verbatim() {
    let url = static_upstream(StatusCode::OK, GROUPED_BODY).await;
    let (status, body) = call(create_test_app_state(url), "/api/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), GROUPED_BODY.as_bytes());
}

#[tokio::test]
async fn test_stats_response_is_json() {
    let url = static_upstream(StatusCode::OK, FLAT_BODY).await;
    let response = app_router(create_test_app_state(url))
        .oneshot(Request::builder().uri("/api/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_unreachable_upstream_is_503() {
    let url = unreachable_url();
    let (status, body) = call(create_test_app_state(url.clone()), "/api/stats").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error = json(&body)["error"].as_str().unwrap().to_string();
    assert!(error.contains(url.as_str()), "error should name the URL: {error}");
}

#[tokio::test]
async fn test_stalled_handshake_is_503() {
    let (_listener, _held, addr) = saturated_listener().await;
    let url = upstream_url(addr, "/stats");
    let state = create_test_app_state_with_timeout(url.clone(), Duration::from_millis(300));

    let started = Instant::now();
    let (status, body) = call(state, "/api/stats").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error = json(&body)["error"].as_str().unwrap().to_string();
    assert!(error.contains(url.as_str()), "error should name the URL: {error}");
    assert!(
        started.elapsed() < Duration::from_millis(1500),
        "relay hung for {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_slow_upstream_is_504_within_timeout() {
    let router = Router::new().route(
        "/stats",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            FLAT_BODY
        }),
    );
    let url = upstream_url(spawn_upstream(router).await, "/stats");
    let state = create_test_app_state_with_timeout(url, Duration::from_millis(200));

    let started = Instant::now();
    let (status, body) = call(state, "/api/stats").await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(json(&body)["error"].as_str().unwrap().starts_with("Request timed out"));
    assert!(
        started.elapsed() < Duration::from_millis(1500),
        "relay hung for {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_non_object_json_is_500() {
    for body in ["[]", "42", "\"text\"", "null"] {
        let url = static_upstream(StatusCode::OK, body).await;
        let (status, response) = call(create_test_app_state(url), "/api/stats").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "body {body}");
        assert_eq!(json(&response), json!({"error": "unexpected data format"}));
    }
}

#[tokio::test]
async fn test_malformed_body_is_500() {
    let url = static_upstream(StatusCode::OK, "<html>not json</html>").await;
    let (status, body) = call(create_test_app_state(url), "/api/stats").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"].as_str().unwrap().contains("decode JSON"));
}

#[tokio::test]
async fn test_upstream_404_maps_to_500() {
    let url = static_upstream(StatusCode::NOT_FOUND, "{}").await;
    let (status, body) = call(create_test_app_state(url), "/api/stats").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = json(&body)["error"].as_str().unwrap().to_string();
    assert!(error.contains("404"), "{error}");
    assert!(error.contains("Not Found"), "{error}");
}

#[tokio::test]
async fn test_upstream_5xx_status_passed_through() {
    let url = static_upstream(StatusCode::SERVICE_UNAVAILABLE, "{}").await;
    let (status, body) = call(create_test_app_state(url), "/api/stats").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json(&body)["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_nonstandard_upstream_status_has_no_invented_reason() {
    let url = static_upstream(StatusCode::from_u16(599).unwrap(), "{}").await;
    let (status, body) = call(create_test_app_state(url), "/api/stats").await;

    assert_eq!(status.as_u16(), 599);
    assert_eq!(json(&body), json!({"error": "HTTP error 599 from the resolver"}));
}

#[tokio::test]
async fn test_one_upstream_fetch_per_poll() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let router = Router::new().route(
        "/stats",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }),
    );
    let url = upstream_url(spawn_upstream(router).await, "/stats");
    let state = create_test_app_state(url);

    for _ in 0..3 {
        let (status, _) = call(state.clone(), "/api/stats").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
    // Failures are never retried inside a poll.
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_aggregate_endpoint() {
    let url = static_upstream(StatusCode::OK, GROUPED_BODY).await;
    let (status, body) = call(create_test_app_state(url), "/api/stats/aggregate").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        json!({
            "answer": {"noerror": 15, "total": 17},
            "cache": {"hit": 4, "lookup": 8, "hit_percent": 50.0},
        })
    );
}

#[tokio::test]
async fn test_aggregate_endpoint_flat_passthrough() {
    let url = static_upstream(StatusCode::OK, FLAT_BODY).await;
    let (status, body) = call(create_test_app_state(url), "/api/stats/aggregate").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), json!({"answer.noerror": 10, "answer.servfail": 2}));
}

#[tokio::test]
async fn test_instance_endpoint() {
    let url = static_upstream(StatusCode::OK, GROUPED_BODY).await;
    let state = create_test_app_state(url);

    let (status, body) = call(state.clone(), "/api/stats/instances/kresd2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["answer"]["noerror"], json!(5));

    let (status, body) = call(state, "/api/stats/instances/kresd9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body), json!({"error": "Instance 'kresd9' not found"}));
}

#[tokio::test]
async fn test_instances_listing() {
    let url = static_upstream(StatusCode::OK, GROUPED_BODY).await;
    let (status, body) = call(create_test_app_state(url), "/api/instances").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        json!({"shape": "grouped", "instances": ["kresd1", "kresd2"]})
    );

    let url = static_upstream(StatusCode::OK, FLAT_BODY).await;
    let (_, body) = call(create_test_app_state(url), "/api/instances").await;
    assert_eq!(json(&body), json!({"shape": "flat", "instances": []}));
}

#[tokio::test]
async fn test_heartbeat_does_not_contact_upstream() {
    let (status, body) = call(create_test_app_state(unreachable_url()), "/api/heartbeat").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ok");
}

#[tokio::test]
async fn test_handler_panic_becomes_json_500() {
    async fn explode() -> &'static str {
        panic!("stats handler blew up")
    }

    let app = with_relay_layers(Router::new().route("/api/stats", get(explode)));
    let response = app
        .oneshot(Request::builder().uri("/api/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error = json(&body)["error"].as_str().unwrap().to_string();
    assert!(!error.contains("blew up"), "panic detail leaked: {error}");
}
