use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::routes::app;
use crate::state::test_helpers::test_app_state;

async fn body_json_of(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn backend_path_strips_prefix_and_keeps_query() {
    let uri: Uri = "/api/settings/ollama/models?endpoint=http%3A%2F%2Follama%3A11434".parse().unwrap();
    assert_eq!(backend_path(&uri), "settings/ollama/models?endpoint=http%3A%2F%2Follama%3A11434");
    let uri: Uri = "/api/frameworks".parse().unwrap();
    assert_eq!(backend_path(&uri), "frameworks");
}

#[tokio::test]
async fn get_is_forwarded_without_api_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/settings/ollama/models"))
        .and(query_param("endpoint", "http://ollama:11434"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": ["llama3"] })))
        .expect(1)
        .mount(&server)
        .await;

    let req = Request::builder()
        .uri("/api/settings/ollama/models?endpoint=http%3A%2F%2Follama%3A11434")
        .body(Body::empty())
        .unwrap();
    let resp = app(test_app_state(&server.uri())).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json_of(resp).await, json!({ "models": ["llama3"] }));
}

#[tokio::test]
async fn post_body_and_content_type_are_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/d-1/link-evidence"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "control_id": "c-7" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "linked", "link_id": "l-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/documents/d-1/link-evidence")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"control_id":"c-7"}"#))
        .unwrap();
    let resp = app(test_app_state(&server.uri())).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json_of(resp).await["link_id"], "l-1");
}

#[tokio::test]
async fn backend_errors_pass_through_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/documents/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Document not found" })))
        .mount(&server)
        .await;

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/documents/missing")
        .body(Body::empty())
        .unwrap();
    let resp = app(test_app_state(&server.uri())).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json_of(resp).await["detail"], "Document not found");
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let req = Request::builder().uri("/api/frameworks").body(Body::empty()).unwrap();
    let resp = app(test_app_state("http://127.0.0.1:1")).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = body_json_of(resp).await;
    assert!(body["detail"].as_str().unwrap().starts_with("Backend unavailable"));
}
