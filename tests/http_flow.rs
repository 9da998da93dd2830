use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pergola::{server, to_data_url, GenerationHandler, HandlerConfig};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JPEG: [u8; 8] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];
const MODEL_PATH: &str = "/v1/models/black-forest-labs/flux-kontext-pro/predictions";

fn config(server: &MockServer) -> HandlerConfig {
    HandlerConfig::builder()
        .api_token("r8_test")
        .api_base(format!("{}/v1", server.uri()))
        .poll_interval(Duration::from_millis(20))
        .timeout(Duration::from_secs(5))
        .build()
}

fn app(config: HandlerConfig) -> axum::Router {
    server::router(Arc::new(GenerationHandler::new(config)))
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn photo_body() -> serde_json::Value {
    serde_json::json!({
        "imageBase64": to_data_url("image/jpeg", &JPEG),
        "filename": "garden.jpg",
        "color": "anthracite",
        "prompt": "add glass roof",
    })
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn mount_staging(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "upload_url": format!("{}/put/garden", server.uri()),
            "serve_url": "https://files.test/garden.jpg",
        })))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/put/garden"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "p1",
            "status": "starting",
            "urls": {"get": format!("{}/v1/predictions/p1", server.uri())},
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn prediction(status: &str) -> serde_json::Value {
    serde_json::json!({"id": "p1", "status": status})
}

#[tokio::test]
async fn renders_after_polling() {
    let upstream = MockServer::start().await;
    mount_staging(&upstream).await;
    mount_submit(&upstream).await;

    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prediction("processing")))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "p1",
            "status": "succeeded",
            "output": ["https://x/out.png"],
        })))
        .with_priority(2)
        .mount(&upstream)
        .await;

    let (status, body) = send(app(config(&upstream)), post("/api/generate", photo_body())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"image": "https://x/out.png"}));

    let requests = upstream.received_requests().await.unwrap();
    let polls = requests
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(polls, 4);

    let submit = requests
        .iter()
        .find(|r| r.url.path() == MODEL_PATH)
        .unwrap();
    let submitted: serde_json::Value = serde_json::from_slice(&submit.body).unwrap();
    let prompt = submitted["input"]["prompt"].as_str().unwrap();
    assert!(prompt.contains("anthracite"));
    assert!(prompt.contains("add glass roof"));
    assert_eq!(submitted["input"]["input_image"], "https://files.test/garden.jpg");
    assert!(submitted.get("version").is_none());
}

#[tokio::test]
async fn function_path_serves_same_contract() {
    let upstream = MockServer::start().await;
    mount_submit(&upstream).await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "p1",
            "status": "succeeded",
            "output": "https://x/single.png",
        })))
        .mount(&upstream)
        .await;

    let body = serde_json::json!({
        "image": "https://cdn.example.com/garden.jpg",
        "color": "white",
        "notes": "louvered roof",
    });
    let (status, json) = send(
        app(config(&upstream)),
        post("/.netlify/functions/generate", body),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["image"], "https://x/single.png");

    // Hosted photos are never staged.
    let requests = upstream.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/v1/uploads"));
}

#[tokio::test]
async fn failed_generation_is_bad_gateway() {
    let upstream = MockServer::start().await;
    mount_staging(&upstream).await;
    mount_submit(&upstream).await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "p1",
            "status": "failed",
            "error": "NSFW content detected",
        })))
        .mount(&upstream)
        .await;

    let (status, body) = send(app(config(&upstream)), post("/api/generate", photo_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, serde_json::json!({"error": "Generation failed"}));
}

#[tokio::test]
async fn debug_mode_echoes_upstream_details() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"detail": "Invalid token"})),
        )
        .mount(&upstream)
        .await;

    let config = HandlerConfig {
        debug: true,
        ..config(&upstream)
    };
    let (status, body) = send(app(config), post("/api/generate", photo_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        body,
        serde_json::json!({
            "error": "Image upload failed: Failed to get upload URL: Invalid token",
            "details": {"detail": "Invalid token"},
        })
    );
}

#[tokio::test]
async fn never_finishing_job_times_out() {
    let upstream = MockServer::start().await;
    mount_staging(&upstream).await;
    mount_submit(&upstream).await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prediction("processing")))
        .mount(&upstream)
        .await;

    let config = HandlerConfig {
        poll_interval: Duration::from_millis(50),
        timeout: Duration::from_millis(300),
        ..config(&upstream)
    };
    let (status, body) = send(app(config), post("/api/generate", photo_body())).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Generation timed out"));
}

#[tokio::test]
async fn rejections_make_no_upstream_calls() {
    let upstream = MockServer::start().await;

    let (status, body) = send(
        app(config(&upstream)),
        Request::builder()
            .method("GET")
            .uri("/api/generate")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, serde_json::json!({"error": "Method Not Allowed"}));

    let (status, body) = send(
        app(config(&upstream)),
        Request::builder()
            .method("POST")
            .uri("/api/generate")
            .body(Body::from("{oops"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, serde_json::json!({"error": "Invalid JSON body"}));

    let (status, body) = send(
        app(config(&upstream)),
        post("/api/generate", serde_json::json!({"color": "white"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, serde_json::json!({"error": "No image provided"}));

    let small = HandlerConfig {
        max_image_bytes: 4,
        ..config(&upstream)
    };
    let (status, _) = send(app(small), post("/api/generate", photo_body())).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let tokenless = HandlerConfig {
        api_token: None,
        ..config(&upstream)
    };
    let (status, body) = send(app(tokenless), post("/api/generate", photo_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, serde_json::json!({"error": "Missing REPLICATE_API_TOKEN"}));

    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_body_is_json_413() {
    let upstream = MockServer::start().await;
    let config = HandlerConfig {
        max_image_bytes: 16,
        ..config(&upstream)
    };
    let limit = config.max_body_bytes();
    let body = serde_json::json!({ "image": "A".repeat(limit + 1) });

    let (status, json) = send(app(config), post("/api/generate", body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["error"].as_str().unwrap().starts_with("Image too large"));
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn health_check() {
    let upstream = MockServer::start().await;
    let response = app(config(&upstream))
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn slow_poll_does_not_outlive_deadline() {
    let upstream = MockServer::start().await;
    mount_staging(&upstream).await;
    mount_submit(&upstream).await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(prediction("processing"))
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&upstream)
        .await;

    let config = HandlerConfig {
        poll_interval: Duration::from_millis(50),
        timeout: Duration::from_millis(300),
        ..config(&upstream)
    };
    let started = std::time::Instant::now();
    let (status, _) = send(app(config), post("/api/generate", photo_body())).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(2));
}
