//! HTTP surface for the generation handler.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handler::{GenerationHandler, HandlerResponse, ResponseBody};
use crate::types::ErrorBody;

/// Path the browser client posts to.
pub const GENERATE_PATH: &str = "/api/generate";

/// Serverless-style alias kept for deployed front-ends.
pub const FUNCTION_PATH: &str = "/.netlify/functions/generate";

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn generate(
    State(handler): State<Arc<GenerationHandler>>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => handler.handle(&method, &body).await.into_response(),
        Err(rejection) => {
            let status = rejection.status();
            tracing::debug!(%status, "rejected request body: {}", rejection.body_text());
            let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
                "Image too large. Please upload a smaller image.".to_string()
            } else {
                "Invalid request body".to_string()
            };
            HandlerResponse {
                status,
                body: ResponseBody::Error(ErrorBody {
                    error,
                    details: None,
                }),
            }
            .into_response()
        }
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");

    let body = serde_json::json!({ "error": "Server error" }).to_string();
    axum::http::Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Builds the router: health check plus the generation routes.
pub fn router(handler: Arc<GenerationHandler>) -> Router {
    let body_limit = handler.config().max_body_bytes();

    Router::new()
        .route("/", get(|| async { "ok" }))
        .route(GENERATE_PATH, any(generate))
        .route(FUNCTION_PATH, any(generate))
        .with_state(handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(addr: SocketAddr, handler: Arc<GenerationHandler>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "pergola generation service listening");
    axum::serve(listener, router(handler)).await
}
