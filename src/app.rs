use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    http::{Request, Response},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{field, info, info_span, Span};

use crate::images::services::request_body_limit;
use crate::state::AppState;
use crate::{advice, auth, chat, goals, medical, payments, profiles, scans, stories, translate};

fn api_routes() -> Router<AppState> {
    [
        auth::router(),
        profiles::router(),
        goals::router(),
        scans::router(),
        chat::router(),
        medical::router(),
        advice::router(),
        translate::router(),
        payments::router(),
        stories::router(),
    ]
    .into_iter()
    .fold(Router::new(), Router::merge)
    .route("/health", get(|| async { "ok" }))
}

fn request_span<B>(req: &Request<B>) -> Span {
    info_span!(
        "http_request",
        method = %req.method(),
        uri = %req.uri(),
        status = field::Empty
    )
}

fn log_response<B>(res: &Response<B>, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", field::display(status));
    let latency_ms = latency.as_millis() as u64;
    if status.is_server_error() {
        tracing::error!(%status, latency_ms, "response");
    } else {
        tracing::info!(%status, latency_ms, "response");
    }
}

pub fn build_app(state: AppState) -> Router {
    // Base64 photos arrive inside JSON bodies.
    let body_limit = request_body_limit(state.config.limits.max_image_bytes);
    let trace = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<_>| request_span(req))
        .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
            log_response(res, latency, span)
        });

    Router::new()
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(trace)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

pub async fn serve(app: Router, bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::auth::tokens::{JwtKeys, TokenKind};

    #[tokio::test]
    async fn health_is_public() {
        let res = build_app(AppState::fake())
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_need_a_bearer_token() {
        for (method, uri) in [
            (Method::GET, "/api/v1/me"),
            (Method::GET, "/api/v1/profile"),
            (Method::GET, "/api/v1/goals"),
            (Method::GET, "/api/v1/scans"),
            (Method::GET, "/api/v1/subscription"),
            (Method::POST, "/api/v1/functions/health-chat"),
        ] {
            let res = build_app(AppState::fake())
                .oneshot(
                    Request::builder()
                        .method(method.clone())
                        .uri(uri)
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from("{}"))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let state = AppState::fake();
        let keys: JwtKeys = axum::extract::FromRef::from_ref(&state);
        let refresh = keys.sign(uuid::Uuid::new_v4(), 0, TokenKind::Refresh).unwrap();

        let res = build_app(state)
            .oneshot(
                Request::get("/api/v1/profile")
                    .header(header::AUTHORIZATION, format!("Bearer {refresh}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn body_limit_follows_the_configured_image_limit() {
        let mut state = AppState::fake();
        let mut config = (*state.config).clone();
        config.limits.max_image_bytes = 16 * 1024 * 1024;
        state.config = std::sync::Arc::new(config);
        let auth = crate::testing::bearer_for(&state, uuid::Uuid::new_v4());

        // Well past any fixed 15 MB cap, yet only slightly over the image limit.
        let body = serde_json::json!({ "image": "A".repeat(23_000_000) }).to_string();
        let res = build_app(state)
            .oneshot(
                Request::post("/api/v1/functions/analyze-food")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, auth)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Image too large, maximum size is 16.0 MB");
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let res = build_app(AppState::fake())
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/v1/functions/analyze-food")
                    .header(header::ORIGIN, "https://app.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(res.status().is_success());
        assert!(res.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
