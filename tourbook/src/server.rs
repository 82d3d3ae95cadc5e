//! HTTP server with graceful shutdown

use std::any::Any;
use std::net::SocketAddr;

use axum::{
    http::{StatusCode, Uri},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    api,
    config::Config,
    error::{render_errors, Error, ErrorResponse, Result, GENERIC_MESSAGE},
    health::{health, readiness},
    middleware::{
        apply_security_headers, request_id_header, request_id_layer, request_id_propagation_layer,
        sensitive_headers_layer,
    },
    state::AppState,
};

/// Build the complete application: routes, error rendering and the
/// middleware stack configured for `state`
pub fn app(state: AppState) -> Router {
    let config = state.config().clone();
    let environment = config.service.environment;

    let router = Router::new()
        .route("/health", get(health))
        .route("/ready", get(readiness))
        .merge(api::router(&state))
        .fallback(not_found)
        .layer(from_fn_with_state(environment, render_errors))
        .with_state(state);

    apply_layers(router, &config)
}

async fn not_found(uri: Uri) -> Error {
    Error::NotFound(format!("Can't find {} on this server!", uri))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_MESSAGE)),
    )
        .into_response()
}

/// Layers are applied in reverse order: the last one added runs first
fn apply_layers(app: Router, config: &Config) -> Router {
    let middleware = &config.middleware;
    let tracking = &middleware.request_tracking;
    let mut app = app;

    if middleware.catch_panic {
        app = app.layer(CatchPanicLayer::custom(panic_response));
    }

    app = apply_security_headers(app, middleware.security_headers, config.is_production())
        .layer(build_cors_layer(&middleware.cors_mode))
        .layer(RequestBodyLimitLayer::new(middleware.body_limit_kb * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.timeout(),
        ));

    if middleware.compression {
        app = app.layer(CompressionLayer::new());
    }

    app = app.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().include_headers(true))
            .on_response(DefaultOnResponse::new().include_headers(true)),
    );

    if tracking.mask_sensitive_headers {
        app = app.layer(sensitive_headers_layer());
    }

    if tracking.request_id_enabled {
        let header = request_id_header(tracking);
        app = app
            .layer(request_id_propagation_layer(header.clone()))
            .layer(request_id_layer(header));
    }

    app
}

/// Build CORS layer based on configuration
fn build_cors_layer(mode: &str) -> CorsLayer {
    match mode {
        "permissive" => {
            tracing::debug!("Enabling permissive CORS");
            CorsLayer::permissive()
        }
        "restrictive" | "disabled" => {
            tracing::debug!("Enabling restrictive CORS (default deny)");
            CorsLayer::new()
        }
        _ => {
            tracing::warn!("Unknown CORS mode: {}, defaulting to permissive", mode);
            CorsLayer::permissive()
        }
    }
}

/// Server instance
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the server with the given application
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!("Starting {} on {}", self.config.service.name, addr);
        self.log_middleware_config();

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Server listening on {}", addr);

        // Peer addresses feed the rate limiter
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Log middleware configuration for debugging
    fn log_middleware_config(&self) {
        let middleware = &self.config.middleware;
        tracing::info!("Middleware configuration:");
        tracing::info!("  - Environment: {:?}", self.config.service.environment);
        tracing::info!("  - Panic recovery: {}", middleware.catch_panic);
        tracing::info!(
            "  - Request ID tracking: {}",
            middleware.request_tracking.request_id_enabled
        );
        tracing::info!("  - Request body limit: {} KB", middleware.body_limit_kb);
        tracing::info!("  - Compression: {}", middleware.compression);
        tracing::info!("  - Security headers: {}", middleware.security_headers);
        tracing::info!("  - CORS mode: {}", middleware.cors_mode);
        tracing::info!(
            "  - Request timeout: {} seconds",
            self.config.service.timeout_secs
        );
        tracing::info!(
            "  - API rate limit: {} req / {} sec per client",
            self.config.rate_limit.max_requests,
            self.config.rate_limit.window_secs
        );
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    tracing::info!("Shutdown signal received, draining requests...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;
    use axum::body::Body;
    use tower::ServiceExt;

    #[test]
    fn test_server_creation() {
        let config = Config::default();
        let server = Server::new(config.clone());
        assert_eq!(server.config().service.port, config.service.port);
    }

    #[tokio::test]
    async fn test_unknown_route_is_operational_404() {
        let app = app(testing::state().await);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/v1/nothing-here?x=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "Can't find /api/v1/nothing-here?x=1 on this server!");
        // Development mode adds debug detail
        assert!(body.get("stack").is_some());
    }

    #[tokio::test]
    async fn test_production_errors_are_terse() {
        let mut config = testing::config();
        config.service.environment = crate::config::Environment::Production;
        let state = AppState::builder().config(config).build().await.unwrap();
        let response = app(state)
            .oneshot(axum::http::Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key("strict-transport-security"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"status": "fail", "message": "Can't find /missing on this server!"})
        );
    }

    #[tokio::test]
    async fn test_health_routes() {
        let app = app(testing::state().await);
        for uri in ["/health", "/ready"] {
            let response = app
                .clone()
                .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[test]
    fn test_panic_response_is_generic() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
