//! Health check handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service name
    pub service: String,

    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Readiness check response with dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,

    /// Service name
    pub service: String,

    /// Dependency statuses
    pub dependencies: HashMap<String, DependencyStatus>,
}

/// Individual dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// Dependency is healthy
    pub healthy: bool,

    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Simple health check (liveness probe)
///
/// Always returns 200 OK if the service is running.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.config().service.name.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check with dependency validation (readiness probe)
///
/// Returns 200 OK when the document store answers and 503 otherwise.
/// An unconfigured payment gateway is reported but does not fail readiness.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let mut dependencies = HashMap::new();

    let store_ready = match state.db().store().ping().await {
        Ok(()) => {
            dependencies.insert(
                "store".to_string(),
                DependencyStatus {
                    healthy: true,
                    message: None,
                },
            );
            true
        }
        Err(e) => {
            tracing::warn!("Document store health check failed: {}", e);
            dependencies.insert(
                "store".to_string(),
                DependencyStatus {
                    healthy: false,
                    message: Some(e.to_string()),
                },
            );
            false
        }
    };

    dependencies.insert(
        "payments".to_string(),
        DependencyStatus {
            healthy: state.payments().is_some(),
            message: state
                .payments()
                .is_none()
                .then(|| "not configured".to_string()),
        },
    );

    let status = if store_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = ReadinessResponse {
        ready: store_ready,
        service: state.config().service.name.clone(),
        dependencies,
    };

    (status, Json(response))
}
