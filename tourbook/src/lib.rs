//! # tourbook
//!
//! REST backend for booking guided tours: tours, reviews, users and paid
//! bookings over a document store.
//!
//! ## Features
//!
//! - **Resource factory**: list/read/create/update/delete handlers generated per entity
//! - **Query features**: filtering with comparison operators, sorting, field selection, pagination
//! - **Lifecycle hooks**: pre-save, pre-query, pre-aggregate and post-write hooks per entity
//! - **Access control**: JWT sessions (header or cookie) and role restrictions
//! - **Middleware stack**: rate limiting, request tracking, panic recovery, body size limits
//! - **Centralized errors**: operational vs programming errors, development/production rendering
//! - **Graceful shutdown**: Proper signal handling (SIGTERM, SIGINT)
//!
//! ## Example
//!
//! ```rust,no_run
//! use tourbook::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Build application state
//!     let state = AppState::builder()
//!         .config(config.clone())
//!         .build()
//!         .await?;
//!
//!     // Run server
//!     Server::new(config)
//!         .serve(app(state))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod entities;
pub mod error;
pub mod features;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod model;
pub mod observability;
pub mod server;
pub mod services;
pub mod state;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, Environment};
    pub use crate::error::{Error, Result};
    pub use crate::features::{QueryFeatures, RequestParams};
    pub use crate::handlers::{Envelope, JsonBody, Params, ResourceHandlers};
    pub use crate::health::{health, readiness};
    pub use crate::middleware::{protect, restrict_to, AllowedRoles, CurrentUser};
    pub use crate::model::{Database, Model, Query};
    pub use crate::observability::{init_tracing, shutdown_tracing};
    pub use crate::server::{app, Server};
    pub use crate::state::AppState;
    pub use crate::store::{DocumentStore, MemoryStore};

    pub use axum::{
        extract::{Path, Query as QueryParams, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{delete, get, patch, post, put},
        Json, Router,
    };

    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, warn};
}
