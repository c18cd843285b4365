//! Serves a [BrickTransport] over the brick HTTP protocol, which is what
//! [crate::transport::HttpBrickTransport] speaks.

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::transport::BrickTransport;

mod bricks;

/// The size limit for brick uploads, if not configured otherwise.
pub const DEFAULT_UPLOAD_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    transport: Arc<dyn BrickTransport>,

    /// If set, requests need to carry it as bearer token.
    auth_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(transport: Arc<dyn BrickTransport>, auth_token: Option<String>) -> Self {
        Self {
            transport,
            auth_token: auth_token.filter(|t| !t.is_empty()).map(Into::into),
        }
    }
}

pub fn gen_router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route(
            "/bricks/:digest",
            get(bricks::get).head(bricks::head).put(bricks::put),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
}

async fn root() -> &'static str {
    "Hello from edfs"
}
