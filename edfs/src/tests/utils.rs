use std::sync::Arc;

use tokio::net::TcpListener;
use url::Url;

use crate::http::{gen_router, AppState, DEFAULT_UPLOAD_LIMIT};
use crate::security::SecurityContext;
use crate::transport::{BrickTransport, HttpBrickTransport, MemoryBrickTransport};

/// Spins up the brick HTTP server on a random local port, backed by the
/// given transport, and returns its base url.
pub async fn spawn_brick_server(
    backend: Arc<dyn BrickTransport>,
    auth_token: Option<String>,
    upload_limit: usize,
) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind");
    let addr = listener.local_addr().expect("must have local addr");

    let app = gen_router(upload_limit).with_state(AppState::new(backend, auth_token));
    tokio::spawn(async move { axum::serve(listener, app).await });

    Url::parse(&format!("http://{}/", addr)).expect("must parse")
}

/// Constructs a [HttpBrickTransport] talking to a fresh in-memory server.
pub async fn make_http_transport() -> Arc<dyn BrickTransport> {
    let url = spawn_brick_server(
        Arc::new(MemoryBrickTransport::default()),
        None,
        DEFAULT_UPLOAD_LIMIT,
    )
    .await;

    Arc::new(
        HttpBrickTransport::from_url(&url, &SecurityContext::default()).expect("must construct"),
    )
}
