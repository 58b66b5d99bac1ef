//! # Hoist Server
//!
//! Upload receiver for the hoist agent: authenticates senders by bearer
//! token and writes uploaded files into a backing store under a
//! per-client key prefix. Besides `POST /upload` it offers `GET /exists`
//! and `GET /download` so operators (and the end-to-end tests) can verify
//! what landed.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod storage;

pub use config::{ClientEntry, ReceiverConfig};
pub use error::{Result, ServerError};
pub use storage::{LocalStorage, Storage};

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    /// api key -> client id
    clients: Arc<HashMap<String, String>>,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        clients: impl IntoIterator<Item = ClientEntry>,
        max_upload_mb: u64,
    ) -> Self {
        let clients = clients
            .into_iter()
            .map(|c| (c.api_key, c.id))
            .collect::<HashMap<_, _>>();
        Self {
            storage,
            clients: Arc::new(clients),
            // Leave headroom for the multipart envelope around the file.
            max_body_bytes: ((max_upload_mb + 1) * 1_048_576) as usize,
        }
    }

    pub(crate) fn client_for_key(&self, api_key: &str) -> Option<&str> {
        self.clients.get(api_key).map(String::as_str)
    }
}

pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/exists", get(handlers::exists))
        .route("/download", get(handlers::download))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(authed)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
