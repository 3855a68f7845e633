pub mod config;
pub mod error;
pub mod routes;
pub mod seats;
pub mod session;

use axum::{routing::get, Extension, Router};
use chess_core::ShakmatyEngine;
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, services::ServeDir};

use crate::config::Config;
use crate::seats::ConnectionIds;
use crate::session::SessionHandle;

/// Router for one game: the relay socket, a health probe, and the static
/// client page for everything else.
pub fn app(config: &Config, session: SessionHandle) -> Router {
    let client_page = Router::new()
        .fallback_service(ServeDir::new(&config.public_dir))
        .layer(CompressionLayer::new());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/ws", get(routes::ws::ws_handler))
        .merge(client_page)
        .layer(Extension(session))
        .layer(Extension(ConnectionIds::new()))
}

/// Start a fresh game and serve it on `listener` until the server stops.
pub async fn serve(listener: TcpListener, config: Config) -> std::io::Result<()> {
    let session = SessionHandle::spawn(ShakmatyEngine::default());
    axum::serve(listener, app(&config, session)).await
}
