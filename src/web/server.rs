use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use crate::config::StorytimeConfig;
use crate::service::StoryService;
use crate::store::StoryDb;

/// Where the HTTP server listens and which database it serves.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Allow cross-origin requests from any origin.
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&StorytimeConfig::default())
    }
}

impl From<&StorytimeConfig> for ServerConfig {
    fn from(config: &StorytimeConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.storage.db_path.clone(),
            permissive_cors: false,
        }
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>, permissive_cors: bool) -> Router {
    let mut app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if permissive_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Open the database and serve until Ctrl+C.
pub async fn start_server(server: ServerConfig, config: StorytimeConfig) -> Result<()> {
    if let Some(parent) = server.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = StoryDb::new(&server.db_path)
        .with_context(|| format!("Failed to open database at {}", server.db_path.display()))?;

    let state = Arc::new(AppState {
        service: StoryService::new(db, config),
    });
    let app = build_router(state, server.permissive_cors);

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, db = %server.db_path.display(), "storytime listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.db_path, PathBuf::from(".storytime/storytime.db"));
        assert!(!config.permissive_cors);
    }

    #[tokio::test]
    async fn test_router_serves_health_with_layers() {
        let service = StoryService::new(StoryDb::new_in_memory().unwrap(), StorytimeConfig::default());
        let app = build_router(Arc::new(AppState { service }), true);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let service = StoryService::new(StoryDb::new_in_memory().unwrap(), StorytimeConfig::default());
        let app = build_router(Arc::new(AppState { service }), false);
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
