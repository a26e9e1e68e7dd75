//! notemerge web server and REST API.
//!
//! Provides an Axum-based HTTP server with:
//! - Document, fork and pull request endpoints
//! - Audit log API
//! - Status and health endpoints
//! - Simple session-based authentication

pub mod api;

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use notemerge_core::config::AppConfig;
use notemerge_core::db::Database;
use notemerge_core::{DocumentService, ForkManager, Merger, PullRequestService};

/// A logged-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: Arc<Database>,
    pub config: AppConfig,
    pub documents: DocumentService,
    pub forks: ForkManager,
    pub prs: PullRequestService,
    /// Active sessions keyed by token.
    pub sessions: RwLock<HashMap<String, Session>>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Arc<Database>) -> Self {
        let merger = Merger::new(config.merge.marker_labels());
        Self {
            documents: DocumentService::new(db.clone()),
            forks: ForkManager::new(db.clone()),
            prs: PullRequestService::new(db.clone(), merger),
            db,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: AppConfig, db: Arc<Database>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, db)),
        }
    }

    /// Build the full router with middleware.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static(api::auth::USER_ID_HEADER),
            ]);

        Router::new()
            .merge(api::status::routes())
            .merge(api::auth::routes())
            .merge(api::notes::routes())
            .merge(api::forks::routes())
            .merge(api::prs::routes())
            .merge(api::audit::routes())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors)
                    .layer(DefaultBodyLimit::max(self.state.config.web.max_body_bytes)),
            )
            .with_state(self.state.clone())
    }

    /// Bind `listen_addr` and serve until `shutdown` resolves. In-flight
    /// requests are allowed to finish.
    pub async fn start<F>(self, listen_addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listen_addr
            .parse()
            .with_context(|| format!("invalid listen address '{listen_addr}'"))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let app = self.router();
        info!(%addr, "starting web server");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("web server stopped");
        Ok(())
    }

    /// Serve on an already bound listener until the task is dropped.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let app = self.router();
        info!(addr = ?listener.local_addr().ok(), "starting web server");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
