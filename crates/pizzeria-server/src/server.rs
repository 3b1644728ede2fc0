use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::get,
};
use pizzeria_db_postgres::{Daos, PostgresStorage, mask_password};
use pizzeria_query::Schemas;
use pizzeria_storage::ConnectionProvider;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, handlers, middleware as app_middleware, serializers::Serializer};

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub daos: Daos,
    pub serializer: Serializer,
    pub provider: Arc<dyn ConnectionProvider>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ConnectionProvider>, schemas: Schemas, links_base: impl Into<String>) -> Self {
        let daos = Daos::new(provider.clone(), &schemas);
        Self {
            daos,
            serializer: Serializer::new(Arc::new(schemas), links_base),
            provider,
        }
    }
}

pub struct PizzeriaServer {
    addr: SocketAddr,
    app: Router,
}

fn resource_routes() -> Router<AppState> {
    Router::new()
        .route("/doughs", get(handlers::list_doughs).post(handlers::create_dough))
        .route("/doughs/{id}", get(handlers::get_dough).patch(handlers::update_dough))
        .route(
            "/ingredients",
            get(handlers::list_ingredients).post(handlers::create_ingredient),
        )
        .route(
            "/ingredients/{id}",
            get(handlers::get_ingredient).patch(handlers::update_ingredient),
        )
        .route("/pizzas", get(handlers::list_pizzas).post(handlers::create_pizza))
        .route("/pizzas/{id}", get(handlers::get_pizza).patch(handlers::update_pizza))
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let base_path = cfg.server.base_path.trim_end_matches('/');

    let router = Router::new()
        // Health endpoints
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz));
    let router = if base_path.is_empty() {
        router.merge(resource_routes())
    } else {
        router.nest(base_path, resource_routes())
    };

    router
        .with_state(state)
        // Middleware stack, innermost first: content negotiation -> cors -> trace -> body limit -> request id
        .layer(middleware::from_fn(app_middleware::content_negotiation))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    provider: Option<Arc<dyn ConnectionProvider>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            provider: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses `provider` instead of opening a PostgreSQL pool from the config.
    pub fn with_provider(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub async fn build(self) -> anyhow::Result<PizzeriaServer> {
        let provider = match self.provider {
            Some(provider) => provider,
            None => connect_postgres(&self.config).await?,
        };
        let state = AppState::new(provider, Schemas::default(), self.config.links_base());
        let app = build_app(state, &self.config);

        Ok(PizzeriaServer {
            addr: self.addr,
            app,
        })
    }
}

async fn connect_postgres(cfg: &AppConfig) -> anyhow::Result<Arc<dyn ConnectionProvider>> {
    let pg = cfg
        .storage
        .postgres
        .as_ref()
        .context("storage.postgres config is required")?
        .to_postgres_config();
    tracing::info!(
        url = %mask_password(&pg.url),
        pool_size = pg.pool_size,
        run_migrations = pg.run_migrations,
        "Connecting to PostgreSQL"
    );
    let storage = PostgresStorage::new(pg)
        .await
        .context("failed to initialize PostgreSQL storage")?;
    Ok(Arc::new(storage))
}

impl PizzeriaServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
