//! SectorSite API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Tenant resolution for sector sites
//! - Authentication against the backing store's session API
//! - Encrypted vault and subscription gating
//! - Rate limiting and observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use sectorsite_common::{
    auth::{AuthClient, JwtVerifier},
    config::AppConfig,
    db::{self, Repository, RowStore},
    metrics::{self, LATENCY_BUCKETS, METRICS_PREFIX},
    FieldCodec, TenantResolver,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub codec: FieldCodec,
    pub resolver: TenantResolver,
    pub auth: AuthClient,
    pub verifier: JwtVerifier,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn RowStore>) -> sectorsite_common::Result<Self> {
        let repo = Repository::new(store).with_tenant_table(config.tenancy.tenant_table.clone());
        Ok(Self {
            codec: FieldCodec::new(config.security.encryption_key.clone()),
            resolver: TenantResolver::new(repo.clone()),
            auth: AuthClient::new(&config.store)?,
            verifier: JwtVerifier::new(&config.store)?,
            repo,
            config,
        })
    }
}

impl FromRef<AppState> for JwtVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(
        service = %config.observability.service_name,
        environment = %config.app.environment,
        "Starting SectorSite API Gateway v{}",
        sectorsite_common::VERSION
    );

    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    info!(
        main_domain = %config.tenancy.main_domain,
        enable_subdomains = config.tenancy.enable_subdomains,
        default_sector = %config.tenancy.default_sector,
        tenant_table = %config.tenancy.tenant_table,
        "Tenancy configuration"
    );

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
                LATENCY_BUCKETS,
            )?
            .with_http_listener(metrics_addr)
            .install()?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }

    // Backing store
    let store = db::connect(&config.store)?;
    let state = AppState::new(config.clone(), store)?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let rate_limit = &state.config.rate_limit;
    let limiter = rate_limit
        .enabled
        .then(|| middleware::rate_limit::create_rate_limiter(rate_limit.requests_per_second, rate_limit.burst));

    // API routes
    let api_routes = Router::new()
        // Tenant resolution (no auth)
        .route("/resolve", get(handlers::resolve::resolve))
        .route("/sectors", get(handlers::sectors::list_sectors))
        .route("/sectors/{id}", get(handlers::sectors::get_sector))
        .route("/plans", get(handlers::sectors::list_plans))

        // Session endpoints
        .route("/auth/signup", post(handlers::auth::sign_up))
        .route("/auth/signin", post(handlers::auth::sign_in))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/signout", post(handlers::auth::sign_out))
        .route("/auth/user", get(handlers::auth::current_user))

        // Tenant endpoints
        .route(
            "/tenants",
            get(handlers::tenants::list_my_tenants).post(handlers::tenants::create_tenant),
        )
        .route(
            "/tenants/{id}",
            get(handlers::tenants::get_tenant)
                .patch(handlers::tenants::update_tenant)
                .delete(handlers::tenants::deactivate_tenant),
        )
        .route("/tenants/{id}/url", get(handlers::tenants::tenant_link))

        // Subscription endpoints
        .route("/subscription", get(handlers::subscription::get_subscription))
        .route("/subscription/check", post(handlers::subscription::check_action))
        .route("/subscription/upgrade", post(handlers::subscription::upgrade))
        .route("/subscription/cancel", post(handlers::subscription::cancel))

        // Vault endpoints
        .route(
            "/records",
            get(handlers::records::list_records).post(handlers::records::create_record),
        )
        .route("/records/stats", get(handlers::records::usage_stats))
        .route(
            "/records/{id}",
            put(handlers::records::update_record).delete(handlers::records::delete_record),
        )
        .route("/records/{id}/favorite", post(handlers::records::set_favorite));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_metrics));

    if let Some(limiter) = limiter {
        app = app.layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                middleware::rate_limit::rate_limit_middleware(request, next, limiter.clone())
            },
        ));
    }

    let app = with_server_limits(app, &state.config);

    // Compose the app
    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Request timeout and concurrency limit from server config
fn with_server_limits<S>(router: Router<S>, config: &AppConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
