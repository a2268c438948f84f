use std::sync::Arc;

use axum::{Router, extract::FromRef, http::HeaderName, middleware::from_fn_with_state};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod views;

// Route groups, manifests and the immutable route table.
pub mod routes;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::BootError;
pub use rate_limit::RateLimiters;
pub use routes::{HOME, RouteTable};
pub use views::Views;

use handlers::HandlerRegistry;
use middleware::MiddlewareRegistry;

/// ApiDoc
///
/// OpenAPI document for every handler a manifest can mount, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::index, handlers::health, handlers::current_user,
        handlers::dashboard_index, handlers::admin_index, handlers::manager_index
    ),
    components(
        schemas(models::UserProfile, models::HealthResponse, models::ErrorResponse)
    ),
    tags(
        (name = "route-portal", description = "Route groups, rate limiting and the welcome page")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may need, built once by [`AppState::boot`] and shared
/// read-only afterwards. The only mutable part is the rate limiter's counters,
/// which are synchronised internally.
#[derive(Clone)]
pub struct AppState {
    /// Resolved route groups in registration order.
    pub routes: Arc<RouteTable>,
    /// Named limiters and their hit counters.
    pub limiters: Arc<RateLimiters>,
    /// Compiled-in pages.
    pub views: Arc<Views>,
    pub config: AppConfig,
}

impl AppState {
    /// boot
    ///
    /// Defines the rate limiters, checks the middleware groups against them,
    /// then loads and resolves every route group. Any failure aborts the boot.
    pub fn boot(config: AppConfig) -> Result<Self, BootError> {
        let limiters = rate_limit::configure_rate_limiting();

        let middleware = MiddlewareRegistry::standard()?;
        middleware.validate(&limiters)?;

        let routes = routes::map(&config).build(&HandlerRegistry::default(), &middleware)?;

        tracing::info!(
            groups = routes.groups().len(),
            routes = routes.routes().count(),
            home = HOME,
            "route table built"
        );

        Ok(Self {
            routes: Arc::new(routes),
            limiters: Arc::new(limiters),
            views: Arc::new(Views::default()),
            config,
        })
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for Arc<RouteTable> {
    fn from_ref(app_state: &AppState) -> Arc<RouteTable> {
        app_state.routes.clone()
    }
}

impl FromRef<AppState> for Arc<RateLimiters> {
    fn from_ref(app_state: &AppState) -> Arc<RateLimiters> {
        app_state.limiters.clone()
    }
}

impl FromRef<AppState> for Arc<Views> {
    fn from_ref(app_state: &AppState) -> Arc<Views> {
        app_state.views.clone()
    }
}

/// create_router
///
/// Mounts every route group with its own filter chain, the 404 fallback and
/// the API docs, then wraps the whole service in identity resolution and the
/// observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(state.routes.router(&state))
        .fallback(handlers::not_found)
        // Runs before any group filter: they all read the resolved Identity.
        .layer(from_fn_with_state(state.config.clone(), auth::identify))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for the `TraceLayer`, carrying the request id so every log line of a
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
