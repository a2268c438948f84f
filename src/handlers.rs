use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::State,
    http::{StatusCode, Uri},
    response::Html,
    routing::{MethodFilter, MethodRouter, on},
};

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    models::{ErrorResponse, HealthResponse, UserProfile},
    views::Views,
};

/// Endpoint
///
/// Builds the method router for a handler once the route's HTTP method is
/// known. Route manifests refer to endpoints by id; the id is resolved here at
/// boot, never at request time.
pub type Endpoint = fn(MethodFilter) -> MethodRouter<AppState>;

/// HandlerRegistry
///
/// Statically typed table of every handler a route manifest may reference.
/// Ids are `<namespace>.<controller>.<action>`; the web group has no namespace.
pub struct HandlerRegistry {
    endpoints: HashMap<&'static str, Endpoint>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            endpoints: HashMap::new(),
        };

        // web
        registry.register("home.index", |method| on(method, index));
        registry.register("health.show", |method| on(method, health));
        // api
        registry.register("api.user.show", |method| on(method, current_user));
        // dashboard, admin, manager
        registry.register("dashboard.home.index", |method| on(method, dashboard_index));
        registry.register("admin.home.index", |method| on(method, admin_index));
        registry.register("manager.home.index", |method| on(method, manager_index));

        registry
    }
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            endpoints: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: &'static str, endpoint: Endpoint) {
        self.endpoints.insert(id, endpoint);
    }

    pub fn resolve(&self, id: &str) -> Option<Endpoint> {
        self.endpoints.get(id).copied()
    }
}

// --- Handlers ---

/// index
///
/// [Web] The root page. Renders the static `welcome` view; takes no input.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Welcome page", body = String, content_type = "text/html"))
)]
pub async fn index(State(views): State<Arc<Views>>) -> Result<Html<&'static str>, AppError> {
    views.render("welcome")
}

/// health
///
/// [Web] Returns "ok" with the build identity for monitoring and load balancers.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// current_user
///
/// [Api] The authenticated caller's profile. Anonymous callers get 401 from the
/// `AuthUser` extractor.
#[utoipa::path(
    get,
    path = "/api/user",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Not authenticated"),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse)
    )
)]
pub async fn current_user(AuthUser { id, role }: AuthUser) -> Json<UserProfile> {
    Json(UserProfile { id, role })
}

#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard page", body = String, content_type = "text/html"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn dashboard_index(
    State(views): State<Arc<Views>>,
) -> Result<Html<&'static str>, AppError> {
    views.render("dashboard")
}

#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "Admin page", body = String, content_type = "text/html"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn admin_index(State(views): State<Arc<Views>>) -> Result<Html<&'static str>, AppError> {
    views.render("admin")
}

#[utoipa::path(
    get,
    path = "/manager",
    responses(
        (status = 200, description = "Manager page", body = String, content_type = "text/html"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not a manager")
    )
)]
pub async fn manager_index(
    State(views): State<Arc<Views>>,
) -> Result<Html<&'static str>, AppError> {
    views.render("manager")
}

/// not_found
///
/// Fallback for any path no group registered.
pub async fn not_found(uri: Uri) -> (StatusCode, Json<ErrorResponse>) {
    tracing::debug!(path = %uri.path(), "no route matched");

    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            "not_found",
            format!("No route matches {}", uri.path()),
        )),
    )
}
