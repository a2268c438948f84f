//! Route table.
//!
//! At boot the five route groups are declared in a fixed order (admin, api,
//! dashboard, manager, web), their sources are loaded, and every definition is
//! resolved against the handler and middleware registries. The result is an
//! immutable [`RouteTable`] shared through the application state; nothing is
//! looked up by name at request time.

use std::collections::HashSet;

use axum::{
    Router,
    http::Method,
    routing::MethodFilter,
};

use crate::{
    AppState,
    config::AppConfig,
    error::BootError,
    handlers::{Endpoint, HandlerRegistry},
    middleware::{Filter, MiddlewareRegistry, apply_filters},
};

pub mod source;
pub use source::{RouteDefinition, RouteSource};

/// Where users land after authenticating. Equals the URL of `dashboard.index`.
pub const HOME: &str = "/dashboard";

/// RouteGroup
///
/// Declaration of a group: the prefixes applied to its routes, the middleware
/// tag guarding them, the handler namespace, and where its definitions live.
#[derive(Debug, Clone, Default)]
pub struct RouteGroup {
    prefix: Option<String>,
    name: Option<String>,
    middleware: String,
    namespace: Option<String>,
    source: RouteSource,
}

impl RouteGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn middleware(mut self, tag: &str) -> Self {
        self.middleware = tag.to_string();
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn source(mut self, source: RouteSource) -> Self {
        self.source = source;
        self
    }

    fn mount(&self, definition: RouteDefinition, handlers: &HandlerRegistry) -> Result<Route, BootError> {
        let path = join_path(self.prefix.as_deref(), &definition.path);

        let method = definition
            .method
            .to_ascii_uppercase()
            .parse::<Method>()
            .ok()
            .and_then(|method| MethodFilter::try_from(method.clone()).ok().map(|filter| (method, filter)));
        let Some((method, filter)) = method else {
            return Err(BootError::UnsupportedMethod {
                group: self.middleware.clone(),
                path,
                method: definition.method,
            });
        };

        let handler = match &self.namespace {
            Some(namespace) => format!("{namespace}.{}", definition.handler),
            None => definition.handler,
        };
        let Some(endpoint) = handlers.resolve(&handler) else {
            return Err(BootError::UnknownHandler {
                group: self.middleware.clone(),
                path,
                handler,
            });
        };

        let name = definition
            .name
            .map(|name| format!("{}{name}", self.name.as_deref().unwrap_or_default()));

        Ok(Route {
            method,
            filter,
            path,
            name,
            handler,
            endpoint,
        })
    }
}

/// Route
///
/// A fully resolved route: absolute path, full name, qualified handler id.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub name: Option<String>,
    pub handler: String,
    filter: MethodFilter,
    endpoint: Endpoint,
}

/// MountedGroup
///
/// A declared group after its source has been loaded and resolved.
#[derive(Debug, Clone)]
pub struct MountedGroup {
    prefix: Option<String>,
    name: Option<String>,
    middleware: String,
    namespace: Option<String>,
    source: RouteSource,
    filters: Vec<Filter>,
    routes: Vec<Route>,
}

impl MountedGroup {
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn name_prefix(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn middleware(&self) -> &str {
        &self.middleware
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn source(&self) -> &RouteSource {
        &self.source
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    fn router(&self, state: &AppState) -> Router<AppState> {
        // Routes sharing a path are merged into one method router by axum.
        let router = self.routes.iter().fold(Router::new(), |router, route| {
            router.route(&route.path, (route.endpoint)(route.filter))
        });

        // axum refuses route layers on a router without routes.
        if self.routes.is_empty() {
            return router;
        }
        apply_filters(router, &self.middleware, &self.filters, state)
    }
}

/// RouteTable
///
/// The immutable routing state: groups in registration order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    groups: Vec<MountedGroup>,
}

impl RouteTable {
    pub fn groups(&self) -> &[MountedGroup] {
        &self.groups
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.groups.iter().flat_map(|group| group.routes.iter())
    }

    /// Path of the route registered under the full `name` (e.g. `admin.index`).
    pub fn url_for(&self, name: &str) -> Option<&str> {
        self.routes()
            .find(|route| route.name.as_deref() == Some(name))
            .map(|route| route.path.as_str())
    }

    /// Builds the axum router for every group, each wrapped in its own chain.
    pub fn router(&self, state: &AppState) -> Router<AppState> {
        self.groups
            .iter()
            .fold(Router::new(), |app, group| app.merge(group.router(state)))
    }
}

/// RouteTableBuilder
///
/// Collects group declarations in order and resolves them into a [`RouteTable`].
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    groups: Vec<RouteGroup>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, group: RouteGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Loads and resolves every group in registration order. The first failure
    /// aborts the build; there is no partially built table.
    pub fn build(
        self,
        handlers: &HandlerRegistry,
        middleware: &MiddlewareRegistry,
    ) -> Result<RouteTable, BootError> {
        let mut registered: HashSet<(Method, String)> = HashSet::new();
        let mut paths = PathIndex::default();
        let mut groups = Vec::with_capacity(self.groups.len());

        for group in self.groups {
            let filters = middleware
                .resolve(&group.middleware)
                .ok_or_else(|| BootError::UnknownMiddleware {
                    group: group.middleware.clone(),
                    middleware: group.middleware.clone(),
                })?
                .to_vec();

            let definitions = group.source.load(&group.middleware)?;
            let mut routes = Vec::with_capacity(definitions.len());
            for definition in definitions {
                let route = group.mount(definition, handlers)?;
                paths.insert(&group.middleware, &route.path)?;
                if !registered.insert((route.method.clone(), route.path.clone())) {
                    return Err(BootError::DuplicateRoute {
                        method: route.method.to_string(),
                        path: route.path,
                    });
                }
                routes.push(route);
            }

            tracing::info!(
                middleware = %group.middleware,
                prefix = group.prefix.as_deref().unwrap_or("/"),
                source = %group.source,
                routes = routes.len(),
                "route group registered"
            );

            groups.push(MountedGroup {
                prefix: group.prefix,
                name: group.name,
                middleware: group.middleware,
                namespace: group.namespace,
                source: group.source,
                filters,
                routes,
            });
        }

        Ok(RouteTable { groups })
    }
}

/// map
///
/// Declares the service's route groups. The specific prefixes come before the
/// catch-all web group, and this order is kept in the table.
pub fn map(config: &AppConfig) -> RouteTableBuilder {
    let manifest = |group: &str| RouteSource::file(config.routes_path.join(format!("{group}.toml")));

    RouteTableBuilder::new()
        .group(
            RouteGroup::new()
                .prefix("admin")
                .name("admin.")
                .middleware("admin")
                .namespace("admin")
                .source(manifest("admin")),
        )
        .group(
            RouteGroup::new()
                .prefix("api")
                .name("api.")
                .middleware("api")
                .namespace("api")
                .source(manifest("api")),
        )
        .group(
            RouteGroup::new()
                .prefix("dashboard")
                .name("dashboard.")
                .middleware("dashboard")
                .namespace("dashboard")
                .source(manifest("dashboard")),
        )
        .group(
            RouteGroup::new()
                .prefix("manager")
                .name("manager.")
                .middleware("manager")
                .namespace("manager")
                .source(manifest("manager")),
        )
        .group(RouteGroup::new().middleware("web").source(manifest("web")))
}

/// Every distinct path accepted so far, in the same matcher axum routes
/// with. Shapes axum would refuse when the router is assembled (conflicting
/// captures, legacy `:id` segments, unnamed captures) fail the build instead.
#[derive(Default)]
struct PathIndex {
    matcher: matchit::Router<()>,
    paths: HashSet<String>,
}

impl PathIndex {
    fn insert(&mut self, group: &str, path: &str) -> Result<(), BootError> {
        // Another method on a known path is merged by axum.
        if self.paths.contains(path) {
            return Ok(());
        }

        let invalid = |reason: String| BootError::InvalidPath {
            group: group.to_string(),
            path: path.to_string(),
            reason,
        };

        check_captures(path).map_err(|reason| invalid(reason.to_string()))?;
        self.matcher.insert(path, ()).map_err(|err| match err {
            matchit::InsertError::Conflict { with } => BootError::ConflictingRoute {
                group: group.to_string(),
                path: path.to_string(),
                existing: with,
            },
            other => invalid(other.to_string()),
        })?;

        self.paths.insert(path.to_string());
        Ok(())
    }
}

fn check_captures(path: &str) -> Result<(), &'static str> {
    for segment in path.split('/') {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err("segments must not start with `:` or `*`, write captures as `{name}`");
        }
        if segment.contains("{}") || segment.contains("{*}") {
            return Err("captures must be named");
        }
    }
    Ok(())
}

fn join_path(prefix: Option<&str>, path: &str) -> String {
    let prefix = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty());
    let path = path.trim_matches('/');

    match (prefix, path.is_empty()) {
        (None, true) => "/".to_string(),
        (None, false) => format!("/{path}"),
        (Some(prefix), true) => format!("/{prefix}"),
        (Some(prefix), false) => format!("/{prefix}/{path}"),
    }
}
