//! Named middleware groups.
//!
//! A group tag (`web`, `api`, `admin`, ...) resolves to an ordered chain of
//! filters. The chain is built once at boot and attached to every route of a
//! route group with `route_layer`, so paths that match nothing still fall
//! through to the 404 fallback instead of being rejected by a filter.

use std::{collections::HashMap, str::FromStr, sync::Arc};

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    auth::AuthUser,
    error::BootError,
    rate_limit::{RateLimiters, Throttle, throttle},
};

/// Filter
///
/// One request filter of a middleware chain, parsed from its alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `log`: structured event per request, tagged with the group.
    LogRequest,
    /// `auth`: 401 unless the identity is authenticated.
    Authenticate,
    /// `role:<name>`: 403 unless the authenticated user has the role.
    Authorize(String),
    /// `throttle:<bucket>`: consults the named rate limiter.
    Throttle(String),
}

impl FromStr for Filter {
    type Err = BootError;

    fn from_str(alias: &str) -> Result<Self, Self::Err> {
        let invalid = || BootError::InvalidFilter(alias.to_string());

        match alias.split_once(':') {
            None if alias == "log" => Ok(Filter::LogRequest),
            None if alias == "auth" => Ok(Filter::Authenticate),
            Some(("role", role)) if !role.is_empty() => Ok(Filter::Authorize(role.to_string())),
            Some(("throttle", bucket)) if !bucket.is_empty() => {
                Ok(Filter::Throttle(bucket.to_string()))
            }
            _ => Err(invalid()),
        }
    }
}

/// MiddlewareRegistry
///
/// Maps group tags to their filter chains.
#[derive(Debug, Default)]
pub struct MiddlewareRegistry {
    groups: HashMap<String, Vec<Filter>>,
}

impl MiddlewareRegistry {
    /// The service's groups. Every non-web group logs first, then
    /// authenticates, then authorizes; `api` is throttled instead.
    pub fn standard() -> Result<Self, BootError> {
        let mut registry = Self::default();
        registry.group("web", &["log"])?;
        registry.group("api", &["log", "throttle:api"])?;
        registry.group("dashboard", &["log", "auth"])?;
        registry.group("admin", &["log", "auth", "role:admin"])?;
        registry.group("manager", &["log", "auth", "role:manager"])?;
        Ok(registry)
    }

    /// Defines (or replaces) the chain for `tag` from filter aliases.
    pub fn group(&mut self, tag: &str, aliases: &[&str]) -> Result<(), BootError> {
        let filters = aliases
            .iter()
            .map(|alias| alias.parse::<Filter>())
            .collect::<Result<Vec<_>, _>>()?;
        self.groups.insert(tag.to_string(), filters);
        Ok(())
    }

    pub fn resolve(&self, tag: &str) -> Option<&[Filter]> {
        self.groups.get(tag).map(Vec::as_slice)
    }

    /// Checks every throttle filter against the defined limiters, so a typo in
    /// a bucket name fails the boot instead of silently disabling limiting.
    pub fn validate(&self, limiters: &RateLimiters) -> Result<(), BootError> {
        for (tag, filters) in &self.groups {
            for filter in filters {
                if let Filter::Throttle(bucket) = filter {
                    if !limiters.contains(bucket) {
                        return Err(BootError::UndefinedLimiter {
                            middleware: tag.clone(),
                            bucket: bucket.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// apply_filters
///
/// Wraps the routes of `router` in `filters`. Layers added later run first,
/// so the chain is applied back to front to execute in declared order.
pub fn apply_filters(
    router: Router<AppState>,
    tag: &str,
    filters: &[Filter],
    state: &AppState,
) -> Router<AppState> {
    let tag: Arc<str> = Arc::from(tag);

    filters.iter().rev().fold(router, |router, filter| match filter {
        Filter::LogRequest => {
            router.route_layer(middleware::from_fn_with_state(tag.clone(), log_request))
        }
        Filter::Authenticate => router.route_layer(middleware::from_fn(authenticate)),
        Filter::Authorize(role) => router.route_layer(middleware::from_fn_with_state(
            Arc::<str>::from(role.as_str()),
            authorize,
        )),
        Filter::Throttle(bucket) => router.route_layer(middleware::from_fn_with_state(
            Throttle {
                limiters: state.limiters.clone(),
                bucket: Arc::from(bucket.as_str()),
            },
            throttle,
        )),
    })
}

async fn log_request(State(group): State<Arc<str>>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    tracing::info!(
        group = %group,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        "route handled"
    );
    response
}

/// Rejection happens in the `AuthUser` extractor (401).
async fn authenticate(_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

async fn authorize(
    State(role): State<Arc<str>>,
    user: AuthUser,
    request: Request,
    next: Next,
) -> Response {
    if user.role != *role {
        tracing::warn!(user = %user.id, role = %user.role, required = %role, "forbidden");
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::configure_rate_limiting;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("log".parse::<Filter>().unwrap(), Filter::LogRequest);
        assert_eq!("auth".parse::<Filter>().unwrap(), Filter::Authenticate);
        assert_eq!(
            "role:admin".parse::<Filter>().unwrap(),
            Filter::Authorize("admin".to_string())
        );
        assert_eq!(
            "throttle:api".parse::<Filter>().unwrap(),
            Filter::Throttle("api".to_string())
        );
    }

    #[test]
    fn test_reject_unknown_aliases() {
        for alias in ["csrf", "role:", "throttle:", "auth:admin", ""] {
            assert!(
                matches!(alias.parse::<Filter>(), Err(BootError::InvalidFilter(a)) if a == alias),
                "alias `{alias}` should be rejected"
            );
        }
    }

    #[test]
    fn test_standard_groups() {
        let registry = MiddlewareRegistry::standard().unwrap();

        assert_eq!(registry.resolve("web").unwrap(), &[Filter::LogRequest]);
        assert_eq!(
            registry.resolve("admin").unwrap(),
            &[
                Filter::LogRequest,
                Filter::Authenticate,
                Filter::Authorize("admin".to_string())
            ]
        );
        assert!(registry.resolve("guest").is_none());
        assert!(registry.validate(&configure_rate_limiting()).is_ok());
    }

    #[test]
    fn test_validate_undefined_limiter() {
        let mut registry = MiddlewareRegistry::default();
        registry.group("uploads", &["throttle:uploads"]).unwrap();

        let err = registry.validate(&configure_rate_limiting()).unwrap_err();
        assert!(matches!(
            err,
            BootError::UndefinedLimiter { middleware, bucket } if middleware == "uploads" && bucket == "uploads"
        ));
    }
}
