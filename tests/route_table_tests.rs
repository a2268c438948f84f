use std::{fs, path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use route_portal::{
    AppConfig, AppState, BootError, HOME, RouteTable, Views, create_router,
    handlers::HandlerRegistry,
    middleware::{Filter, MiddlewareRegistry},
    rate_limit::configure_rate_limiting,
    routes::{self, RouteDefinition, RouteGroup, RouteSource, RouteTableBuilder},
};
use tower::util::ServiceExt;
use uuid::Uuid;

fn build(builder: RouteTableBuilder) -> Result<RouteTable, BootError> {
    builder.build(
        &HandlerRegistry::default(),
        &MiddlewareRegistry::standard().unwrap(),
    )
}

fn standard_table() -> RouteTable {
    build(routes::map(&AppConfig::default())).expect("bundled manifests are valid")
}

fn web_group(definitions: Vec<RouteDefinition>) -> RouteGroup {
    RouteGroup::new()
        .middleware("web")
        .source(RouteSource::Static(definitions))
}

// Scratch directory holding the given manifests.
fn manifest_dir(files: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("route-portal-{}", Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
    dir
}

#[test]
fn test_groups_registered_in_order() {
    let table = standard_table();

    let order: Vec<&str> = table.groups().iter().map(|g| g.middleware()).collect();
    assert_eq!(order, ["admin", "api", "dashboard", "manager", "web"]);
}

#[test]
fn test_group_prefixes_match_their_names() {
    let table = standard_table();

    for group in &table.groups()[..4] {
        let tag = group.middleware();
        assert_eq!(group.prefix(), Some(tag));
        assert_eq!(group.name_prefix(), Some(format!("{tag}.").as_str()));
        assert_eq!(group.namespace(), Some(tag));
        assert!(matches!(
            group.source(),
            RouteSource::File(path) if path.ends_with(format!("{tag}.toml"))
        ));

        for route in group.routes() {
            assert!(route.path.starts_with(&format!("/{tag}")));
            assert!(route.handler.starts_with(&format!("{tag}.")));
            if let Some(name) = &route.name {
                assert!(name.starts_with(&format!("{tag}.")));
            }
        }
    }

    let web = &table.groups()[4];
    assert_eq!(web.prefix(), None);
    assert_eq!(web.name_prefix(), None);
    assert_eq!(web.namespace(), None);
    assert_eq!(web.filters(), &[Filter::LogRequest]);
}

#[test]
fn test_group_filters() {
    let table = standard_table();
    let filters = |tag: &str| {
        table
            .groups()
            .iter()
            .find(|g| g.middleware() == tag)
            .map(|g| g.filters().to_vec())
            .unwrap()
    };

    assert_eq!(
        filters("api"),
        [Filter::LogRequest, Filter::Throttle("api".to_string())]
    );
    assert_eq!(filters("dashboard"), [Filter::LogRequest, Filter::Authenticate]);
    assert_eq!(
        filters("manager"),
        [
            Filter::LogRequest,
            Filter::Authenticate,
            Filter::Authorize("manager".to_string())
        ]
    );
}

#[test]
fn test_named_routes() {
    let table = standard_table();

    assert_eq!(table.url_for("home"), Some("/"));
    assert_eq!(table.url_for("health"), Some("/health"));
    assert_eq!(table.url_for("api.user"), Some("/api/user"));
    assert_eq!(table.url_for("admin.index"), Some("/admin"));
    assert_eq!(table.url_for("manager.index"), Some("/manager"));
    assert_eq!(table.url_for("index"), None);
}

#[test]
fn test_home_is_the_dashboard() {
    assert_eq!(HOME, "/dashboard");
    assert_eq!(standard_table().url_for("dashboard.index"), Some(HOME));
}

#[test]
fn test_root_route() {
    let table = standard_table();
    let root = table.routes().find(|r| r.path == "/").unwrap();

    assert_eq!(root.method, Method::GET);
    assert_eq!(root.name.as_deref(), Some("home"));
    assert_eq!(root.handler, "home.index");
}

#[test]
fn test_missing_source_fails_boot() {
    let config = AppConfig {
        routes_path: PathBuf::from("/nonexistent/route-portal/routes"),
        ..AppConfig::default()
    };

    let err = build(routes::map(&config)).unwrap_err();
    assert!(
        matches!(&err, BootError::SourceUnreadable { group, .. } if group == "admin"),
        "unexpected error: {err}"
    );
}

#[test]
fn test_malformed_source_fails_boot() {
    let dir = manifest_dir(&[("web.toml", "[[routes]]\nmethod = \"GET\"\npath = ")]);

    let err = build(RouteTableBuilder::new().group(
        RouteGroup::new()
            .middleware("web")
            .source(RouteSource::file(dir.join("web.toml"))),
    ))
    .unwrap_err();

    assert!(matches!(&err, BootError::SourceMalformed { group, .. } if group == "web"));
    fs::remove_dir_all(dir).ok();
}

#[test]
fn test_manifest_from_directory() {
    let dir = manifest_dir(&[(
        "web.toml",
        r#"
        [[routes]]
        method = "get"
        path = "/status/"
        name = "status"
        handler = "health.show"
        "#,
    )]);

    let table = build(RouteTableBuilder::new().group(
        RouteGroup::new()
            .middleware("web")
            .source(RouteSource::file(dir.join("web.toml"))),
    ))
    .unwrap();

    assert_eq!(table.url_for("status"), Some("/status"));
    fs::remove_dir_all(dir).ok();
}

#[test]
fn test_unknown_handler_fails_boot() {
    let err = build(RouteTableBuilder::new().group(web_group(vec![RouteDefinition::new(
        "GET",
        "/reports",
        "reports.index",
    )])))
    .unwrap_err();

    assert!(matches!(
        err,
        BootError::UnknownHandler { handler, path, .. } if handler == "reports.index" && path == "/reports"
    ));
}

#[test]
fn test_namespace_is_applied_to_handlers() {
    // Handler ids resolve inside the group namespace.
    let err = build(
        RouteTableBuilder::new().group(
            RouteGroup::new()
                .prefix("manager")
                .middleware("manager")
                .namespace("manager")
                .source(RouteSource::Static(vec![RouteDefinition::new(
                    "GET",
                    "/",
                    "health.show",
                )])),
        ),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        BootError::UnknownHandler { handler, .. } if handler == "manager.health.show"
    ));
}

#[test]
fn test_unknown_middleware_fails_boot() {
    let err = build(
        RouteTableBuilder::new().group(
            RouteGroup::new()
                .prefix("visitors")
                .middleware("guest")
                .source(RouteSource::Static(vec![])),
        ),
    )
    .unwrap_err();

    // Groups are reported by their tag, not their prefix.
    assert!(matches!(
        err,
        BootError::UnknownMiddleware { group, middleware } if group == "guest" && middleware == "guest"
    ));
}

#[test]
fn test_unsupported_method_fails_boot() {
    let err = build(RouteTableBuilder::new().group(web_group(vec![RouteDefinition::new(
        "FETCH",
        "/",
        "home.index",
    )])))
    .unwrap_err();

    assert!(matches!(err, BootError::UnsupportedMethod { method, .. } if method == "FETCH"));
}

#[test]
fn test_duplicate_route_fails_boot() {
    let err = build(
        RouteTableBuilder::new()
            .group(web_group(vec![
                RouteDefinition::new("GET", "/", "home.index").named("home")
            ]))
            .group(web_group(vec![RouteDefinition::new(
                "get",
                "/",
                "health.show",
            )])),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        BootError::DuplicateRoute { method, path } if method == "GET" && path == "/"
    ));
}

#[test]
fn test_same_path_different_methods() {
    let table = build(RouteTableBuilder::new().group(web_group(vec![
        RouteDefinition::new("GET", "/health", "health.show"),
        RouteDefinition::new("POST", "/health", "health.show"),
    ])))
    .unwrap();

    assert_eq!(table.routes().count(), 2);
}

#[tokio::test]
async fn test_empty_group_mounts_nothing() {
    let table = build(RouteTableBuilder::new().group(web_group(vec![]))).unwrap();
    assert!(table.groups()[0].routes().is_empty());

    let state = AppState {
        routes: Arc::new(table),
        limiters: Arc::new(configure_rate_limiting()),
        views: Arc::new(Views::default()),
        config: AppConfig::default(),
    };

    let response = create_router(state)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_conflicting_captures_fail_boot() {
    let err = build(
        RouteTableBuilder::new()
            .group(web_group(vec![RouteDefinition::new(
                "GET",
                "/users/{id}",
                "health.show",
            )]))
            .group(web_group(vec![RouteDefinition::new(
                "POST",
                "/users/{user}",
                "health.show",
            )])),
    )
    .unwrap_err();

    assert!(
        matches!(
            &err,
            BootError::ConflictingRoute { path, existing, .. }
                if path == "/users/{user}" && existing == "/users/{id}"
        ),
        "unexpected error: {err}"
    );
}

#[test]
fn test_malformed_paths_fail_boot() {
    for path in ["/users/:id", "/users/{}", "/files/*rest"] {
        let err = build(RouteTableBuilder::new().group(web_group(vec![RouteDefinition::new(
            "GET",
            path,
            "health.show",
        )])))
        .unwrap_err();

        assert!(
            matches!(&err, BootError::InvalidPath { path: p, group, .. } if p == path && group == "web"),
            "`{path}` should be rejected, got: {err}"
        );
    }
}

#[tokio::test]
async fn test_captured_paths_mount() {
    let table = build(RouteTableBuilder::new().group(web_group(vec![
        RouteDefinition::new("GET", "/users/{id}", "health.show"),
        RouteDefinition::new("POST", "/users/{id}", "health.show"),
        RouteDefinition::new("GET", "/users/{id}/files/{*rest}", "health.show"),
    ])))
    .unwrap();

    let state = AppState {
        routes: Arc::new(table),
        limiters: Arc::new(configure_rate_limiting()),
        views: Arc::new(Views::default()),
        config: AppConfig::default(),
    };

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri(format!("/users/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
