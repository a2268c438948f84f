use std::collections::HashMap;

use axum::response::Html;

use crate::error::AppError;

/// Views
///
/// Static, parameterless pages compiled into the binary and looked up by name.
pub struct Views {
    pages: HashMap<&'static str, &'static str>,
}

impl Default for Views {
    fn default() -> Self {
        let mut views = Self {
            pages: HashMap::new(),
        };
        views.register("welcome", include_str!("../resources/views/welcome.html"));
        views.register("dashboard", include_str!("../resources/views/dashboard.html"));
        views.register("admin", include_str!("../resources/views/admin.html"));
        views.register("manager", include_str!("../resources/views/manager.html"));
        views
    }
}

impl Views {
    pub fn register(&mut self, name: &'static str, page: &'static str) {
        self.pages.insert(name, page);
    }

    pub fn render(&self, name: &str) -> Result<Html<&'static str>, AppError> {
        self.pages
            .get(name)
            .map(|page| Html(*page))
            .ok_or_else(|| AppError::ViewNotFound(name.to_string()))
    }
}
