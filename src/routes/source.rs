use std::{fmt, fs, path::PathBuf};

use serde::Deserialize;

use crate::error::BootError;

/// RouteDefinition
///
/// One route as declared by a group's source. `path`, `name` and `handler` are
/// relative: the group's prefix, name prefix and namespace are applied when
/// the table is built.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RouteDefinition {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
    pub handler: String,
}

impl RouteDefinition {
    pub fn new(method: &str, path: &str, handler: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            name: None,
            handler: handler.to_string(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

#[derive(Deserialize)]
struct RouteManifest {
    #[serde(default)]
    routes: Vec<RouteDefinition>,
}

/// RouteSource
///
/// Where a group's route definitions come from: a TOML manifest on disk
/// (`[[routes]]` tables), or definitions supplied in code.
#[derive(Debug, Clone)]
pub enum RouteSource {
    File(PathBuf),
    Static(Vec<RouteDefinition>),
}

impl RouteSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        RouteSource::File(path.into())
    }

    /// Reads the definitions. An unreadable or malformed manifest is fatal for
    /// the boot of `group`.
    pub fn load(&self, group: &str) -> Result<Vec<RouteDefinition>, BootError> {
        match self {
            RouteSource::Static(definitions) => Ok(definitions.clone()),
            RouteSource::File(path) => {
                let content =
                    fs::read_to_string(path).map_err(|source| BootError::SourceUnreadable {
                        group: group.to_string(),
                        path: path.clone(),
                        source,
                    })?;

                let manifest: RouteManifest =
                    toml::from_str(&content).map_err(|source| BootError::SourceMalformed {
                        group: group.to_string(),
                        path: path.clone(),
                        source,
                    })?;

                Ok(manifest.routes)
            }
        }
    }
}

impl Default for RouteSource {
    fn default() -> Self {
        RouteSource::Static(Vec::new())
    }
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSource::File(path) => write!(f, "{}", path.display()),
            RouteSource::Static(definitions) => write!(f, "<{} static routes>", definitions.len()),
        }
    }
}
