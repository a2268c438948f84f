use std::{env, net::SocketAddr, path::PathBuf};

use crate::error::BootError;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_ROUTES_PATH: &str = "routes";
const LOCAL_JWT_SECRET: &str = "route-portal-local-secret";

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at boot and
/// immutable afterwards; handlers and extractors pull it from the shared state
/// via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the log format and the header bypass.
    pub env: Env,
    // Address the HTTP listener binds to.
    pub addr: SocketAddr,
    // Directory holding the per-group route manifests (admin.toml, api.toml, ...).
    pub routes_path: PathBuf,
    // HS256 secret used to validate bearer tokens.
    pub jwt_secret: String,
}

/// Env
///
/// The runtime context. `Local` enables developer conveniences (pretty logs,
/// `x-user-id` authentication); `Production` hardens both.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Test configuration: local environment, the crate's own route manifests,
    /// and a fixed secret so tests can mint tokens.
    fn default() -> Self {
        Self {
            env: Env::Local,
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            routes_path: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/routes")),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables. Fails fast when a
    /// value required by the current environment is missing or malformed, so the
    /// service never starts with an incomplete or insecure configuration.
    pub fn load() -> Result<Self, BootError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match (env, env::var("JWT_SECRET")) {
            (_, Ok(secret)) if !secret.is_empty() => secret,
            (Env::Production, _) => return Err(BootError::MissingConfig("JWT_SECRET")),
            (Env::Local, _) => LOCAL_JWT_SECRET.to_string(),
        };

        let raw_addr = env::var("APP_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|_| BootError::InvalidConfig {
                key: "APP_ADDR",
                value: raw_addr.clone(),
            })?;

        let routes_path = env::var("ROUTES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROUTES_PATH));

        Ok(Self {
            env,
            addr,
            routes_path,
            jwt_secret,
        })
    }
}
