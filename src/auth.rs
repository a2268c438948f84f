use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State, connect_info::MockConnectInfo},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AppConfig, Env};

/// Role assigned to header-bypass users that do not send `x-user-role`.
pub const DEFAULT_ROLE: &str = "user";

/// Claims
///
/// Payload of the HS256 bearer tokens accepted by the service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's UUID. Used as the rate-limit partition key.
    pub sub: Uuid,
    /// Role used by the `role:<name>` filter.
    pub role: String,
    /// Expiration time, always validated.
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Usable as a handler
/// argument; rejects with 401 when the request is anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

/// Identity
///
/// Who is behind a request, resolved exactly once by [`identify`] and stored in
/// the request extensions for every later filter and handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Authenticated(AuthUser),
    Anonymous(IpAddr),
}

impl Identity {
    /// The value rate limits are partitioned by: the user id when
    /// authenticated, the client address otherwise.
    pub fn partition_key(&self) -> String {
        match self {
            Identity::Authenticated(user) => user.id.to_string(),
            Identity::Anonymous(ip) => ip.to_string(),
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Identity::Authenticated(user) => Some(user),
            Identity::Anonymous(_) => None,
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .and_then(Identity::user)
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// resolve_identity
///
/// Resolution order:
/// 1. Local only: `x-user-id` (+ optional `x-user-role`) development bypass.
/// 2. `Authorization: Bearer <jwt>` signed with the configured secret.
/// 3. Anonymous, keyed by the client address.
///
/// An invalid or expired token does not fail the request here; it simply
/// leaves the caller anonymous and the `auth` filter decides.
pub fn resolve_identity(headers: &HeaderMap, config: &AppConfig, client_ip: IpAddr) -> Identity {
    if config.env == Env::Local {
        if let Some(user) = header_bypass(headers) {
            return Identity::Authenticated(user);
        }
    }

    match bearer_user(headers, &config.jwt_secret) {
        Some(user) => Identity::Authenticated(user),
        None => Identity::Anonymous(client_ip),
    }
}

fn header_bypass(headers: &HeaderMap) -> Option<AuthUser> {
    let raw_id = headers.get("x-user-id")?.to_str().ok()?;
    let id = Uuid::parse_str(raw_id).ok()?;
    let role = headers
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_ROLE);

    Some(AuthUser {
        id,
        role: role.to_string(),
    })
}

fn bearer_user(headers: &HeaderMap, secret: &str) -> Option<AuthUser> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;

    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => Some(AuthUser {
            id: data.claims.sub,
            role: data.claims.role,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "bearer token rejected");
            None
        }
    }
}

/// issue_token
///
/// Signs a token for `user` valid for `ttl`. A negative `ttl` yields an
/// already-expired token.
pub fn issue_token(
    user: &AuthUser,
    secret: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id,
        role: user.role.clone(),
        iat: now.timestamp().max(0) as usize,
        exp: (now + ttl).timestamp().max(0) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// identify
///
/// Outer middleware that resolves the [`Identity`] once per request.
pub async fn identify(State(config): State<AppConfig>, mut request: Request, next: Next) -> Response {
    let identity = resolve_identity(request.headers(), &config, client_ip(&request));

    tracing::debug!(
        partition = %identity.partition_key(),
        authenticated = identity.user().is_some(),
        "identity resolved"
    );

    request.extensions_mut().insert(identity);
    next.run(request).await
}

// Peer address from the serving connection, or the mock injected by tests.
fn client_ip(request: &Request) -> IpAddr {
    let extensions = request.extensions();

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
