use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// --- Response Schemas ---

/// UserProfile
///
/// The identity resolved for an authenticated request, as returned by `GET /api/user`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    // Role carried by the token: 'user', 'manager' or 'admin'.
    pub role: String,
}

/// HealthResponse
///
/// Liveness payload for monitoring and load balancer checks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

/// ErrorResponse
///
/// Uniform JSON body for every non-2xx response produced by the service itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    // Machine-readable code, e.g. "not_found" or "too_many_requests".
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}
