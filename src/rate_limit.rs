//! Named rate limiters.
//!
//! A limiter is a rule registered under a bucket name (`api`). For each
//! request the rule produces a [`Limit`]: a quota, a window length and the
//! partition key the quota is tracked under. Hits are counted in fixed
//! windows: the first hit opens the window, the window closes `decay` later.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::{auth::Identity, models::ErrorResponse};

pub const API_BUCKET: &str = "api";

static LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Limit
///
/// The quota applied to one request: at most `max_attempts` hits per `decay`
/// for the given partition `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limit {
    pub max_attempts: u32,
    pub decay: Duration,
    pub key: String,
}

impl Limit {
    pub fn per_minute(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            decay: Duration::from_secs(60),
            key: String::new(),
        }
    }

    pub fn by(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

/// Outcome of a single hit against a limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed { limit: u32, remaining: u32 },
    Throttled { limit: u32, retry_after: Duration },
}

type LimitResolver = Arc<dyn Fn(&Identity) -> Limit + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: Instant,
    hits: u32,
}

/// RateLimiters
///
/// Registry of named rules plus the hit counters for every active
/// (bucket, partition key) pair. Rules are fixed after boot; counters are
/// updated concurrently through the map's per-entry locks.
#[derive(Default)]
pub struct RateLimiters {
    rules: HashMap<String, LimitResolver>,
    windows: DashMap<String, Window>,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` under `name`. Registering a name twice keeps only
    /// the last rule.
    pub fn define<F>(&mut self, name: &str, resolver: F)
    where
        F: Fn(&Identity) -> Limit + Send + Sync + 'static,
    {
        if self.rules.insert(name.to_string(), Arc::new(resolver)).is_some() {
            tracing::warn!(limiter = name, "rate limiter redefined, previous rule replaced");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// The limit the named rule assigns to `identity`.
    pub fn limit_for(&self, name: &str, identity: &Identity) -> Option<Limit> {
        self.rules.get(name).map(|resolver| resolver(identity))
    }

    /// Records one hit for `limit.key` in `bucket` and decides whether it fits
    /// the quota. A rejected hit is not counted.
    pub fn attempt(&self, bucket: &str, limit: &Limit) -> Decision {
        let now = Instant::now();
        let mut window = self
            .windows
            .entry(format!("{bucket}:{}", limit.key))
            .or_insert(Window {
                opened_at: now,
                hits: 0,
            });

        let elapsed = now.duration_since(window.opened_at);
        if elapsed >= limit.decay {
            *window = Window {
                opened_at: now,
                hits: 0,
            };
        }

        if window.hits >= limit.max_attempts {
            return Decision::Throttled {
                limit: limit.max_attempts,
                retry_after: limit.decay.saturating_sub(now.duration_since(window.opened_at)),
            };
        }

        window.hits += 1;
        Decision::Allowed {
            limit: limit.max_attempts,
            remaining: limit.max_attempts - window.hits,
        }
    }

    /// Drops windows opened at least `max_decay` ago. With `max_decay` no
    /// shorter than any rule's decay, only expired windows go.
    /// Returns how many were removed.
    pub fn prune(&self, max_decay: Duration) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.duration_since(window.opened_at) < max_decay);
        before - self.windows.len()
    }

    pub fn active_windows(&self) -> usize {
        self.windows.len()
    }
}

/// configure_rate_limiting
///
/// The service's limiter rules. `api`: 60 requests per minute, per user when
/// authenticated, per client address otherwise, so anonymous traffic is
/// throttled too.
pub fn configure_rate_limiting() -> RateLimiters {
    let mut limiters = RateLimiters::new();
    limiters.define(API_BUCKET, |identity| {
        Limit::per_minute(60).by(identity.partition_key())
    });
    limiters
}

/// State of one `throttle:<bucket>` filter.
#[derive(Clone)]
pub struct Throttle {
    pub limiters: Arc<RateLimiters>,
    pub bucket: Arc<str>,
}

/// throttle
///
/// Middleware enforcing the named limiter against the request's identity.
/// Allowed responses carry the remaining quota; rejected ones are 429 with
/// `Retry-After`.
pub async fn throttle(State(throttle): State<Throttle>, request: Request, next: Next) -> Response {
    let Some(identity) = request.extensions().get::<Identity>().cloned() else {
        tracing::error!(bucket = %throttle.bucket, "throttle reached without a resolved identity");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    // Buckets are validated at boot, so a missing rule means no limiting.
    let Some(limit) = throttle.limiters.limit_for(&throttle.bucket, &identity) else {
        return next.run(request).await;
    };

    match throttle.limiters.attempt(&throttle.bucket, &limit) {
        Decision::Allowed { limit, remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER.clone(), HeaderValue::from(limit));
            headers.insert(REMAINING_HEADER.clone(), HeaderValue::from(remaining));
            response
        }
        Decision::Throttled { limit, retry_after } => {
            // Round up so clients never retry before the window closes.
            let retry_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);

            tracing::warn!(
                bucket = %throttle.bucket,
                partition = %identity.partition_key(),
                retry_after = retry_secs,
                "rate limit exceeded"
            );

            let body = ErrorResponse::new("too_many_requests", "Too Many Attempts.");
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
            headers.insert(LIMIT_HEADER.clone(), HeaderValue::from(limit));
            headers.insert(REMAINING_HEADER.clone(), HeaderValue::from(0u32));
            response
        }
    }
}
