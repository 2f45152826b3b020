/// HTTP rate limiting
///
/// Protects the web surface as a whole; unrelated to the per-requester
/// claim cooldown, which is domain policy. Three tiers: the login
/// endpoint (brute-force target), the rest of the API, and the open
/// health/metrics probes.
use crate::error::{QmError, QmResult};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Per-tier quotas, in requests per minute
#[derive(Debug, Clone)]
pub struct RateLimitTiers {
    pub login_rpm: u32,
    pub api_rpm: u32,
    pub open_rpm: u32,
    /// Bucket capacity shared across tiers (scaled per tier)
    pub burst: u32,
}

impl RateLimitTiers {
    /// Derive tier quotas from the single configured global rate
    pub fn from_global(requests_per_minute: u32) -> Self {
        Self {
            login_rpm: (requests_per_minute / 100).max(10),
            api_rpm: requests_per_minute.max(1),
            // Health and metrics are probed on fixed schedules
            open_rpm: 120,
            burst: 50,
        }
    }
}

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide request throttle, checked before routing
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    login: Arc<DirectLimiter>,
    api: Arc<DirectLimiter>,
    open: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &crate::config::RateLimitConfig) -> Self {
        Self::with_tiers(
            config.enabled,
            RateLimitTiers::from_global(config.global_requests_per_minute),
        )
    }

    pub fn with_tiers(enabled: bool, tiers: RateLimitTiers) -> Self {
        Self {
            enabled,
            login: limiter(tiers.login_rpm, (tiers.burst / 5).max(1)),
            api: limiter(tiers.api_rpm, tiers.burst.max(1)),
            open: limiter(tiers.open_rpm, (tiers.burst / 2).max(1)),
        }
    }

    /// Check rate limit for the login endpoint
    pub fn check_login(&self) -> QmResult<()> {
        if !self.enabled {
            return Ok(());
        }
        check(&self.login)
    }

    /// Check rate limit for authenticated API traffic
    pub fn check_api(&self) -> QmResult<()> {
        if !self.enabled {
            return Ok(());
        }
        check(&self.api)
    }

    /// Check rate limit for health and metrics probes
    pub fn check_open(&self) -> QmResult<()> {
        if !self.enabled {
            return Ok(());
        }
        check(&self.open)
    }
}

fn limiter(rpm: u32, burst: u32) -> Arc<DirectLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(rpm.max(1)).unwrap())
        .allow_burst(NonZeroU32::new(burst.max(1)).unwrap());
    Arc::new(GovernorLimiter::direct(quota))
}

fn check(limiter: &DirectLimiter) -> QmResult<()> {
    match limiter.check() {
        Ok(_) => Ok(()),
        Err(_) => Err(QmError::RateLimitExceeded {
            retry_after: std::time::Duration::from_secs(1),
        }),
    }
}

/// Rate limiting middleware, tiered by path
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, QmError> {
    let path = request.uri().path();

    if path == "/api/auth/login" {
        ctx.rate_limiter.check_login()?;
    } else if path.starts_with("/api") {
        ctx.rate_limiter.check_api()?;
    } else {
        ctx.rate_limiter.check_open()?;
    }

    Ok(next.run(request).await)
}
