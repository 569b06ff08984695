use sqlx::PgPool;

use crate::config::RateLimitSettings;
use crate::middleware::rate_limit::RateLimiter;

pub mod auth;
pub mod dashboard;
pub mod health;
pub mod members;
pub mod organization;
pub mod routes;
pub mod tasks;

// ============================================
// Application State
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub limiter: RateLimiter,
    pub rate_limits: RateLimitSettings,
}

impl AppState {
    pub fn new(db: PgPool, limiter: RateLimiter, rate_limits: RateLimitSettings) -> Self {
        Self {
            db,
            limiter,
            rate_limits,
        }
    }
}
