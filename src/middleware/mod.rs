//! Middleware components
//!
//! This module contains middleware for:
//! - Principal resolution (member and guest bearer tokens)
//! - The per-route guard chain
//! - Rate limiting

pub mod auth;
pub mod guard;
pub mod rate_limit;

pub use auth::{GuardRejection, RequestContext};
pub use guard::{guard_middleware, Guard};
pub use rate_limit::{rate_limit_middleware, spawn_rate_limit_cleanup, RateLimitState};
