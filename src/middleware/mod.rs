pub mod auth;
pub mod authz;
pub mod rate_limit;

pub use auth::{ErrorResponse, require_session_from_headers};
pub use authz::{ANY_ROLE, Role, require_role};
pub use rate_limit::{RateLimiter, rate_limit_key, too_many_requests};
