pub mod auth;
pub mod resiliency;

pub use auth::{admin_auth_middleware, issue_admin_token, AdminClaims};
pub use resiliency::{circuit_breaker_middleware, CircuitBreaker, ResiliencyState};
