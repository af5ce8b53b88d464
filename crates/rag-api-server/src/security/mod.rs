pub mod authorization;
pub mod rate_limit;

pub use authorization::DocumentAuthorization;
pub use rate_limit::RateLimiter;
