pub mod auth;
pub mod concurrency;
pub mod rate_limit;

pub use auth::internal_auth_middleware;
pub use concurrency::concurrency_limit_middleware;
pub use rate_limit::{rate_limit_middleware, RateLimit};
