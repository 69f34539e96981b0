pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::AuthUser;
pub use rate_limit::{EndpointClass, RateLimiter};
pub use request_id::RequestId;
