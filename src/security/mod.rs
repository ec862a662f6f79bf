//! Request authentication.
//!
//! Bearer-token JWT validation: a middleware decodes the token, builds a
//! [`claims::UserContext`] and injects it as a request extension for
//! handlers to match against the request `user_id`.

pub mod claims;
pub mod middleware;

pub use claims::{UserClaims, UserContext};
pub use middleware::auth_middleware;
