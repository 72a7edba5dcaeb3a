//! Middleware module
//!
//! Custom middleware for authentication, logging, and other concerns.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
