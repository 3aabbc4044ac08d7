pub mod error;
pub mod html;
pub mod logger;
pub mod monitor;
pub mod rate_limiter;
pub mod text;
pub mod validation;
