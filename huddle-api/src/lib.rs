//! HTTP surface for huddle

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::{AppState, StartupError};
