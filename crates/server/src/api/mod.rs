pub mod handlers;
pub mod middleware;
pub mod remove_bg;
pub mod routes;

pub use remove_bg::{ApiError, ErrorResponse};
pub use routes::create_router;
