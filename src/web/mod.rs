mod handlers;
mod routes;

pub use handlers::{HealthResponse, SessionStatus, TeleopStatus};
pub use routes::create_router;
