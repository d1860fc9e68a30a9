// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Security Level: JWT Authentication Required
// Middleware: JWT validation, then per-user rate limiting

pub mod collaboration;
pub mod me;
pub mod sub_resources;

pub use collaboration::{diagram_ws, list_sessions};
pub use me::my_rate_limits;
pub use sub_resources::*;
