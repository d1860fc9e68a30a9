// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Security Level: None
// Middleware: none beyond tracing and CORS

pub mod health;
pub mod root;

pub use health::health;
pub use root::root;
