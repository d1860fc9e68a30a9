pub mod auth;
pub mod cache;
pub mod collab;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod quota;
pub mod routes;
pub mod state;
pub mod store;

pub mod testing;
