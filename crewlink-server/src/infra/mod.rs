pub mod app_state;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod sessions;
pub mod startup;
pub mod websocket;
