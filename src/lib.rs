//! Device presence and command dispatch for a digital-signage fleet.
//!
//! Display devices hold a WebSocket to this server; the library tracks which
//! of them are reachable, keeps the durable online flag in step, and pushes
//! configuration, content and control frames to them.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::AppSettings;
pub use error::AppError;
pub use state::AppState;
