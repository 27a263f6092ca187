// Core modules
pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod sniper;
pub mod strategy;

// Re-export commonly used types
pub use config::Settings;
pub use error::BotError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
