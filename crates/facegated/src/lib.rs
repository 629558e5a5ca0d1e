//! facegated — HTTP face enrollment and verification daemon.

pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;

pub use config::Config;
pub use context::AppContext;
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use error::ApiError;
