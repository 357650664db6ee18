pub mod chat;
pub mod config;
pub mod container;
pub mod download;
pub mod error;
pub mod event;
pub mod llm;
pub mod model;
pub mod prompt;

// Re-export common error type
pub use error::{BerthError, Result};
