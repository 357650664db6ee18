//! Chat domain module.
//!
//! - `model`: chat threads and the append-only messages that belong to them
//! - `service`: the chat collaborator contract consumed by the prompt queue

mod model;
pub mod service;

pub use model::{ChatMessage, ChatThread};
pub use service::ChatService;
