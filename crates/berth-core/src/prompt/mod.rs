//! Prompt domain module.
//!
//! A prompt is the unit of queued work: one user message to be answered by
//! one model inside one chat thread.

mod model;

pub use model::{Prompt, PromptStatus};
