pub mod model;
pub mod prompt;

pub use model::{ModelService, RuntimeStateTable};
pub use prompt::{PromptService, StreamManager};
