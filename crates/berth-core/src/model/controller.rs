use async_trait::async_trait;

use super::definition::ModelStatus;
use crate::error::Result;

/// Operations the model lifecycle controller exposes to the rest of the system.
///
/// An empty `model_id` means "the configured default model".
#[async_trait]
pub trait ModelController: Send + Sync {
    /// Launches the model's container and starts watching it until it answers.
    async fn start_model(&self, model_id: &str) -> Result<()>;

    async fn model_status(&self, model_id: &str) -> Result<ModelStatus>;
}
