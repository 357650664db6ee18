//! Model repository trait.

use async_trait::async_trait;

use super::definition::Model;
use crate::error::Result;

/// Lookup of model definitions.
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Returns `Ok(None)` when no model has the given id.
    async fn find_by_id(&self, model_id: &str) -> Result<Option<Model>>;

    async fn list(&self) -> Result<Vec<Model>>;
}
