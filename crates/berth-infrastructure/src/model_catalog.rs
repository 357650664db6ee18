//! Model definitions persisted in the `models` collection.

use async_trait::async_trait;
use std::sync::Arc;

use berth_core::error::{BerthError, Result};
use berth_core::model::{Model, ModelRepository};

use crate::storage::StateFile;

pub struct StateModelRepository {
    models: Arc<StateFile<Vec<Model>>>,
}

impl StateModelRepository {
    pub fn new(models: Arc<StateFile<Vec<Model>>>) -> Self {
        Self { models }
    }

    /// Inserts the model or replaces the definition with the same id.
    pub fn upsert(&self, model: Model) -> Result<()> {
        if model.id.is_empty() {
            return Err(BerthError::validation("model id must not be empty"));
        }

        tracing::debug!(model_id = %model.id, "[ModelCatalog] Upserting");
        self.models.update(|models| match models.iter_mut().find(|m| m.id == model.id) {
            Some(existing) => *existing = model,
            None => models.push(model),
        });
        Ok(())
    }
}

#[async_trait]
impl ModelRepository for StateModelRepository {
    async fn find_by_id(&self, model_id: &str) -> Result<Option<Model>> {
        Ok(self
            .models
            .read(|models| models.iter().find(|m| m.id == model_id).cloned()))
    }

    async fn list(&self) -> Result<Vec<Model>> {
        Ok(self.models.snapshot())
    }
}
