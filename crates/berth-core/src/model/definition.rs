//! Model domain model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Images a platform can run with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerImages {
    pub default: String,
    /// Image used when GPU acceleration runs on CUDA.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuda: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Port the inference server listens on inside the container.
    pub port: u16,
    pub images: ContainerImages,
}

/// An inference engine flavour, e.g. llama-cpp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub id: String,
    pub container: ContainerSpec,
}

impl Platform {
    /// Picks the image for the current GPU setup.
    pub fn image_for(&self, gpu_enabled: bool, gpu_platform: Option<&str>) -> &str {
        match (gpu_enabled, gpu_platform, self.container.images.cuda.as_deref()) {
            (true, Some("cuda"), Some(cuda)) => cuda,
            _ => &self.container.images.default,
        }
    }
}

/// A model definition from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub platform: Platform,
    /// Environment variable name to asset URL, e.g. `MODEL` -> a gguf URL.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
    /// Template with a `{prompt}` placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl Model {
    /// Renders a user message into this model's prompt template.
    pub fn render_prompt(&self, message: &str) -> String {
        match &self.prompt_template {
            Some(template) => template.replace("{prompt}", message),
            None => message.to_string(),
        }
    }
}

/// Runtime status of a model as reported to callers.
///
/// A model that is `running` but not `answering` is not ready for prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub running: bool,
    pub answering: bool,
    /// `host:port` the inference server is reachable at; empty when unknown.
    pub address: String,
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        self.running && self.answering && !self.address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llama_platform() -> Platform {
        Platform {
            id: "llama-cpp".to_string(),
            container: ContainerSpec {
                port: 8000,
                images: ContainerImages {
                    default: "berth/llama-cpp".to_string(),
                    cuda: Some("berth/llama-cpp-cuda".to_string()),
                },
            },
        }
    }

    #[test]
    fn test_image_selection() {
        let platform = llama_platform();
        assert_eq!(platform.image_for(false, None), "berth/llama-cpp");
        assert_eq!(platform.image_for(true, None), "berth/llama-cpp");
        assert_eq!(platform.image_for(true, Some("cuda")), "berth/llama-cpp-cuda");
        assert_eq!(platform.image_for(false, Some("cuda")), "berth/llama-cpp");
    }

    #[test]
    fn test_render_prompt_template() {
        let model = Model {
            id: "m1".to_string(),
            name: "Mistral".to_string(),
            platform: llama_platform(),
            assets: BTreeMap::new(),
            prompt_template: Some("[INST] {prompt} [/INST]".to_string()),
        };
        assert_eq!(model.render_prompt("hi"), "[INST] hi [/INST]");
    }

    #[test]
    fn test_status_readiness() {
        let mut status = ModelStatus {
            running: true,
            answering: false,
            address: "127.0.0.1:8001".to_string(),
        };
        assert!(!status.is_ready());
        status.answering = true;
        assert!(status.is_ready());
    }
}
