//! Turns a model definition and its local assets into container launch parameters.

use std::path::Path;

use berth_core::config::RuntimeEnv;
use berth_core::container::LaunchOptions;
use berth_core::model::Model;

/// Directory assets are mounted under inside the container.
pub const ASSET_MOUNT_DIR: &str = "/assets";

const GPU_VISIBILITY_ENV: &str = "NVIDIA_VISIBLE_DEVICES=all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub image: String,
    pub container_port: u16,
    pub options: LaunchOptions,
}

/// Rewrites a Windows drive path into the WSL mount convention, so
/// `C:\Users\a\model.gguf` becomes `/mnt/c/Users/a/model.gguf`. Paths
/// without a backslash are returned unchanged.
pub fn translate_windows_path(path: &str) -> String {
    let Some((head, tail)) = path.split_once('\\') else {
        return path.to_string();
    };

    let head = match head.as_bytes() {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => {
            format!("/mnt/{}{}", drive.to_ascii_lowercase() as char, &head[2..])
        }
        _ => head.to_string(),
    };

    format!("{}/{}", head, tail.replace('\\', "/"))
}

/// Builds the launch plan for `model`.
///
/// `assets` pairs each asset's environment variable name with the local file
/// it was downloaded to.
pub fn plan_launch(
    model: &Model,
    assets: &[(String, String)],
    config_dir: &Path,
    env: &RuntimeEnv,
) -> LaunchPlan {
    let mut options = LaunchOptions {
        model_id: model.id.clone(),
        ..LaunchOptions::default()
    };

    let config_dir = config_dir.to_string_lossy();
    for (env_name, local_path) in assets {
        let mut host_path = translate_windows_path(local_path);
        if let Some(host_folder) = env.host_folder.as_deref() {
            if !config_dir.is_empty() {
                host_path = host_path.replacen(&*config_dir, host_folder, 1);
            }
        }

        let file_name = host_path.rsplit('/').next().unwrap_or_default();
        let container_path = format!("{ASSET_MOUNT_DIR}/{file_name}");
        options.envs.push(format!("{env_name}={container_path}"));
        options.host_binds.push(format!("{host_path}:{container_path}"));
    }

    let image = model
        .platform
        .image_for(env.gpu_enabled, env.gpu_platform.as_deref())
        .to_string();
    if env.gpu_enabled {
        options.gpu_enabled = true;
        options.envs.push(GPU_VISIBILITY_ENV.to_string());
    }

    LaunchPlan {
        image,
        container_port: model.platform.container.port,
        options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::model::{ContainerImages, ContainerSpec, Platform};
    use std::collections::BTreeMap;

    fn model() -> Model {
        Model {
            id: "mistral".to_string(),
            name: "Mistral".to_string(),
            platform: Platform {
                id: "llama-cpp".to_string(),
                container: ContainerSpec {
                    port: 8000,
                    images: ContainerImages {
                        default: "berth/llama-cpp".to_string(),
                        cuda: Some("berth/llama-cpp-cuda".to_string()),
                    },
                },
            },
            assets: BTreeMap::from([("MODEL".to_string(), "https://h/m.gguf".to_string())]),
            prompt_template: None,
        }
    }

    #[test]
    fn test_translate_windows_path() {
        assert_eq!(
            translate_windows_path(r"C:\Users\a\model.gguf"),
            "/mnt/c/Users/a/model.gguf"
        );
        assert_eq!(translate_windows_path("/home/a/model.gguf"), "/home/a/model.gguf");
    }

    #[test]
    fn test_plan_maps_assets() {
        let assets = vec![("MODEL".to_string(), "/home/a/.config/berth/downloads/m.gguf".to_string())];
        let plan = plan_launch(&model(), &assets, Path::new("/home/a/.config/berth"), &RuntimeEnv::default());

        assert_eq!(plan.image, "berth/llama-cpp");
        assert_eq!(plan.container_port, 8000);
        assert_eq!(plan.options.model_id, "mistral");
        assert_eq!(plan.options.envs, vec!["MODEL=/assets/m.gguf"]);
        assert_eq!(
            plan.options.host_binds,
            vec!["/home/a/.config/berth/downloads/m.gguf:/assets/m.gguf"]
        );
        assert!(!plan.options.gpu_enabled);
    }

    #[test]
    fn test_plan_substitutes_host_folder() {
        let env = RuntimeEnv {
            host_folder: Some("/srv/berth".to_string()),
            ..RuntimeEnv::default()
        };
        let assets = vec![("MODEL".to_string(), "/root/.config/berth/downloads/m.gguf".to_string())];
        let plan = plan_launch(&model(), &assets, Path::new("/root/.config/berth"), &env);

        assert_eq!(plan.options.host_binds, vec!["/srv/berth/downloads/m.gguf:/assets/m.gguf"]);
    }

    #[test]
    fn test_plan_with_cuda() {
        let env = RuntimeEnv {
            gpu_enabled: true,
            gpu_platform: Some("cuda".to_string()),
            ..RuntimeEnv::default()
        };
        let plan = plan_launch(&model(), &[], Path::new("/cfg"), &env);

        assert_eq!(plan.image, "berth/llama-cpp-cuda");
        assert!(plan.options.gpu_enabled);
        assert!(plan.options.envs.contains(&"NVIDIA_VISIBLE_DEVICES=all".to_string()));
    }
}
