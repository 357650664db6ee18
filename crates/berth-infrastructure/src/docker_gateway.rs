//! Container runtime gateway driving the `docker` CLI.

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use berth_core::container::{ContainerGateway, LaunchInfo, LaunchOptions};
use berth_core::error::{BerthError, Result};

/// Label carrying the id of the model a container serves.
pub const MODEL_LABEL: &str = "berth.model-id";
/// Label carrying the published host port.
pub const PORT_LABEL: &str = "berth.host-port";

const NAME_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b0e_8d4a_4c1f_9a57_3e2d_b0c8_41a6);
const PS_FORMAT: &str = "{{.ID}}\t{{.Names}}\t{{.State}}";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ContainerRow {
    id: String,
    name: String,
    state: String,
}

impl ContainerRow {
    fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Talks to the local container runtime through its CLI.
///
/// Container names are derived from the whole launch configuration, so an
/// identical relaunch finds the container it created before instead of
/// starting a second one.
pub struct DockerCliGateway {
    program: String,
}

impl DockerCliGateway {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Uses another CLI binary with a docker-compatible interface (e.g. `podman`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn docker(&self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        tracing::debug!("[DockerGateway] Executing: {:?}", cmd);

        let output = cmd
            .output()
            .await
            .map_err(|e| BerthError::container(format!("Failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BerthError::container(format!(
                "{} {} failed: {}",
                self.program,
                args.first().map(String::as_str).unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn list_by_label(&self, label: &str, value: &str) -> Result<Vec<ContainerRow>> {
        let stdout = self
            .docker(&[
                "ps".into(),
                "-a".into(),
                "--filter".into(),
                format!("label={label}={value}"),
                "--format".into(),
                PS_FORMAT.into(),
            ])
            .await?;
        Ok(parse_ps_rows(&stdout))
    }

    async fn remove(&self, row: &ContainerRow) -> Result<()> {
        tracing::info!(container = %row.name, "[DockerGateway] Removing container holding the port");
        self.docker(&["rm".into(), "-f".into(), row.id.clone()]).await?;
        Ok(())
    }
}

impl Default for DockerCliGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerGateway for DockerCliGateway {
    async fn launch_container(
        &self,
        image: &str,
        container_port: u16,
        host_port: u16,
        options: &LaunchOptions,
    ) -> Result<LaunchInfo> {
        let name = container_name(image, container_port, host_port, options);

        for row in self.list_by_label(PORT_LABEL, &host_port.to_string()).await? {
            if row.name != name {
                self.remove(&row).await?;
                continue;
            }
            if row.is_running() {
                tracing::debug!(container = %name, "[DockerGateway] Container already running");
                return Ok(LaunchInfo {
                    new_container_started: false,
                    host_port,
                });
            }
            tracing::info!(container = %name, "[DockerGateway] Restarting stopped container");
            self.docker(&["start".into(), name]).await?;
            return Ok(LaunchInfo {
                new_container_started: true,
                host_port,
            });
        }

        let args = run_args(&name, image, container_port, host_port, options);
        self.docker(&args).await?;
        tracing::info!(
            container = %name,
            image,
            port = host_port,
            model_id = %options.model_id,
            "[DockerGateway] Container started"
        );

        Ok(LaunchInfo {
            new_container_started: true,
            host_port,
        })
    }

    async fn hash_is_running(&self, model_id: &str) -> Result<bool> {
        let rows = self.list_by_label(MODEL_LABEL, model_id).await?;
        Ok(rows.iter().any(ContainerRow::is_running))
    }

    async fn container_logs_and_status(&self, model_id: &str, lines: usize) -> Result<String> {
        let rows = self.list_by_label(MODEL_LABEL, model_id).await?;
        let Some(row) = rows.first() else {
            return Ok(format!("no container found for model '{model_id}'"));
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(["logs", "--tail", &lines.to_string(), &row.id]);
        let output = cmd
            .output()
            .await
            .map_err(|e| BerthError::container(format!("Failed to read container logs: {}", e)))?;

        Ok(format!(
            "{}{}\nstatus: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
            row.state
        ))
    }

    fn docker_host(&self) -> String {
        docker_host_from(std::env::var("DOCKER_HOST").ok().as_deref())
    }
}

/// Deterministic container name for a launch configuration.
fn container_name(image: &str, container_port: u16, host_port: u16, options: &LaunchOptions) -> String {
    let fingerprint = format!(
        "{image}|{container_port}|{host_port}|{}|{}|{}|{}",
        options.model_id,
        options.envs.join(","),
        options.host_binds.join(","),
        options.gpu_enabled
    );
    let id = Uuid::new_v5(&NAME_NAMESPACE, fingerprint.as_bytes());
    format!("berth-{}", id.simple())
}

fn run_args(
    name: &str,
    image: &str,
    container_port: u16,
    host_port: u16,
    options: &LaunchOptions,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        name.into(),
        "--label".into(),
        format!("{MODEL_LABEL}={}", options.model_id),
        "--label".into(),
        format!("{PORT_LABEL}={host_port}"),
        "-p".into(),
        format!("{host_port}:{container_port}"),
    ];
    if options.gpu_enabled {
        args.push("--gpus".into());
        args.push("all".into());
    }
    for env in &options.envs {
        args.push("-e".into());
        args.push(env.clone());
    }
    for bind in &options.host_binds {
        args.push("-v".into());
        args.push(bind.clone());
    }
    args.push(image.into());
    args
}

fn parse_ps_rows(stdout: &str) -> Vec<ContainerRow> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().split('\t');
            let id = parts.next()?.trim();
            let name = parts.next()?.trim();
            let state = parts.next().unwrap_or_default().trim();
            (!id.is_empty()).then(|| ContainerRow {
                id: id.to_string(),
                name: name.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Host part of a `tcp://host:port` docker endpoint, loopback otherwise.
fn docker_host_from(value: Option<&str>) -> String {
    value
        .and_then(|v| v.strip_prefix("tcp://"))
        .and_then(|rest| rest.split([':', '/']).next())
        .filter(|host| !host.is_empty())
        .unwrap_or("127.0.0.1")
        .to_string()
}
