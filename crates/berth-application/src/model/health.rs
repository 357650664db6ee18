//! Liveness probing of a launched model container.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use berth_core::config::HealthSettings;
use berth_core::container::ContainerGateway;

use super::runtime::{CheckerGuard, ModelRuntimeState};

/// Host a model is reached on: the `llm_host` override when set, otherwise
/// the gateway's host, without any URL scheme.
pub fn reachable_host(llm_host: Option<&str>, docker_host: &str) -> String {
    let host = llm_host.unwrap_or(docker_host);
    let host = host
        .strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host);
    host.trim_end_matches('/').to_string()
}

/// Bounded-timeout TCP connect used as the liveness probe.
pub async fn probe(address: &str, timeout: Duration) -> std::io::Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect to {address} timed out after {timeout:?}"),
        )),
    }
}

/// One health-check loop for the model published on `port`.
///
/// Holding a `HealthCheck` means holding the port's checker slot; the slot is
/// released when the value is dropped.
pub(crate) struct HealthCheck {
    model_id: String,
    port: u16,
    gateway: Arc<dyn ContainerGateway>,
    llm_host: Option<String>,
    settings: HealthSettings,
    state: Arc<ModelRuntimeState>,
    _guard: CheckerGuard,
}

impl HealthCheck {
    /// Returns `None` when another loop already watches this port.
    pub(crate) fn claim(
        model_id: String,
        port: u16,
        gateway: Arc<dyn ContainerGateway>,
        llm_host: Option<String>,
        settings: HealthSettings,
        state: Arc<ModelRuntimeState>,
    ) -> Option<Self> {
        if !state.try_claim_checker() {
            return None;
        }
        Some(Self {
            model_id,
            port,
            gateway,
            llm_host,
            settings,
            _guard: CheckerGuard(Arc::clone(&state)),
            state,
        })
    }

    /// Probes until the model answers or `token` is cancelled. Failures are
    /// logged and retried without limit.
    pub(crate) async fn run(self, token: CancellationToken) {
        let backoff = Duration::from_secs(self.settings.backoff_secs);
        let mut first = true;

        loop {
            if !first {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            } else if token.is_cancelled() {
                break;
            }
            first = false;

            tracing::debug!(model_id = %self.model_id, port = self.port, "[HealthCheck] Checking for answer");
            if self.check_once().await {
                tracing::info!(model_id = %self.model_id, port = self.port, "[HealthCheck] Model is answering");
                return;
            }
        }

        tracing::debug!(model_id = %self.model_id, port = self.port, "[HealthCheck] Cancelled");
    }

    async fn check_once(&self) -> bool {
        match self.gateway.hash_is_running(&self.model_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(model_id = %self.model_id, "[HealthCheck] Container is not running");
                self.log_container_output().await;
                return false;
            }
            Err(e) => {
                tracing::warn!(model_id = %self.model_id, error = %e, "[HealthCheck] Model check error");
                return false;
            }
        }

        let host = reachable_host(self.llm_host.as_deref(), &self.gateway.docker_host());
        let address = format!("{}:{}", host, self.port);
        let timeout = Duration::from_millis(self.settings.probe_timeout_ms);

        match probe(&address, timeout).await {
            Ok(()) => {
                self.state.set_answering(true);
                true
            }
            Err(e) => {
                tracing::warn!(
                    model_id = %self.model_id,
                    %address,
                    error = %e,
                    "[HealthCheck] Ping to model address failed"
                );
                self.state.set_answering(false);
                self.log_container_output().await;
                false
            }
        }
    }

    async fn log_container_output(&self) {
        match self
            .gateway
            .container_logs_and_status(&self.model_id, self.settings.log_lines)
            .await
        {
            Ok(logs) => {
                tracing::info!(model_id = %self.model_id, %logs, "[HealthCheck] Container output");
            }
            Err(e) => {
                tracing::warn!(model_id = %self.model_id, error = %e, "[HealthCheck] Failed to read container logs");
            }
        }
    }
}
