use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use berth_application::model::probe;
use berth_infrastructure::paths::BerthPaths;

use crate::app::AppContext;

const WAIT_POLL: Duration = Duration::from_secs(1);

pub async fn start(paths: BerthPaths, model_id: String, make_default: bool, wait: bool) -> Result<()> {
    let token = CancellationToken::new();
    let ctx = AppContext::open(paths, token.clone())?;

    if make_default && !model_id.is_empty() {
        ctx.config
            .set_current_model_id(Some(model_id.clone()))
            .context("failed to store default model")?;
    }

    ctx.model_service
        .start(&model_id)
        .await
        .with_context(|| format!("failed to start model '{model_id}'"))?;
    println!("Model started");

    if wait {
        loop {
            let status = ctx.model_service.status(&model_id).await?;
            if status.is_ready() {
                println!("Model is answering at {}", status.address);
                break;
            }
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = tokio::time::sleep(WAIT_POLL) => {}
            }
        }
    }

    token.cancel();
    Ok(())
}

pub async fn status(paths: BerthPaths, model_id: String) -> Result<()> {
    let ctx = AppContext::open(paths, CancellationToken::new())?;
    let mut status = ctx.model_service.status(&model_id).await?;

    // Liveness is tracked per process, so a one-shot call probes directly.
    if status.running && !status.answering && !status.address.is_empty() {
        let timeout = Duration::from_millis(ctx.root_config.health.probe_timeout_ms);
        status.answering = probe(&status.address, timeout).await.is_ok();
    }

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
