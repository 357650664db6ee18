use anyhow::Result;
use std::time::Duration;

use berth_execution::{Supervisor, wait_for_shutdown_signal};
use berth_infrastructure::paths::BerthPaths;

use crate::app::AppContext;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn run(paths: BerthPaths) -> Result<()> {
    tracing::info!(config_dir = %paths.config_dir().display(), "[Serve] Starting berth");

    let supervisor = Supervisor::new(SHUTDOWN_GRACE);
    let ctx = AppContext::open(paths, supervisor.token())?;

    let recovered = ctx.prompt_service.recover_interrupted();
    if recovered > 0 {
        tracing::warn!(recovered, "[Serve] Marked interrupted prompts as errored");
    }

    ctx.supervise_stores(&supervisor);
    supervisor.spawn(
        "prompt-scheduler",
        ctx.prompt_service.clone().run(supervisor.token().child_token()),
    );

    if ctx.root_config.model.current_model_id.is_some() {
        if let Err(e) = ctx.model_service.start("").await {
            tracing::warn!(error = %e, "[Serve] Default model could not be started");
        }
    }

    wait_for_shutdown_signal().await;
    supervisor.shutdown().await;
    Ok(())
}
