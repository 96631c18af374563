mod app;
mod config;
mod events;
mod failure;
mod invoker;
mod pipeline;
mod run_log;
mod stage;
mod state_machine;

use anyhow::Result;
use clap::Parser;

use crate::state_machine::PipelineStatus;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = app::cli::Cli::parse();
    let snapshot = app::headless::run_headless(cli).await?;

    if snapshot.status == PipelineStatus::Failed {
        let reason = snapshot
            .failure_reason
            .unwrap_or_else(|| "unknown failure".to_string());
        anyhow::bail!("pipeline run failed: {}", reason);
    }
    Ok(())
}
