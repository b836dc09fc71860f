//! Static site build command.

use std::time::Instant;

use anyhow::{Context, Result};
use kiln_build::Pipeline;

use crate::config::ConfigFile;

/// Run the build command.
pub async fn run(config: &ConfigFile) -> Result<()> {
    let pipeline = Pipeline::new(config.layout());
    build(&pipeline).await
}

/// Run the full build, failing only on scheduler-fatal errors.
pub async fn build(pipeline: &Pipeline) -> Result<()> {
    tracing::info!("Building site...");
    let start = Instant::now();

    let report = pipeline
        .full_build()
        .run()
        .await
        .context("Build failed")?;

    if report.failures > 0 {
        tracing::warn!(
            "Built {} files in {}ms ({} failed, see above)",
            report.outputs,
            start.elapsed().as_millis(),
            report.failures
        );
    } else {
        tracing::info!(
            "Built {} files in {}ms",
            report.outputs,
            start.elapsed().as_millis()
        );
    }

    tracing::info!("Output: {}", pipeline.layout().output_dir.display());

    Ok(())
}
