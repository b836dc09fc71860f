//! Development server command.

use anyhow::Result;
use kiln_build::Pipeline;
use kiln_server::DevServer;

use crate::config::ConfigFile;

/// Build once, then serve and rebuild on change.
pub async fn run(config: &ConfigFile, port: Option<u16>, no_open: bool) -> Result<()> {
    let mut server = config.server();
    if let Some(port) = port {
        server.port = port;
    }
    if no_open {
        server.open = false;
    }

    let pipeline = Pipeline::new(config.layout());

    // The watcher starts after this; the clean step would otherwise show up
    // as a burst of output deletions.
    super::build::build(&pipeline).await?;

    tracing::info!("Starting development server on port {}", server.port);
    DevServer::new(server, pipeline).start().await?;

    Ok(())
}
