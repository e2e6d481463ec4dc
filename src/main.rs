//! Passive FTP Server - Entry Point

use anyhow::Context;
use log::info;

use pasv_ftp_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG still overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Launching FTP server...");

    let config = ServerConfig::load().context("failed to load configuration")?;
    let server = Server::bind(config)
        .await
        .context("server startup failed")?;
    server.run().await;

    Ok(())
}
