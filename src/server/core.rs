use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::client::handle_client;
use crate::config::ServerConfig;
use crate::error::{FtpServerError, TransferError};
use crate::storage::ensure_server_root;
use crate::transfer::{PortPool, SharedPortPool};

pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    port_pool: SharedPortPool,
}

impl Server {
    /// Binds the control listener and sets up the passive port pool.
    pub async fn bind(config: ServerConfig) -> Result<Self, FtpServerError> {
        let config = Arc::new(config);

        ensure_server_root(&config.server_root)?;
        info!("Server root directory: {}", config.server_root_str());

        let socket = config.control_socket();
        let listener = match TcpListener::bind(&socket).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind to {}: {}", socket, e);
                return Err(TransferError::PortBindingFailed(socket, e).into());
            }
        };
        info!("Server bound to {}", listener.local_addr()?);

        let port_pool = PortPool::shared(config.data_port_range());

        Ok(Self {
            listener,
            config,
            port_pool,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, FtpServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn port_pool(&self) -> &SharedPortPool {
        &self.port_pool
    }

    /// Accepts control connections forever, one task per client.
    pub async fn run(self) {
        info!(
            "Starting passive FTP server on {} (data ports {}-{})",
            self.config.control_socket(),
            self.config.data_port_min,
            self.config.data_port_max
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!("New connection from {}", peer);
                    let config = Arc::clone(&self.config);
                    let port_pool = Arc::clone(&self.port_pool);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(handle_client(stream, peer, config, port_pool));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}
