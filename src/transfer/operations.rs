//! Transfer operations
//!
//! Sets up a passive data channel: draws a port from the pool, binds the
//! listener and spawns the data channel task on the shared runtime.

use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::config::ServerConfig;
use crate::error::TransferError;
use crate::transfer::data_channel::{DataChannelSettings, run_passive_channel};
use crate::transfer::messages::{ChannelId, DataChannelHandle, SessionEventSender};
use crate::transfer::port_pool::SharedPortPool;

/// Commands a session may queue ahead of its data channel.
const COMMAND_QUEUE_DEPTH: usize = 8;

/// A passive listener that has not seen its client yet.
///
/// Dropping it tells the listener to give up and release its port.
#[derive(Debug)]
pub struct PendingChannel {
    pub id: ChannelId,
    pub port: u16,
    _abandon: oneshot::Sender<()>,
}

/// Result of setting up passive mode
#[derive(Debug)]
pub struct PassiveModeResult {
    pub data_socket: SocketAddr,
    /// `host:port` as advertised to the client
    pub advertised: String,
    pub pending: PendingChannel,
}

/// Allocates a passive port and starts a data channel listening on it.
pub async fn setup_passive_mode(
    config: &ServerConfig,
    pool: &SharedPortPool,
    id: ChannelId,
    events: SessionEventSender,
) -> Result<PassiveModeResult, TransferError> {
    let port = pool.lock().await.allocate()?;

    let listener = match TcpListener::bind((config.bind_address.as_str(), port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "Failed to bind passive listener on {}:{}: {}",
                config.bind_address, port, e
            );
            pool.lock().await.release(port);
            return Err(TransferError::PortBindingFailed(
                format!("{}:{}", config.bind_address, port),
                e,
            ));
        }
    };

    let data_socket = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            pool.lock().await.release(port);
            return Err(TransferError::Io(e));
        }
    };

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (abandon_tx, abandon_rx) = oneshot::channel();
    let handle = DataChannelHandle::new(id, port, commands_tx);

    tokio::spawn(run_passive_channel(
        listener,
        handle,
        commands_rx,
        events,
        abandon_rx,
        Arc::clone(pool),
        DataChannelSettings::from(config),
    ));

    info!("Data channel {} listening on {}", id, data_socket);

    Ok(PassiveModeResult {
        data_socket,
        advertised: format!("{}:{}", config.bind_address, port),
        pending: PendingChannel {
            id,
            port,
            _abandon: abandon_tx,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::messages::SessionEvent;
    use crate::transfer::port_pool::PortPool;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn test_config(ports: std::ops::RangeInclusive<u16>, root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            data_port_min: *ports.start(),
            data_port_max: *ports.end(),
            server_root: root.to_path_buf(),
            data_connect_timeout_secs: 2,
            upload_drain_timeout_ms: 200,
            ..ServerConfig::default()
        }
    }

    async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    async fn wait_until_free(pool: &SharedPortPool, port: u16) {
        for _ in 0..100 {
            if pool.lock().await.is_free(port) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("port {port} was never released");
    }

    #[tokio::test]
    async fn test_abandoned_listener_releases_port() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(47101..=47101, tmp.path());
        let pool = PortPool::shared(config.data_port_range());
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let result = setup_passive_mode(&config, &pool, ChannelId(1), events_tx)
            .await
            .unwrap();
        assert_eq!(result.advertised, "127.0.0.1:47101");
        assert!(pool.lock().await.allocate().is_err());

        drop(result);
        match next_event(&mut events).await {
            SessionEvent::ForgetMe(id) => assert_eq!(id, ChannelId(1)),
            other => panic!("unexpected event {other:?}"),
        }
        wait_until_free(&pool, 47101).await;
    }

    #[tokio::test]
    async fn test_upload_then_download_through_channels() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(47111..=47112, tmp.path());
        let pool = PortPool::shared(config.data_port_range());
        let (events_tx, mut events) = mpsc::unbounded_channel();

        // upload
        let pasv = setup_passive_mode(&config, &pool, ChannelId(1), events_tx.clone())
            .await
            .unwrap();
        let mut data = TcpStream::connect(pasv.data_socket).await.unwrap();
        let handle = match next_event(&mut events).await {
            SessionEvent::RememberMe(handle) => handle,
            other => panic!("unexpected event {other:?}"),
        };
        let target = tmp.path().join("a.txt");
        handle
            .send(crate::transfer::DataCommand::ReceiveFile(target.clone()))
            .await
            .unwrap();
        data.write_all(b"hel").await.unwrap();
        data.write_all(b"lo").await.unwrap();
        data.shutdown().await.unwrap();
        assert_eq!(handle.finish_upload().await.unwrap(), 5);
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
        drop(handle);
        wait_until_free(&pool, pasv.pending.port).await;

        // download
        let pasv = setup_passive_mode(&config, &pool, ChannelId(2), events_tx)
            .await
            .unwrap();
        let mut data = TcpStream::connect(pasv.data_socket).await.unwrap();
        let handle = loop {
            if let SessionEvent::RememberMe(handle) = next_event(&mut events).await {
                break handle;
            }
        };
        assert_eq!(handle.id, ChannelId(2));
        handle
            .send(crate::transfer::DataCommand::SendFile(target))
            .await
            .unwrap();
        let mut received = Vec::new();
        data.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn test_finish_without_upload_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(47121..=47121, tmp.path());
        let pool = PortPool::shared(config.data_port_range());
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let pasv = setup_passive_mode(&config, &pool, ChannelId(7), events_tx)
            .await
            .unwrap();
        let _data = TcpStream::connect(pasv.data_socket).await.unwrap();
        let handle = match next_event(&mut events).await {
            SessionEvent::RememberMe(handle) => handle,
            other => panic!("unexpected event {other:?}"),
        };
        assert!(matches!(
            handle.finish_upload().await,
            Err(TransferError::NoPendingUpload)
        ));
    }

    #[tokio::test]
    async fn test_exhausted_pool_fails_setup() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(47131..=47131, tmp.path());
        let pool = PortPool::shared(config.data_port_range());
        pool.lock().await.allocate().unwrap();
        let (events_tx, _events) = mpsc::unbounded_channel();

        assert!(matches!(
            setup_passive_mode(&config, &pool, ChannelId(1), events_tx).await,
            Err(TransferError::NoAvailablePort)
        ));
    }
}
