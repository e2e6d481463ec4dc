//! Module `data_channel`
//!
//! One data channel per successful PASV. It waits for the client to
//! connect on its passive port, registers with the owning session, runs
//! exactly one transfer driven by [`DataCommand`]s, then closes and
//! gives its port back to the pool.

use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

use crate::config::ServerConfig;
use crate::error::TransferError;
use crate::transfer::messages::{
    ChannelId, DataChannelHandle, DataCommand, SessionEvent, SessionEventSender,
};
use crate::transfer::port_pool::SharedPortPool;

/// Data channel tunables taken from [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct DataChannelSettings {
    pub buffer_size: usize,
    pub accept_timeout: Duration,
    pub drain_timeout: Duration,
}

impl From<&ServerConfig> for DataChannelSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            accept_timeout: config.data_connect_timeout(),
            drain_timeout: config.upload_drain_timeout(),
        }
    }
}

/// Task body for one passive data channel.
///
/// Every path out of this function releases `handle.port` exactly once,
/// then tells the session to forget the channel.
pub async fn run_passive_channel(
    listener: TcpListener,
    handle: DataChannelHandle,
    commands: mpsc::Receiver<DataCommand>,
    events: SessionEventSender,
    abandon: oneshot::Receiver<()>,
    pool: SharedPortPool,
    settings: DataChannelSettings,
) {
    let id = handle.id;
    let port = handle.port;

    let accepted = accept_data_connection(&listener, abandon, settings.accept_timeout, id).await;
    // one connection per channel
    drop(listener);

    if let Some(stream) = accepted {
        let mut channel = DataChannel::new(id, port, stream, commands, events.clone(), settings);
        if events.send(SessionEvent::RememberMe(handle)).is_ok() {
            channel.run().await;
        } else {
            debug!("Data channel {id}: session already gone");
        }
        channel.close().await;
    }

    if pool.lock().await.release(port) {
        info!("Data channel {id}: port {port} returned to pool");
    }
    let _ = events.send(SessionEvent::ForgetMe(id));
}

/// Waits for the client's data connection, the session abandoning the
/// listener, or the accept timeout, whichever comes first.
async fn accept_data_connection(
    listener: &TcpListener,
    abandon: oneshot::Receiver<()>,
    accept_timeout: Duration,
    id: ChannelId,
) -> Option<TcpStream> {
    tokio::select! {
        accepted = tokio::time::timeout(accept_timeout, listener.accept()) => match accepted {
            Ok(Ok((stream, peer))) => {
                info!("Data channel {id}: connection accepted from {peer}");
                Some(stream)
            }
            Ok(Err(e)) => {
                error!("Data channel {id}: failed to accept data connection: {e}");
                None
            }
            Err(_) => {
                warn!("Data channel {id}: no client connected within {accept_timeout:?}");
                None
            }
        },
        _ = abandon => {
            info!("Data channel {id}: listener abandoned by session");
            None
        }
    }
}

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Finished,
}

enum Wake {
    Command(Option<DataCommand>),
    Chunk(io::Result<usize>),
}

struct DataChannel {
    id: ChannelId,
    port: u16,
    stream: TcpStream,
    commands: mpsc::Receiver<DataCommand>,
    events: SessionEventSender,
    settings: DataChannelSettings,
    pending_write_path: Option<PathBuf>,
    pending_file: Option<File>,
    bytes_received: u64,
    peer_closed: bool,
}

impl DataChannel {
    fn new(
        id: ChannelId,
        port: u16,
        stream: TcpStream,
        commands: mpsc::Receiver<DataCommand>,
        events: SessionEventSender,
        settings: DataChannelSettings,
    ) -> Self {
        Self {
            id,
            port,
            stream,
            commands,
            events,
            settings,
            pending_write_path: None,
            pending_file: None,
            bytes_received: 0,
            peer_closed: false,
        }
    }

    async fn run(&mut self) {
        let mut buffer = vec![0u8; self.settings.buffer_size];

        loop {
            // Queued commands go first: bytes that follow a STOR reply
            // must find the upload file already open.
            let wake = tokio::select! {
                biased;
                command = self.commands.recv() => Wake::Command(command),
                read = self.stream.read(&mut buffer), if !self.peer_closed => Wake::Chunk(read),
            };

            match wake {
                Wake::Command(None) => {
                    info!("Data channel {}: released by session", self.id);
                    break;
                }
                Wake::Command(Some(command)) => {
                    if self.handle_command(command).await == Flow::Finished {
                        break;
                    }
                }
                Wake::Chunk(Ok(0)) => {
                    self.peer_closed = true;
                    if self.pending_file.is_none() {
                        info!("Data channel {}: closed by client", self.id);
                        break;
                    }
                    debug!("Data channel {}: client finished sending", self.id);
                }
                Wake::Chunk(Ok(n)) => {
                    if let Err(e) = self.write_chunk(&buffer[..n]).await {
                        error!("Data channel {}: upload write failed: {e}", self.id);
                        break;
                    }
                }
                Wake::Chunk(Err(e)) => {
                    warn!("Data channel {}: read error: {e}", self.id);
                    break;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: DataCommand) -> Flow {
        match command {
            DataCommand::ReceiveFile(path) => {
                self.begin_upload(path).await;
                Flow::Continue
            }
            DataCommand::FileReceived { reply } => {
                if self.pending_file.is_none() {
                    let _ = reply.send(Err(TransferError::NoPendingUpload));
                    return Flow::Continue;
                }
                let result = self.finish_upload().await;
                self.commands.close();
                self.set_busy(false);
                let _ = reply.send(result);
                Flow::Finished
            }
            DataCommand::SendFile(path) => {
                if self.pending_file.is_some() {
                    warn!(
                        "Data channel {}: ignoring download of {} during an upload",
                        self.id,
                        path.display()
                    );
                    return Flow::Continue;
                }
                self.set_busy(true);
                match self.send_file(&path).await {
                    Ok(sent) => info!(
                        "Data channel {}: sent {} ({} bytes)",
                        self.id,
                        path.display(),
                        sent
                    ),
                    Err(e) => error!(
                        "Data channel {}: download of {} failed: {e}",
                        self.id,
                        path.display()
                    ),
                }
                self.commands.close();
                self.set_busy(false);
                Flow::Finished
            }
        }
    }

    async fn begin_upload(&mut self, path: PathBuf) {
        if self.pending_file.is_some() {
            warn!(
                "Data channel {}: upload already pending, ignoring {}",
                self.id,
                path.display()
            );
            return;
        }

        self.set_busy(true);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => {
                info!("Data channel {}: receiving {}", self.id, path.display());
                self.pending_file = Some(file);
                self.pending_write_path = Some(path);
                self.bytes_received = 0;
            }
            Err(e) => {
                error!(
                    "Data channel {}: cannot create {}: {e}",
                    self.id,
                    path.display()
                );
                self.set_busy(false);
            }
        }
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        match self.pending_file.as_mut() {
            Some(file) => {
                file.write_all(chunk).await?;
                self.bytes_received += chunk.len() as u64;
                debug!(
                    "Data channel {}: +{} bytes ({} total)",
                    self.id,
                    chunk.len(),
                    self.bytes_received
                );
            }
            None => warn!(
                "Data channel {}: discarding {} bytes with no upload pending",
                self.id,
                chunk.len()
            ),
        }
        Ok(())
    }

    /// Reads whatever the client still has in flight, then flushes and
    /// closes the upload file. A failed upload leaves no file behind.
    async fn finish_upload(&mut self) -> Result<u64, TransferError> {
        let result = self.drain_and_flush().await;
        let path = self.pending_write_path.take();
        self.pending_file = None;

        match (&result, path) {
            (Ok(bytes), Some(path)) => {
                info!(
                    "Data channel {}: stored {} ({} bytes)",
                    self.id,
                    path.display(),
                    bytes
                );
            }
            (Err(e), Some(path)) => {
                error!(
                    "Data channel {}: upload of {} failed: {e}",
                    self.id,
                    path.display()
                );
                remove_partial(&path).await;
            }
            (_, None) => {}
        }
        result
    }

    async fn drain_and_flush(&mut self) -> Result<u64, TransferError> {
        let mut buffer = vec![0u8; self.settings.buffer_size];
        while !self.peer_closed {
            match tokio::time::timeout(self.settings.drain_timeout, self.stream.read(&mut buffer))
                .await
            {
                Err(_) => break,
                Ok(Ok(0)) => self.peer_closed = true,
                Ok(Ok(n)) => self.write_chunk(&buffer[..n]).await?,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        if let Some(file) = self.pending_file.as_mut() {
            file.flush().await?;
        }
        Ok(self.bytes_received)
    }

    /// Streams the file to the client. Releasing the channel mid-copy
    /// aborts the download; the socket closes when the channel drops.
    async fn send_file(&mut self, path: &Path) -> Result<u64, TransferError> {
        let mut file = File::open(path).await?;
        let sent = {
            let copy = tokio::io::copy(&mut file, &mut self.stream);
            tokio::pin!(copy);

            loop {
                tokio::select! {
                    copied = &mut copy => break copied?,
                    command = self.commands.recv() => match command {
                        None => {
                            info!("Data channel {}: download aborted by session", self.id);
                            return Err(TransferError::DataChannelClosed);
                        }
                        Some(DataCommand::FileReceived { reply }) => {
                            let _ = reply.send(Err(TransferError::NoPendingUpload));
                        }
                        Some(other) => {
                            warn!("Data channel {}: ignoring {:?} during a download", self.id, other);
                        }
                    },
                }
            }
        };

        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(sent)
    }

    fn set_busy(&self, busy: bool) {
        let _ = self.events.send(SessionEvent::BusyChanged(self.id, busy));
    }

    /// Final cleanup; an upload nobody confirmed with FNRC is discarded.
    async fn close(mut self) {
        if let Some(path) = self.pending_write_path.take() {
            self.pending_file = None;
            warn!(
                "Data channel {}: discarding unfinished upload {}",
                self.id,
                path.display()
            );
            remove_partial(&path).await;
            self.set_busy(false);
        }
        debug!("Data channel {}: closing socket on port {}", self.id, self.port);
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove partial upload {}: {e}", path.display());
    }
}
