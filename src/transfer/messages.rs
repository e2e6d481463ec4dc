//! Messages between a session and its data channel.
//!
//! Each direction has its own closed enum and its own point-to-point
//! channel, so delivery order is send order.

use std::fmt;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

use crate::error::TransferError;

/// Identifies one data channel within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session → data channel.
#[derive(Debug)]
pub enum DataCommand {
    /// Stream the whole file at this path to the client, then close.
    SendFile(PathBuf),
    /// Create this file and append every arriving chunk to it.
    ReceiveFile(PathBuf),
    /// The client says the upload is complete; reply with bytes written.
    FileReceived {
        reply: oneshot::Sender<Result<u64, TransferError>>,
    },
}

/// Data channel → session.
#[derive(Debug)]
pub enum SessionEvent {
    /// The client connected; this is how the session reaches the channel.
    RememberMe(DataChannelHandle),
    /// The data socket closed and the port went back to the pool.
    ForgetMe(ChannelId),
    BusyChanged(ChannelId, bool),
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;
pub type SessionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Non-owning reference a session keeps to its data channel.
///
/// Dropping every handle closes the channel's command mailbox, which
/// makes the data channel shut down and release its port.
#[derive(Debug, Clone)]
pub struct DataChannelHandle {
    pub id: ChannelId,
    pub port: u16,
    commands: mpsc::Sender<DataCommand>,
}

impl DataChannelHandle {
    pub fn new(id: ChannelId, port: u16, commands: mpsc::Sender<DataCommand>) -> Self {
        Self { id, port, commands }
    }

    /// Delivers a command; fails if the data channel has stopped
    /// accepting work.
    pub async fn send(&self, command: DataCommand) -> Result<(), TransferError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TransferError::DataChannelClosed)
    }

    /// Asks the channel to finish the pending upload and waits for its answer.
    pub async fn finish_upload(&self) -> Result<u64, TransferError> {
        let (tx, rx) = oneshot::channel();
        self.send(DataCommand::FileReceived { reply: tx }).await?;
        rx.await.map_err(|_| TransferError::DataChannelClosed)?
    }
}
