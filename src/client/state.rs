//! Module `state`
//!
//! Defines the [`Session`]: everything the server remembers about one
//! control connection, including the registration and busy state of its
//! data channel.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::transfer::{
    ChannelId, DataChannelHandle, PendingChannel, SessionEvent, SessionEventReceiver,
    SessionEventSender, SharedPortPool,
};

/// Registration and busy state of the session's data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Unregistered,
    Idle,
    Busy,
}

/// Server-side state for one control connection.
pub struct Session {
    config: Arc<ServerConfig>,
    port_pool: SharedPortPool,

    pending_username: Option<String>,
    authenticated_user: Option<String>,
    rename_pending_path: Option<PathBuf>,

    data_channel: Option<DataChannelHandle>,
    data_channel_state: DataChannelState,
    pending_channel: Option<PendingChannel>,
    next_channel_id: u64,

    events_tx: SessionEventSender,
    events_rx: SessionEventReceiver,
}

impl Session {
    pub fn new(config: Arc<ServerConfig>, port_pool: SharedPortPool) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            port_pool,
            pending_username: None,
            authenticated_user: None,
            rename_pending_path: None,
            data_channel: None,
            data_channel_state: DataChannelState::Unregistered,
            pending_channel: None,
            next_channel_id: 0,
            events_tx,
            events_rx,
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn server_root(&self) -> &Path {
        &self.config.server_root
    }

    pub fn port_pool(&self) -> &SharedPortPool {
        &self.port_pool
    }

    pub fn authenticated_user(&self) -> Option<&str> {
        self.authenticated_user.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.authenticated_user.is_some()
    }

    pub fn rename_pending_path(&self) -> Option<&Path> {
        self.rename_pending_path.as_deref()
    }

    pub fn data_channel(&self) -> Option<&DataChannelHandle> {
        self.data_channel.as_ref()
    }

    pub fn data_channel_state(&self) -> DataChannelState {
        self.data_channel_state
    }

    pub fn has_pending_channel(&self) -> bool {
        self.pending_channel.is_some()
    }

    // --------------------
    // Setter methods
    // --------------------

    /// Records the name from USER; any previous login is dropped.
    pub fn set_pending_username(&mut self, username: &str) {
        self.pending_username = Some(username.to_string());
        self.authenticated_user = None;
    }

    /// Completes the login if the pending USER name was the right one.
    pub fn complete_login(&mut self, username_matches: bool) {
        if username_matches {
            self.authenticated_user = self.pending_username.clone();
        }
    }

    pub fn pending_username(&self) -> Option<&str> {
        self.pending_username.as_deref()
    }

    /// Selects a rename source, replacing any earlier one.
    pub fn set_rename_pending_path(&mut self, path: PathBuf) {
        self.rename_pending_path = Some(path);
    }

    pub fn clear_rename_pending_path(&mut self) {
        self.rename_pending_path = None;
    }

    // --------------------
    // Data channel lifecycle
    // --------------------

    /// Sender data channels use to reach this session.
    pub fn event_sender(&self) -> SessionEventSender {
        self.events_tx.clone()
    }

    pub fn next_channel_id(&mut self) -> ChannelId {
        self.next_channel_id += 1;
        ChannelId(self.next_channel_id)
    }

    /// Remembers a freshly started passive listener.
    pub fn set_pending_channel(&mut self, pending: PendingChannel) {
        self.pending_channel = Some(pending);
    }

    /// Drops the registered data channel and any pending listener.
    ///
    /// Both shut down on their own and return their ports to the pool.
    pub fn release_data_channel(&mut self) {
        if let Some(pending) = self.pending_channel.take() {
            debug!("Abandoning pending data channel {}", pending.id);
        }
        if let Some(handle) = self.data_channel.take() {
            debug!("Releasing data channel {}", handle.id);
        }
        self.data_channel_state = DataChannelState::Unregistered;
    }

    /// Like [`Session::release_data_channel`], but waits up to `grace` for
    /// the dropped channels to report their ports returned.
    pub async fn retire_data_channel(&mut self, grace: Duration) {
        let mut retiring: Vec<ChannelId> = self
            .pending_channel
            .as_ref()
            .map(|p| p.id)
            .into_iter()
            .chain(self.data_channel.as_ref().map(|h| h.id))
            .collect();
        self.release_data_channel();

        let deadline = tokio::time::Instant::now() + grace;
        while !retiring.is_empty() {
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => {
                    if let SessionEvent::ForgetMe(id) = &event {
                        retiring.retain(|r| r != id);
                    }
                    self.apply_event(event);
                }
                Ok(None) | Err(_) => {
                    debug!("Data channels {:?} still closing", retiring);
                    break;
                }
            }
        }
    }

    /// Marks the channel busy as soon as a transfer is handed to it, so
    /// no second STOR/RETR slips in before the channel reports back.
    pub fn mark_busy(&mut self) {
        if self.data_channel.is_some() {
            self.data_channel_state = DataChannelState::Busy;
        }
    }

    /// Applies one message from a data channel.
    pub fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::RememberMe(handle) => {
                let expected = self.pending_channel.as_ref().map(|p| p.id);
                if expected == Some(handle.id) {
                    info!("Data channel {} registered on port {}", handle.id, handle.port);
                    self.pending_channel = None;
                    self.data_channel = Some(handle);
                    self.data_channel_state = DataChannelState::Idle;
                } else {
                    // dropping the handle closes that channel
                    warn!("Ignoring registration of stale data channel {}", handle.id);
                }
            }
            SessionEvent::ForgetMe(id) => {
                if self.data_channel.as_ref().map(|h| h.id) == Some(id) {
                    info!("Data channel {} closed", id);
                    self.data_channel = None;
                    self.data_channel_state = DataChannelState::Unregistered;
                }
                if self.pending_channel.as_ref().map(|p| p.id) == Some(id) {
                    self.pending_channel = None;
                }
            }
            SessionEvent::BusyChanged(id, busy) => {
                if self.data_channel.as_ref().map(|h| h.id) == Some(id) {
                    self.data_channel_state = if busy {
                        DataChannelState::Busy
                    } else {
                        DataChannelState::Idle
                    };
                }
            }
        }
    }

    /// Applies every event already queued without waiting.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
        }
    }

    /// Waits for the next data channel event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Makes sure a data channel is registered, waiting for a pending
    /// listener's client to connect if needed.
    pub async fn await_data_channel(&mut self) -> bool {
        self.drain_events();
        let deadline = tokio::time::Instant::now() + self.config.data_connect_timeout();

        while self.data_channel.is_none() && self.pending_channel.is_some() {
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => self.apply_event(event),
                Ok(None) | Err(_) => break,
            }
        }
        self.data_channel.is_some()
    }

    /// Resets the session as on QUIT.
    pub fn logout(&mut self) {
        self.pending_username = None;
        self.authenticated_user = None;
        self.rename_pending_path = None;
        self.release_data_channel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{DataCommand, PortPool};

    fn session() -> Session {
        let config = Arc::new(ServerConfig::default());
        let pool = PortPool::shared(config.data_port_range());
        Session::new(config, pool)
    }

    fn handle(id: u64) -> (DataChannelHandle, mpsc::Receiver<DataCommand>) {
        let (tx, rx) = mpsc::channel(1);
        (DataChannelHandle::new(ChannelId(id), 9000, tx), rx)
    }

    #[test]
    fn test_new_session_is_blank() {
        let session = session();
        assert!(!session.is_logged_in());
        assert!(session.rename_pending_path().is_none());
        assert!(session.data_channel().is_none());
        assert_eq!(session.data_channel_state(), DataChannelState::Unregistered);
    }

    #[test]
    fn test_login_requires_pending_username() {
        let mut session = session();
        session.complete_login(true);
        assert!(!session.is_logged_in());

        session.set_pending_username("TEST");
        session.complete_login(true);
        assert_eq!(session.authenticated_user(), Some("TEST"));

        session.set_pending_username("other");
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_unexpected_registration_is_dropped() {
        let mut session = session();
        let (handle, mut rx) = handle(3);
        session.apply_event(SessionEvent::RememberMe(handle));
        assert!(session.data_channel().is_none());
        // the session kept no sender, so the mailbox is closed
        assert!(rx.try_recv().is_err());
        assert!(rx.is_closed());
    }

    #[test]
    fn test_channel_ids_increase() {
        let mut session = session();
        let a = session.next_channel_id();
        let b = session.next_channel_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_busy_and_forget_for_registered_channel() {
        let mut session = session();
        let (handle, _rx) = handle(1);
        // register directly, as if a pending channel had matched
        session.data_channel = Some(handle);
        session.data_channel_state = DataChannelState::Idle;

        session.apply_event(SessionEvent::BusyChanged(ChannelId(1), true));
        assert_eq!(session.data_channel_state(), DataChannelState::Busy);

        // events from another channel are ignored
        session.apply_event(SessionEvent::BusyChanged(ChannelId(2), false));
        assert_eq!(session.data_channel_state(), DataChannelState::Busy);
        session.apply_event(SessionEvent::ForgetMe(ChannelId(2)));
        assert!(session.data_channel().is_some());

        session.apply_event(SessionEvent::BusyChanged(ChannelId(1), false));
        assert_eq!(session.data_channel_state(), DataChannelState::Idle);

        session.apply_event(SessionEvent::ForgetMe(ChannelId(1)));
        assert!(session.data_channel().is_none());
        assert_eq!(session.data_channel_state(), DataChannelState::Unregistered);
    }

    #[test]
    fn test_logout_clears_everything() {
        let mut session = session();
        session.set_pending_username("TEST");
        session.complete_login(true);
        session.set_rename_pending_path(PathBuf::from("/tmp/x"));
        let (handle, _rx) = handle(1);
        session.data_channel = Some(handle);
        session.data_channel_state = DataChannelState::Idle;

        session.logout();
        assert!(!session.is_logged_in());
        assert!(session.rename_pending_path().is_none());
        assert!(session.data_channel().is_none());
        assert_eq!(session.data_channel_state(), DataChannelState::Unregistered);
    }

    #[tokio::test]
    async fn test_await_without_pasv_returns_immediately() {
        let mut session = session();
        assert!(!session.await_data_channel().await);
    }
}
