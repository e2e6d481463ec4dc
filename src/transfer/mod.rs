//! Transfer module
//!
//! Passive port pool, the session ↔ data channel messages, and the data
//! channel task that moves file bytes.

pub mod data_channel;
pub mod messages;
pub mod operations;
pub mod port_pool;

pub use data_channel::DataChannelSettings;
pub use messages::{
    ChannelId, DataChannelHandle, DataCommand, SessionEvent, SessionEventReceiver,
    SessionEventSender,
};
pub use operations::{PassiveModeResult, PendingChannel, setup_passive_mode};
pub use port_pool::{PortPool, SharedPortPool};
