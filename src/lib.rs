//! Passive-mode FTP server
//!
//! A small file server speaking a line-based control protocol with three
//! reply codes. Transfers run over per-PASV data channels drawn from a
//! shared port pool.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;

pub use crate::config::ServerConfig;
pub use server::Server;
