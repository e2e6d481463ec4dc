//! Command handlers
//!
//! Dispatches a parsed [`Command`] against the session and produces the
//! response. Failures are logged here with their reason and go out as a
//! bare FAILURE.

use log::{info, warn};
use std::time::Duration;

use crate::auth;
use crate::client::Session;
use crate::client::state::DataChannelState;
use crate::error::{AuthError, FtpServerError, StorageError, TransferError};
use crate::protocol::responses::format_listing;
use crate::protocol::{Command, CommandResult};
use crate::storage;
use crate::transfer::{DataCommand, setup_passive_mode};

/// How long a retired data channel gets to free its port.
const RETIRE_GRACE: Duration = Duration::from_secs(1);

/// Dispatches a received command to its handler.
///
/// # Arguments
///
/// * `session` - Mutable reference to the session that sent the command.
/// * `command` - The parsed command.
///
/// # Returns
///
/// * `CommandResult` - Status and exact response text.
pub async fn handle_command(session: &mut Session, command: &Command) -> CommandResult {
    session.drain_events();

    if session.config().require_auth && !session.is_logged_in() && !command.allowed_before_login()
    {
        return reject(AuthError::NotLoggedIn.into());
    }

    match command {
        Command::User(username) => handle_cmd_user(session, username),
        Command::Pass(password) => handle_cmd_pass(session, password),
        Command::Pwd => handle_cmd_pwd(session),
        Command::List => handle_cmd_list(session),
        Command::Pasv => handle_cmd_pasv(session).await,
        Command::Stor(filename) => handle_cmd_stor(session, filename).await,
        Command::Retr(filename) => handle_cmd_retr(session, filename).await,
        Command::Fnrc => handle_cmd_fnrc(session).await,
        Command::Dele(filename) => handle_cmd_dele(session, filename),
        Command::Rnfr(filename) => handle_cmd_rnfr(session, filename),
        Command::Rnto(filename) => handle_cmd_rnto(session, filename),
        Command::Noop => CommandResult::success(),
        Command::Abor => handle_cmd_abor(session),
        Command::Quit => handle_cmd_quit(session),
        Command::Unknown(line) => {
            warn!("Unrecognized command: {line:?}");
            CommandResult::failure("unrecognized command")
        }
    }
}

fn reject(err: FtpServerError) -> CommandResult {
    info!("Command rejected: {err}");
    CommandResult::failure(err.to_string())
}

/// USER: remembers the name; succeeds only for the configured one.
fn handle_cmd_user(session: &mut Session, username: &str) -> CommandResult {
    session.set_pending_username(username);
    match auth::validate_user(username, session.config()) {
        Ok(()) => CommandResult::success(),
        Err(e) => reject(e.into()),
    }
}

/// PASS: succeeds for the configured password. The session counts as
/// logged in only if the preceding USER matched too.
fn handle_cmd_pass(session: &mut Session, password: &str) -> CommandResult {
    if let Err(e) = auth::validate_password(password, session.config()) {
        return reject(e.into());
    }

    let username_matches = session
        .pending_username()
        .is_some_and(|name| auth::validate_user(name, session.config()).is_ok());
    session.complete_login(username_matches);
    if username_matches {
        info!("User {} logged in", session.config().username);
    }
    CommandResult::success()
}

fn handle_cmd_pwd(session: &Session) -> CommandResult {
    CommandResult::success_with(&format!("\"{}\"", session.config().server_root_str()))
}

fn handle_cmd_list(session: &Session) -> CommandResult {
    match storage::list_directory(session.server_root()) {
        Ok(entries) => CommandResult::success_raw(format_listing(&entries)),
        Err(e) => reject(e.into()),
    }
}

/// PASV: replaces any existing data channel with a fresh listener.
async fn handle_cmd_pasv(session: &mut Session) -> CommandResult {
    session.retire_data_channel(RETIRE_GRACE).await;

    let id = session.next_channel_id();
    let events = session.event_sender();
    let result = setup_passive_mode(session.config(), session.port_pool(), id, events).await;

    match result {
        Ok(pasv) => {
            let advertised = pasv.advertised.clone();
            session.set_pending_channel(pasv.pending);
            CommandResult::success_with(&advertised)
        }
        Err(e) => reject(e.into()),
    }
}

/// Checks that a registered data channel is free to take a transfer.
async fn ready_data_channel(session: &mut Session) -> Result<(), TransferError> {
    if !session.await_data_channel().await {
        return Err(TransferError::DataChannelNotRegistered);
    }
    match session.data_channel_state() {
        DataChannelState::Idle => Ok(()),
        DataChannelState::Busy => Err(TransferError::DataChannelBusy),
        DataChannelState::Unregistered => Err(TransferError::DataChannelNotRegistered),
    }
}

/// Hands a transfer to the data channel and marks it busy.
async fn dispatch_transfer(session: &mut Session, command: DataCommand) -> CommandResult {
    let Some(handle) = session.data_channel().cloned() else {
        return reject(TransferError::DataChannelNotRegistered.into());
    };

    match handle.send(command).await {
        Ok(()) => {
            session.mark_busy();
            CommandResult::success()
        }
        Err(e) => {
            session.release_data_channel();
            reject(e.into())
        }
    }
}

/// STOR: target must be absent and the data channel idle.
async fn handle_cmd_stor(session: &mut Session, filename: &str) -> CommandResult {
    let path = match storage::prepare_file_storage(session.server_root(), filename) {
        Ok(path) => path,
        Err(e) => return reject(e.into()),
    };
    if let Err(e) = ready_data_channel(session).await {
        return reject(e.into());
    }
    dispatch_transfer(session, DataCommand::ReceiveFile(path)).await
}

/// RETR: target must exist and the data channel be idle.
async fn handle_cmd_retr(session: &mut Session, filename: &str) -> CommandResult {
    let path = match storage::prepare_file_retrieval(session.server_root(), filename) {
        Ok(path) => path,
        Err(e) => return reject(e.into()),
    };
    if let Err(e) = ready_data_channel(session).await {
        return reject(e.into());
    }
    dispatch_transfer(session, DataCommand::SendFile(path)).await
}

/// FNRC: the data channel finishes the upload and its answer is ours.
async fn handle_cmd_fnrc(session: &mut Session) -> CommandResult {
    let Some(handle) = session.data_channel().cloned() else {
        return reject(TransferError::DataChannelNotRegistered.into());
    };

    match handle.finish_upload().await {
        Ok(bytes) => {
            info!("Upload confirmed ({bytes} bytes)");
            // the channel closes after its one transfer
            session.retire_data_channel(RETIRE_GRACE).await;
            CommandResult::success()
        }
        Err(TransferError::NoPendingUpload) => reject(TransferError::NoPendingUpload.into()),
        Err(e) => {
            session.release_data_channel();
            reject(e.into())
        }
    }
}

fn handle_cmd_dele(session: &Session, filename: &str) -> CommandResult {
    match storage::delete_file(session.server_root(), filename) {
        Ok(_) => CommandResult::success(),
        Err(e) => reject(e.into()),
    }
}

fn handle_cmd_rnfr(session: &mut Session, filename: &str) -> CommandResult {
    match storage::select_rename_source(session.server_root(), filename) {
        Ok(path) => {
            session.set_rename_pending_path(path);
            CommandResult::success()
        }
        Err(e) => reject(e.into()),
    }
}

/// RNTO: consumes the RNFR selection on success; keeps it on failure.
fn handle_cmd_rnto(session: &mut Session, filename: &str) -> CommandResult {
    let Some(source) = session.rename_pending_path().map(|p| p.to_path_buf()) else {
        return reject(StorageError::RenameNotPending.into());
    };

    match storage::rename_file(session.server_root(), &source, filename) {
        Ok(_) => {
            session.clear_rename_pending_path();
            CommandResult::success()
        }
        Err(e) => reject(e.into()),
    }
}

/// ABOR: closes the data channel (or pending listener). An unconfirmed
/// upload is discarded by the channel itself.
fn handle_cmd_abor(session: &mut Session) -> CommandResult {
    session.release_data_channel();
    CommandResult::success()
}

fn handle_cmd_quit(session: &mut Session) -> CommandResult {
    session.logout();
    CommandResult::close()
}
