use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;

use crate::client::Session;
use crate::client::reader::{ControlLine, ControlReader};
use crate::config::ServerConfig;
use crate::error::FtpServerError;
use crate::error::handlers::handle_error;
use crate::protocol::responses::format_response;
use crate::protocol::{CommandResult, ReplyCode, handle_command, parse_command};
use crate::storage::ensure_server_root;
use crate::transfer::{SessionEvent, SharedPortPool};

enum Wake {
    Line(io::Result<Option<ControlLine>>),
    Event(SessionEvent),
}

/// Serves one control connection until QUIT, EOF or a socket error.
///
/// - Sends the greeting once the server root is known to exist.
/// - Reads command lines and dispatches them with `handle_command`.
/// - Applies data channel events as they arrive, even between commands.
pub async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    port_pool: SharedPortPool,
) {
    if let Err(e) = serve(stream, peer, config, port_pool).await {
        handle_error(&e);
    }
    info!("Client {} disconnected", peer);
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    port_pool: SharedPortPool,
) -> Result<(), FtpServerError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = ControlReader::new(read_half, config.max_command_length);

    if let Err(e) = ensure_server_root(&config.server_root) {
        error!(
            "Cannot create server root {} for {}: {}",
            config.server_root.display(),
            peer,
            e
        );
        send(&mut write_half, &format_response(ReplyCode::Close, None)).await?;
        return Err(e.into());
    }

    let greeting = format_response(ReplyCode::Success, Some(&config.greeting));
    send(&mut write_half, &greeting).await?;

    let max_command_length = config.max_command_length;
    let mut session = Session::new(config, port_pool);

    loop {
        let wake = tokio::select! {
            line = lines.next_line() => Wake::Line(line),
            Some(event) = session.next_event() => Wake::Event(event),
        };

        let line = match wake {
            Wake::Event(event) => {
                session.apply_event(event);
                continue;
            }
            Wake::Line(Ok(Some(line))) => line,
            Wake::Line(Ok(None)) => {
                info!("Connection closed by client {}", peer);
                break;
            }
            Wake::Line(Err(e)) => {
                warn!("Failed to read from {}: {}", peer, e);
                break;
            }
        };

        let result = match &line {
            ControlLine::TooLong => {
                warn!(
                    "Command from {} exceeds {} bytes",
                    peer, max_command_length
                );
                CommandResult::failure("command too long")
            }
            ControlLine::Line(text) => {
                debug!("Received from {}: {:?}", peer, redact(text));
                handle_command(&mut session, &parse_command(text)).await
            }
        };

        info!("{} {} -> {}", peer, line.verb(), result.code());

        if let Some(msg) = &result.message {
            send(&mut write_half, msg).await?;
        }
        if result.closes_connection() {
            info!("Client {} requested to quit", peer);
            break;
        }
    }

    Ok(())
}

async fn send(writer: &mut OwnedWriteHalf, msg: &str) -> io::Result<()> {
    writer.write_all(msg.as_bytes()).await?;
    writer.flush().await
}

/// Hides the argument of PASS in logs.
fn redact(line: &str) -> &str {
    let verb = line.split_whitespace().next().unwrap_or("");
    if verb.eq_ignore_ascii_case("PASS") {
        verb
    } else {
        line
    }
}
