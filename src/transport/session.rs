//! TCP listener and the single emulator session it accepts.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use super::message::{ProtocolError, WireMessage};
use crate::command::Button;

/// Connection-level failures. Fatal to the session; the control loop
/// treats any of these as connection loss, never as a per-message retry.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("socket read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("socket write failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Result of one `receive()` call.
#[derive(Debug)]
pub enum Received {
    /// A well-formed message.
    Message(WireMessage),
    /// A malformed line; recoverable, carries the parse failure.
    Malformed(ProtocolError),
    /// The emulator closed the connection.
    Disconnected,
}

/// Passive listener the emulator connects to. Exactly one emulator at a
/// time; a new accept is only attempted after the previous session ends.
pub struct BridgeListener {
    listener: TcpListener,
}

impl BridgeListener {
    /// Bind the loopback listener. `port` 0 picks an ephemeral port.
    pub async fn bind(host: &str, port: u16) -> Result<Self, TransportError> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self { listener })
    }

    /// The bound address (useful when port 0 was requested).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Accept)
    }

    /// Block until the emulator connects.
    pub async fn accept(&self) -> Result<EmulatorSession, TransportError> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        tracing::info!(%peer, "emulator connected");
        EmulatorSession::new(stream)
    }
}

/// One live connection to the emulator agent. Owns the socket exclusively;
/// created on accept, destroyed on disconnect or fatal protocol error.
pub struct EmulatorSession {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    /// Emulator has announced it can accept a new command.
    pub ready: bool,
    /// A screenshot request is outstanding.
    pub awaiting_screenshot: bool,
}

impl EmulatorSession {
    fn new(stream: TcpStream) -> Result<Self, TransportError> {
        // Commands are single short lines; never batch them behind Nagle.
        stream.set_nodelay(true).map_err(TransportError::Accept)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half).lines(),
            writer: write_half,
            ready: false,
            awaiting_screenshot: false,
        })
    }

    /// Next decoded message, a malformed-line report, or the disconnect
    /// signal. Blocks until one of those arrives.
    pub async fn receive(&mut self) -> Result<Received, TransportError> {
        loop {
            match self.reader.next_line().await.map_err(TransportError::Read)? {
                None => return Ok(Received::Disconnected),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    return Ok(match WireMessage::parse(&line) {
                        Ok(msg) => Received::Message(msg),
                        Err(err) => Received::Malformed(err),
                    })
                }
            }
        }
    }

    /// Send the bare `request_screenshot` literal.
    pub async fn request_screenshot(&mut self) -> Result<(), TransportError> {
        self.send_line(super::message::REQUEST_SCREENSHOT).await?;
        self.awaiting_screenshot = true;
        Ok(())
    }

    /// Send a button command as its bare decimal code.
    pub async fn send_button(&mut self, button: Button) -> Result<(), TransportError> {
        self.send_line(&button.code().to_string()).await?;
        self.ready = false;
        Ok(())
    }

    async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(TransportError::Write)?;
        self.writer.flush().await.map_err(TransportError::Write)
    }
}
