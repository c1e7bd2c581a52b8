//! Message transports for the server.
//!
//! Messages are framed as newline-delimited JSON (NDJSON). [`StdioTransport`]
//! is the production transport used when the server is launched as a child
//! process by an MCP host; [`ChannelTransport`] exercises the same pipeline
//! in-process for tests.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::mpsc;

use crate::error::ServerError;

/// Reads and writes framed JSON-RPC messages.
#[async_trait]
pub trait Transport: Send {
    /// Read the next message. `Ok(None)` signals EOF.
    async fn read_message(&mut self) -> Result<Option<String>, ServerError>;

    /// Write one message, framing and flushing it.
    async fn write_message(&mut self, message: &str) -> Result<(), ServerError>;

    /// Flush buffered output and release resources.
    async fn close(&mut self) -> Result<(), ServerError>;
}

/// NDJSON over the process stdin/stdout.
pub struct StdioTransport {
    reader: BufReader<Stdin>,
    writer: Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn read_message(&mut self) -> Result<Option<String>, ServerError> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end().to_string()))
    }

    async fn write_message(&mut self, message: &str) -> Result<(), ServerError> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ServerError> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// In-process transport backed by tokio mpsc channels, for tests.
pub struct ChannelTransport {
    receiver: mpsc::Receiver<String>,
    sender: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(receiver: mpsc::Receiver<String>, sender: mpsc::Sender<String>) -> Self {
        Self { receiver, sender }
    }

    /// A linked pair: messages written by one side are read by the other.
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(buffer);
        let (tx_b, rx_b) = mpsc::channel(buffer);
        (
            ChannelTransport::new(rx_a, tx_b),
            ChannelTransport::new(rx_b, tx_a),
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn read_message(&mut self) -> Result<Option<String>, ServerError> {
        Ok(self.receiver.recv().await)
    }

    async fn write_message(&mut self, message: &str) -> Result<(), ServerError> {
        self.sender
            .send(message.to_string())
            .await
            .map_err(|e| ServerError::TransportError {
                message: format!("channel send failed: {e}"),
            })
    }

    async fn close(&mut self) -> Result<(), ServerError> {
        self.receiver.close();
        Ok(())
    }
}
