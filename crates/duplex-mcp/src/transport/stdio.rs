//! Stdio transport. Reads JSON-RPC from stdin, writes to stdout.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use duplex_core::transport::{self, OutboundFrames};
use duplex_core::types::{McpError, McpResult};
use duplex_core::SessionBuilder;

use super::framing;

/// How long the writer may keep flushing after the session has closed.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Stdio transport for desktop MCP clients: one process, one session.
pub struct StdioTransport {
    builder: SessionBuilder,
}

impl StdioTransport {
    pub fn new(builder: SessionBuilder) -> Self {
        Self { builder }
    }

    /// Run the transport loop over stdin and stdout.
    pub async fn run(&self) -> McpResult<()> {
        serve(&self.builder, tokio::io::stdin(), tokio::io::stdout()).await
    }
}

/// Serve one session over a line-oriented byte stream pair.
///
/// Returns on EOF, on a read error, or once the session closes itself.
/// In every case the session is shut down before returning.
pub async fn serve<R, W>(builder: &SessionBuilder, reader: R, writer: W) -> McpResult<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, frames) = transport::channel();
    let session = builder.start(handle.clone())?;
    let writer_task = tokio::spawn(write_frames(frames, writer));

    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    tracing::info!("Stdio transport started");

    let result = loop {
        line.clear();
        let bytes_read = tokio::select! {
            read = reader.read_line(&mut line) => match read {
                Ok(n) => n,
                Err(e) => break Err(McpError::Io(e)),
            },
            _ = session.closed() => {
                tracing::info!("Session closed, stopping stdio transport");
                break Ok(());
            }
        };

        if bytes_read == 0 {
            tracing::info!("EOF on stdin, shutting down");
            break Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match framing::parse_message(trimmed) {
            Ok(msg) => {
                if let Some(reply) = session.handle_message(msg).await {
                    handle.send(reply);
                }
            }
            Err(e) => {
                tracing::warn!("Parse error: {e}");
                handle.send(framing::null_id_error(&e));
            }
        }
    };

    session.shutdown().await;
    drop(session);
    drop(handle);

    match tokio::time::timeout(WRITER_GRACE, writer_task).await {
        Ok(Ok(Err(e))) => tracing::warn!("Stdout writer failed: {e}"),
        Ok(Err(e)) => tracing::warn!("Stdout writer task failed: {e}"),
        Ok(Ok(Ok(()))) => {}
        Err(_) => tracing::debug!("Stdout writer still busy after shutdown; abandoning it"),
    }

    result
}

async fn write_frames<W>(mut frames: OutboundFrames, mut writer: W) -> McpResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let framed = match framing::frame_message(&frame) {
            Ok(framed) => framed,
            Err(e) => {
                tracing::warn!("Dropping unencodable frame: {e}");
                continue;
            }
        };
        writer
            .write_all(framed.as_bytes())
            .await
            .map_err(McpError::Io)?;
        writer.flush().await.map_err(McpError::Io)?;
    }
    Ok(())
}
