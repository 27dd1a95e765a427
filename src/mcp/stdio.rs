//! Newline-delimited JSON-RPC over stdin/stdout

use crate::error::Result;
use crate::mcp::ProtocolHandler;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Serve requests until EOF or until a `shutdown` request has been answered
pub async fn serve<R, W>(handler: &ProtocolHandler, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            info!("stdin closed, shutting down stdio mode");
            break;
        }
        debug!(bytes = line.len(), "Received message");

        if let Some(response) = handler.handle_message(&line).await {
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        if handler.is_shutdown_requested() {
            info!("Shutdown acknowledged, leaving stdio loop");
            break;
        }
    }
    Ok(())
}

/// Serve the process's own stdin/stdout
pub async fn run_stdio(handler: &ProtocolHandler) -> Result<()> {
    info!("stdio mode ready - waiting for JSON-RPC messages");
    serve(handler, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
