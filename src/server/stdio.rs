//! Line-delimited JSON-RPC over stdin/stdout.
//!
//! One request per line, one response per line. Parse failures produce a
//! JSON-RPC error with a null id instead of killing the loop; EOF ends
//! the session cleanly.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{Dispatcher, McpRequest, McpResponse};

pub async fn run(dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    tracing::info!("MCP stdio transport ready");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<McpRequest>(line) {
            Ok(request) => dispatcher.handle(request).await,
            Err(err) => {
                tracing::warn!(error = %err, "Discarding unparseable request line");
                Some(McpResponse::error(
                    Value::Null,
                    -32700,
                    format!("Parse error: {err}"),
                ))
            }
        };

        if let Some(response) = response {
            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            stdout.write_all(&encoded).await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("stdin closed; shutting down");
    Ok(())
}
