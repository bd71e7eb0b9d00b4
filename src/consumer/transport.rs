//! Line-delimited JSON transport.
//!
//! Reads one check result per line and forwards it as a [`StreamMessage`]
//! on a single partition, numbering offsets from zero.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use super::StreamMessage;

/// Forward every non-empty line of `reader`. Returns the number of messages sent.
pub async fn pump_lines<R>(
    reader: R,
    partition: u32,
    tx: mpsc::Sender<StreamMessage>,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut offset = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if tx.send(StreamMessage::new(partition, offset, line)).await.is_err() {
            tracing::debug!(offset, "Consumer gone, stopping transport");
            break;
        }
        offset += 1;
    }

    tracing::info!(messages = offset, "Transport reached end of input");
    Ok(offset)
}
