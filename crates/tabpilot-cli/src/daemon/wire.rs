//! Line framing shared by every socket.

use anyhow::{Context, Result};
use serde::Serialize;
use tabpilot_core::protocol::MAX_LINE_BYTES;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Read one line of at most [`MAX_LINE_BYTES`] plus its newline.
///
/// Returns the number of bytes read, 0 at EOF. A line over the limit is an
/// error and the connection should be dropped.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut String) -> Result<usize> {
    read_line_bounded(reader, buf, MAX_LINE_BYTES + 1).await
}

async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
    max_size: usize,
) -> Result<usize> {
    let mut total = 0;
    let mut bytes = Vec::new();

    loop {
        let available = reader.fill_buf().await.context("Failed to read from peer")?;
        if available.is_empty() {
            break;
        }

        let newline_pos = available.iter().position(|&b| b == b'\n');
        let take = newline_pos.map_or(available.len(), |p| p + 1);
        if total + take > max_size {
            anyhow::bail!("Line too large: exceeded {} byte limit", max_size);
        }

        // Bytes are collected first so a character split across reads stays whole.
        bytes.extend_from_slice(&available[..take]);
        total += take;
        reader.consume(take);

        if newline_pos.is_some() {
            break;
        }
    }

    let line = std::str::from_utf8(&bytes).context("Invalid UTF-8 in message")?;
    buf.push_str(line);
    Ok(total)
}

/// Serialize `message` and write it as one line.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(message).context("Failed to serialize message")?;
    line.push('\n');
    write_raw_line(writer, &line).await
}

/// Write an already terminated line and flush.
pub async fn write_raw_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer
        .write_all(line.as_bytes())
        .await
        .context("Failed to write message")?;
    writer.flush().await.context("Failed to flush")
}
