//! Line-oriented request intake.
//!
//! Each input line is one JSON [`SendRequest`]; each accepted line produces
//! one JSON [`Submission`](crate::Submission) line on the output.

use courier_common::tracing;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Service, request::SendRequest};

/// Read requests until end of input. Returns how many were submitted.
///
/// # Errors
///
/// Returns an error if reading the input or writing the output fails.
/// Malformed lines are logged and skipped.
pub async fn run<R, W>(service: &Service, mut reader: R, mut writer: W) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut submitted = 0u64;
    let mut line_number = 0u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_number += 1;

        let Ok(line) = std::str::from_utf8(&buf) else {
            tracing::warn!(line = line_number, "Skipping send request that is not valid UTF-8");
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<SendRequest>(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    line = line_number,
                    column = e.column(),
                    category = ?e.classify(),
                    "Skipping malformed send request"
                );
                continue;
            }
        };

        let submission = service.submit(request);
        let mut output = serde_json::to_vec(&submission)?;
        output.push(b'\n');
        writer.write_all(&output).await?;
        writer.flush().await?;
        submitted += 1;
    }

    Ok(submitted)
}
