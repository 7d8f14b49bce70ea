//! Async loop that feeds a byte stream through the assembler.

use super::assembler::{AssembledResponse, ResponseAssembler, StreamSnapshot};
use super::debounce::LeadingDebounce;
use super::lines::ndjson_lines;
use crate::error::{ParleyError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Consumes `byte_stream` until it closes, fails or `cancel` fires.
///
/// Intermediate snapshots are published through `updates` on a leading
/// debounce; an update suppressed inside the window is published when the
/// window closes, even if no further chunk arrives. The final snapshot is
/// always published, whether the response completed or failed. Cancellation abandons the loop and returns
/// [`ParleyError::Cancelled`]; the underlying read is dropped, not aborted
/// at the protocol level.
pub async fn drive_stream<S, E>(
    byte_stream: S,
    updates: &watch::Sender<StreamSnapshot>,
    cancel: &CancellationToken,
    debounce: &mut LeadingDebounce,
) -> Result<AssembledResponse>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display,
{
    let mut assembler = ResponseAssembler::new();
    let mut lines = std::pin::pin!(ndjson_lines(byte_stream));
    let mut suppressed = false;

    loop {
        let flush_at = debounce.reopens_at().filter(|_| suppressed);
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(state = %assembler.state(), "Stream cancelled by caller");
                return Err(ParleyError::Cancelled);
            }
            _ = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                if debounce.ready(Instant::now()) {
                    updates.send_replace(assembler.snapshot());
                    suppressed = false;
                }
                continue;
            }
            next = lines.next() => next,
        };
        let Some(line) = next else { break };

        let applied = match line {
            Ok(line) if line.terminated => assembler.accept_line(&line.text),
            Ok(line) => assembler.accept_truncated(&line.text),
            Err(e) => Err(assembler.abort(e)),
        };
        if let Err(e) = applied {
            updates.send_replace(assembler.snapshot());
            return Err(e);
        }

        if debounce.ready(Instant::now()) {
            updates.send_replace(assembler.snapshot());
            suppressed = false;
        } else {
            suppressed = true;
        }
    }

    let result = assembler.finish();
    updates.send_replace(assembler.snapshot());
    result
}
