//! Server-sent-event decoding for streamed completions.
//!
//! The completion server sends `data: {json}` blocks separated by blank
//! lines and finishes with `data: [DONE]`.

use tracing::debug;

use super::types::CompletionResponse;
use super::FragmentStream;
use crate::error::{CompletionError, CompletionResult};

const DONE_MARKER: &str = "[DONE]";

/// Incremental splitter for an SSE body.
///
/// Network chunks are kept as raw bytes and only complete event blocks are
/// decoded, so a multi-byte character split across chunks arrives intact.
#[derive(Debug, Default)]
pub(crate) struct EventBlocks {
    pending: Vec<u8>,
}

impl EventBlocks {
    /// Append a chunk and return the `data:` payloads of every finished block.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((end, separator)) = block_boundary(&self.pending) {
            let block: Vec<u8> = self.pending.drain(..end + separator).take(end).collect();
            payloads.extend(data_payloads(&block));
        }
        payloads
    }

    /// Payloads of a trailing block the server never terminated.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let block = std::mem::take(&mut self.pending);
        data_payloads(&block)
    }
}

/// Position and length of the first blank-line separator.
fn block_boundary(bytes: &[u8]) -> Option<(usize, usize)> {
    (0..bytes.len()).find_map(|i| {
        let rest = &bytes[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

fn data_payloads(block: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(block)
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode one `data:` payload into a text fragment.
///
/// Returns `Ok(None)` for chunks that carry no text (role headers, usage).
pub(crate) fn parse_fragment(data: &str) -> CompletionResult<Option<String>> {
    let chunk: CompletionResponse =
        serde_json::from_str(data).map_err(|e| CompletionError::InvalidResponse {
            message: format!("Failed to parse stream chunk: {}", e),
        })?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.text)
        .filter(|text| !text.is_empty()))
}

/// Turn a streaming HTTP response into a fragment stream.
///
/// The stream ends at `[DONE]`, at end of body, or after the first error.
pub(crate) fn fragment_stream(response: reqwest::Response, timeout_ms: u64) -> FragmentStream {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut blocks = EventBlocks::default();
        let mut finished = false;

        while !finished {
            let data_lines = match response.chunk().await {
                Ok(Some(bytes)) => blocks.push(&bytes),
                Ok(None) => {
                    finished = true;
                    blocks.finish()
                }
                Err(e) => {
                    finished = true;
                    if e.is_timeout() {
                        yield Err(CompletionError::Timeout { timeout_ms });
                    } else {
                        yield Err(CompletionError::Connection { message: e.to_string() });
                    }
                    Vec::new()
                }
            };

            for data in data_lines {
                if data == DONE_MARKER {
                    debug!("Completion stream finished");
                    finished = true;
                    break;
                }
                match parse_fragment(&data) {
                    Ok(Some(text)) => yield Ok(text),
                    Ok(None) => {}
                    Err(e) => {
                        finished = true;
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    };

    Box::pin(stream)
}
