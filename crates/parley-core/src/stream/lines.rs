//! Newline framing over a chunked byte stream.

use crate::error::{ParleyError, Result};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::fmt::Display;

/// One line cut from the byte stream, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedLine {
    pub text: String,
    /// False for the trailing fragment left when the stream closed without a
    /// final newline; such a fragment may have been cut off in transit.
    pub terminated: bool,
}

impl FramedLine {
    fn terminated(text: String) -> Self {
        Self {
            text,
            terminated: true,
        }
    }
}

/// Splits `byte_stream` into lines, buffering across chunk boundaries.
///
/// Blank lines are skipped. A read error or invalid UTF-8 is yielded as a
/// [`ParleyError::Stream`] and ends the stream.
pub fn ndjson_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<FramedLine>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line = buffer.split_to(newline_pos + 1);
                    line.truncate(line.len() - 1);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let item = decode(&line).map(FramedLine::terminated);
                    let done = item.is_err();
                    return Some((item, (stream, buffer, done)));
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        let err = ParleyError::stream(format!("stream read failed: {e}"));
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    None => {
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let item = decode(&buffer).map(|text| FramedLine {
                            text,
                            terminated: false,
                        });
                        buffer.clear();
                        return Some((item, (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

fn decode(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| ParleyError::stream(format!("invalid UTF-8 in stream: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    fn bytes(parts: &[&'static str]) -> Vec<std::result::Result<Bytes, io::Error>> {
        parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect()
    }

    async fn collect(parts: Vec<std::result::Result<Bytes, io::Error>>) -> Vec<Result<FramedLine>> {
        ndjson_lines(stream::iter(parts)).collect().await
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let lines = collect(bytes(&["{\"a\":", "1}\n{\"b\"", ":2}\r\n\n"])).await;
        let texts: Vec<String> = lines.into_iter().map(|l| l.unwrap().text).collect();
        assert_eq!(texts, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn test_trailing_fragment_is_flagged() {
        let lines = collect(bytes(&["one\ntw", "o"])).await;
        let lines: Vec<FramedLine> = lines.into_iter().map(|l| l.unwrap()).collect();
        assert_eq!(
            lines,
            vec![
                FramedLine::terminated("one".to_string()),
                FramedLine {
                    text: "two".to_string(),
                    terminated: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_read_error_ends_the_stream() {
        let mut parts = bytes(&["ok\n"]);
        parts.push(Err(io::Error::other("reset")));
        parts.extend(bytes(&["never\n"]));

        let lines = collect(parts).await;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].is_ok());
        assert!(lines[1].as_ref().unwrap_err().is_stream());
    }
}
