//! Incremental HTTP/1.1 message parser-relay.

use smol::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{SessionError, SessionResult};
use crate::http::line_reader::LineReader;

/// One `next_header_field()` result.
#[derive(Debug, PartialEq, Eq)]
pub enum HeaderEvent {
    Field(String, String),
    /// The bare CRLF line that ends the header block.
    End,
}

/// One `next_chunk_marker()` result.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkMarker {
    /// Bytes of body/chunk payload the caller should now pull via
    /// [`HttpMessage::tunnel_chunk`].
    Length(u64),
    /// The trailing line after a chunk's payload (normally just `\r\n`).
    Line(Vec<u8>),
}

/// Per-direction parser state.
///
/// `tee`, when present, receives every raw line this parser reads,
/// verbatim (CRLFs and header ordering included), so the message can be
/// relayed byte-for-byte while still being inspected field by field.
pub struct HttpMessage<R, W> {
    reader: LineReader<R>,
    tee: Option<W>,
    headers_complete: bool,
    body_length: u64,
    chunked: bool,
    chunk_remaining: Option<u64>,
    body_complete: bool,
}

impl<R, W> HttpMessage<R, W>
where
    R: smol::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: LineReader<R>, tee: Option<W>) -> Self {
        Self {
            reader,
            tee,
            headers_complete: false,
            body_length: 0,
            chunked: false,
            chunk_remaining: None,
            body_complete: false,
        }
    }

    pub fn into_reader(self) -> LineReader<R> {
        self.reader
    }

    pub fn reader_mut(&mut self) -> &mut LineReader<R> {
        &mut self.reader
    }

    /// Enables or disables the tee after construction. Used by callers
    /// that must inspect a line (e.g. a status line, to classify it)
    /// before deciding whether the rest of the message should be relayed
    /// verbatim.
    pub fn set_tee(&mut self, tee: Option<W>) {
        self.tee = tee;
    }

    async fn next_line(&mut self) -> SessionResult<Vec<u8>> {
        let line = self.reader.read_line().await?;
        if let Some(tee) = self.tee.as_mut() {
            tee.write_all(&line).await?;
        }
        Ok(line)
    }

    /// `(method, raw_url, version)`. Split by single SPACE into exactly
    /// three tokens; no header normalization.
    pub async fn request_line(&mut self) -> SessionResult<(String, String, String)> {
        let line = self.next_line().await?;
        let text = String::from_utf8_lossy(&line);
        let parts: Vec<&str> = text.trim_end_matches(['\r', '\n']).split(' ').collect();
        match parts.as_slice() {
            [method, url, version] => Ok((
                method.to_string(),
                url.to_string(),
                version.to_string(),
            )),
            _ => Err(SessionError::Malformed(format!(
                "request line did not split into 3 tokens: {text:?}"
            ))),
        }
    }

    /// `(version, status, reason)`; the reason phrase may itself contain
    /// spaces, so only the first two spaces are significant.
    pub async fn status_line(&mut self) -> SessionResult<(String, u16, String)> {
        let line = self.next_line().await?;
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim_end_matches(['\r', '\n']);
        let mut parts = trimmed.splitn(3, ' ');
        let version = parts
            .next()
            .ok_or_else(|| SessionError::Malformed("missing version".into()))?;
        let status = parts
            .next()
            .ok_or_else(|| SessionError::Malformed("missing status".into()))?;
        let reason = parts.next().unwrap_or("");
        let status: u16 = status
            .parse()
            .map_err(|_| SessionError::Malformed(format!("non-numeric status: {status:?}")))?;
        Ok((version.to_string(), status, reason.to_string()))
    }

    /// One header field, the end marker, or `None` once the header block
    /// has already ended.
    pub async fn next_header_field(&mut self) -> SessionResult<Option<HeaderEvent>> {
        if self.headers_complete {
            return Ok(None);
        }

        let line = self.next_line().await?;
        if line == b"\r\n" {
            self.headers_complete = true;
            return Ok(Some(HeaderEvent::End));
        }

        let text = String::from_utf8_lossy(&line);
        let (name, value) = text
            .split_once(':')
            .ok_or_else(|| SessionError::Malformed(format!("header missing ':': {text:?}")))?;
        let name = name.trim_matches(' ').to_string();
        let value = value
            .trim_start_matches(' ')
            .trim_end_matches(['\r', '\n'])
            .to_string();

        if name.eq_ignore_ascii_case("Content-Length") {
            self.body_length = value
                .trim()
                .parse()
                .map_err(|_| SessionError::Malformed(format!("bad Content-Length: {value:?}")))?;
        } else if name.eq_ignore_ascii_case("Transfer-Encoding") {
            let is_chunked = value
                .split(',')
                .map(|c| c.trim())
                .any(|c| c.eq_ignore_ascii_case("chunked"));
            if is_chunked {
                self.chunked = true;
            }
        }

        Ok(Some(HeaderEvent::Field(name, value)))
    }

    /// Next chunk-size/body-length, trailing chunk line, or `None` once the
    /// body is fully consumed. Does not itself read the payload bytes;
    /// see [`HttpMessage::tunnel_chunk`].
    pub async fn next_chunk_marker(&mut self) -> SessionResult<Option<ChunkMarker>> {
        if self.body_complete {
            return Ok(None);
        }

        if !self.chunked {
            self.body_complete = true;
            if self.body_length > 0 {
                return Ok(Some(ChunkMarker::Length(self.body_length)));
            }
            return Ok(None);
        }

        let line = self.next_line().await?;

        match self.chunk_remaining {
            None => {
                let text = String::from_utf8_lossy(&line);
                let hex = text.trim_end_matches(['\r', '\n']);
                let size = u64::from_str_radix(hex, 16)
                    .map_err(|_| SessionError::Malformed(format!("bad chunk size: {hex:?}")))?;
                self.chunk_remaining = Some(size);
                Ok(Some(ChunkMarker::Length(size)))
            }
            Some(0) => {
                self.body_complete = true;
                self.chunk_remaining = None;
                Ok(Some(ChunkMarker::Line(line)))
            }
            Some(_) => {
                self.chunk_remaining = None;
                Ok(Some(ChunkMarker::Line(line)))
            }
        }
    }

    /// Copies `min(chunk_remaining, body_length)` bytes (in practice:
    /// `chunk_remaining` when chunked, `body_length` otherwise) from the
    /// reader to `writer` in 64 KiB slices. Fails with
    /// [`SessionError::Eof`] if the stream ends early.
    pub async fn tunnel_chunk<W2>(&mut self, writer: &mut W2) -> SessionResult<()>
    where
        W2: AsyncWrite + Unpin,
    {
        let mut remaining: u64 = if self.chunked {
            self.chunk_remaining.unwrap_or(0)
        } else {
            self.body_length
        };

        while remaining > 0 {
            let want = remaining.min(crate::http::line_reader::READ_CHUNK as u64) as usize;
            let buf = self.reader.read_some(want).await?;
            if buf.is_empty() {
                return Err(SessionError::Eof);
            }
            writer.write_all(&buf).await?;
            remaining -= buf.len() as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol::io::Cursor;

    type NoTee = Cursor<Vec<u8>>;

    fn msg(input: &[u8]) -> HttpMessage<Cursor<Vec<u8>>, NoTee> {
        HttpMessage::new(LineReader::new(Cursor::new(input.to_vec())), None)
    }

    #[test]
    fn request_line_splits_exactly_three_tokens() {
        smol::block_on(async {
            let mut m = msg(b"GET http://example.com/ HTTP/1.1\r\n");
            let (method, url, version) = m.request_line().await.unwrap();
            assert_eq!(method, "GET");
            assert_eq!(url, "http://example.com/");
            assert_eq!(version, "HTTP/1.1");
        });
    }

    #[test]
    fn status_line_keeps_spaces_in_reason() {
        smol::block_on(async {
            let mut m = msg(b"HTTP/1.1 404 Not Found\r\n");
            let (version, status, reason) = m.status_line().await.unwrap();
            assert_eq!(version, "HTTP/1.1");
            assert_eq!(status, 404);
            assert_eq!(reason, "Not Found");
        });
    }

    #[test]
    fn header_fields_then_end_marker_then_none() {
        smol::block_on(async {
            let mut m = msg(b"Host: example.com\r\nX-Foo:  bar \r\n\r\n");
            assert_eq!(
                m.next_header_field().await.unwrap(),
                Some(HeaderEvent::Field("Host".into(), "example.com".into()))
            );
            assert_eq!(
                m.next_header_field().await.unwrap(),
                Some(HeaderEvent::Field("X-Foo".into(), "bar".into()))
            );
            assert_eq!(m.next_header_field().await.unwrap(), Some(HeaderEvent::End));
            assert_eq!(m.next_header_field().await.unwrap(), None);
        });
    }

    #[test]
    fn transfer_encoding_chunked_wins_over_content_length() {
        smol::block_on(async {
            let mut m = msg(
                b"Content-Length: 100\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
            );
            while m.next_header_field().await.unwrap().is_some() {}
            assert!(m.chunked);

            let first = m.next_chunk_marker().await.unwrap();
            assert_eq!(first, Some(ChunkMarker::Length(5)));
            let mut sink = Vec::new();
            m.tunnel_chunk(&mut sink).await.unwrap();
            assert_eq!(sink, b"hello");

            let trailing = m.next_chunk_marker().await.unwrap();
            assert_eq!(trailing, Some(ChunkMarker::Line(b"\r\n".to_vec())));

            let zero = m.next_chunk_marker().await.unwrap();
            assert_eq!(zero, Some(ChunkMarker::Length(0)));
            m.tunnel_chunk(&mut sink).await.unwrap();

            let last_line = m.next_chunk_marker().await.unwrap();
            assert!(matches!(last_line, Some(ChunkMarker::Line(_))));

            assert_eq!(m.next_chunk_marker().await.unwrap(), None);
        });
    }

    #[test]
    fn zero_content_length_means_no_body() {
        smol::block_on(async {
            let mut m = msg(b"Content-Length: 0\r\n\r\n");
            while m.next_header_field().await.unwrap().is_some() {}
            assert_eq!(m.next_chunk_marker().await.unwrap(), None);
        });
    }

    #[test]
    fn malformed_request_line_is_reported() {
        smol::block_on(async {
            let mut m = msg(b"GET HTTP/1.1\r\n");
            assert!(matches!(
                m.request_line().await,
                Err(SessionError::Malformed(_))
            ));
        });
    }
}
