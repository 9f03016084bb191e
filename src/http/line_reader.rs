//! CRLF-line and length-bounded reads over an async byte stream.

use smol::io::{AsyncRead, AsyncReadExt};

use crate::error::{SessionError, SessionResult};

/// Buffer size for bulk body copy reads.
pub const READ_CHUNK: usize = 65_536;

/// Wraps an `AsyncRead` with a small pushback buffer so lines and exact-byte
/// reads can be pulled out of a single underlying stream without losing
/// whatever extra bytes a `read()` call happened to return past the
/// boundary we were looking for (pipelined requests, or TLS bytes that
/// arrived glued to a CONNECT request's trailing CRLF).
pub struct LineReader<R> {
    stream: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    /// Reads one CRLF-terminated line, CRLF included. Fails with
    /// [`SessionError::Eof`] if the stream ends first.
    pub async fn read_line(&mut self) -> SessionResult<Vec<u8>> {
        loop {
            if let Some(pos) = find_subslice(&self.buf, b"\r\n") {
                return Ok(self.buf.drain(..pos + 2).collect());
            }
            self.fill().await?;
        }
    }

    /// Reads exactly `n` bytes. Fails with [`SessionError::Eof`] on
    /// premature EOF.
    pub async fn read_exact(&mut self, n: usize) -> SessionResult<Vec<u8>> {
        while self.buf.len() < n {
            self.fill().await?;
        }
        Ok(self.buf.drain(..n).collect())
    }

    /// Reads up to `max` bytes, preferring whatever is already buffered so
    /// a caller streaming a large body doesn't force one read per 64 KiB
    /// once the pushback buffer has been drained. Fails with
    /// [`SessionError::Eof`] only when it has to touch the stream and the
    /// stream is already closed.
    pub async fn read_some(&mut self, max: usize) -> SessionResult<Vec<u8>> {
        if !self.buf.is_empty() {
            let take = self.buf.len().min(max);
            return Ok(self.buf.drain(..take).collect());
        }
        let want = max.min(READ_CHUNK).max(1);
        let mut tmp = vec![0u8; want];
        let n = self.stream.read(&mut tmp).await?;
        if n == 0 {
            return Err(SessionError::Eof);
        }
        tmp.truncate(n);
        Ok(tmp)
    }

    async fn fill(&mut self) -> SessionResult<()> {
        let mut tmp = [0u8; READ_CHUNK];
        let n = self.stream.read(&mut tmp).await?;
        if n == 0 {
            return Err(SessionError::Eof);
        }
        self.buf.extend_from_slice(&tmp[..n]);
        Ok(())
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol::io::Cursor;

    #[test]
    fn reads_crlf_lines_including_terminator() {
        smol::block_on(async {
            let mut r = LineReader::new(Cursor::new(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec()));
            assert_eq!(r.read_line().await.unwrap(), b"GET / HTTP/1.1\r\n");
            assert_eq!(r.read_line().await.unwrap(), b"Host: x\r\n");
            assert_eq!(r.read_line().await.unwrap(), b"\r\n");
        });
    }

    #[test]
    fn read_line_fails_on_premature_eof() {
        smol::block_on(async {
            let mut r = LineReader::new(Cursor::new(b"no terminator here".to_vec()));
            assert!(matches!(r.read_line().await, Err(SessionError::Eof)));
        });
    }

    #[test]
    fn read_exact_pulls_from_buffer_before_touching_stream_again() {
        smol::block_on(async {
            let mut r = LineReader::new(Cursor::new(b"abcdef".to_vec()));
            assert_eq!(r.read_exact(3).await.unwrap(), b"abc");
            assert_eq!(r.read_exact(3).await.unwrap(), b"def");
        });
    }

    #[test]
    fn read_some_prefers_buffered_bytes() {
        smol::block_on(async {
            let mut r = LineReader::new(Cursor::new(b"GET / HTTP/1.1\r\nrest-of-body".to_vec()));
            let _ = r.read_line().await.unwrap();
            let first = r.read_some(4).await.unwrap();
            assert_eq!(first, b"rest");
        });
    }
}
