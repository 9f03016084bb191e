//! One-way byte pump between two TCP sockets.

use std::net::Shutdown;

use smol::io::AsyncWriteExt;
use smol::net::TcpStream;

use crate::http::LineReader;
use crate::http::line_reader::READ_CHUNK;

/// Repeatedly reads up to 64 KiB from `reader` and writes it verbatim to
/// `writer`. On EOF or write error, shuts down `writer`'s socket and
/// invokes `teardown` exactly once. Never buffers a whole message; each
/// slice is forwarded as soon as it's read.
///
/// `reader` is a [`LineReader`] rather than a bare `TcpStream` so that any
/// bytes already pulled off the wire into its pushback buffer (e.g. TLS
/// bytes that arrived glued to a CONNECT request, or the tail of a request
/// once its policy settles) are drained before the pump issues fresh reads.
pub async fn pump(mut reader: LineReader<TcpStream>, mut writer: TcpStream, teardown: impl FnOnce()) {
    loop {
        let buf = match reader.read_some(READ_CHUNK).await {
            Ok(buf) => buf,
            Err(_) => break,
        };
        if writer.write_all(&buf).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown(Shutdown::Both);
    teardown();
}
