//! CONNECT tunnel handling.
//!
//! Establishes an upstream TCP connection for the `CONNECT host:port`
//! target, answers the client with `200 Connection Established`, then
//! splits the very first bytes of the tunnel (the TLS ClientHello) across
//! two upstream writes so the SNI does not sit whole in one TCP segment.

use std::net::Shutdown;

use smol::io::AsyncWriteExt;
use smol::net::TcpStream;

use crate::error::{SessionError, SessionResult};
use crate::http::LineReader;
use crate::proxy::pump::pump;

const PROXY_AGENT_HEADER: &str = concat!("Proxy-Agent: Nagato/", env!("CARGO_PKG_VERSION"));

/// A ClientHello record longer than this is split at a 5+85 byte boundary.
const SPLIT_THRESHOLD: usize = 85;
const SPLIT_HEAD: usize = 5;

pub async fn handle_connect(
    mut client_reader: LineReader<TcpStream>,
    mut client_writer: TcpStream,
    host: &str,
    port: u16,
    version: &str,
) -> SessionResult<()> {
    let upstream = match TcpStream::connect((host, port)).await {
        Ok(s) => s,
        Err(e) => {
            let body = format!(
                "{version} 504 Gateway Timeout\r\n{PROXY_AGENT_HEADER}\r\nConnection: close\r\n\r\n"
            );
            let _ = client_writer.write_all(body.as_bytes()).await;
            let _ = client_writer.shutdown(Shutdown::Both);
            return Err(SessionError::UpstreamConnect(e));
        }
    };

    let ok = format!("{version} 200 Connection Established\r\n{PROXY_AGENT_HEADER}\r\n\r\n");
    client_writer.write_all(ok.as_bytes()).await?;

    let mut upstream_writer = upstream.clone();
    match client_reader.read_exact(SPLIT_HEAD).await {
        Ok(head) => {
            upstream_writer.write_all(&head).await?;
            if needs_hello_split(&head) {
                upstream_writer.flush().await?;
                if let Ok(rest) = client_reader.read_exact(SPLIT_THRESHOLD).await {
                    upstream_writer.write_all(&rest).await?;
                    upstream_writer.flush().await?;
                }
            }
        }
        Err(_) => return Ok(()),
    }

    let upstream_reader_sock = upstream.clone();
    let client_writer_for_upstream = client_writer.clone();
    let upstream_writer_for_teardown = upstream.clone();
    let client_writer_for_teardown = client_writer.clone();

    let client_to_upstream = smol::spawn(pump(client_reader, upstream_writer, move || {
        let _ = upstream_writer_for_teardown.shutdown(Shutdown::Both);
    }));
    let upstream_to_client = smol::spawn(pump(
        LineReader::new(upstream_reader_sock),
        client_writer_for_upstream,
        move || {
            let _ = client_writer_for_teardown.shutdown(Shutdown::Both);
        },
    ));

    client_to_upstream.await;
    upstream_to_client.await;
    Ok(())
}

/// `head` is exactly the first 5 bytes read off the tunnel. True when it
/// looks like a TLS 1.0 handshake record header whose declared length
/// exceeds [`SPLIT_THRESHOLD`], meaning the SNI extension likely lands
/// past the first 90 bytes of the ClientHello.
fn needs_hello_split(head: &[u8]) -> bool {
    if head.len() < SPLIT_HEAD {
        return false;
    }
    let is_tls_hello = head[0] == 0x16 && head[1] == 0x03 && head[2] == 0x01;
    let record_len = u16::from_be_bytes([head[3], head[4]]) as usize;
    is_tls_hello && record_len > SPLIT_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_hello_over_threshold_needs_split() {
        assert!(needs_hello_split(&[0x16, 0x03, 0x01, 0x00, 0xC4]));
    }

    #[test]
    fn tls_hello_under_threshold_does_not_split() {
        assert!(!needs_hello_split(&[0x16, 0x03, 0x01, 0x00, 0x10]));
    }

    #[test]
    fn non_tls_bytes_never_split() {
        assert!(!needs_hello_split(b"GET /x"));
    }
}
