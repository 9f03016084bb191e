//! The upgrading/obfuscating plaintext proxy handler.
//!
//! Runs a request task and a response task over one shared upstream
//! connection for the life of a keep-alive session. The two tasks
//! coordinate through the policy map and a `last_url` cell used for
//! the 307 redirect emitted on a passthrough transition.

use std::net::Shutdown;
use std::sync::{Arc, Mutex};

use smol::io::AsyncWriteExt;
use smol::net::TcpStream;

use crate::error::{SessionError, SessionResult};
use crate::http::{ChunkMarker, HeaderEvent, HttpMessage, LineReader};
use crate::obfuscate::{random_delay_ms, random_split, random_token};
use crate::policy::{Policy, PolicyMap};
use crate::proxy::url::parse_absolute_url;

const PROXY_AGENT_HEADER: &str = concat!("Proxy-Agent: Nagato/", env!("CARGO_PKG_VERSION"));

/// `(method, raw_url, version)`, as read by the caller to decide between
/// the CONNECT and plaintext paths.
pub type RequestLine = (String, String, String);

pub async fn handle_plaintext(
    client_reader: LineReader<TcpStream>,
    mut client_writer: TcpStream,
    first_request: RequestLine,
    policy_map: PolicyMap,
) -> SessionResult<()> {
    let origin = parse_absolute_url(&first_request.1)?.origin();
    let (host, port) = {
        let parsed = parse_absolute_url(&first_request.1)?;
        (parsed.host, parsed.port)
    };

    let upstream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(s) => s,
        Err(e) => {
            let version = &first_request.2;
            let body = format!(
                "{version} 504 Gateway Timeout\r\n{PROXY_AGENT_HEADER}\r\nConnection: close\r\n\r\n"
            );
            let _ = client_writer.write_all(body.as_bytes()).await;
            let _ = client_writer.shutdown(Shutdown::Both);
            return Err(SessionError::UpstreamConnect(e));
        }
    };

    let last_url = Arc::new(Mutex::new(first_request.1.clone()));

    let upstream_writer = upstream.clone();
    let upstream_reader = LineReader::new(upstream.clone());

    let request = smol::spawn(request_task(
        client_reader,
        upstream_writer,
        policy_map.clone(),
        origin.clone(),
        last_url.clone(),
        Some(first_request),
    ));
    let response = smol::spawn(response_task(
        upstream_reader,
        client_writer,
        policy_map,
        origin,
        last_url,
    ));

    request.await;
    match response.await {
        Ok(()) => Ok(()),
        Err(e) if !e.is_terminal() => Ok(()),
        Err(e) => Err(e),
    }
}

async fn request_task(
    client_reader: LineReader<TcpStream>,
    mut upstream_writer: TcpStream,
    policy_map: PolicyMap,
    origin: String,
    last_url: Arc<Mutex<String>>,
    mut pending_first: Option<RequestLine>,
) {
    let mut reader_slot = Some(client_reader);

    loop {
        let mut message: HttpMessage<TcpStream, TcpStream> = HttpMessage::new(
            reader_slot.take().expect("reader returned at end of each iteration"),
            None,
        );

        let (method, url, version) = match pending_first.take() {
            Some(line) => line,
            None => match message.request_line().await {
                Ok(line) => line,
                Err(_) => break,
            },
        };

        *last_url.lock().expect("last_url mutex poisoned") = url.clone();

        let policy = policy_map.get_or_upgrade(&origin);
        let request_line_out = match policy {
            Policy::Upgrade => {
                let upgraded = upgrade_scheme(&url);
                format!("{method} {upgraded} {version}\r\n")
            }
            Policy::Passthrough => {
                let origin_form = origin_form_path(&url);
                format!("{method} {origin_form} {version}\r\n")
            }
        };
        if upstream_writer
            .write_all(request_line_out.as_bytes())
            .await
            .is_err()
        {
            break;
        }

        if policy == Policy::Passthrough {
            let mut dummy = String::new();
            for _ in 0..8 {
                dummy.push_str(&format!(
                    "X-{}: {}\r\n",
                    random_token(16),
                    random_token(128)
                ));
            }
            if upstream_writer.write_all(dummy.as_bytes()).await.is_err() {
                break;
            }
            if upstream_writer.flush().await.is_err() {
                break;
            }
        }

        let mut captured_host: Option<String> = None;
        loop {
            match message.next_header_field().await {
                Ok(Some(HeaderEvent::Field(name, value))) => {
                    if name.eq_ignore_ascii_case("Host") {
                        captured_host = Some(value);
                        continue;
                    }
                    let out_name = if name.eq_ignore_ascii_case("Proxy-Connection") {
                        "Connection".to_string()
                    } else {
                        name
                    };
                    let field = format!("{out_name}: {value}\r\n");
                    if upstream_writer.write_all(field.as_bytes()).await.is_err() {
                        return;
                    }
                }
                Ok(Some(HeaderEvent::End)) => break,
                Ok(None) => break,
                Err(_) => {
                    return;
                }
            }
        }

        let send_host_line = policy == Policy::Passthrough || captured_host.is_some();
        if send_host_line {
            let host_value = captured_host.unwrap_or_else(|| origin.clone());
            let host_line = format!("hoSt:{host_value}\r\n");
            let bytes = host_line.into_bytes();
            let head_len = bytes.len().min(2);
            let (head, rest) = bytes.split_at(head_len);
            if upstream_writer.write_all(head).await.is_err() || upstream_writer.flush().await.is_err() {
                return;
            }
            for segment in random_split(rest, 6) {
                if upstream_writer.write_all(&segment).await.is_err() {
                    return;
                }
                if upstream_writer.flush().await.is_err() {
                    return;
                }
                smol::Timer::after(std::time::Duration::from_millis(random_delay_ms())).await;
            }
        }

        if upstream_writer.write_all(b"\r\n").await.is_err() {
            return;
        }

        // Chunk-size lines and trailing CRLFs must reach upstream verbatim
        // (they were discarded by the no-tee header loop above), so the tee
        // is only switched on now, the same way the response side does it.
        message.set_tee(Some(upstream_writer.clone()));

        loop {
            match message.next_chunk_marker().await {
                Ok(Some(ChunkMarker::Length(_))) => {
                    if message.tunnel_chunk(&mut upstream_writer).await.is_err() {
                        return;
                    }
                }
                Ok(Some(ChunkMarker::Line(_))) => {}
                Ok(None) => break,
                Err(_) => {
                    return;
                }
            }
        }

        reader_slot = Some(message.into_reader());
    }

    let _ = upstream_writer.shutdown(Shutdown::Both);
}

async fn response_task(
    upstream_reader: LineReader<TcpStream>,
    client_writer: TcpStream,
    policy_map: PolicyMap,
    origin: String,
    last_url: Arc<Mutex<String>>,
) -> SessionResult<()> {
    let mut upstream_reader = upstream_reader;
    let mut client_writer = client_writer;

    loop {
        if policy_map.get(&origin).is_some() {
            break;
        }

        let mut message: HttpMessage<TcpStream, TcpStream> = HttpMessage::new(upstream_reader, None);

        let (version, status, reason) = match message.status_line().await {
            Ok(line) => line,
            Err(e) => {
                let _ = client_writer.shutdown(Shutdown::Both);
                return Err(e);
            }
        };

        let is_upgrade = (200..300).contains(&status) || status == 304;
        let is_passthrough = (400..600).contains(&status) && status != 503;

        if is_passthrough {
            policy_map.set(&origin, Policy::Passthrough);
            let location = last_url.lock().expect("last_url mutex poisoned").clone();
            let redirect = format!(
                "{version} 307 Temporary Redirect\r\nLocation: {location}\r\n{PROXY_AGENT_HEADER}\r\nConnection: close\r\n\r\n"
            );
            let _ = client_writer.write_all(redirect.as_bytes()).await;
            let _ = client_writer.shutdown(Shutdown::Both);
            // Not a failure: this is the control signal that unwinds the
            // session once a passthrough transition has replaced the
            // response with a redirect.
            return Err(SessionError::PolicySwitch);
        }

        if is_upgrade {
            policy_map.set(&origin, Policy::Upgrade);
        }

        let status_line_out = format!("{version} {status} {reason}\r\n");
        if let Err(e) = client_writer.write_all(status_line_out.as_bytes()).await {
            return Err(e.into());
        }
        message.set_tee(Some(client_writer.clone()));

        loop {
            match message.next_header_field().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    let _ = client_writer.shutdown(Shutdown::Both);
                    return Err(e);
                }
            }
        }

        loop {
            match message.next_chunk_marker().await {
                Ok(Some(ChunkMarker::Length(_))) => {
                    let mut sink = client_writer.clone();
                    if let Err(e) = message.tunnel_chunk(&mut sink).await {
                        let _ = client_writer.shutdown(Shutdown::Both);
                        return Err(e);
                    }
                }
                Ok(Some(ChunkMarker::Line(_))) => {}
                Ok(None) => break,
                Err(e) => {
                    let _ = client_writer.shutdown(Shutdown::Both);
                    return Err(e);
                }
            }
        }

        upstream_reader = message.into_reader();
    }

    crate::proxy::pump::pump(upstream_reader, client_writer, || {}).await;
    Ok(())
}

fn upgrade_scheme(raw_url: &str) -> String {
    match raw_url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => raw_url.to_string(),
    }
}

fn origin_form_path(raw_url: &str) -> String {
    match parse_absolute_url(raw_url) {
        Ok(parsed) => parsed.path_and_query,
        Err(_) => raw_url.to_string(),
    }
}
