//! Per-connection dispatch: reads the first request line and routes to
//! either the CONNECT tunnel handler or the plaintext handler.

use smol::io::Cursor;
use smol::net::TcpStream;

use crate::error::SessionResult;
use crate::http::{HttpMessage, LineReader};
use crate::policy::PolicyMap;
use crate::proxy::connect::handle_connect;
use crate::proxy::plaintext::handle_plaintext;
use crate::proxy::url::parse_authority;

pub async fn handle_session(client: TcpStream, policy_map: PolicyMap) -> SessionResult<()> {
    let client_writer = client.clone();
    let client_reader = LineReader::new(client);

    let mut message: HttpMessage<TcpStream, Cursor<Vec<u8>>> =
        HttpMessage::new(client_reader, None);
    let (method, url, version) = message.request_line().await?;

    if method.eq_ignore_ascii_case("CONNECT") {
        // Drain the CONNECT request's header block before handing the raw
        // socket off to the tunnel; those header lines must not leak into
        // the tunnel as opaque bytes.
        while message.next_header_field().await?.is_some() {}
        let (host, port) = parse_authority(&url)?;
        let client_reader = message.into_reader();
        return handle_connect(client_reader, client_writer, &host, port, &version).await;
    }

    let client_reader = message.into_reader();
    handle_plaintext(client_reader, client_writer, (method, url, version), policy_map).await
}
