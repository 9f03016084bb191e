//! Connection acceptor loop.

use std::net::SocketAddr;

use anyhow::Result;
use smol::future;
use smol::net::{TcpListener, TcpStream};

use crate::init::shutdown::GracefulShutdown;
use crate::policy::PolicyMap;
use crate::proxy::session::handle_session;

pub async fn serve(bind_addr: &str, shutdown: &GracefulShutdown) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    log::info!("nagato listening on {bind_addr}");

    // One policy map for the life of the process, shared by every session.
    let policy_map = PolicyMap::new();

    loop {
        let Some((stream, peer)) = accept_or_shutdown(&listener, shutdown).await? else {
            break;
        };

        let shutdown = shutdown.clone();
        let policy_map = policy_map.clone();
        smol::spawn(async move {
            let _guard = shutdown.inflight_guard();
            if let Err(err) = handle_session(stream, policy_map).await {
                log::warn!("peer={peer} error: {err}");
            }
        })
        .detach();
    }

    shutdown.wait_inflight_zero().await;
    Ok(())
}

async fn accept_or_shutdown(
    listener: &TcpListener,
    shutdown: &GracefulShutdown,
) -> std::io::Result<Option<(TcpStream, SocketAddr)>> {
    let accept_fut = async { listener.accept().await.map(Some) };
    let shutdown_fut = async {
        shutdown.wait_shutting_down().await;
        Ok(None)
    };
    future::or(accept_fut, shutdown_fut).await
}
