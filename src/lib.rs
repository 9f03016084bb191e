use anyhow::Result;

pub mod cmd;
pub mod error;
pub mod http;
pub mod init;
pub mod obfuscate;
pub mod policy;
pub mod proxy;

pub async fn run() -> Result<()> {
    let args = init::init()?;
    let shutdown = init::shutdown::init()?;

    log::info!("nagato {} starting", env!("CARGO_PKG_VERSION"));
    proxy::acceptor::serve(&args.bind_addr(), &shutdown).await?;
    log::info!("shutdown complete");
    Ok(())
}
