pub mod logger;
pub mod shutdown;

use anyhow::Result;

use crate::cmd::Args;

/// Parses arguments and wires the logger before anything else runs.
pub fn init() -> Result<Args> {
    let args = <Args as clap::Parser>::parse();
    logger::init(logger::level_for_verbosity(args.verbose), true)?;
    log::debug!("{args:?}");
    Ok(args)
}
