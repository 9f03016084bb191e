use clap::Parser;

/// Command-line surface, built on `clap`'s derive API (see DESIGN.md for
/// the rationale).
#[derive(Debug, Parser)]
#[command(name = "nagato", version, about = "HTTP-to-HTTPS upgrading, SNI-obfuscating forward proxy")]
pub struct Args {
    /// Host/interface to bind.
    #[arg(short = 'H', long, default_value = "localhost")]
    pub host: String,

    /// Port to bind.
    #[arg(short = 'p', long, default_value_t = 8080)]
    pub port: u16,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
