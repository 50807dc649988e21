pub use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sealbridge")]
#[command(about = "Encrypt, publish and release policy-gated blobs")]
pub struct Args {
    /// Log level: trace, debug, info, warn or error. `RUST_LOG` refines it.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: crate::Command,
}
