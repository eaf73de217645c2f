//! treesync: incremental, manifest-aware directory sync.
//!
//! # Usage
//!
//! ```text
//! treesync -f <source> -t <destination> -n <next-manifest> [-p <previous-manifest>]
//! treesync -f <source> -t <destination> -x [--what-if]
//! treesync --config treesync.yaml [-q | -v <lines>] [--perf] [--json]
//! ```

mod commands;
mod console;

use anyhow::Result;
use clap::Parser;

use commands::sync::SyncArgs;

#[derive(Parser, Debug)]
#[command(
    name = "treesync",
    version,
    about = "Mirror a build output onto a deployment directory, touching only what changed",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    sync: SyncArgs,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    cli.sync.run()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
