use anyhow::Result;
use clap::Parser;

use threadline::{cli::Cli, runtime::Runner, utils::init_logger};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_logger(cli.verbose);

    Runner::new(cli).run().await
}
