use std::io;

use anyhow::Result;
use clap::Parser;
use wire_tape::logging::init_logging;
use wire_tape::RecorderConfig;
use wire_tape_cli::commands::{run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RecorderConfig::from_env();
    init_logging(cli.log.as_deref().or(config.log_filter.as_deref()));

    let stdout = io::stdout();
    run(cli, &config, &mut stdout.lock())
}
