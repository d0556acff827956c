use anyhow::Result;
use clap::Parser;

use pumpctl::{cli, logging, pump};

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init_logging(args.log_format, args.log_level);
    match args.cmd {
        cli::Cmd::Status(opts) => pump::status(opts),
        cli::Cmd::Set(opts) => pump::set(opts),
        cli::Cmd::Run(opts) => pump::run(opts),
        cli::Cmd::Stop(opts) => pump::stop(opts),
        cli::Cmd::Watch(opts) => pump::watch(opts),
    }
}
