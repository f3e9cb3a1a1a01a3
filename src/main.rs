//! ff CLI entry point

use clap::Parser;
use ff::cli::args::{argv_with_env_options, Cli};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::process;

fn main() {
    let cli = Cli::parse_from(argv_with_env_options());

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("ff: cannot initialize logging: {e}");
    }

    process::exit(ff::cli::run(cli));
}
