//! pinpoint CLI binary.

use std::io::Write;

use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use pinpoint::cli::{execute_command, PinpointArgs};

fn main() {
    let args = PinpointArgs::parse();

    let log_level = if args.trace {
        LevelFilter::Trace
    } else if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    execute_command(args);
}
