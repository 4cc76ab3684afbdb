use std::{io::Write, process::ExitCode};

use clap::Parser;
use env_logger::{Env, Target};
use log::error;

use ensemble::{EnsembleArgs, run};

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .format(|buf, record| writeln!(buf, "{} {}", buf.timestamp_seconds(), record.args()))
        .init();

    let args = EnsembleArgs::parse();
    match args.into_config().and_then(|config| run(&config)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
