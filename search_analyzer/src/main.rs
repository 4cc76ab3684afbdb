use std::{io::Write, process::ExitCode};

use clap::Parser;
use env_logger::{Env, Target};
use log::{error, info};

use search_analyzer::{AnalyzerArgs, run};

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .format(|buf, record| writeln!(buf, "{} {}", buf.timestamp_seconds(), record.args()))
        .init();

    match AnalyzerArgs::parse().into_config().and_then(|config| run(&config)) {
        Ok(table) => {
            info!("{} architectures analyzed", table.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
