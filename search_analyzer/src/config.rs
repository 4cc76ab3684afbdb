use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use clap::{ArgGroup, Parser};
use darts::{DartsErr, NetworkConfig, Profiler, device::accelerator};

use crate::{AnalyzerErr, Result};

/// Command line of the `search_analyzer` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "search_analyzer",
    about = "Tabulates and profiles the architectures of a multi-objective search log"
)]
#[command(group(ArgGroup::new("input").required(true).args(["log", "data"])))]
pub struct AnalyzerArgs {
    /// Multi search stage log.
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Csv table generated by a previous run.
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Output file name.
    #[arg(short, long, default_value = "search_table.csv")]
    pub output: PathBuf,

    /// Accelerator device id used for latency measurements.
    #[arg(long, default_value_t = 0)]
    pub gpu: usize,

    /// Skip accelerator latency measurements.
    #[arg(long)]
    pub no_gpu: bool,

    /// Timed forward passes per latency measurement.
    #[arg(long, default_value = "10")]
    pub latency_runs: NonZeroUsize,
}

/// Where the table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A search log to analyze and profile.
    Log(PathBuf),
    /// A table written by an earlier analysis.
    Table(PathBuf),
}

impl AnalyzerArgs {
    /// Resolves the arguments into a run configuration.
    ///
    /// # Errors
    /// Returns `AnalyzerErr::Config` unless exactly one input was given.
    pub fn into_config(self) -> Result<AnalyzerConfig> {
        let input = match (self.log, self.data) {
            (Some(log), None) => Input::Log(log),
            (None, Some(data)) => Input::Table(data),
            _ => {
                return Err(AnalyzerErr::Config(
                    "exactly one of --log and --data is required".into(),
                ));
            }
        };

        Ok(AnalyzerConfig {
            input,
            output: self.output,
            gpu: (!self.no_gpu).then_some(self.gpu),
            latency_runs: self.latency_runs,
        })
    }
}

/// Validated configuration of an analyzer run.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    input: Input,
    output: PathBuf,
    gpu: Option<usize>,
    latency_runs: NonZeroUsize,
}

impl AnalyzerConfig {
    pub fn new(input: Input, output: PathBuf, gpu: Option<usize>, latency_runs: NonZeroUsize) -> Self {
        Self {
            input,
            output,
            gpu,
            latency_runs,
        }
    }

    #[inline]
    pub fn input(&self) -> &Input {
        &self.input
    }

    #[inline]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The accelerator to measure latency on, `None` if accelerator latency is skipped.
    #[inline]
    pub fn gpu(&self) -> Option<usize> {
        self.gpu
    }

    #[inline]
    pub fn latency_runs(&self) -> NonZeroUsize {
        self.latency_runs
    }

    /// The path of a plot, named after the output file with `suffix` appended.
    pub fn plot_path(&self, suffix: &str) -> PathBuf {
        let mut name = self.output.with_extension("").into_os_string();
        name.push(format!("_{suffix}.png"));
        PathBuf::from(name)
    }

    /// Builds the profiler for the default CIFAR-10 evaluation network.
    ///
    /// # Errors
    /// Returns `DartsErr::NoAccelerator` if accelerator latency is requested but no accelerator
    /// with the configured ordinal exists.
    pub fn profiler(&self) -> Result<Profiler> {
        let accelerator = match self.gpu {
            Some(gpu) => Some(accelerator(gpu).ok_or(DartsErr::NoAccelerator { gpu })?),
            None => None,
        };

        Ok(Profiler::new(
            NetworkConfig::cifar_default(),
            accelerator,
            self.latency_runs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_exactly_one_input() {
        assert!(AnalyzerArgs::try_parse_from(["search_analyzer"]).is_err());
        assert!(
            AnalyzerArgs::try_parse_from(["search_analyzer", "-l", "a.log", "-d", "t.csv"])
                .is_err()
        );

        let config = AnalyzerArgs::try_parse_from(["search_analyzer", "--log", "a.log"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.input(), &Input::Log("a.log".into()));
        assert_eq!(config.output(), Path::new("search_table.csv"));
        assert_eq!(config.gpu(), Some(0));
        assert_eq!(config.latency_runs().get(), 10);
    }

    #[test]
    fn no_gpu_skips_the_accelerator() {
        let config = AnalyzerArgs::try_parse_from(["search_analyzer", "-d", "t.csv", "--no-gpu"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.input(), &Input::Table("t.csv".into()));
        assert_eq!(config.gpu(), None);
        assert!(config.profiler().is_ok());
    }

    #[test]
    fn both_inputs_are_rejected_without_clap() {
        let args = AnalyzerArgs {
            log: Some("a.log".into()),
            data: Some("t.csv".into()),
            output: "out.csv".into(),
            gpu: 0,
            no_gpu: true,
            latency_runs: NonZeroUsize::MIN,
        };
        assert!(matches!(args.into_config(), Err(AnalyzerErr::Config(_))));
    }

    #[test]
    fn rejects_zero_latency_runs() {
        let args = ["search_analyzer", "-l", "a.log", "--latency-runs", "0"];
        assert!(AnalyzerArgs::try_parse_from(args).is_err());
    }

    #[test]
    fn plots_are_named_after_the_output() {
        let config = AnalyzerConfig::new(
            Input::Table("t.csv".into()),
            PathBuf::from("out/search_table.csv"),
            None,
            NonZeroUsize::MIN,
        );
        assert_eq!(
            config.plot_path("correlation_matrix"),
            Path::new("out/search_table_correlation_matrix.png")
        );
    }
}
