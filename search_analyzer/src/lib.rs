pub mod analyze;
pub mod config;
pub mod error;
pub mod history;
pub mod literal;
pub mod pareto;
pub mod plot;
pub mod run;
pub mod table;

pub use analyze::Analyzer;
pub use config::{AnalyzerArgs, AnalyzerConfig, Input};
pub use error::{AnalyzerErr, Result};
pub use history::{HistoryEntry, Metric, Regularization, SearchHistory, parse_log};
pub use run::run;
pub use table::{Column, SearchRow, SearchTable};
