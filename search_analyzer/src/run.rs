use std::fs;

use log::info;

use crate::{
    AnalyzerErr, Result,
    analyze::Analyzer,
    config::{AnalyzerConfig, Input},
    history::parse_log,
    plot::{plot_columns, plot_correlation},
    table::{Column, SearchTable},
};

/// Builds the search table, from a log or a previous table, prints it and plots it.
///
/// # Errors
/// Returns the first error reading the input, profiling an architecture, or writing the table
/// and the plots.
pub fn run(config: &AnalyzerConfig) -> Result<SearchTable> {
    let table = match config.input() {
        Input::Log(path) => {
            let text = fs::read_to_string(path).map_err(|source| AnalyzerErr::Io {
                path: path.clone(),
                source,
            })?;
            let history = parse_log(&text)?;
            info!(
                "{} search entries with {} regularization",
                history.entries.len(),
                history.regularization
            );

            let table = Analyzer::new(config.profiler()?).analyze(history)?;
            print!("{table}");
            table.write_csv(config.output())?;
            info!("table written to {}", config.output().display());
            table
        }
        Input::Table(path) => {
            let table = SearchTable::read_csv(path)?;
            print!("{table}");
            table
        }
    };

    plot(&table, config)?;
    Ok(table)
}

/// Writes the loss trade-off, the weight response and the correlation plots of a table.
///
/// # Errors
/// Returns `AnalyzerErr::Plot` if any chart can't be drawn or saved.
pub fn plot(table: &SearchTable, config: &AnalyzerConfig) -> Result<()> {
    plot_columns(
        table,
        Column::RegLoss,
        Column::CriterionLoss,
        &config.plot_path("crit_vs_reg_loss"),
    )?;
    plot_columns(
        table,
        Column::Weight,
        Column::ValidAcc,
        &config.plot_path("weight_vs_valid_acc"),
    )?;
    plot_correlation(table, &config.plot_path("correlation_matrix"))
}
