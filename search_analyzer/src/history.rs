//! Extraction of the search history a multi-objective search run prints in its log.

use std::fmt::{self, Display};

use darts::{Edge, Genotype};
use log::debug;

use crate::{
    AnalyzerErr, Result,
    literal::{self, Literal},
};

const REGULARIZATION_MARKER: &str = "Selected regularization";
const HISTORY_MARKER: &str = "hist = ";
const GENOTYPE_KEY: &str = "genotype";

/// The model size regularization a search ran with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regularization {
    L1,
    L2,
}

impl Regularization {
    /// The key of this regularization in the history dict.
    pub fn key(&self) -> &'static str {
        match self {
            Regularization::L1 => "l1",
            Regularization::L2 => "l2",
        }
    }

    /// Decodes the regularization from the text following the log marker. `l1` wins when
    /// both names appear.
    fn decode(text: &str) -> Result<Self> {
        if text.contains(Regularization::L1.key()) {
            Ok(Regularization::L1)
        } else if text.contains(Regularization::L2.key()) {
            Ok(Regularization::L2)
        } else {
            Err(AnalyzerErr::UnknownRegularization(text.trim().to_string()))
        }
    }
}

impl Display for Regularization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A scalar a search records for each weight setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    ModelSize,
    TrainAcc,
    ValidAcc,
    CriterionLoss,
    RegLoss,
}

impl Metric {
    /// The order metrics take in the output table.
    pub const TABLE_ORDER: [Metric; 5] = [
        Metric::ModelSize,
        Metric::TrainAcc,
        Metric::ValidAcc,
        Metric::CriterionLoss,
        Metric::RegLoss,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Metric::ModelSize => "model_size",
            Metric::TrainAcc => "train_acc",
            Metric::ValidAcc => "valid_acc",
            Metric::CriterionLoss => "criterion_loss",
            Metric::RegLoss => "reg_loss",
        }
    }
}

/// The outcome of searching with one regularization weight setting.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    weights: Vec<f64>,
    result: Literal,
}

impl HistoryEntry {
    pub fn new(weights: Vec<f64>, result: Literal) -> Self {
        Self { weights, result }
    }

    /// The regularization weights, first one being the size weight.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// The recorded value of a metric, if present and numeric.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.result.get(metric.key()).and_then(Literal::as_f64)
    }

    /// Rebuilds the architecture the search selected for this weight setting.
    ///
    /// # Errors
    /// Returns `AnalyzerErr::Schema` if the entry has no genotype record or it is malformed,
    /// and `AnalyzerErr::Darts` if its topology is invalid.
    pub fn genotype(&self) -> Result<Genotype> {
        let record = match self.result.get(GENOTYPE_KEY) {
            Some(record @ Literal::Genotype(_)) => record,
            Some(_) => return Err(AnalyzerErr::Schema("genotype is not a record".into())),
            None => return Err(AnalyzerErr::Schema("entry has no genotype".into())),
        };

        let field = |name: &str| {
            record
                .get(name)
                .ok_or_else(|| AnalyzerErr::Schema(format!("genotype has no '{name}' field")))
        };

        Ok(Genotype::new(
            edges(field("normal")?)?,
            indices(field("normal_concat")?)?,
            edges(field("reduce")?)?,
            indices(field("reduce_concat")?)?,
        )?)
    }
}

fn index(value: &Literal) -> Result<usize> {
    match value.as_f64() {
        Some(n) if n >= 0. && n.fract() == 0. => Ok(n as usize),
        _ => Err(AnalyzerErr::Schema(format!(
            "expected a state index, found {value:?}"
        ))),
    }
}

fn indices(value: &Literal) -> Result<Vec<usize>> {
    value
        .as_items()
        .ok_or_else(|| AnalyzerErr::Schema(format!("expected a list of indices, found {value:?}")))?
        .iter()
        .map(index)
        .collect()
}

fn edges(value: &Literal) -> Result<Vec<Edge>> {
    let items = value
        .as_items()
        .ok_or_else(|| AnalyzerErr::Schema(format!("expected a list of edges, found {value:?}")))?;

    items
        .iter()
        .map(|edge| -> Result<Edge> {
            match edge.as_items() {
                Some([op, state]) => {
                    let op = op.as_str().ok_or_else(|| {
                        AnalyzerErr::Schema(format!("expected an op name, found {op:?}"))
                    })?;
                    Ok((op.parse()?, index(state)?))
                }
                _ => Err(AnalyzerErr::Schema(format!(
                    "expected an (op, state) pair, found {edge:?}"
                ))),
            }
        })
        .collect()
}

/// Every weight setting a search tried, under the regularization it selected.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHistory {
    pub regularization: Regularization,
    pub entries: Vec<HistoryEntry>,
}

/// Reads the search history out of a search log.
///
/// The regularization comes from the first line mentioning it and the history from the last
/// `hist = ` line, since the search reprints the whole history after every stage.
///
/// # Errors
/// Returns an error if either marker is missing, the regularization can't be decoded, or the
/// history text isn't a well-formed dict holding the selected regularization.
pub fn parse_log(text: &str) -> Result<SearchHistory> {
    let regularization = text
        .lines()
        .find_map(|line| line.split_once(REGULARIZATION_MARKER))
        .ok_or(AnalyzerErr::MissingMarker(REGULARIZATION_MARKER))
        .and_then(|(_, rest)| Regularization::decode(rest))?;

    let (_, hist) = text
        .lines()
        .filter_map(|line| line.split_once(HISTORY_MARKER))
        .next_back()
        .ok_or(AnalyzerErr::MissingMarker(HISTORY_MARKER))?;

    let hist = literal::parse(hist)?;
    let runs = hist
        .get(regularization.key())
        .and_then(Literal::as_dict)
        .ok_or_else(|| {
            AnalyzerErr::Schema(format!("history has no '{regularization}' dict"))
        })?;

    let entries = runs
        .iter()
        .map(|(key, result)| -> Result<HistoryEntry> {
            Ok(HistoryEntry::new(weight_key(key)?, result.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    debug!("{} history entries under {regularization}", entries.len());
    Ok(SearchHistory {
        regularization,
        entries,
    })
}

fn weight_key(key: &Literal) -> Result<Vec<f64>> {
    let weights = match key {
        Literal::Number(w) => vec![*w],
        _ => key
            .as_items()
            .and_then(|items| items.iter().map(Literal::as_f64).collect::<Option<Vec<_>>>())
            .ok_or_else(|| AnalyzerErr::Schema(format!("invalid weight key {key:?}")))?,
    };

    if weights.is_empty() {
        return Err(AnalyzerErr::Schema("empty weight key".into()));
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use darts::Op;

    use super::*;

    const GENOTYPE: &str = "Genotype(normal=[('sep_conv_3x3', 0), ('skip_connect', 1)], \
        normal_concat=range(2, 3), reduce=[('max_pool_3x3', 0), ('dil_conv_5x5', 1)], \
        reduce_concat=range(2, 3))";

    fn log(reg_line: &str, hist_lines: &[&str]) -> String {
        let mut text = String::from("2024-01-01 args = Namespace(...)\n");
        text.push_str(reg_line);
        text.push('\n');
        for line in hist_lines {
            text.push_str("2024-01-01 stage done\n");
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    #[test]
    fn decodes_regularization() {
        let hist = "hist = {'l1': {}, 'l2': {}}";
        let l1 = parse_log(&log("Selected regularization l1", &[hist])).unwrap();
        assert_eq!(l1.regularization, Regularization::L1);

        let l2 = parse_log(&log("Selected regularization: 'l2'", &[hist])).unwrap();
        assert_eq!(l2.regularization, Regularization::L2);

        let both = parse_log(&log("Selected regularization l2 then l1", &[hist])).unwrap();
        assert_eq!(both.regularization, Regularization::L1);

        let err = parse_log(&log("Selected regularization size", &[hist])).unwrap_err();
        assert!(matches!(err, AnalyzerErr::UnknownRegularization(_)));
    }

    #[test]
    fn uses_the_last_history_line() {
        let text = log(
            "Selected regularization l2",
            &[
                "hist = {'l2': {(0.1,): {'valid_acc': 1.0}}}",
                "hist = {'l2': {(0.1,): {'valid_acc': 1.0}, (0.2, 0.8): {'valid_acc': 2.0}}}",
            ],
        );

        let history = parse_log(&text).unwrap();
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.entries[1].weights(), [0.2, 0.8]);
        assert_eq!(history.entries[1].metric(Metric::ValidAcc), Some(2.));
        assert_eq!(history.entries[1].metric(Metric::TrainAcc), None);
    }

    #[test]
    fn missing_markers_are_errors() {
        let err = parse_log("hist = {}\n").unwrap_err();
        assert!(matches!(err, AnalyzerErr::MissingMarker(REGULARIZATION_MARKER)));

        let err = parse_log("Selected regularization l1\n").unwrap_err();
        assert!(matches!(err, AnalyzerErr::MissingMarker(HISTORY_MARKER)));
    }

    #[test]
    fn malformed_history_is_an_error() {
        let text = log("Selected regularization l1", &["hist = {'l1': {(0.5,): "]);
        assert!(matches!(parse_log(&text), Err(AnalyzerErr::Parse { .. })));

        let text = log("Selected regularization l1", &["hist = {'l2': {}}"]);
        assert!(matches!(parse_log(&text), Err(AnalyzerErr::Schema(_))));
    }

    #[test]
    fn rebuilds_genotypes() {
        let line = format!("hist = {{'l1': {{(0.5, 0.5): {{'genotype': {GENOTYPE}}}}}}}");
        let history = parse_log(&log("Selected regularization l1", &[&line])).unwrap();

        let genotype = history.entries[0].genotype().unwrap();
        assert_eq!(genotype.normal(), [(Op::SepConv3x3, 0), (Op::SkipConnect, 1)]);
        assert_eq!(genotype.reduce()[1], (Op::DilConv5x5, 1));
        assert_eq!(genotype.reduce_concat(), [2]);
    }

    #[test]
    fn invalid_genotypes_are_errors() {
        let entry = HistoryEntry::new(vec![0.5], literal::parse("{'valid_acc': 3.0}").unwrap());
        assert!(matches!(entry.genotype(), Err(AnalyzerErr::Schema(_))));

        let bad_op = GENOTYPE.replace("sep_conv_3x3", "conv_9x9");
        let result = literal::parse(&format!("{{'genotype': {bad_op}}}")).unwrap();
        let entry = HistoryEntry::new(vec![0.5], result);
        assert!(matches!(entry.genotype(), Err(AnalyzerErr::Darts(_))));
    }
}
