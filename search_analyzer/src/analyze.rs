use darts::Profiler;
use log::{error, info};

use crate::{
    Result,
    history::{HistoryEntry, Metric, Regularization, SearchHistory},
    pareto::pareto_front,
    table::{SearchRow, SearchTable},
};

/// Formats a weight the way the search names its runs: always with a fractional part, and in
/// scientific notation with a two digit exponent for very small or very large magnitudes.
pub fn format_weight(w: f64) -> String {
    if w.is_nan() {
        return "nan".to_string();
    }
    if w.is_infinite() {
        return if w > 0. { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = w.abs();
    if magnitude != 0. && !(1e-4..1e16).contains(&magnitude) {
        let sci = format!("{w:e}");
        return match sci.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exp),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => sci,
        };
    }

    if w.fract() == 0. {
        format!("{w:.1}")
    } else {
        format!("{w}")
    }
}

/// The name of the run that searched with the given weights, e.g. `l1_0.5_0.5`.
pub fn entry_name(regularization: Regularization, weights: &[f64]) -> String {
    let mut name = regularization.key().to_string();
    for &w in weights {
        name.push('_');
        name.push_str(&format_weight(w));
    }
    name
}

/// Reads the search metrics in table order. Extraction stops at the first missing metric and
/// the remaining ones are left absent.
pub fn search_metrics(entry: &HistoryEntry, name: &str) -> [Option<f64>; 5] {
    let mut values = [None; 5];
    for (value, metric) in values.iter_mut().zip(Metric::TABLE_ORDER) {
        match entry.metric(metric) {
            Some(v) => *value = Some(v),
            None => {
                error!("missing '{}' while processing {name}", metric.key());
                break;
            }
        }
    }
    values
}

/// Turns a search history into the table of its Pareto-optimal architectures.
#[derive(Debug, Clone)]
pub struct Analyzer {
    profiler: Profiler,
}

impl Analyzer {
    pub fn new(profiler: Profiler) -> Self {
        Self { profiler }
    }

    /// Filters out dominated entries, then extracts and profiles the remaining ones.
    ///
    /// # Errors
    /// Returns the first profiling error; an entry without a valid genotype aborts the
    /// analysis, unlike an entry with missing metrics.
    pub fn analyze(&self, history: SearchHistory) -> Result<SearchTable> {
        let regularization = history.regularization;
        let rows = pareto_front(history.entries)
            .iter()
            .map(|entry| self.row(regularization, entry))
            .collect::<Result<Vec<_>>>()?;

        Ok(SearchTable::new(rows))
    }

    fn row(&self, regularization: Regularization, entry: &HistoryEntry) -> Result<SearchRow> {
        let name = entry_name(regularization, entry.weights());
        let [params, train_acc, valid_acc, criterion_loss, reg_loss] = search_metrics(entry, &name);

        let profile = entry
            .genotype()
            .and_then(|genotype| Ok(self.profiler.profile(&genotype)?))
            .inspect_err(|e| error!("error '{e}' while profiling {name}"))?;

        info!(
            "{name} params = {:.6}M, flops = {:.2}M, latency cpu = {:.3}ms",
            profile.parameters, profile.flops, profile.latency_cpu
        );

        Ok(SearchRow {
            weight: entry.weights()[0],
            name,
            params,
            train_acc,
            valid_acc,
            criterion_loss,
            reg_loss,
            parameters: Some(profile.parameters),
            flops: Some(profile.flops),
            latency_gpu: profile.latency_gpu,
            latency_cpu: Some(profile.latency_cpu),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal;

    #[test]
    fn weights_format_like_the_search_names_them() {
        assert_eq!(format_weight(0.5), "0.5");
        assert_eq!(format_weight(1.), "1.0");
        assert_eq!(format_weight(0.), "0.0");
        assert_eq!(format_weight(0.0001), "0.0001");
        assert_eq!(format_weight(1e-5), "1e-05");
        assert_eq!(format_weight(2.5e-7), "2.5e-07");
        assert_eq!(format_weight(1e20), "1e+20");
        assert_eq!(format_weight(-0.25), "-0.25");
    }

    #[test]
    fn names_join_every_weight() {
        assert_eq!(entry_name(Regularization::L1, &[0.5, 0.5]), "l1_0.5_0.5");
        assert_eq!(entry_name(Regularization::L2, &[0.9]), "l2_0.9");
    }

    #[test]
    fn extraction_stops_at_the_first_missing_metric() {
        let result = literal::parse(
            "{'model_size': 1.8, 'train_acc': 25.0, 'criterion_loss': 1.9, 'reg_loss': 16.0}",
        )
        .unwrap();
        let entry = HistoryEntry::new(vec![0.5], result);

        assert_eq!(
            search_metrics(&entry, "l1_0.5"),
            [Some(1.8), Some(25.), None, None, None]
        );
    }

    #[test]
    fn complete_entries_extract_every_metric() {
        let result = literal::parse(
            "{'train_acc': 25.0, 'valid_acc': 20.0, 'reg_loss': 16.0, 'criterion_loss': 1.9, \
             'model_size': 1.8}",
        )
        .unwrap();
        let entry = HistoryEntry::new(vec![0.5], result);

        assert_eq!(
            search_metrics(&entry, "l1_0.5"),
            [Some(1.8), Some(25.), Some(20.), Some(1.9), Some(16.)]
        );
    }
}
