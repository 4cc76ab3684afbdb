use log::info;

use crate::history::{HistoryEntry, Metric};

/// Whether `other` reaches a strictly higher validation accuracy with a strictly smaller model.
fn dominates(other: &HistoryEntry, entry: &HistoryEntry) -> bool {
    let metrics = |e: &HistoryEntry| -> Option<(f64, f64)> {
        Some((e.metric(Metric::ValidAcc)?, e.metric(Metric::ModelSize)?))
    };

    match (metrics(other), metrics(entry)) {
        (Some((other_acc, other_size)), Some((acc, size))) => other_acc > acc && other_size < size,
        _ => false,
    }
}

/// Keeps the entries no other entry dominates, in their original order.
///
/// Entries missing the validation accuracy or the model size are never removed.
pub fn pareto_front(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let total = entries.len();
    let keep: Vec<bool> = entries
        .iter()
        .map(|entry| !entries.iter().any(|other| dominates(other, entry)))
        .collect();

    let front: Vec<_> = entries
        .into_iter()
        .zip(keep)
        .filter_map(|(entry, keep)| keep.then_some(entry))
        .collect();

    info!("removed {} non-optimal samples", total - front.len());
    front
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal;

    fn entry(weight: f64, result: &str) -> HistoryEntry {
        HistoryEntry::new(vec![weight], literal::parse(result).unwrap())
    }

    fn weights(entries: &[HistoryEntry]) -> Vec<f64> {
        entries.iter().map(|e| e.weights()[0]).collect()
    }

    #[test]
    fn removes_strictly_dominated_entries() {
        let entries = vec![
            entry(0.1, "{'valid_acc': 90.0, 'model_size': 3.0}"),
            entry(0.2, "{'valid_acc': 85.0, 'model_size': 2.0}"),
            entry(0.3, "{'valid_acc': 80.0, 'model_size': 2.5}"),
            entry(0.4, "{'valid_acc': 95.0, 'model_size': 3.5}"),
        ];

        assert_eq!(weights(&pareto_front(entries)), [0.1, 0.2, 0.4]);
    }

    #[test]
    fn ties_do_not_dominate() {
        let entries = vec![
            entry(0.1, "{'valid_acc': 90.0, 'model_size': 3.0}"),
            entry(0.2, "{'valid_acc': 90.0, 'model_size': 2.0}"),
            entry(0.3, "{'valid_acc': 95.0, 'model_size': 3.0}"),
        ];

        assert_eq!(weights(&pareto_front(entries)), [0.1, 0.2, 0.3]);
    }

    #[test]
    fn keeps_entries_missing_metrics() {
        let entries = vec![
            entry(0.1, "{'valid_acc': 99.0, 'model_size': 1.0}"),
            entry(0.2, "{'valid_acc': 50.0}"),
            entry(0.3, "{}"),
        ];

        assert_eq!(weights(&pareto_front(entries)), [0.1, 0.2, 0.3]);
    }
}
