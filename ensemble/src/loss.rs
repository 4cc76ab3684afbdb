use ndarray::{ArrayView1, ArrayView2, Axis};

use crate::{EnsembleErr, Result};

pub trait LossFn {
    /// Returns the mean loss of a batch of raw scores against class targets.
    fn loss(&self, logits: ArrayView2<f32>, targets: ArrayView1<usize>) -> Result<f32>;
}

/// Softmax cross-entropy over raw scores.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, targets: ArrayView1<usize>) -> Result<f32> {
        let num_classes = logits.ncols();
        let mut total = 0.;

        for (row, &target) in logits.axis_iter(Axis(0)).zip(targets) {
            if target >= num_classes {
                return Err(EnsembleErr::LabelOutOfRange {
                    label: target,
                    num_classes,
                });
            }

            let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
            let log_sum_exp = max + row.mapv(|x| (x - max).exp()).sum().ln();
            total += log_sum_exp - row[target];
        }

        Ok(total / targets.len().max(1) as f32)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn uniform_scores_cost_log_classes() {
        let logits = array![[0.5f32, 0.5, 0.5, 0.5]];
        let loss = CrossEntropy.loss(logits.view(), array![2].view()).unwrap();
        assert!((loss - 4f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn confident_correct_predictions_cost_little() {
        let logits = array![[20f32, 0., 0.], [0., 0., 20.]];
        let loss = CrossEntropy.loss(logits.view(), array![0, 2].view()).unwrap();
        assert!(loss < 1e-6);

        let wrong = CrossEntropy.loss(logits.view(), array![1, 1].view()).unwrap();
        assert!((wrong - 20.).abs() < 1e-3);
    }

    #[test]
    fn targets_past_the_output_width_are_rejected() {
        let logits = array![[0f32, 1.]];
        assert!(matches!(
            CrossEntropy.loss(logits.view(), array![2].view()),
            Err(EnsembleErr::LabelOutOfRange { label: 2, .. })
        ));
    }
}
