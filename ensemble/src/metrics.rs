use std::cmp::Ordering;

use candle_core::Tensor;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::{
    EnsembleErr, Result,
    registry::{Classifier, ModelCollection},
};

/// Runs every model of the collection on a batch.
///
/// # Returns
/// One `[batch, class]` score matrix per model, in collection order.
///
/// # Errors
/// Returns an error if a forward pass fails or the models disagree on the output shape.
pub fn collect_outputs<M: Classifier>(
    models: &ModelCollection<M>,
    images: &Tensor,
) -> Result<Vec<Array2<f32>>> {
    let mut outputs: Vec<Array2<f32>> = Vec::with_capacity(models.len());

    for (key, model) in models.iter() {
        let logits = model.logits(images)?;
        if let Some(first) = outputs.first() {
            if first.dim() != logits.dim() {
                return Err(EnsembleErr::OutputShapeMismatch {
                    model: key.to_string(),
                    expected: first.dim(),
                    got: logits.dim(),
                });
            }
        }
        outputs.push(logits);
    }

    Ok(outputs)
}

/// Stacks per-model score matrices along a new model axis.
///
/// # Returns
/// A `[batch, model, class]` array.
///
/// # Errors
/// Returns an error if there are no outputs or their shapes differ.
pub fn stack_outputs(outputs: &[Array2<f32>]) -> Result<Array3<f32>> {
    if outputs.is_empty() {
        return Err(EnsembleErr::EmptyCollection);
    }

    let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
    Ok(ndarray::stack(Axis(1), &views)?)
}

/// Rescales the scores of every (sample, model) pair to `[0, 1]` over the class axis: the
/// minimum is subtracted, then the shifted scores are divided by their maximum.
///
/// Pairs whose scores are all equal divide zero by zero and come out as NaN.
pub fn min_max_scale(stacked: &Array3<f32>) -> Array3<f32> {
    let min = stacked
        .fold_axis(Axis(2), f32::INFINITY, |&acc, &x| acc.min(x))
        .insert_axis(Axis(2));
    let shifted = stacked - &min;

    let max = shifted
        .fold_axis(Axis(2), f32::NEG_INFINITY, |&acc, &x| acc.max(x))
        .insert_axis(Axis(2));
    &shifted / &max
}

/// Orders scores with every NaN above every number, whatever the sign bit of the NaN.
fn cmp_scores(a: f32, b: f32) -> Ordering {
    let canonical = |x: f32| if x.is_nan() { f32::NAN } else { x };
    canonical(a).total_cmp(&canonical(b))
}

/// Index of the largest score, the first one on ties. NaN counts as the largest.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_score), (i, &score)| {
            if cmp_scores(score, best_score).is_gt() {
                (i, score)
            } else {
                (best, best_score)
            }
        })
        .0
}

/// Percentage of samples whose target is among the `k` best scores, for each `k` of `ks`.
///
/// Every `k` is clamped to the number of classes.
pub fn topk_accuracy(scores: ArrayView2<f32>, targets: ArrayView1<usize>, ks: &[usize]) -> Vec<f32> {
    let batch = targets.len();
    if batch == 0 {
        return vec![0.; ks.len()];
    }

    let num_classes = scores.ncols();
    let max_k = ks.iter().copied().max().unwrap_or(0).min(num_classes);
    let mut hits = vec![0usize; ks.len()];

    for (row, &target) in scores.axis_iter(Axis(0)).zip(targets) {
        let mut ranked: Vec<usize> = (0..num_classes).collect();
        ranked.sort_by(|&a, &b| cmp_scores(row[b], row[a]));

        let rank = ranked[..max_k].iter().position(|&c| c == target);
        for (hit, &k) in hits.iter_mut().zip(ks) {
            if rank.is_some_and(|r| r < k.min(num_classes)) {
                *hit += 1;
            }
        }
    }

    hits.into_iter()
        .map(|hit| hit as f32 * 100. / batch as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn min_max_maps_each_row_to_unit_range() {
        let stacked = array![[[2f32, 4., 3.], [-1., 1., 0.]], [[10., 0., 5.], [7., 7., 8.]]];
        let scaled = min_max_scale(&stacked);

        for row in scaled.lanes(Axis(2)) {
            let min = row.fold(f32::INFINITY, |a, &x| a.min(x));
            let max = row.fold(f32::NEG_INFINITY, |a, &x| a.max(x));
            assert_eq!((min, max), (0., 1.));
        }
        assert_eq!(scaled[[0, 0, 2]], 0.5);
    }

    #[test]
    fn min_max_of_equal_scores_is_nan() {
        let scaled = min_max_scale(&array![[[3f32, 3., 3.]]]);
        assert!(scaled.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn stack_puts_models_on_the_middle_axis() {
        let a = array![[1f32, 2.], [3., 4.]];
        let b = array![[5f32, 6.], [7., 8.]];
        let stacked = stack_outputs(&[a, b]).unwrap();

        assert_eq!(stacked.dim(), (2, 2, 2));
        assert_eq!(stacked[[1, 1, 0]], 7.);
        assert!(matches!(stack_outputs(&[]), Err(EnsembleErr::EmptyCollection)));
    }

    #[test]
    fn argmax_prefers_the_first_maximum() {
        assert_eq!(argmax(array![0.1f32, 0.9, 0.9].view()), 1);
        assert_eq!(argmax(array![-3f32, -2., -5.].view()), 1);
    }

    #[test]
    fn nan_ranks_first_whatever_its_sign() {
        let negative_nan = f32::from_bits(0xffc0_0000);
        assert!(negative_nan.is_nan() && negative_nan.is_sign_negative());

        assert_eq!(argmax(array![0.5f32, negative_nan, 0.9].view()), 1);
        assert_eq!(argmax(array![f32::NEG_INFINITY, 0.0, negative_nan].view()), 2);

        let scores = array![[0.9f32, 0.8, negative_nan]];
        let acc = topk_accuracy(scores.view(), array![2].view(), &[1]);
        assert_eq!(acc, [100.]);

        let scaled = min_max_scale(&array![[[3f32, 3., 3.]]]);
        let row = scaled.index_axis(Axis(0), 0).index_axis(Axis(0), 0).to_owned();
        assert_eq!(argmax(row.view()), 0);
    }

    #[test]
    fn topk_counts_hits_in_percent() {
        let scores = array![
            [0.9f32, 0.1, 0.0],
            [0.2, 0.5, 0.3],
            [0.1, 0.2, 0.7],
            [0.6, 0.3, 0.1],
        ];
        let targets = array![0, 2, 2, 2];

        let acc = topk_accuracy(scores.view(), targets.view(), &[1, 2, 5]);
        assert_eq!(acc, [50., 75., 100.]);
    }
}
