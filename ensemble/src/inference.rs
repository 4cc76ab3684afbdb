use std::num::NonZeroUsize;

use log::info;
use ndarray::{Array2, Axis};

use crate::{
    EnsembleErr, Result,
    data::BatchSource,
    loss::LossFn,
    meter::{AverageMeter, report_interval},
    metrics::{collect_outputs, min_max_scale, stack_outputs, topk_accuracy},
    registry::{Classifier, ModelCollection},
    weights::EnsembleWeights,
};

/// Averages of one inference pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceReport {
    /// Mean over samples of the per-model cross-entropy averaged over models.
    pub loss: f32,
    /// Top-1 accuracy of the ensemble, in percent.
    pub top1: f32,
    /// Top-5 accuracy of the ensemble, in percent.
    pub top5: f32,
}

/// Combines the outputs of the models on one batch into ensemble scores.
///
/// Every model's scores are min-max scaled per sample, multiplied by the weights and averaged
/// over models.
///
/// # Arguments
/// * `outputs` - One `[batch, class]` score matrix per model.
/// * `weights` - The model weights, already normalized.
///
/// # Returns
/// The `[batch, class]` ensemble scores.
///
/// # Errors
/// Returns an error if there are no outputs or the weights don't fit them.
pub fn ensemble_scores(outputs: &[Array2<f32>], weights: &EnsembleWeights) -> Result<Array2<f32>> {
    let stacked = stack_outputs(outputs)?;
    let (_, num_models, num_classes) = stacked.dim();
    weights.check(num_models, num_classes)?;

    weights
        .apply(&min_max_scale(&stacked))
        .mean_axis(Axis(1))
        .ok_or(EnsembleErr::EmptyCollection)
}

/// Evaluates the weighted ensemble over one pass of `loader`.
///
/// # Arguments
/// * `loader` - The batches to evaluate on.
/// * `models` - The ensemble.
/// * `loss_fn` - The loss every model is scored with.
/// * `weights` - Normalized model weights; `None` weighs every model equally.
/// * `report_lines` - About how many progress lines to log.
///
/// # Returns
/// The batch-size weighted averages of loss, top-1 and top-5 accuracy.
///
/// # Errors
/// Returns `EnsembleErr::WeightShapeMismatch` before any batch is read if the weights don't
/// have one entry per model, and any error raised while loading or scoring a batch.
pub fn infer<B: BatchSource, M: Classifier, L: LossFn>(
    loader: &mut B,
    models: &ModelCollection<M>,
    loss_fn: &L,
    weights: Option<&EnsembleWeights>,
    report_lines: NonZeroUsize,
) -> Result<InferenceReport> {
    if models.is_empty() {
        return Err(EnsembleErr::EmptyCollection);
    }

    let uniform;
    let weights = match weights {
        Some(w) => w,
        None => {
            uniform = EnsembleWeights::uniform(models.len());
            &uniform
        }
    };
    if weights.num_models() != models.len() {
        let mut expected = weights.shape();
        expected[0] = models.len();
        return Err(EnsembleErr::WeightShapeMismatch {
            expected,
            got: weights.shape(),
        });
    }

    let mut loss = AverageMeter::new();
    let mut top1 = AverageMeter::new();
    let mut top5 = AverageMeter::new();
    let report_every = report_interval(loader.num_batches(), report_lines);

    loader.reset();
    let mut step = 0;
    while let Some(batch) = loader.next_batch()? {
        let n = batch.len();
        let outputs = collect_outputs(models, &batch.images)?;

        let mut batch_loss = 0.;
        for logits in &outputs {
            batch_loss += loss_fn.loss(logits.view(), batch.targets.view())?;
        }
        batch_loss /= outputs.len() as f32;

        let scores = ensemble_scores(&outputs, weights)?;
        let acc = topk_accuracy(scores.view(), batch.targets.view(), &[1, 5]);

        loss.update(batch_loss, n);
        top1.update(acc[0], n);
        top5.update(acc[1], n);

        if step % report_every == 0 {
            info!(
                "test {step:03} {:e} {:.6} {:.6}",
                loss.avg(),
                top1.avg(),
                top5.avg()
            );
        }
        step += 1;
    }

    Ok(InferenceReport {
        loss: loss.avg(),
        top1: top1.avg(),
        top5: top5.avg(),
    })
}
