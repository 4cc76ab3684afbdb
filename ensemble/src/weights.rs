use std::{
    fmt::{self, Display},
    num::NonZeroUsize,
};

use log::info;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView3, Axis};

use crate::{
    EnsembleErr, Result,
    data::BatchSource,
    meter::report_interval,
    metrics::{argmax, collect_outputs, stack_outputs},
    registry::{Classifier, ModelCollection},
};

/// Confidence weights of the models of an ensemble.
#[derive(Debug, Clone, PartialEq)]
pub enum EnsembleWeights {
    /// One weight per model.
    PerModel(Array1<f32>),
    /// One weight per model and class, `[model, class]`.
    PerClass(Array2<f32>),
}

impl EnsembleWeights {
    /// Equal weights for `num_models` models.
    pub fn uniform(num_models: usize) -> Self {
        Self::PerModel(Array1::ones(num_models))
    }

    pub fn num_models(&self) -> usize {
        match self {
            Self::PerModel(w) => w.len(),
            Self::PerClass(w) => w.nrows(),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::PerModel(w) => w.shape().to_vec(),
            Self::PerClass(w) => w.shape().to_vec(),
        }
    }

    /// Scales the weights so the largest one is 1: over all models for per-model weights, and
    /// separately for every class for per-class weights.
    pub fn normalized(&self) -> Self {
        match self {
            Self::PerModel(w) => {
                let max = w.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
                Self::PerModel(w / max)
            }
            Self::PerClass(w) => {
                let max = w.fold_axis(Axis(0), f32::NEG_INFINITY, |&acc, &x| acc.max(x));
                Self::PerClass(w / &max.insert_axis(Axis(0)))
            }
        }
    }

    /// Checks the weights fit an ensemble of `num_models` models with `num_classes` outputs.
    ///
    /// # Errors
    /// Returns `EnsembleErr::WeightShapeMismatch` if they don't.
    pub fn check(&self, num_models: usize, num_classes: usize) -> Result<()> {
        let fits = match self {
            Self::PerModel(w) => w.len() == num_models,
            Self::PerClass(w) => w.dim() == (num_models, num_classes),
        };
        if fits {
            return Ok(());
        }

        let expected = match self {
            Self::PerModel(_) => vec![num_models],
            Self::PerClass(_) => vec![num_models, num_classes],
        };
        Err(EnsembleErr::WeightShapeMismatch {
            expected,
            got: self.shape(),
        })
    }

    /// Multiplies `[batch, model, class]` scores by the weights, broadcasting per-model weights
    /// over classes and both kinds over the batch.
    ///
    /// The shape must have been validated with [`EnsembleWeights::check`].
    pub fn apply(&self, scores: &Array3<f32>) -> Array3<f32> {
        match self {
            Self::PerModel(w) => scores * &w.view().insert_axis(Axis(0)).insert_axis(Axis(2)),
            Self::PerClass(w) => scores * &w.view().insert_axis(Axis(0)),
        }
    }
}

impl Display for EnsembleWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerModel(w) => write!(f, "{w}"),
            Self::PerClass(w) => write!(f, "{w}"),
        }
    }
}

/// Fraction of the batch each model predicts correctly.
///
/// # Arguments
/// * `stacked` - `[batch, model, class]` scores.
/// * `targets` - The class of every sample.
///
/// # Returns
/// A score per model, in `[0, 1]`.
pub fn score_per_model(stacked: ArrayView3<f32>, targets: ArrayView1<usize>) -> Array1<f32> {
    let (batch, num_models, _) = stacked.dim();
    let mut correct = Array1::<f32>::zeros(num_models);

    for (sample, &target) in stacked.axis_iter(Axis(0)).zip(targets) {
        for (m, scores) in sample.axis_iter(Axis(0)).enumerate() {
            if argmax(scores) == target {
                correct[m] += 1.;
            }
        }
    }

    correct / batch.max(1) as f32
}

/// For every model and class, the fraction of the batch's samples of that class the model
/// predicts correctly. Classes absent from the batch score 0.
///
/// # Arguments
/// * `stacked` - `[batch, model, class]` scores.
/// * `targets` - The class of every sample.
/// * `num_classes` - The number of classes of the dataset.
///
/// # Returns
/// A `[model, class]` matrix with entries in `[0, 1]`.
///
/// # Errors
/// Returns `EnsembleErr::LabelOutOfRange` if a target isn't below `num_classes`.
pub fn score_per_class(
    stacked: ArrayView3<f32>,
    targets: ArrayView1<usize>,
    num_classes: usize,
) -> Result<Array2<f32>> {
    let num_models = stacked.dim().1;
    let mut correct = Array2::<f32>::zeros((num_models, num_classes));
    let mut seen = Array1::<f32>::zeros(num_classes);

    for (sample, &target) in stacked.axis_iter(Axis(0)).zip(targets) {
        if target >= num_classes {
            return Err(EnsembleErr::LabelOutOfRange {
                label: target,
                num_classes,
            });
        }

        seen[target] += 1.;
        for (m, scores) in sample.axis_iter(Axis(0)).enumerate() {
            if argmax(scores) == target {
                correct[[m, target]] += 1.;
            }
        }
    }

    let seen = seen.insert_axis(Axis(0));
    Ok(ndarray::Zip::from(&correct)
        .and_broadcast(&seen)
        .map_collect(|&c, &n| if n > 0. { c / n } else { 0. }))
}

/// Accumulates ensemble weights over one pass of `loader`.
///
/// Per-model weights start at zero and add every batch's fraction of correct predictions.
/// Per-class weights start at one, so no model is ever weighted zero for a class, and add
/// every batch's per-class fraction of correct predictions.
///
/// # Arguments
/// * `loader` - The held-out batches to score on.
/// * `models` - The ensemble.
/// * `num_classes` - `Some(classes)` to weight every model per class, `None` for one weight
///   per model.
/// * `report_lines` - About how many progress lines to log.
///
/// # Returns
/// The accumulated, unnormalized weights.
///
/// # Errors
/// Returns an error if the collection is empty, a batch can't be loaded or a forward pass
/// fails.
pub fn calculate_weights<B: BatchSource, M: Classifier>(
    loader: &mut B,
    models: &ModelCollection<M>,
    num_classes: Option<usize>,
    report_lines: NonZeroUsize,
) -> Result<EnsembleWeights> {
    if models.is_empty() {
        return Err(EnsembleErr::EmptyCollection);
    }

    let mut weights = match num_classes {
        Some(classes) => EnsembleWeights::PerClass(Array2::ones((models.len(), classes))),
        None => EnsembleWeights::PerModel(Array1::zeros(models.len())),
    };
    let report_every = report_interval(loader.num_batches(), report_lines);

    loader.reset();
    let mut step = 0;
    while let Some(batch) = loader.next_batch()? {
        let outputs = collect_outputs(models, &batch.images)?;
        let stacked = stack_outputs(&outputs)?;

        match &mut weights {
            EnsembleWeights::PerModel(w) => {
                *w += &score_per_model(stacked.view(), batch.targets.view());
            }
            EnsembleWeights::PerClass(w) => {
                let classes = w.ncols();
                *w += &score_per_class(stacked.view(), batch.targets.view(), classes)?;
            }
        }

        if step % report_every == 0 {
            info!("train {step:03} partial weights = {weights}");
        }
        step += 1;
    }

    Ok(weights)
}
