use darts::{GenotypeRegistry, device::device_name, select_device};
use log::info;

use crate::{
    Result,
    config::EnsembleConfig,
    data::CifarSplits,
    inference::{InferenceReport, infer},
    loss::CrossEntropy,
    registry::ModelRegistry,
    weights::{EnsembleWeights, calculate_weights},
};

/// What an ensemble run measured.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub weights: EnsembleWeights,
    pub test: InferenceReport,
    pub train: InferenceReport,
}

/// Runs the whole evaluation: loads the models, weights them, and evaluates the weighted
/// ensemble on the test split and the uniform ensemble on the train split.
///
/// # Errors
/// Returns an error if no device can be used, no model can be loaded, the dataset can't be
/// read or any evaluation step fails.
pub fn run(config: &EnsembleConfig) -> Result<RunSummary> {
    let device = select_device(config.gpu(), config.allow_cpu())?;
    if !device.is_cpu() {
        device.set_seed(config.seed())?;
    }
    info!("{} device = {}", device_name(&device), config.gpu());
    info!("args = {config:?}");

    let genotypes = match config.genotypes() {
        Some(path) => GenotypeRegistry::builtin_with_file(path)?,
        None => GenotypeRegistry::builtin(),
    };
    let registry = ModelRegistry::new(&genotypes, config.network(), config.drop_path_prob());
    let models = registry.load(config.models_folder(), &device)?;

    let mut splits = CifarSplits::load(config, &device)?;
    let report_lines = config.report_lines();
    let criterion = CrossEntropy::new();

    let weights = if config.calculate() {
        calculate_weights(&mut splits.valid, &models, config.per_class(), report_lines)?
    } else {
        EnsembleWeights::uniform(models.len())
    };
    info!("train final weights = {weights}");

    let normalized = weights.normalized();
    let test = infer(&mut splits.test, &models, &criterion, Some(&normalized), report_lines)?;
    info!(
        "test loss {:e}, acc top1: {:.2}, acc top5 {:.2}",
        test.loss, test.top1, test.top5
    );

    let train = infer(&mut splits.train, &models, &criterion, None, report_lines)?;
    info!(
        "train loss {:e}, acc top1: {:.6}, acc top5 {:.6}",
        train.loss, train.top1, train.top5
    );

    Ok(RunSummary {
        weights,
        test,
        train,
    })
}
