use std::{fs, num::NonZeroUsize, path::Path};

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use darts::{GenotypeRegistry, NetworkCifar, NetworkConfig};
use ensemble::{
    Classifier, EnsembleErr, ModelRegistry,
    data::{Batch, InMemoryBatches},
    infer,
    loss::CrossEntropy,
    registry::CHECKPOINT_FILE,
};
use ndarray::Array1;

fn tiny_config() -> NetworkConfig {
    NetworkConfig::from_counts(4, 10, 3, false).unwrap()
}

/// Writes a randomly initialized checkpoint for `arch` into `root/folder`.
fn write_model(root: &Path, folder: &str, arch: &str) {
    let genotypes = GenotypeRegistry::builtin();
    let dir = root.join(folder);
    fs::create_dir_all(&dir).unwrap();

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    NetworkCifar::new(tiny_config(), genotypes.get(arch).unwrap(), vb).unwrap();
    varmap.save(dir.join(CHECKPOINT_FILE)).unwrap();
}

fn load(root: &Path) -> ensemble::Result<ensemble::ModelCollection> {
    let genotypes = GenotypeRegistry::builtin();
    ModelRegistry::new(&genotypes, tiny_config(), 0.2).load(root, &Device::Cpu)
}

#[test]
fn loads_eval_folders_keyed_by_architecture() {
    let root = tempfile::tempdir().unwrap();
    write_model(root.path(), "eval-PDARTS-20240101", "PDARTS");
    write_model(root.path(), "eval-DARTS_V2-20240102", "DARTS_V2");
    // Not a model folder, no checkpoint, no key, unknown key.
    write_model(root.path(), "search-DARTS_V2-20240103", "DARTS_V2");
    fs::create_dir(root.path().join("eval-DARTS_V1-empty")).unwrap();
    write_model(root.path(), "eval", "DARTS_V2");
    write_model(root.path(), "eval-UNKNOWN-20240104", "DARTS_V2");

    let models = load(root.path()).unwrap();

    assert_eq!(models.keys().collect::<Vec<_>>(), ["DARTS_V2", "PDARTS"]);
    let darts = models.get("DARTS_V2").unwrap();
    assert_eq!(darts.folder(), "eval-DARTS_V2-20240102");
    assert_eq!(darts.network().drop_path_prob(), 0.2);

    let images = Tensor::randn(0f32, 1f32, (2, 3, 32, 32), &Device::Cpu).unwrap();
    assert_eq!(darts.logits(&images).unwrap().dim(), (2, 10));
}

#[test]
fn later_folder_with_same_key_replaces_the_model() {
    let root = tempfile::tempdir().unwrap();
    write_model(root.path(), "eval1-PDARTS-a", "PDARTS");
    write_model(root.path(), "eval2-DARTS_V2-b", "DARTS_V2");
    write_model(root.path(), "eval3-PDARTS-c", "PDARTS");

    let models = load(root.path()).unwrap();
    assert_eq!(models.keys().collect::<Vec<_>>(), ["PDARTS", "DARTS_V2"]);
    assert_eq!(models.get("PDARTS").unwrap().folder(), "eval3-PDARTS-c");
}

#[test]
fn missing_root_is_not_a_directory() {
    let root = tempfile::tempdir().unwrap();
    let file = root.path().join("models.txt");
    fs::write(&file, "").unwrap();

    assert!(matches!(load(&file), Err(EnsembleErr::NotADirectory(_))));
    assert!(matches!(
        load(&root.path().join("missing")),
        Err(EnsembleErr::NotADirectory(_))
    ));
}

#[test]
fn folder_without_models_is_an_error() {
    let root = tempfile::tempdir().unwrap();
    write_model(root.path(), "eval-UNKNOWN-1", "DARTS_V2");

    assert!(matches!(load(root.path()), Err(EnsembleErr::NoModels(_))));
}

#[test]
fn checkpoint_of_another_architecture_fails_loading() {
    let root = tempfile::tempdir().unwrap();
    write_model(root.path(), "eval-PDARTS-1", "AmoebaNet");

    assert!(matches!(load(root.path()), Err(EnsembleErr::Darts(_))));
}

#[test]
fn loaded_models_run_through_inference() {
    let root = tempfile::tempdir().unwrap();
    write_model(root.path(), "eval-PDARTS-1", "PDARTS");
    write_model(root.path(), "eval-DARTS_V2-2", "DARTS_V2");
    let models = load(root.path()).unwrap();

    let batches = (0..2)
        .map(|_| Batch {
            images: Tensor::randn(0f32, 1f32, (3, 3, 32, 32), &Device::Cpu).unwrap(),
            targets: Array1::from(vec![0, 4, 9]),
        })
        .collect();
    let mut loader = InMemoryBatches::new(batches);

    let report = infer(
        &mut loader,
        &models,
        &CrossEntropy,
        None,
        NonZeroUsize::new(5).unwrap(),
    )
    .unwrap();

    assert!(report.loss.is_finite());
    assert!((0. ..=100.).contains(&report.top1));
    assert!(report.top5 >= report.top1);
}
