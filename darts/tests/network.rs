use std::num::NonZeroUsize;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use darts::{Genotype, GenotypeRegistry, NetworkCifar, NetworkConfig, Op, Profiler};

fn tiny_config() -> NetworkConfig {
    NetworkConfig::from_counts(4, 10, 3, false).unwrap()
}

/// One cell kind using every operation once.
fn every_op_genotype() -> Genotype {
    let cell = vec![
        (Op::SepConv3x3, 0),
        (Op::SepConv5x5, 1),
        (Op::SepConv7x7, 0),
        (Op::DilConv3x3, 1),
        (Op::DilConv5x5, 0),
        (Op::Conv7x1And1x7, 1),
        (Op::MaxPool3x3, 0),
        (Op::AvgPool3x3, 1),
        (Op::SkipConnect, 0),
        (Op::None, 1),
    ];
    Genotype::new(cell.clone(), vec![2, 3, 4, 5, 6], cell, vec![4, 5, 6]).unwrap()
}

fn images(batch: usize) -> Tensor {
    Tensor::randn(0f32, 1f32, (batch, 3, 32, 32), &Device::Cpu).unwrap()
}

#[test]
fn forward_produces_one_score_per_class() {
    let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
    let model = NetworkCifar::new(tiny_config(), &every_op_genotype(), vb).unwrap();

    let logits = model.forward(&images(2)).unwrap();
    assert_eq!(logits.dims2().unwrap(), (2, 10));
}

#[test]
fn training_forward_with_drop_path_keeps_shapes() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let mut model = NetworkCifar::new(tiny_config(), &every_op_genotype(), vb).unwrap();
    model.set_drop_path_prob(0.5);

    let logits = model.forward_t(&images(3), true).unwrap();
    assert_eq!(logits.dims2().unwrap(), (3, 10));
}

#[test]
fn num_params_counts_every_trainable_tensor() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = NetworkCifar::new(tiny_config(), &every_op_genotype(), vb).unwrap();

    let data = varmap.data().lock().unwrap();
    let trainable: usize = data
        .iter()
        .filter(|(name, _)| !name.ends_with("running_mean") && !name.ends_with("running_var"))
        .map(|(_, var)| var.elem_count())
        .sum();

    assert_eq!(model.num_params(), trainable);
}

#[test]
fn checkpoint_round_trip_reproduces_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.pt");
    let genotype = every_op_genotype();

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let original = NetworkCifar::new(tiny_config(), &genotype, vb).unwrap();
    varmap.save(&path).unwrap();

    let loaded = NetworkCifar::load(tiny_config(), &genotype, &path, &Device::Cpu).unwrap();

    let x = images(2);
    let expected = original.forward(&x).unwrap().to_vec2::<f32>().unwrap();
    let actual = loaded.forward(&x).unwrap().to_vec2::<f32>().unwrap();
    assert_eq!(expected, actual);
}

#[test]
fn checkpoint_for_another_architecture_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.pt");

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    NetworkCifar::new(tiny_config(), &every_op_genotype(), vb).unwrap();
    varmap.save(&path).unwrap();

    let registry = GenotypeRegistry::builtin();
    let other = registry.get("DARTS_V2").unwrap();
    assert!(NetworkCifar::load(tiny_config(), other, &path, &Device::Cpu).is_err());
}

#[test]
fn darts_v2_has_the_published_size() {
    let registry = GenotypeRegistry::builtin();
    let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
    let model = NetworkCifar::new(
        NetworkConfig::cifar_default(),
        registry.get("DARTS_V2").unwrap(),
        vb,
    )
    .unwrap();

    let millions = model.num_params() as f64 / 1e6;
    assert!((3.2..3.5).contains(&millions), "{millions}M parameters");
}

#[test]
fn profiler_reports_cpu_only_without_accelerator() {
    let profiler = Profiler::new(tiny_config(), None, NonZeroUsize::MIN);
    let genotype = every_op_genotype();
    let profile = profiler.profile(&genotype).unwrap();

    let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
    let model = NetworkCifar::new(tiny_config(), &genotype, vb).unwrap();

    assert_eq!(profile.parameters, model.num_params() as f64 / 1e6);
    assert!(profile.flops > 0.);
    assert!(profile.latency_cpu >= 0.);
    assert!(profile.latency_gpu.is_none());
}
