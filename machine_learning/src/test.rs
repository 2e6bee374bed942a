#![cfg(test)]

use std::num::NonZeroUsize;

use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    MlErr,
    arch::{SequentialBuilder, activations::ActFn},
    dataset::Dataset,
    optimization::OptimizerSpec,
};

/// Two gaussian-ish blobs around `(1, 1)` and `(-1, -1)`.
fn blobs(n: usize, rng: &mut StdRng) -> Dataset {
    let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
    let x = Array2::from_shape_fn((n, 2), |(i, _)| {
        let center = if labels[i] == 0 { 1. } else { -1. };
        center + rng.random_range(-0.3..0.3)
    });

    Dataset::from_labels(x, &labels, 2).unwrap()
}

fn epochs(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[test]
fn test_separable_blobs_convergence() {
    let mut rng = StdRng::seed_from_u64(42);
    let train = blobs(64, &mut rng);
    let test = blobs(32, &mut rng);

    let mut model = SequentialBuilder::new(2)
        .dense(8, Some(ActFn::relu()))
        .dense(2, Some(ActFn::softmax()))
        .build(&mut rng)
        .unwrap();
    model.compile(0.05, OptimizerSpec::default()).unwrap();

    let history: Vec<_> = model
        .fit(&train, &test, epochs(20), epochs(8))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(history.len(), 20);
    assert_eq!(history.iter().map(|e| e.epoch).collect::<Vec<_>>(), (1..=20).collect::<Vec<_>>());

    let last = history.last().unwrap();
    assert!(last.val_accuracy > 0.95, "accuracy {}", last.val_accuracy);
    assert!(last.loss < history[0].loss);
}

#[test]
fn test_gradient_descent_lowers_the_loss() {
    let mut rng = StdRng::seed_from_u64(7);
    let train = blobs(32, &mut rng);

    let mut model = SequentialBuilder::new(2)
        .dense(2, Some(ActFn::softmax()))
        .build(&mut rng)
        .unwrap();
    model.compile(0.5, OptimizerSpec::GradientDescent).unwrap();

    let before = model.evaluate(&train).unwrap().loss;
    for epoch in model.fit(&train, &train, epochs(10), epochs(4)).unwrap() {
        epoch.unwrap();
    }

    assert!(model.evaluate(&train).unwrap().loss < before);
}

#[test]
fn test_fit_is_lazy() {
    let mut rng = StdRng::seed_from_u64(1);
    let train = blobs(8, &mut rng);

    let mut model = SequentialBuilder::new(2)
        .dense(2, Some(ActFn::softmax()))
        .build(&mut rng)
        .unwrap();
    model.compile(0.1, OptimizerSpec::default()).unwrap();

    let before = model.params().to_vec();
    let fit = model.fit(&train, &train, epochs(5), epochs(4)).unwrap();
    drop(fit);
    assert_eq!(model.params(), before.as_slice());

    let mut fit = model.fit(&train, &train, epochs(2), epochs(4)).unwrap();
    assert!(fit.next().is_some());
    assert!(fit.next().is_some());
    assert!(fit.next().is_none());
}

#[test]
fn test_fit_rejects_mismatched_data() {
    let mut rng = StdRng::seed_from_u64(1);
    let train = blobs(8, &mut rng);
    let wide = Dataset::from_labels(Array2::zeros((2, 3)), &[0, 1], 2).unwrap();

    let mut model = SequentialBuilder::new(2)
        .dense(2, Some(ActFn::softmax()))
        .build(&mut rng)
        .unwrap();
    model.compile(0.1, OptimizerSpec::default()).unwrap();

    assert!(matches!(
        model.fit(&train, &wide, epochs(1), epochs(1)).err(),
        Some(MlErr::SizeMismatch { what: "features", .. })
    ));
}

#[test]
fn test_invalid_learning_rate_is_rejected() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut model = SequentialBuilder::new(2).dense(2, None).build(&mut rng).unwrap();

    assert!(matches!(
        model.compile(-1., OptimizerSpec::default()),
        Err(MlErr::InvalidHyperparameter { name: "learning_rate", .. })
    ));
    assert!(!model.is_compiled());
}
