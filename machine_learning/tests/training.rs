use std::{num::NonZeroUsize, sync::atomic::AtomicBool};

use machine_learning::{
    MlErr,
    dataset::Dataset,
    specs::{ActFnSpec, LayerSpec, LossFnSpec, ModelSpec, OptimizerSpec, TrainerSpec},
    training::TrainerBuilder,
};
use ndarray::{ArrayD, IxDyn};

fn dense_spec(epochs: usize) -> TrainerSpec {
    TrainerSpec {
        model: ModelSpec::Sequential {
            layers: vec![
                LayerSpec::Dense {
                    dim: (2, 16),
                    act_fn: Some(ActFnSpec::Sigmoid { amp: 1.0 }),
                },
                LayerSpec::Dense {
                    dim: (16, 2),
                    act_fn: None,
                },
            ],
        },
        optimizer: OptimizerSpec::Adam {
            learning_rate: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        },
        loss: LossFnSpec::Mse,
        epochs: NonZeroUsize::new(epochs).unwrap(),
        batch_size: NonZeroUsize::new(8).unwrap(),
        seed: Some(42),
    }
}

fn linear_dataset(n: usize) -> Dataset {
    let mut xs = Vec::with_capacity(n * 2);
    let mut ys = Vec::with_capacity(n * 2);

    for i in 0..n {
        let a = (i % 10) as f32 / 10. - 0.5;
        let b = (i / 10) as f32 / 10. - 0.5;
        xs.extend([a, b]);
        ys.extend([0.5 * a - b, a + 0.25 * b]);
    }

    Dataset::new(xs, vec![2], ys, 2).unwrap()
}

#[test]
fn dense_trainer_fits_a_linear_map() {
    let spec = dense_spec(60);
    let mut trainer = TrainerBuilder::new().build(&spec).unwrap();
    let mut params = trainer.init_params().unwrap();
    assert_eq!(params.len(), trainer.size());

    let mut train = linear_dataset(100);
    let val = linear_dataset(20);
    let stats = trainer.train(&mut params, &mut train, Some(&val), &AtomicBool::new(false)).unwrap();

    assert_eq!(stats.len(), 60);
    let first = stats.first().unwrap();
    let last = stats.last().unwrap();
    assert!(last.loss < first.loss);
    assert!(last.val_loss.unwrap() < first.val_loss.unwrap());

    let x = ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![0.1, -0.2]).unwrap();
    let y = trainer.predict(&params, x).unwrap();
    assert_eq!(y.dim(), (1, 2));
}

#[test]
fn conv_trainer_runs_on_small_images() {
    let spec = TrainerSpec {
        model: ModelSpec::Sequential {
            layers: vec![
                LayerSpec::Conv2d {
                    kernel: 3,
                    in_channels: 1,
                    filters: 2,
                    act_fn: Some(ActFnSpec::Relu),
                },
                LayerSpec::AvgPool2d { pool: 2 },
                LayerSpec::Flatten,
                LayerSpec::Dense {
                    dim: (2 * 2 * 3, 4),
                    act_fn: Some(ActFnSpec::Relu),
                },
                LayerSpec::Dropout { rate: 0.2 },
                LayerSpec::Dense {
                    dim: (4, 2),
                    act_fn: None,
                },
            ],
        },
        ..dense_spec(2)
    };

    let mut trainer = TrainerBuilder::new().build(&spec).unwrap();
    let mut params = trainer.init_params().unwrap();

    let n = 6;
    let xs = (0..n * 6 * 8).map(|i| (i % 13) as f32 / 13.).collect();
    let ys = (0..n * 2).map(|i| (i % 3) as f32 - 1.).collect();
    let mut train = Dataset::new(xs, vec![6, 8, 1], ys, 2).unwrap();

    let stats = trainer.train(&mut params, &mut train, None, &AtomicBool::new(false)).unwrap();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.loss.is_finite() && s.val_loss.is_none()));
}

#[test]
fn empty_dataset_is_rejected() {
    let mut trainer = TrainerBuilder::new().build(&dense_spec(1)).unwrap();
    let mut params = trainer.init_params().unwrap();
    let mut empty = Dataset::new(vec![], vec![2], vec![], 2).unwrap();

    let err = trainer.train(&mut params, &mut empty, None, &AtomicBool::new(false)).unwrap_err();
    assert!(matches!(err, MlErr::EmptyDataset));
}

#[test]
fn interrupted_training_stops_before_the_next_epoch() {
    let mut trainer = TrainerBuilder::new().build(&dense_spec(5)).unwrap();
    let mut params = trainer.init_params().unwrap();
    let before = params.clone();
    let mut train = linear_dataset(20);

    let err = trainer
        .train(&mut params, &mut train, None, &AtomicBool::new(true))
        .unwrap_err();

    assert!(matches!(err, MlErr::Interrupted { epoch: 0 }));
    assert_eq!(params, before);
}

#[test]
fn specs_deserialize_from_snake_case_json() {
    let json = r#"{
        "model": { "sequential": { "layers": [
            { "dense": { "dim": [74, 50], "act_fn": null } },
            { "dense": { "dim": [50, 2], "act_fn": { "sigmoid": { "amp": 1.0 } } } }
        ] } },
        "optimizer": { "gradient_descent": { "learning_rate": 0.1 } },
        "loss": "mse",
        "epochs": 3,
        "batch_size": 4,
        "seed": null
    }"#;

    let spec: TrainerSpec = serde_json::from_str(json).unwrap();
    assert_eq!(spec.epochs.get(), 3);
    assert!(TrainerBuilder::new().build(&spec).is_ok());
}

#[test]
fn invalid_dropout_rate_is_rejected() {
    let mut spec = dense_spec(1);
    let ModelSpec::Sequential { layers } = &mut spec.model;
    layers.push(LayerSpec::Dropout { rate: 1.5 });

    assert!(matches!(
        TrainerBuilder::new().build(&spec),
        Err(MlErr::InvalidSpec(_))
    ));
}
