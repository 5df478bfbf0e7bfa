//! End-to-end training on an analytic sphere.

use rand::rngs::StdRng;
use rand::SeedableRng;
use sirensdf::sdf::sample_sphere_points;
use sirensdf::train::{batchify, evaluate, Trainer};
use sirensdf::{create_backend, BackendKind, SirenConfig, SirenNetwork, TrainConfig};

#[test]
fn test_sphere_loss_drops_by_an_order_of_magnitude() {
    let mut rng = StdRng::seed_from_u64(0);
    let cloud = sample_sphere_points(512, 0.5, 1.0, &mut rng);
    let batches = batchify(&cloud, 64).unwrap();

    let mut net = SirenNetwork::new(SirenConfig::sdf(1, 32, 64).with_seed(1)).unwrap();
    let initial = evaluate(&mut net, &batches).unwrap();

    let config = TrainConfig {
        lr: 1e-3,
        n_epochs: 150,
        log_every_n_epochs: 50,
    };
    let history = Trainer::with_seed(config, 2)
        .unwrap()
        .fit(&mut net, &batches)
        .unwrap();
    let trained = evaluate(&mut net, &batches).unwrap();

    assert_eq!(history.epochs.len(), 150);
    assert!(
        trained < 0.1 * initial,
        "loss went from {initial} to {trained}"
    );
    assert!(history.final_loss().unwrap() < history.epochs[0].mean_loss);
}

#[test]
fn test_seeded_training_is_reproducible() {
    let run = || {
        let mut rng = StdRng::seed_from_u64(5);
        let cloud = sample_sphere_points(40, 0.5, 1.0, &mut rng);
        let batches = batchify(&cloud, 16).unwrap();
        let mut net = SirenNetwork::new(SirenConfig::sdf(1, 8, 16).with_seed(6)).unwrap();
        let config = TrainConfig {
            lr: 1e-3,
            n_epochs: 4,
            log_every_n_epochs: 1,
        };
        Trainer::with_seed(config, 7).unwrap().fit(&mut net, &batches).unwrap();
        net.get_weights()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_trainer_drives_boxed_backend() {
    let mut rng = StdRng::seed_from_u64(8);
    let cloud = sample_sphere_points(20, 0.5, 1.0, &mut rng);
    let batches = batchify(&cloud, 8).unwrap();
    let mut backend = create_backend(BackendKind::Cpu, SirenConfig::sdf(0, 8, 8).with_seed(9)).unwrap();
    let before = backend.get_weights().unwrap();
    let config = TrainConfig {
        lr: 1e-3,
        n_epochs: 2,
        log_every_n_epochs: 1,
    };
    let history = Trainer::new(config).unwrap().fit(backend.as_mut(), &batches).unwrap();
    assert_eq!(history.epochs.len(), 2);
    assert_ne!(backend.get_weights().unwrap(), before);
}

#[test]
fn test_invalid_train_config_rejected() {
    let config = TrainConfig {
        lr: -1.0,
        ..TrainConfig::default()
    };
    assert!(Trainer::new(config).is_err());
}
