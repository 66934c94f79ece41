//! End-to-end training behavior.
//!
//! These tests verify the engine's contract properties:
//! - Softmax outputs are normalized and the arg-max result is in range
//! - Gradient descent moves the output toward the target
//! - Minibatch accumulation applies the mean gradient, never the sum
//! - Parameter clones are fully independent of their source
//! - A small network learns a fixed example within two updates

use approx::assert_abs_diff_eq;
use mlpnet::{BiasInit, Network, NetworkConfig, Target};
use ndarray::{arr1, Array1};

/// Squared distance between the network's output distribution and a target.
fn squared_distance(probabilities: &Array1<f32>, target: &Array1<f32>) -> f32 {
    (probabilities - target).mapv(|v| v * v).sum()
}

/// Deterministic small network: fixed weight/bias patterns instead of random
/// initialization, so convergence assertions cannot flake.
fn deterministic_network(lr: f32) -> Network {
    let mut cfg = NetworkConfig::new(4, 3, vec![6]);
    cfg.learning_rate = lr;
    let mut net = Network::new(cfg).expect("valid config");
    for (l, layer) in net.layers.iter_mut().enumerate() {
        for ((i, j), w) in layer.weights.indexed_iter_mut() {
            *w = 0.05 * (i as f32 + 1.0) - 0.03 * (j as f32) + 0.01 * l as f32;
        }
        layer.bias.fill(0.0);
    }
    net
}

#[test]
fn test_result_in_range_and_probabilities_normalized() {
    let shapes = [
        (3usize, 2usize, vec![4usize]),
        (9, 5, vec![5]),
        (6, 4, vec![8, 8]),
        (2, 7, vec![]),
    ];
    for (input_width, output_width, hidden) in shapes {
        let net = Network::new(NetworkConfig::new(input_width, output_width, hidden)).unwrap();
        for seed in 0..10 {
            let input: Array1<f32> = (0..input_width)
                .map(|i| ((seed * 7 + i * 3) % 13) as f32 / 13.0 - 0.5)
                .collect();
            let out = net.evaluate(&input).unwrap();
            assert!(out.result < output_width);
            let sum: f32 = out.probabilities.sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-5);
            assert!(out.probabilities.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }
}

#[test]
fn test_training_decreases_distance_to_target() {
    let mut net = deterministic_network(0.01);
    let input = arr1(&[0.8, -0.2, 0.4, 0.1]);
    let target = arr1(&[0.0, 1.0, 0.0]);

    let mut distances = Vec::new();
    for _ in 0..6 {
        let out = net.evaluate(&input).unwrap();
        distances.push(squared_distance(&out.probabilities, &target));
        net.learn(&out, 1).unwrap();
    }

    for pair in distances.windows(2) {
        assert!(
            pair[1] < pair[0],
            "distance should strictly decrease: {distances:?}"
        );
    }
}

#[test]
fn test_training_toward_explicit_distribution() {
    let mut net = deterministic_network(0.01);
    let input = arr1(&[0.5, 0.5, -0.5, 0.0]);
    let target = arr1(&[0.1, 0.2, 0.7]);

    let first = {
        let out = net.evaluate(&input).unwrap();
        let d = squared_distance(&out.probabilities, &target);
        net.learn(&out, Target::Distribution(target.clone())).unwrap();
        d
    };
    for _ in 0..9 {
        let out = net.evaluate(&input).unwrap();
        net.learn(&out, target.clone()).unwrap();
    }
    let out = net.evaluate(&input).unwrap();
    let last = squared_distance(&out.probabilities, &target);
    assert!(
        last < first,
        "distance should shrink over training: {first} -> {last}"
    );
}

#[test]
fn test_minibatch_mean_matches_single_update() {
    // With an unchanged parameter state, N identical gradients averaged over
    // a batch of N equal one immediate update.
    let single = deterministic_network(0.05);
    let mut batched = Network::from_network(&single);
    batched.minibatch_size = 4;
    let mut single = single;

    let input = arr1(&[0.3, 0.6, -0.1, 0.9]);

    let out = single.evaluate(&input).unwrap();
    single.learn(&out, 2).unwrap();

    for _ in 0..4 {
        let out = batched.evaluate(&input).unwrap();
        batched.learn(&out, 2).unwrap();
    }
    assert_eq!(batched.pending_count(), 0);

    for (a, b) in single.layers.iter().zip(batched.layers.iter()) {
        for (&x, &y) in a.weights.iter().zip(b.weights.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-6);
        }
        for (&x, &y) in a.bias.iter().zip(b.bias.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_partial_batch_holds_parameters_fixed() {
    let mut cfg = NetworkConfig::new(3, 2, vec![4]);
    cfg.minibatch_size = 5;
    let mut net = Network::new(cfg).unwrap();
    let before = net.layers.clone();

    let input = arr1(&[1.0, 0.0, -1.0]);
    for _ in 0..4 {
        let out = net.evaluate(&input).unwrap();
        net.learn(&out, 0).unwrap();
    }
    for (layer, orig) in net.layers.iter().zip(before.iter()) {
        assert_eq!(layer.weights, orig.weights);
        assert_eq!(layer.bias, orig.bias);
    }

    // The fifth example triggers the averaged update.
    let out = net.evaluate(&input).unwrap();
    net.learn(&out, 0).unwrap();
    assert_ne!(net.layers[0].weights, before[0].weights);
}

#[test]
fn test_clone_training_leaves_original_untouched() {
    let original = Network::new(NetworkConfig::new(4, 3, vec![5])).unwrap();
    let mut twin = Network::from_network(&original);

    let input = arr1(&[0.2, 0.4, 0.6, 0.8]);
    let baseline = original.evaluate(&input).unwrap();

    for _ in 0..10 {
        let out = twin.evaluate(&input).unwrap();
        twin.learn(&out, 2).unwrap();
    }

    let after = original.evaluate(&input).unwrap();
    assert_eq!(baseline.probabilities, after.probabilities);
    assert_eq!(baseline.result, after.result);
    assert_ne!(twin.layers[0].weights, original.layers[0].weights);
}

#[test]
fn test_parallel_training_matches_sequential() {
    // The parallel path splits work across disjoint neuron rows; the
    // arithmetic per row is identical, so the results must agree.
    let seq = deterministic_network(0.02);
    let mut par = Network::from_network(&seq);
    par.parallel = true;
    let mut seq = seq;

    let inputs = [
        arr1(&[0.1, 0.2, 0.3, 0.4]),
        arr1(&[-0.5, 0.5, 0.0, 1.0]),
        arr1(&[0.9, -0.9, 0.4, -0.4]),
    ];
    for (i, input) in inputs.iter().enumerate() {
        let a = seq.evaluate(input).unwrap();
        let b = par.evaluate(input).unwrap();
        assert_eq!(a.probabilities, b.probabilities);
        seq.learn(&a, i % 3).unwrap();
        par.learn(&b, i % 3).unwrap();
    }

    for (a, b) in seq.layers.iter().zip(par.layers.iter()) {
        for (&x, &y) in a.weights.iter().zip(b.weights.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_learns_fixed_example_within_two_updates() {
    let mut cfg = NetworkConfig::new(9, 5, vec![5]);
    cfg.learning_rate = 1.0;
    cfg.minibatch_size = 1;
    cfg.bias_init = BiasInit::ZERO;
    let mut net = Network::new(cfg).unwrap();

    let input = arr1(&[0.5; 9]);
    for _ in 0..2 {
        let out = net.evaluate(&input).unwrap();
        net.learn(&out, 3).unwrap();
    }

    let out = net.evaluate(&input).unwrap();
    assert_eq!(out.result, 3, "probabilities: {:?}", out.probabilities);
}
