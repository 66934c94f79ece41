//! Persistence round-trip laws over the tab-separated model format.

use mlpnet::{Network, NetworkConfig, WeightInit};
use ndarray::arr1;
use std::fs;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join("mlpnet_integration_tests").join(name)
}

fn trained_network() -> Network {
    let mut cfg = NetworkConfig::new(6, 4, vec![8, 5]);
    cfg.learning_rate = 0.02;
    cfg.minibatch_size = 3;
    cfg.weight_init = WeightInit::Xavier;
    let mut net = Network::new(cfg).expect("valid config");

    // A few learn calls so the saved parameters are not pure init noise.
    for i in 0..6 {
        let input = arr1(&[0.1 * i as f32, 0.5, -0.3, 0.8, 0.0, -0.6]);
        let out = net.evaluate(&input).unwrap();
        net.learn(&out, i % 4).unwrap();
    }
    net.force_update();
    net
}

#[test]
fn test_round_trip_reproduces_tensors_and_output() {
    let mut net = trained_network();
    let path = temp_path("round_trip_full.model");

    let input = arr1(&[0.4, -0.2, 0.9, 0.0, 0.5, -0.5]);
    let before = net.evaluate(&input).unwrap();

    net.save(&path).expect("save");
    let loaded = Network::load(&path).expect("load");

    for (a, b) in net.layers.iter().zip(loaded.layers.iter()) {
        assert_eq!(a.weights, b.weights, "weights must round-trip exactly");
        assert_eq!(a.bias, b.bias, "biases must round-trip exactly");
    }

    let after = loaded.evaluate(&input).unwrap();
    assert_eq!(before.probabilities, after.probabilities);
    assert_eq!(before.result, after.result);

    let _ = fs::remove_file(&path);
}

#[test]
fn test_repeated_round_trip_is_stable() {
    let mut net = trained_network();
    let path_a = temp_path("stable_a.model");
    let path_b = temp_path("stable_b.model");

    net.save(&path_a).expect("save a");
    let mut reloaded = Network::load(&path_a).expect("load a");
    reloaded.save(&path_b).expect("save b");

    let text_a = fs::read_to_string(&path_a).unwrap();
    let text_b = fs::read_to_string(&path_b).unwrap();
    assert_eq!(text_a, text_b, "save -> load -> save must be a fixed point");

    let _ = fs::remove_file(&path_a);
    let _ = fs::remove_file(&path_b);
}

#[test]
fn test_loaded_network_keeps_training() {
    let mut net = trained_network();
    let path = temp_path("continue_training.model");
    net.save(&path).expect("save");

    let mut loaded = Network::load(&path).expect("load");
    assert_eq!(loaded.minibatch_size, 3);
    assert_eq!(loaded.pending_count(), 0);

    let input = arr1(&[1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
    let before = loaded.layers[0].weights.clone();
    for _ in 0..3 {
        let out = loaded.evaluate(&input).unwrap();
        loaded.learn(&out, 1).unwrap();
    }
    // Third learn call hits the minibatch threshold and applies the update.
    assert_eq!(loaded.pending_count(), 0);
    assert_ne!(loaded.layers[0].weights, before);

    let _ = fs::remove_file(&path);
}

#[test]
fn test_clone_and_file_copy_agree() {
    let mut net = trained_network();
    let path = temp_path("twin.model");
    net.save(&path).expect("save");

    let from_file = Network::load(&path).expect("load");
    let from_memory = Network::from_network(&net);

    for (a, b) in from_file.layers.iter().zip(from_memory.layers.iter()) {
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.bias, b.bias);
    }
    assert_eq!(from_file.learning_rate, from_memory.learning_rate);
    assert_eq!(from_file.input_width, from_memory.input_width);
    assert_eq!(from_file.output_width, from_memory.output_width);

    let _ = fs::remove_file(&path);
}
