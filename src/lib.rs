//! # mlpnet
//!
//! A hand-written feed-forward neural network engine: dense layers with ReLU
//! hidden activations and a softmax output, manual backpropagation, and a
//! minibatch-deferred parameter-update schedule. It is the shared learning
//! substrate for small game-playing agents; the game state machines,
//! Q-learning tables, and replay wrappers live outside this crate and drive
//! it through four operations: construct, evaluate, learn, persist.
//!
//! ```no_run
//! use mlpnet::{Network, NetworkConfig};
//! use ndarray::arr1;
//!
//! # fn main() -> mlpnet::NetResult<()> {
//! let mut net = Network::new(NetworkConfig::new(9, 5, vec![5]))?;
//! let out = net.evaluate(&arr1(&[0.5; 9]))?;
//! net.learn(&out, 3)?;
//! net.force_update();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`] — network kernel: parameters, forward/backward passes, the
//!   minibatch scheduler, and the error taxonomy
//! - [`init`] — weight/bias initialization strategies
//! - [`persist`] — line-oriented text save/load
//! - [`utils`] — activation functions and guarded array math

pub mod core;
pub mod init;
pub mod persist;
pub mod utils;

pub use crate::core::{
    ForwardResult, Layer, NetError, NetResult, Network, NetworkConfig, Target,
};
pub use crate::init::{BiasInit, WeightInit};
