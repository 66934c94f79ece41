//! Weight and bias initialization strategies.
//!
//! All randomness is drawn from a cryptographically strong byte source
//! (`OsRng`). Each raw draw clears the top bit of a `u32` to obtain a
//! non-negative 31-bit integer, normalized to `[0, 1)`. Gaussian samples are
//! produced by the Box-Muller transform over two such uniforms; only the
//! cosine branch of each pair is used.
//!
//! Initialization is deliberately seed-free: two networks constructed from
//! the same configuration will not have identical parameters.

use rand::RngCore;

/// Weight initialization strategy, dispatched by match at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightInit {
    /// Uniform in (-0.5, 0.5).
    #[default]
    Uniform,
    /// Uniform in (-1, 1).
    WideUniform,
    /// Xavier: uniform in (-1, 1) scaled by `sqrt(6 / (fan_in + fan_out))`.
    Xavier,
    /// He: Gaussian (mean 0) scaled by `sqrt(2 / fan_in)`.
    He,
    /// LeCun: Gaussian (mean 0) scaled by `sqrt(1 / fan_in)`.
    LeCun,
}

impl WeightInit {
    /// Draw one weight for a connection in a layer with the given fan-in and
    /// fan-out.
    pub fn sample<R: RngCore>(self, rng: &mut R, fan_in: usize, fan_out: usize) -> f32 {
        match self {
            WeightInit::Uniform => uniform_in(rng, -0.5, 0.5),
            WeightInit::WideUniform => uniform_in(rng, -1.0, 1.0),
            WeightInit::Xavier => {
                let scale = (6.0 / (fan_in + fan_out) as f32).sqrt();
                uniform_in(rng, -1.0, 1.0) * scale
            }
            WeightInit::He => gaussian(rng) * (2.0 / fan_in as f32).sqrt(),
            WeightInit::LeCun => gaussian(rng) * (1.0 / fan_in as f32).sqrt(),
        }
    }
}

/// Bias initialization strategy.
///
/// The canonical constant strategies are `Constant(0.0)`, `Constant(0.1)`,
/// and `Constant(0.01)`, exposed as [`BiasInit::ZERO`],
/// [`BiasInit::ONE_TENTH`], and [`BiasInit::ONE_HUNDREDTH`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BiasInit {
    /// Uniform in (-0.5, 0.5).
    #[default]
    Uniform,
    /// Uniform in (-0.1, 0.1).
    NarrowUniform,
    /// Every bias set to the given constant.
    Constant(f32),
}

impl BiasInit {
    /// All biases zero.
    pub const ZERO: BiasInit = BiasInit::Constant(0.0);
    /// All biases 0.1.
    pub const ONE_TENTH: BiasInit = BiasInit::Constant(0.1);
    /// All biases 0.01.
    pub const ONE_HUNDREDTH: BiasInit = BiasInit::Constant(0.01);

    /// Draw one bias value.
    pub fn sample<R: RngCore>(self, rng: &mut R) -> f32 {
        match self {
            BiasInit::Uniform => uniform_in(rng, -0.5, 0.5),
            BiasInit::NarrowUniform => uniform_in(rng, -0.1, 0.1),
            BiasInit::Constant(c) => c,
        }
    }
}

/// One uniform sample in `[0, 1)`: a `u32` with the top bit cleared,
/// normalized by 2^31.
fn unit<R: RngCore>(rng: &mut R) -> f32 {
    let raw = rng.next_u32() & 0x7FFF_FFFF;
    raw as f32 / 2_147_483_648.0
}

/// Uniform sample in `[lo, hi)`.
fn uniform_in<R: RngCore>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    lo + (hi - lo) * unit(rng)
}

/// Standard normal sample via Box-Muller over two independent uniforms.
///
/// Only the cosine output of each pair is used. `u1` is redrawn if it lands
/// exactly on zero, where `ln` is undefined.
fn gaussian<R: RngCore>(rng: &mut R) -> f32 {
    let u1 = loop {
        let u = unit(rng);
        if u > 0.0 {
            break u;
        }
    };
    let u2 = unit(rng);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}
