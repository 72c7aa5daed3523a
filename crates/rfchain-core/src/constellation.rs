//! Constellation Geometry and Gaussian Noise
//!
//! Ideal symbol positions for the supported modulations and a Box-Muller
//! Gaussian source used to scatter points around them.
//!
//! ```text
//!      BPSK            QPSK            8QAM (ring)     16QAM (grid)
//!                    *       *          *   *          * * * *
//!   *   +   *            +            *   +   *        * * * *
//!                    *       *          *   *          * * * *
//!                                                      * * * *
//! ```
//!
//! All constellations fit inside the unit circle.

use crate::types::{IQSample, Modulation};
use rand::Rng;
use std::f64::consts::PI;

/// Smallest per-axis spread, reached at high C/N
pub const MIN_SPREAD: f64 = 0.02;

/// Largest per-axis spread, reached at or below 0 dB C/N
pub const MAX_SPREAD: f64 = 1.0;

/// Ideal constellation points for `modulation`
pub fn ideal_points(modulation: Modulation) -> Vec<IQSample> {
    match modulation {
        Modulation::Bpsk => vec![IQSample::new(1.0, 0.0), IQSample::new(-1.0, 0.0)],
        Modulation::Qpsk => ring(4, PI / 4.0, 1.0),
        Modulation::Qam8 => ring(8, PI / 8.0, 1.0),
        Modulation::Qam16 => {
            // Levels ±1, ±3 scaled so the corner points sit on the unit circle
            let scale = 1.0 / (3.0 * 2.0_f64.sqrt());
            let levels = [-3.0, -1.0, 1.0, 3.0];
            let mut pts = Vec::with_capacity(16);
            for &q in levels.iter().rev() {
                for &i in &levels {
                    pts.push(IQSample::new(i * scale, q * scale));
                }
            }
            pts
        }
    }
}

fn ring(n: usize, offset: f64, radius: f64) -> Vec<IQSample> {
    (0..n)
        .map(|k| {
            let phase = offset + 2.0 * PI * k as f64 / n as f64;
            IQSample::from_polar(radius, phase)
        })
        .collect()
}

/// Per-axis noise spread for a carrier-to-noise ratio in dB.
///
/// `σ = 1/√(2·10^(C/N/10))`, clamped to `[MIN_SPREAD, MAX_SPREAD]`.
/// Non-finite C/N is treated as no signal.
pub fn noise_spread(cn_db: f64) -> f64 {
    if !cn_db.is_finite() {
        return MAX_SPREAD;
    }
    let cn_linear = 10.0_f64.powf(cn_db / 10.0);
    let sigma = 1.0 / (2.0 * cn_linear).sqrt();
    sigma.clamp(MIN_SPREAD, MAX_SPREAD)
}

/// Gaussian pair generator using the Box-Muller transform
#[derive(Debug, Clone, Default)]
pub struct BoxMuller {
    spare: Option<f64>,
}

impl BoxMuller {
    pub fn new() -> Self {
        Self { spare: None }
    }

    /// Draw one standard normal sample
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        if let Some(z) = self.spare.take() {
            return z;
        }
        let (z0, z1) = Self::pair(rng);
        self.spare = Some(z1);
        z0
    }

    /// Draw a complex sample with independent N(0, σ²) components
    pub fn complex<R: Rng + ?Sized>(&mut self, rng: &mut R, sigma: f64) -> IQSample {
        let (z0, z1) = Self::pair(rng);
        IQSample::new(z0 * sigma, z1 * sigma)
    }

    fn pair<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
        // u1 in (0, 1] keeps ln() finite
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen::<f64>();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;
        (r * theta.cos(), r * theta.sin())
    }

    pub fn reset(&mut self) {
        self.spare = None;
    }
}
