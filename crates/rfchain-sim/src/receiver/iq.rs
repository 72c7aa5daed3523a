//! IQ Constellation Simulator
//!
//! Renders what a demodulator's constellation display would show for a
//! [`CarrierReport`]:
//!
//! - No carrier: Gaussian noise over the plane, no reference points.
//! - Carrier, locked: symbols of the received modulation scattered with
//!   `σ = noise_spread(C/N)`.
//! - Carrier, not locked: the same, rotated. A modulation mismatch adds
//!   a hunting rotation whose rate scales with the order ratio, and the
//!   residual frequency offset spins the plane at `offset_kHz · t`.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut sim = IqConstellationSimulator::new(7);
//! let frame = sim.render(&report, 0.25, 256);
//! assert_eq!(frame.points.len(), 256);
//! ```

use super::CarrierReport;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rfchain_core::constellation::{ideal_points, noise_spread, BoxMuller, MAX_SPREAD};
use rfchain_core::IQSample;
use std::f64::consts::TAU;

/// Carrier-recovery hunting rate at an order ratio of 1 (rad/s)
pub const HUNT_RATE_RAD_PER_S: f64 = 1.5;

/// Per-axis spread of the noise-only display
pub const NO_CARRIER_SIGMA: f64 = 1.0;

/// One rendered display frame
#[derive(Debug, Clone, PartialEq)]
pub struct ConstellationFrame {
    pub points: Vec<IQSample>,
    /// Ideal points of the configured modulation; empty with no carrier
    pub reference_points: Vec<IQSample>,
    pub spread: f64,
    /// Total rotation applied this frame (rad)
    pub rotation: f64,
}

#[derive(Debug, Clone)]
pub struct IqConstellationSimulator {
    rng: StdRng,
    noise: BoxMuller,
    hunt_phase: f64,
    elapsed_s: f64,
}

impl IqConstellationSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise: BoxMuller::new(),
            hunt_phase: 0.0,
            elapsed_s: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.hunt_phase = 0.0;
        self.elapsed_s = 0.0;
        self.noise.reset();
    }

    pub fn hunt_phase(&self) -> f64 {
        self.hunt_phase
    }

    /// Render `n` points for `report`, advancing time by `dt_s`
    pub fn render(&mut self, report: &CarrierReport, dt_s: f64, n: usize) -> ConstellationFrame {
        let dt = if dt_s.is_finite() && dt_s > 0.0 { dt_s } else { 0.0 };
        self.elapsed_s += dt;

        if !report.has_carrier {
            self.hunt_phase = 0.0;
            let points = (0..n)
                .map(|_| self.noise.complex(&mut self.rng, NO_CARRIER_SIGMA))
                .collect();
            return ConstellationFrame {
                points,
                reference_points: Vec::new(),
                spread: MAX_SPREAD,
                rotation: 0.0,
            };
        }

        let hunting = !report.has_lock && report.actual_modulation != report.configured_modulation;
        if hunting {
            let ratio = report.actual_modulation.order() as f64
                / report.configured_modulation.order() as f64;
            self.hunt_phase = (self.hunt_phase + HUNT_RATE_RAD_PER_S * ratio * dt) % TAU;
        } else if report.has_lock {
            self.hunt_phase = 0.0;
        }
        let offset_phase = if report.has_lock {
            0.0
        } else {
            (TAU * (report.frequency_offset_hz / 1e3) * self.elapsed_s) % TAU
        };
        let rotation = self.hunt_phase + offset_phase;
        let spin = Complex64::from_polar(1.0, rotation);

        let spread = noise_spread(report.cn_ratio_db);
        let symbols = ideal_points(report.actual_modulation);
        let points = (0..n)
            .map(|_| {
                let symbol = symbols[self.rng.gen_range(0..symbols.len())];
                symbol * spin + self.noise.complex(&mut self.rng, spread)
            })
            .collect();

        ConstellationFrame {
            points,
            reference_points: ideal_points(report.configured_modulation),
            spread,
            rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::VisibilityStatus;
    use rfchain_core::Modulation;

    fn locked(cn_db: f64) -> CarrierReport {
        CarrierReport {
            has_carrier: true,
            has_lock: true,
            cn_ratio_db: cn_db,
            actual_modulation: Modulation::Qpsk,
            configured_modulation: Modulation::Qpsk,
            frequency_offset_hz: 0.0,
            status: VisibilityStatus::Found,
        }
    }

    #[test]
    fn test_no_carrier_is_noise_only() {
        let mut sim = IqConstellationSimulator::new(1);
        let frame = sim.render(&CarrierReport::no_carrier(Modulation::Qpsk), 0.25, 200);
        assert_eq!(frame.points.len(), 200);
        assert!(frame.reference_points.is_empty());
        let mean_power: f64 =
            frame.points.iter().map(|p| p.norm_sqr()).sum::<f64>() / frame.points.len() as f64;
        // E|z|² = 2σ² = 2
        assert!(mean_power > 1.2 && mean_power < 2.8);
    }

    #[test]
    fn test_locked_points_cluster_on_reference() {
        let mut sim = IqConstellationSimulator::new(2);
        let frame = sim.render(&locked(30.0), 0.25, 100);
        assert_eq!(frame.reference_points.len(), 4);
        assert!((frame.spread - noise_spread(30.0)).abs() < 1e-12);
        assert_eq!(frame.rotation, 0.0);
        for p in &frame.points {
            let nearest = frame
                .reference_points
                .iter()
                .map(|r| (p - r).norm())
                .fold(f64::INFINITY, f64::min);
            assert!(nearest < 0.2);
        }
    }

    #[test]
    fn test_hunting_rotation_accumulates() {
        let mut sim = IqConstellationSimulator::new(3);
        let report = CarrierReport {
            has_lock: false,
            actual_modulation: Modulation::Qam8,
            status: VisibilityStatus::NoSignal,
            ..locked(15.0)
        };
        sim.render(&report, 0.1, 8);
        let first = sim.hunt_phase();
        sim.render(&report, 0.1, 8);
        // Order ratio 8/4 doubles the rate
        assert!((first - HUNT_RATE_RAD_PER_S * 2.0 * 0.1).abs() < 1e-12);
        assert!((sim.hunt_phase() - 2.0 * first).abs() < 1e-12);
        sim.render(&locked(15.0), 0.1, 8);
        assert_eq!(sim.hunt_phase(), 0.0);
    }

    #[test]
    fn test_offset_rotation_while_unlocked() {
        let mut sim = IqConstellationSimulator::new(4);
        let report = CarrierReport {
            has_lock: false,
            frequency_offset_hz: 100.0,
            ..locked(5.0)
        };
        let frame = sim.render(&report, 1.0, 4);
        // 2π · 0.1 kHz · 1 s
        assert!((frame.rotation - TAU * 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_frames_repeat() {
        let mut a = IqConstellationSimulator::new(9);
        let mut b = IqConstellationSimulator::new(9);
        assert_eq!(a.render(&locked(12.0), 0.25, 32), b.render(&locked(12.0), 0.25, 32));
    }
}
