//! Decibel and Noise Arithmetic
//!
//! Conversions between log and linear units, the Friis cascade for noise
//! factor, and the Boltzmann thermal noise floor.
//!
//! ## Friis cascade
//!
//! ```text
//!   F_total = F1 + (F2 - 1)/G1 + (F3 - 1)/(G1·G2) + ...
//!   T_e     = T0 · (F_total - 1),   T0 = 290 K
//! ```
//!
//! ## Example
//!
//! ```rust
//! use rfchain_core::units::{friis_noise_factor, noise_temperature_from_factor, Stage};
//!
//! let stages = [Stage::from_db(0.6, 30.0), Stage::from_db(8.0, 25.0)];
//! let f = friis_noise_factor(&stages);
//! let t = noise_temperature_from_factor(f);
//! assert!(t > 40.0 && t < 50.0);
//! ```

/// Standard reference temperature for noise figure (K)
pub const T0_KELVIN: f64 = 290.0;

/// Boltzmann constant expressed in dBm/K/Hz (10·log10(k) + 30)
pub const BOLTZMANN_DBM_PER_K_HZ: f64 = -198.6;

/// Floor returned for the log of a non-positive quantity
pub const MIN_DB: f64 = -300.0;

pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 10.0)
}

/// Power ratio to dB; non-positive ratios map to [`MIN_DB`]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear > 0.0 {
        10.0 * linear.log10()
    } else {
        MIN_DB
    }
}

pub fn dbm_to_watts(dbm: f64) -> f64 {
    10.0_f64.powf((dbm - 30.0) / 10.0)
}

pub fn watts_to_dbm(watts: f64) -> f64 {
    if watts > 0.0 {
        10.0 * watts.log10() + 30.0
    } else {
        MIN_DB
    }
}

/// Noise factor (linear) from noise figure (dB)
pub fn noise_factor_from_figure(nf_db: f64) -> f64 {
    db_to_linear(nf_db)
}

/// Noise figure (dB) from noise factor (linear)
pub fn noise_figure_from_factor(f: f64) -> f64 {
    linear_to_db(f)
}

/// Equivalent noise temperature of a noise factor
pub fn noise_temperature_from_factor(f: f64) -> f64 {
    T0_KELVIN * (f - 1.0).max(0.0)
}

/// Noise factor of an equivalent noise temperature
pub fn noise_factor_from_temperature(t_kelvin: f64) -> f64 {
    1.0 + t_kelvin.max(0.0) / T0_KELVIN
}

/// One stage of a cascade in linear units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    /// Noise factor (≥ 1)
    pub noise_factor: f64,
    /// Available power gain (linear, > 0)
    pub gain: f64,
}

impl Stage {
    pub fn new(noise_factor: f64, gain: f64) -> Self {
        Self { noise_factor, gain }
    }

    pub fn from_db(noise_figure_db: f64, gain_db: f64) -> Self {
        Self {
            noise_factor: noise_factor_from_figure(noise_figure_db),
            gain: db_to_linear(gain_db),
        }
    }

    /// A passive lossy stage: F = L, G = 1/L
    pub fn passive(loss_db: f64) -> Self {
        let loss = db_to_linear(loss_db.max(0.0));
        Self {
            noise_factor: loss,
            gain: 1.0 / loss,
        }
    }
}

/// Cascaded noise factor of `stages` in signal order.
///
/// An empty cascade is noiseless (F = 1). Gains are floored to a tiny
/// positive value so a zero-gain stage cannot divide by zero.
pub fn friis_noise_factor(stages: &[Stage]) -> f64 {
    let mut total = 1.0;
    let mut cumulative_gain = 1.0;
    for (i, stage) in stages.iter().enumerate() {
        let f = stage.noise_factor.max(1.0);
        if i == 0 {
            total = f;
        } else {
            total += (f - 1.0) / cumulative_gain;
        }
        cumulative_gain *= stage.gain.max(1e-30);
    }
    total
}

/// Two-stage cascade `F1 + (F2 - 1)/G1`, all linear
pub fn friis_two_stage(f1: f64, f2: f64, g1: f64) -> f64 {
    friis_noise_factor(&[Stage::new(f1, g1), Stage::new(f2, 1.0)])
}

/// Thermal noise floor in dBm: `-198.6 + 10·log10(T) + 10·log10(B)`.
///
/// `bandwidth_hz` in Hz. A non-positive temperature or bandwidth has no
/// noise power and returns [`MIN_DB`].
pub fn thermal_noise_floor_dbm(t_sys_kelvin: f64, bandwidth_hz: f64) -> f64 {
    if t_sys_kelvin <= 0.0 || bandwidth_hz <= 0.0 {
        return MIN_DB;
    }
    BOLTZMANN_DBM_PER_K_HZ + 10.0 * t_sys_kelvin.log10() + 10.0 * bandwidth_hz.log10()
}

/// Sum of powers given in dBm
pub fn sum_dbm<I: IntoIterator<Item = f64>>(powers: I) -> f64 {
    let watts: f64 = powers.into_iter().map(dbm_to_watts).sum();
    watts_to_dbm(watts)
}

/// Fraction of the span `[lo, hi]` that lies outside `[band_lo, band_hi]`.
///
/// Returns 0 when fully inside and 1 when fully outside. A zero-width span
/// is treated as a point.
pub fn fraction_outside_band(lo: f64, hi: f64, band_lo: f64, band_hi: f64) -> f64 {
    let width = hi - lo;
    if width <= 0.0 {
        return if lo >= band_lo && lo <= band_hi { 0.0 } else { 1.0 };
    }
    let overlap = (hi.min(band_hi) - lo.max(band_lo)).max(0.0);
    (1.0 - overlap / width).clamp(0.0, 1.0)
}

/// True when the spans `[a_lo, a_hi]` and `[b_lo, b_hi]` share any frequency
pub fn spans_overlap(a_lo: f64, a_hi: f64, b_lo: f64, b_hi: f64) -> bool {
    a_lo <= b_hi && b_lo <= a_hi
}

/// First-order exponential relaxation of `current` toward `target`
pub fn relax_toward(current: f64, target: f64, dt_s: f64, tau_s: f64) -> f64 {
    if tau_s <= 0.0 {
        return target;
    }
    let alpha = 1.0 - (-dt_s.max(0.0) / tau_s).exp();
    current + (target - current) * alpha
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_roundtrip_values() {
        assert!((db_to_linear(3.0) - 1.995).abs() < 0.01);
        assert!((linear_to_db(100.0) - 20.0).abs() < 1e-12);
        assert_eq!(linear_to_db(0.0), MIN_DB);
        assert!((watts_to_dbm(1.0) - 30.0).abs() < 1e-12);
        assert!((dbm_to_watts(0.0) - 0.001).abs() < 1e-15);
        assert_eq!(watts_to_dbm(-1.0), MIN_DB);
    }

    #[test]
    fn test_friis_two_stage_matches_formula() {
        let cases = [(1.0, 1.0, 1.0), (1.15, 6.3, 1000.0), (2.0, 10.0, 5.0)];
        for (f1, f2, g1) in cases {
            let f = friis_two_stage(f1, f2, g1);
            let expected = f1 + (f2 - 1.0) / g1;
            assert!((f - expected).abs() < 1e-12);
            let t = noise_temperature_from_factor(f);
            assert!((t - 290.0 * (f1 + (f2 - 1.0) / g1 - 1.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_friis_monotonic_in_first_gain() {
        let mut previous = f64::INFINITY;
        for g_db in [0.0, 5.0, 10.0, 20.0, 30.0, 40.0] {
            let f = friis_two_stage(1.2, 6.0, db_to_linear(g_db));
            assert!(f < previous);
            previous = f;
        }
    }

    #[test]
    fn test_friis_empty_and_passive() {
        assert_eq!(friis_noise_factor(&[]), 1.0);
        let loss = Stage::passive(3.0);
        assert!((noise_figure_from_factor(friis_noise_factor(&[loss])) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_noise_floor() {
        // 290 K over 1 Hz is the textbook -174 dBm/Hz
        let n = thermal_noise_floor_dbm(290.0, 1.0);
        assert!((n - (-174.0)).abs() < 0.05);
        let n_mhz = thermal_noise_floor_dbm(290.0, 1e6);
        assert!((n_mhz - n - 60.0).abs() < 1e-9);
        assert_eq!(thermal_noise_floor_dbm(0.0, 1e6), MIN_DB);
        assert_eq!(thermal_noise_floor_dbm(100.0, 0.0), MIN_DB);
    }

    #[test]
    fn test_fraction_outside_band() {
        assert_eq!(fraction_outside_band(1000.0, 1010.0, 950.0, 2150.0), 0.0);
        assert_eq!(fraction_outside_band(100.0, 110.0, 950.0, 2150.0), 1.0);
        let f = fraction_outside_band(940.0, 960.0, 950.0, 2150.0);
        assert!((f - 0.5).abs() < 1e-12);
        assert_eq!(fraction_outside_band(1000.0, 1000.0, 950.0, 2150.0), 0.0);
    }

    #[test]
    fn test_relax_toward() {
        let t = relax_toward(25.0, 70.0, 1e9, 100.0);
        assert!((t - 70.0).abs() < 1e-9);
        let t = relax_toward(25.0, 70.0, 100.0, 100.0);
        assert!((t - (70.0 - 45.0 * (-1.0f64).exp())).abs() < 1e-9);
        assert_eq!(relax_toward(25.0, 70.0, 1.0, 0.0), 70.0);
    }

    #[test]
    fn test_sum_dbm() {
        let total = sum_dbm([0.0, 0.0]);
        assert!((total - 3.0103).abs() < 1e-3);
        assert_eq!(sum_dbm(std::iter::empty()), MIN_DB);
    }
}
