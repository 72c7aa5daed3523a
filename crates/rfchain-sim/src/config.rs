//! Simulation configuration
//!
//! Tick rates, randomness and environment constants shared by every module.

use rfchain_core::{RfError, RfResult};
use serde::{Deserialize, Serialize};

/// Slowest and fastest allowed physics update rates
pub const UPDATE_RATE_RANGE_HZ: (f64, f64) = (1.0, 10.0);

/// Nominal GPSDO oven warmup
pub const WARMUP_TIME_S: f64 = 600.0;

/// GPSDO oven warmup in fast mode
pub const FAST_WARMUP_TIME_S: f64 = 10.0;

/// Configuration for the front-end simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimConfig {
    /// Physics update rate in Hz
    pub update_rate_hz: f64,
    /// Interval between persistence sync ticks in seconds
    pub sync_interval_s: f64,
    /// Accelerated warmup for test benches
    pub fast_mode: bool,
    /// Base seed for all module RNGs
    pub seed: u64,
    /// Ambient temperature in °C
    pub ambient_temperature_c: f64,
    /// Delay between enabling GNSS and satellite acquisition
    pub gnss_acquisition_delay_s: f64,
    /// LNB thermal stabilization time
    pub lnb_stabilization_time_s: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            update_rate_hz: 4.0,
            sync_interval_s: 30.0,
            fast_mode: false,
            seed: 42,
            ambient_temperature_c: 25.0,
            gnss_acquisition_delay_s: 5.0,
            lnb_stabilization_time_s: 300.0,
        }
    }
}

impl SimConfig {
    /// Configuration for test benches: fast warmup, fixed seed
    pub fn fast() -> Self {
        Self {
            fast_mode: true,
            ..Default::default()
        }
    }

    /// Parse from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> RfResult<Self> {
        let cfg: SimConfig =
            serde_json::from_str(json).map_err(|e| RfError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg.normalized())
    }

    /// Reject values that cannot be clamped into something meaningful
    pub fn validate(&self) -> RfResult<()> {
        if !self.update_rate_hz.is_finite() || self.update_rate_hz <= 0.0 {
            return Err(RfError::Config(format!(
                "update rate must be positive, got {}",
                self.update_rate_hz
            )));
        }
        if !self.sync_interval_s.is_finite() || self.sync_interval_s <= 0.0 {
            return Err(RfError::Config(format!(
                "sync interval must be positive, got {}",
                self.sync_interval_s
            )));
        }
        Ok(())
    }

    /// Clamp rates into the supported range.
    ///
    /// Non-finite values fall back to the defaults; the sync interval is
    /// never shorter than one update period.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        let (lo, hi) = UPDATE_RATE_RANGE_HZ;
        self.update_rate_hz = finite_or(self.update_rate_hz, defaults.update_rate_hz).clamp(lo, hi);
        self.sync_interval_s = finite_or(self.sync_interval_s, defaults.sync_interval_s)
            .max(self.update_period_s());
        self.ambient_temperature_c =
            finite_or(self.ambient_temperature_c, defaults.ambient_temperature_c);
        self.gnss_acquisition_delay_s =
            finite_or(self.gnss_acquisition_delay_s, defaults.gnss_acquisition_delay_s).max(0.0);
        self.lnb_stabilization_time_s =
            finite_or(self.lnb_stabilization_time_s, defaults.lnb_stabilization_time_s).max(0.0);
        self
    }

    /// Seconds between physics updates
    pub fn update_period_s(&self) -> f64 {
        1.0 / self.update_rate_hz
    }

    /// GPSDO warmup duration in seconds
    pub fn warmup_time_s(&self) -> f64 {
        if self.fast_mode {
            FAST_WARMUP_TIME_S
        } else {
            WARMUP_TIME_S
        }
    }

    /// Seed for one module's RNG
    pub fn module_seed(&self, offset: u64) -> u64 {
        self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(offset)
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.update_period_s(), 0.25);
        assert_eq!(cfg.warmup_time_s(), WARMUP_TIME_S);
        assert_eq!(SimConfig::fast().warmup_time_s(), FAST_WARMUP_TIME_S);
    }

    #[test]
    fn test_from_json_partial() {
        let cfg = SimConfig::from_json_str(r#"{"updateRateHz": 50, "seed": 7}"#).unwrap();
        assert_eq!(cfg.update_rate_hz, 10.0);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.sync_interval_s, 30.0);
    }

    #[test]
    fn test_from_json_rejects_bad_rate() {
        assert!(SimConfig::from_json_str(r#"{"updateRateHz": 0}"#).is_err());
        assert!(SimConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_normalized_repairs_degenerate_rates() {
        let cfg = SimConfig {
            update_rate_hz: f64::NAN,
            sync_interval_s: 0.0,
            gnss_acquisition_delay_s: f64::INFINITY,
            ..Default::default()
        }
        .normalized();
        assert_eq!(cfg.update_rate_hz, 4.0);
        assert_eq!(cfg.sync_interval_s, 0.25);
        assert_eq!(cfg.gnss_acquisition_delay_s, 5.0);

        let cfg = SimConfig {
            sync_interval_s: f64::NAN,
            ..Default::default()
        }
        .normalized();
        assert_eq!(cfg.sync_interval_s, 30.0);
    }

    #[test]
    fn test_module_seeds_differ() {
        let cfg = SimConfig::default();
        assert_ne!(cfg.module_seed(1), cfg.module_seed(2));
    }
}
