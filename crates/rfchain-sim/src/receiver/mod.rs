//! Receiver modem front
//!
//! A modem tuned to one carrier. [`Receiver::evaluate`] runs the visibility
//! filter over what the antenna delivers and condenses the result into a
//! [`CarrierReport`], which drives the constellation display.

pub mod iq;
pub mod visibility;

pub use iq::{ConstellationFrame, IqConstellationSimulator};
pub use visibility::{
    filter_visible_signals, VisibilityResult, VisibilityStatus, VisibleSignal,
};

use rfchain_core::units::{spans_overlap, thermal_noise_floor_dbm, MIN_DB};
use rfchain_core::{FecRate, Modulation, RfSignal};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// What the modem is tuned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModemConfig {
    pub antenna_id: String,
    /// Tuned center (MHz)
    pub frequency: f64,
    /// Tuned bandwidth (MHz)
    pub bandwidth: f64,
    pub modulation: Modulation,
    pub fec: FecRate,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            antenna_id: String::new(),
            frequency: 4700.0,
            bandwidth: 50.0,
            modulation: Modulation::Qpsk,
            fec: FecRate::R3_4,
        }
    }
}

impl ModemConfig {
    /// `[frequency - bandwidth/2, frequency + bandwidth/2]` in MHz
    pub fn tuned_span(&self) -> (f64, f64) {
        let half = self.bandwidth / 2.0;
        (self.frequency - half, self.frequency + half)
    }
}

/// Demodulator view of the tuned carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierReport {
    /// Some energy overlaps the tuned span
    pub has_carrier: bool,
    pub has_lock: bool,
    pub cn_ratio_db: f64,
    /// Modulation of the strongest carrier in the tuned span
    pub actual_modulation: Modulation,
    pub configured_modulation: Modulation,
    /// Carrier offset from the tuned frequency, LO error included (Hz)
    pub frequency_offset_hz: f64,
    pub status: VisibilityStatus,
}

impl CarrierReport {
    /// Nothing in the tuned span
    pub fn no_carrier(configured: Modulation) -> Self {
        Self {
            has_carrier: false,
            has_lock: false,
            cn_ratio_db: MIN_DB,
            actual_modulation: configured,
            configured_modulation: configured,
            frequency_offset_hz: 0.0,
            status: VisibilityStatus::NoSignal,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Receiver {
    modem: ModemConfig,
}

impl Receiver {
    pub fn new(modem: ModemConfig) -> Self {
        Self { modem }
    }

    pub fn modem(&self) -> &ModemConfig {
        &self.modem
    }

    pub fn retune(&mut self, modem: ModemConfig) {
        self.modem = modem;
    }

    /// Evaluate carriers arriving from antenna `antenna_id`.
    ///
    /// `noise_temperature_k` sets the noise floor over the modem bandwidth;
    /// `lo_error_hz` is the downconverter error added to the offset.
    pub fn evaluate(
        &self,
        antenna_id: &str,
        signals: &[RfSignal],
        noise_temperature_k: f64,
        lo_error_hz: f64,
    ) -> CarrierReport {
        let configured = self.modem.modulation;
        if antenna_id != self.modem.antenna_id {
            return CarrierReport::no_carrier(configured);
        }
        let (lo, hi) = self.modem.tuned_span();
        let strongest = signals
            .iter()
            .filter(|s| spans_overlap(s.lower_edge(), s.upper_edge(), lo, hi))
            .max_by(|a, b| a.power.total_cmp(&b.power));
        let Some(carrier) = strongest else {
            return CarrierReport::no_carrier(configured);
        };

        let visibility = filter_visible_signals(signals, &self.modem);
        let noise_floor = thermal_noise_floor_dbm(noise_temperature_k, self.modem.bandwidth * 1e6);
        // Prefer the demodulated carrier when the filter kept exactly one
        let measured = match (visibility.status, visibility.signals.first()) {
            (VisibilityStatus::Found, Some(v)) => &v.signal,
            _ => carrier,
        };
        let cn_ratio_db = measured.power - noise_floor;
        let clean = matches!(visibility.signals.first(), Some(v) if !v.is_degraded);
        let has_lock = visibility.status == VisibilityStatus::Found
            && clean
            && cn_ratio_db > configured.lock_threshold_db();
        let frequency_offset_hz = (measured.frequency - self.modem.frequency) * 1e6 + lo_error_hz;

        trace!(
            status = %visibility.status,
            cn_db = cn_ratio_db,
            has_lock,
            "Receiver evaluate"
        );
        CarrierReport {
            has_carrier: true,
            has_lock,
            cn_ratio_db,
            actual_modulation: measured.modulation,
            configured_modulation: configured,
            frequency_offset_hz,
            status: visibility.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver() -> Receiver {
        Receiver::new(ModemConfig {
            antenna_id: "ant-1".into(),
            ..Default::default()
        })
    }

    fn sig(freq: f64, power: f64, modulation: Modulation) -> RfSignal {
        RfSignal::new("s", freq, power, 10.0, modulation, FecRate::R3_4)
    }

    #[test]
    fn test_locks_on_clean_strong_carrier() {
        let r = receiver();
        // Noise floor at 50 K over 50 MHz ≈ -104.6 dBm
        let report = r.evaluate("ant-1", &[sig(4700.0, -80.0, Modulation::Qpsk)], 50.0, 0.0);
        assert!(report.has_carrier);
        assert!(report.has_lock);
        assert_eq!(report.status, VisibilityStatus::Found);
        let floor = -198.6 + 10.0 * 50f64.log10() + 10.0 * 50e6f64.log10();
        assert!((report.cn_ratio_db - (-80.0 - floor)).abs() < 1e-9);
    }

    #[test]
    fn test_weak_carrier_no_lock() {
        let r = receiver();
        let report = r.evaluate("ant-1", &[sig(4700.0, -100.0, Modulation::Qpsk)], 50.0, 0.0);
        assert!(report.has_carrier);
        assert!(report.cn_ratio_db < 7.0);
        assert!(!report.has_lock);
    }

    #[test]
    fn test_wrong_modulation_has_carrier_without_lock() {
        let r = receiver();
        let report = r.evaluate("ant-1", &[sig(4700.0, -80.0, Modulation::Qam16)], 50.0, 0.0);
        assert!(report.has_carrier);
        assert!(!report.has_lock);
        assert_eq!(report.actual_modulation, Modulation::Qam16);
        assert_eq!(report.configured_modulation, Modulation::Qpsk);
        assert_eq!(report.status, VisibilityStatus::NoSignal);
    }

    #[test]
    fn test_offset_and_antenna_mismatch() {
        let r = receiver();
        let report = r.evaluate("ant-1", &[sig(4701.0, -80.0, Modulation::Qpsk)], 50.0, 250.0);
        assert!((report.frequency_offset_hz - 1_000_250.0).abs() < 1e-6);
        let other = r.evaluate("ant-2", &[sig(4700.0, -80.0, Modulation::Qpsk)], 50.0, 0.0);
        assert!(!other.has_carrier);
        let empty = r.evaluate("ant-1", &[], 50.0, 0.0);
        assert_eq!(empty, CarrierReport::no_carrier(Modulation::Qpsk));
    }
}
