//! Low-Noise Block Downconverter
//!
//! Converts the C-band downlink to L-band IF with high-side injection:
//!
//! ```text
//!   IF = (LO + frequency_error) - RF
//! ```
//!
//! Noise temperature follows the two-stage Friis cascade of the LNA and
//! mixer. After power-on the unit is cold: noise temperature starts at twice
//! nominal and physical temperature at ambient, and both relax toward their
//! operating values with τ = stabilization_time / 3.

use super::gpsdo::ReferenceStatus;
use super::lo_frequency_error_hz;
use crate::config::SimConfig;
use crate::module::{differs, ModuleBehavior, ModuleKind};
use rfchain_core::units::{
    db_to_linear, fraction_outside_band, friis_two_stage, noise_factor_from_figure,
    noise_temperature_from_factor, relax_toward, thermal_noise_floor_dbm,
};
use rfchain_core::{sanitize, IfSignal, RfSignal, SignalOrigin};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/// IF passband (MHz)
pub const IF_BAND_MHZ: (f64, f64) = (950.0, 2150.0);

/// Attenuation of a signal converted entirely outside the IF band (dB)
pub const OUT_OF_BAND_ATTENUATION_DB: f64 = 40.0;

/// Physical operating temperature once stabilized (°C)
pub const OPERATING_TEMPERATURE_C: f64 = 45.0;

/// Over-temperature alarm threshold (°C)
pub const MAX_TEMPERATURE_C: f64 = 70.0;

const LO_RANGE_MHZ: (f64, f64) = (3000.0, 12000.0);
const GAIN_RANGE_DB: (f64, f64) = (0.0, 70.0);
/// LO error that raises a drift alarm (Hz)
const DRIFT_ALARM_HZ: f64 = 1000.0;

/// LNB state record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LnbState {
    pub is_powered: bool,
    /// Local oscillator (MHz)
    pub lo_frequency: f64,
    /// Conversion gain (dB)
    pub gain: f64,
    pub lna_noise_figure: f64,
    pub lna_gain: f64,
    pub mixer_noise_figure: f64,
    /// Equivalent input noise temperature (K)
    pub noise_temperature: f64,
    /// Physical temperature (°C)
    pub temperature: f64,
    pub is_ext_ref_locked: bool,
    /// LO frequency error (Hz)
    pub frequency_error: f64,
    pub aging_drift_ppm: f64,
    /// +1 or -1
    pub drift_direction: f64,
    /// Seconds to reach ~95 % of thermal equilibrium
    pub stabilization_time: f64,
    pub time_since_power_on: f64,
    pub is_thermally_stable: bool,
}

impl Default for LnbState {
    fn default() -> Self {
        let mut state = Self {
            is_powered: true,
            lo_frequency: 5150.0,
            gain: 55.0,
            lna_noise_figure: 0.6,
            lna_gain: 30.0,
            mixer_noise_figure: 8.0,
            noise_temperature: 0.0,
            temperature: OPERATING_TEMPERATURE_C,
            is_ext_ref_locked: true,
            frequency_error: 0.0,
            aging_drift_ppm: 0.1,
            drift_direction: 1.0,
            stabilization_time: 300.0,
            time_since_power_on: 3600.0,
            is_thermally_stable: true,
        };
        state.noise_temperature = state.nominal_noise_temperature();
        state
    }
}

impl LnbState {
    /// Friis noise temperature of the LNA + mixer cascade (K)
    pub fn nominal_noise_temperature(&self) -> f64 {
        let f_lna = noise_factor_from_figure(self.lna_noise_figure);
        let f_mixer = noise_factor_from_figure(self.mixer_noise_figure);
        let g_lna = db_to_linear(self.lna_gain);
        noise_temperature_from_factor(friis_two_stage(f_lna, f_mixer, g_lna))
    }
}

/// LNB physics core
#[derive(Debug, Clone)]
pub struct Lnb {
    state: LnbState,
    ambient_c: f64,
}

impl Lnb {
    pub fn new(config: &SimConfig) -> Self {
        let state = LnbState {
            stabilization_time: config.lnb_stabilization_time_s,
            ..Default::default()
        };
        Self {
            state,
            ambient_c: config.ambient_temperature_c,
        }
    }

    pub fn handle_power_toggle(&mut self, on: bool) -> &LnbState {
        if on == self.state.is_powered {
            return &self.state;
        }
        self.state.is_powered = on;
        self.state.time_since_power_on = 0.0;
        self.state.is_thermally_stable = false;
        if on {
            info!("LNB powered on");
            self.state.temperature = self.ambient_c;
            self.update_noise_temperature();
        } else {
            info!("LNB powered off");
            self.state.is_ext_ref_locked = false;
            self.state.frequency_error = 0.0;
        }
        &self.state
    }

    pub fn handle_lo_frequency_change(&mut self, lo_mhz: f64) -> &LnbState {
        let (lo, hi) = LO_RANGE_MHZ;
        if let Some(v) = sanitize("lnb.loFrequency", lo_mhz, lo, hi) {
            debug!(lo_mhz = v, "LNB LO changed");
            self.state.lo_frequency = v;
        }
        &self.state
    }

    pub fn handle_gain_change(&mut self, gain_db: f64) -> &LnbState {
        let (lo, hi) = GAIN_RANGE_DB;
        if let Some(v) = sanitize("lnb.gain", gain_db, lo, hi) {
            debug!(gain_db = v, "LNB gain changed");
            self.state.gain = v;
        }
        &self.state
    }

    /// Recompute noise temperature from the cascade and thermal state
    pub fn update_noise_temperature(&mut self) -> f64 {
        let nominal = self.state.nominal_noise_temperature();
        let settle = self.thermal_settle_factor();
        // Cold unit starts at 2× nominal
        self.state.noise_temperature = nominal * (1.0 + settle);
        self.state.noise_temperature
    }

    /// exp(-t/τ): 1 right after power-on, → 0 when settled
    fn thermal_settle_factor(&self) -> f64 {
        let tau = self.state.stabilization_time / 3.0;
        if tau <= 0.0 {
            return 0.0;
        }
        (-self.state.time_since_power_on / tau).exp()
    }

    /// Advance thermal and LO state by `dt_s` against the current reference
    pub fn update(&mut self, dt_s: f64, reference: &ReferenceStatus) {
        if !dt_s.is_finite() || dt_s < 0.0 {
            return;
        }
        if !self.state.is_powered {
            self.state.is_ext_ref_locked = false;
            self.state.frequency_error = 0.0;
            self.state.is_thermally_stable = false;
            self.state.time_since_power_on = 0.0;
            self.state.temperature = relax_toward(
                self.state.temperature,
                self.ambient_c,
                dt_s,
                (self.state.stabilization_time / 3.0).max(1.0),
            );
            return;
        }

        self.state.time_since_power_on += dt_s;
        let settle = self.thermal_settle_factor();
        self.state.temperature =
            OPERATING_TEMPERATURE_C + (self.ambient_c - OPERATING_TEMPERATURE_C) * settle;
        self.update_noise_temperature();
        let was_stable = self.state.is_thermally_stable;
        self.state.is_thermally_stable =
            self.state.time_since_power_on >= self.state.stabilization_time;
        if self.state.is_thermally_stable && !was_stable {
            info!(
                noise_temp_k = self.state.noise_temperature,
                "LNB thermally stable"
            );
        }

        self.state.is_ext_ref_locked = reference.is_present;
        self.state.frequency_error = lo_frequency_error_hz(
            self.state.lo_frequency,
            self.state.is_ext_ref_locked,
            reference.is_warmed_up,
            self.state.temperature,
            self.state.aging_drift_ppm,
            self.state.drift_direction,
        );
        trace!(
            noise_temp_k = self.state.noise_temperature,
            freq_err_hz = self.state.frequency_error,
            "LNB tick"
        );
    }

    /// Downconvert antenna-side signals to IF
    pub fn process(&self, inputs: &[RfSignal]) -> Vec<IfSignal> {
        if !self.state.is_powered {
            return Vec::new();
        }
        let lo_hz = self.state.lo_frequency * 1e6 + self.state.frequency_error;
        inputs
            .iter()
            .map(|sig| {
                let if_mhz = (lo_hz - sig.frequency * 1e6) / 1e6;
                let mut out = sig.clone().with_origin(SignalOrigin::Lnb);
                out.power = sig.power + self.state.gain;
                if if_mhz <= 0.0 {
                    // Low-side image, folded back and rejected
                    out.frequency = if_mhz.abs();
                    out.power -= OUT_OF_BAND_ATTENUATION_DB;
                } else {
                    out.frequency = if_mhz;
                    out.power -= passband_attenuation_db(if_mhz, sig.bandwidth);
                }
                out
            })
            .collect()
    }

    /// Thermal noise floor in dBm for `bandwidth_hz` at the LNB noise temperature
    pub fn get_noise_floor(&self, bandwidth_hz: f64) -> f64 {
        thermal_noise_floor_dbm(self.state.noise_temperature, bandwidth_hz)
    }
}

/// Attenuation of an IF carrier against the IF passband
fn passband_attenuation_db(if_mhz: f64, bandwidth_mhz: f64) -> f64 {
    let (lo, hi) = IF_BAND_MHZ;
    let half = bandwidth_mhz.max(0.0) / 2.0;
    OUT_OF_BAND_ATTENUATION_DB * fraction_outside_band(if_mhz - half, if_mhz + half, lo, hi)
}

impl ModuleBehavior for Lnb {
    type State = LnbState;

    fn kind(&self) -> ModuleKind {
        ModuleKind::Lnb
    }

    fn state(&self) -> &LnbState {
        &self.state
    }

    fn alarms(&self) -> Vec<String> {
        let s = &self.state;
        let mut alarms = Vec::new();
        if !s.is_powered {
            return alarms;
        }
        if !s.is_ext_ref_locked {
            alarms.push("LNB external reference not locked".to_string());
        }
        if s.frequency_error.abs() > DRIFT_ALARM_HZ {
            alarms.push("LNB LO frequency drift".to_string());
        }
        if !s.is_thermally_stable {
            alarms.push("LNB thermal stabilization in progress".to_string());
        }
        if s.temperature > MAX_TEMPERATURE_C {
            alarms.push("LNB over-temperature".to_string());
        }
        alarms
    }

    fn is_powered(&self) -> bool {
        self.state.is_powered
    }

    fn status_changed(&self, previous: &LnbState) -> bool {
        let s = &self.state;
        s.is_powered != previous.is_powered
            || s.is_ext_ref_locked != previous.is_ext_ref_locked
            || s.is_thermally_stable != previous.is_thermally_stable
            || s.lo_frequency != previous.lo_frequency
            || s.gain != previous.gain
            || differs(s.noise_temperature, previous.noise_temperature, 1.0)
            || differs(s.frequency_error, previous.frequency_error, 100.0)
            || differs(s.temperature, previous.temperature, 0.5)
    }

    fn apply_state(&mut self, state: LnbState) {
        self.state = state;
        if !self.state.is_powered {
            self.state.is_ext_ref_locked = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfchain_core::{FecRate, Modulation};

    fn locked_reference() -> ReferenceStatus {
        ReferenceStatus {
            is_present: true,
            is_locked: true,
            is_warmed_up: true,
            accuracy: 2e-11,
            phase_noise: -127.0,
        }
    }

    fn carrier(freq_mhz: f64, bw_mhz: f64) -> RfSignal {
        RfSignal::new("c", freq_mhz, -90.0, bw_mhz, Modulation::Qpsk, FecRate::R3_4)
    }

    #[test]
    fn test_friis_noise_temperature() {
        let s = LnbState::default();
        let f1 = 10f64.powf(0.06);
        let f2 = 10f64.powf(0.8);
        let g1 = 1000.0;
        let expected = 290.0 * (f1 + (f2 - 1.0) / g1 - 1.0);
        assert!((s.nominal_noise_temperature() - expected).abs() < 1e-9);
        assert!((s.noise_temperature - expected).abs() < 1e-9);
    }

    #[test]
    fn test_noise_temperature_decreases_with_lna_gain() {
        let mut s = LnbState::default();
        let mut last = f64::INFINITY;
        for g in [10.0, 20.0, 30.0, 40.0] {
            s.lna_gain = g;
            let t = s.nominal_noise_temperature();
            assert!(t < last);
            last = t;
        }
    }

    #[test]
    fn test_cold_start_settles() {
        let mut lnb = Lnb::new(&SimConfig::default());
        let nominal = lnb.state().nominal_noise_temperature();
        lnb.handle_power_toggle(false);
        lnb.handle_power_toggle(true);
        assert!((lnb.state().noise_temperature - 2.0 * nominal).abs() < 1e-9);
        assert_eq!(lnb.state().temperature, 25.0);

        let r = locked_reference();
        // One stabilization time = 3τ → within 5 % of nominal
        for _ in 0..300 {
            lnb.update(1.0, &r);
        }
        let excess = lnb.state().noise_temperature / nominal - 1.0;
        assert!(excess < 0.05 && excess > 0.0);
        assert!(lnb.state().is_thermally_stable);
    }

    #[test]
    fn test_frequency_error_zero_when_locked() {
        let mut lnb = Lnb::new(&SimConfig::default());
        lnb.update(1.0, &locked_reference());
        assert!(lnb.state().is_ext_ref_locked);
        assert_eq!(lnb.state().frequency_error, 0.0);

        let cold = ReferenceStatus {
            is_warmed_up: false,
            ..locked_reference()
        };
        lnb.update(1.0, &cold);
        assert!(lnb.state().frequency_error != 0.0);

        lnb.update(1.0, &ReferenceStatus::absent());
        assert!(!lnb.state().is_ext_ref_locked);
        // |45 - 50|·0.5 + 0.1 = 2.6 ppm of 5150 MHz
        assert!((lnb.state().frequency_error - 5150.0 * 2.6).abs() < 1e-3);
    }

    #[test]
    fn test_downconversion_high_side() {
        let lnb = Lnb::new(&SimConfig::default());
        let out = lnb.process(&[carrier(3950.0, 10.0)]);
        assert_eq!(out.len(), 1);
        assert!((out[0].frequency - 1200.0).abs() < 1e-9);
        assert!((out[0].power - (-90.0 + 55.0)).abs() < 1e-9);
        assert_eq!(out[0].origin, SignalOrigin::Lnb);
    }

    #[test]
    fn test_out_of_band_attenuated() {
        let lnb = Lnb::new(&SimConfig::default());
        // IF = 5150 - 4700 = 450 MHz, fully below band
        let out = lnb.process(&[carrier(4700.0, 10.0)]);
        assert!((out[0].power - (-90.0 + 55.0 - 40.0)).abs() < 1e-9);

        // IF = 950 MHz exactly at band edge: half the carrier outside
        let edge = lnb.process(&[carrier(4200.0, 20.0)]);
        assert!((edge[0].power - (-90.0 + 55.0 - 20.0)).abs() < 1e-9);

        // Image above LO
        let image = lnb.process(&[carrier(6000.0, 10.0)]);
        assert!((image[0].frequency - 850.0).abs() < 1e-9);
        assert!((image[0].power - (-90.0 + 55.0 - 40.0)).abs() < 1e-9);
    }

    #[test]
    fn test_powered_off_outputs_nothing() {
        let mut lnb = Lnb::new(&SimConfig::default());
        lnb.handle_power_toggle(false);
        assert!(lnb.process(&[carrier(3950.0, 10.0)]).is_empty());
        lnb.update(1.0, &locked_reference());
        assert!(!lnb.state().is_ext_ref_locked);
        assert!(lnb.alarms().is_empty());
    }

    #[test]
    fn test_noise_floor() {
        let lnb = Lnb::new(&SimConfig::default());
        let t = lnb.state().noise_temperature;
        let expected = -198.6 + 10.0 * t.log10() + 10.0 * (36e6f64).log10();
        assert!((lnb.get_noise_floor(36e6) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_bad_knob_input_ignored() {
        let mut lnb = Lnb::new(&SimConfig::default());
        lnb.handle_gain_change(f64::NAN);
        assert_eq!(lnb.state().gain, 55.0);
        lnb.handle_gain_change(500.0);
        assert_eq!(lnb.state().gain, 70.0);
        lnb.handle_lo_frequency_change(5760.0);
        assert_eq!(lnb.state().lo_frequency, 5760.0);
    }

    #[test]
    fn test_alarms_without_reference() {
        let mut lnb = Lnb::new(&SimConfig::default());
        lnb.update(1.0, &ReferenceStatus::absent());
        let alarms = lnb.alarms();
        assert!(alarms.iter().any(|a| a.contains("reference")));
        assert!(alarms.iter().any(|a| a.contains("drift")));
    }
}
