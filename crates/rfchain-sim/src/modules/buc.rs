//! Block Upconverter
//!
//! Converts modem IF to the uplink band (`RF = IF + LO + error`) and drives
//! the HPA. Output is hard-limited at the saturation power. Loopback routes
//! the upconverted output back toward the receive chain instead of the HPA;
//! the orchestrator performs that routing.

use super::gpsdo::ReferenceStatus;
use super::lo_frequency_error_hz;
use crate::config::SimConfig;
use crate::module::{differs, ModuleBehavior, ModuleKind};
use rfchain_core::units::{relax_toward, sum_dbm, MIN_DB};
use rfchain_core::{sanitize, IfSignal, RfSignal, SignalOrigin};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/// Case temperature while running (°C above ambient)
const OPERATING_RISE_C: f64 = 15.0;
const THERMAL_TAU_S: f64 = 120.0;
/// Supply current with RF muted (A)
const IDLE_CURRENT_A: f64 = 0.8;
/// Additional current when transmitting (A)
const ACTIVE_CURRENT_A: f64 = 0.6;
/// Over-temperature alarm threshold (°C)
pub const MAX_TEMPERATURE_C: f64 = 65.0;

const LO_RANGE_MHZ: (f64, f64) = (3000.0, 30000.0);
const GAIN_RANGE_DB: (f64, f64) = (0.0, 60.0);
const SATURATION_RANGE_DBM: (f64, f64) = (-10.0, 40.0);
const DRIFT_ALARM_HZ: f64 = 1000.0;

/// BUC state record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BucState {
    pub is_powered: bool,
    pub is_muted: bool,
    pub is_loopback: bool,
    /// Local oscillator (MHz)
    pub lo_frequency: f64,
    /// Conversion gain (dB)
    pub gain: f64,
    /// Output saturation (dBm)
    pub saturation_power: f64,
    /// Composite output power (dBm)
    pub output_power: f64,
    pub is_saturated: bool,
    pub is_ext_ref_locked: bool,
    /// LO frequency error (Hz)
    pub frequency_error: f64,
    /// Case temperature (°C)
    pub temperature: f64,
    /// Supply current (A)
    pub current_draw: f64,
    pub aging_drift_ppm: f64,
    pub drift_direction: f64,
}

impl Default for BucState {
    fn default() -> Self {
        Self {
            is_powered: true,
            is_muted: false,
            is_loopback: false,
            lo_frequency: 4900.0,
            gain: 30.0,
            saturation_power: 20.0,
            output_power: MIN_DB,
            is_saturated: false,
            is_ext_ref_locked: true,
            frequency_error: 0.0,
            temperature: 40.0,
            current_draw: IDLE_CURRENT_A,
            aging_drift_ppm: 0.1,
            drift_direction: 1.0,
        }
    }
}

/// BUC physics core
#[derive(Debug, Clone)]
pub struct Buc {
    state: BucState,
    ambient_c: f64,
}

impl Buc {
    pub fn new(config: &SimConfig) -> Self {
        let state = BucState {
            temperature: config.ambient_temperature_c + OPERATING_RISE_C,
            ..Default::default()
        };
        Self {
            state,
            ambient_c: config.ambient_temperature_c,
        }
    }

    pub fn handle_power_toggle(&mut self, on: bool) -> &BucState {
        if on != self.state.is_powered {
            info!(on, "BUC power toggled");
        }
        self.state.is_powered = on;
        if !on {
            self.state.is_ext_ref_locked = false;
            self.state.frequency_error = 0.0;
            self.state.output_power = MIN_DB;
            self.state.is_saturated = false;
            self.state.current_draw = 0.0;
        }
        &self.state
    }

    pub fn handle_mute_toggle(&mut self, muted: bool) -> &BucState {
        debug!(muted, "BUC mute");
        self.state.is_muted = muted;
        &self.state
    }

    pub fn handle_loopback_toggle(&mut self, loopback: bool) -> &BucState {
        info!(loopback, "BUC loopback");
        self.state.is_loopback = loopback;
        &self.state
    }

    pub fn handle_gain_change(&mut self, gain_db: f64) -> &BucState {
        let (lo, hi) = GAIN_RANGE_DB;
        if let Some(v) = sanitize("buc.gain", gain_db, lo, hi) {
            self.state.gain = v;
        }
        &self.state
    }

    pub fn handle_lo_frequency_change(&mut self, lo_mhz: f64) -> &BucState {
        let (lo, hi) = LO_RANGE_MHZ;
        if let Some(v) = sanitize("buc.loFrequency", lo_mhz, lo, hi) {
            self.state.lo_frequency = v;
        }
        &self.state
    }

    pub fn handle_saturation_power_change(&mut self, dbm: f64) -> &BucState {
        let (lo, hi) = SATURATION_RANGE_DBM;
        if let Some(v) = sanitize("buc.saturationPower", dbm, lo, hi) {
            self.state.saturation_power = v;
        }
        &self.state
    }

    /// True when RF is leaving the BUC toward the HPA
    pub fn is_transmitting(&self) -> bool {
        self.state.is_powered && !self.state.is_muted && !self.state.is_loopback
    }

    pub fn update(&mut self, dt_s: f64, reference: &ReferenceStatus) {
        if !dt_s.is_finite() || dt_s < 0.0 {
            return;
        }
        let target_temp = if self.state.is_powered {
            self.ambient_c + OPERATING_RISE_C
        } else {
            self.ambient_c
        };
        self.state.temperature =
            relax_toward(self.state.temperature, target_temp, dt_s, THERMAL_TAU_S);

        if !self.state.is_powered {
            self.state.is_ext_ref_locked = false;
            self.state.frequency_error = 0.0;
            self.state.current_draw = 0.0;
            return;
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
        self.state.current_draw = if self.state.is_muted {
            IDLE_CURRENT_A
        } else {
            IDLE_CURRENT_A + ACTIVE_CURRENT_A
        };
        trace!(
            freq_err_hz = self.state.frequency_error,
            temp_c = self.state.temperature,
            "BUC tick"
        );
    }

    /// Upconvert modem IF carriers. Empty when powered off or muted.
    pub fn process(&mut self, inputs: &[IfSignal]) -> Vec<RfSignal> {
        if !self.state.is_powered || self.state.is_muted {
            self.state.output_power = MIN_DB;
            self.state.is_saturated = false;
            return Vec::new();
        }
        let lo_mhz = self.state.lo_frequency + self.state.frequency_error / 1e6;
        let sat = self.state.saturation_power;
        let mut saturated = false;
        let out: Vec<RfSignal> = inputs
            .iter()
            .map(|sig| {
                let linear = sig.power + self.state.gain;
                saturated |= linear > sat;
                let mut rf = sig.clone().with_origin(SignalOrigin::Buc);
                rf.frequency = sig.frequency + lo_mhz;
                rf.power = linear.min(sat);
                rf
            })
            .collect();
        self.state.is_saturated = saturated;
        self.state.output_power = if out.is_empty() {
            MIN_DB
        } else {
            sum_dbm(out.iter().map(|s| s.power)).min(sat)
        };
        out
    }
}

impl ModuleBehavior for Buc {
    type State = BucState;

    fn kind(&self) -> ModuleKind {
        ModuleKind::Buc
    }

    fn state(&self) -> &BucState {
        &self.state
    }

    fn alarms(&self) -> Vec<String> {
        let s = &self.state;
        let mut alarms = Vec::new();
        if !s.is_powered {
            return alarms;
        }
        if !s.is_ext_ref_locked {
            alarms.push("BUC external reference not locked".to_string());
        }
        if s.frequency_error.abs() > DRIFT_ALARM_HZ {
            alarms.push("BUC LO frequency drift".to_string());
        }
        if s.is_saturated {
            alarms.push("BUC output saturated".to_string());
        }
        if s.is_muted {
            alarms.push("BUC RF output muted".to_string());
        }
        if s.is_loopback {
            alarms.push("BUC in loopback mode".to_string());
        }
        if s.temperature > MAX_TEMPERATURE_C {
            alarms.push("BUC over-temperature".to_string());
        }
        alarms
    }

    fn is_powered(&self) -> bool {
        self.state.is_powered
    }

    fn status_changed(&self, previous: &BucState) -> bool {
        let s = &self.state;
        s.is_powered != previous.is_powered
            || s.is_muted != previous.is_muted
            || s.is_loopback != previous.is_loopback
            || s.is_saturated != previous.is_saturated
            || s.is_ext_ref_locked != previous.is_ext_ref_locked
            || s.lo_frequency != previous.lo_frequency
            || s.gain != previous.gain
            || differs(s.output_power, previous.output_power, 0.1)
            || differs(s.frequency_error, previous.frequency_error, 100.0)
            || differs(s.temperature, previous.temperature, 0.5)
    }

    fn apply_state(&mut self, state: BucState) {
        self.state = state;
        if !self.state.is_powered {
            self.state.is_ext_ref_locked = false;
            self.state.current_draw = 0.0;
        }
    }
}
