//! High-Power Amplifier
//!
//! ## Compression model
//!
//! The operating target is `P1dB - backOff`. Once the linear output
//! `P_in + gain` exceeds `target - 3 dB`, the effective gain drops 1 dB for
//! every dB of overdrive, pinning the output at the compression threshold:
//!
//! ```text
//!   P_out
//!     │            ┌────────────── target - 3
//!     │          ╱
//!     │        ╱  slope 1
//!     │      ╱
//!     └────────────────────── P_in
//! ```
//!
//! The gain is applied to every carrier from the composite input power.
//!
//! ## Interlock
//!
//! The HPA may only run while the BUC is powered. Attempting to power on
//! with the BUC off, or losing the BUC while running, trips the interlock
//! and forces the HPA off.

use crate::config::SimConfig;
use crate::module::{differs, ModuleBehavior, ModuleKind};
use rfchain_core::units::{dbm_to_watts, sum_dbm, MIN_DB};
use rfchain_core::{sanitize, RfSignal, SignalOrigin};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Upper limit on amplifier gain (dB).
///
/// A -50 dBm drive at P1dB 50 dBm and 6 dB back-off must come out at
/// +10 dBm in the linear region, which takes 60 dB; a 50 dB ceiling would
/// leave that operating point unreachable.
pub const MAX_GAIN_DB: f64 = 60.0;
/// Compression begins this far below the operating target (dB)
pub const COMPRESSION_MARGIN_DB: f64 = 3.0;
/// Back-off below which the amplifier is overdriven (dB)
pub const MIN_SAFE_BACK_OFF_DB: f64 = 3.0;
/// IMD at the reference back-off (dBc)
pub const IMD_REFERENCE_DBC: f64 = -30.0;
/// Back-off where IMD equals the reference (dB)
pub const IMD_REFERENCE_BACK_OFF_DB: f64 = 6.0;
/// IMD above which linearity is degraded (dBc)
pub const IMD_ALARM_DBC: f64 = -25.0;
pub const MAX_TEMPERATURE_C: f64 = 85.0;
pub const MAX_CURRENT_A: f64 = 20.0;
/// DC supply rail (V)
pub const SUPPLY_VOLTAGE_V: f64 = 28.0;
/// Heat-sink rise per dissipated watt (°C/W)
const THERMAL_RESISTANCE_C_PER_W: f64 = 10.0;
/// Bias current with RF off (A)
const IDLE_CURRENT_A: f64 = 0.5;

const BACK_OFF_RANGE_DB: (f64, f64) = (0.0, 20.0);
const P1DB_RANGE_DBM: (f64, f64) = (30.0, 70.0);

/// HPA state record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HpaState {
    pub is_powered: bool,
    /// 1 dB compression point (dBm)
    pub p1db: f64,
    /// Operating back-off from P1dB (dB)
    pub back_off: f64,
    /// Small-signal gain (dB)
    pub gain: f64,
    /// Gain after compression (dB)
    pub effective_gain: f64,
    /// Composite input (dBm)
    pub input_power: f64,
    /// Composite output (dBm)
    pub output_power: f64,
    /// Third-order intermodulation (dBc)
    pub imd: f64,
    /// DC to RF efficiency, 0..1
    pub efficiency: f64,
    /// Heat-sink temperature (°C)
    pub temperature: f64,
    /// Supply current (A)
    pub current_draw: f64,
    pub is_overdriven: bool,
    pub is_compressed: bool,
    pub is_interlock_tripped: bool,
}

impl Default for HpaState {
    fn default() -> Self {
        Self {
            is_powered: true,
            p1db: 50.0,
            back_off: 6.0,
            gain: 60.0,
            effective_gain: 60.0,
            input_power: MIN_DB,
            output_power: MIN_DB,
            imd: imd_dbc(6.0),
            efficiency: 0.35,
            temperature: 25.0,
            current_draw: IDLE_CURRENT_A,
            is_overdriven: false,
            is_compressed: false,
            is_interlock_tripped: false,
        }
    }
}

impl HpaState {
    /// Output target `P1dB - backOff` (dBm)
    pub fn target_output(&self) -> f64 {
        self.p1db - self.back_off
    }

    /// Output above which the gain compresses, `P1dB - backOff - 3` (dBm).
    ///
    /// Referred to the output, so overdrive is measured as
    /// `input + gain - threshold` and taken off the gain 1:1.
    pub fn compression_threshold(&self) -> f64 {
        self.target_output() - COMPRESSION_MARGIN_DB
    }
}

/// IMD for a back-off, 2 dB per dB of back-off change
pub fn imd_dbc(back_off_db: f64) -> f64 {
    IMD_REFERENCE_DBC + 2.0 * (IMD_REFERENCE_BACK_OFF_DB - back_off_db)
}

/// HPA physics core
#[derive(Debug, Clone)]
pub struct Hpa {
    state: HpaState,
    ambient_c: f64,
}

impl Hpa {
    pub fn new(config: &SimConfig) -> Self {
        let state = HpaState {
            temperature: config.ambient_temperature_c,
            ..Default::default()
        };
        Self {
            state,
            ambient_c: config.ambient_temperature_c,
        }
    }

    /// Power request. Refused, and the interlock tripped, while the BUC is off.
    pub fn handle_power_toggle(&mut self, on: bool, buc_powered: bool) -> &HpaState {
        if on && !buc_powered {
            warn!("HPA power-on refused: BUC not powered");
            self.state.is_interlock_tripped = true;
            self.force_off();
            return &self.state;
        }
        if on {
            self.state.is_interlock_tripped = false;
        }
        if on != self.state.is_powered {
            info!(on, "HPA power toggled");
        }
        self.state.is_powered = on;
        if !on {
            self.force_off();
        }
        &self.state
    }

    pub fn handle_back_off_change(&mut self, back_off_db: f64) -> &HpaState {
        let (lo, hi) = BACK_OFF_RANGE_DB;
        if let Some(v) = sanitize("hpa.backOff", back_off_db, lo, hi) {
            debug!(back_off_db = v, "HPA back-off changed");
            self.state.back_off = v;
            self.refresh_linearity();
        }
        &self.state
    }

    pub fn handle_gain_change(&mut self, gain_db: f64) -> &HpaState {
        if let Some(v) = sanitize("hpa.gain", gain_db, 0.0, MAX_GAIN_DB) {
            self.state.gain = v;
        }
        &self.state
    }

    pub fn handle_p1db_change(&mut self, p1db_dbm: f64) -> &HpaState {
        let (lo, hi) = P1DB_RANGE_DBM;
        if let Some(v) = sanitize("hpa.p1db", p1db_dbm, lo, hi) {
            self.state.p1db = v;
        }
        &self.state
    }

    /// Enforce the BUC interlock. Returns true when it tripped on this call.
    pub fn update(&mut self, dt_s: f64, buc_powered: bool) -> bool {
        if !dt_s.is_finite() || dt_s < 0.0 {
            return false;
        }
        self.refresh_linearity();
        if self.state.is_powered && !buc_powered {
            warn!("HPA interlock tripped: BUC lost power");
            self.state.is_interlock_tripped = true;
            self.force_off();
            return true;
        }
        false
    }

    /// Output power for a composite input (dBm), with compression applied
    pub fn compute_output(&self, input_dbm: f64) -> f64 {
        input_dbm + self.compressed_gain(input_dbm)
    }

    fn compressed_gain(&self, input_dbm: f64) -> f64 {
        let gain = self.state.gain.min(MAX_GAIN_DB);
        let overdrive = input_dbm + gain - self.state.compression_threshold();
        if overdrive > 0.0 {
            gain - overdrive
        } else {
            gain
        }
    }

    /// Amplify the carriers arriving from the BUC
    pub fn process(&mut self, inputs: &[RfSignal]) -> Vec<RfSignal> {
        if !self.state.is_powered || inputs.is_empty() {
            self.state.input_power = MIN_DB;
            self.state.output_power = MIN_DB;
            self.state.effective_gain = self.state.gain;
            self.state.is_compressed = false;
            self.refresh_thermal(0.0);
            return Vec::new();
        }
        let input = sum_dbm(inputs.iter().map(|s| s.power));
        let gain = self.compressed_gain(input);
        self.state.input_power = input;
        self.state.effective_gain = gain;
        self.state.output_power = input + gain;
        self.state.is_compressed = gain < self.state.gain.min(MAX_GAIN_DB);
        self.refresh_thermal(dbm_to_watts(self.state.output_power));
        trace!(
            input_dbm = input,
            output_dbm = self.state.output_power,
            gain_db = gain,
            "HPA tick"
        );
        inputs
            .iter()
            .map(|sig| {
                let mut out = sig.clone().with_origin(SignalOrigin::Hpa);
                out.power = sig.power + gain;
                out
            })
            .collect()
    }

    fn refresh_linearity(&mut self) {
        self.state.imd = imd_dbc(self.state.back_off);
        self.state.is_overdriven = self.state.back_off < MIN_SAFE_BACK_OFF_DB;
    }

    fn refresh_thermal(&mut self, rf_out_w: f64) {
        if !self.state.is_powered {
            self.state.temperature = self.ambient_c;
            self.state.current_draw = 0.0;
            return;
        }
        let efficiency = self.state.efficiency.clamp(0.01, 1.0);
        let dissipated_w = rf_out_w * (1.0 - efficiency);
        self.state.temperature = self.ambient_c + dissipated_w * THERMAL_RESISTANCE_C_PER_W;
        self.state.current_draw = IDLE_CURRENT_A + rf_out_w / efficiency / SUPPLY_VOLTAGE_V;
    }

    fn force_off(&mut self) {
        self.state.is_powered = false;
        self.state.input_power = MIN_DB;
        self.state.output_power = MIN_DB;
        self.state.is_compressed = false;
        self.refresh_thermal(0.0);
    }
}

impl ModuleBehavior for Hpa {
    type State = HpaState;

    fn kind(&self) -> ModuleKind {
        ModuleKind::Hpa
    }

    fn state(&self) -> &HpaState {
        &self.state
    }

    fn alarms(&self) -> Vec<String> {
        let s = &self.state;
        let mut alarms = Vec::new();
        // Latched, shown even though the HPA is off
        if s.is_interlock_tripped {
            alarms.push("HPA interlock: BUC not powered".to_string());
        }
        if !s.is_powered {
            return alarms;
        }
        if s.temperature > MAX_TEMPERATURE_C {
            alarms.push("HPA over-temperature".to_string());
        }
        if s.current_draw > MAX_CURRENT_A {
            alarms.push("HPA high current".to_string());
        }
        if s.is_overdriven {
            alarms.push(format!("HPA overdriven (back-off {:.1} dB)", s.back_off));
        }
        if s.imd > IMD_ALARM_DBC {
            alarms.push(format!("HPA IMD degraded ({:.1} dBc)", s.imd));
        }
        alarms
    }

    fn is_powered(&self) -> bool {
        self.state.is_powered
    }

    fn status_changed(&self, previous: &HpaState) -> bool {
        let s = &self.state;
        s.is_powered != previous.is_powered
            || s.is_overdriven != previous.is_overdriven
            || s.is_compressed != previous.is_compressed
            || s.is_interlock_tripped != previous.is_interlock_tripped
            || s.back_off != previous.back_off
            || s.gain != previous.gain
            || differs(s.output_power, previous.output_power, 0.1)
            || differs(s.temperature, previous.temperature, 0.5)
    }

    fn apply_state(&mut self, state: HpaState) {
        self.state = state;
        self.state.gain = self.state.gain.clamp(0.0, MAX_GAIN_DB);
        self.refresh_linearity();
    }
}
