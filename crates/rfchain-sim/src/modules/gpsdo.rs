//! GPS-Disciplined Oscillator
//!
//! The station frequency reference. An oven-controlled crystal is steered to
//! GNSS time; when the satellites go away it free-runs in holdover and its
//! timing error grows with elapsed time.
//!
//! ## State machine
//!
//! ```text
//!            power on            warmup = 0            signal present
//!   Off ───────────────► Warming ──────────► Acquiring ──────────────► Locked
//!    ▲                                                                 │   ▲
//!    │ power off (from any state)                   signal lost        │   │ signal
//!    └──────────────────────────────────────────────────────── Holdover ◄┘   │ reacquired
//!                                                                   └───────┘
//! ```
//!
//! During warmup the quality metrics move from their cold values toward
//! nominal as `progress = 1 - remaining/total`, so lock does not jump.

use crate::clock::IntervalTimer;
use crate::config::SimConfig;
use crate::module::{differs, ModuleBehavior, ModuleKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rfchain_core::units::relax_toward;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, trace, warn};

/// Oven operating set-point (°C)
pub const OVEN_SETPOINT_C: f64 = 70.0;
/// Allowed oven band once warm (°C)
pub const OVEN_RANGE_C: (f64, f64) = (65.0, 75.0);

/// Locked fractional frequency accuracy
pub const NOMINAL_ACCURACY: f64 = 2e-11;
/// Locked Allan deviation at τ = 1 s
pub const NOMINAL_ALLAN_DEVIATION: f64 = 5e-12;
/// Locked phase noise at 10 Hz offset (dBc/Hz)
pub const NOMINAL_PHASE_NOISE_DBC: f64 = -127.0;

const COLD_ACCURACY: f64 = 1e-7;
const COLD_ALLAN_DEVIATION: f64 = 1e-9;
const COLD_PHASE_NOISE_DBC: f64 = -90.0;

/// Holdover time-error growth (µs per hour)
pub const HOLDOVER_ERROR_RATE_US_PER_HOUR: f64 = 1.67;
/// Holdover error that raises the approaching-limit alarm (µs)
pub const HOLDOVER_WARNING_US: f64 = 30.0;
/// Holdover error specification limit (µs)
pub const HOLDOVER_LIMIT_US: f64 = 40.0;

/// Fractional accuracy lost per µs of holdover error
const ACCURACY_PER_US: f64 = 1e-12;

/// Stability monitor cadence
const STABILITY_MONITOR_HZ: f64 = 0.2;
/// Holdover monitor cadence
const HOLDOVER_MONITOR_HZ: f64 = 1.0;

const REFERENCE_FREQUENCY_HZ: f64 = 10e6;

/// Observable GPSDO mode, derived from state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpsdoMode {
    Off,
    Warming,
    Acquiring,
    Locked,
    Holdover,
}

impl fmt::Display for GpsdoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GpsdoMode::Off => "OFF",
            GpsdoMode::Warming => "WARMING",
            GpsdoMode::Acquiring => "ACQUIRING",
            GpsdoMode::Locked => "LOCKED",
            GpsdoMode::Holdover => "HOLDOVER",
        };
        f.write_str(s)
    }
}

/// GPSDO state record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GpsdoState {
    pub is_powered: bool,
    pub is_locked: bool,
    /// Seconds of oven warmup left
    pub warmup_time_remaining: f64,
    pub warmup_time_total: f64,
    /// Oven temperature (°C)
    pub temperature: f64,
    /// Front-panel GNSS input switch
    pub gnss_enabled: bool,
    pub has_satellite_signal: bool,
    pub satellite_count: u32,
    /// Seconds until a pending satellite acquisition completes
    pub gnss_acquisition_remaining: Option<f64>,
    pub is_in_holdover: bool,
    /// Seconds spent in the current holdover
    pub holdover_duration: f64,
    /// Accumulated holdover time error (µs)
    pub holdover_error: f64,
    pub is_holdover_spec_violated: bool,
    /// Fractional frequency accuracy
    pub frequency_accuracy: f64,
    pub allan_deviation: f64,
    /// Phase noise (dBc/Hz)
    pub phase_noise: f64,
    /// Fractional aging per day
    pub aging_rate: f64,
    /// Seconds since the last lock was acquired
    pub lock_duration: f64,
    /// Set once the first lock after power-on is achieved
    pub has_been_locked: bool,
    pub self_test_passed: bool,
    /// 10 MHz output level (dBm)
    pub output_10mhz_level: f64,
    pub pps_enabled: bool,
}

impl Default for GpsdoState {
    fn default() -> Self {
        Self {
            is_powered: true,
            is_locked: true,
            warmup_time_remaining: 0.0,
            warmup_time_total: crate::config::WARMUP_TIME_S,
            temperature: OVEN_SETPOINT_C,
            gnss_enabled: true,
            has_satellite_signal: true,
            satellite_count: 9,
            gnss_acquisition_remaining: None,
            is_in_holdover: false,
            holdover_duration: 0.0,
            holdover_error: 0.0,
            is_holdover_spec_violated: false,
            frequency_accuracy: NOMINAL_ACCURACY,
            allan_deviation: NOMINAL_ALLAN_DEVIATION,
            phase_noise: NOMINAL_PHASE_NOISE_DBC,
            aging_rate: 5e-11,
            lock_duration: 0.0,
            has_been_locked: true,
            self_test_passed: true,
            output_10mhz_level: 13.0,
            pps_enabled: true,
        }
    }
}

impl GpsdoState {
    pub fn mode(&self) -> GpsdoMode {
        if !self.is_powered {
            GpsdoMode::Off
        } else if self.warmup_time_remaining > 0.0 {
            GpsdoMode::Warming
        } else if self.is_locked {
            GpsdoMode::Locked
        } else if self.is_in_holdover {
            GpsdoMode::Holdover
        } else {
            GpsdoMode::Acquiring
        }
    }

    pub fn is_warmed_up(&self) -> bool {
        self.is_powered && self.warmup_time_remaining <= 0.0
    }
}

/// Read-only view of the reference handed to the converters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceStatus {
    /// A 10 MHz signal is on the distribution amplifier
    pub is_present: bool,
    pub is_locked: bool,
    /// Oven has reached operating temperature
    pub is_warmed_up: bool,
    /// Fractional frequency accuracy
    pub accuracy: f64,
    /// Phase noise (dBc/Hz)
    pub phase_noise: f64,
}

impl ReferenceStatus {
    /// No reference connected
    pub fn absent() -> Self {
        Self {
            is_present: false,
            is_locked: false,
            is_warmed_up: false,
            accuracy: COLD_ACCURACY,
            phase_noise: COLD_PHASE_NOISE_DBC,
        }
    }
}

/// 10 MHz reference output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenMhzOutput {
    pub is_present: bool,
    pub frequency_hz: f64,
    pub level_dbm: f64,
    pub frequency_error_hz: f64,
}

/// Transition reported by one GPSDO update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsdoTransition {
    WarmupComplete,
    Locked,
    HoldoverEntered,
    HoldoverExited,
    HoldoverSpecViolated,
    GnssAcquired,
}

/// Invoked once a GNSS toggle takes effect
pub type GnssCallback = Box<dyn FnOnce(&GpsdoState)>;

/// GPSDO physics core
pub struct Gpsdo {
    state: GpsdoState,
    rng: StdRng,
    ambient_c: f64,
    warmup_total_s: f64,
    acquisition_delay_s: f64,
    stability_monitor: IntervalTimer,
    holdover_monitor: IntervalTimer,
    pending_callback: Option<GnssCallback>,
}

impl fmt::Debug for Gpsdo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gpsdo")
            .field("state", &self.state)
            .field("mode", &self.state.mode())
            .field("callback_pending", &self.pending_callback.is_some())
            .finish()
    }
}

impl Gpsdo {
    pub fn new(config: &SimConfig) -> Self {
        let warmup_total_s = config.warmup_time_s();
        let state = GpsdoState {
            warmup_time_total: warmup_total_s,
            ..Default::default()
        };
        Self {
            state,
            rng: StdRng::seed_from_u64(config.module_seed(1)),
            ambient_c: config.ambient_temperature_c,
            warmup_total_s,
            acquisition_delay_s: config.gnss_acquisition_delay_s,
            stability_monitor: IntervalTimer::from_hz(STABILITY_MONITOR_HZ),
            holdover_monitor: IntervalTimer::from_hz(HOLDOVER_MONITOR_HZ),
            pending_callback: None,
        }
    }

    pub fn mode(&self) -> GpsdoMode {
        self.state.mode()
    }

    /// Power switch. Powering on starts a full warmup from ambient.
    pub fn handle_power_toggle(&mut self, on: bool) -> &GpsdoState {
        if on == self.state.is_powered {
            return &self.state;
        }
        if on {
            info!(warmup_s = self.warmup_total_s, "GPSDO powered on, warming up");
            let s = &mut self.state;
            s.is_powered = true;
            s.warmup_time_total = self.warmup_total_s;
            s.warmup_time_remaining = self.warmup_total_s;
            s.temperature = self.ambient_c;
            s.lock_duration = 0.0;
            s.has_been_locked = false;
            s.frequency_accuracy = COLD_ACCURACY;
            s.allan_deviation = COLD_ALLAN_DEVIATION;
            s.phase_noise = COLD_PHASE_NOISE_DBC;
            s.self_test_passed = true;
            self.clear_holdover();
            if self.state.gnss_enabled {
                self.state.has_satellite_signal = false;
                self.state.satellite_count = 0;
                self.state.gnss_acquisition_remaining = Some(self.acquisition_delay_s);
            }
        } else {
            info!("GPSDO powered off");
            self.state.is_powered = false;
            self.state.warmup_time_remaining = self.warmup_total_s;
            self.state.has_satellite_signal = false;
            self.state.satellite_count = 0;
            self.state.gnss_acquisition_remaining = None;
            self.pending_callback = None;
            self.enforce_invariants();
        }
        self.stability_monitor.reset();
        self.holdover_monitor.reset();
        &self.state
    }

    /// GNSS input switch.
    ///
    /// Disabling drops the satellites at once and calls `callback`
    /// immediately. Enabling starts the acquisition delay; `callback` runs
    /// from the update in which the satellites are acquired. A newer toggle
    /// replaces a callback that has not fired yet.
    pub fn handle_gnss_toggle(&mut self, enabled: bool, callback: Option<GnssCallback>) {
        self.pending_callback = None;
        if !enabled {
            debug!("GNSS input disabled");
            self.state.gnss_enabled = false;
            self.state.has_satellite_signal = false;
            self.state.satellite_count = 0;
            self.state.gnss_acquisition_remaining = None;
            if let Some(cb) = callback {
                cb(&self.state);
            }
            return;
        }

        self.state.gnss_enabled = true;
        if self.state.has_satellite_signal {
            if let Some(cb) = callback {
                cb(&self.state);
            }
            return;
        }
        debug!(delay_s = self.acquisition_delay_s, "GNSS input enabled, acquiring");
        if self.state.is_powered {
            self.state.gnss_acquisition_remaining = Some(self.acquisition_delay_s);
        }
        self.pending_callback = callback;
    }

    /// Run the built-in self-test and latch its result
    pub fn handle_self_test(&mut self) -> bool {
        let s = &self.state;
        let (lo, hi) = OVEN_RANGE_C;
        let passed = s.is_powered
            && (s.warmup_time_remaining > 0.0 || (s.temperature >= lo && s.temperature <= hi));
        if !passed {
            warn!(temperature = s.temperature, "GPSDO self-test failed");
        }
        self.state.self_test_passed = passed;
        passed
    }

    pub fn get_reference_status(&self) -> ReferenceStatus {
        let s = &self.state;
        if !s.is_powered {
            return ReferenceStatus::absent();
        }
        ReferenceStatus {
            is_present: true,
            is_locked: s.is_locked,
            is_warmed_up: s.is_warmed_up(),
            accuracy: s.frequency_accuracy,
            phase_noise: s.phase_noise,
        }
    }

    pub fn get_10mhz_output(&self) -> TenMhzOutput {
        let s = &self.state;
        if !s.is_powered {
            return TenMhzOutput {
                is_present: false,
                frequency_hz: 0.0,
                level_dbm: rfchain_core::units::MIN_DB,
                frequency_error_hz: 0.0,
            };
        }
        let error = REFERENCE_FREQUENCY_HZ * s.frequency_accuracy;
        TenMhzOutput {
            is_present: true,
            frequency_hz: REFERENCE_FREQUENCY_HZ + error,
            level_dbm: s.output_10mhz_level,
            frequency_error_hz: error,
        }
    }

    /// Advance the oscillator by `dt_s` seconds
    pub fn update(&mut self, dt_s: f64) -> Vec<GpsdoTransition> {
        let mut transitions = Vec::new();
        if !dt_s.is_finite() || dt_s < 0.0 {
            return transitions;
        }

        if !self.state.is_powered {
            self.state.temperature = relax_toward(
                self.state.temperature,
                self.ambient_c,
                dt_s,
                self.oven_time_constant(),
            );
            self.enforce_invariants();
            return transitions;
        }

        self.advance_acquisition(dt_s, &mut transitions);

        self.state.temperature = relax_toward(
            self.state.temperature,
            OVEN_SETPOINT_C,
            dt_s,
            self.oven_time_constant(),
        );

        if self.state.warmup_time_remaining > 0.0 {
            self.state.warmup_time_remaining = (self.state.warmup_time_remaining - dt_s).max(0.0);
            self.interpolate_warmup_metrics();
            if self.state.warmup_time_remaining == 0.0 {
                info!("GPSDO warmup complete");
                transitions.push(GpsdoTransition::WarmupComplete);
            }
        }

        if self.state.is_warmed_up() {
            if self.state.has_satellite_signal {
                self.track_lock(dt_s, &mut transitions);
            } else if self.state.is_locked || self.state.is_in_holdover {
                self.track_holdover(dt_s, &mut transitions);
            }
        }

        self.enforce_invariants();
        trace!(mode = %self.state.mode(), temp = self.state.temperature, "GPSDO tick");
        transitions
    }

    fn advance_acquisition(&mut self, dt_s: f64, transitions: &mut Vec<GpsdoTransition>) {
        let Some(remaining) = self.state.gnss_acquisition_remaining else {
            return;
        };
        let remaining = remaining - dt_s;
        if remaining > 0.0 {
            self.state.gnss_acquisition_remaining = Some(remaining);
            return;
        }
        self.state.gnss_acquisition_remaining = None;
        if !self.state.gnss_enabled {
            return;
        }
        self.state.has_satellite_signal = true;
        self.state.satellite_count = self.rng.gen_range(4..=12);
        info!(satellites = self.state.satellite_count, "GNSS satellites acquired");
        transitions.push(GpsdoTransition::GnssAcquired);
        if let Some(cb) = self.pending_callback.take() {
            cb(&self.state);
        }
    }

    fn track_lock(&mut self, dt_s: f64, transitions: &mut Vec<GpsdoTransition>) {
        if !self.state.is_locked {
            if self.state.is_in_holdover {
                info!(
                    error_us = self.state.holdover_error,
                    "GNSS reacquired, leaving holdover"
                );
                self.clear_holdover();
                self.state.satellite_count = self.rng.gen_range(4..=12);
                transitions.push(GpsdoTransition::HoldoverExited);
            }
            info!("GPSDO locked");
            self.state.is_locked = true;
            self.state.has_been_locked = true;
            self.state.lock_duration = 0.0;
            self.state.frequency_accuracy = NOMINAL_ACCURACY;
            self.state.allan_deviation = NOMINAL_ALLAN_DEVIATION;
            self.state.phase_noise = NOMINAL_PHASE_NOISE_DBC;
            self.stability_monitor.reset();
            transitions.push(GpsdoTransition::Locked);
        } else {
            self.state.lock_duration += dt_s;
        }

        let u: f64 = self.rng.gen_range(-1.0..=1.0);
        self.state.frequency_accuracy = NOMINAL_ACCURACY * (1.0 + 0.1 * u);
        let v: f64 = self.rng.gen_range(-1.0..=1.0);
        self.state.phase_noise = NOMINAL_PHASE_NOISE_DBC + 0.5 * v;

        if self.stability_monitor.tick(dt_s) > 0 {
            let w: f64 = self.rng.gen_range(-1.0..=1.0);
            self.state.allan_deviation = NOMINAL_ALLAN_DEVIATION * (1.0 + 0.2 * w);
        }
    }

    fn track_holdover(&mut self, dt_s: f64, transitions: &mut Vec<GpsdoTransition>) {
        if !self.state.is_in_holdover {
            warn!("GNSS signal lost while locked, entering holdover");
            self.state.is_locked = false;
            self.state.is_in_holdover = true;
            self.state.holdover_duration = 0.0;
            self.state.holdover_error = 0.0;
            self.holdover_monitor.reset();
            transitions.push(GpsdoTransition::HoldoverEntered);
        }

        let s = &mut self.state;
        s.holdover_duration += dt_s;
        s.holdover_error = HOLDOVER_ERROR_RATE_US_PER_HOUR * s.holdover_duration / 3600.0;
        let days = s.holdover_duration / 86_400.0;
        s.frequency_accuracy =
            NOMINAL_ACCURACY + s.holdover_error * ACCURACY_PER_US + s.aging_rate.abs() * days;

        if self.holdover_monitor.tick(dt_s) > 0 {
            if !self.state.is_holdover_spec_violated
                && self.state.holdover_error > HOLDOVER_LIMIT_US
            {
                warn!(
                    error_us = self.state.holdover_error,
                    "Holdover error exceeds specification"
                );
                self.state.is_holdover_spec_violated = true;
                transitions.push(GpsdoTransition::HoldoverSpecViolated);
            }
        }
    }

    /// Exponential approach from cold metrics to nominal
    fn interpolate_warmup_metrics(&mut self) {
        let s = &mut self.state;
        let total = s.warmup_time_total.max(f64::EPSILON);
        let progress = (1.0 - s.warmup_time_remaining / total).clamp(0.0, 1.0);
        s.frequency_accuracy = COLD_ACCURACY * (NOMINAL_ACCURACY / COLD_ACCURACY).powf(progress);
        s.allan_deviation =
            COLD_ALLAN_DEVIATION * (NOMINAL_ALLAN_DEVIATION / COLD_ALLAN_DEVIATION).powf(progress);
        s.phase_noise =
            COLD_PHASE_NOISE_DBC + (NOMINAL_PHASE_NOISE_DBC - COLD_PHASE_NOISE_DBC) * progress;
    }

    fn clear_holdover(&mut self) {
        self.state.is_in_holdover = false;
        self.state.holdover_duration = 0.0;
        self.state.holdover_error = 0.0;
        self.state.is_holdover_spec_violated = false;
        self.holdover_monitor.reset();
    }

    fn oven_time_constant(&self) -> f64 {
        self.warmup_total_s / 5.0
    }

    /// Lock requires power and a finished warmup; holdover requires power
    fn enforce_invariants(&mut self) {
        if !self.state.is_powered {
            self.state.is_locked = false;
            self.clear_holdover();
            self.state.lock_duration = 0.0;
            self.state.has_been_locked = false;
        }
        if self.state.warmup_time_remaining > 0.0 {
            self.state.is_locked = false;
        }
        if self.state.is_locked {
            self.state.is_in_holdover = false;
        }
    }
}

impl ModuleBehavior for Gpsdo {
    type State = GpsdoState;

    fn kind(&self) -> ModuleKind {
        ModuleKind::Gpsdo
    }

    fn state(&self) -> &GpsdoState {
        &self.state
    }

    fn alarms(&self) -> Vec<String> {
        let s = &self.state;
        let mut alarms = Vec::new();
        if !s.is_powered {
            return alarms;
        }
        if s.warmup_time_remaining > 0.0 {
            alarms.push("GPSDO warming up".to_string());
        } else if !s.is_locked && !s.is_in_holdover {
            alarms.push("GPSDO not locked".to_string());
        }
        if !s.has_satellite_signal {
            alarms.push("GNSS signal lost".to_string());
        }
        if s.is_in_holdover {
            alarms.push("GPSDO holdover active".to_string());
            if s.holdover_error > HOLDOVER_LIMIT_US {
                alarms.push(format!(
                    "Holdover error exceeds {:.0} µs specification",
                    HOLDOVER_LIMIT_US
                ));
            } else if s.holdover_error > HOLDOVER_WARNING_US {
                alarms.push("Holdover error approaching limit".to_string());
            }
        }
        let (lo, hi) = OVEN_RANGE_C;
        if s.warmup_time_remaining <= 0.0 && (s.temperature < lo || s.temperature > hi) {
            alarms.push("GPSDO oven temperature out of range".to_string());
        }
        if !s.self_test_passed {
            alarms.push("GPSDO self-test failure".to_string());
        }
        alarms
    }

    fn is_powered(&self) -> bool {
        self.state.is_powered
    }

    fn status_changed(&self, previous: &GpsdoState) -> bool {
        let s = &self.state;
        s.mode() != previous.mode()
            || s.gnss_enabled != previous.gnss_enabled
            || s.has_satellite_signal != previous.has_satellite_signal
            || s.satellite_count != previous.satellite_count
            || s.self_test_passed != previous.self_test_passed
            || s.is_holdover_spec_violated != previous.is_holdover_spec_violated
            || s.warmup_time_remaining.ceil() != previous.warmup_time_remaining.ceil()
            || differs(s.temperature, previous.temperature, 0.5)
            || differs(s.holdover_error, previous.holdover_error, 0.1)
    }

    fn apply_state(&mut self, state: GpsdoState) {
        self.state = state;
        self.enforce_invariants();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fast_gpsdo() -> Gpsdo {
        Gpsdo::new(&SimConfig::fast())
    }

    fn run(g: &mut Gpsdo, seconds: f64, dt: f64) {
        let steps = (seconds / dt).round() as usize;
        for _ in 0..steps {
            g.update(dt);
        }
    }

    #[test]
    fn test_default_is_locked() {
        let mut g = fast_gpsdo();
        g.update(0.25);
        assert_eq!(g.mode(), GpsdoMode::Locked);
        assert!(g.get_reference_status().is_locked);
    }

    #[test]
    fn test_power_cycle_warmup_then_lock() {
        let mut g = fast_gpsdo();
        g.handle_power_toggle(false);
        assert_eq!(g.mode(), GpsdoMode::Off);
        assert!(!g.state().is_locked);

        g.handle_power_toggle(true);
        assert_eq!(g.mode(), GpsdoMode::Warming);
        assert_eq!(g.state().temperature, 25.0);
        assert_eq!(g.state().warmup_time_remaining, 10.0);

        run(&mut g, 5.0, 0.25);
        assert_eq!(g.mode(), GpsdoMode::Warming);
        assert!(g.state().temperature > 25.0 && g.state().temperature < 70.0);

        run(&mut g, 5.5, 0.25);
        assert_eq!(g.mode(), GpsdoMode::Locked);
        assert!(g.state().satellite_count >= 4 && g.state().satellite_count <= 12);
        assert!((g.state().phase_noise - NOMINAL_PHASE_NOISE_DBC).abs() <= 0.5);
    }

    #[test]
    fn test_warmup_metrics_improve_continuously() {
        let mut g = fast_gpsdo();
        g.handle_gnss_toggle(false, None);
        g.handle_power_toggle(false);
        g.handle_power_toggle(true);
        let mut last = g.state().frequency_accuracy;
        for _ in 0..40 {
            g.update(0.25);
            assert!(g.state().frequency_accuracy <= last);
            last = g.state().frequency_accuracy;
        }
        assert_eq!(g.mode(), GpsdoMode::Acquiring);
        assert!((last - NOMINAL_ACCURACY).abs() < 1e-15);
    }

    #[test]
    fn test_lock_invariant_every_tick() {
        let mut g = fast_gpsdo();
        for i in 0..400 {
            if i % 37 == 0 {
                g.handle_power_toggle(i % 74 != 0);
            }
            if i % 53 == 0 {
                g.handle_gnss_toggle(i % 106 != 0, None);
            }
            g.update(0.25);
            let s = g.state();
            if s.is_locked {
                assert!(s.is_powered && s.warmup_time_remaining == 0.0);
            }
        }
    }

    #[test]
    fn test_holdover_error_grows_and_resets() {
        let mut g = fast_gpsdo();
        g.update(1.0);
        g.handle_gnss_toggle(false, None);
        g.update(1.0);
        assert_eq!(g.mode(), GpsdoMode::Holdover);

        let mut last = g.state().holdover_error;
        for _ in 0..10 {
            g.update(60.0);
            assert!(g.state().holdover_error > last);
            last = g.state().holdover_error;
        }
        // 601 s at 1.67 µs/h
        let expected = 1.67 * 601.0 / 3600.0;
        assert!((g.state().holdover_error - expected).abs() < 1e-9);

        g.handle_gnss_toggle(true, None);
        run(&mut g, 5.0, 0.5);
        assert_eq!(g.mode(), GpsdoMode::Locked);
        assert_eq!(g.state().holdover_error, 0.0);
        assert!(!g.state().is_in_holdover);
        assert!((4..=12).contains(&g.state().satellite_count));
    }

    #[test]
    fn test_huge_step_in_holdover() {
        let mut g = fast_gpsdo();
        g.update(1.0);
        g.handle_gnss_toggle(false, None);
        g.update(1.0);
        g.update(1e12);
        assert_eq!(g.mode(), GpsdoMode::Holdover);
        assert!(g.state().is_holdover_spec_violated);
        assert!(g.state().holdover_error.is_finite());
    }

    #[test]
    fn test_holdover_spec_violation_flagged_not_faulted() {
        let mut g = fast_gpsdo();
        g.update(1.0);
        g.handle_gnss_toggle(false, None);
        // 25 hours in hourly steps: > 40 µs
        for _ in 0..25 {
            g.update(3600.0);
        }
        assert!(g.state().holdover_error > HOLDOVER_LIMIT_US);
        assert!(g.state().is_holdover_spec_violated);
        assert!(g.state().is_powered);
        assert_eq!(g.mode(), GpsdoMode::Holdover);
        let alarms = g.alarms();
        assert!(alarms.iter().any(|a| a.contains("exceeds")));
    }

    #[test]
    fn test_holdover_approaching_alarm() {
        let mut g = fast_gpsdo();
        g.update(1.0);
        g.handle_gnss_toggle(false, None);
        g.update(1.0);
        g.update(19.0 * 3600.0);
        let alarms = g.alarms();
        assert!(alarms.iter().any(|a| a.contains("approaching")));
    }

    #[test]
    fn test_gnss_callback_fires_after_delay() {
        let mut g = fast_gpsdo();
        g.handle_gnss_toggle(false, None);
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        g.handle_gnss_toggle(
            true,
            Some(Box::new(move |s: &GpsdoState| {
                assert!(s.has_satellite_signal);
                f.set(true);
            })),
        );
        g.update(4.0);
        assert!(!fired.get());
        let transitions = g.update(1.0);
        assert!(fired.get());
        assert!(transitions.contains(&GpsdoTransition::GnssAcquired));
    }

    #[test]
    fn test_gnss_disable_callback_is_immediate() {
        let mut g = fast_gpsdo();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        g.handle_gnss_toggle(false, Some(Box::new(move |_: &GpsdoState| f.set(true))));
        assert!(fired.get());
        assert!(!g.state().has_satellite_signal);
    }

    #[test]
    fn test_power_off_cancels_acquisition() {
        let mut g = fast_gpsdo();
        g.handle_gnss_toggle(false, None);
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        g.handle_gnss_toggle(true, Some(Box::new(move |_: &GpsdoState| f.set(true))));
        g.handle_power_toggle(false);
        g.update(10.0);
        assert!(!fired.get());
        assert!(g.state().gnss_acquisition_remaining.is_none());
        assert!(!g.state().is_in_holdover);
    }

    #[test]
    fn test_oven_alarm_and_self_test() {
        let mut g = fast_gpsdo();
        let mut s = g.state().clone();
        s.temperature = 80.0;
        g.apply_state(s);
        assert!(g.alarms().iter().any(|a| a.contains("oven")));
        assert!(!g.handle_self_test());
        assert!(g.alarms().iter().any(|a| a.contains("self-test")));
    }

    #[test]
    fn test_10mhz_output() {
        let mut g = fast_gpsdo();
        let out = g.get_10mhz_output();
        assert!(out.is_present);
        assert!((out.frequency_error_hz - 10e6 * g.state().frequency_accuracy).abs() < 1e-12);
        g.handle_power_toggle(false);
        assert!(!g.get_10mhz_output().is_present);
        assert!(!g.get_reference_status().is_present);
    }
}
