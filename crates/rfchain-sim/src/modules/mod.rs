//! Simulated ground-station equipment
//!
//! Each module owns its state record and is the only code that mutates it.
//! Dependencies (reference status, parent power) are passed into `update`
//! by the orchestrator rather than read from shared state.

pub mod buc;
pub mod coupler;
pub mod filter;
pub mod gpsdo;
pub mod hpa;
pub mod lnb;
pub mod omt;

pub use buc::{Buc, BucState};
pub use coupler::{ChainSnapshot, Coupler, CouplerPort, CouplerState, TapPoint};
pub use filter::{Filter, FilterState, FILTER_BANDWIDTHS_MHZ};
pub use gpsdo::{
    GnssCallback, Gpsdo, GpsdoMode, GpsdoState, GpsdoTransition, ReferenceStatus, TenMhzOutput,
};
pub use hpa::{Hpa, HpaState};
pub use lnb::{Lnb, LnbState};
pub use omt::{Omt, OmtState};

/// Temperature at which the LO crystal has no thermal drift (°C)
pub const LO_ZERO_DRIFT_TEMP_C: f64 = 50.0;

/// Thermal drift coefficient of a free-running LO (ppm per °C)
pub const LO_TEMP_DRIFT_PPM_PER_C: f64 = 0.5;

/// LO frequency error in Hz for a converter.
///
/// Zero when the converter's PLL is locked to a present, warmed-up
/// reference. Otherwise the crystal free-runs:
/// `direction · LO · (|T - 50| · 0.5 + aging) / 1e6`.
pub fn lo_frequency_error_hz(
    lo_mhz: f64,
    ext_ref_locked: bool,
    reference_warmed_up: bool,
    temperature_c: f64,
    aging_drift_ppm: f64,
    direction: f64,
) -> f64 {
    if ext_ref_locked && reference_warmed_up {
        return 0.0;
    }
    let temp_drift_ppm = (temperature_c - LO_ZERO_DRIFT_TEMP_C).abs() * LO_TEMP_DRIFT_PPM_PER_C;
    let sign = if direction < 0.0 { -1.0 } else { 1.0 };
    sign * lo_mhz * 1e6 * (temp_drift_ppm + aging_drift_ppm) / 1e6
}
