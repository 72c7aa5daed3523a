//! # RF Chain Core
//!
//! Primitives shared by the ground-station RF simulation:
//!
//! - **Signals**: [`RfSignal`] summary records (frequency, power, bandwidth,
//!   modulation, FEC) passed stage to stage
//! - **Noise math**: dB conversions, the Friis cascade, the thermal noise floor
//! - **Constellations**: ideal symbol geometry and a Box-Muller noise source
//! - **Observability**: `tracing` subscriber setup
//!
//! ## Example
//!
//! ```rust
//! use rfchain_core::units::thermal_noise_floor_dbm;
//!
//! // 50 K system over 36 MHz
//! let floor = thermal_noise_floor_dbm(50.0, 36e6);
//! assert!(floor < -100.0);
//! ```

pub mod constellation;
pub mod observe;
pub mod types;
pub mod units;

pub use types::{
    sanitize, FecRate, IQSample, IfSignal, Modulation, Polarization, RfError, RfResult, RfSignal,
    SignalOrigin,
};
