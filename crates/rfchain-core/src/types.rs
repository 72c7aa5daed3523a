//! Core types for RF chain simulation
//!
//! This module defines the value types that flow between the stages of a
//! ground-station RF chain. Nothing here carries sample streams: a signal is
//! a summary record (frequency, power, bandwidth, modulation, FEC) that each
//! stage transforms and hands to the next.
//!
//! ```text
//!   Rx:  antenna ──► OMT ──► LNB ──► IF filter ──► modem
//!   Tx:  modem ──► BUC ──► HPA ──► OMT ──► antenna
//!                   │
//!                   └──(loopback)──► LNB
//! ```
//!
//! Units are fixed across the workspace: frequencies and bandwidths in MHz,
//! power in dBm, frequency errors in Hz.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single I/Q constellation point
pub type IQSample = Complex64;

/// Result type for RF chain operations
pub type RfResult<T> = Result<T, RfError>;

/// Errors that can occur while configuring or syncing the RF chain
///
/// Handler methods never surface these to callers; they are logged and the
/// offending input is dropped or clamped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RfError {
    #[error("Invalid value for {field}: {value}")]
    InvalidInput { field: &'static str, value: f64 },

    #[error("{field} = {value} outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("State merge failed: {0}")]
    StateMerge(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for RfError {
    fn from(e: serde_json::Error) -> Self {
        RfError::StateMerge(e.to_string())
    }
}

/// Digital modulation scheme carried by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Modulation {
    #[serde(rename = "BPSK")]
    Bpsk,
    #[default]
    #[serde(rename = "QPSK")]
    Qpsk,
    #[serde(rename = "8QAM")]
    Qam8,
    #[serde(rename = "16QAM")]
    Qam16,
}

impl Modulation {
    /// Number of constellation points
    pub fn order(&self) -> usize {
        match self {
            Modulation::Bpsk => 2,
            Modulation::Qpsk => 4,
            Modulation::Qam8 => 8,
            Modulation::Qam16 => 16,
        }
    }

    /// Minimum C/N in dB the demodulator needs to hold lock
    pub fn lock_threshold_db(&self) -> f64 {
        match self {
            Modulation::Bpsk => 4.0,
            Modulation::Qpsk => 7.0,
            Modulation::Qam8 => 10.0,
            Modulation::Qam16 => 14.0,
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Modulation::Bpsk => "BPSK",
            Modulation::Qpsk => "QPSK",
            Modulation::Qam8 => "8QAM",
            Modulation::Qam16 => "16QAM",
        };
        f.write_str(s)
    }
}

/// Forward error correction code rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FecRate {
    #[serde(rename = "1/2")]
    R1_2,
    #[serde(rename = "2/3")]
    R2_3,
    #[default]
    #[serde(rename = "3/4")]
    R3_4,
    #[serde(rename = "5/6")]
    R5_6,
    #[serde(rename = "7/8")]
    R7_8,
}

impl FecRate {
    /// Code rate as a fraction
    pub fn ratio(&self) -> f64 {
        match self {
            FecRate::R1_2 => 1.0 / 2.0,
            FecRate::R2_3 => 2.0 / 3.0,
            FecRate::R3_4 => 3.0 / 4.0,
            FecRate::R5_6 => 5.0 / 6.0,
            FecRate::R7_8 => 7.0 / 8.0,
        }
    }
}

impl fmt::Display for FecRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FecRate::R1_2 => "1/2",
            FecRate::R2_3 => "2/3",
            FecRate::R3_4 => "3/4",
            FecRate::R5_6 => "5/6",
            FecRate::R7_8 => "7/8",
        };
        f.write_str(s)
    }
}

/// Antenna feed polarization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    #[serde(rename = "H")]
    Horizontal,
    #[serde(rename = "V")]
    Vertical,
    #[serde(rename = "LHCP")]
    LeftCircular,
    #[serde(rename = "RHCP")]
    RightCircular,
}

impl Polarization {
    /// The polarization orthogonal to this one
    pub fn orthogonal(&self) -> Polarization {
        match self {
            Polarization::Horizontal => Polarization::Vertical,
            Polarization::Vertical => Polarization::Horizontal,
            Polarization::LeftCircular => Polarization::RightCircular,
            Polarization::RightCircular => Polarization::LeftCircular,
        }
    }

    pub fn is_orthogonal_to(&self, other: Polarization) -> bool {
        self.orthogonal() == other
    }
}

/// Stage that last produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignalOrigin {
    #[default]
    Antenna,
    Modem,
    Omt,
    Lnb,
    Filter,
    Buc,
    Hpa,
    Coupler,
}

/// One carrier as seen at a point in the chain
///
/// Produced by one stage per tick and consumed by the next; stages return
/// new values rather than mutating their inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfSignal {
    /// Carrier identifier, stable across stages
    pub signal_id: String,
    /// Center frequency in MHz
    pub frequency: f64,
    /// Power in dBm
    pub power: f64,
    /// Occupied bandwidth in MHz
    pub bandwidth: f64,
    pub modulation: Modulation,
    pub fec: FecRate,
    pub origin: SignalOrigin,
    /// Feed polarization, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polarization: Option<Polarization>,
}

/// IF signals share the RF record layout
pub type IfSignal = RfSignal;

impl RfSignal {
    pub fn new(
        signal_id: impl Into<String>,
        frequency: f64,
        power: f64,
        bandwidth: f64,
        modulation: Modulation,
        fec: FecRate,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            frequency,
            power,
            bandwidth,
            modulation,
            fec,
            origin: SignalOrigin::Antenna,
            polarization: None,
        }
    }

    pub fn with_origin(mut self, origin: SignalOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_polarization(mut self, polarization: Polarization) -> Self {
        self.polarization = Some(polarization);
        self
    }

    /// Lower edge of the occupied span in MHz
    pub fn lower_edge(&self) -> f64 {
        self.frequency - self.bandwidth / 2.0
    }

    /// Upper edge of the occupied span in MHz
    pub fn upper_edge(&self) -> f64 {
        self.frequency + self.bandwidth / 2.0
    }
}

/// Clamp a UI-supplied number into range, rejecting NaN and infinities.
///
/// Returns `None` when the value should be ignored outright.
pub fn sanitize(field: &'static str, value: f64, min: f64, max: f64) -> Option<f64> {
    if !value.is_finite() {
        tracing::warn!("{}, ignoring", RfError::InvalidInput { field, value });
        return None;
    }
    if value < min || value > max {
        tracing::warn!(
            "{}",
            RfError::OutOfRange {
                field,
                value,
                min,
                max
            }
        );
    }
    Some(value.clamp(min, max))
}
