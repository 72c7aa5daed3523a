//! Signal visibility
//!
//! Decides which antenna carriers a modem tuned to `{frequency, bandwidth,
//! modulation, fec}` can demodulate.
//!
//! ```text
//!          modem bandwidth B
//!   ├─────────────────────────────┤
//!        ├───────────────────┤        outer gate ±0.5·B: visible
//!                ├───┤                inner gate ±0.1·B: clean
//!                  ▲ tuned frequency
//! ```
//!
//! Carriers between the gates stay visible but are tagged degraded. The
//! whole stage is a pure function of its inputs.

use rfchain_core::units::spans_overlap;
use rfchain_core::RfSignal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ModemConfig;

/// Outer gate as a fraction of modem bandwidth
pub const OUTER_GATE: f64 = 0.5;
/// Inner gate as a fraction of modem bandwidth
pub const INNER_GATE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleSignal {
    pub signal: RfSignal,
    /// Outside the inner gate
    pub is_degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisibilityStatus {
    #[serde(rename = "SIGNAL FOUND")]
    Found,
    #[serde(rename = "SIGNAL DEGRADED")]
    Degraded,
    #[serde(rename = "SIGNAL DENIED")]
    Denied,
    #[serde(rename = "NO SIGNAL")]
    NoSignal,
}

impl VisibilityStatus {
    /// Classification from the number of surviving carriers
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => VisibilityStatus::NoSignal,
            1 => VisibilityStatus::Found,
            2 => VisibilityStatus::Degraded,
            _ => VisibilityStatus::Denied,
        }
    }
}

impl fmt::Display for VisibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VisibilityStatus::Found => "SIGNAL FOUND",
            VisibilityStatus::Degraded => "SIGNAL DEGRADED",
            VisibilityStatus::Denied => "SIGNAL DENIED",
            VisibilityStatus::NoSignal => "NO SIGNAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityResult {
    pub signals: Vec<VisibleSignal>,
    pub status: VisibilityStatus,
}

impl VisibilityResult {
    pub fn none() -> Self {
        Self {
            signals: Vec::new(),
            status: VisibilityStatus::NoSignal,
        }
    }
}

/// True when `sig` could be received by `modem` at all: fits the tuned
/// bandwidth, overlaps the tuned span, and matches modulation and FEC
pub fn is_compatible(sig: &RfSignal, modem: &ModemConfig) -> bool {
    let (lo, hi) = modem.tuned_span();
    sig.bandwidth <= modem.bandwidth
        && spans_overlap(sig.lower_edge(), sig.upper_edge(), lo, hi)
        && sig.modulation == modem.modulation
        && sig.fec == modem.fec
}

/// Filter antenna carriers down to those visible to `modem`
pub fn filter_visible_signals(signals: &[RfSignal], modem: &ModemConfig) -> VisibilityResult {
    let outer = OUTER_GATE * modem.bandwidth;
    let inner = INNER_GATE * modem.bandwidth;
    let visible: Vec<VisibleSignal> = signals
        .iter()
        .filter(|sig| is_compatible(sig, modem))
        .filter_map(|sig| {
            let offset = (sig.frequency - modem.frequency).abs();
            (offset <= outer).then(|| VisibleSignal {
                signal: sig.clone(),
                is_degraded: offset > inner,
            })
        })
        .collect();
    let status = VisibilityStatus::from_count(visible.len());
    VisibilityResult {
        signals: visible,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfchain_core::{FecRate, Modulation};

    fn modem() -> ModemConfig {
        ModemConfig {
            antenna_id: "ant-1".into(),
            frequency: 4700.0,
            bandwidth: 50.0,
            modulation: Modulation::Qpsk,
            fec: FecRate::R3_4,
        }
    }

    fn sig(freq: f64, bw: f64) -> RfSignal {
        RfSignal::new("s", freq, -100.0, bw, Modulation::Qpsk, FecRate::R3_4)
    }

    #[test]
    fn test_found_degraded_denied() {
        let m = modem();
        let one = filter_visible_signals(&[sig(4700.0, 10.0)], &m);
        assert_eq!(one.status, VisibilityStatus::Found);
        assert!(!one.signals[0].is_degraded);

        let two = filter_visible_signals(&[sig(4700.0, 10.0), sig(4700.0, 10.0)], &m);
        assert_eq!(two.status, VisibilityStatus::Degraded);

        let three = filter_visible_signals(
            &[sig(4700.0, 10.0), sig(4700.0, 10.0), sig(4700.0, 10.0)],
            &m,
        );
        assert_eq!(three.status, VisibilityStatus::Denied);
        assert_eq!(three.status.to_string(), "SIGNAL DENIED");
    }

    #[test]
    fn test_gates() {
        let m = modem();
        // 10 MHz off: outside inner gate (5), inside outer (25)
        let r = filter_visible_signals(&[sig(4710.0, 10.0)], &m);
        assert_eq!(r.status, VisibilityStatus::Found);
        assert!(r.signals[0].is_degraded);
        // 28 MHz off overlaps the span but misses the outer gate
        let r = filter_visible_signals(&[sig(4728.0, 10.0)], &m);
        assert_eq!(r.status, VisibilityStatus::NoSignal);
    }

    #[test]
    fn test_incompatible_rejected() {
        let m = modem();
        let wide = sig(4700.0, 60.0);
        let mut bpsk = sig(4700.0, 10.0);
        bpsk.modulation = Modulation::Bpsk;
        let mut fec = sig(4700.0, 10.0);
        fec.fec = FecRate::R1_2;
        let far = sig(4900.0, 10.0);
        let r = filter_visible_signals(&[wide, bpsk, fec, far], &m);
        assert_eq!(r.status, VisibilityStatus::NoSignal);
        assert!(r.signals.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let m = modem();
        let input = [sig(4700.0, 10.0), sig(4712.0, 5.0)];
        assert_eq!(
            filter_visible_signals(&input, &m),
            filter_visible_signals(&input, &m)
        );
    }
}
