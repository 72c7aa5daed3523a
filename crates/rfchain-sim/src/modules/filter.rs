//! IF bandpass filter
//!
//! Selectable-bandwidth filter after the LNB. In-band carriers lose the
//! insertion loss; carriers spilling outside the passband are rejected in
//! proportion to the fraction of their bandwidth that falls outside.

use crate::module::{ModuleBehavior, ModuleKind};
use rfchain_core::units::fraction_outside_band;
use rfchain_core::{sanitize, IfSignal, SignalOrigin};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Selectable bandwidths (MHz)
pub const FILTER_BANDWIDTHS_MHZ: [f64; 8] = [1.0, 2.0, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0];

const CENTER_RANGE_MHZ: (f64, f64) = (950.0, 2150.0);
/// Insertion loss that raises an alarm (dB)
const HIGH_INSERTION_LOSS_DB: f64 = 3.0;

/// Filter state record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterState {
    /// Center frequency (MHz IF)
    pub center_frequency: f64,
    /// Index into [`FILTER_BANDWIDTHS_MHZ`]
    pub bandwidth_index: usize,
    /// Passband width (MHz), follows `bandwidth_index`
    pub bandwidth: f64,
    pub insertion_loss: f64,
    /// Rejection of a carrier fully outside the passband (dB)
    pub stopband_rejection: f64,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            center_frequency: 1200.0,
            bandwidth_index: 3,
            bandwidth: FILTER_BANDWIDTHS_MHZ[3],
            insertion_loss: 2.0,
            stopband_rejection: 40.0,
        }
    }
}

impl FilterState {
    pub fn passband(&self) -> (f64, f64) {
        let half = self.bandwidth / 2.0;
        (self.center_frequency - half, self.center_frequency + half)
    }

    /// A passive filter's noise figure equals its loss (dB)
    pub fn noise_figure(&self) -> f64 {
        self.insertion_loss
    }
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    state: FilterState,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a preset bandwidth; out-of-range indices clamp to the widest
    pub fn handle_bandwidth_change(&mut self, index: usize) -> &FilterState {
        let idx = index.min(FILTER_BANDWIDTHS_MHZ.len() - 1);
        self.state.bandwidth_index = idx;
        self.state.bandwidth = FILTER_BANDWIDTHS_MHZ[idx];
        debug!(bandwidth_mhz = self.state.bandwidth, "Filter bandwidth");
        &self.state
    }

    pub fn handle_center_frequency_change(&mut self, mhz: f64) -> &FilterState {
        let (lo, hi) = CENTER_RANGE_MHZ;
        if let Some(v) = sanitize("filter.centerFrequency", mhz, lo, hi) {
            self.state.center_frequency = v;
        }
        &self.state
    }

    pub fn process(&self, inputs: &[IfSignal]) -> Vec<IfSignal> {
        let (lo, hi) = self.state.passband();
        inputs
            .iter()
            .map(|sig| {
                let outside = fraction_outside_band(sig.lower_edge(), sig.upper_edge(), lo, hi);
                let mut out = sig.clone().with_origin(SignalOrigin::Filter);
                out.power = sig.power
                    - self.state.insertion_loss
                    - outside * self.state.stopband_rejection;
                out
            })
            .collect()
    }
}

impl ModuleBehavior for Filter {
    type State = FilterState;

    fn kind(&self) -> ModuleKind {
        ModuleKind::Filter
    }

    fn state(&self) -> &FilterState {
        &self.state
    }

    fn alarms(&self) -> Vec<String> {
        let mut alarms = Vec::new();
        if self.state.insertion_loss > HIGH_INSERTION_LOSS_DB {
            alarms.push(format!(
                "Filter insertion loss high ({:.1} dB)",
                self.state.insertion_loss
            ));
        }
        alarms
    }

    fn is_powered(&self) -> bool {
        true
    }

    fn status_changed(&self, previous: &FilterState) -> bool {
        self.state != *previous
    }

    fn apply_state(&mut self, state: FilterState) {
        self.state = state;
        let idx = self.state.bandwidth_index.min(FILTER_BANDWIDTHS_MHZ.len() - 1);
        self.state.bandwidth_index = idx;
        self.state.bandwidth = FILTER_BANDWIDTHS_MHZ[idx];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfchain_core::{FecRate, Modulation, RfSignal};

    fn if_sig(freq: f64, bw: f64) -> IfSignal {
        RfSignal::new("c", freq, -40.0, bw, Modulation::Qpsk, FecRate::R3_4)
    }

    #[test]
    fn test_in_band_insertion_loss_only() {
        let filter = Filter::new();
        let out = filter.process(&[if_sig(1200.0, 5.0)]);
        assert!((out[0].power - (-42.0)).abs() < 1e-9);
        assert_eq!(out[0].origin, SignalOrigin::Filter);
    }

    #[test]
    fn test_partial_and_full_rejection() {
        let filter = Filter::new();
        // Passband 1195–1205, carrier 1200–1220: 15 of 20 MHz outside
        let out = filter.process(&[if_sig(1210.0, 20.0), if_sig(1300.0, 5.0)]);
        assert!((out[0].power - (-42.0 - 0.75 * 40.0)).abs() < 1e-9);
        assert!((out[1].power - (-82.0)).abs() < 1e-9);
    }

    #[test]
    fn test_bandwidth_presets() {
        let mut filter = Filter::new();
        assert_eq!(filter.handle_bandwidth_change(0).bandwidth, 1.0);
        assert_eq!(filter.handle_bandwidth_change(99).bandwidth, 160.0);
        assert_eq!(filter.state().bandwidth_index, 7);
    }

    #[test]
    fn test_sync_rederives_bandwidth() {
        let mut filter = Filter::new();
        filter
            .try_sync(&serde_json::json!({"bandwidthIndex": 5}))
            .unwrap();
        assert_eq!(filter.state().bandwidth, 40.0);
        assert_eq!(filter.state().noise_figure(), 2.0);
    }
}
