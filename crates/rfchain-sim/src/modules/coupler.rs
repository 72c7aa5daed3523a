//! Directional coupler test ports
//!
//! Two monitoring ports, each tapping the chain at a selectable point and
//! presenting a copy of the carriers there attenuated by the coupling
//! factor. The through path sits between the HPA and the OMT.

use crate::module::{ModuleBehavior, ModuleKind};
use rfchain_core::{sanitize, RfSignal, SignalOrigin};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Point in the chain a coupler port can sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TapPoint {
    /// Modem IF into the BUC
    TxIf,
    PostBuc,
    PostHpa,
    /// After the OMT receive port
    PreLnb,
    PostLnb,
    PostFilter,
}

impl fmt::Display for TapPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TapPoint::TxIf => "TX IF",
            TapPoint::PostBuc => "POST BUC",
            TapPoint::PostHpa => "POST HPA",
            TapPoint::PreLnb => "PRE LNB",
            TapPoint::PostLnb => "POST LNB",
            TapPoint::PostFilter => "POST FILTER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplerPort {
    A,
    B,
}

/// Carriers present at each tap point during the last tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainSnapshot {
    pub tx_if: Vec<RfSignal>,
    pub post_buc: Vec<RfSignal>,
    pub post_hpa: Vec<RfSignal>,
    pub pre_lnb: Vec<RfSignal>,
    pub post_lnb: Vec<RfSignal>,
    pub post_filter: Vec<RfSignal>,
}

impl ChainSnapshot {
    pub fn at(&self, tap: TapPoint) -> &[RfSignal] {
        match tap {
            TapPoint::TxIf => &self.tx_if,
            TapPoint::PostBuc => &self.post_buc,
            TapPoint::PostHpa => &self.post_hpa,
            TapPoint::PreLnb => &self.pre_lnb,
            TapPoint::PostLnb => &self.post_lnb,
            TapPoint::PostFilter => &self.post_filter,
        }
    }
}

/// Coupler state record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CouplerState {
    pub tap_point_a: TapPoint,
    pub tap_point_b: TapPoint,
    /// Sample attenuation (dB, negative)
    pub coupling_factor: f64,
    /// Through-path loss (dB)
    pub insertion_loss: f64,
    pub is_active: bool,
}

impl Default for CouplerState {
    fn default() -> Self {
        Self {
            tap_point_a: TapPoint::PostHpa,
            tap_point_b: TapPoint::PostLnb,
            coupling_factor: -30.0,
            insertion_loss: 0.1,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Coupler {
    state: CouplerState,
}

impl Coupler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_tap_point_change(&mut self, port: CouplerPort, tap: TapPoint) -> &CouplerState {
        match port {
            CouplerPort::A => self.state.tap_point_a = tap,
            CouplerPort::B => self.state.tap_point_b = tap,
        }
        &self.state
    }

    pub fn handle_active_toggle(&mut self, active: bool) -> &CouplerState {
        self.state.is_active = active;
        &self.state
    }

    pub fn handle_coupling_factor_change(&mut self, factor_db: f64) -> &CouplerState {
        if let Some(v) = sanitize("coupler.couplingFactor", factor_db, -60.0, -3.0) {
            self.state.coupling_factor = v;
        }
        &self.state
    }

    pub fn tap_point(&self, port: CouplerPort) -> TapPoint {
        match port {
            CouplerPort::A => self.state.tap_point_a,
            CouplerPort::B => self.state.tap_point_b,
        }
    }

    /// Sampled carriers on `port`. Empty while the coupler is inactive.
    pub fn tap(&self, port: CouplerPort, chain: &ChainSnapshot) -> Vec<RfSignal> {
        if !self.state.is_active {
            return Vec::new();
        }
        chain
            .at(self.tap_point(port))
            .iter()
            .map(|sig| {
                let mut out = sig.clone().with_origin(SignalOrigin::Coupler);
                out.power = sig.power + self.state.coupling_factor;
                out
            })
            .collect()
    }

    /// Main-line path through the coupler
    pub fn through(&self, inputs: &[RfSignal]) -> Vec<RfSignal> {
        inputs
            .iter()
            .map(|sig| {
                let mut out = sig.clone();
                out.power = sig.power - self.state.insertion_loss;
                out
            })
            .collect()
    }
}

impl ModuleBehavior for Coupler {
    type State = CouplerState;

    fn kind(&self) -> ModuleKind {
        ModuleKind::Coupler
    }

    fn state(&self) -> &CouplerState {
        &self.state
    }

    fn alarms(&self) -> Vec<String> {
        let mut alarms = Vec::new();
        if self.state.is_active && self.state.tap_point_a == self.state.tap_point_b {
            alarms.push(format!(
                "Coupler ports A and B both sampling {}",
                self.state.tap_point_a
            ));
        }
        alarms
    }

    fn is_powered(&self) -> bool {
        self.state.is_active
    }

    fn status_changed(&self, previous: &CouplerState) -> bool {
        self.state != *previous
    }

    fn apply_state(&mut self, state: CouplerState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfchain_core::{FecRate, Modulation};

    fn chain() -> ChainSnapshot {
        let carrier = RfSignal::new("c", 6000.0, 40.0, 5.0, Modulation::Qpsk, FecRate::R3_4);
        ChainSnapshot {
            post_hpa: vec![carrier.clone()],
            post_lnb: vec![carrier.clone(), carrier],
            ..Default::default()
        }
    }

    #[test]
    fn test_tap_applies_coupling() {
        let coupler = Coupler::new();
        let a = coupler.tap(CouplerPort::A, &chain());
        assert_eq!(a.len(), 1);
        assert!((a[0].power - 10.0).abs() < 1e-9);
        assert_eq!(a[0].origin, SignalOrigin::Coupler);
        assert_eq!(coupler.tap(CouplerPort::B, &chain()).len(), 2);
    }

    #[test]
    fn test_retarget_and_deactivate() {
        let mut coupler = Coupler::new();
        coupler.handle_tap_point_change(CouplerPort::A, TapPoint::TxIf);
        assert!(coupler.tap(CouplerPort::A, &chain()).is_empty());
        coupler.handle_tap_point_change(CouplerPort::A, TapPoint::PostLnb);
        assert_eq!(coupler.alarms().len(), 1);
        coupler.handle_active_toggle(false);
        assert!(coupler.tap(CouplerPort::B, &chain()).is_empty());
        assert!(coupler.alarms().is_empty());
    }

    #[test]
    fn test_through_loss() {
        let coupler = Coupler::new();
        let out = coupler.through(chain().at(TapPoint::PostHpa));
        assert!((out[0].power - 39.9).abs() < 1e-9);
    }
}
