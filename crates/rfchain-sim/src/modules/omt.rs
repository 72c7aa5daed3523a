//! Orthomode Transducer
//!
//! Separates the two orthogonal feed polarizations: the transmit port is
//! launched on `tx_polarization`, the receive port listens on
//! `rx_polarization`. Received carriers on the opposite polarization leak
//! through only at the cross-pol isolation.

use crate::module::{ModuleBehavior, ModuleKind};
use rfchain_core::{sanitize, Polarization, RfSignal, SignalOrigin};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Linear-to-circular mismatch loss (dB)
pub const POLARIZATION_MISMATCH_DB: f64 = 3.0;
/// Isolation left when the OMT is faulted (dB)
pub const FAULTED_ISOLATION_DB: f64 = 3.0;

/// OMT state record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OmtState {
    pub tx_polarization: Polarization,
    pub rx_polarization: Polarization,
    /// Port-to-port isolation (dB)
    pub cross_pol_isolation: f64,
    /// Through loss per port (dB)
    pub insertion_loss: f64,
    pub is_faulted: bool,
}

impl Default for OmtState {
    fn default() -> Self {
        Self {
            tx_polarization: Polarization::Vertical,
            rx_polarization: Polarization::Horizontal,
            cross_pol_isolation: 30.0,
            insertion_loss: 0.2,
            is_faulted: false,
        }
    }
}

/// Passive polarization router
#[derive(Debug, Clone, Default)]
pub struct Omt {
    state: OmtState,
}

impl Omt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_tx_polarization_change(&mut self, polarization: Polarization) -> &OmtState {
        info!(?polarization, "OMT tx polarization");
        self.state.tx_polarization = polarization;
        self.warn_if_not_orthogonal();
        &self.state
    }

    pub fn handle_rx_polarization_change(&mut self, polarization: Polarization) -> &OmtState {
        info!(?polarization, "OMT rx polarization");
        self.state.rx_polarization = polarization;
        self.warn_if_not_orthogonal();
        &self.state
    }

    pub fn handle_cross_pol_isolation_change(&mut self, isolation_db: f64) -> &OmtState {
        if let Some(v) = sanitize("omt.crossPolIsolation", isolation_db, 0.0, 60.0) {
            self.state.cross_pol_isolation = v;
        }
        &self.state
    }

    pub fn handle_fault_toggle(&mut self, faulted: bool) -> &OmtState {
        self.state.is_faulted = faulted;
        &self.state
    }

    fn warn_if_not_orthogonal(&self) {
        if !self.state.tx_polarization.is_orthogonal_to(self.state.rx_polarization) {
            warn!(
                tx = ?self.state.tx_polarization,
                rx = ?self.state.rx_polarization,
                "OMT ports not orthogonal"
            );
        }
    }

    pub fn effective_isolation(&self) -> f64 {
        if self.state.is_faulted {
            FAULTED_ISOLATION_DB.min(self.state.cross_pol_isolation)
        } else {
            self.state.cross_pol_isolation
        }
    }

    /// Loss seen on the receive port by a carrier of polarization `pol`
    fn rx_loss_db(&self, pol: Option<Polarization>) -> f64 {
        let rx = self.state.rx_polarization;
        let polarization_loss = match pol {
            None => 0.0,
            Some(p) if p == rx => 0.0,
            Some(p) if p.is_orthogonal_to(rx) => self.effective_isolation(),
            Some(_) => POLARIZATION_MISMATCH_DB,
        };
        self.state.insertion_loss + polarization_loss
    }

    /// Antenna to LNB. Untagged carriers are taken as co-polar.
    pub fn process_rx(&self, inputs: &[RfSignal]) -> Vec<RfSignal> {
        inputs
            .iter()
            .map(|sig| {
                let mut out = sig.clone().with_origin(SignalOrigin::Omt);
                out.power = sig.power - self.rx_loss_db(sig.polarization);
                out
            })
            .collect()
    }

    /// HPA to antenna, launched on the tx polarization
    pub fn process_tx(&self, inputs: &[RfSignal]) -> Vec<RfSignal> {
        inputs
            .iter()
            .map(|sig| {
                let mut out = sig
                    .clone()
                    .with_origin(SignalOrigin::Omt)
                    .with_polarization(self.state.tx_polarization);
                out.power = sig.power - self.state.insertion_loss;
                out
            })
            .collect()
    }
}

impl ModuleBehavior for Omt {
    type State = OmtState;

    fn kind(&self) -> ModuleKind {
        ModuleKind::Omt
    }

    fn state(&self) -> &OmtState {
        &self.state
    }

    fn alarms(&self) -> Vec<String> {
        let s = &self.state;
        let mut alarms = Vec::new();
        if !s.tx_polarization.is_orthogonal_to(s.rx_polarization) {
            alarms.push("OMT Tx/Rx polarization not orthogonal".to_string());
        }
        if s.is_faulted {
            alarms.push("OMT fault: port isolation degraded".to_string());
        }
        alarms
    }

    /// Passive, always in circuit
    fn is_powered(&self) -> bool {
        true
    }

    fn status_changed(&self, previous: &OmtState) -> bool {
        self.state != *previous
    }

    fn apply_state(&mut self, state: OmtState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfchain_core::{FecRate, Modulation};

    fn sig(pol: Option<Polarization>) -> RfSignal {
        let s = RfSignal::new("d1", 3950.0, -100.0, 10.0, Modulation::Qpsk, FecRate::R3_4);
        match pol {
            Some(p) => s.with_polarization(p),
            None => s,
        }
    }

    #[test]
    fn test_rx_co_and_cross_polar() {
        let omt = Omt::new();
        let out = omt.process_rx(&[
            sig(Some(Polarization::Horizontal)),
            sig(Some(Polarization::Vertical)),
            sig(None),
            sig(Some(Polarization::RightCircular)),
        ]);
        assert!((out[0].power - (-100.2)).abs() < 1e-9);
        assert!((out[1].power - (-130.2)).abs() < 1e-9);
        assert!((out[2].power - (-100.2)).abs() < 1e-9);
        assert!((out[3].power - (-103.2)).abs() < 1e-9);
        assert!(out.iter().all(|s| s.origin == SignalOrigin::Omt));
    }

    #[test]
    fn test_tx_tags_polarization() {
        let omt = Omt::new();
        let out = omt.process_tx(&[sig(None)]);
        assert_eq!(out[0].polarization, Some(Polarization::Vertical));
        assert!((out[0].power - (-100.2)).abs() < 1e-9);
    }

    #[test]
    fn test_non_orthogonal_alarm() {
        let mut omt = Omt::new();
        assert!(omt.alarms().is_empty());
        omt.handle_tx_polarization_change(Polarization::Horizontal);
        assert_eq!(omt.alarms().len(), 1);
        omt.handle_rx_polarization_change(Polarization::Vertical);
        assert!(omt.alarms().is_empty());
    }

    #[test]
    fn test_fault_collapses_isolation() {
        let mut omt = Omt::new();
        omt.handle_fault_toggle(true);
        let out = omt.process_rx(&[sig(Some(Polarization::Vertical))]);
        assert!((out[0].power - (-103.2)).abs() < 1e-9);
    }
}
