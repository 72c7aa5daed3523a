//! # RF Chain Simulation
//!
//! Tick-driven model of a satellite ground-station RF front end: GPSDO
//! reference, LNB and BUC converters, HPA, OMT, directional coupler, IF
//! filter, and a receiver that turns what the antenna sees into a
//! constellation display.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       RfFrontEnd                         │
//! │  TickScheduler ──update(dt)──► GPSDO ► BUC/LNB ► HPA     │
//! │                                   │                      │
//! │  EventBus ◄── ModuleChanged / AlarmRaised / Interlock    │
//! └──────────────┬──────────────────────────┬────────────────┘
//!                │ AntennaPort              │ TransmitterPort
//!                ▼                          ▼
//!           antenna model                 modem
//! ```
//!
//! ## Example
//!
//! ```rust
//! use rfchain_sim::{RfFrontEnd, SimConfig};
//!
//! let mut fe = RfFrontEnd::new(SimConfig::fast());
//! fe.advance(1.0);
//! assert!(fe.state().gpsdo.is_powered);
//! println!("NF = {:.2} dB", fe.system_noise_figure_db());
//! ```

pub mod clock;
pub mod config;
pub mod events;
pub mod front_end;
pub mod module;
pub mod modules;
pub mod receiver;

pub use clock::{IntervalTimer, Tick, TickScheduler};
pub use config::SimConfig;
pub use events::{EventBus, FrontEndEvent, SubscriptionId};
pub use front_end::{
    AntennaPort, RfFrontEnd, RfFrontEndState, RfFrontEndStateRef, TransmitterPort,
};
pub use module::{classify_alarm, AlarmSeverity, AlarmStatus, ModuleBehavior, ModuleKind};
pub use modules::{ChainSnapshot, CouplerPort, ReferenceStatus, TapPoint};
pub use receiver::{
    filter_visible_signals, CarrierReport, ConstellationFrame, IqConstellationSimulator,
    ModemConfig, Receiver, VisibilityResult, VisibilityStatus, VisibleSignal,
};
