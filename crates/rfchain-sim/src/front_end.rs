//! RF Front-End Orchestrator
//!
//! Owns the seven modules and drives them once per update tick:
//!
//! ```text
//!   GPSDO ──ref──► BUC, LNB          (reference first)
//!   BUC power ──► HPA interlock      (then amplifiers)
//!
//!   transmitter ─IF─► BUC ─┬─► HPA ─► coupler ─► OMT tx ─► antenna
//!                          └─(loopback)─────────────┐
//!   antenna ─► OMT rx ─────────────────────────────►+─► LNB ─► filter
//! ```
//!
//! The orchestrator is the only writer of cross-module facts: it hands each
//! module the reference status or parent power it depends on, routes the
//! signal lists between stages, recomputes the system noise figure, and
//! publishes [`FrontEndEvent`]s for what changed.

use crate::clock::{Tick, TickScheduler};
use crate::config::SimConfig;
use crate::events::{EventBus, FrontEndEvent, SubscriptionId};
use crate::module::{AlarmSeverity, AlarmStatus, ModuleBehavior, ModuleKind};
use crate::modules::{
    Buc, BucState, ChainSnapshot, Coupler, CouplerPort, CouplerState, Filter, FilterState,
    GnssCallback, Gpsdo, GpsdoState, GpsdoTransition, Hpa, HpaState, Lnb, LnbState, Omt,
    OmtState, TapPoint,
};
use crate::receiver::{CarrierReport, Receiver};
use rfchain_core::units::{
    db_to_linear, friis_noise_factor, noise_factor_from_temperature, noise_figure_from_factor,
    noise_temperature_from_factor, thermal_noise_floor_dbm, Stage,
};
use rfchain_core::{IfSignal, Polarization, RfError, RfResult, RfSignal};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// Loss from BUC output to LNB input with loopback engaged (dB)
pub const LOOPBACK_PATH_LOSS_DB: f64 = 70.0;

/// The antenna the feed is bolted to
pub trait AntennaPort {
    fn antenna_id(&self) -> &str;

    /// Carriers arriving at the feed
    fn received_signals(&self) -> Vec<RfSignal>;

    /// Carriers leaving the feed this tick
    fn transmit(&mut self, signals: &[RfSignal]);
}

/// The modem driving the BUC
pub trait TransmitterPort {
    fn if_output(&self) -> Vec<IfSignal>;
}

/// Persisted front-end state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RfFrontEndState {
    pub uuid: String,
    pub team_id: u32,
    pub server_id: u32,
    pub omt: OmtState,
    pub buc: BucState,
    pub hpa: HpaState,
    pub filter: FilterState,
    pub lnb: LnbState,
    pub coupler: CouplerState,
    pub gpsdo: GpsdoState,
}

impl Default for RfFrontEndState {
    fn default() -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            team_id: 1,
            server_id: 1,
            omt: OmtState::default(),
            buc: BucState::default(),
            hpa: HpaState::default(),
            filter: FilterState::default(),
            lnb: LnbState::default(),
            coupler: CouplerState::default(),
            gpsdo: GpsdoState::default(),
        }
    }
}

/// Live borrowed view of every module's state
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RfFrontEndStateRef<'a> {
    pub uuid: &'a str,
    pub team_id: u32,
    pub server_id: u32,
    pub omt: &'a OmtState,
    pub buc: &'a BucState,
    pub hpa: &'a HpaState,
    pub filter: &'a FilterState,
    pub lnb: &'a LnbState,
    pub coupler: &'a CouplerState,
    pub gpsdo: &'a GpsdoState,
}

impl RfFrontEndStateRef<'_> {
    pub fn to_owned_state(&self) -> RfFrontEndState {
        RfFrontEndState {
            uuid: self.uuid.to_string(),
            team_id: self.team_id,
            server_id: self.server_id,
            omt: self.omt.clone(),
            buc: self.buc.clone(),
            hpa: self.hpa.clone(),
            filter: self.filter.clone(),
            lnb: self.lnb.clone(),
            coupler: self.coupler.clone(),
            gpsdo: self.gpsdo.clone(),
        }
    }
}

/// Ground-station RF front end
pub struct RfFrontEnd {
    config: SimConfig,
    uuid: String,
    team_id: u32,
    server_id: u32,
    gpsdo: Gpsdo,
    lnb: Lnb,
    buc: Buc,
    hpa: Hpa,
    omt: Omt,
    coupler: Coupler,
    filter: Filter,
    antenna: Option<Box<dyn AntennaPort>>,
    transmitter: Option<Box<dyn TransmitterPort>>,
    scheduler: TickScheduler,
    chain: ChainSnapshot,
    system_noise_figure_db: f64,
    system_noise_temperature_k: f64,
    active_alarms: Vec<AlarmStatus>,
    events: EventBus,
    tick_count: u64,
}

impl fmt::Debug for RfFrontEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RfFrontEnd")
            .field("uuid", &self.uuid)
            .field("tick_count", &self.tick_count)
            .field("antenna", &self.antenna.as_ref().map(|a| a.antenna_id().to_string()))
            .field("transmitter", &self.transmitter.is_some())
            .field("system_noise_figure_db", &self.system_noise_figure_db)
            .field("active_alarms", &self.active_alarms.len())
            .finish()
    }
}

impl RfFrontEnd {
    pub fn new(config: SimConfig) -> Self {
        let config = config.normalized();
        let defaults = RfFrontEndState::default();
        let mut fe = Self {
            gpsdo: Gpsdo::new(&config),
            lnb: Lnb::new(&config),
            buc: Buc::new(&config),
            hpa: Hpa::new(&config),
            omt: Omt::new(),
            coupler: Coupler::new(),
            filter: Filter::new(),
            scheduler: TickScheduler::new(&config),
            config,
            uuid: defaults.uuid,
            team_id: defaults.team_id,
            server_id: defaults.server_id,
            antenna: None,
            transmitter: None,
            chain: ChainSnapshot::default(),
            system_noise_figure_db: 0.0,
            system_noise_temperature_k: 0.0,
            active_alarms: Vec::new(),
            events: EventBus::new(),
            tick_count: 0,
        };
        fe.refresh_noise_figure();
        fe.active_alarms = fe.get_alarms();
        info!(uuid = %fe.uuid, "RF front end created");
        fe
    }

    /// Construct from defaults merged with a persisted partial state
    pub fn with_state(config: SimConfig, persisted: &Value) -> RfResult<Self> {
        let mut fe = Self::new(config);
        fe.try_sync(persisted)?;
        fe.events.drain();
        Ok(fe)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // -- Wiring ---------------------------------------------------------

    pub fn connect_antenna(&mut self, antenna: Box<dyn AntennaPort>) {
        info!(antenna = antenna.antenna_id(), "Antenna connected");
        self.antenna = Some(antenna);
    }

    pub fn connect_transmitter(&mut self, transmitter: Box<dyn TransmitterPort>) {
        info!("Transmitter connected");
        self.transmitter = Some(transmitter);
    }

    pub fn antenna_id(&self) -> Option<&str> {
        self.antenna.as_ref().map(|a| a.antenna_id())
    }

    // -- Events ---------------------------------------------------------

    pub fn subscribe(&mut self, listener: Box<dyn FnMut(&FrontEndEvent)>) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn drain_events(&mut self) -> Vec<FrontEndEvent> {
        self.events.drain()
    }

    // -- Tick loop ------------------------------------------------------

    /// Advance wall time, running every update tick that falls due.
    ///
    /// Returns the ticks that fired; hosts persist on [`Tick::Sync`].
    pub fn advance(&mut self, elapsed_s: f64) -> Vec<Tick> {
        let ticks = self.scheduler.advance(elapsed_s);
        for tick in &ticks {
            if let Tick::Update { dt_s } = tick {
                self.update(*dt_s);
            }
        }
        ticks
    }

    /// Advance every module by `dt_s` and route signals through the chain
    pub fn update(&mut self, dt_s: f64) {
        if !dt_s.is_finite() || dt_s < 0.0 {
            warn!(dt_s, "Ignoring invalid tick");
            return;
        }
        let before = self.snapshot();

        // Reference
        for transition in self.gpsdo.update(dt_s) {
            if transition == GpsdoTransition::GnssAcquired {
                self.events.publish(FrontEndEvent::GnssAcquired);
            }
        }
        let reference = self.gpsdo.get_reference_status();

        // Converters
        self.buc.update(dt_s, &reference);
        self.lnb.update(dt_s, &reference);

        // Amplifiers
        if self.hpa.update(dt_s, self.buc.is_powered()) {
            self.events.publish(FrontEndEvent::InterlockTripped);
        }

        // Routing
        self.route_signals();
        self.refresh_noise_figure();
        self.tick_count += 1;

        self.publish_changes(&before);
        self.refresh_alarms();
    }

    fn route_signals(&mut self) {
        let tx_if = self
            .transmitter
            .as_ref()
            .map(|t| t.if_output())
            .unwrap_or_default();
        let post_buc = self.buc.process(&tx_if);

        let (hpa_in, loopback): (&[RfSignal], Vec<RfSignal>) = if self.buc.state().is_loopback {
            let looped = post_buc
                .iter()
                .map(|s| {
                    let mut l = s.clone();
                    l.power -= LOOPBACK_PATH_LOSS_DB;
                    l
                })
                .collect();
            (&[][..], looped)
        } else {
            (post_buc.as_slice(), Vec::new())
        };
        let post_hpa = self.hpa.process(hpa_in);
        let launched = self.omt.process_tx(&self.coupler.through(&post_hpa));

        let received = match self.antenna.as_mut() {
            Some(antenna) => {
                antenna.transmit(&launched);
                antenna.received_signals()
            }
            None => Vec::new(),
        };
        let mut pre_lnb = self.omt.process_rx(&received);
        pre_lnb.extend(loopback);
        let post_lnb = self.lnb.process(&pre_lnb);
        let post_filter = self.filter.process(&post_lnb);

        self.chain = ChainSnapshot {
            tx_if,
            post_buc,
            post_hpa,
            pre_lnb,
            post_lnb,
            post_filter,
        };
    }

    /// System noise from the filter-then-LNB cascade
    fn refresh_noise_figure(&mut self) {
        let lnb = self.lnb.state();
        let stages = [
            Stage::passive(self.filter.state().insertion_loss),
            Stage::new(
                noise_factor_from_temperature(lnb.noise_temperature),
                db_to_linear(lnb.gain),
            ),
        ];
        let f = friis_noise_factor(&stages);
        self.system_noise_figure_db = noise_figure_from_factor(f);
        self.system_noise_temperature_k = noise_temperature_from_factor(f);
    }

    fn publish_changes(&mut self, before: &RfFrontEndState) {
        let changed = [
            (ModuleKind::Gpsdo, self.gpsdo.status_changed(&before.gpsdo)),
            (ModuleKind::Lnb, self.lnb.status_changed(&before.lnb)),
            (ModuleKind::Buc, self.buc.status_changed(&before.buc)),
            (ModuleKind::Hpa, self.hpa.status_changed(&before.hpa)),
            (ModuleKind::Omt, self.omt.status_changed(&before.omt)),
            (ModuleKind::Coupler, self.coupler.status_changed(&before.coupler)),
            (ModuleKind::Filter, self.filter.status_changed(&before.filter)),
        ];
        for (kind, did_change) in changed {
            if did_change {
                self.events.publish(FrontEndEvent::ModuleChanged(kind));
            }
        }
    }

    fn refresh_alarms(&mut self) {
        let current = self.get_alarms();
        for alarm in current.iter().filter(|a| !self.active_alarms.contains(a)) {
            info!(severity = ?alarm.severity, message = %alarm.message, "Alarm raised");
            self.events.publish(FrontEndEvent::AlarmRaised(alarm.clone()));
        }
        for alarm in self.active_alarms.iter().filter(|a| !current.contains(a)) {
            info!(message = %alarm.message, "Alarm cleared");
            self.events.publish(FrontEndEvent::AlarmCleared(alarm.clone()));
        }
        self.active_alarms = current;
    }

    // -- State ----------------------------------------------------------

    pub fn state(&self) -> RfFrontEndStateRef<'_> {
        RfFrontEndStateRef {
            uuid: &self.uuid,
            team_id: self.team_id,
            server_id: self.server_id,
            omt: self.omt.state(),
            buc: self.buc.state(),
            hpa: self.hpa.state(),
            filter: self.filter.state(),
            lnb: self.lnb.state(),
            coupler: self.coupler.state(),
            gpsdo: self.gpsdo.state(),
        }
    }

    pub fn snapshot(&self) -> RfFrontEndState {
        self.state().to_owned_state()
    }

    /// Merge a persisted partial state into every module it names.
    ///
    /// Every key is attempted; the first failure is returned after the rest
    /// have been applied.
    pub fn try_sync(&mut self, partial: &Value) -> RfResult<()> {
        let obj = match partial {
            Value::Null => return Ok(()),
            Value::Object(obj) => obj,
            other => {
                return Err(RfError::StateMerge(format!(
                    "front-end state must be an object, got {}",
                    other
                )))
            }
        };
        let mut first_err = None;
        for (key, value) in obj {
            if value.is_null() {
                continue;
            }
            let result = match key.as_str() {
                "uuid" => value
                    .as_str()
                    .map(|s| self.uuid = s.to_string())
                    .ok_or_else(|| invalid_field("uuid", value)),
                "teamId" => as_u32(value)
                    .map(|v| self.team_id = v)
                    .ok_or_else(|| invalid_field("teamId", value)),
                "serverId" => as_u32(value)
                    .map(|v| self.server_id = v)
                    .ok_or_else(|| invalid_field("serverId", value)),
                "gpsdo" => self.gpsdo.try_sync(value),
                "lnb" => self.lnb.try_sync(value),
                "buc" => self.buc.try_sync(value),
                "hpa" => self.hpa.try_sync(value),
                "omt" => self.omt.try_sync(value),
                "coupler" => self.coupler.try_sync(value),
                "filter" => self.filter.try_sync(value),
                other => Err(RfError::UnknownModule(other.to_string())),
            };
            if let Err(e) = result {
                warn!(key = %key, error = %e, "State sync failed");
                first_err.get_or_insert(e);
            }
        }

        // Persisted state may pair a running HPA with a dead BUC
        if self.hpa.update(0.0, self.buc.is_powered()) {
            self.events.publish(FrontEndEvent::InterlockTripped);
        }
        self.refresh_noise_figure();
        self.events.publish(FrontEndEvent::StateSynced);
        debug!("State synced");
        first_err.map_or(Ok(()), Err)
    }

    /// [`try_sync`](Self::try_sync), with failures logged
    pub fn sync(&mut self, partial: &Value) {
        if let Err(e) = self.try_sync(partial) {
            warn!(error = %e, "Partial state sync");
        }
    }

    // -- Noise ----------------------------------------------------------

    pub fn chain(&self) -> &ChainSnapshot {
        &self.chain
    }

    pub fn system_noise_figure_db(&self) -> f64 {
        self.system_noise_figure_db
    }

    pub fn system_noise_temperature_k(&self) -> f64 {
        self.system_noise_temperature_k
    }

    pub fn noise_floor_dbm(&self, bandwidth_hz: f64) -> f64 {
        thermal_noise_floor_dbm(self.system_noise_temperature_k, bandwidth_hz)
    }

    /// Carriers sampled on a coupler test port
    pub fn coupler_tap(&self, port: CouplerPort) -> Vec<RfSignal> {
        self.coupler.tap(port, &self.chain)
    }

    /// Evaluate `receiver` against what arrived at the LNB input this tick
    pub fn receiver_report(&self, receiver: &Receiver) -> CarrierReport {
        match self.antenna_id() {
            Some(id) if self.lnb.is_powered() => receiver.evaluate(
                id,
                &self.chain.pre_lnb,
                self.system_noise_temperature_k,
                self.lnb.state().frequency_error,
            ),
            _ => CarrierReport::no_carrier(receiver.modem().modulation),
        }
    }

    // -- Alarms ---------------------------------------------------------

    fn module_alarms(&self, kind: ModuleKind) -> Vec<String> {
        match kind {
            ModuleKind::Gpsdo => self.gpsdo.alarms(),
            ModuleKind::Lnb => self.lnb.alarms(),
            ModuleKind::Buc => self.buc.alarms(),
            ModuleKind::Hpa => self.hpa.alarms(),
            ModuleKind::Omt => self.omt.alarms(),
            ModuleKind::Coupler => self.coupler.alarms(),
            ModuleKind::Filter => self.filter.alarms(),
        }
    }

    /// Every active alarm across the front end
    pub fn get_alarms(&self) -> Vec<AlarmStatus> {
        ModuleKind::ALL
            .iter()
            .flat_map(|&kind| self.module_alarms(kind))
            .map(AlarmStatus::from_message)
            .collect()
    }

    /// Alarms for a status panel: 0 = all, 1..=7 = one module in
    /// [`ModuleKind::ALL`] order. Empty panels report as nominal.
    pub fn get_status_alarms(&self, case_index: usize) -> Vec<AlarmStatus> {
        let (kinds, label): (Vec<ModuleKind>, String) = match case_index {
            0 => (ModuleKind::ALL.to_vec(), "All systems".to_string()),
            i if i <= ModuleKind::ALL.len() => {
                let kind = ModuleKind::ALL[i - 1];
                (vec![kind], kind.to_string())
            }
            _ => return Vec::new(),
        };
        let alarms: Vec<AlarmStatus> = kinds
            .into_iter()
            .flat_map(|kind| self.module_alarms(kind))
            .map(AlarmStatus::from_message)
            .collect();
        if alarms.is_empty() {
            vec![AlarmStatus::new(
                AlarmSeverity::Info,
                format!("{} nominal", label),
            )]
        } else {
            alarms
        }
    }

    // -- Module access --------------------------------------------------

    pub fn gpsdo(&self) -> &Gpsdo {
        &self.gpsdo
    }

    pub fn lnb(&self) -> &Lnb {
        &self.lnb
    }

    pub fn buc(&self) -> &Buc {
        &self.buc
    }

    pub fn hpa(&self) -> &Hpa {
        &self.hpa
    }

    pub fn omt(&self) -> &Omt {
        &self.omt
    }

    pub fn coupler(&self) -> &Coupler {
        &self.coupler
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    // -- Handlers -------------------------------------------------------

    fn changed(&mut self, kind: ModuleKind) {
        self.events.publish(FrontEndEvent::ModuleChanged(kind));
    }

    pub fn handle_gpsdo_power_toggle(&mut self, on: bool) -> &GpsdoState {
        self.gpsdo.handle_power_toggle(on);
        self.changed(ModuleKind::Gpsdo);
        self.gpsdo.state()
    }

    pub fn handle_gnss_toggle(
        &mut self,
        enabled: bool,
        callback: Option<GnssCallback>,
    ) -> &GpsdoState {
        self.gpsdo.handle_gnss_toggle(enabled, callback);
        self.changed(ModuleKind::Gpsdo);
        self.gpsdo.state()
    }

    pub fn handle_gpsdo_self_test(&mut self) -> bool {
        let passed = self.gpsdo.handle_self_test();
        self.changed(ModuleKind::Gpsdo);
        passed
    }

    pub fn handle_lnb_power_toggle(&mut self, on: bool) -> &LnbState {
        self.lnb.handle_power_toggle(on);
        self.refresh_noise_figure();
        self.changed(ModuleKind::Lnb);
        self.lnb.state()
    }

    pub fn handle_lnb_lo_frequency_change(&mut self, lo_mhz: f64) -> &LnbState {
        self.lnb.handle_lo_frequency_change(lo_mhz);
        self.changed(ModuleKind::Lnb);
        self.lnb.state()
    }

    pub fn handle_lnb_gain_change(&mut self, gain_db: f64) -> &LnbState {
        self.lnb.handle_gain_change(gain_db);
        self.refresh_noise_figure();
        self.changed(ModuleKind::Lnb);
        self.lnb.state()
    }

    /// BUC power. Switching it off forces the HPA off through the interlock.
    pub fn handle_buc_power_toggle(&mut self, on: bool) -> &BucState {
        self.buc.handle_power_toggle(on);
        self.changed(ModuleKind::Buc);
        if self.hpa.update(0.0, self.buc.is_powered()) {
            self.events.publish(FrontEndEvent::InterlockTripped);
            self.changed(ModuleKind::Hpa);
        }
        self.buc.state()
    }

    pub fn handle_buc_mute_toggle(&mut self, muted: bool) -> &BucState {
        self.buc.handle_mute_toggle(muted);
        self.changed(ModuleKind::Buc);
        self.buc.state()
    }

    pub fn handle_buc_loopback_toggle(&mut self, loopback: bool) -> &BucState {
        self.buc.handle_loopback_toggle(loopback);
        self.changed(ModuleKind::Buc);
        self.buc.state()
    }

    pub fn handle_buc_gain_change(&mut self, gain_db: f64) -> &BucState {
        self.buc.handle_gain_change(gain_db);
        self.changed(ModuleKind::Buc);
        self.buc.state()
    }

    pub fn handle_buc_lo_frequency_change(&mut self, lo_mhz: f64) -> &BucState {
        self.buc.handle_lo_frequency_change(lo_mhz);
        self.changed(ModuleKind::Buc);
        self.buc.state()
    }

    pub fn handle_buc_saturation_power_change(&mut self, dbm: f64) -> &BucState {
        self.buc.handle_saturation_power_change(dbm);
        self.changed(ModuleKind::Buc);
        self.buc.state()
    }

    pub fn handle_hpa_power_toggle(&mut self, on: bool) -> &HpaState {
        let buc_powered = self.buc.is_powered();
        self.hpa.handle_power_toggle(on, buc_powered);
        if on && !buc_powered {
            self.events.publish(FrontEndEvent::InterlockTripped);
        }
        self.changed(ModuleKind::Hpa);
        self.hpa.state()
    }

    pub fn handle_hpa_back_off_change(&mut self, back_off_db: f64) -> &HpaState {
        self.hpa.handle_back_off_change(back_off_db);
        self.changed(ModuleKind::Hpa);
        self.hpa.state()
    }

    pub fn handle_hpa_gain_change(&mut self, gain_db: f64) -> &HpaState {
        self.hpa.handle_gain_change(gain_db);
        self.changed(ModuleKind::Hpa);
        self.hpa.state()
    }

    pub fn handle_hpa_p1db_change(&mut self, p1db_dbm: f64) -> &HpaState {
        self.hpa.handle_p1db_change(p1db_dbm);
        self.changed(ModuleKind::Hpa);
        self.hpa.state()
    }

    pub fn handle_omt_tx_polarization_change(
        &mut self,
        polarization: Polarization,
    ) -> &OmtState {
        self.omt.handle_tx_polarization_change(polarization);
        self.changed(ModuleKind::Omt);
        self.omt.state()
    }

    pub fn handle_omt_rx_polarization_change(
        &mut self,
        polarization: Polarization,
    ) -> &OmtState {
        self.omt.handle_rx_polarization_change(polarization);
        self.changed(ModuleKind::Omt);
        self.omt.state()
    }

    pub fn handle_omt_cross_pol_isolation_change(&mut self, isolation_db: f64) -> &OmtState {
        self.omt.handle_cross_pol_isolation_change(isolation_db);
        self.changed(ModuleKind::Omt);
        self.omt.state()
    }

    pub fn handle_omt_fault_toggle(&mut self, faulted: bool) -> &OmtState {
        self.omt.handle_fault_toggle(faulted);
        self.changed(ModuleKind::Omt);
        self.omt.state()
    }

    pub fn handle_coupler_tap_point_change(
        &mut self,
        port: CouplerPort,
        tap: TapPoint,
    ) -> &CouplerState {
        self.coupler.handle_tap_point_change(port, tap);
        self.changed(ModuleKind::Coupler);
        self.coupler.state()
    }

    pub fn handle_coupler_active_toggle(&mut self, active: bool) -> &CouplerState {
        self.coupler.handle_active_toggle(active);
        self.changed(ModuleKind::Coupler);
        self.coupler.state()
    }

    pub fn handle_coupler_coupling_factor_change(&mut self, factor_db: f64) -> &CouplerState {
        self.coupler.handle_coupling_factor_change(factor_db);
        self.changed(ModuleKind::Coupler);
        self.coupler.state()
    }

    pub fn handle_filter_bandwidth_change(&mut self, index: usize) -> &FilterState {
        self.filter.handle_bandwidth_change(index);
        self.changed(ModuleKind::Filter);
        self.filter.state()
    }

    pub fn handle_filter_center_frequency_change(&mut self, mhz: f64) -> &FilterState {
        self.filter.handle_center_frequency_change(mhz);
        self.changed(ModuleKind::Filter);
        self.filter.state()
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}

fn invalid_field(field: &'static str, value: &Value) -> RfError {
    RfError::StateMerge(format!("{} has unexpected value {}", field, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_noise_figure() {
        let fe = RfFrontEnd::new(SimConfig::default());
        // Filter (2 dB) ahead of the LNB dominates the cascade
        let nf = fe.system_noise_figure_db();
        let lnb_nf = noise_figure_from_factor(noise_factor_from_temperature(
            fe.lnb().state().noise_temperature,
        ));
        assert!(nf > 2.0 && nf < 2.0 + lnb_nf + 1e-9);
        let t = fe.system_noise_temperature_k();
        assert!((fe.noise_floor_dbm(1e6) - (-198.6 + 10.0 * t.log10() + 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_status_alarms_indexing() {
        let fe = RfFrontEnd::new(SimConfig::default());
        let all = fe.get_status_alarms(0);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].severity, AlarmSeverity::Info);
        assert_eq!(all[0].message, "All systems nominal");
        assert_eq!(fe.get_status_alarms(4)[0].message, "HPA nominal");
        assert!(fe.get_status_alarms(8).is_empty());
    }

    #[test]
    fn test_buc_off_trips_interlock() {
        let mut fe = RfFrontEnd::new(SimConfig::default());
        fe.drain_events();
        fe.handle_buc_power_toggle(false);
        assert!(!fe.hpa().state().is_powered);
        assert!(fe.drain_events().contains(&FrontEndEvent::InterlockTripped));
        let hpa_alarms = fe.get_status_alarms(4);
        assert!(hpa_alarms[0].message.contains("interlock"));
    }

    #[test]
    fn test_sync_unknown_key_reports_but_applies_rest() {
        let mut fe = RfFrontEnd::new(SimConfig::default());
        let err = fe
            .try_sync(&json!({"teamId": 7, "radar": {}, "lnb": {"gain": 50.0}}))
            .unwrap_err();
        assert!(matches!(err, RfError::UnknownModule(_)));
        assert_eq!(fe.state().team_id, 7);
        assert_eq!(fe.lnb().state().gain, 50.0);
        assert!(fe.try_sync(&json!([1, 2])).is_err());
        assert!(fe.try_sync(&Value::Null).is_ok());
    }

    #[test]
    fn test_sync_enforces_interlock() {
        let mut fe = RfFrontEnd::new(SimConfig::default());
        fe.sync(&json!({"buc": {"isPowered": false}, "hpa": {"isPowered": true}}));
        assert!(!fe.hpa().state().is_powered);
        assert!(fe.hpa().state().is_interlock_tripped);
    }

    #[test]
    fn test_invalid_tick_ignored() {
        let mut fe = RfFrontEnd::new(SimConfig::default());
        fe.update(f64::NAN);
        fe.update(-1.0);
        assert_eq!(fe.tick_count(), 0);
        fe.update(0.25);
        assert_eq!(fe.tick_count(), 1);
    }
}
