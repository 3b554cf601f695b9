//! UE RRC entry points and shared state
//!
//! [`Rrc`] is the context shared by every procedure: the UE-level RRC state,
//! the measured-cells store, the timer pool, the PHY controller facade and
//! the seams towards PHY/MAC/RLC/PDCP/NAS/USIM. The outer stack loop calls
//! [`Rrc::run_tti`] once per subframe; PHY/MAC completions and decoded
//! downlink messages are pushed in through the public entry points and are
//! delivered to the owning procedure as queued events, never re-entering a
//! handler that is already on the stack.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use tracing::{debug, info, warn};

use lteue_common::config::UeConfig;
use lteue_common::types::{Plmn, STmsi};

use crate::cells::CellStore;
use crate::interfaces::{
    Barring, CellSearchResult, EstablishmentCause, MacInterface, NasInterface, PdcpInterface,
    PhyCell, PhyInterface, RlcInterface, SecurityConfig, UsimInterface, SRB0, SRB1,
};
use crate::messages::{
    ConnectionReconfiguration, ConnectionReject, ConnectionSetup, InitialUeIdentity, MeasConfig,
    Paging, ReestablishmentCause, RrConfigCommon, RrConfigDedicated, Sib3, SystemInformation,
    UlMessage,
};
use crate::phy_ctrl::{PhyController, SelectObserver};
use crate::proc::{self, Proc, ProcFuture, ProcResult};
use crate::procedures::{
    CellReselectionProc, CellSearchEvent, CellSearchProc, CellSelectionProc,
    ConnectionReestProc, ConnectionRequestProc, CsResult, GoIdleProc, HoEvent, HoProc,
    PlmnSearchProc, ProcessPcchProc, ServingCellConfigProc, SiAcquireEvent, SiAcquireProc,
};
use crate::timers::{TimerHandle, TimerPool};
use crate::tti::Tti;

/// UE-level RRC state (TS 36.331 Sec 4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RrcState {
    #[default]
    Idle,
    Connected,
}

impl RrcState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RrcState::Idle)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, RrcState::Connected)
    }
}

impl fmt::Display for RrcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RrcState::Idle => write!(f, "RRC_IDLE"),
            RrcState::Connected => write!(f, "RRC_CONNECTED"),
        }
    }
}

/// Cell selection criterion parameters, captured from SIB3.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellReselectionConfig {
    pub q_rx_lev_min: f32,
    pub q_rx_lev_min_offset: f32,
}

/// The layers the RRC drives, bundled for construction.
pub struct Layers {
    pub phy: Box<dyn PhyInterface>,
    pub mac: Box<dyn MacInterface>,
    pub rlc: Box<dyn RlcInterface>,
    pub pdcp: Box<dyn PdcpInterface>,
    pub nas: Box<dyn NasInterface>,
    pub usim: Box<dyn UsimInterface>,
}

/// Named handles into the shared timer pool.
pub struct RrcTimers {
    pub pool: TimerPool,
    pub t300: TimerHandle,
    pub t301: TimerHandle,
    pub t302: TimerHandle,
    pub t304: TimerHandle,
    pub t310: TimerHandle,
    pub t311: TimerHandle,
    pub si_acq_timeout: TimerHandle,
    pub si_acq_retry: TimerHandle,
    pub reselection: TimerHandle,
    pub rlc_flush: TimerHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RrcTimerId {
    T300,
    T301,
    T302,
    T304,
    T310,
    T311,
    SiAcq,
    Reselection,
    RlcFlush,
}

impl RrcTimers {
    fn new(cfg: &UeConfig) -> Self {
        let mut pool = TimerPool::new();
        let t300 = pool.allocate("t300");
        let t301 = pool.allocate("t301");
        let t302 = pool.allocate("t302");
        let t304 = pool.allocate("t304");
        let t310 = pool.allocate("t310");
        let t311 = pool.allocate("t311");
        let si_acq_timeout = pool.allocate("si_acq_timeout");
        let si_acq_retry = pool.allocate("si_acq_retry");
        let reselection = pool.allocate("reselection");
        let rlc_flush = pool.allocate("rlc_flush");

        // defaults until SIB2 arrives
        for handle in [t300, t301, t310, t311] {
            pool.set(handle, 1000);
        }
        pool.set(si_acq_timeout, cfg.sib_search_timeout_ms);
        pool.set(reselection, cfg.cell_reselection_periodicity_ms);
        pool.set(rlc_flush, cfg.rlc_flush_timeout_ms);

        Self {
            pool,
            t300,
            t301,
            t302,
            t304,
            t310,
            t311,
            si_acq_timeout,
            si_acq_retry,
            reselection,
            rlc_flush,
        }
    }

    fn identify(&self, handle: TimerHandle) -> Option<RrcTimerId> {
        if handle == self.t300 {
            Some(RrcTimerId::T300)
        } else if handle == self.t301 {
            Some(RrcTimerId::T301)
        } else if handle == self.t302 {
            Some(RrcTimerId::T302)
        } else if handle == self.t304 {
            Some(RrcTimerId::T304)
        } else if handle == self.t310 {
            Some(RrcTimerId::T310)
        } else if handle == self.t311 {
            Some(RrcTimerId::T311)
        } else if handle == self.si_acq_timeout || handle == self.si_acq_retry {
            Some(RrcTimerId::SiAcq)
        } else if handle == self.reselection {
            Some(RrcTimerId::Reselection)
        } else if handle == self.rlc_flush {
            Some(RrcTimerId::RlcFlush)
        } else {
            None
        }
    }

    pub fn set(&mut self, handle: TimerHandle, duration_ms: u32) {
        self.pool.set(handle, duration_ms);
    }

    pub fn run(&mut self, handle: TimerHandle) {
        self.pool.run(handle);
    }

    pub fn stop(&mut self, handle: TimerHandle) {
        self.pool.stop(handle);
    }

    pub fn is_running(&self, handle: TimerHandle) -> bool {
        self.pool.is_running(handle)
    }

    pub fn is_expired(&self, handle: TimerHandle) -> bool {
        self.pool.is_expired(handle)
    }

    pub fn time_elapsed(&self, handle: TimerHandle) -> u32 {
        self.pool.time_elapsed(handle)
    }

    pub fn duration(&self, handle: TimerHandle) -> u32 {
        self.pool.duration(handle)
    }
}

/// The procedure instances, one per kind; `launch` failing on a running
/// instance is the concurrency guard.
#[derive(Default)]
pub(crate) struct ProcSet {
    pub cell_search: Proc<CellSearchProc>,
    pub si_acquire: Proc<SiAcquireProc>,
    pub serv_cell_cfg: Proc<ServingCellConfigProc>,
    pub cell_selection: Proc<CellSelectionProc>,
    pub cell_reselection: Proc<CellReselectionProc>,
    pub plmn_search: Proc<PlmnSearchProc>,
    pub conn_request: Proc<ConnectionRequestProc>,
    pub pcch: Proc<ProcessPcchProc>,
    pub go_idle: Proc<GoIdleProc>,
    pub conn_reest: Proc<ConnectionReestProc>,
    pub ho: Proc<HoProc>,
}

/// Identity of a procedure on the run-until-done list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcId {
    CellSearch,
    SiAcquire,
    ServCellCfg,
    CellSelection,
    CellReselection,
    PlmnSearch,
    ConnRequest,
    Pcch,
    GoIdle,
    ConnReest,
    Ho,
}

/// Queued engine event, delivered to the owning procedure after the current
/// handler returns.
#[derive(Debug)]
pub(crate) enum ProcEvent {
    CellSearchResult(CellSearchResult),
    CellSelectResult { observer: SelectObserver, result: bool },
    SibReceived(u32),
    SiTimerExpired(TimerHandle),
    CellSelectionComplete(ProcResult<CsResult>),
    PagingComplete(bool),
    RaCompleted(bool),
    HoT304Expired,
    RlcFlushTimeout,
}

/// The RRC procedure engine.
pub struct Rrc {
    pub(crate) cfg: UeConfig,
    pub(crate) state: RrcState,
    pub(crate) plmn_is_selected: bool,
    pub(crate) security_is_activated: bool,
    pub(crate) ue_identity: Option<STmsi>,
    pub(crate) sec_cfg: SecurityConfig,
    pub(crate) cell_resel_cfg: CellReselectionConfig,
    pub(crate) ue_required_sibs: Vec<u32>,
    pub(crate) dedicated_info_nas: Option<Bytes>,
    meas_cfg: Option<MeasConfig>,
    pub(crate) tti: Tti,
    n310_cnt: u32,
    n311_cnt: u32,
    n310: u32,
    n311: u32,

    pub timers: RrcTimers,
    pub cells: CellStore,
    pub phy_ctrl: PhyController,

    pub(crate) phy: Box<dyn PhyInterface>,
    pub(crate) mac: Box<dyn MacInterface>,
    pub(crate) rlc: Box<dyn RlcInterface>,
    pub(crate) pdcp: Box<dyn PdcpInterface>,
    pub(crate) nas: Box<dyn NasInterface>,
    pub(crate) usim: Box<dyn UsimInterface>,

    pub(crate) procs: ProcSet,
    events: VecDeque<ProcEvent>,
    pumping: bool,
    callback_list: Vec<ProcId>,
}

impl Rrc {
    pub fn new(cfg: UeConfig, layers: Layers) -> Self {
        let timers = RrcTimers::new(&cfg);
        let ue_required_sibs = cfg.required_sibs.clone();
        Self {
            cfg,
            state: RrcState::Idle,
            plmn_is_selected: false,
            security_is_activated: false,
            ue_identity: None,
            sec_cfg: SecurityConfig::default(),
            cell_resel_cfg: CellReselectionConfig::default(),
            ue_required_sibs,
            dedicated_info_nas: None,
            meas_cfg: None,
            tti: Tti::default(),
            n310_cnt: 0,
            n311_cnt: 0,
            n310: 1,
            n311: 1,
            timers,
            cells: CellStore::new(),
            phy_ctrl: PhyController::new(),
            phy: layers.phy,
            mac: layers.mac,
            rlc: layers.rlc,
            pdcp: layers.pdcp,
            nas: layers.nas,
            usim: layers.usim,
            procs: ProcSet::default(),
            events: VecDeque::new(),
            pumping: false,
            callback_list: Vec::new(),
        }
    }

    // ========================================================================
    // Task loop
    // ========================================================================

    /// Advance the engine by one subframe: expire timers, deliver queued
    /// events, then step the procedures on the run-until-done list.
    pub fn run_tti(&mut self, tti: Tti) {
        self.tti = tti;

        let expired = self.timers.pool.tick();
        for handle in expired {
            self.timer_expired(handle);
        }
        self.pump();

        let mut idx = 0;
        while idx < self.callback_list.len() {
            let id = self.callback_list[idx];
            if self.run_proc(id) {
                idx += 1;
            } else {
                self.callback_list.remove(idx);
            }
        }
        self.pump();
    }

    pub fn rrc_state(&self) -> RrcState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    // ========================================================================
    // NAS-facing entry points
    // ========================================================================

    /// Search all frequencies for PLMNs; the result is delivered through
    /// `NasInterface::plmn_search_completed`.
    pub fn plmn_search(&mut self) -> bool {
        if !proc::launch(self, |r: &mut Rrc| &mut r.procs.plmn_search, ()) {
            warn!("PLMN search already in progress");
            return false;
        }
        self.callback_add(ProcId::PlmnSearch);
        self.pump();
        true
    }

    /// Mark the PLMN selected by NAS.
    pub fn plmn_select(&mut self, plmn: Plmn) {
        info!(%plmn, "PLMN selected");
        self.plmn_is_selected = true;
    }

    pub fn set_ue_identity(&mut self, s_tmsi: STmsi) {
        info!(%s_tmsi, "UE identity set");
        self.ue_identity = Some(s_tmsi);
    }

    /// Establish an RRC connection; the outcome is delivered through
    /// `NasInterface::connection_request_completed`.
    pub fn connection_request(
        &mut self,
        cause: EstablishmentCause,
        dedicated_info_nas: Option<Bytes>,
    ) -> bool {
        if !proc::launch(self, |r: &mut Rrc| &mut r.procs.conn_request, (cause, dedicated_info_nas)) {
            warn!("connection request already in progress");
            return false;
        }
        self.callback_add(ProcId::ConnRequest);
        self.pump();
        true
    }

    /// Completion of the NAS paging procedure started via
    /// `NasInterface::paging`.
    pub fn paging_completed(&mut self, success: bool) {
        self.post(ProcEvent::PagingComplete(success));
    }

    /// AS security boundary: the security mode procedure supplies the keys
    /// and algorithms derived with the USIM.
    pub fn activate_security(&mut self, sec_cfg: SecurityConfig) {
        info!("AS security activated");
        self.sec_cfg = sec_cfg;
        self.security_is_activated = true;
    }

    // ========================================================================
    // PHY-facing entry points
    // ========================================================================

    /// Completion of a cell search requested through the PHY controller.
    pub fn cell_search_complete(&mut self, result: CellSearchResult) {
        self.phy_ctrl.cell_search_completed();
        self.post(ProcEvent::CellSearchResult(result));
    }

    /// Completion of a cell select requested through the PHY controller.
    pub fn cell_select_complete(&mut self, success: bool) {
        match self.phy_ctrl.take_select_observer() {
            Some(observer) => self.post(ProcEvent::CellSelectResult { observer, result: success }),
            None => warn!("cell select result with no pending request"),
        }
    }

    /// New RSRP measurement for a known cell.
    pub fn new_phy_meas(&mut self, pci: u16, earfcn: u32, rsrp_dbm: f32) {
        self.cells.new_phy_meas(pci, earfcn, rsrp_dbm);
    }

    /// PHY regained synchronization.
    pub fn in_sync(&mut self) {
        self.phy_ctrl.set_in_sync(true);
        if self.timers.is_running(self.timers.t310) {
            self.n311_cnt += 1;
            if self.n311_cnt >= self.n311 {
                info!(n311 = self.n311, "back in-sync, stopping T310");
                self.timers.stop(self.timers.t310);
                self.n310_cnt = 0;
                self.n311_cnt = 0;
            }
        }
    }

    /// PHY lost synchronization.
    pub fn out_of_sync(&mut self) {
        self.phy_ctrl.set_in_sync(false);
        // Sec 5.3.11.1: count out-of-sync indications while connected and
        // neither T310 nor T311 runs
        if self.state == RrcState::Connected
            && !self.timers.is_running(self.timers.t310)
            && !self.timers.is_running(self.timers.t311)
        {
            self.n310_cnt += 1;
            if self.n310_cnt >= self.n310 {
                warn!(n310 = self.n310, "out-of-sync, starting T310");
                self.timers.run(self.timers.t310);
                self.n310_cnt = 0;
                self.n311_cnt = 0;
            }
        }
    }

    // ========================================================================
    // MAC-facing entry points
    // ========================================================================

    /// Random access completed (used during handover).
    pub fn ra_completed(&mut self, success: bool) {
        self.post(ProcEvent::RaCompleted(success));
    }

    /// A SIB decoded from BCCH for the serving cell.
    pub fn write_pdu_bcch(&mut self, sib: SystemInformation) {
        let index = sib.index();
        info!(sib = index + 1, "received system information block");
        self.cells.serving_cell_mut().set_sib(sib.clone());
        match sib {
            SystemInformation::Sib1(_) => self.handle_sib1(),
            SystemInformation::Sib2(_) => self.handle_sib2(),
            SystemInformation::Sib3(s) => self.handle_sib3(&s),
            SystemInformation::Sib13(_) => self.handle_sib13(),
        }
        self.post(ProcEvent::SibReceived(index));
    }

    /// A Paging message decoded from PCCH.
    pub fn write_pdu_pcch(&mut self, paging: Paging) {
        if !proc::launch(self, |r: &mut Rrc| &mut r.procs.pcch, paging) {
            warn!("could not start PCCH processing, procedure already running");
            return;
        }
        self.callback_add(ProcId::Pcch);
        self.pump();
    }

    // ========================================================================
    // Downlink message entry points (decoded externally)
    // ========================================================================

    pub fn handle_connection_setup(&mut self, setup: ConnectionSetup) {
        if self.state != RrcState::Idle {
            warn!("received ConnectionSetup while not in IDLE");
            return;
        }
        info!("received RRCConnectionSetup");
        self.timers.stop(self.timers.t300);
        self.phy.apply_rr_config_dedicated(&setup.rr_cfg_dedicated);
        self.state = RrcState::Connected;

        let dedicated_info_nas = self.dedicated_info_nas.take().unwrap_or_default();
        self.pdcp.write_ul_message(
            SRB1,
            UlMessage::ConnectionSetupComplete {
                transaction_id: setup.transaction_id,
                dedicated_info_nas,
            },
        );
        self.pump();
    }

    pub fn handle_connection_reject(&mut self, reject: ConnectionReject) {
        warn!(wait_time_s = reject.wait_time_s, "received RRCConnectionReject");
        self.timers.stop(self.timers.t300);
        self.timers.set(self.timers.t302, reject.wait_time_s * 1000);
        self.timers.run(self.timers.t302);
        self.pump();
    }

    pub fn handle_connection_reconfiguration(&mut self, recfg: ConnectionReconfiguration) {
        if recfg.mobility_control_info.is_some() {
            if self.state != RrcState::Connected {
                warn!("received HO command while not connected");
                return;
            }
            if !proc::launch(self, |r: &mut Rrc| &mut r.procs.ho, recfg) {
                warn!("handover already in progress");
                return;
            }
            self.callback_add(ProcId::Ho);
            self.pump();
        } else {
            debug!("received RRCConnectionReconfiguration without mobility");
            if let Some(dedicated) = &recfg.rr_cfg_dedicated {
                self.apply_rr_config_dedicated(dedicated);
            }
            if let Some(meas_cfg) = recfg.meas_config {
                self.apply_meas_config(meas_cfg);
            }
            self.send_reconfiguration_complete(recfg.transaction_id);
        }
    }

    /// RRCConnectionRelease: transition to IDLE once RLC drains.
    pub fn handle_connection_release(&mut self) {
        info!("received RRCConnectionRelease");
        self.start_go_idle();
        self.pump();
    }

    // ========================================================================
    // Timer expiry routing
    // ========================================================================

    fn timer_expired(&mut self, handle: TimerHandle) {
        match self.timers.identify(handle) {
            Some(RrcTimerId::T300) => {
                // the connection request procedure polls T300
                debug!("T300 expired");
            }
            Some(RrcTimerId::T301) => {
                if self.state == RrcState::Connected {
                    warn!("T301 expired, going to IDLE");
                    self.start_go_idle();
                } else {
                    debug!("T301 expired while idle");
                }
            }
            Some(RrcTimerId::T302) => {
                info!("T302 expired, barring lifted");
                self.nas.set_barring(Barring::None);
            }
            Some(RrcTimerId::T304) => {
                warn!("T304 expired: handover failed");
                self.post(ProcEvent::HoT304Expired);
                self.start_connection_reest(ReestablishmentCause::HandoverFailure);
            }
            Some(RrcTimerId::T310) => {
                warn!("T310 expired: radio link failure");
                if self.state == RrcState::Connected {
                    self.start_connection_reest(ReestablishmentCause::OtherFailure);
                }
            }
            Some(RrcTimerId::T311) => {
                // the reestablishment procedure polls T311
                debug!("T311 expired");
            }
            Some(RrcTimerId::SiAcq) => {
                self.defer(ProcEvent::SiTimerExpired(handle));
            }
            Some(RrcTimerId::Reselection) => {
                if !self.launch_cell_reselection() {
                    warn!("failed to initiate periodic cell reselection");
                } else {
                    self.callback_add(ProcId::CellReselection);
                }
            }
            Some(RrcTimerId::RlcFlush) => {
                self.defer(ProcEvent::RlcFlushTimeout);
            }
            None => debug!("expiry of unknown timer"),
        }
    }

    // ========================================================================
    // Event queue
    // ========================================================================

    pub(crate) fn defer(&mut self, event: ProcEvent) {
        self.events.push_back(event);
    }

    fn post(&mut self, event: ProcEvent) {
        self.events.push_back(event);
        self.pump();
    }

    /// Deliver queued events in FIFO order. Events triggered from within a
    /// handler are delivered after that handler returns.
    fn pump(&mut self) {
        if self.pumping {
            return;
        }
        self.pumping = true;
        while let Some(event) = self.events.pop_front() {
            self.dispatch(event);
        }
        self.pumping = false;
    }

    fn dispatch(&mut self, event: ProcEvent) {
        match event {
            ProcEvent::CellSearchResult(result) => {
                if self.procs.cell_search.is_running() {
                    proc::trigger(
                        self,
                        |r: &mut Rrc| &mut r.procs.cell_search,
                        CellSearchEvent::SearchResult(result),
                    );
                } else {
                    debug!("cell search result but no cell search is running");
                }
            }
            ProcEvent::CellSelectResult { observer, result } => match observer {
                SelectObserver::CellSearch => proc::trigger(
                    self,
                    |r: &mut Rrc| &mut r.procs.cell_search,
                    CellSearchEvent::SelectResult(result),
                ),
                SelectObserver::CellSelection => {
                    proc::trigger(self, |r: &mut Rrc| &mut r.procs.cell_selection, result)
                }
                SelectObserver::Handover => {
                    proc::trigger(self, |r: &mut Rrc| &mut r.procs.ho, HoEvent::SelectResult(result))
                }
            },
            ProcEvent::SibReceived(index) => {
                if self.procs.si_acquire.is_running() {
                    proc::trigger(self, |r: &mut Rrc| &mut r.procs.si_acquire, SiAcquireEvent::SibReceived);
                } else {
                    debug!(sib = index + 1, "SIB received with no SI acquisition running");
                }
            }
            ProcEvent::SiTimerExpired(handle) => {
                if self.procs.si_acquire.is_running() {
                    proc::trigger(
                        self,
                        |r: &mut Rrc| &mut r.procs.si_acquire,
                        SiAcquireEvent::TimerExpired(handle),
                    );
                }
            }
            ProcEvent::CellSelectionComplete(result) => {
                if self.procs.conn_request.is_running() {
                    proc::trigger(self, |r: &mut Rrc| &mut r.procs.conn_request, result);
                } else {
                    debug!("cell selection completed with no connection request waiting");
                }
            }
            ProcEvent::PagingComplete(success) => {
                if self.procs.pcch.is_running() {
                    proc::trigger(self, |r: &mut Rrc| &mut r.procs.pcch, success);
                } else {
                    warn!("paging completion with no PCCH procedure running");
                }
            }
            ProcEvent::RaCompleted(success) => {
                if self.procs.ho.is_running() {
                    proc::trigger(self, |r: &mut Rrc| &mut r.procs.ho, HoEvent::RaCompleted(success));
                } else {
                    debug!(success, "RA completed outside handover");
                }
            }
            ProcEvent::HoT304Expired => {
                if self.procs.ho.is_running() {
                    proc::trigger(self, |r: &mut Rrc| &mut r.procs.ho, HoEvent::T304Expired);
                }
            }
            ProcEvent::RlcFlushTimeout => {
                if self.procs.go_idle.is_running() {
                    proc::trigger(self, |r: &mut Rrc| &mut r.procs.go_idle, true);
                }
            }
        }
    }

    // ========================================================================
    // Procedure launch/run helpers
    // ========================================================================

    fn run_proc(&mut self, id: ProcId) -> bool {
        match id {
            ProcId::CellSearch => proc::run(self, |r: &mut Rrc| &mut r.procs.cell_search),
            ProcId::SiAcquire => proc::run(self, |r: &mut Rrc| &mut r.procs.si_acquire),
            ProcId::ServCellCfg => proc::run(self, |r: &mut Rrc| &mut r.procs.serv_cell_cfg),
            ProcId::CellSelection => proc::run(self, |r: &mut Rrc| &mut r.procs.cell_selection),
            ProcId::CellReselection => proc::run(self, |r: &mut Rrc| &mut r.procs.cell_reselection),
            ProcId::PlmnSearch => proc::run(self, |r: &mut Rrc| &mut r.procs.plmn_search),
            ProcId::ConnRequest => proc::run(self, |r: &mut Rrc| &mut r.procs.conn_request),
            ProcId::Pcch => proc::run(self, |r: &mut Rrc| &mut r.procs.pcch),
            ProcId::GoIdle => proc::run(self, |r: &mut Rrc| &mut r.procs.go_idle),
            ProcId::ConnReest => proc::run(self, |r: &mut Rrc| &mut r.procs.conn_reest),
            ProcId::Ho => proc::run(self, |r: &mut Rrc| &mut r.procs.ho),
        }
    }

    pub(crate) fn callback_add(&mut self, id: ProcId) {
        if !self.callback_list.contains(&id) {
            self.callback_list.push(id);
        }
    }

    pub(crate) fn launch_cell_search_fut(&mut self, fut: &mut ProcFuture<CellSearchResult>) -> bool {
        proc::launch_fut(self, |r: &mut Rrc| &mut r.procs.cell_search, fut, ())
    }

    pub(crate) fn run_cell_search(&mut self) -> bool {
        proc::run(self, |r: &mut Rrc| &mut r.procs.cell_search)
    }

    pub(crate) fn launch_si_acquire(&mut self, fut: &mut ProcFuture<()>, sib_index: u32) -> bool {
        proc::launch_fut(self, |r: &mut Rrc| &mut r.procs.si_acquire, fut, sib_index)
    }

    pub(crate) fn launch_serv_cell_cfg_fut(
        &mut self,
        fut: &mut ProcFuture<()>,
        required_sibs: Vec<u32>,
    ) -> bool {
        proc::launch_fut(self, |r: &mut Rrc| &mut r.procs.serv_cell_cfg, fut, required_sibs)
    }

    pub(crate) fn launch_serv_cell_cfg(&mut self, required_sibs: Vec<u32>) -> bool {
        proc::launch(self, |r: &mut Rrc| &mut r.procs.serv_cell_cfg, required_sibs)
    }

    pub(crate) fn run_serv_cell_cfg(&mut self) -> bool {
        proc::run(self, |r: &mut Rrc| &mut r.procs.serv_cell_cfg)
    }

    pub(crate) fn launch_cell_selection(&mut self) -> bool {
        proc::launch(self, |r: &mut Rrc| &mut r.procs.cell_selection, ())
    }

    pub(crate) fn launch_cell_selection_fut(&mut self, fut: &mut ProcFuture<CsResult>) -> bool {
        proc::launch_fut(self, |r: &mut Rrc| &mut r.procs.cell_selection, fut, ())
    }

    pub(crate) fn run_cell_selection(&mut self) -> bool {
        proc::run(self, |r: &mut Rrc| &mut r.procs.cell_selection)
    }

    pub(crate) fn cell_selection_is_idle(&self) -> bool {
        self.procs.cell_selection.is_idle()
    }

    pub(crate) fn launch_cell_reselection(&mut self) -> bool {
        proc::launch(self, |r: &mut Rrc| &mut r.procs.cell_reselection, ())
    }

    pub(crate) fn run_cell_reselection(&mut self) -> bool {
        proc::run(self, |r: &mut Rrc| &mut r.procs.cell_reselection)
    }

    pub(crate) fn start_go_idle(&mut self) {
        if !proc::launch(self, |r: &mut Rrc| &mut r.procs.go_idle, ()) {
            warn!("go-idle procedure already running");
            return;
        }
        self.callback_add(ProcId::GoIdle);
    }

    pub(crate) fn start_connection_reest(&mut self, cause: ReestablishmentCause) {
        if !proc::launch(self, |r: &mut Rrc| &mut r.procs.conn_reest, cause) {
            warn!("connection reestablishment already running");
            return;
        }
        self.callback_add(ProcId::ConnReest);
    }

    // ========================================================================
    // Shared operations used by the procedures
    // ========================================================================

    /// Cell selection criterion S (TS 36.304 Sec 5.2.3.2). Without SIB3 the
    /// criterion is unavailable and candidates pass unconditionally.
    pub(crate) fn cell_selection_criteria(&self, rsrp_dbm: f32) -> bool {
        if self.cells.serving_cell().has_sib3() {
            rsrp_dbm >= self.cell_resel_cfg.q_rx_lev_min + self.cell_resel_cfg.q_rx_lev_min_offset
        } else {
            true
        }
    }

    pub(crate) fn set_serving_cell(&mut self, phy_cell: PhyCell, discard_serving: bool) {
        self.cells.set_serving_cell(phy_cell, discard_serving);
        debug!(cell = %self.cells.serving_cell(), discard_serving, "serving cell set");
    }

    pub(crate) fn start_phy_cell_search(&mut self) -> bool {
        self.phy_ctrl.start_cell_search(self.phy.as_mut())
    }

    pub(crate) fn start_phy_cell_select(&mut self, cell: PhyCell, observer: SelectObserver) -> bool {
        self.phy_ctrl.start_cell_select(self.phy.as_mut(), cell, observer)
    }

    pub(crate) fn set_phy_default(&mut self) {
        self.phy.set_config_default();
    }

    pub(crate) fn set_phy_default_pucch_srs(&mut self) {
        self.phy.set_default_pucch_srs();
    }

    pub(crate) fn set_mac_default(&mut self) {
        self.mac.set_config_default();
    }

    pub(crate) fn apply_rr_config_common(&mut self, cfg: &RrConfigCommon) {
        self.phy.apply_rr_config_common(cfg);
    }

    pub(crate) fn apply_rr_config_dedicated(&mut self, cfg: &RrConfigDedicated) {
        self.phy.apply_rr_config_dedicated(cfg);
    }

    pub(crate) fn apply_meas_config(&mut self, cfg: MeasConfig) {
        debug!("storing measurement configuration");
        self.meas_cfg = Some(cfg);
    }

    /// The measurement configuration received from the network, if any.
    pub fn meas_config(&self) -> Option<&MeasConfig> {
        self.meas_cfg.as_ref()
    }

    pub(crate) fn send_connection_request(&mut self, cause: EstablishmentCause) {
        let ue_identity = match self.ue_identity {
            Some(s_tmsi) => InitialUeIdentity::STmsi(s_tmsi),
            None => InitialUeIdentity::Random(rand::random::<u64>() & 0xFF_FFFF_FFFF),
        };
        info!(?cause, "sending RRCConnectionRequest");
        self.pdcp
            .write_ul_message(SRB0, UlMessage::ConnectionRequest { cause, ue_identity });
    }

    pub(crate) fn send_reestablishment_request(
        &mut self,
        c_rnti: u16,
        pci: u16,
        cause: ReestablishmentCause,
    ) {
        info!(c_rnti, pci, %cause, "sending RRCConnectionReestablishmentRequest");
        self.pdcp.write_ul_message(
            SRB0,
            UlMessage::ReestablishmentRequest { c_rnti, pci, cause },
        );
    }

    pub(crate) fn send_reconfiguration_complete(&mut self, transaction_id: u8) {
        info!(transaction_id, "sending RRCConnectionReconfigurationComplete");
        self.pdcp
            .write_ul_message(SRB1, UlMessage::ReconfigurationComplete { transaction_id });
    }

    /// Reconfiguration could not be applied: reset the lower layers and
    /// either recover through reestablishment or drop to IDLE.
    pub(crate) fn con_reconfig_failed(&mut self) {
        warn!("reconfiguration failed");
        self.mac.reset();
        self.set_mac_default();
        if self.security_is_activated {
            self.start_connection_reest(ReestablishmentCause::ReconfigurationFailure);
        } else {
            self.start_go_idle();
        }
    }

    /// Leave RRC_CONNECTED: stop the connection timers, drop security and
    /// restore the default lower-layer configuration.
    pub(crate) fn leave_connected(&mut self) {
        info!("leaving RRC_CONNECTED state");
        self.state = RrcState::Idle;
        for handle in [
            self.timers.t300,
            self.timers.t301,
            self.timers.t304,
            self.timers.t310,
            self.timers.t311,
        ] {
            self.timers.stop(handle);
        }
        self.security_is_activated = false;
        self.n310_cnt = 0;
        self.n311_cnt = 0;
        self.mac.reset();
        self.set_phy_default();
        self.set_mac_default();
    }

    // ========================================================================
    // SIB handlers
    // ========================================================================

    fn handle_sib1(&mut self) {
        let serving = self.cells.serving_cell();
        info!(
            tac = serving.tac(),
            plmns = serving.nof_plmns(),
            "SIB1 of serving cell processed"
        );
    }

    pub(crate) fn handle_sib2(&mut self) {
        let Some(sib2) = self.cells.serving_cell().sib2().cloned() else {
            return;
        };
        let t = &sib2.ue_timers_and_constants;
        self.timers.set(self.timers.t300, t.t300_ms);
        self.timers.set(self.timers.t301, t.t301_ms);
        self.timers.set(self.timers.t310, t.t310_ms);
        self.timers.set(self.timers.t311, t.t311_ms);
        self.n310 = t.n310;
        self.n311 = t.n311;
        debug!(
            t300 = t.t300_ms,
            t301 = t.t301_ms,
            t310 = t.t310_ms,
            t311 = t.t311_ms,
            "applied SIB2 UE timers and constants"
        );
    }

    fn handle_sib3(&mut self, sib3: &Sib3) {
        self.cell_resel_cfg = CellReselectionConfig {
            q_rx_lev_min: sib3.q_rx_lev_min,
            q_rx_lev_min_offset: sib3.q_rx_lev_min_offset,
        };
        debug!(
            q_rx_lev_min = sib3.q_rx_lev_min,
            q_rx_lev_min_offset = sib3.q_rx_lev_min_offset,
            "applied SIB3 reselection parameters"
        );
    }

    pub(crate) fn handle_sib13(&mut self) {
        self.cells.serving_cell_mut().has_mcch = true;
        debug!("SIB13 processed, MCCH present");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{RrConfigCommon, RrConfigDedicated, ScellConfig, Sib2, Sib3, UeTimersAndConstants};
    use crate::interfaces::UeRnti;
    use lteue_common::types::FoundPlmn;

    struct NullPhy;

    impl PhyInterface for NullPhy {
        fn start_cell_search(&mut self) -> bool {
            true
        }
        fn start_cell_select(&mut self, _cell: PhyCell) -> bool {
            true
        }
        fn cell_is_camping(&self) -> bool {
            false
        }
        fn reset(&mut self) {}
        fn set_config_default(&mut self) {}
        fn set_default_pucch_srs(&mut self) {}
        fn apply_rr_config_common(&mut self, _cfg: &RrConfigCommon) {}
        fn apply_rr_config_dedicated(&mut self, _cfg: &RrConfigDedicated) {}
        fn apply_scell_config(&mut self, _cfg: &ScellConfig) {}
    }

    struct NullMac;

    impl MacInterface for NullMac {
        fn bcch_start_rx(&mut self, _si_window_start: Tti, _si_window_length: u32) {}
        fn pcch_start_rx(&mut self) {}
        fn reset(&mut self) {}
        fn wait_uplink(&mut self) {}
        fn clear_rntis(&mut self) {}
        fn get_rntis(&self) -> UeRnti {
            UeRnti::default()
        }
        fn set_ho_rnti(&mut self, _rnti: u16, _target_pci: u16) {}
        fn start_cont_ho(&mut self) {}
        fn start_noncont_ho(&mut self, _preamble_index: u8, _prach_mask_index: u8) {}
        fn set_config_default(&mut self) {}
    }

    struct NullRlc;

    impl RlcInterface for NullRlc {
        fn reestablish(&mut self) {}
        fn has_bearer(&self, _lcid: u32) -> bool {
            false
        }
        fn suspend_bearer(&mut self, _lcid: u32) {}
        fn srbs_flushed(&self) -> bool {
            true
        }
    }

    struct NullPdcp;

    impl PdcpInterface for NullPdcp {
        fn reestablish(&mut self) {}
        fn config_security(&mut self, _cfg: &SecurityConfig) {}
        fn write_ul_message(&mut self, _lcid: u32, _msg: UlMessage) {}
    }

    struct NullNas;

    impl NasInterface for NullNas {
        fn plmn_search_completed(&mut self, _found_plmns: Option<&[FoundPlmn]>) {}
        fn paging(&mut self, _ue_identity: &STmsi) -> bool {
            true
        }
        fn connection_request_completed(&mut self, _success: bool) {}
        fn set_barring(&mut self, _barring: Barring) {}
        fn is_attached(&self) -> bool {
            false
        }
    }

    struct NullUsim;

    impl UsimInterface for NullUsim {
        fn generate_as_keys_ho(
            &mut self,
            _target_pci: u16,
            _earfcn: u32,
            _ncc: Option<u8>,
            _cfg: &mut SecurityConfig,
        ) {
        }
    }

    fn make_rrc() -> Rrc {
        Rrc::new(
            UeConfig::default(),
            Layers {
                phy: Box::new(NullPhy),
                mac: Box::new(NullMac),
                rlc: Box::new(NullRlc),
                pdcp: Box::new(NullPdcp),
                nas: Box::new(NullNas),
                usim: Box::new(NullUsim),
            },
        )
    }

    #[test]
    fn test_initial_state() {
        let rrc = make_rrc();
        assert_eq!(rrc.rrc_state(), RrcState::Idle);
        assert!(!rrc.is_connected());
        assert!(!rrc.timers.is_running(rrc.timers.t300));
    }

    #[test]
    fn test_rrc_state_display() {
        assert_eq!(RrcState::Idle.to_string(), "RRC_IDLE");
        assert_eq!(RrcState::Connected.to_string(), "RRC_CONNECTED");
    }

    #[test]
    fn test_criterion_unavailable_without_sib3() {
        let rrc = make_rrc();
        // without SIB3 the criterion is treated as unavailable
        assert!(rrc.cell_selection_criteria(f32::NAN));
        assert!(rrc.cell_selection_criteria(-150.0));
    }

    #[test]
    fn test_sib3_sets_selection_criterion() {
        let mut rrc = make_rrc();
        rrc.write_pdu_bcch(SystemInformation::Sib3(Sib3 {
            q_hyst_db: 4,
            q_rx_lev_min: -120.0,
            q_rx_lev_min_offset: 2.0,
        }));
        assert!(rrc.cell_selection_criteria(-110.0));
        assert!(!rrc.cell_selection_criteria(-125.0));
        // an unmeasured cell never passes
        assert!(!rrc.cell_selection_criteria(f32::NAN));
        assert!(!rrc.cell_selection_criteria(f32::NEG_INFINITY));
    }

    #[test]
    fn test_sib2_applies_ue_timers() {
        let mut rrc = make_rrc();
        rrc.write_pdu_bcch(SystemInformation::Sib2(Sib2 {
            ue_timers_and_constants: UeTimersAndConstants {
                t300_ms: 200,
                t301_ms: 300,
                t310_ms: 50,
                n310: 2,
                t311_ms: 3000,
                n311: 2,
            },
        }));
        assert_eq!(rrc.timers.duration(rrc.timers.t300), 200);
        assert_eq!(rrc.timers.duration(rrc.timers.t301), 300);
        assert_eq!(rrc.timers.duration(rrc.timers.t310), 50);
        assert_eq!(rrc.timers.duration(rrc.timers.t311), 3000);
    }

    #[test]
    fn test_connection_request_without_plmn_fails_cleanly() {
        let mut rrc = make_rrc();
        assert!(rrc.connection_request(EstablishmentCause::MoData, None));
        // the procedure terminated synchronously with an error
        assert_eq!(rrc.rrc_state(), RrcState::Idle);
        assert!(!rrc.timers.is_running(rrc.timers.t300));
    }

    #[test]
    fn test_out_of_sync_starts_t310_after_n310() {
        let mut rrc = make_rrc();
        rrc.write_pdu_bcch(SystemInformation::Sib2(Sib2 {
            ue_timers_and_constants: UeTimersAndConstants {
                n310: 2,
                n311: 1,
                ..UeTimersAndConstants::default()
            },
        }));
        rrc.state = RrcState::Connected;

        rrc.out_of_sync();
        assert!(!rrc.timers.is_running(rrc.timers.t310));
        rrc.out_of_sync();
        assert!(rrc.timers.is_running(rrc.timers.t310));

        rrc.in_sync();
        assert!(!rrc.timers.is_running(rrc.timers.t310));
    }

    #[test]
    fn test_out_of_sync_ignored_while_idle() {
        let mut rrc = make_rrc();
        rrc.out_of_sync();
        rrc.out_of_sync();
        assert!(!rrc.timers.is_running(rrc.timers.t310));
    }
}
