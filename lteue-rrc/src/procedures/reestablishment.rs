//! RRC connection re-establishment procedure (TS 36.331 Sec 5.3.7)
//!
//! After a radio link, handover or reconfiguration failure, suspends the
//! radio bearers, runs cell reselection under T311 and, once a cell meeting
//! the S criterion is found with its SIBs, transmits the
//! RRCConnectionReestablishmentRequest under T301. Without activated AS
//! security the UE moves straight to RRC_IDLE instead.

use tracing::{info, warn};

use crate::messages::ReestablishmentCause;
use crate::interfaces::MAX_RADIO_BEARERS;
use crate::proc::{Outcome, Procedure};
use crate::rrc::{Rrc, RrcState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    CellReselection,
    CellConfiguration,
}

/// Recovers the RRC connection after a failure.
#[derive(Default)]
pub struct ConnectionReestProc {
    state: State,
    reest_rnti: u16,
    reest_cause: ReestablishmentCause,
    reest_source_pci: u16,
    reest_source_freq: u32,
}

impl ConnectionReestProc {
    /// Actions following cell selection while T311 is running, Sec 5.3.7.3.
    fn cell_criteria(&mut self, rrc: &mut Rrc) -> Outcome {
        let serving_rsrp = rrc.cells.serving_cell().rsrp();
        if rrc.cell_selection_criteria(serving_rsrp) {
            info!(
                proc = Self::NAME,
                elapsed_ms = rrc.timers.time_elapsed(rrc.timers.t311),
                source_pci = self.reest_source_pci,
                source_earfcn = self.reest_source_freq,
                "cell selection criteria passed, sending RRCConnectionReestablishmentRequest"
            );

            rrc.timers.stop(rrc.timers.t311);
            rrc.timers.run(rrc.timers.t301);

            rrc.send_reestablishment_request(self.reest_rnti, self.reest_source_pci, self.reest_cause);
        } else if rrc.timers.is_running(rrc.timers.t311) {
            info!(proc = Self::NAME, "reestablishment cell selection criteria failed");

            if !rrc.launch_cell_reselection() {
                warn!(proc = Self::NAME, "failed to initiate a cell reselection procedure");
                return Outcome::Error;
            }
            self.state = State::CellReselection;
            return Outcome::Yield;
        }
        Outcome::Success
    }

    fn serving_has_required_sibs(rrc: &Rrc) -> bool {
        let serving = rrc.cells.serving_cell();
        serving.has_sib1() && serving.has_sib2() && serving.has_sib3()
    }

    fn step_cell_reselection(&mut self, rrc: &mut Rrc) -> Outcome {
        if !rrc.run_cell_reselection() {
            if !rrc.timers.is_running(rrc.timers.t311) {
                // abort once T311 expires
                info!(proc = Self::NAME, "T311 expired during cell reselection, going to IDLE");
                rrc.start_go_idle();
                return Outcome::Success;
            }

            if rrc.phy_ctrl.is_in_sync() {
                if Self::serving_has_required_sibs(rrc) {
                    info!(proc = Self::NAME, "in-sync, SIBs available, going to cell criteria");
                    return self.cell_criteria(rrc);
                }
                info!(
                    proc = Self::NAME,
                    has_sib1 = rrc.cells.serving_cell().has_sib1(),
                    has_sib2 = rrc.cells.serving_cell().has_sib2(),
                    has_sib3 = rrc.cells.serving_cell().has_sib3(),
                    "SIBs missing, launching serving cell configuration"
                );
                if !rrc.launch_serv_cell_cfg(vec![0, 1, 2]) {
                    warn!(proc = Self::NAME, "failed to initiate serving cell configuration");
                    return Outcome::Error;
                }
                self.state = State::CellConfiguration;
            } else {
                info!(
                    proc = Self::NAME,
                    t311_elapsed_ms = rrc.timers.time_elapsed(rrc.timers.t311),
                    t311_ms = rrc.timers.duration(rrc.timers.t311),
                    "serving cell is out-of-sync, re-launching reselection"
                );
                if !rrc.launch_cell_reselection() {
                    return Outcome::Error;
                }
            }
        }

        Outcome::Yield
    }

    fn step_cell_configuration(&mut self, rrc: &mut Rrc) -> Outcome {
        if !rrc.run_serv_cell_cfg() {
            if !rrc.timers.is_running(rrc.timers.t311) {
                // abort once T311 expires
                info!(proc = Self::NAME, "T311 expired during cell configuration, going to IDLE");
                rrc.start_go_idle();
                return Outcome::Success;
            }

            if rrc.phy_ctrl.is_in_sync() {
                if Self::serving_has_required_sibs(rrc) {
                    return self.cell_criteria(rrc);
                }
                warn!(proc = Self::NAME, "failed to configure serving cell, could not acquire SIBs");
                return Outcome::Error;
            }
            // out-of-sync, back to reselection
            info!(proc = Self::NAME, "serving cell is out-of-sync, re-launching reselection");
            if !rrc.launch_cell_reselection() {
                warn!(proc = Self::NAME, "failed to initiate a cell reselection procedure");
                return Outcome::Error;
            }
            self.state = State::CellReselection;
        }

        Outcome::Yield
    }
}

impl Procedure for ConnectionReestProc {
    type Ctx = Rrc;
    type Args = ReestablishmentCause;
    type Event = ();
    type Output = ();

    const NAME: &'static str = "Connection Reestablishment";

    fn init(&mut self, rrc: &mut Rrc, cause: ReestablishmentCause) -> Outcome {
        info!(proc = Self::NAME, %cause, "starting");

        // save the current C-RNTI before the MAC reset
        let uernti = rrc.mac.get_rntis();

        // only with AS security activated, RRC connected and a C-RNTI;
        // otherwise move to RRC_IDLE directly (Sec 5.3.7.1)
        if rrc.security_is_activated && rrc.state == RrcState::Connected && uernti.crnti != 0 {
            self.reest_rnti = uernti.crnti;
            self.reest_cause = cause;
            self.reest_source_pci = rrc.cells.serving_cell().pci();
            self.reest_source_freq = rrc.cells.serving_cell().earfcn();

            // initiation of the procedure, Sec 5.3.7.2
            info!(proc = Self::NAME, "conditions are met, initiating RRC connection reestablishment");

            rrc.timers.stop(rrc.timers.t310);
            rrc.timers.run(rrc.timers.t311);

            // suspend all RB except SRB0
            for lcid in 1..MAX_RADIO_BEARERS {
                if rrc.rlc.has_bearer(lcid) {
                    rrc.rlc.suspend_bearer(lcid);
                }
            }

            rrc.mac.reset();

            // default physical channel configuration, Sec 9.2.4
            rrc.set_phy_default_pucch_srs();

            // default MAC main configuration, Sec 9.2.2
            rrc.set_mac_default();

            if !rrc.launch_cell_reselection() {
                warn!(proc = Self::NAME, "failed to initiate a cell reselection procedure");
                return Outcome::Error;
            }
            self.state = State::CellReselection;
        } else {
            info!(proc = Self::NAME, "conditions are not met, going to IDLE");
            rrc.start_go_idle();
            return Outcome::Success;
        }

        Outcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        match self.state {
            State::CellReselection => self.step_cell_reselection(rrc),
            State::CellConfiguration => self.step_cell_configuration(rrc),
        }
    }

    fn output(&mut self) {}
}
