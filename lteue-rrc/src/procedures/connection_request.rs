//! RRC connection establishment procedure (TS 36.331 Sec 5.3.3)
//!
//! Takes the UE from IDLE to CONNECTED: reuses or launches cell selection,
//! configures the serving cell, transmits RRCConnectionRequest and waits on
//! T300 for the RRCConnectionSetup or Reject.

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::interfaces::{Barring, EstablishmentCause};
use crate::proc::{Outcome, ProcFuture, ProcResult, Procedure};
use crate::procedures::cell_selection::CsResult;
use crate::rrc::{ProcId, Rrc, RrcState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    CellSelection,
    ConfigServingCell,
    WaitT300,
}

/// Establishes an RRC connection on request of NAS.
#[derive(Default)]
pub struct ConnectionRequestProc {
    state: State,
    cause: EstablishmentCause,
    dedicated_info_nas: Option<Bytes>,
    cs_ret: CsResult,
    serv_cfg_fut: ProcFuture<()>,
}

impl Procedure for ConnectionRequestProc {
    type Ctx = Rrc;
    type Args = (EstablishmentCause, Option<Bytes>);
    type Event = ProcResult<CsResult>;
    type Output = ();

    const NAME: &'static str = "Connection Request";

    fn init(&mut self, rrc: &mut Rrc, (cause, dedicated_info_nas): Self::Args) -> Outcome {
        self.cause = cause;
        self.dedicated_info_nas = dedicated_info_nas;

        if !rrc.plmn_is_selected {
            warn!(proc = Self::NAME, "trying to connect but PLMN not selected");
            return Outcome::Error;
        }

        if rrc.state != RrcState::Idle {
            warn!(proc = Self::NAME, "requested RRC connection establishment while not in IDLE");
            return Outcome::Error;
        }

        if rrc.timers.is_running(rrc.timers.t302) {
            info!(proc = Self::NAME, "requested RRC connection establishment while T302 is running");
            rrc.nas.set_barring(Barring::MoData);
            return Outcome::Error;
        }

        info!(proc = Self::NAME, "initiation of connection establishment procedure");

        self.cs_ret = CsResult::NoCell;
        self.state = State::CellSelection;
        if rrc.cell_selection_is_idle() {
            // no one is running cell selection
            if !rrc.launch_cell_selection() {
                warn!(proc = Self::NAME, "failed to initiate cell selection procedure");
                return Outcome::Error;
            }
            rrc.callback_add(ProcId::CellSelection);
        } else {
            info!(proc = Self::NAME, "cell selection already on-going, waiting for its result");
        }
        Outcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        match self.state {
            // cell selection signals back with an event trigger
            State::CellSelection => Outcome::Yield,
            State::ConfigServingCell => {
                if rrc.run_serv_cell_cfg() {
                    return Outcome::Yield;
                }
                if self.serv_cfg_fut.is_error() {
                    warn!(proc = Self::NAME, "failed to configure serving cell");
                    return Outcome::Error;
                }

                rrc.timers.run(rrc.timers.t300);

                // send the connection request message to the lower layers
                rrc.send_connection_request(self.cause);

                // save the dedicatedInfoNAS SDU, if needed
                if let Some(sdu) = self.dedicated_info_nas.take() {
                    if rrc.dedicated_info_nas.is_some() {
                        warn!(
                            proc = Self::NAME,
                            "received a new dedicatedInfoNAS SDU but one was still queued, dropping it"
                        );
                    }
                    debug!(proc = Self::NAME, "updating dedicatedInfoNAS");
                    rrc.dedicated_info_nas = Some(sdu);
                } else {
                    debug!(proc = Self::NAME, "dedicatedInfoNAS has already been provided");
                }

                info!(proc = Self::NAME, "waiting for RRCConnectionSetup/Reject or T300 expiry");
                self.state = State::WaitT300;
                self.step(rrc)
            }
            State::WaitT300 => {
                // wait until T300 stops, due to Setup/Reject or expiry
                if rrc.timers.is_running(rrc.timers.t300) {
                    return Outcome::Yield;
                }

                if rrc.state == RrcState::Connected {
                    // received ConnectionSetup
                    return Outcome::Success;
                }
                if rrc.timers.is_expired(rrc.timers.t300) {
                    // T300 expiry, Sec 5.3.3.6
                    warn!(proc = Self::NAME, "timer T300 expired: connection request timed out");
                    rrc.mac.reset();
                    rrc.set_mac_default();
                    rrc.rlc.reestablish();
                } else {
                    // T300 stopped without entering CONNECTED: Reject, Sec 5.3.3.8
                    warn!(proc = Self::NAME, "timer T300 stopped: received ConnectionReject");
                    rrc.mac.reset();
                    rrc.set_mac_default();
                }
                Outcome::Error
            }
        }
    }

    fn react(&mut self, rrc: &mut Rrc, result: ProcResult<CsResult>) -> Outcome {
        if self.state != State::CellSelection {
            // not expecting a cell selection result
            return Outcome::Yield;
        }
        let Some(&cs_ret) = result.value() else {
            return Outcome::Error;
        };
        self.cs_ret = cs_ret;

        if rrc.phy.cell_is_camping() {
            // set default configurations
            rrc.set_phy_default();
            rrc.set_mac_default();

            info!(proc = Self::NAME, "configuring serving cell");
            let required = rrc.ue_required_sibs.clone();
            if !rrc.launch_serv_cell_cfg_fut(&mut self.serv_cfg_fut, required) {
                warn!(proc = Self::NAME, "failed to launch serving cell configuration");
                return Outcome::Error;
            }
            self.state = State::ConfigServingCell;
            self.step(rrc)
        } else {
            match self.cs_ret {
                CsResult::SameCell => {
                    warn!(proc = Self::NAME, "did not reselect cell but serving cell is out-of-sync")
                }
                CsResult::ChangedCell => {
                    warn!(proc = Self::NAME, "selected a new cell but could not camp on it")
                }
                CsResult::NoCell => {
                    warn!(proc = Self::NAME, "could not find any suitable cell to connect")
                }
            }
            Outcome::Error
        }
    }

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<()>) {
        if result.is_error() {
            warn!(proc = Self::NAME, "could not establish connection, deallocating dedicatedInfoNAS PDU");
            self.dedicated_info_nas = None;
            rrc.dedicated_info_nas = None;
        } else {
            info!(proc = Self::NAME, "finished connection request procedure successfully");
        }
        rrc.nas.connection_request_completed(result.is_success());
    }

    fn output(&mut self) {}
}
