//! PCCH paging procedure
//!
//! Walks the paging record list, dispatching to NAS the records whose
//! S-TMSI matches the stored UE identity, and refreshes the serving cell
//! system information when the message carries systemInfoModification.

use tracing::{info, warn};

use crate::proc::{Outcome, ProcFuture, Procedure};
use crate::messages::Paging;
use crate::rrc::{Rrc, RrcState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    NextRecord,
    NasPaging,
    ServCellCfg,
}

/// Processes one received PCCH Paging message.
#[derive(Default)]
pub struct ProcessPcchProc {
    paging: Paging,
    paging_idx: usize,
    state: State,
    serv_cfg_fut: ProcFuture<()>,
}

impl Procedure for ProcessPcchProc {
    type Ctx = Rrc;
    type Args = Paging;
    type Event = bool;
    type Output = ();

    const NAME: &'static str = "Process PCCH";

    fn init(&mut self, rrc: &mut Rrc, paging: Paging) -> Outcome {
        self.paging = paging;
        self.paging_idx = 0;
        self.state = State::NextRecord;
        info!(proc = Self::NAME, records = self.paging.paging_record_list.len(), "starting");
        self.step(rrc)
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        match self.state {
            State::NextRecord => {
                while let Some(record) = self.paging_record_list_get(self.paging_idx) {
                    let paged = record.ue_identity;
                    info!(
                        proc = Self::NAME,
                        record = self.paging_idx + 1,
                        records = self.paging.paging_record_list.len(),
                        identity = %paged,
                        "received paging"
                    );
                    if rrc.ue_identity == Some(paged) {
                        if rrc.state == RrcState::Idle {
                            info!(proc = Self::NAME, "S-TMSI match in paging message");
                            if !rrc.nas.paging(&paged) {
                                warn!(proc = Self::NAME, "unable to start NAS paging procedure");
                                return Outcome::Error;
                            }
                            self.state = State::NasPaging;
                            return Outcome::Yield;
                        }
                        warn!(proc = Self::NAME, "received paging while in CONNECTED");
                    } else {
                        info!(proc = Self::NAME, "received paging for unknown identity");
                    }
                    self.paging_idx += 1;
                }

                if self.paging.system_info_modification {
                    info!(proc = Self::NAME, "received system information modification notification");
                    // invalidate and re-acquire all SIBs of the serving cell
                    rrc.cells.serving_cell_mut().reset_sibs();

                    let required = rrc.ue_required_sibs.clone();
                    if !rrc.launch_serv_cell_cfg_fut(&mut self.serv_cfg_fut, required) {
                        warn!(proc = Self::NAME, "failed to initiate serving cell configuration");
                        return Outcome::Error;
                    }
                    self.state = State::ServCellCfg;
                    self.step(rrc)
                } else {
                    info!(proc = Self::NAME, "completed successfully");
                    Outcome::Success
                }
            }
            // wait for the NAS paging trigger
            State::NasPaging => Outcome::Yield,
            State::ServCellCfg => {
                if rrc.run_serv_cell_cfg() {
                    return Outcome::Yield;
                }
                if self.serv_cfg_fut.is_success() {
                    info!(proc = Self::NAME, "all SIBs of serving cell obtained successfully");
                    Outcome::Success
                } else {
                    warn!(proc = Self::NAME, "error while obtaining SIBs of serving cell");
                    Outcome::Error
                }
            }
        }
    }

    fn react(&mut self, rrc: &mut Rrc, nas_paging_ok: bool) -> Outcome {
        if self.state != State::NasPaging {
            warn!(proc = Self::NAME, "received an unexpected paging complete");
            return Outcome::Yield;
        }
        if !nas_paging_ok {
            info!(proc = Self::NAME, "NAS paging has failed");
            return Outcome::Error;
        }
        self.paging_idx += 1;
        self.state = State::NextRecord;
        info!(proc = Self::NAME, "received paging complete event");
        self.step(rrc)
    }

    fn output(&mut self) {}
}

impl ProcessPcchProc {
    fn paging_record_list_get(&self, idx: usize) -> Option<&crate::messages::PagingRecord> {
        self.paging.paging_record_list.get(idx)
    }
}
