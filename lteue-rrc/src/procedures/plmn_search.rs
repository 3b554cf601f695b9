//! PLMN search procedure
//!
//! Iterates the cell search over all known frequencies, collecting the PLMN
//! identities and tracking area codes advertised in each SIB1, and hands the
//! result to NAS when the PHY reports that no frequencies are left.

use tracing::{info, warn};

use lteue_common::types::FoundPlmn;

use crate::interfaces::{CellSearchOutcome, CellSearchResult, LastFreq};
use crate::proc::{Outcome, ProcFuture, ProcResult, Procedure};
use crate::rrc::Rrc;

/// Upper bound on the number of PLMNs reported to NAS.
pub const MAX_FOUND_PLMNS: usize = 16;

/// Searches all frequencies for PLMNs on behalf of NAS.
#[derive(Default)]
pub struct PlmnSearchProc {
    found_plmns: Vec<FoundPlmn>,
    cell_search_fut: ProcFuture<CellSearchResult>,
}

impl PlmnSearchProc {
    fn collect_serving_cell_plmns(&mut self, rrc: &Rrc) {
        let serving = rrc.cells.serving_cell();
        if !serving.has_sib1() {
            warn!(proc = Self::NAME, "SIB1 not acquired");
            return;
        }
        for i in 0..serving.nof_plmns() {
            let Some(plmn) = serving.plmn(i) else { break };
            if self.found_plmns.len() < MAX_FOUND_PLMNS {
                self.found_plmns.push(FoundPlmn {
                    plmn,
                    tac: serving.tac(),
                });
            } else {
                warn!(proc = Self::NAME, count = self.found_plmns.len(), "no more space for PLMNs");
            }
        }
    }
}

impl Procedure for PlmnSearchProc {
    type Ctx = Rrc;
    type Args = ();
    type Event = ();
    type Output = ();

    const NAME: &'static str = "PLMN Search";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> Outcome {
        info!(proc = Self::NAME, "starting PLMN search");
        self.found_plmns.clear();
        if !rrc.launch_cell_search_fut(&mut self.cell_search_fut) {
            warn!(proc = Self::NAME, "failed to initiate cell search");
            return Outcome::Error;
        }
        self.step(rrc)
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        loop {
            if rrc.run_cell_search() {
                // wait for the next TTI
                return Outcome::Yield;
            }
            let result = self.cell_search_fut.value();
            if self.cell_search_fut.is_error()
                || result.map(|r| r.found == CellSearchOutcome::Error).unwrap_or(true)
            {
                warn!(proc = Self::NAME, "failed due to cell search sub-procedure");
                return Outcome::Error;
            }
            let result = match result {
                Some(r) => r,
                None => return Outcome::Error,
            };

            if result.found == CellSearchOutcome::CellFound {
                self.collect_serving_cell_plmns(rrc);
            }

            if result.last_freq == LastFreq::NoMoreFreqs {
                info!(proc = Self::NAME, plmns = self.found_plmns.len(), "completed PLMN search");
                return Outcome::Success;
            }

            // move on to the next frequency
            if !rrc.launch_cell_search_fut(&mut self.cell_search_fut) {
                warn!(proc = Self::NAME, "failed to initiate cell search");
                return Outcome::Error;
            }
        }
    }

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<()>) {
        if result.is_success() {
            info!(proc = Self::NAME, "completed with success");
            rrc.nas.plmn_search_completed(Some(&self.found_plmns));
        } else {
            warn!(proc = Self::NAME, "PLMN search completed with an error");
            rrc.nas.plmn_search_completed(None);
        }
    }

    fn output(&mut self) {}
}
