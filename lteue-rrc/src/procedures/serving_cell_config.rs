//! Serving cell configuration procedure
//!
//! Walks the ordered list of SIBs the UE requires on its serving cell,
//! acquiring the missing ones and dispatching the handler of the ones
//! already present. Failures on SIB1/SIB2 are fatal; SIB3 and above are
//! skipped on failure, and SIBs not scheduled in SIB1 are skipped silently.

use tracing::{info, warn};

use crate::proc::{Outcome, ProcFuture, Procedure};
use crate::rrc::Rrc;

/// Acquires or applies the list of SIBs required for the serving cell.
#[derive(Default)]
pub struct ServingCellConfigProc {
    required_sibs: Vec<u32>,
    req_idx: usize,
    si_acquire_fut: ProcFuture<()>,
}

impl ServingCellConfigProc {
    /// Advance through the required list: obtain the next missing SIB or
    /// apply the ones already present.
    fn launch_sib_acquire(&mut self, rrc: &mut Rrc) -> Outcome {
        while let Some(&required_sib) = self.required_sibs.get(self.req_idx) {
            if !rrc.cells.serving_cell().has_sib(required_sib) {
                if required_sib < 2 || rrc.cells.serving_cell().is_sib_scheduled(required_sib) {
                    info!(proc = Self::NAME, sib = required_sib + 1, "cell has no SIB, obtaining it");
                    if !rrc.launch_si_acquire(&mut self.si_acquire_fut, required_sib) {
                        warn!(proc = Self::NAME, "SI acquire is already running");
                        return Outcome::Error;
                    }
                    // wait for SI acquire to finish
                    return Outcome::Yield;
                }
                // SIB not scheduled in the schedulingInfoList, skip it
            } else {
                info!(proc = Self::NAME, sib = required_sib + 1, "cell has SIB");
                match required_sib {
                    1 => rrc.handle_sib2(),
                    12 => rrc.handle_sib13(),
                    _ => {}
                }
            }
            self.req_idx += 1;
        }

        info!(proc = Self::NAME, "serving cell configuration finished successfully");
        Outcome::Success
    }
}

impl Procedure for ServingCellConfigProc {
    type Ctx = Rrc;
    type Args = Vec<u32>;
    type Event = ();
    type Output = ();

    const NAME: &'static str = "Serving Cell Configuration";

    fn init(&mut self, rrc: &mut Rrc, required_sibs: Vec<u32>) -> Outcome {
        self.required_sibs = required_sibs;

        info!(proc = Self::NAME, "starting");

        if !rrc.phy.cell_is_camping() {
            warn!(proc = Self::NAME, "trying to configure cell while not camping on it");
            return Outcome::Error;
        }

        rrc.cells.serving_cell_mut().has_mcch = false;

        self.req_idx = 0;
        self.launch_sib_acquire(rrc)
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        if !self.si_acquire_fut.is_complete() {
            return Outcome::Yield;
        }
        let Some(&required_sib) = self.required_sibs.get(self.req_idx) else {
            return Outcome::Success;
        };
        if self.si_acquire_fut.is_error() || !rrc.cells.serving_cell().has_sib(required_sib) {
            if required_sib < 2 {
                warn!(proc = Self::NAME, sib = required_sib + 1, "serving cell configuration failed");
                return Outcome::Error;
            }
        }
        // continue with the remaining SIBs
        self.req_idx += 1;
        self.launch_sib_acquire(rrc)
    }

    fn output(&mut self) {}
}
