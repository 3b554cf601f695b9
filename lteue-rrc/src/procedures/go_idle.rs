//! Go-idle procedure
//!
//! Waits for the SRB transmit queues to flush (bounded by a timer) before
//! leaving RRC_CONNECTED, then hands over to periodic cell reselection when
//! NAS is attached.

use tracing::{debug, info, warn};

use crate::proc::{Outcome, ProcResult, Procedure};
use crate::rrc::{ProcId, Rrc, RrcState};

/// Transitions the UE to RRC_IDLE once RLC has drained.
#[derive(Default)]
pub struct GoIdleProc;

impl Procedure for GoIdleProc {
    type Ctx = Rrc;
    type Args = ();
    type Event = bool;
    type Output = ();

    const NAME: &'static str = "Go Idle";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> Outcome {
        info!(proc = Self::NAME, "starting");
        rrc.timers.set(rrc.timers.rlc_flush, rrc.cfg.rlc_flush_timeout_ms);
        rrc.timers.run(rrc.timers.rlc_flush);
        // defer for one TTI instead of stepping right away
        Outcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        if rrc.state == RrcState::Idle {
            info!(proc = Self::NAME, "interrupting, RRC already became IDLE");
            return Outcome::Success;
        }

        // wait for SRB1/SRB2 to be flushed
        if rrc.rlc.srbs_flushed() {
            rrc.leave_connected();
            info!(proc = Self::NAME, "left connected state");
            Outcome::Success
        } else {
            debug!(
                proc = Self::NAME,
                elapsed_ms = rrc.timers.time_elapsed(rrc.timers.rlc_flush),
                timeout_ms = rrc.cfg.rlc_flush_timeout_ms,
                "postponing transition to RRC IDLE"
            );
            Outcome::Yield
        }
    }

    fn react(&mut self, rrc: &mut Rrc, _flush_timeout: bool) -> Outcome {
        rrc.leave_connected();
        info!(proc = Self::NAME, "left connected state");
        Outcome::Success
    }

    fn then(&mut self, rrc: &mut Rrc, _result: &ProcResult<()>) {
        rrc.timers.stop(rrc.timers.rlc_flush);
        if rrc.nas.is_attached() {
            if !rrc.launch_cell_reselection() {
                warn!(proc = Self::NAME, "failed to initiate a cell reselection procedure");
                return;
            }
            rrc.callback_add(ProcId::CellReselection);
        }
    }

    fn output(&mut self) {}
}
