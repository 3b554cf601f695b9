//! SI message acquisition procedure (TS 36.331 Sec 5.2.3)
//!
//! Schedules BCCH listen windows on MAC for the requested SIB, retries on a
//! per-SIB retry timer and gives up when the overall (non-standard) SIB
//! search timeout expires.

use tracing::{error, info, warn};

use crate::proc::{Outcome, ProcResult, Procedure};
use crate::rrc::Rrc;
use crate::si_window;
use crate::timers::TimerHandle;

/// Hard-coded number of HARQ retransmissions assumed per SI message.
const NOF_SIB_HARQ_RETX: u32 = 5;

/// Events delivered to the SI acquisition procedure.
#[derive(Debug, Clone, Copy)]
pub enum SiAcquireEvent {
    /// Some SIB was received on BCCH.
    SibReceived,
    /// The retry or the overall timeout timer expired.
    TimerExpired(TimerHandle),
}

/// Acquires a single SI message for the serving cell.
#[derive(Default)]
pub struct SiAcquireProc {
    sib_index: u32,
    /// si-Periodicity "T" in frames.
    period: u32,
    /// Order of the SI message in the schedulingInfoList.
    sched_index: u32,
}

impl SiAcquireProc {
    /// Compute the next SI window and instruct MAC to listen on BCCH, then
    /// arm the retry timer past the end of that window.
    fn start_si_acquire(&self, rrc: &mut Rrc) {
        let tti = rrc.tti;
        let window = si_window::si_window(
            tti,
            self.sib_index,
            self.sched_index,
            self.period,
            rrc.cells.serving_cell().sib1(),
        );
        let Some((mut si_win_start, si_win_len)) = window else {
            error!(proc = Self::NAME, "SI window cannot be computed without SIB1");
            return;
        };
        if !si_win_start.is_after(tti) {
            // Window start landed on or behind the current TTI; take the
            // following scheduling period instead of stalling.
            si_win_start = si_win_start + self.period * 10;
        }
        rrc.mac.bcch_start_rx(si_win_start, si_win_len);

        let retry_frames = if self.sib_index == 0 {
            si_window::SIB1_PERIODICITY_FRAMES
        } else {
            self.period * NOF_SIB_HARQ_RETX
        };
        let retry_ms = retry_frames * 10 + si_win_start.diff(tti);
        rrc.timers.set(rrc.timers.si_acq_retry, retry_ms);
        rrc.timers.run(rrc.timers.si_acq_retry);

        info!(
            proc = Self::NAME,
            sib = self.sib_index + 1,
            win_start = si_win_start.to_u32(),
            win_len = si_win_len,
            period = self.period,
            sched_index = self.sched_index,
            "instructed MAC to search for SIB"
        );
    }
}

impl Procedure for SiAcquireProc {
    type Ctx = Rrc;
    type Args = u32;
    type Event = SiAcquireEvent;
    type Output = ();

    const NAME: &'static str = "SI Acquire";

    fn init(&mut self, rrc: &mut Rrc, sib_index: u32) -> Outcome {
        self.sib_index = sib_index;

        // make sure we don't already have the SIB of interest
        if rrc.cells.serving_cell().has_sib(sib_index) {
            info!(proc = Self::NAME, sib = sib_index + 1, "SIB already acquired");
            return Outcome::Success;
        }
        info!(proc = Self::NAME, sib = sib_index + 1, "starting SI acquisition");

        // SIB1 must be captured before any other SIB
        if sib_index > 0 && !rrc.cells.serving_cell().has_sib1() {
            warn!(proc = Self::NAME, sib = sib_index + 1, "SIB1 not received yet");
            return Outcome::Error;
        }

        let scheduling =
            si_window::si_periodicity_and_index(sib_index, rrc.cells.serving_cell().sib1());
        let Some((period, sched_index)) = scheduling else {
            info!(proc = Self::NAME, sib = sib_index + 1, "SIB not scheduled in SIB1");
            return Outcome::Error;
        };
        self.period = period;
        self.sched_index = sched_index;

        self.start_si_acquire(rrc);

        rrc.timers.set(rrc.timers.si_acq_timeout, rrc.cfg.sib_search_timeout_ms);
        rrc.timers.run(rrc.timers.si_acq_timeout);

        Outcome::Yield
    }

    fn react(&mut self, rrc: &mut Rrc, event: SiAcquireEvent) -> Outcome {
        match event {
            SiAcquireEvent::SibReceived => {
                if rrc.cells.serving_cell().has_sib(self.sib_index) {
                    Outcome::Success
                } else {
                    Outcome::Yield
                }
            }
            SiAcquireEvent::TimerExpired(timer) => {
                if rrc.cells.serving_cell().has_sib(self.sib_index) {
                    return Outcome::Success;
                }
                if timer == rrc.timers.si_acq_retry {
                    info!(proc = Self::NAME, sib = self.sib_index + 1, "SI acquire retry");
                    self.start_si_acquire(rrc);
                    return Outcome::Yield;
                }
                if timer == rrc.timers.si_acq_timeout {
                    error!(proc = Self::NAME, sib = self.sib_index + 1, "timeout while acquiring SIB");
                } else {
                    error!(proc = Self::NAME, "unrecognized timer id");
                }
                Outcome::Error
            }
        }
    }

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<()>) {
        // make sure timers are stopped
        rrc.timers.stop(rrc.timers.si_acq_retry);
        rrc.timers.stop(rrc.timers.si_acq_timeout);

        if result.is_success() {
            info!(proc = Self::NAME, sib = self.sib_index + 1, "SIB acquired successfully");
        } else {
            error!(proc = Self::NAME, sib = self.sib_index + 1, "failed to acquire SIB");
        }
    }

    fn output(&mut self) {}
}
