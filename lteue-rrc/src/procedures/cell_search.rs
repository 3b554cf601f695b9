//! Cell search procedure
//!
//! Searches for a cell on the current frequency, camps on it and retrieves
//! SIB1 if not already known. The PHY cell search and cell select results
//! arrive as events; the measurement wait is polled each tick.

use tracing::{info, warn};

use crate::interfaces::{CellSearchOutcome, CellSearchResult, PhyCell};
use crate::phy_ctrl::SelectObserver;
use crate::proc::{Outcome, ProcFuture, Procedure};
use crate::rrc::Rrc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    PhyCellSearch,
    PhyCellSelect,
    WaitMeasurement,
    SiAcquire,
}

/// Events delivered to the cell search procedure.
#[derive(Debug, Clone, Copy)]
pub enum CellSearchEvent {
    /// PHY cell search completed.
    SearchResult(CellSearchResult),
    /// PHY cell select completed.
    SelectResult(bool),
}

/// Drives PHY cell search, camping and SIB1 acquisition on one frequency.
#[derive(Default)]
pub struct CellSearchProc {
    state: State,
    search_result: CellSearchResult,
    si_acquire_fut: ProcFuture<()>,
}

impl CellSearchProc {
    fn handle_cell_found(&mut self, rrc: &mut Rrc, new_cell: PhyCell) -> Outcome {
        info!(proc = Self::NAME, cell = %new_cell, "cell found in this frequency, setting new serving cell");

        // Created with NaN RSRP; updated by new_phy_meas during SIB search.
        rrc.cells.add_meas_cell(new_cell);
        rrc.set_serving_cell(new_cell, false);

        self.state = State::PhyCellSelect;
        if !rrc.start_phy_cell_select(new_cell, SelectObserver::CellSearch) {
            warn!(proc = Self::NAME, "could not start PHY cell selection");
            return Outcome::Error;
        }
        Outcome::Yield
    }

    fn step_wait_measurement(&mut self, rrc: &mut Rrc) -> Outcome {
        if !rrc.cells.serving_cell().has_valid_rsrp() {
            return Outcome::Yield;
        }

        if rrc.cells.serving_cell().has_sib1() {
            info!(proc = Self::NAME, "cell has SIB1");
            return Outcome::Success;
        }

        info!(proc = Self::NAME, "cell has no SIB1, obtaining SIB1");
        if !rrc.launch_si_acquire(&mut self.si_acquire_fut, 0) {
            // disallow concurrent SI acquire
            warn!(proc = Self::NAME, "SI acquire is already running");
            return Outcome::Error;
        }
        self.state = State::SiAcquire;
        self.step_si_acquire()
    }

    fn step_si_acquire(&mut self) -> Outcome {
        if !self.si_acquire_fut.is_complete() {
            return Outcome::Yield;
        }
        if self.si_acquire_fut.is_error() {
            warn!(proc = Self::NAME, "failed to acquire SIB1");
            return Outcome::Error;
        }
        info!(proc = Self::NAME, "completed successfully");
        Outcome::Success
    }
}

impl Procedure for CellSearchProc {
    type Ctx = Rrc;
    type Args = ();
    type Event = CellSearchEvent;
    type Output = CellSearchResult;

    const NAME: &'static str = "Cell Search";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> Outcome {
        info!(proc = Self::NAME, "starting");
        self.state = State::PhyCellSearch;
        self.search_result = CellSearchResult::default();
        if !rrc.start_phy_cell_search() {
            warn!(proc = Self::NAME, "failed to initiate cell search");
            return Outcome::Error;
        }
        Outcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        match self.state {
            // waiting for the PHY cell search/select events
            State::PhyCellSearch | State::PhyCellSelect => Outcome::Yield,
            State::WaitMeasurement => self.step_wait_measurement(rrc),
            State::SiAcquire => self.step_si_acquire(),
        }
    }

    fn react(&mut self, rrc: &mut Rrc, event: CellSearchEvent) -> Outcome {
        match event {
            CellSearchEvent::SearchResult(result) => {
                if self.state != State::PhyCellSearch {
                    warn!(proc = Self::NAME, "unexpected cell search result");
                    return Outcome::Error;
                }
                self.search_result = result;
                match result.found {
                    CellSearchOutcome::CellFound => self.handle_cell_found(rrc, result.found_cell),
                    CellSearchOutcome::CellNotFound => {
                        // no cell found on this frequency, nothing to do
                        Outcome::Success
                    }
                    CellSearchOutcome::Error => Outcome::Error,
                }
            }
            CellSearchEvent::SelectResult(selected) => {
                if self.state != State::PhyCellSelect {
                    warn!(proc = Self::NAME, "unexpected cell select result");
                    return Outcome::Yield;
                }
                if !selected {
                    warn!(proc = Self::NAME, "could not select new serving cell");
                    return Outcome::Error;
                }
                if !rrc.phy.cell_is_camping() {
                    warn!(proc = Self::NAME, "could not camp on found cell");
                    return Outcome::Error;
                }
                if !rrc.cells.serving_cell().has_valid_rsrp() {
                    info!(proc = Self::NAME, "no valid measurement for the serving cell yet, waiting");
                }
                self.state = State::WaitMeasurement;
                Outcome::Yield
            }
        }
    }

    fn output(&mut self) -> CellSearchResult {
        self.search_result
    }
}
