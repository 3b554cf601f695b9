//! Cell selection and reselection procedures (TS 36.304 Sec 5.2)
//!
//! Cell selection walks the serving cell and the known neighbours in order,
//! camping on the strongest candidate that meets the S criterion, and falls
//! back to a fresh cell search when every candidate fails. Cell reselection
//! runs the selection procedure, starts PCCH reception after a cell change
//! in IDLE, and re-schedules itself periodically while the UE is idle and
//! attached.

use tracing::{debug, info, warn};

use crate::interfaces::{CellSearchOutcome, CellSearchResult};
use crate::phy_ctrl::SelectObserver;
use crate::proc::{Outcome, ProcFuture, ProcResult, Procedure};
use crate::rrc::{ProcEvent, Rrc, RrcState};

/// Result of a cell selection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsResult {
    /// Still camping on the same cell.
    SameCell,
    /// Camped on a different cell.
    ChangedCell,
    /// No suitable cell found.
    #[default]
    NoCell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    CellSelection,
    ServCellCamp,
    CellConfig,
    CellSearch,
}

/// Selects the best cell to camp on among the known cells, searching for
/// new ones when none qualifies.
#[derive(Default)]
pub struct CellSelectionProc {
    state: State,
    neigh_index: usize,
    cs_result: CsResult,
    discard_serving: bool,
    serv_cell_select_attempted: bool,
    cell_search_fut: ProcFuture<CellSearchResult>,
    serv_cell_cfg_fut: ProcFuture<()>,
}

impl CellSelectionProc {
    fn start_serv_cell_selection(&mut self, rrc: &mut Rrc) -> Outcome {
        if rrc.phy_ctrl.is_in_sync() && rrc.phy.cell_is_camping() {
            self.cs_result = CsResult::SameCell;
            return Outcome::Success;
        }

        info!(
            proc = Self::NAME,
            cell = %rrc.cells.serving_cell(),
            "not camping on serving cell, selecting it"
        );

        self.state = State::ServCellCamp;
        let serving = rrc.cells.serving_cell().phy_cell;
        if !rrc.start_phy_cell_select(serving, SelectObserver::CellSelection) {
            warn!(proc = Self::NAME, "failed to launch PHY cell selection");
            return Outcome::Error;
        }
        self.serv_cell_select_attempted = true;
        Outcome::Yield
    }

    /// Try the serving cell first, then each known neighbour meeting the S
    /// criterion, and finally fall back to a new cell search.
    fn start_cell_selection(&mut self, rrc: &mut Rrc) -> Outcome {
        let serving_rsrp = rrc.cells.serving_cell().rsrp();
        if !self.serv_cell_select_attempted && rrc.cell_selection_criteria(serving_rsrp) {
            return self.start_serv_cell_selection(rrc);
        }

        while let Some(neighbour) = rrc.cells.neighbour(self.neigh_index) {
            let rsrp = neighbour.rsrp();
            let phy_cell = neighbour.phy_cell;
            if rrc.cell_selection_criteria(rsrp) {
                rrc.set_serving_cell(phy_cell, self.discard_serving);
                self.discard_serving = false;
                info!(proc = Self::NAME, cell = %rrc.cells.serving_cell(), "selected cell");

                self.state = State::CellSelection;
                if !rrc.start_phy_cell_select(phy_cell, SelectObserver::CellSelection) {
                    warn!(proc = Self::NAME, "failed to launch PHY cell selection");
                    return Outcome::Error;
                }
                return Outcome::Yield;
            }
            self.neigh_index += 1;
        }

        // No known cell qualified or could be selected; search again.
        info!(proc = Self::NAME, "could not select any known cell, searching new cells");
        if !rrc.launch_cell_search_fut(&mut self.cell_search_fut) {
            return Outcome::Error;
        }
        self.state = State::CellSearch;
        self.step_cell_search(rrc)
    }

    fn step_cell_selection(&mut self, rrc: &mut Rrc, cs_ret: bool) -> Outcome {
        if cs_ret {
            let rsrp = rrc.cells.serving_cell().rsrp();
            if rrc.cell_selection_criteria(rsrp) {
                info!(proc = Self::NAME, "PHY is in sync and cell selection passed");
                let required = rrc.ue_required_sibs.clone();
                if !rrc.launch_serv_cell_cfg_fut(&mut self.serv_cell_cfg_fut, required) {
                    return Outcome::Error;
                }
                self.state = State::CellConfig;
                return Outcome::Yield;
            }
            info!(proc = Self::NAME, "PHY is in sync but cell selection did not pass, back to select step");
            self.cs_result = CsResult::NoCell;
        } else {
            warn!(proc = Self::NAME, "could not camp on serving cell");
        }

        rrc.cells.serving_cell_mut().set_rsrp(f32::NEG_INFINITY);
        self.discard_serving = true;
        self.neigh_index += 1;
        self.start_cell_selection(rrc)
    }

    fn step_serv_cell_camp(&mut self, rrc: &mut Rrc, cs_ret: bool) -> Outcome {
        if cs_ret {
            info!(proc = Self::NAME, "selected serving cell OK");
            self.cs_result = CsResult::SameCell;
            return Outcome::Success;
        }

        rrc.cells.serving_cell_mut().set_rsrp(f32::NEG_INFINITY);
        warn!(proc = Self::NAME, "could not camp on serving cell");
        self.start_cell_selection(rrc)
    }

    fn step_cell_search(&mut self, rrc: &mut Rrc) -> Outcome {
        if rrc.run_cell_search() {
            return Outcome::Yield;
        }
        if self.cell_search_fut.is_error() {
            self.cs_result = CsResult::NoCell;
            return Outcome::Error;
        }
        let found = self
            .cell_search_fut
            .value()
            .map(|r| r.found == CellSearchOutcome::CellFound)
            .unwrap_or(false);
        self.cs_result = if found { CsResult::ChangedCell } else { CsResult::NoCell };
        info!(proc = Self::NAME, "cell search of cell selection ran successfully");
        Outcome::Success
    }

    fn step_cell_config(&mut self, rrc: &mut Rrc) -> Outcome {
        if rrc.run_serv_cell_cfg() {
            return Outcome::Yield;
        }
        if self.serv_cell_cfg_fut.is_success() {
            info!(proc = Self::NAME, cell = %rrc.cells.serving_cell(), "all SIBs of serving cell obtained");
            self.cs_result = CsResult::ChangedCell;
            return Outcome::Success;
        }
        warn!(proc = Self::NAME, "error while configuring serving cell");
        // resume cell selection with the next neighbour
        self.neigh_index += 1;
        self.start_cell_selection(rrc)
    }
}

impl Procedure for CellSelectionProc {
    type Ctx = Rrc;
    type Args = ();
    type Event = bool;
    type Output = CsResult;

    const NAME: &'static str = "Cell Selection";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> Outcome {
        if rrc.cells.nof_neighbours() == 0 && rrc.phy_ctrl.is_in_sync() && rrc.phy.cell_is_camping()
        {
            // no neighbours and already camping: nothing to select
            debug!(proc = Self::NAME, "skipping, no neighbours and cell is camping");
            self.cs_result = CsResult::SameCell;
            return Outcome::Success;
        }

        info!(proc = Self::NAME, "starting");
        let phy_state = if rrc.phy_ctrl.is_in_sync() { "in-sync" } else { "out-of-sync" };
        info!(
            proc = Self::NAME,
            neighbours = %rrc.cells.print_neighbour_cells(),
            phy_state,
            serving = %rrc.cells.serving_cell(),
            "current cells"
        );
        if rrc.cells.serving_cell().has_sib3() {
            info!(
                proc = Self::NAME,
                q_rx_lev_min = rrc.cell_resel_cfg.q_rx_lev_min,
                q_rx_lev_min_offset = rrc.cell_resel_cfg.q_rx_lev_min_offset,
                "cell selection criteria"
            );
        } else {
            info!(proc = Self::NAME, "cell selection criteria not available");
        }

        self.neigh_index = 0;
        self.cs_result = CsResult::NoCell;
        self.state = State::CellSelection;
        self.discard_serving = false;
        self.serv_cell_select_attempted = false;
        self.start_cell_selection(rrc)
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        match self.state {
            // these states wait for the PHY cell select event
            State::CellSelection | State::ServCellCamp => Outcome::Yield,
            State::CellConfig => self.step_cell_config(rrc),
            State::CellSearch => self.step_cell_search(rrc),
        }
    }

    fn react(&mut self, rrc: &mut Rrc, cs_ret: bool) -> Outcome {
        match self.state {
            State::CellSelection => self.step_cell_selection(rrc, cs_ret),
            State::ServCellCamp => self.step_serv_cell_camp(rrc, cs_ret),
            _ => {
                warn!(proc = Self::NAME, "unexpected cell selection event received");
                Outcome::Yield
            }
        }
    }

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<CsResult>) {
        // inform the connection request procedure
        info!(
            proc = Self::NAME,
            success = result.is_success(),
            "completed, informing connection request procedure"
        );
        rrc.defer(ProcEvent::CellSelectionComplete(result.clone()));
    }

    fn output(&mut self) -> CsResult {
        self.cs_result
    }
}

// ============================================================================
// Cell reselection
// ============================================================================

/// Runs cell selection and handles its result, re-scheduling itself on a
/// periodic timer while the UE stays idle and attached.
#[derive(Default)]
pub struct CellReselectionProc {
    cell_selection_fut: ProcFuture<CsResult>,
}

impl Procedure for CellReselectionProc {
    type Ctx = Rrc;
    type Args = ();
    type Event = ();
    type Output = ();

    const NAME: &'static str = "Cell Reselection";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> Outcome {
        if rrc.cells.nof_neighbours() == 0 && rrc.phy_ctrl.is_in_sync() && rrc.phy.cell_is_camping()
        {
            // no neighbours and already camping: nothing to reselect
            return Outcome::Success;
        }

        info!(proc = Self::NAME, "starting");
        if !rrc.launch_cell_selection_fut(&mut self.cell_selection_fut) {
            warn!(proc = Self::NAME, "failed to initiate a cell selection procedure");
            return Outcome::Error;
        }

        Outcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        if rrc.run_cell_selection() {
            return Outcome::Yield;
        }
        if self.cell_selection_fut.is_error() {
            warn!(proc = Self::NAME, "error while selecting a cell");
            return Outcome::Error;
        }

        info!(proc = Self::NAME, "cell selection completed, handling its result");
        match self.cell_selection_fut.value().unwrap_or(CsResult::NoCell) {
            CsResult::ChangedCell => {
                if rrc.state == RrcState::Idle {
                    info!(proc = Self::NAME, "new cell selected, start receiving PCCH");
                    rrc.mac.pcch_start_rx();
                }
            }
            CsResult::NoCell => {
                warn!(proc = Self::NAME, "could not find any cell to camp on");
            }
            CsResult::SameCell => {
                if !rrc.phy.cell_is_camping() {
                    warn!(proc = Self::NAME, "did not reselect cell but serving cell is out-of-sync");
                }
            }
        }
        info!(proc = Self::NAME, "finished successfully");
        Outcome::Success
    }

    fn then(&mut self, rrc: &mut Rrc, _result: &ProcResult<()>) {
        // keep reselecting periodically while camped and attached
        if rrc.state != RrcState::Connected && rrc.nas.is_attached() {
            rrc.timers.set(
                rrc.timers.reselection,
                rrc.cfg.cell_reselection_periodicity_ms,
            );
            rrc.timers.run(rrc.timers.reselection);
        }
    }

    fn output(&mut self) {}
}
