//! Store of measured cells
//!
//! The UE keeps one serving cell plus an ordered list of measured
//! neighbours. A cell's RSRP stays NaN until the first measurement arrives;
//! `has_valid_rsrp` uses `is_normal` semantics so NaN, infinities and
//! denormals all read as "not yet measured". Possession of a SIB is distinct
//! from that SIB being scheduled in SIB1: SIB3 and above may legitimately be
//! absent from the schedulingInfoList.

use std::fmt;

use tracing::{debug, warn};

use lteue_common::types::Plmn;

use crate::interfaces::PhyCell;
use crate::messages::{Sib1, Sib13, Sib2, Sib3, SystemInformation};
use crate::si_window;

/// Maximum number of neighbour cells kept in the store.
pub const MAX_NEIGHBOUR_CELLS: usize = 8;

/// One observed cell with its measurements and system information.
#[derive(Debug, Clone, Default)]
pub struct MeasCell {
    pub phy_cell: PhyCell,
    rsrp_dbm: f32,
    sib1: Option<Sib1>,
    sib2: Option<Sib2>,
    sib3: Option<Sib3>,
    sib13: Option<Sib13>,
    pub has_mcch: bool,
}

impl MeasCell {
    /// Create a cell with no measurement yet (RSRP = NaN).
    pub fn new(phy_cell: PhyCell) -> Self {
        Self {
            phy_cell,
            rsrp_dbm: f32::NAN,
            ..Self::default()
        }
    }

    pub fn pci(&self) -> u16 {
        self.phy_cell.pci
    }

    pub fn earfcn(&self) -> u32 {
        self.phy_cell.earfcn
    }

    pub fn rsrp(&self) -> f32 {
        self.rsrp_dbm
    }

    pub fn set_rsrp(&mut self, rsrp_dbm: f32) {
        self.rsrp_dbm = rsrp_dbm;
    }

    /// Whether a real measurement has arrived for this cell.
    pub fn has_valid_rsrp(&self) -> bool {
        self.rsrp_dbm.is_normal()
    }

    pub fn has_sib(&self, sib_index: u32) -> bool {
        match sib_index {
            0 => self.sib1.is_some(),
            1 => self.sib2.is_some(),
            2 => self.sib3.is_some(),
            12 => self.sib13.is_some(),
            _ => false,
        }
    }

    pub fn has_sib1(&self) -> bool {
        self.sib1.is_some()
    }

    pub fn has_sib2(&self) -> bool {
        self.sib2.is_some()
    }

    pub fn has_sib3(&self) -> bool {
        self.sib3.is_some()
    }

    pub fn sib1(&self) -> Option<&Sib1> {
        self.sib1.as_ref()
    }

    pub fn sib2(&self) -> Option<&Sib2> {
        self.sib2.as_ref()
    }

    pub fn sib3(&self) -> Option<&Sib3> {
        self.sib3.as_ref()
    }

    pub fn sib13(&self) -> Option<&Sib13> {
        self.sib13.as_ref()
    }

    /// Store a received SIB.
    pub fn set_sib(&mut self, sib: SystemInformation) {
        match sib {
            SystemInformation::Sib1(s) => self.sib1 = Some(s),
            SystemInformation::Sib2(s) => self.sib2 = Some(s),
            SystemInformation::Sib3(s) => self.sib3 = Some(s),
            SystemInformation::Sib13(s) => self.sib13 = Some(s),
        }
    }

    /// Whether the SIB appears in SIB1's schedulingInfoList. SIB1 and SIB2
    /// are always scheduled once SIB1 is known.
    pub fn is_sib_scheduled(&self, sib_index: u32) -> bool {
        si_window::si_periodicity_and_index(sib_index, self.sib1.as_ref()).is_some()
    }

    /// Invalidate all stored SIBs (e.g. on systemInfoModification).
    pub fn reset_sibs(&mut self) {
        self.sib1 = None;
        self.sib2 = None;
        self.sib3 = None;
        self.sib13 = None;
        self.has_mcch = false;
    }

    pub fn nof_plmns(&self) -> usize {
        self.sib1.as_ref().map_or(0, |s| s.plmn_list.len())
    }

    pub fn plmn(&self, idx: usize) -> Option<Plmn> {
        self.sib1.as_ref().and_then(|s| s.plmn_list.get(idx).copied())
    }

    pub fn tac(&self) -> u16 {
        self.sib1.as_ref().map_or(0, |s| s.tac)
    }
}

impl fmt::Display for MeasCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, RSRP={:.1} dBm", self.phy_cell, self.rsrp_dbm)
    }
}

/// The serving cell plus the ordered neighbour list.
#[derive(Debug, Default)]
pub struct CellStore {
    serving: MeasCell,
    neighbours: Vec<MeasCell>,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving_cell(&self) -> &MeasCell {
        &self.serving
    }

    pub fn serving_cell_mut(&mut self) -> &mut MeasCell {
        &mut self.serving
    }

    pub fn nof_neighbours(&self) -> usize {
        self.neighbours.len()
    }

    pub fn neighbour(&self, idx: usize) -> Option<&MeasCell> {
        self.neighbours.get(idx)
    }

    pub fn neighbour_mut(&mut self, idx: usize) -> Option<&mut MeasCell> {
        self.neighbours.get_mut(idx)
    }

    pub fn has_neighbour_cell(&self, earfcn: u32, pci: u16) -> bool {
        self.neighbour_by_cell(earfcn, pci).is_some()
    }

    pub fn neighbour_by_cell(&self, earfcn: u32, pci: u16) -> Option<&MeasCell> {
        self.neighbours
            .iter()
            .find(|c| c.earfcn() == earfcn && c.pci() == pci)
    }

    pub fn neighbour_by_cell_mut(&mut self, earfcn: u32, pci: u16) -> Option<&mut MeasCell> {
        self.neighbours
            .iter_mut()
            .find(|c| c.earfcn() == earfcn && c.pci() == pci)
    }

    /// Add a newly found cell as a neighbour with no measurement yet.
    ///
    /// Rejects duplicates of the serving cell or an existing neighbour, and
    /// fails when the neighbour list is full.
    pub fn add_meas_cell(&mut self, phy_cell: PhyCell) -> bool {
        if self.serving.phy_cell == phy_cell || self.has_neighbour_cell(phy_cell.earfcn, phy_cell.pci)
        {
            debug!(%phy_cell, "cell already known");
            return false;
        }
        if self.neighbours.len() >= MAX_NEIGHBOUR_CELLS {
            warn!(%phy_cell, "neighbour list full, dropping cell");
            return false;
        }
        self.neighbours.push(MeasCell::new(phy_cell));
        true
    }

    /// Designate `phy_cell` as the serving cell, promoting a known neighbour
    /// or creating a fresh entry. The previous serving cell is pushed to the
    /// neighbour list unless `discard` is set.
    pub fn set_serving_cell(&mut self, phy_cell: PhyCell, discard_serving: bool) {
        let new_serving = if let Some(idx) = self
            .neighbours
            .iter()
            .position(|c| c.phy_cell == phy_cell)
        {
            self.neighbours.remove(idx)
        } else {
            MeasCell::new(phy_cell)
        };
        let old_serving = std::mem::replace(&mut self.serving, new_serving);
        if !discard_serving && old_serving.phy_cell != PhyCell::default() {
            if self.neighbours.len() < MAX_NEIGHBOUR_CELLS {
                self.neighbours.push(old_serving);
            } else {
                warn!(cell = %old_serving, "neighbour list full, dropping previous serving cell");
            }
        }
    }

    /// Apply a new PHY measurement to the matching cell, if known.
    pub fn new_phy_meas(&mut self, pci: u16, earfcn: u32, rsrp_dbm: f32) {
        if self.serving.pci() == pci && self.serving.earfcn() == earfcn {
            self.serving.set_rsrp(rsrp_dbm);
        } else if let Some(cell) = self.neighbour_by_cell_mut(earfcn, pci) {
            cell.set_rsrp(rsrp_dbm);
        } else {
            debug!(pci, earfcn, rsrp_dbm, "measurement for unknown cell");
        }
    }

    /// One-line summary of the neighbour list for logging.
    pub fn print_neighbour_cells(&self) -> String {
        self.neighbours
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
