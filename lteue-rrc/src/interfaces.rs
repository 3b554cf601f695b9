//! Interfaces towards the neighbouring layers
//!
//! The RRC engine drives PHY, MAC, RLC, PDCP, NAS and the USIM through the
//! narrow trait seams below. All requests are non-blocking; asynchronous
//! results (cell search, cell select, random access) come back through the
//! `Rrc` entry points as engine events on a later subframe.

use std::fmt;

use lteue_common::types::{FoundPlmn, STmsi};

use crate::messages::{
    CipheringAlgorithm, IntegrityAlgorithm, RrConfigCommon, RrConfigDedicated, ScellConfig,
    UlMessage,
};
use crate::tti::Tti;

/// Logical channel id of SRB0 (CCCH).
pub const SRB0: u32 = 0;
/// Logical channel id of SRB1 (DCCH).
pub const SRB1: u32 = 1;
/// Number of radio bearer slots (3 SRB + 8 DRB).
pub const MAX_RADIO_BEARERS: u32 = 11;

/// A physical cell, identified by PCI and carrier frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PhyCell {
    pub pci: u16,
    pub earfcn: u32,
}

impl fmt::Display for PhyCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PCI={}, EARFCN={}", self.pci, self.earfcn)
    }
}

/// Result of a PHY cell search on one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellSearchOutcome {
    CellFound,
    #[default]
    CellNotFound,
    Error,
}

/// Whether the PHY has more frequencies left to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastFreq {
    #[default]
    MoreFreqs,
    NoMoreFreqs,
}

/// Completion event of a PHY cell search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellSearchResult {
    pub found: CellSearchOutcome,
    pub found_cell: PhyCell,
    pub last_freq: LastFreq,
}

/// RNTIs currently held by MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UeRnti {
    pub crnti: u16,
}

/// establishmentCause for RRCConnectionRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstablishmentCause {
    Emergency,
    HighPriorityAccess,
    MtAccess,
    MoSignalling,
    #[default]
    MoData,
}

/// Access barring categories signalled to NAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Barring {
    #[default]
    None,
    MoData,
    MoSignalling,
    All,
}

/// AS security configuration shared with PDCP and derived by the USIM.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    pub cipher_algo: CipheringAlgorithm,
    pub integ_algo: IntegrityAlgorithm,
    pub k_rrc_enc: [u8; 32],
    pub k_rrc_int: [u8; 32],
    pub k_up_enc: [u8; 32],
}

/// PHY layer, consumed.
pub trait PhyInterface {
    /// Request an asynchronous cell search on the next unsearched frequency;
    /// the result arrives via `Rrc::cell_search_complete`.
    fn start_cell_search(&mut self) -> bool;
    /// Request an asynchronous camp on the given cell; the result arrives
    /// via `Rrc::cell_select_complete`.
    fn start_cell_select(&mut self, cell: PhyCell) -> bool;
    fn cell_is_camping(&self) -> bool;
    fn reset(&mut self);
    /// Restore the default physical channel configuration.
    fn set_config_default(&mut self);
    /// Restore the default PUCCH/SRS configuration (TS 36.331 Sec 9.2.4).
    fn set_default_pucch_srs(&mut self);
    fn apply_rr_config_common(&mut self, cfg: &RrConfigCommon);
    fn apply_rr_config_dedicated(&mut self, cfg: &RrConfigDedicated);
    fn apply_scell_config(&mut self, cfg: &ScellConfig);
}

/// MAC layer, consumed.
pub trait MacInterface {
    /// Listen on BCCH from `si_window_start` for `si_window_length`
    /// subframes.
    fn bcch_start_rx(&mut self, si_window_start: Tti, si_window_length: u32);
    fn pcch_start_rx(&mut self);
    fn reset(&mut self);
    /// Block further uplink transmission until RA completes.
    fn wait_uplink(&mut self);
    fn clear_rntis(&mut self);
    fn get_rntis(&self) -> UeRnti;
    fn set_ho_rnti(&mut self, rnti: u16, target_pci: u16);
    fn start_cont_ho(&mut self);
    fn start_noncont_ho(&mut self, preamble_index: u8, prach_mask_index: u8);
    /// Restore the default MAC main configuration (TS 36.331 Sec 9.2.2).
    fn set_config_default(&mut self);
}

/// RLC layer, consumed.
pub trait RlcInterface {
    fn reestablish(&mut self);
    fn has_bearer(&self, lcid: u32) -> bool;
    fn suspend_bearer(&mut self, lcid: u32);
    /// Whether SRB1/SRB2 transmit queues have drained.
    fn srbs_flushed(&self) -> bool;
}

/// PDCP layer, consumed. Uplink RRC messages are handed over as typed
/// values; the ASN.1 encoding happens below this seam.
pub trait PdcpInterface {
    fn reestablish(&mut self);
    fn config_security(&mut self, cfg: &SecurityConfig);
    fn write_ul_message(&mut self, lcid: u32, msg: UlMessage);
}

/// NAS layer, consumed.
pub trait NasInterface {
    /// Report the PLMNs collected by a PLMN search; `None` signals failure.
    fn plmn_search_completed(&mut self, found_plmns: Option<&[FoundPlmn]>);
    /// Start a NAS paging procedure; completion comes back through
    /// `Rrc::paging_completed`.
    fn paging(&mut self, ue_identity: &STmsi) -> bool;
    fn connection_request_completed(&mut self, success: bool);
    fn set_barring(&mut self, barring: Barring);
    fn is_attached(&self) -> bool;
}

/// USIM, consumed for AS key derivation.
pub trait UsimInterface {
    /// Derive the AS keys for handover from the NCC, updating `cfg` in
    /// place (intra-LTE only).
    fn generate_as_keys_ho(&mut self, target_pci: u16, earfcn: u32, ncc: Option<u8>, cfg: &mut SecurityConfig);
}
