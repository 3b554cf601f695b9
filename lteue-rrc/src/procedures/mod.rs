//! RRC procedures
//!
//! This module contains the UE RRC procedures defined in 3GPP TS 36.331 and
//! TS 36.304, each implemented as an explicit state machine driven by the
//! generic runner in [`crate::proc`].

pub mod cell_search;
pub mod cell_selection;
pub mod connection_request;
pub mod go_idle;
pub mod handover;
pub mod pcch;
pub mod plmn_search;
pub mod reestablishment;
pub mod serving_cell_config;
pub mod si_acquire;

pub use cell_search::{CellSearchEvent, CellSearchProc};
pub use cell_selection::{CellReselectionProc, CellSelectionProc, CsResult};
pub use connection_request::ConnectionRequestProc;
pub use go_idle::GoIdleProc;
pub use handover::{HoEvent, HoProc};
pub use pcch::ProcessPcchProc;
pub use plmn_search::PlmnSearchProc;
pub use reestablishment::ConnectionReestProc;
pub use serving_cell_config::ServingCellConfigProc;
pub use si_acquire::{SiAcquireEvent, SiAcquireProc};
