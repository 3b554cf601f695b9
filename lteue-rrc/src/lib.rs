//! RRC (Radio Resource Control) procedure engine for an LTE UE
//!
//! This crate implements the coordination core that drives a UE between the
//! IDLE and CONNECTED states: cell search, SIB acquisition, cell selection
//! and reselection, RRC connection establishment and re-establishment,
//! paging and handover, per 3GPP TS 36.331 and TS 36.304.
//!
//! # Architecture
//!
//! The engine is strictly single-threaded and cooperative. An outer stack
//! loop calls [`rrc::Rrc::run_tti`] once per subframe (1 ms); asynchronous
//! results from PHY/MAC and decoded downlink messages are pushed in through
//! the `Rrc` entry points and delivered to the owning procedure as events.
//! Long-running protocol procedures are explicit state machines multiplexed
//! by the generic runner in [`proc`]; procedures compose by launching each
//! other and polling one-shot futures.
//!
//! # Modules
//!
//! - `proc` - generic procedure runner: outcomes, futures, launch/run/trigger
//! - `procedures` - the RRC procedures (cell search, SI acquire, ...)
//! - `rrc` - the UE-level RRC state and task-loop entry points
//! - `cells` - store of measured cells and the serving-cell designation
//! - `si_window` - SI scheduling arithmetic (TS 36.331 Sec 5.2.3)
//! - `timers` - millisecond timer service (T300, T301, T304, T310, T311)
//! - `tti` - wrap-aware TTI arithmetic modulo 10240
//! - `messages` - simplified RRC message model (codec is external)
//! - `interfaces` - PHY/MAC/RLC/PDCP/NAS/USIM seams

pub mod cells;
pub mod interfaces;
pub mod messages;
pub mod phy_ctrl;
pub mod proc;
pub mod procedures;
pub mod rrc;
pub mod si_window;
pub mod timers;
pub mod tti;

pub use cells::{CellStore, MeasCell};
pub use interfaces::{
    CellSearchOutcome, CellSearchResult, EstablishmentCause, LastFreq, PhyCell, SecurityConfig,
};
pub use proc::{Outcome, ProcFuture, ProcResult};
pub use procedures::cell_selection::CsResult;
pub use rrc::{Rrc, RrcState};
pub use tti::Tti;
