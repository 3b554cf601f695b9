//! PHY controller facade
//!
//! Wraps the raw PHY interface with the bookkeeping the procedures need:
//! which procedure subscribed to the in-flight cell search or cell select,
//! and whether the PHY currently reports in-sync. Completion events arriving
//! at the `Rrc` entry points are routed back to the recorded subscriber.

use tracing::{debug, warn};

use crate::interfaces::{PhyCell, PhyInterface};

/// Procedure that requested the in-flight PHY cell select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectObserver {
    CellSearch,
    CellSelection,
    Handover,
}

/// Tracks the PHY request state on behalf of the procedures.
#[derive(Debug, Default)]
pub struct PhyController {
    in_sync: bool,
    search_active: bool,
    select_observer: Option<SelectObserver>,
}

impl PhyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_sync(&self) -> bool {
        self.in_sync
    }

    pub fn set_in_sync(&mut self, in_sync: bool) {
        self.in_sync = in_sync;
    }

    /// Request a cell search; only one may be in flight.
    pub fn start_cell_search(&mut self, phy: &mut dyn PhyInterface) -> bool {
        if self.search_active {
            warn!("cell search already in progress");
            return false;
        }
        if !phy.start_cell_search() {
            return false;
        }
        self.search_active = true;
        true
    }

    /// Note completion of the in-flight cell search.
    pub fn cell_search_completed(&mut self) {
        if !self.search_active {
            debug!("cell search completion without active search");
        }
        self.search_active = false;
    }

    /// Request a cell select on behalf of `observer`; the completion is
    /// routed back to it.
    pub fn start_cell_select(
        &mut self,
        phy: &mut dyn PhyInterface,
        cell: PhyCell,
        observer: SelectObserver,
    ) -> bool {
        if let Some(pending) = self.select_observer {
            warn!(?pending, "cell select already in progress");
            return false;
        }
        if !phy.start_cell_select(cell) {
            return false;
        }
        self.select_observer = Some(observer);
        true
    }

    /// Take the subscriber of the completed cell select.
    pub fn take_select_observer(&mut self) -> Option<SelectObserver> {
        self.select_observer.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{RrConfigCommon, RrConfigDedicated, ScellConfig};

    #[derive(Default)]
    struct FakePhy {
        accept: bool,
        searches: u32,
        selects: u32,
    }

    impl PhyInterface for FakePhy {
        fn start_cell_search(&mut self) -> bool {
            self.searches += 1;
            self.accept
        }
        fn start_cell_select(&mut self, _cell: PhyCell) -> bool {
            self.selects += 1;
            self.accept
        }
        fn cell_is_camping(&self) -> bool {
            false
        }
        fn reset(&mut self) {}
        fn set_config_default(&mut self) {}
        fn set_default_pucch_srs(&mut self) {}
        fn apply_rr_config_common(&mut self, _cfg: &RrConfigCommon) {}
        fn apply_rr_config_dedicated(&mut self, _cfg: &RrConfigDedicated) {}
        fn apply_scell_config(&mut self, _cfg: &ScellConfig) {}
    }

    #[test]
    fn test_single_search_in_flight() {
        let mut ctrl = PhyController::new();
        let mut phy = FakePhy { accept: true, ..FakePhy::default() };
        assert!(ctrl.start_cell_search(&mut phy));
        assert!(!ctrl.start_cell_search(&mut phy));
        ctrl.cell_search_completed();
        assert!(ctrl.start_cell_search(&mut phy));
        assert_eq!(phy.searches, 2);
    }

    #[test]
    fn test_phy_rejection_leaves_no_pending_state() {
        let mut ctrl = PhyController::new();
        let mut phy = FakePhy::default();
        assert!(!ctrl.start_cell_search(&mut phy));
        assert!(!ctrl.start_cell_select(&mut phy, PhyCell::default(), SelectObserver::CellSearch));
        assert!(ctrl.take_select_observer().is_none());
        // a later attempt is not blocked by the failed one
        phy.accept = true;
        assert!(ctrl.start_cell_search(&mut phy));
    }

    #[test]
    fn test_select_observer_routing() {
        let mut ctrl = PhyController::new();
        let mut phy = FakePhy { accept: true, ..FakePhy::default() };
        assert!(ctrl.start_cell_select(&mut phy, PhyCell::default(), SelectObserver::Handover));
        assert!(!ctrl.start_cell_select(&mut phy, PhyCell::default(), SelectObserver::CellSearch));
        // the second request never reached the PHY
        assert_eq!(phy.selects, 1);
        assert_eq!(ctrl.take_select_observer(), Some(SelectObserver::Handover));
        assert!(ctrl.take_select_observer().is_none());
    }

    #[test]
    fn test_in_sync_tracking() {
        let mut ctrl = PhyController::new();
        assert!(!ctrl.is_in_sync());
        ctrl.set_in_sync(true);
        assert!(ctrl.is_in_sync());
        ctrl.set_in_sync(false);
        assert!(!ctrl.is_in_sync());
    }
}
