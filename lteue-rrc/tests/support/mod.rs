//! Recording mock layers and a small test harness for driving the RRC
//! engine subframe by subframe.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use lteue_common::config::UeConfig;
use lteue_common::types::{FoundPlmn, Plmn, STmsi};
use lteue_rrc::interfaces::{
    Barring, CellSearchOutcome, CellSearchResult, LastFreq, MacInterface, NasInterface,
    PdcpInterface, PhyCell, PhyInterface, RlcInterface, SecurityConfig, UeRnti, UsimInterface,
};
use lteue_rrc::messages::{
    RrConfigCommon, RrConfigDedicated, SchedInfo, ScellConfig, Sib1, Sib2, Sib3, SiPeriodicity,
    SiWindowLength, SystemInformation, UeTimersAndConstants, UlMessage,
};
use lteue_rrc::rrc::{Layers, Rrc};
use lteue_rrc::tti::Tti;

/// Everything the mock layers record, shared with the test body.
#[derive(Default)]
pub struct Recorder {
    // PHY
    pub cell_searches: u32,
    pub cell_selects: Vec<PhyCell>,
    pub camping: bool,
    pub phy_resets: u32,
    pub phy_defaults: u32,
    pub pucch_srs_defaults: u32,
    pub rr_common_applied: u32,
    pub rr_dedicated_applied: u32,
    // MAC
    pub bcch_rx: Vec<(u32, u32)>,
    pub pcch_rx: u32,
    pub mac_resets: u32,
    pub mac_defaults: u32,
    pub crnti: u16,
    pub ho_rnti: Option<(u16, u16)>,
    pub cont_ho_starts: u32,
    pub noncont_ho_starts: Vec<(u8, u8)>,
    pub wait_uplinks: u32,
    pub rnti_clears: u32,
    // RLC
    pub rlc_reestablishments: u32,
    pub srbs_flushed: bool,
    pub bearers: Vec<u32>,
    pub suspended_bearers: Vec<u32>,
    // PDCP
    pub pdcp_reestablishments: u32,
    pub security_configs: u32,
    pub ul_messages: Vec<(u32, UlMessage)>,
    // NAS
    pub plmn_search_results: Vec<Option<Vec<FoundPlmn>>>,
    pub paging_calls: Vec<STmsi>,
    pub paging_accept: bool,
    pub connection_request_results: Vec<bool>,
    pub barrings: Vec<Barring>,
    pub nas_attached: bool,
    // USIM
    pub ho_key_derivations: Vec<(u16, u32, Option<u8>)>,
}

pub type SharedRecorder = Rc<RefCell<Recorder>>;

struct MockPhy(SharedRecorder);

impl PhyInterface for MockPhy {
    fn start_cell_search(&mut self) -> bool {
        self.0.borrow_mut().cell_searches += 1;
        true
    }
    fn start_cell_select(&mut self, cell: PhyCell) -> bool {
        self.0.borrow_mut().cell_selects.push(cell);
        true
    }
    fn cell_is_camping(&self) -> bool {
        self.0.borrow().camping
    }
    fn reset(&mut self) {
        self.0.borrow_mut().phy_resets += 1;
    }
    fn set_config_default(&mut self) {
        self.0.borrow_mut().phy_defaults += 1;
    }
    fn set_default_pucch_srs(&mut self) {
        self.0.borrow_mut().pucch_srs_defaults += 1;
    }
    fn apply_rr_config_common(&mut self, _cfg: &RrConfigCommon) {
        self.0.borrow_mut().rr_common_applied += 1;
    }
    fn apply_rr_config_dedicated(&mut self, _cfg: &RrConfigDedicated) {
        self.0.borrow_mut().rr_dedicated_applied += 1;
    }
    fn apply_scell_config(&mut self, _cfg: &ScellConfig) {}
}

struct MockMac(SharedRecorder);

impl MacInterface for MockMac {
    fn bcch_start_rx(&mut self, si_window_start: Tti, si_window_length: u32) {
        self.0
            .borrow_mut()
            .bcch_rx
            .push((si_window_start.to_u32(), si_window_length));
    }
    fn pcch_start_rx(&mut self) {
        self.0.borrow_mut().pcch_rx += 1;
    }
    fn reset(&mut self) {
        self.0.borrow_mut().mac_resets += 1;
    }
    fn wait_uplink(&mut self) {
        self.0.borrow_mut().wait_uplinks += 1;
    }
    fn clear_rntis(&mut self) {
        self.0.borrow_mut().rnti_clears += 1;
    }
    fn get_rntis(&self) -> UeRnti {
        UeRnti {
            crnti: self.0.borrow().crnti,
        }
    }
    fn set_ho_rnti(&mut self, rnti: u16, target_pci: u16) {
        self.0.borrow_mut().ho_rnti = Some((rnti, target_pci));
    }
    fn start_cont_ho(&mut self) {
        self.0.borrow_mut().cont_ho_starts += 1;
    }
    fn start_noncont_ho(&mut self, preamble_index: u8, prach_mask_index: u8) {
        self.0
            .borrow_mut()
            .noncont_ho_starts
            .push((preamble_index, prach_mask_index));
    }
    fn set_config_default(&mut self) {
        self.0.borrow_mut().mac_defaults += 1;
    }
}

struct MockRlc(SharedRecorder);

impl RlcInterface for MockRlc {
    fn reestablish(&mut self) {
        self.0.borrow_mut().rlc_reestablishments += 1;
    }
    fn has_bearer(&self, lcid: u32) -> bool {
        self.0.borrow().bearers.contains(&lcid)
    }
    fn suspend_bearer(&mut self, lcid: u32) {
        self.0.borrow_mut().suspended_bearers.push(lcid);
    }
    fn srbs_flushed(&self) -> bool {
        self.0.borrow().srbs_flushed
    }
}

struct MockPdcp(SharedRecorder);

impl PdcpInterface for MockPdcp {
    fn reestablish(&mut self) {
        self.0.borrow_mut().pdcp_reestablishments += 1;
    }
    fn config_security(&mut self, _cfg: &SecurityConfig) {
        self.0.borrow_mut().security_configs += 1;
    }
    fn write_ul_message(&mut self, lcid: u32, msg: UlMessage) {
        self.0.borrow_mut().ul_messages.push((lcid, msg));
    }
}

struct MockNas(SharedRecorder);

impl NasInterface for MockNas {
    fn plmn_search_completed(&mut self, found_plmns: Option<&[FoundPlmn]>) {
        self.0
            .borrow_mut()
            .plmn_search_results
            .push(found_plmns.map(<[FoundPlmn]>::to_vec));
    }
    fn paging(&mut self, ue_identity: &STmsi) -> bool {
        let mut rec = self.0.borrow_mut();
        rec.paging_calls.push(*ue_identity);
        rec.paging_accept
    }
    fn connection_request_completed(&mut self, success: bool) {
        self.0.borrow_mut().connection_request_results.push(success);
    }
    fn set_barring(&mut self, barring: Barring) {
        self.0.borrow_mut().barrings.push(barring);
    }
    fn is_attached(&self) -> bool {
        self.0.borrow().nas_attached
    }
}

struct MockUsim(SharedRecorder);

impl UsimInterface for MockUsim {
    fn generate_as_keys_ho(
        &mut self,
        target_pci: u16,
        earfcn: u32,
        ncc: Option<u8>,
        _cfg: &mut SecurityConfig,
    ) {
        self.0
            .borrow_mut()
            .ho_key_derivations
            .push((target_pci, earfcn, ncc));
    }
}

/// Test harness: the RRC engine wired to recording mocks plus a subframe
/// counter.
pub struct TestUe {
    pub rrc: Rrc,
    pub rec: SharedRecorder,
    tti: u32,
}

pub const TEST_PLMN: Plmn = Plmn {
    mcc: 901,
    mnc: 70,
    long_mnc: false,
};

pub fn cell(pci: u16) -> PhyCell {
    PhyCell { pci, earfcn: 2850 }
}

impl TestUe {
    pub fn new() -> Self {
        Self::with_config(UeConfig {
            hplmn: TEST_PLMN,
            ..UeConfig::default()
        })
    }

    pub fn with_config(cfg: UeConfig) -> Self {
        let rec: SharedRecorder = Rc::new(RefCell::new(Recorder {
            paging_accept: true,
            srbs_flushed: true,
            ..Recorder::default()
        }));
        let rrc = Rrc::new(
            cfg,
            Layers {
                phy: Box::new(MockPhy(Rc::clone(&rec))),
                mac: Box::new(MockMac(Rc::clone(&rec))),
                rlc: Box::new(MockRlc(Rc::clone(&rec))),
                pdcp: Box::new(MockPdcp(Rc::clone(&rec))),
                nas: Box::new(MockNas(Rc::clone(&rec))),
                usim: Box::new(MockUsim(Rc::clone(&rec))),
            },
        );
        Self { rrc, rec, tti: 0 }
    }

    pub fn tick(&mut self) {
        self.tti += 1;
        self.rrc.run_tti(Tti::new(self.tti));
    }

    pub fn tick_n(&mut self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// SIB1 advertising the test PLMN and scheduling SIB3 (SIB2 is implicit
    /// in the first schedulingInfoList entry).
    pub fn sib1(&self, plmns: &[Plmn], tac: u16) -> SystemInformation {
        SystemInformation::Sib1(Sib1 {
            plmn_list: plmns.to_vec(),
            tac,
            cell_id: 0x19b_01,
            q_rx_lev_min: -140.0,
            sched_info_list: vec![SchedInfo {
                si_periodicity: SiPeriodicity::Rf16,
                sib_map_info: vec![3],
            }],
            si_window_length: SiWindowLength::Sf10,
        })
    }

    pub fn sib2(&self) -> SystemInformation {
        SystemInformation::Sib2(Sib2 {
            ue_timers_and_constants: UeTimersAndConstants::default(),
        })
    }

    pub fn sib3(&self) -> SystemInformation {
        SystemInformation::Sib3(Sib3 {
            q_hyst_db: 4,
            q_rx_lev_min: -140.0,
            q_rx_lev_min_offset: 0.0,
        })
    }

    pub fn found(&self, pci: u16, last_freq: LastFreq) -> CellSearchResult {
        CellSearchResult {
            found: CellSearchOutcome::CellFound,
            found_cell: cell(pci),
            last_freq,
        }
    }

    pub fn not_found(&self, last_freq: LastFreq) -> CellSearchResult {
        CellSearchResult {
            found: CellSearchOutcome::CellNotFound,
            found_cell: PhyCell::default(),
            last_freq,
        }
    }

    pub fn ul_connection_requests(&self) -> usize {
        self.rec
            .borrow()
            .ul_messages
            .iter()
            .filter(|(_, m)| matches!(m, UlMessage::ConnectionRequest { .. }))
            .count()
    }

    pub fn ul_reconfiguration_completes(&self) -> usize {
        self.rec
            .borrow()
            .ul_messages
            .iter()
            .filter(|(_, m)| matches!(m, UlMessage::ReconfigurationComplete { .. }))
            .count()
    }

    /// Drive a cold attach on PCI 1 up to the point where the
    /// RRCConnectionRequest has been transmitted and T300 runs.
    pub fn attach_until_wait_t300(&mut self) {
        self.rrc.plmn_select(TEST_PLMN);
        assert!(self
            .rrc
            .connection_request(Default::default(), Some(Bytes::from_static(b"attach-req"))));

        // the engine first tries to camp on the (empty) serving cell entry
        assert!(!self.rec.borrow().cell_selects.is_empty());
        self.rrc.cell_select_complete(false);

        // which sends it searching; a cell appears on PCI 1
        assert_eq!(self.rec.borrow().cell_searches, 1);
        self.rrc.cell_search_complete(self.found(1, LastFreq::MoreFreqs));
        self.rec.borrow_mut().camping = true;
        self.rrc.cell_select_complete(true);
        self.rrc.in_sync();
        self.rrc.new_phy_meas(1, 2850, -85.0);

        // cell search now waits for the measurement, then asks for SIB1
        self.tick_n(2);
        assert!(!self.rec.borrow().bcch_rx.is_empty());
        self.rrc.write_pdu_bcch(self.sib1(&[TEST_PLMN], 0x0001));
        self.tick_n(2);

        // serving cell configuration pulls SIB2 and SIB3
        self.rrc.write_pdu_bcch(self.sib2());
        self.tick_n(2);
        self.rrc.write_pdu_bcch(self.sib3());
        self.tick_n(2);

        assert!(self.rrc.timers.is_running(self.rrc.timers.t300));
        assert_eq!(self.ul_connection_requests(), 1);
    }

    /// Drive a complete cold attach on PCI 1: cell search, SIB acquisition,
    /// connection request and RRCConnectionSetup. Leaves the UE CONNECTED
    /// with C-RNTI 0x4601 and an in-sync, camping PHY.
    pub fn cold_attach(&mut self) {
        self.attach_until_wait_t300();

        self.rec.borrow_mut().crnti = 0x4601;
        self.rrc.handle_connection_setup(Default::default());
        self.tick();
        assert!(self.rrc.is_connected());
        assert_eq!(self.rec.borrow().connection_request_results, vec![true]);
    }
}
