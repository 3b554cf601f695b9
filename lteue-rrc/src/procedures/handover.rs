//! Handover procedure (TS 36.331 Sec 5.3.5.4)
//!
//! Triggered by an RRCConnectionReconfiguration carrying mobilityControlInfo.
//! Synchronizes to the target cell under T304, performs random access with
//! the new C-RNTI, derives the handover AS keys from the NCC and answers
//! with RRCConnectionReconfigurationComplete once Msg3 can be sent.

use tracing::{info, warn};

use crate::interfaces::PhyCell;
use crate::messages::{ConnectionReconfiguration, MobilityControlInfo};
use crate::phy_ctrl::SelectObserver;
use crate::proc::{Outcome, ProcResult, Procedure};
use crate::rrc::{Rrc, RrcState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    LaunchPhyCellSelect,
    WaitPhyCellSelectComplete,
    WaitRaCompletion,
}

/// Events delivered to the handover procedure.
#[derive(Debug, Clone, Copy)]
pub enum HoEvent {
    /// PHY cell select on the target cell completed.
    SelectResult(bool),
    /// T304 expired before the handover completed.
    T304Expired,
    /// Random access on the target cell completed.
    RaCompleted(bool),
}

/// Executes a network-commanded handover to a neighbour cell.
#[derive(Default)]
pub struct HoProc {
    state: State,
    recfg: ConnectionReconfiguration,
    mob_ctrl_info: MobilityControlInfo,
    target_earfcn: u32,
    ho_src_rnti: u16,
    ho_src_cell: Option<PhyCell>,
}

impl HoProc {
    fn target_phy_cell(&self) -> PhyCell {
        PhyCell {
            pci: self.mob_ctrl_info.target_pci,
            earfcn: self.target_earfcn,
        }
    }

    fn handle_cell_select_result(&mut self, rrc: &mut Rrc, selected: bool) -> Outcome {
        // the target may have been dropped from the neighbour list meanwhile
        if rrc
            .cells
            .neighbour_by_cell(self.target_earfcn, self.mob_ctrl_info.target_pci)
            .is_none()
        {
            warn!(proc = Self::NAME, "cell removed from list of neighbours, aborting handover");
            return Outcome::Error;
        }

        if !selected {
            warn!(
                proc = Self::NAME,
                target = %self.target_phy_cell(),
                "could not synchronize with target cell, removing it and returning to source"
            );
            // keep reselection from picking the same cell again
            if let Some(target) = rrc
                .cells
                .neighbour_by_cell_mut(self.target_earfcn, self.mob_ctrl_info.target_pci)
            {
                target.set_rsrp(f32::NEG_INFINITY);
            }
            return Outcome::Error;
        }

        rrc.set_serving_cell(self.target_phy_cell(), false);

        if let Some(scell_cfg) = &self.recfg.scell_config {
            rrc.phy.apply_scell_config(scell_cfg);
        }

        if let Some(rach_cfg) = self.mob_ctrl_info.rach_cfg_dedicated {
            info!(
                proc = Self::NAME,
                preamble_idx = rach_cfg.ra_preamble_index,
                mask_idx = rach_cfg.ra_prach_mask_index,
                "starting non-contention based RA"
            );
            rrc.mac
                .start_noncont_ho(rach_cfg.ra_preamble_index, rach_cfg.ra_prach_mask_index);
        } else {
            info!(proc = Self::NAME, "starting contention-based RA");
            rrc.mac.start_cont_ho();
        }

        let mut ncc = None;
        if let Some(sec_cfg_ho) = &self.recfg.security_cfg_ho {
            if sec_cfg_ho.key_change_indicator {
                warn!(proc = Self::NAME, "keyChangeIndicator in securityConfigHO not supported");
                return Outcome::Error;
            }
            if let Some(algos) = sec_cfg_ho.security_algorithm_cfg {
                rrc.sec_cfg.cipher_algo = algos.ciphering;
                rrc.sec_cfg.integ_algo = algos.integrity;
                info!(
                    proc = Self::NAME,
                    ciphering = ?algos.ciphering,
                    integrity = ?algos.integrity,
                    "changed security algorithms"
                );
            }
            ncc = Some(sec_cfg_ho.next_hop_chaining_count);
        }

        let serving_earfcn = rrc.cells.serving_cell().earfcn();
        rrc.usim.generate_as_keys_ho(
            self.mob_ctrl_info.target_pci,
            serving_earfcn,
            ncc,
            &mut rrc.sec_cfg,
        );
        rrc.pdcp.config_security(&rrc.sec_cfg);

        // have the ReconfigurationComplete ready when Msg3 goes out
        rrc.send_reconfiguration_complete(self.recfg.transaction_id);

        self.state = State::WaitRaCompletion;
        Outcome::Yield
    }
}

impl Procedure for HoProc {
    type Ctx = Rrc;
    type Args = ConnectionReconfiguration;
    type Event = HoEvent;
    type Output = ();

    const NAME: &'static str = "Handover";

    fn init(&mut self, rrc: &mut Rrc, recfg: ConnectionReconfiguration) -> Outcome {
        info!(proc = Self::NAME, "starting");
        let Some(mob_ctrl_info) = recfg.mobility_control_info.clone() else {
            warn!(proc = Self::NAME, "reconfiguration carries no mobilityControlInfo");
            return Outcome::Error;
        };

        if mob_ctrl_info.target_pci == rrc.cells.serving_cell().pci() {
            warn!(proc = Self::NAME, "received HO command to own cell");
            rrc.con_reconfig_failed();
            return Outcome::Error;
        }

        let ncc = recfg.security_cfg_ho.as_ref().map(|s| s.next_hop_chaining_count);
        info!(
            proc = Self::NAME,
            target_pci = mob_ctrl_info.target_pci,
            ncc,
            "received HO command"
        );

        self.target_earfcn = mob_ctrl_info
            .carrier_freq
            .unwrap_or_else(|| rrc.cells.serving_cell().earfcn());

        if !rrc
            .cells
            .has_neighbour_cell(self.target_earfcn, mob_ctrl_info.target_pci)
        {
            warn!(
                proc = Self::NAME,
                earfcn = self.target_earfcn,
                pci = mob_ctrl_info.target_pci,
                "received HO command to unknown cell"
            );
            rrc.con_reconfig_failed();
            return Outcome::Error;
        }

        // save the source cell and C-RNTI
        self.ho_src_cell = Some(rrc.cells.serving_cell().phy_cell);
        self.ho_src_rnti = rrc.mac.get_rntis().crnti;

        rrc.timers.stop(rrc.timers.t310);
        rrc.timers.set(rrc.timers.t304, mob_ctrl_info.t304.millis());
        rrc.timers.run(rrc.timers.t304);

        self.recfg = recfg;
        self.mob_ctrl_info = mob_ctrl_info;
        self.state = State::LaunchPhyCellSelect;
        Outcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> Outcome {
        if rrc.state != RrcState::Connected {
            info!(proc = Self::NAME, "interrupted, RRC is no longer in connected state");
            return Outcome::Error;
        }
        if self.state == State::LaunchPhyCellSelect {
            // reset and reestablish the stack towards the target cell
            rrc.pdcp.reestablish();
            rrc.rlc.reestablish();
            rrc.mac.wait_uplink();
            rrc.mac.clear_rntis();
            rrc.mac.reset();
            rrc.phy.reset();

            rrc.mac
                .set_ho_rnti(self.mob_ctrl_info.new_ue_id, self.mob_ctrl_info.target_pci);

            // apply the common config; dedicated on top when present
            rrc.apply_rr_config_common(&self.mob_ctrl_info.rr_cfg_common);
            if let Some(dedicated) = &self.recfg.rr_cfg_dedicated {
                rrc.apply_rr_config_dedicated(dedicated);
            }

            info!(proc = Self::NAME, target = %self.target_phy_cell(), "starting cell selection of target cell");
            if !rrc.start_phy_cell_select(self.target_phy_cell(), SelectObserver::Handover) {
                warn!(proc = Self::NAME, "failed to launch the selection of the target cell");
                return Outcome::Error;
            }
            self.state = State::WaitPhyCellSelectComplete;
        }
        Outcome::Yield
    }

    fn react(&mut self, rrc: &mut Rrc, event: HoEvent) -> Outcome {
        match event {
            HoEvent::SelectResult(selected) => {
                if self.state != State::WaitPhyCellSelectComplete {
                    warn!(proc = Self::NAME, "received unexpected PHY cell selection event");
                    return Outcome::Yield;
                }
                self.handle_cell_select_result(rrc, selected)
            }
            HoEvent::T304Expired => {
                info!(proc = Self::NAME, "handover preparation timed out");
                Outcome::Error
            }
            HoEvent::RaCompleted(success) => {
                if self.state != State::WaitRaCompletion {
                    warn!(proc = Self::NAME, "received unexpected RA complete event");
                    return Outcome::Yield;
                }
                if success {
                    if let Some(meas_cfg) = self.recfg.meas_config.clone() {
                        rrc.apply_meas_config(meas_cfg);
                    }
                }
                info!(
                    proc = Self::NAME,
                    success,
                    source = ?self.ho_src_cell,
                    source_rnti = self.ho_src_rnti,
                    target = %self.target_phy_cell(),
                    "handover finished"
                );
                if success {
                    Outcome::Success
                } else {
                    Outcome::Error
                }
            }
        }
    }

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<()>) {
        info!(proc = Self::NAME, success = result.is_success(), "finished HO preparation");
        if result.is_success() {
            rrc.timers.stop(rrc.timers.t304);
        } else if rrc.timers.is_running(rrc.timers.t304) {
            info!(proc = Self::NAME, "waiting for T304 expiry to start the reestablishment procedure");
        }
    }

    fn output(&mut self) {}
}
