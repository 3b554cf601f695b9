//! Simplified RRC message model
//!
//! The engine consumes and produces RRC messages as plain typed structs; the
//! ASN.1 UPER codec sits outside this crate and maps these to and from the
//! wire. Encoded enumerations that carry a numeric meaning (si-Periodicity,
//! si-WindowLength, t304) are modelled with `num_enum` so a decoded raw
//! value is validated at the boundary.
//!
//! SIB indices are 0-based: index 0 is SIB1, index 1 is SIB2, index 2 is
//! SIB3 and index 12 is SIB13.

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use lteue_common::types::{Plmn, STmsi};

// ============================================================================
// Encoded enumerations
// ============================================================================

/// si-Periodicity, in radio frames (TS 36.331 SchedulingInfo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum SiPeriodicity {
    Rf8 = 8,
    Rf16 = 16,
    #[default]
    Rf32 = 32,
    Rf64 = 64,
    Rf128 = 128,
    Rf256 = 256,
    Rf512 = 512,
}

impl SiPeriodicity {
    pub fn frames(self) -> u32 {
        self.into()
    }
}

/// si-WindowLength, in subframes (TS 36.331 SystemInformationBlockType1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum SiWindowLength {
    Sf1 = 1,
    Sf2 = 2,
    Sf5 = 5,
    #[default]
    Sf10 = 10,
    Sf15 = 15,
    Sf20 = 20,
    Sf40 = 40,
}

impl SiWindowLength {
    pub fn subframes(self) -> u32 {
        self.into()
    }
}

/// t304 from mobilityControlInfo, as milliseconds (TS 36.331 Sec 7.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum T304Value {
    Ms50 = 50,
    Ms100 = 100,
    Ms150 = 150,
    Ms200 = 200,
    Ms500 = 500,
    #[default]
    Ms1000 = 1000,
    Ms2000 = 2000,
}

impl T304Value {
    pub fn millis(self) -> u32 {
        self.into()
    }
}

/// EEA ciphering algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CipheringAlgorithm {
    #[default]
    Eea0 = 0,
    Eea1 = 1,
    Eea2 = 2,
    Eea3 = 3,
}

/// EIA integrity protection algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum IntegrityAlgorithm {
    #[default]
    Eia0 = 0,
    Eia1 = 1,
    Eia2 = 2,
    Eia3 = 3,
}

// ============================================================================
// System information
// ============================================================================

/// One schedulingInfoList entry of SIB1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedInfo {
    pub si_periodicity: SiPeriodicity,
    /// SIB type numbers carried by this SI message (3 = SIB3, 13 = SIB13).
    /// SIB2 is implicitly mapped to the first entry.
    pub sib_map_info: Vec<u32>,
}

/// SystemInformationBlockType1 (abridged).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sib1 {
    pub plmn_list: Vec<Plmn>,
    pub tac: u16,
    pub cell_id: u32,
    /// Minimum required RX level, already scaled to dBm.
    pub q_rx_lev_min: f32,
    pub sched_info_list: Vec<SchedInfo>,
    pub si_window_length: SiWindowLength,
}

/// ue-TimersAndConstants from SIB2, scaled to milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct UeTimersAndConstants {
    pub t300_ms: u32,
    pub t301_ms: u32,
    pub t310_ms: u32,
    pub n310: u32,
    pub t311_ms: u32,
    pub n311: u32,
}

impl Default for UeTimersAndConstants {
    fn default() -> Self {
        Self {
            t300_ms: 1000,
            t301_ms: 1000,
            t310_ms: 1000,
            n310: 1,
            t311_ms: 1000,
            n311: 1,
        }
    }
}

/// SystemInformationBlockType2 (abridged).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sib2 {
    pub ue_timers_and_constants: UeTimersAndConstants,
}

/// SystemInformationBlockType3 (abridged), cell reselection parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sib3 {
    pub q_hyst_db: u32,
    /// Minimum required RX level for reselection, already scaled to dBm.
    pub q_rx_lev_min: f32,
    pub q_rx_lev_min_offset: f32,
}

/// SystemInformationBlockType13 (abridged), MBMS control information.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sib13 {
    pub mbsfn_area_count: u32,
}

/// A decoded system information block, tagged with its 0-based index.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemInformation {
    Sib1(Sib1),
    Sib2(Sib2),
    Sib3(Sib3),
    Sib13(Sib13),
}

impl SystemInformation {
    /// 0-based SIB index matching the acquisition procedures.
    pub fn index(&self) -> u32 {
        match self {
            SystemInformation::Sib1(_) => 0,
            SystemInformation::Sib2(_) => 1,
            SystemInformation::Sib3(_) => 2,
            SystemInformation::Sib13(_) => 12,
        }
    }
}

// ============================================================================
// Paging
// ============================================================================

/// One pagingRecordList entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingRecord {
    pub ue_identity: STmsi,
}

/// PCCH Paging message (abridged).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paging {
    pub paging_record_list: Vec<PagingRecord>,
    pub system_info_modification: bool,
}

// ============================================================================
// Connection control (downlink)
// ============================================================================

/// radioResourceConfigCommon, kept opaque: the engine hands it to PHY/MAC
/// without interpreting the contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RrConfigCommon(pub Bytes);

/// radioResourceConfigDedicated, kept opaque.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RrConfigDedicated(pub Bytes);

/// sCellToAddModList configuration, kept opaque.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScellConfig(pub Bytes);

/// measConfig, kept opaque: stored on handover, interpreted by the
/// measurement engine outside this crate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasConfig(pub Bytes);

/// RRCConnectionSetup (abridged).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionSetup {
    pub transaction_id: u8,
    pub rr_cfg_dedicated: RrConfigDedicated,
}

/// RRCConnectionReject (abridged).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionReject {
    /// waitTime in seconds, starts T302.
    pub wait_time_s: u32,
}

/// rach-ConfigDedicated for non-contention random access at handover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RachConfigDedicated {
    pub ra_preamble_index: u8,
    pub ra_prach_mask_index: u8,
}

/// securityConfigHO, intra-LTE variant only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityConfigHo {
    pub next_hop_chaining_count: u8,
    pub key_change_indicator: bool,
    pub security_algorithm_cfg: Option<SecurityAlgorithmConfig>,
}

/// securityAlgorithmConfig.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityAlgorithmConfig {
    pub ciphering: CipheringAlgorithm,
    pub integrity: IntegrityAlgorithm,
}

/// mobilityControlInfo: presence of this IE in a reconfiguration makes it a
/// handover command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MobilityControlInfo {
    pub target_pci: u16,
    /// Target downlink EARFCN; absent means intra-frequency.
    pub carrier_freq: Option<u32>,
    /// newUE-Identity, the C-RNTI on the target cell.
    pub new_ue_id: u16,
    pub t304: T304Value,
    pub rach_cfg_dedicated: Option<RachConfigDedicated>,
    pub rr_cfg_common: RrConfigCommon,
}

/// RRCConnectionReconfiguration (abridged).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionReconfiguration {
    pub transaction_id: u8,
    pub mobility_control_info: Option<MobilityControlInfo>,
    pub rr_cfg_dedicated: Option<RrConfigDedicated>,
    pub meas_config: Option<MeasConfig>,
    pub security_cfg_ho: Option<SecurityConfigHo>,
    pub scell_config: Option<ScellConfig>,
}

// ============================================================================
// Uplink messages
// ============================================================================

/// ue-Identity for RRCConnectionRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialUeIdentity {
    STmsi(STmsi),
    /// 40-bit random value.
    Random(u64),
}

/// Reestablishment cause (TS 36.331 Sec 5.3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReestablishmentCause {
    #[default]
    ReconfigurationFailure,
    HandoverFailure,
    OtherFailure,
}

impl std::fmt::Display for ReestablishmentCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReestablishmentCause::ReconfigurationFailure => write!(f, "Reconfiguration failure"),
            ReestablishmentCause::HandoverFailure => write!(f, "Handover failure"),
            ReestablishmentCause::OtherFailure => write!(f, "Other failure"),
        }
    }
}

/// Uplink RRC messages produced by the engine and encoded externally.
#[derive(Debug, Clone, PartialEq)]
pub enum UlMessage {
    ConnectionRequest {
        cause: crate::interfaces::EstablishmentCause,
        ue_identity: InitialUeIdentity,
    },
    ConnectionSetupComplete {
        transaction_id: u8,
        dedicated_info_nas: Bytes,
    },
    ReestablishmentRequest {
        c_rnti: u16,
        pci: u16,
        cause: ReestablishmentCause,
    },
    ReconfigurationComplete {
        transaction_id: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_si_periodicity_decode() {
        assert_eq!(SiPeriodicity::try_from(64u32).unwrap(), SiPeriodicity::Rf64);
        assert!(SiPeriodicity::try_from(30u32).is_err());
        assert_eq!(SiPeriodicity::Rf128.frames(), 128);
    }

    #[test]
    fn test_si_window_length_decode() {
        assert_eq!(SiWindowLength::try_from(40u32).unwrap(), SiWindowLength::Sf40);
        assert!(SiWindowLength::try_from(25u32).is_err());
        assert_eq!(SiWindowLength::Sf5.subframes(), 5);
    }

    #[test]
    fn test_t304_decode() {
        assert_eq!(T304Value::try_from(1000u32).unwrap(), T304Value::Ms1000);
        assert!(T304Value::try_from(300u32).is_err());
        assert_eq!(T304Value::Ms150.millis(), 150);
    }

    #[test]
    fn test_security_algorithm_decode() {
        assert_eq!(CipheringAlgorithm::try_from(2u8).unwrap(), CipheringAlgorithm::Eea2);
        assert_eq!(IntegrityAlgorithm::try_from(1u8).unwrap(), IntegrityAlgorithm::Eia1);
        assert!(CipheringAlgorithm::try_from(7u8).is_err());
    }

    #[test]
    fn test_system_information_index() {
        assert_eq!(SystemInformation::Sib1(Sib1::default()).index(), 0);
        assert_eq!(SystemInformation::Sib2(Sib2::default()).index(), 1);
        assert_eq!(SystemInformation::Sib3(Sib3::default()).index(), 2);
        assert_eq!(SystemInformation::Sib13(Sib13::default()).index(), 12);
    }

    #[test]
    fn test_reconfiguration_is_handover_command() {
        let mut recfg = ConnectionReconfiguration::default();
        assert!(recfg.mobility_control_info.is_none());
        recfg.mobility_control_info = Some(MobilityControlInfo {
            target_pci: 2,
            t304: T304Value::Ms1000,
            ..MobilityControlInfo::default()
        });
        assert_eq!(recfg.mobility_control_info.as_ref().unwrap().t304.millis(), 1000);
    }
}
