//! Configuration structures for the UE
//!
//! The RRC knobs here are either 3GPP defaults or implementation-specific
//! timeouts that the standard leaves open (e.g. the SIB search timeout).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::Plmn;

/// UE configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UeConfig {
    /// Home PLMN
    pub hplmn: Plmn,
    /// Overall timeout for acquiring a single SIB. Not specified by the
    /// standard; tune per deployment.
    #[serde(default = "default_sib_search_timeout_ms")]
    pub sib_search_timeout_ms: u32,
    /// Period of the self-rescheduling cell-reselection procedure while the
    /// UE is idle and attached.
    #[serde(default = "default_cell_reselection_periodicity_ms")]
    pub cell_reselection_periodicity_ms: u32,
    /// How long the go-idle procedure waits for SRB flush before leaving
    /// connected state regardless.
    #[serde(default = "default_rlc_flush_timeout_ms")]
    pub rlc_flush_timeout_ms: u32,
    /// SIB indices the UE requires on its serving cell (0-based: 0 = SIB1).
    #[serde(default = "default_required_sibs")]
    pub required_sibs: Vec<u32>,
}

fn default_sib_search_timeout_ms() -> u32 {
    5000
}

fn default_cell_reselection_periodicity_ms() -> u32 {
    20_000
}

fn default_rlc_flush_timeout_ms() -> u32 {
    2000
}

fn default_required_sibs() -> Vec<u32> {
    vec![0, 1, 2]
}

impl Default for UeConfig {
    fn default() -> Self {
        Self {
            hplmn: Plmn::default(),
            sib_search_timeout_ms: default_sib_search_timeout_ms(),
            cell_reselection_periodicity_ms: default_cell_reselection_periodicity_ms(),
            rlc_flush_timeout_ms: default_rlc_flush_timeout_ms(),
            required_sibs: default_required_sibs(),
        }
    }
}

impl UeConfig {
    /// Load a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(contents)?)
    }
}
