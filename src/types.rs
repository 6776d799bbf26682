//! Shared types and enums used across the crate.
//! Includes the reflectance convention (`ReflectanceUnit`), the built-in
//! model sets (`ModelSet`) and the output `FeatureToggles`.
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Reflectance convention of a band: water-leaving (rhow) or remote-sensing (rrs).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum ReflectanceUnit {
    Rhow,
    Rrs,
}

impl ReflectanceUnit {
    pub fn from_rrs_flag(as_rrs: bool) -> Self {
        if as_rrs {
            ReflectanceUnit::Rrs
        } else {
            ReflectanceUnit::Rhow
        }
    }

    /// Band-name prefix used for corrected reflectance channels.
    pub fn prefix(&self) -> &'static str {
        match self {
            ReflectanceUnit::Rhow => "rhow",
            ReflectanceUnit::Rrs => "rrs",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ReflectanceUnit::Rhow => "1",
            ReflectanceUnit::Rrs => "sr^-1",
        }
    }
}

impl std::fmt::Display for ReflectanceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReflectanceUnit::Rhow => write!(f, "Rhow"),
            ReflectanceUnit::Rrs => write!(f, "Rrs"),
        }
    }
}

/// Built-in sets of retrieval networks.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum ModelSet {
    Standard,
    Extreme,
}

impl ModelSet {
    pub const STANDARD_NAME: &'static str = "C2RCC-Nets";
    pub const EXTREME_NAME: &'static str = "C2X-Nets";

    pub fn name(&self) -> &'static str {
        match self {
            ModelSet::Standard => Self::STANDARD_NAME,
            ModelSet::Extreme => Self::EXTREME_NAME,
        }
    }
}

impl FromStr for ModelSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            Self::STANDARD_NAME => Ok(ModelSet::Standard),
            Self::EXTREME_NAME => Ok(ModelSet::Extreme),
            other => Err(Error::UnknownModelSet {
                name: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which optional output blocks are emitted. Read once per run.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    /// Atmospherically corrected, angular dependent reflectances
    pub output_ac_reflectance: bool,
    /// Normalized water leaving reflectances
    pub output_rhown: bool,
    /// Out-of-scope value of the corrected reflectances
    pub output_oos: bool,
    /// Irradiance attenuation coefficients
    pub output_kd: bool,
    pub output_uncertainties: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            output_ac_reflectance: true,
            output_rhown: true,
            output_oos: false,
            output_kd: true,
            output_uncertainties: true,
        }
    }
}

impl FeatureToggles {
    /// Every optional block disabled; only the IOPs and the flag word remain.
    pub fn minimal() -> Self {
        Self {
            output_ac_reflectance: false,
            output_rhown: false,
            output_oos: false,
            output_kd: false,
            output_uncertainties: false,
        }
    }

    pub fn all() -> Self {
        Self {
            output_ac_reflectance: true,
            output_rhown: true,
            output_oos: true,
            output_kd: true,
            output_uncertainties: true,
        }
    }
}
