//! Output schema resolution.
//!
//! Given the number of source reflectance channels and the output toggles,
//! [`OutputSchema::resolve`] assigns every output channel a slot index. The
//! layout is a pure function of its inputs and is built once per run; the
//! pixel transform and the writers only read it.
//!
//! Layout, for `N` channels:
//!
//! ```text
//! [0, 2N)        reserved prefix: corrected reflectances (N), normalized
//!                reflectances (N - 2), out-of-scope scalar (1), packed from 0
//! 2N .. 2N+5     IOPs, always present, fixed base
//! then           kd489/kdmin, uncertainties, flag word (always last)
//! ```
//!
//! Prefix slots not claimed by an enabled block are never written.
use std::ops::Range;

use serde::Serialize;

use crate::core::flags::FLAG_BAND_NAME;
use crate::error::{Error, Result};
use crate::types::{FeatureToggles, ReflectanceUnit};

/// Number of trailing channels left out of the normalized reflectance block.
pub const NORMALIZED_EXCLUDED_CHANNELS: usize = 2;

pub const IOP_COUNT: usize = 5;
pub const KD_COUNT: usize = 2;
/// Aggregate uncertainties: adg, atot, btot
pub const SUM_UNC_COUNT: usize = 3;

/// Inherent optical properties, in model output order.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub enum Iop {
    Apig,
    Adet,
    Agelb,
    Bpart,
    Bwit,
}

impl Iop {
    pub const ALL: [Iop; IOP_COUNT] = [Iop::Apig, Iop::Adet, Iop::Agelb, Iop::Bpart, Iop::Bwit];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn band_name(&self) -> &'static str {
        match self {
            Iop::Apig => "iop_apig",
            Iop::Adet => "iop_adet",
            Iop::Agelb => "iop_agelb",
            Iop::Bpart => "iop_bpart",
            Iop::Bwit => "iop_bwit",
        }
    }

    pub fn uncertainty_name(&self) -> &'static str {
        match self {
            Iop::Apig => "unc_apig",
            Iop::Adet => "unc_adet",
            Iop::Agelb => "unc_agelb",
            Iop::Bpart => "unc_bpart",
            Iop::Bwit => "unc_bwit",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Iop::Apig => "Absorption coefficient of phytoplankton pigments at 443 nm",
            Iop::Adet => "Absorption coefficient of detritus at 443 nm",
            Iop::Agelb => "Absorption coefficient of gelbstoff at 443 nm",
            Iop::Bpart => "Scattering coefficient of marine particles at 443 nm",
            Iop::Bwit => "Scattering coefficient of white particles at 443 nm",
        }
    }
}

/// Diffuse attenuation coefficients.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub enum Kd {
    Kd489,
    Kdmin,
}

impl Kd {
    pub const ALL: [Kd; KD_COUNT] = [Kd::Kd489, Kd::Kdmin];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn band_name(&self) -> &'static str {
        match self {
            Kd::Kd489 => "kd489",
            Kd::Kdmin => "kdmin",
        }
    }

    pub fn uncertainty_name(&self) -> &'static str {
        match self {
            Kd::Kd489 => "unc_kd489",
            Kd::Kdmin => "unc_kdmin",
        }
    }
}

/// Quantities with a stored uncertainty channel.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub enum Uncertainty {
    Iop(Iop),
    Adg,
    Atot,
    Btot,
    Kd(Kd),
}

impl Uncertainty {
    /// Offset inside the uncertainty block.
    fn offset(&self) -> usize {
        match self {
            Uncertainty::Iop(iop) => iop.index(),
            Uncertainty::Adg => IOP_COUNT,
            Uncertainty::Atot => IOP_COUNT + 1,
            Uncertainty::Btot => IOP_COUNT + 2,
            Uncertainty::Kd(kd) => IOP_COUNT + SUM_UNC_COUNT + kd.index(),
        }
    }

    pub fn band_name(&self) -> &'static str {
        match self {
            Uncertainty::Iop(iop) => iop.uncertainty_name(),
            Uncertainty::Adg => "unc_adg",
            Uncertainty::Atot => "unc_atot",
            Uncertainty::Btot => "unc_btot",
            Uncertainty::Kd(kd) => kd.uncertainty_name(),
        }
    }
}

/// Output channel groups, in slot order.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub enum BlockKind {
    AcReflectance,
    NormalizedReflectance,
    OutOfScope,
    Iop,
    Kd,
    Uncertainty,
    Flags,
}

/// A contiguous run of slots belonging to one group.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    pub start: usize,
    pub width: usize,
}

impl Block {
    pub fn slots(&self) -> Range<usize> {
        self.start..self.start + self.width
    }
}

/// One named output channel.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Channel {
    pub name: String,
    pub slot: usize,
    pub kind: BlockKind,
    pub unit: &'static str,
    pub description: String,
    /// Source reflectance band the channel is derived from, if spectral
    pub source_band: Option<String>,
}

/// Immutable slot layout of the output stack.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct OutputSchema {
    channel_count: usize,
    toggles: FeatureToggles,
    output_unit: ReflectanceUnit,
    blocks: Vec<Block>,
    channels: Vec<Channel>,
}

impl OutputSchema {
    /// Resolve the layout for `channel_count` anonymous channels
    /// (`band_1`, `band_2`, ...) in the water-leaving convention.
    pub fn resolve(channel_count: usize, toggles: &FeatureToggles) -> Result<Self> {
        let bands: Vec<String> = (1..=channel_count).map(|i| format!("band_{}", i)).collect();
        Self::for_bands(&bands, toggles, ReflectanceUnit::Rhow)
    }

    /// Resolve the layout for the given ordered source bands. Band names
    /// must be unique; their order defines the spectral slots.
    pub fn for_bands(
        bands: &[String],
        toggles: &FeatureToggles,
        output_unit: ReflectanceUnit,
    ) -> Result<Self> {
        if bands.is_empty() {
            return Err(Error::EmptyChannelSet);
        }
        for (i, band) in bands.iter().enumerate() {
            if bands[..i].contains(band) {
                return Err(Error::DuplicateChannel { name: band.clone() });
            }
        }

        let n = bands.len();
        let mut blocks = Vec::with_capacity(7);
        let mut channels = Vec::new();
        let mut offset = 0;

        if toggles.output_ac_reflectance {
            blocks.push(Block {
                kind: BlockKind::AcReflectance,
                start: offset,
                width: n,
            });
            let description = match output_unit {
                ReflectanceUnit::Rhow => {
                    "Atmospherically corrected angular dependent water leaving reflectances"
                }
                ReflectanceUnit::Rrs => {
                    "Atmospherically corrected angular dependent remote sensing reflectances"
                }
            };
            for (i, band) in bands.iter().enumerate() {
                channels.push(Channel {
                    name: format!("{}_{}", output_unit.prefix(), band),
                    slot: offset + i,
                    kind: BlockKind::AcReflectance,
                    unit: output_unit.unit(),
                    description: description.to_string(),
                    source_band: Some(band.clone()),
                });
            }
            offset += n;
        }

        if toggles.output_rhown {
            let width = normalized_width(n);
            blocks.push(Block {
                kind: BlockKind::NormalizedReflectance,
                start: offset,
                width,
            });
            let description = match output_unit {
                ReflectanceUnit::Rhow => "Normalized water leaving reflectances",
                ReflectanceUnit::Rrs => "Normalized remote sensing reflectances",
            };
            for (i, band) in bands.iter().take(width).enumerate() {
                channels.push(Channel {
                    name: format!("rhown_{}", band),
                    slot: offset + i,
                    kind: BlockKind::NormalizedReflectance,
                    unit: output_unit.unit(),
                    description: description.to_string(),
                    source_band: Some(band.clone()),
                });
            }
            offset += width;
        }

        if toggles.output_oos {
            blocks.push(Block {
                kind: BlockKind::OutOfScope,
                start: offset,
                width: 1,
            });
            channels.push(Channel {
                name: format!("oos_{}", output_unit.prefix()),
                slot: offset,
                kind: BlockKind::OutOfScope,
                unit: "1",
                description: "Corrected reflectances are out of scope of the nn training dataset"
                    .to_string(),
                source_band: None,
            });
        }

        // Fixed base, independent of the prefix toggles.
        let mut offset = single_channel_offset(n);
        blocks.push(Block {
            kind: BlockKind::Iop,
            start: offset,
            width: IOP_COUNT,
        });
        for iop in Iop::ALL {
            channels.push(Channel {
                name: iop.band_name().to_string(),
                slot: offset + iop.index(),
                kind: BlockKind::Iop,
                unit: "m^-1",
                description: iop.description().to_string(),
                source_band: None,
            });
        }
        offset += IOP_COUNT;

        if toggles.output_kd {
            blocks.push(Block {
                kind: BlockKind::Kd,
                start: offset,
                width: KD_COUNT,
            });
            channels.push(Channel {
                name: Kd::Kd489.band_name().to_string(),
                slot: offset,
                kind: BlockKind::Kd,
                unit: "m^-1",
                description: "Irradiance attenuation coefficient at 489 nm".to_string(),
                source_band: None,
            });
            channels.push(Channel {
                name: Kd::Kdmin.band_name().to_string(),
                slot: offset + 1,
                kind: BlockKind::Kd,
                unit: "m^-1",
                description:
                    "Mean irradiance attenuation coefficient at the three bands with minimum kd"
                        .to_string(),
                source_band: None,
            });
            offset += KD_COUNT;
        }

        if toggles.output_uncertainties {
            let mut members: Vec<(Uncertainty, &str)> = vec![
                (Uncertainty::Iop(Iop::Apig), "Uncertainty of pigment absorption coefficient"),
                (Uncertainty::Iop(Iop::Adet), "Uncertainty of detritus absorption coefficient"),
                (
                    Uncertainty::Iop(Iop::Agelb),
                    "Uncertainty of dissolved gelbstoff absorption coefficient",
                ),
                (Uncertainty::Iop(Iop::Bpart), "Uncertainty of particle scattering coefficient"),
                (
                    Uncertainty::Iop(Iop::Bwit),
                    "Uncertainty of white particle scattering coefficient",
                ),
                (Uncertainty::Adg, "Uncertainty of total gelbstoff absorption coefficient"),
                (
                    Uncertainty::Atot,
                    "Uncertainty of total water constituent absorption coefficient",
                ),
                (
                    Uncertainty::Btot,
                    "Uncertainty of total water constituent scattering coefficient",
                ),
            ];
            if toggles.output_kd {
                members.push((
                    Uncertainty::Kd(Kd::Kd489),
                    "Uncertainty of irradiance attenuation coefficient",
                ));
                members.push((
                    Uncertainty::Kd(Kd::Kdmin),
                    "Uncertainty of mean irradiance attenuation coefficient",
                ));
            }
            blocks.push(Block {
                kind: BlockKind::Uncertainty,
                start: offset,
                width: members.len(),
            });
            for (unc, description) in &members {
                channels.push(Channel {
                    name: unc.band_name().to_string(),
                    slot: offset + unc.offset(),
                    kind: BlockKind::Uncertainty,
                    unit: "m^-1",
                    description: description.to_string(),
                    source_band: None,
                });
            }
            offset += members.len();
        }

        blocks.push(Block {
            kind: BlockKind::Flags,
            start: offset,
            width: 1,
        });
        channels.push(Channel {
            name: FLAG_BAND_NAME.to_string(),
            slot: offset,
            kind: BlockKind::Flags,
            unit: "1",
            description: "Quality flags".to_string(),
            source_band: None,
        });

        Ok(Self {
            channel_count: n,
            toggles: *toggles,
            output_unit,
            blocks,
            channels,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn toggles(&self) -> &FeatureToggles {
        &self.toggles
    }

    pub fn output_unit(&self) -> ReflectanceUnit {
        self.output_unit
    }

    /// Number of slots in an output row, including unassigned prefix slots.
    pub fn width(&self) -> usize {
        self.flag_slot() + 1
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, kind: BlockKind) -> Option<&Block> {
        self.blocks.iter().find(|b| b.kind == kind)
    }

    /// Assigned channels in slot order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.channel(name).map(|c| c.slot)
    }

    pub fn single_channel_offset(&self) -> usize {
        single_channel_offset(self.channel_count)
    }

    pub fn iop(&self, iop: Iop) -> usize {
        self.single_channel_offset() + iop.index()
    }

    pub fn kd(&self, kd: Kd) -> Option<usize> {
        self.block(BlockKind::Kd).map(|b| b.start + kd.index())
    }

    pub fn uncertainty(&self, unc: Uncertainty) -> Option<usize> {
        if matches!(unc, Uncertainty::Kd(_)) && !self.toggles.output_kd {
            return None;
        }
        self.block(BlockKind::Uncertainty)
            .map(|b| b.start + unc.offset())
    }

    pub fn out_of_scope(&self) -> Option<usize> {
        self.block(BlockKind::OutOfScope).map(|b| b.start)
    }

    pub fn flag_slot(&self) -> usize {
        self.blocks
            .last()
            .map(|b| b.start)
            .unwrap_or_else(|| self.single_channel_offset() + IOP_COUNT)
    }
}

/// Base slot of the IOP block: twice the channel count.
pub fn single_channel_offset(channel_count: usize) -> usize {
    channel_count + channel_count
}

pub fn normalized_width(channel_count: usize) -> usize {
    channel_count.saturating_sub(NORMALIZED_EXCLUDED_CHANNELS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all_toggle_combinations() -> Vec<FeatureToggles> {
        (0..32u32)
            .map(|m| FeatureToggles {
                output_ac_reflectance: m & 1 != 0,
                output_rhown: m & 2 != 0,
                output_oos: m & 4 != 0,
                output_kd: m & 8 != 0,
                output_uncertainties: m & 16 != 0,
            })
            .collect()
    }

    #[test]
    fn zero_channels_is_a_configuration_error() {
        let err = OutputSchema::resolve(0, &FeatureToggles::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyChannelSet));
    }

    #[test]
    fn duplicate_band_names_are_rejected() {
        let bands = vec!["B2".to_string(), "B3".to_string(), "B2".to_string()];
        let err = OutputSchema::for_bands(&bands, &FeatureToggles::default(), ReflectanceUnit::Rhow)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateChannel { ref name } if name == "B2"));
    }

    #[test]
    fn resolve_is_deterministic() {
        for n in 1..8 {
            for toggles in all_toggle_combinations() {
                let a = OutputSchema::resolve(n, &toggles).unwrap();
                let b = OutputSchema::resolve(n, &toggles).unwrap();
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn slots_are_distinct_and_flag_is_last() {
        for n in 1..8 {
            for toggles in all_toggle_combinations() {
                let schema = OutputSchema::resolve(n, &toggles).unwrap();
                let slots: HashSet<usize> = schema.channels().iter().map(|c| c.slot).collect();
                assert_eq!(slots.len(), schema.channels().len());
                let max = schema.channels().iter().map(|c| c.slot).max().unwrap();
                assert_eq!(max, schema.flag_slot());
                assert_eq!(schema.width(), schema.flag_slot() + 1);
                assert_eq!(schema.channels().last().unwrap().name, FLAG_BAND_NAME);
            }
        }
    }

    #[test]
    fn iop_base_is_fixed() {
        let schema = OutputSchema::resolve(5, &FeatureToggles::minimal()).unwrap();
        assert_eq!(schema.iop(Iop::Apig), 10);
        assert_eq!(schema.index_of("iop_apig"), Some(10));
        assert_eq!(schema.flag_slot(), 15);

        for toggles in all_toggle_combinations() {
            let schema = OutputSchema::resolve(5, &toggles).unwrap();
            assert_eq!(schema.block(BlockKind::Iop).unwrap().start, 10);
        }
    }

    #[test]
    fn prefix_blocks_fit_below_iop_base() {
        for n in 1..8 {
            let schema = OutputSchema::resolve(n, &FeatureToggles::all()).unwrap();
            for kind in [
                BlockKind::AcReflectance,
                BlockKind::NormalizedReflectance,
                BlockKind::OutOfScope,
            ] {
                let block = schema.block(kind).unwrap();
                assert!(block.slots().end <= schema.single_channel_offset());
            }
        }
    }

    #[test]
    fn four_channel_layout() {
        let toggles = FeatureToggles {
            output_ac_reflectance: true,
            output_rhown: true,
            output_oos: false,
            output_kd: true,
            output_uncertainties: true,
        };
        let schema = OutputSchema::resolve(4, &toggles).unwrap();
        let widths: Vec<(BlockKind, usize)> =
            schema.blocks().iter().map(|b| (b.kind, b.width)).collect();
        assert_eq!(
            widths,
            vec![
                (BlockKind::AcReflectance, 4),
                (BlockKind::NormalizedReflectance, 2),
                (BlockKind::Iop, 5),
                (BlockKind::Kd, 2),
                (BlockKind::Uncertainty, 10),
                (BlockKind::Flags, 1),
            ]
        );
        assert_eq!(schema.channels().len(), 24);
        assert_eq!(schema.block(BlockKind::Iop).unwrap().start, 8);
        assert_eq!(schema.kd(Kd::Kd489), Some(13));
        assert_eq!(schema.uncertainty(Uncertainty::Iop(Iop::Apig)), Some(15));
        assert_eq!(schema.uncertainty(Uncertainty::Kd(Kd::Kdmin)), Some(24));
        assert_eq!(schema.flag_slot(), 25);
        assert_eq!(schema.out_of_scope(), None);
    }

    #[test]
    fn kd_uncertainties_need_kd() {
        let toggles = FeatureToggles {
            output_kd: false,
            ..FeatureToggles::all()
        };
        let schema = OutputSchema::resolve(6, &toggles).unwrap();
        assert_eq!(schema.block(BlockKind::Uncertainty).unwrap().width, 8);
        assert_eq!(schema.uncertainty(Uncertainty::Kd(Kd::Kd489)), None);
        assert!(schema.channel("unc_kd489").is_none());
        assert!(schema.channel("unc_btot").is_some());
    }

    #[test]
    fn no_uncertainty_channels_when_disabled() {
        let toggles = FeatureToggles {
            output_uncertainties: false,
            ..FeatureToggles::all()
        };
        let schema = OutputSchema::resolve(6, &toggles).unwrap();
        assert!(schema.block(BlockKind::Uncertainty).is_none());
        assert!(schema
            .channels()
            .iter()
            .all(|c| c.kind != BlockKind::Uncertainty));
    }

    #[test]
    fn names_follow_bands_and_unit() {
        let bands: Vec<String> = ["B2", "B3", "B4", "B5"].iter().map(|s| s.to_string()).collect();
        let schema =
            OutputSchema::for_bands(&bands, &FeatureToggles::all(), ReflectanceUnit::Rrs).unwrap();
        assert_eq!(schema.index_of("rrs_B2"), Some(0));
        assert_eq!(schema.index_of("rrs_B5"), Some(3));
        assert_eq!(schema.index_of("rhown_B2"), Some(4));
        assert_eq!(schema.index_of("rhown_B3"), Some(5));
        assert!(schema.channel("rhown_B4").is_none());
        assert_eq!(schema.index_of("oos_rrs"), Some(6));
        assert_eq!(schema.channel("rrs_B3").unwrap().unit, "sr^-1");
    }

    #[test]
    fn normalized_channels_follow_output_unit() {
        let bands: Vec<String> = ["B2", "B3", "B4", "B5"].iter().map(|s| s.to_string()).collect();
        let rrs =
            OutputSchema::for_bands(&bands, &FeatureToggles::all(), ReflectanceUnit::Rrs).unwrap();
        let rhown = rrs.channel("rhown_B2").unwrap();
        assert_eq!(rhown.unit, "sr^-1");
        assert_eq!(rhown.description, "Normalized remote sensing reflectances");

        let rhow =
            OutputSchema::for_bands(&bands, &FeatureToggles::all(), ReflectanceUnit::Rhow).unwrap();
        let rhown = rhow.channel("rhown_B3").unwrap();
        assert_eq!(rhown.unit, "1");
        assert_eq!(rhown.description, "Normalized water leaving reflectances");
    }

    #[test]
    fn single_channel_has_empty_normalized_block() {
        let schema = OutputSchema::resolve(1, &FeatureToggles::all()).unwrap();
        assert_eq!(schema.block(BlockKind::NormalizedReflectance).unwrap().width, 0);
        assert_eq!(schema.out_of_scope(), Some(1));
        assert_eq!(schema.iop(Iop::Apig), 2);
    }
}
