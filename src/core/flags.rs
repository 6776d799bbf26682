//! Quality-flag table: named bits packed into one 32-bit word, plus the
//! per-bit display metadata attached to the flag raster.
use serde::Serialize;

/// One named bit of the quality-flag word.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub struct FlagDef {
    pub name: &'static str,
    pub bit: u32,
    pub description: &'static str,
}

impl FlagDef {
    pub const fn mask(&self) -> u32 {
        1u32 << self.bit
    }
}

pub const RHOW_OOR: FlagDef = FlagDef {
    name: "Rhow_OOR",
    bit: 2,
    description: "One of the inputs to the IOP retrieval neural net is out of training range",
};
pub const CLOUD_RISK: FlagDef = FlagDef {
    name: "Cloud_risk",
    bit: 3,
    description: "High downwelling transmission is indicating cloudy conditions",
};
pub const IOP_OOR: FlagDef = FlagDef {
    name: "Iop_OOR",
    bit: 4,
    description: "One of the IOPs is out of range",
};
pub const APIG_AT_MAX: FlagDef = FlagDef {
    name: "Apig_at_max",
    bit: 5,
    description: "Apig output of the IOP retrieval neural net is at its maximum. The true value is this value or higher.",
};
pub const ADET_AT_MAX: FlagDef = FlagDef {
    name: "Adet_at_max",
    bit: 6,
    description: "Adet output of the IOP retrieval neural net is at its maximum. The true value is this value or higher.",
};
pub const AGELB_AT_MAX: FlagDef = FlagDef {
    name: "Agelb_at_max",
    bit: 7,
    description: "Agelb output of the IOP retrieval neural net is at its maximum. The true value is this value or higher.",
};
pub const BPART_AT_MAX: FlagDef = FlagDef {
    name: "Bpart_at_max",
    bit: 8,
    description: "Bpart output of the IOP retrieval neural net is at its maximum. The true value is this value or higher.",
};
pub const BWIT_AT_MAX: FlagDef = FlagDef {
    name: "Bwit_at_max",
    bit: 9,
    description: "Bwit output of the IOP retrieval neural net is at its maximum. The true value is this value or higher.",
};
pub const APIG_AT_MIN: FlagDef = FlagDef {
    name: "Apig_at_min",
    bit: 10,
    description: "Apig output of the IOP retrieval neural net is at its minimum. The true value is this value or lower.",
};
pub const ADET_AT_MIN: FlagDef = FlagDef {
    name: "Adet_at_min",
    bit: 11,
    description: "Adet output of the IOP retrieval neural net is at its minimum. The true value is this value or lower.",
};
pub const AGELB_AT_MIN: FlagDef = FlagDef {
    name: "Agelb_at_min",
    bit: 12,
    description: "Agelb output of the IOP retrieval neural net is at its minimum. The true value is this value or lower.",
};
pub const BPART_AT_MIN: FlagDef = FlagDef {
    name: "Bpart_at_min",
    bit: 13,
    description: "Bpart output of the IOP retrieval neural net is at its minimum. The true value is this value or lower.",
};
pub const BWIT_AT_MIN: FlagDef = FlagDef {
    name: "Bwit_at_min",
    bit: 14,
    description: "Bwit output of the IOP retrieval neural net is at its minimum. The true value is this value or lower.",
};
pub const RHOW_OOS: FlagDef = FlagDef {
    name: "Rhow_OOS",
    bit: 15,
    description: "The Rhow input spectrum to the IOP neural net is probably not within its training range, the inversion is likely to be wrong.",
};
pub const KD489_OOR: FlagDef = FlagDef {
    name: "Kd489_OOR",
    bit: 16,
    description: "Kd489 is out of range",
};
pub const KDMIN_OOR: FlagDef = FlagDef {
    name: "Kdmin_OOR",
    bit: 17,
    description: "Kdmin is out of range",
};
pub const KD489_AT_MAX: FlagDef = FlagDef {
    name: "Kd489_at_max",
    bit: 18,
    description: "Kd489 is at max",
};
pub const KDMIN_AT_MAX: FlagDef = FlagDef {
    name: "Kdmin_at_max",
    bit: 19,
    description: "Kdmin is at max",
};
/// Set by the pipeline when a reflectance input is not strictly positive.
pub const INPUT_INVALID: FlagDef = FlagDef {
    name: "Input_invalid",
    bit: 30,
    description: "A reflectance input was not strictly positive, no retrieval was performed",
};
/// Set by the pipeline when the valid-pixel expression resolved to true.
pub const VALID_PE: FlagDef = FlagDef {
    name: "Valid_PE",
    bit: 31,
    description: "The operators valid pixel expression has resolved to true",
};

/// All flags in presentation order.
pub static FLAG_TABLE: [FlagDef; 20] = [
    RHOW_OOR,
    CLOUD_RISK,
    IOP_OOR,
    APIG_AT_MAX,
    ADET_AT_MAX,
    AGELB_AT_MAX,
    BPART_AT_MAX,
    BWIT_AT_MAX,
    APIG_AT_MIN,
    ADET_AT_MIN,
    AGELB_AT_MIN,
    BPART_AT_MIN,
    BWIT_AT_MIN,
    RHOW_OOS,
    KD489_OOR,
    KDMIN_OOR,
    KD489_AT_MAX,
    KDMIN_AT_MAX,
    INPUT_INVALID,
    VALID_PE,
];

/// Name of the flag raster and of its coding.
pub const FLAG_BAND_NAME: &str = "quality_flags";

/// Packed quality flags of one pixel.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct FlagWord(pub u32);

impl FlagWord {
    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, flag: FlagDef) -> bool {
        self.0 & flag.mask() != 0
    }

    pub fn set(&mut self, flag: FlagDef) {
        self.0 |= flag.mask();
    }

    /// Merge bits produced elsewhere (e.g. by the retrieval model) unchanged.
    pub fn merge(&mut self, bits: u32) {
        self.0 |= bits;
    }

    /// Table entries whose bits are set, in table order. Bits without a
    /// table entry are ignored.
    pub fn decode(&self) -> Vec<&'static FlagDef> {
        FLAG_TABLE.iter().filter(|f| self.contains(**f)).collect()
    }

    /// Slot representation inside a float output row; exact for every u32.
    pub fn as_sample(&self) -> f64 {
        self.0 as f64
    }

    pub fn from_sample(value: f64) -> Self {
        FlagWord(value as u32)
    }
}

pub fn flag_by_name(name: &str) -> Option<&'static FlagDef> {
    FLAG_TABLE.iter().find(|f| f.name == name)
}

pub fn flag_by_bit(bit: u32) -> Option<&'static FlagDef> {
    FLAG_TABLE.iter().find(|f| f.bit == bit)
}

/// RGB display color.
pub type Rgb = [u8; 3];

const RED: Rgb = [255, 0, 0];
const ORANGE: Rgb = [255, 200, 0];
const YELLOW: Rgb = [255, 255, 0];
const BLUE: Rgb = [0, 0, 255];
const GREEN: Rgb = [0, 255, 0];
const PINK: Rgb = [255, 175, 175];
const MAGENTA: Rgb = [255, 0, 255];
const CYAN: Rgb = [0, 255, 255];
const GRAY: Rgb = [128, 128, 128];
const LIGHT_GRAY: Rgb = [192, 192, 192];

const MASK_COLORS: [Rgb; 9] = [RED, ORANGE, YELLOW, BLUE, GREEN, PINK, MAGENTA, CYAN, GRAY];

/// Display metadata of one flag mask.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct MaskStyle {
    pub name: &'static str,
    pub mask: u32,
    pub description: &'static str,
    /// Band-math expression selecting the flag
    pub expression: String,
    pub color: Rgb,
    pub transparency: f64,
}

/// Mask styles for every flag: colors cycle by table position; the cloud
/// risk mask is light gray and opaque.
pub fn mask_styles() -> Vec<MaskStyle> {
    FLAG_TABLE
        .iter()
        .enumerate()
        .map(|(i, flag)| {
            let cloud = flag.mask() == CLOUD_RISK.mask();
            MaskStyle {
                name: flag.name,
                mask: flag.mask(),
                description: flag.description,
                expression: format!("{}.{}", FLAG_BAND_NAME, flag.name),
                color: if cloud {
                    LIGHT_GRAY
                } else {
                    MASK_COLORS[i % MASK_COLORS.len()]
                },
                transparency: if cloud { 0.0 } else { 0.5 },
            }
        })
        .collect()
}
