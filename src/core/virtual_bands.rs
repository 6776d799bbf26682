//! Derived quantities computed by formula from stored output channels.
//!
//! Uncertainties of derived quantities apply the quantity's own formula to
//! the input uncertainties. This is a linear approximation, kept as is for
//! compatibility with existing products.
use serde::Serialize;

use crate::core::schema::{Iop, Kd, OutputSchema, Uncertainty};

/// Factors and exponents of the concentration formulas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coefficients {
    pub tsm_fac: f64,
    pub tsm_exp: f64,
    pub chl_exp: f64,
    pub chl_fac: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            tsm_fac: 1.72,
            tsm_exp: 3.1,
            chl_exp: 1.04,
            chl_fac: 21.0,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub enum VirtualBand {
    Adg,
    Atot,
    Btot,
    Tsm,
    Chl,
    KdZ90max,
    UncTsm,
    UncChl,
    UncKdZ90max,
}

/// Description of a virtual band, for metadata.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct VirtualBandDef {
    pub name: &'static str,
    pub expression: String,
    pub unit: &'static str,
    pub description: &'static str,
    /// Band this one is the uncertainty of
    pub uncertainty_of: Option<&'static str>,
}

impl VirtualBand {
    pub const ALL: [VirtualBand; 9] = [
        VirtualBand::Adg,
        VirtualBand::Atot,
        VirtualBand::Btot,
        VirtualBand::Tsm,
        VirtualBand::Chl,
        VirtualBand::KdZ90max,
        VirtualBand::UncTsm,
        VirtualBand::UncChl,
        VirtualBand::UncKdZ90max,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VirtualBand::Adg => "iop_adg",
            VirtualBand::Atot => "iop_atot",
            VirtualBand::Btot => "iop_btot",
            VirtualBand::Tsm => "conc_tsm",
            VirtualBand::Chl => "conc_chl",
            VirtualBand::KdZ90max => "kd_z90max",
            VirtualBand::UncTsm => "unc_tsm",
            VirtualBand::UncChl => "unc_chl",
            VirtualBand::UncKdZ90max => "unc_kd_z90max",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            VirtualBand::Adg | VirtualBand::Atot | VirtualBand::Btot => "m^-1",
            VirtualBand::Tsm | VirtualBand::UncTsm => "g m^-3",
            VirtualBand::Chl | VirtualBand::UncChl => "mg m^-3",
            VirtualBand::KdZ90max | VirtualBand::UncKdZ90max => "m",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            VirtualBand::Adg => "Detritus + gelbstoff absorption at 443 nm",
            VirtualBand::Atot => "phytoplankton + detritus + gelbstoff absorption at 443 nm",
            VirtualBand::Btot => "total particle scattering at 443 nm",
            VirtualBand::Tsm => "Total suspended matter dry weight concentration",
            VirtualBand::Chl => "Chlorophyll concentration",
            VirtualBand::KdZ90max => {
                "Depth of the water column from which 90% of the water leaving irradiance comes from"
            }
            VirtualBand::UncTsm => "Uncertainty of total suspended matter (TSM) dry weight concentration",
            VirtualBand::UncChl => "Uncertainty of chlorophyll concentration",
            VirtualBand::UncKdZ90max => "Uncertainty of kd_z90max",
        }
    }

    pub fn uncertainty_of(&self) -> Option<&'static str> {
        match self {
            VirtualBand::UncTsm => Some(VirtualBand::Tsm.name()),
            VirtualBand::UncChl => Some(VirtualBand::Chl.name()),
            VirtualBand::UncKdZ90max => Some(VirtualBand::KdZ90max.name()),
            _ => None,
        }
    }

    /// Band-math form of the formula.
    pub fn expression(&self, c: &Coefficients) -> String {
        match self {
            VirtualBand::Adg => "iop_adet + iop_agelb".to_string(),
            VirtualBand::Atot => "iop_apig + iop_adet + iop_agelb".to_string(),
            VirtualBand::Btot => "iop_bpart + iop_bwit".to_string(),
            VirtualBand::Tsm => format!("iop_bpart * {} + iop_bwit * {}", c.tsm_fac, c.tsm_exp),
            VirtualBand::Chl => format!("pow(iop_apig, {}) * {}", c.chl_exp, c.chl_fac),
            VirtualBand::KdZ90max => "1 / kdmin".to_string(),
            VirtualBand::UncTsm => format!("unc_btot * {}", c.tsm_fac),
            VirtualBand::UncChl => format!("pow(unc_apig, {}) * {}", c.chl_exp, c.chl_fac),
            VirtualBand::UncKdZ90max => "abs(kd_z90max - 1.0 / abs(kdmin - unc_kdmin))".to_string(),
        }
    }

    /// Whether the band exists for the given schema.
    pub fn is_available(&self, schema: &OutputSchema) -> bool {
        let toggles = schema.toggles();
        match self {
            VirtualBand::Adg
            | VirtualBand::Atot
            | VirtualBand::Btot
            | VirtualBand::Tsm
            | VirtualBand::Chl => true,
            VirtualBand::KdZ90max => toggles.output_kd,
            VirtualBand::UncTsm | VirtualBand::UncChl => toggles.output_uncertainties,
            VirtualBand::UncKdZ90max => toggles.output_kd && toggles.output_uncertainties,
        }
    }

    pub fn definition(&self, c: &Coefficients) -> VirtualBandDef {
        VirtualBandDef {
            name: self.name(),
            expression: self.expression(c),
            unit: self.unit(),
            description: self.description(),
            uncertainty_of: self.uncertainty_of(),
        }
    }

    /// Evaluate over one pixel's output row. Returns `None` when the band is
    /// not available for the schema.
    pub fn evaluate(&self, row: &[f64], schema: &OutputSchema, c: &Coefficients) -> Option<f64> {
        if !self.is_available(schema) {
            return None;
        }
        let iop = |i: Iop| row[schema.iop(i)];
        let value = match self {
            VirtualBand::Adg => adg(iop(Iop::Adet), iop(Iop::Agelb)),
            VirtualBand::Atot => atot(iop(Iop::Apig), iop(Iop::Adet), iop(Iop::Agelb)),
            VirtualBand::Btot => btot(iop(Iop::Bpart), iop(Iop::Bwit)),
            VirtualBand::Tsm => tsm(iop(Iop::Bpart), iop(Iop::Bwit), c),
            VirtualBand::Chl => chl(iop(Iop::Apig), c),
            VirtualBand::KdZ90max => z90max(row[schema.kd(Kd::Kdmin)?]),
            VirtualBand::UncTsm => unc_tsm(row[schema.uncertainty(Uncertainty::Btot)?], c),
            VirtualBand::UncChl => {
                chl(row[schema.uncertainty(Uncertainty::Iop(Iop::Apig))?], c)
            }
            VirtualBand::UncKdZ90max => unc_z90max(
                row[schema.kd(Kd::Kdmin)?],
                row[schema.uncertainty(Uncertainty::Kd(Kd::Kdmin))?],
            ),
        };
        Some(value)
    }
}

/// Virtual bands present for a schema, in product order.
pub fn available_bands(schema: &OutputSchema) -> Vec<VirtualBand> {
    VirtualBand::ALL
        .iter()
        .copied()
        .filter(|b| b.is_available(schema))
        .collect()
}

pub fn adg(adet: f64, agelb: f64) -> f64 {
    adet + agelb
}

pub fn atot(apig: f64, adet: f64, agelb: f64) -> f64 {
    apig + adet + agelb
}

pub fn btot(bpart: f64, bwit: f64) -> f64 {
    bpart + bwit
}

pub fn tsm(bpart: f64, bwit: f64, c: &Coefficients) -> f64 {
    bpart * c.tsm_fac + bwit * c.tsm_exp
}

pub fn chl(apig: f64, c: &Coefficients) -> f64 {
    apig.powf(c.chl_exp) * c.chl_fac
}

pub fn z90max(kdmin: f64) -> f64 {
    1.0 / kdmin
}

pub fn unc_tsm(unc_btot: f64, c: &Coefficients) -> f64 {
    unc_btot * c.tsm_fac
}

pub fn unc_z90max(kdmin: f64, unc_kdmin: f64) -> f64 {
    (z90max(kdmin) - 1.0 / (kdmin - unc_kdmin).abs()).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureToggles;
    use approx::assert_relative_eq;

    fn filled_row(schema: &OutputSchema) -> Vec<f64> {
        let mut row = vec![f64::NAN; schema.width()];
        for (i, iop) in Iop::ALL.iter().enumerate() {
            row[schema.iop(*iop)] = 0.1 * (i + 1) as f64;
        }
        if let Some(slot) = schema.kd(Kd::Kdmin) {
            row[slot] = 0.5;
        }
        if let Some(slot) = schema.uncertainty(Uncertainty::Btot) {
            row[slot] = 0.2;
        }
        if let Some(slot) = schema.uncertainty(Uncertainty::Iop(Iop::Apig)) {
            row[slot] = 0.05;
        }
        if let Some(slot) = schema.uncertainty(Uncertainty::Kd(Kd::Kdmin)) {
            row[slot] = 0.1;
        }
        row
    }

    #[test]
    fn sums_and_concentrations() {
        let schema = OutputSchema::resolve(4, &FeatureToggles::all()).unwrap();
        let row = filled_row(&schema);
        let c = Coefficients::default();
        let eval = |b: VirtualBand| b.evaluate(&row, &schema, &c).unwrap();

        assert_relative_eq!(eval(VirtualBand::Adg), 0.2 + 0.3, epsilon = 1e-12);
        assert_relative_eq!(eval(VirtualBand::Atot), 0.1 + 0.2 + 0.3, epsilon = 1e-12);
        assert_relative_eq!(eval(VirtualBand::Btot), 0.4 + 0.5, epsilon = 1e-12);
        assert_relative_eq!(eval(VirtualBand::Tsm), 0.4 * 1.72 + 0.5 * 3.1, epsilon = 1e-12);
        assert_relative_eq!(eval(VirtualBand::Chl), 0.1f64.powf(1.04) * 21.0, epsilon = 1e-12);
        assert_relative_eq!(eval(VirtualBand::KdZ90max), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn uncertainties_reuse_the_formulas() {
        let schema = OutputSchema::resolve(4, &FeatureToggles::all()).unwrap();
        let row = filled_row(&schema);
        let c = Coefficients::default();
        let eval = |b: VirtualBand| b.evaluate(&row, &schema, &c).unwrap();

        assert_relative_eq!(eval(VirtualBand::UncTsm), 0.2 * 1.72, epsilon = 1e-12);
        assert_relative_eq!(eval(VirtualBand::UncChl), chl(0.05, &c), epsilon = 1e-12);
        // |1/0.5 - 1/|0.5 - 0.1||
        assert_relative_eq!(eval(VirtualBand::UncKdZ90max), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn availability_follows_toggles() {
        let schema = OutputSchema::resolve(4, &FeatureToggles::minimal()).unwrap();
        let names: Vec<&str> = available_bands(&schema).iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["iop_adg", "iop_atot", "iop_btot", "conc_tsm", "conc_chl"]);
        let row = filled_row(&schema);
        assert!(VirtualBand::KdZ90max
            .evaluate(&row, &schema, &Coefficients::default())
            .is_none());

        let toggles = FeatureToggles {
            output_kd: false,
            ..FeatureToggles::all()
        };
        let schema = OutputSchema::resolve(4, &toggles).unwrap();
        let bands = available_bands(&schema);
        assert!(bands.contains(&VirtualBand::UncChl));
        assert!(!bands.contains(&VirtualBand::UncKdZ90max));
    }

    #[test]
    fn expressions_embed_coefficients() {
        let c = Coefficients {
            tsm_fac: 2.0,
            tsm_exp: 4.5,
            chl_exp: 1.1,
            chl_fac: 20.0,
        };
        assert_eq!(VirtualBand::Tsm.expression(&c), "iop_bpart * 2 + iop_bwit * 4.5");
        assert_eq!(VirtualBand::Chl.expression(&c), "pow(iop_apig, 1.1) * 20");
        assert_eq!(
            VirtualBand::UncChl.definition(&c).uncertainty_of,
            Some("conc_chl")
        );
    }
}
