//! Retrieval model contract.
//!
//! The retrieval model is a pretrained regression engine consumed as a black
//! box. This module fixes its input feature vector ([`ModelInput`]), its
//! output ([`RetrievalResult`]), the settings handed to it on construction,
//! and the resolution of the network files that make up a model set.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::schema::{IOP_COUNT, KD_COUNT, SUM_UNC_COUNT};
use crate::error::{Error, Result};
use crate::types::{FeatureToggles, ModelSet};

/// Per-pixel inputs of the retrieval model.
#[derive(Debug, Clone, Copy)]
pub struct ModelInput<'a> {
    pub x: usize,
    pub y: usize,
    pub lat: f64,
    pub lon: f64,
    /// Natural log of the reflectances in the model's water-leaving domain
    pub log_reflectances: &'a [f64],
    pub solar_flux: &'a [f64],
    pub sun_zenith: f64,
    pub sun_azimuth: f64,
    pub view_zenith: f64,
    pub view_azimuth: f64,
    pub altitude: f64,
    pub valid: bool,
    pub pressure: f64,
    pub ozone: f64,
    /// Acquisition time as modified Julian date
    pub mjd: f64,
}

/// Outputs of one retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// Atmospherically corrected reflectances, water-leaving domain
    pub rwa: Vec<f64>,
    /// Normalized water leaving reflectances
    pub rwn: Vec<f64>,
    pub rwa_oos: f64,
    pub iops: [f64; IOP_COUNT],
    pub kd489: f64,
    pub kdmin: f64,
    pub unc_iops: [f64; IOP_COUNT],
    /// Uncertainties of adg, atot and btot
    pub unc_sums: [f64; SUM_UNC_COUNT],
    /// Uncertainties of kd489 and kdmin
    pub unc_kd: [f64; KD_COUNT],
    pub flags: u32,
}

impl RetrievalResult {
    /// A result with every value NaN and no flags.
    pub fn nan(channel_count: usize) -> Self {
        Self {
            rwa: vec![f64::NAN; channel_count],
            rwn: vec![f64::NAN; channel_count],
            rwa_oos: f64::NAN,
            iops: [f64::NAN; IOP_COUNT],
            kd489: f64::NAN,
            kdmin: f64::NAN,
            unc_iops: [f64::NAN; IOP_COUNT],
            unc_sums: [f64::NAN; SUM_UNC_COUNT],
            unc_kd: [f64::NAN; KD_COUNT],
            flags: 0,
        }
    }
}

/// Pretrained retrieval engine. Implementations are built once and shared
/// read-only between all worker threads.
pub trait RetrievalModel: Sync {
    fn process_pixel(&self, input: &ModelInput<'_>) -> RetrievalResult;

    /// Names of the networks in use, recorded in the product metadata.
    fn used_model_names(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<M: RetrievalModel + ?Sized> RetrievalModel for &M {
    fn process_pixel(&self, input: &ModelInput<'_>) -> RetrievalResult {
        (**self).process_pixel(input)
    }

    fn used_model_names(&self) -> Vec<String> {
        (**self).used_model_names()
    }
}

impl<M: RetrievalModel + ?Sized> RetrievalModel for Box<M> {
    fn process_pixel(&self, input: &ModelInput<'_>) -> RetrievalResult {
        (**self).process_pixel(input)
    }

    fn used_model_names(&self) -> Vec<String> {
        (**self).used_model_names()
    }
}

/// Scene constants and switches a model is configured with.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSettings {
    pub salinity: f64,
    pub temperature: f64,
    pub threshold_ac_reflec_oos: f64,
    pub toggles: FeatureToggles,
}

/// Roles of the networks in a model set, in file-list order.
pub const NET_ROLES: [&str; 10] = [
    "iop_rw",
    "iop_unciop",
    "iop_uncsumiop_unckd",
    "rtosa_aann",
    "rtosa_rpath",
    "rtosa_rw",
    "rtosa_trans",
    "rw_iop",
    "rw_kd",
    "rw_rwnorm",
];

const STANDARD_NETS: [&str; 10] = [
    "msi/std_s2_20160502/iop_rw/17x97x47_125.5.net",
    "msi/std_s2_20160502/iop_unciop/17x77x37_11486.7.net",
    "msi/std_s2_20160502/iop_uncsumiop_unckd/17x77x37_9113.1.net",
    "msi/std_s2_20160502/rtosa_aann/31x7x31_78.0.net",
    "msi/std_s2_20160502/rtosa_rpath/31x77x57x37_1564.4.net",
    "msi/std_s2_20160502/rtosa_rw/33x73x53x33_291140.4.net",
    "msi/std_s2_20160502/rtosa_trans/31x77x57x37_37537.6.net",
    "msi/std_s2_20160502/rw_iop/97x77x37_17515.9.net",
    "msi/std_s2_20160502/rw_kd/97x77x7_306.8.net",
    "msi/std_s2_20160502/rw_rwnorm/27x7x27_28.0.net",
];

const EXTREME_NETS: [&str; 10] = [
    "msi/ext_s2_elbetsm_20170320/iop_rw/77x77x77_28.3.net",
    "msi/ext_s2_elbetsm_20170320/iop_unciop/17x77x37_11486.7.net",
    "msi/ext_s2_elbetsm_20170320/iop_uncsumiop_unckd/17x77x37_9113.1.net",
    "msi/ext_s2_elbetsm_20170320/rtosa_aann/31x7x31_7.2.net",
    "msi/ext_s2_elbetsm_20170320/rtosa_rpath/37x37x37_175.7.net",
    "msi/ext_s2_elbetsm_20170320/rtosa_rw/77x77x77x77_10688.3.net",
    "msi/ext_s2_elbetsm_20170320/rtosa_trans/77x77x77_7809.2.net",
    "msi/ext_s2_elbetsm_20170320/rw_iop/77x77x77_785.6.net",
    "msi/ext_s2_elbetsm_20170320/rw_kd/77x77x77_61.6.net",
    "msi/ext_s2_elbetsm_20170320/rw_rwnorm/27x7x27_28.0.net",
];

/// Network files of a model, one per role in [`NET_ROLES`] order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelFiles {
    pub paths: Vec<PathBuf>,
    /// True for built-in (bundled, relative) paths
    pub builtin: bool,
}

impl ModelFiles {
    pub fn builtin(set: ModelSet) -> Self {
        let nets = match set {
            ModelSet::Standard => &STANDARD_NETS,
            ModelSet::Extreme => &EXTREME_NETS,
        };
        Self {
            paths: nets.iter().map(PathBuf::from).collect(),
            builtin: true,
        }
    }

    /// Resolve the files of a model: the alternative directory wins over the
    /// named set. The set name is checked either way.
    pub fn resolve(set_name: &str, alternative: Option<&Path>) -> Result<Self> {
        let set: ModelSet = set_name.parse()?;
        match alternative {
            Some(dir) => {
                info!("Using alternative model directory: {:?}", dir);
                Self::from_directory(dir)
            }
            None => {
                debug!("Using built-in model set {}", set);
                Ok(Self::builtin(set))
            }
        }
    }

    /// Each role directory below `root` must hold exactly one `.net` file.
    pub fn from_directory(root: &Path) -> Result<Self> {
        let mut paths = Vec::with_capacity(NET_ROLES.len());
        for role in NET_ROLES {
            let dir = root.join(role);
            if !dir.is_dir() {
                return Err(Error::ModelFiles(format!(
                    "missing model directory {:?}",
                    dir
                )));
            }
            let mut nets = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("net") {
                    nets.push(path);
                }
            }
            match nets.len() {
                1 => paths.push(nets.remove(0)),
                0 => {
                    return Err(Error::ModelFiles(format!(
                        "no .net file found in {:?}",
                        dir
                    )));
                }
                count => {
                    return Err(Error::ModelFiles(format!(
                        "expected one .net file in {:?}, found {}",
                        dir, count
                    )));
                }
            }
        }
        Ok(Self {
            paths,
            builtin: false,
        })
    }

    pub fn path_for(&self, role: &str) -> Option<&Path> {
        NET_ROLES
            .iter()
            .position(|r| *r == role)
            .and_then(|i| self.paths.get(i))
            .map(PathBuf::as_path)
    }

    /// Display names of the files, for metadata.
    pub fn names(&self) -> Vec<String> {
        self.paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sets_cover_every_role() {
        for set in [ModelSet::Standard, ModelSet::Extreme] {
            let files = ModelFiles::builtin(set);
            assert_eq!(files.paths.len(), NET_ROLES.len());
            for role in NET_ROLES {
                let path = files.path_for(role).unwrap().to_string_lossy().into_owned();
                assert!(path.contains(&format!("/{}/", role)), "{} not in {}", role, path);
            }
        }
    }

    #[test]
    fn unknown_set_fails_even_with_alternative_path() {
        let err = ModelFiles::resolve("Nope", Some(Path::new("/tmp"))).unwrap_err();
        assert!(matches!(err, Error::UnknownModelSet { .. }));
    }

    #[test]
    fn alternative_directory_is_scanned() {
        let root = tempfile::tempdir().unwrap();
        for role in NET_ROLES {
            let dir = root.path().join(role);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{}_1.0.net", role)), b"").unwrap();
            fs::write(dir.join("readme.txt"), b"").unwrap();
        }
        let files = ModelFiles::resolve(ModelSet::STANDARD_NAME, Some(root.path())).unwrap();
        assert!(!files.builtin);
        assert!(files.path_for("rw_kd").unwrap().ends_with("rw_kd/rw_kd_1.0.net"));
    }

    #[test]
    fn alternative_directory_missing_role_fails() {
        let root = tempfile::tempdir().unwrap();
        let err = ModelFiles::from_directory(root.path()).unwrap_err();
        assert!(matches!(err, Error::ModelFiles(_)));
        assert!(err.is_configuration());
    }
}
