//! Input BAM descriptions and selection of the BAM source for a sample.

use crate::config::load_structured;
use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("no {sample} BAMs given: need either {sample}_cells or {sample}_wgs")]
    NoSource { sample: &'static str },
}

/// Where the reads of one sample come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BamSource {
    /// One aggregate BAM, indexed.
    Merged(PathBuf),
    /// One BAM per cell, keyed by cell id.
    PerCell(BTreeMap<String, PathBuf>),
}

/// Contents of a pseudo-WGS inputs file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PseudoWgsInputs {
    #[serde(default)]
    pub tumour_wgs: Option<PathBuf>,
    #[serde(default)]
    pub normal_wgs: Option<PathBuf>,
    #[serde(default)]
    pub tumour_cells: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub normal_cells: BTreeMap<String, PathBuf>,
}

impl PseudoWgsInputs {
    pub fn load(path: &Path) -> Result<Self> {
        load_structured(path)
    }

    /// Per-cell BAMs when any are listed, else the whole-genome BAM.
    pub fn select(&self, normal: bool) -> Result<BamSource, SourceError> {
        let (sample, cells, wgs) = if normal {
            ("normal", &self.normal_cells, &self.normal_wgs)
        } else {
            ("tumour", &self.tumour_cells, &self.tumour_wgs)
        };
        if !cells.is_empty() {
            Ok(BamSource::PerCell(cells.clone()))
        } else if let Some(wgs) = wgs {
            Ok(BamSource::Merged(wgs.clone()))
        } else {
            Err(SourceError::NoSource { sample })
        }
    }
}

/// A flat `key -> path` mapping file, e.g. cell id to BAM.
pub fn load_path_map(path: &Path) -> Result<BTreeMap<String, PathBuf>> {
    load_structured(path)
}
