//! Histogram-based pT reweighting.
//!
//! Each event gets the content of the reference-density bin containing its
//! unscaled transverse momentum. Two reference densities exist per process
//! (raw and rescaled), producing the `ptweight` and `ptweight_scaled`
//! attributes. The densities are looked up through [`DensityLookup`], so the
//! pipeline does not depend on how histograms are stored.
//!
//! # Histogram File Format
//!
//! A JSON object keyed by histogram name (`h_<process prefix>`):
//!
//! ```json
//! {
//!   "h_QCD":  { "edges": [400.0, 500.0, 600.0], "contents": [0.8, 1.3] },
//!   "h_ZpTT": { "edges": [400.0, 700.0, 1000.0], "contents": [2.0, 0.5] }
//! }
//! ```
//!
//! Values below the first edge use the first bin, values at or above the
//! last edge use the last bin.

use crate::config::ReweightConfig;
use crate::dataset::AttributeCollection;
use crate::error::{DatasetError, Result};
use crate::schema::{process_prefix, PT_WEIGHT, PT_WEIGHT_SCALED};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Maps a kinematic value to a weight.
pub trait DensityLookup {
    fn lookup(&self, value: f64) -> f64;
}

impl<F: Fn(f64) -> f64> DensityLookup for F {
    fn lookup(&self, value: f64) -> f64 {
        self(value)
    }
}

/// 1-D histogram used as a lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHistogram")]
pub struct BinnedHistogram {
    edges: Vec<f64>,
    contents: Vec<f64>,
}

#[derive(Deserialize)]
struct RawHistogram {
    edges: Vec<f64>,
    contents: Vec<f64>,
}

impl TryFrom<RawHistogram> for BinnedHistogram {
    type Error = String;

    fn try_from(raw: RawHistogram) -> std::result::Result<Self, String> {
        BinnedHistogram::new(raw.edges, raw.contents)
    }
}

impl BinnedHistogram {
    /// `edges` must be finite and strictly increasing, with one more entry
    /// than `contents`.
    pub fn new(edges: Vec<f64>, contents: Vec<f64>) -> std::result::Result<Self, String> {
        if contents.is_empty() {
            return Err("histogram needs at least one bin".to_string());
        }
        if edges.len() != contents.len() + 1 {
            return Err(format!(
                "{} edges for {} bins",
                edges.len(),
                contents.len()
            ));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err("histogram edges must be finite".to_string());
        }
        if edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err("histogram edges must be strictly increasing".to_string());
        }
        Ok(Self { edges, contents })
    }

    /// `n_bins` equal-width bins over `[low, high)`.
    pub fn uniform(low: f64, high: f64, contents: Vec<f64>) -> std::result::Result<Self, String> {
        let n = contents.len();
        if n == 0 {
            return Err("histogram needs at least one bin".to_string());
        }
        let width = (high - low) / n as f64;
        let edges = (0..=n).map(|i| low + width * i as f64).collect();
        Self::new(edges, contents)
    }

    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Bin containing `value`, clamped to the first/last bin. NaN maps to
    /// the first bin.
    pub fn find_bin(&self, value: f64) -> usize {
        let upper = self.edges.partition_point(|&e| e <= value);
        upper.saturating_sub(1).min(self.n_bins() - 1)
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents[bin.min(self.n_bins() - 1)]
    }
}

impl DensityLookup for BinnedHistogram {
    fn lookup(&self, value: f64) -> f64 {
        self.bin_content(self.find_bin(value))
    }
}

/// Named histograms loaded from one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistogramSet {
    histograms: BTreeMap<String, BinnedHistogram>,
}

impl HistogramSet {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DatasetError::config(format!(
                "cannot open reference histograms {}: {e}",
                path.display()
            ))
        })?;
        let set: HistogramSet = serde_json::from_reader(BufReader::new(file))?;
        Ok(set)
    }

    pub fn insert(&mut self, name: &str, histogram: BinnedHistogram) {
        self.histograms.insert(name.to_string(), histogram);
    }

    pub fn get(&self, name: &str) -> Option<&BinnedHistogram> {
        self.histograms.get(name)
    }

    /// Histogram `h_<prefix>`.
    pub fn for_process(&self, prefix: &str) -> Result<&BinnedHistogram> {
        let name = format!("h_{prefix}");
        self.get(&name).ok_or_else(|| {
            DatasetError::config(format!("no reference histogram '{name}'"))
        })
    }

    /// Remove and return histogram `h_<prefix>`.
    pub fn take_process(mut self, prefix: &str) -> Result<BinnedHistogram> {
        let name = format!("h_{prefix}");
        self.histograms
            .remove(&name)
            .ok_or_else(|| DatasetError::config(format!("no reference histogram '{name}'")))
    }
}

/// Weight of every event: `weights[i] = lookup(values[i])`.
pub fn reweight(values: ArrayView1<'_, f64>, density: &dyn DensityLookup) -> Array1<f64> {
    values.mapv(|v| density.lookup(v))
}

/// Produces the raw and rescaled pT weight attributes.
pub struct PtReweighter {
    raw: Box<dyn DensityLookup>,
    scaled: Box<dyn DensityLookup>,
}

impl PtReweighter {
    pub fn new(raw: Box<dyn DensityLookup>, scaled: Box<dyn DensityLookup>) -> Self {
        Self { raw, scaled }
    }

    /// Load both densities for the process of `job_name`.
    pub fn from_files<P: AsRef<Path>>(
        data_dir: P,
        config: &ReweightConfig,
        job_name: &str,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let prefix = process_prefix(job_name, &config.prefix_delimiter);

        let raw = HistogramSet::load(data_dir.join(&config.raw_file))?.take_process(prefix)?;
        let scaled =
            HistogramSet::load(data_dir.join(&config.scaled_file))?.take_process(prefix)?;

        log::info!(
            "Loaded reference densities h_{prefix}: raw {} bins, scaled {} bins",
            raw.n_bins(),
            scaled.n_bins()
        );
        Ok(Self::new(Box::new(raw), Box::new(scaled)))
    }

    /// Add `ptweight` and `ptweight_scaled`, computed from `source`.
    pub fn apply(&self, data: &mut AttributeCollection, source: &str) -> Result<()> {
        let values = data.scalar(source)?;
        let raw = reweight(values, self.raw.as_ref());
        let scaled = reweight(values, self.scaled.as_ref());

        data.insert_scalar(PT_WEIGHT, raw)?;
        data.insert_scalar(PT_WEIGHT_SCALED, scaled)?;
        log::info!("Computed pT weights for {} events", data.n_events());
        Ok(())
    }
}
