//! Conversion configuration management.
//!
//! One explicit structure carries every setting a conversion job needs:
//! behaviour toggles, data and output paths, attribute names, the process
//! dispatch table, reweighting histograms, split fractions, the acceptance
//! window and stage-out settings. Every section has defaults, so a minimal
//! file only names the paths.
//!
//! # Example TOML
//!
//! ```toml
//! [options]
//! normalize = true
//! store_raw = false
//! infer = false
//!
//! [paths]
//! data_dir = "data/deep"
//! scratch_dir = "tmp"
//! output_dir = "/mnt/exports/deep"
//!
//! [split]
//! train = 0.7
//! test = 0.15
//!
//! [acceptance]
//! min = 450.0
//! max = 1200.0
//!
//! [stage_out]
//! command = ["cp", "-v"]
//! ```
//!
//! # Example
//!
//! ```ignore
//! use jet_dataset::config::ConvertConfig;
//!
//! let config = ConvertConfig::load_toml("configs/deep.toml")?;
//! let pipeline = ConversionPipeline::new(config, "ZpTT_med-2000_0");
//! ```

use crate::error::DatasetError;
use crate::schema::{self, ProcessTable};
use crate::splitter::{AcceptanceWindow, SplitFractions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Behaviour toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Normalize the `pf` and `sv` matrices with the stored profiles
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Write the merged (normalized) dataset as an `.npz` snapshot
    #[serde(default)]
    pub store_raw: bool,

    /// Run the attached predictor and dump its scores
    #[serde(default)]
    pub infer: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            store_raw: false,
            infer: false,
        }
    }
}

/// Input, scratch and destination locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directory holding normalization profiles and reference histograms
    pub data_dir: PathBuf,

    /// Local scratch area for split artifacts
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Stage-out destination root
    pub output_dir: PathBuf,
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("tmp")
}

impl PathConfig {
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(data_dir: P1, output_dir: P2) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            scratch_dir: default_scratch_dir(),
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn with_scratch_dir<P: AsRef<Path>>(mut self, scratch_dir: P) -> Self {
        self.scratch_dir = scratch_dir.as_ref().to_path_buf();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must be set".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err("output_dir must be set".to_string());
        }
        if self.scratch_dir.as_os_str().is_empty() {
            return Err("scratch_dir must be set".to_string());
        }
        if !self.data_dir.is_dir() {
            return Err(format!(
                "data directory does not exist: {}",
                self.data_dir.display()
            ));
        }
        Ok(())
    }
}

/// Names of the attributes read from the feature store and written out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeConfig {
    #[serde(default = "default_singletons")]
    pub singletons: Vec<String>,

    #[serde(default = "default_events")]
    pub events: Vec<String>,

    #[serde(default = "default_truth")]
    pub truth: Vec<String>,

    /// Particle-flow matrix
    #[serde(default = "default_pf")]
    pub pf: String,

    /// Secondary-vertex matrix
    #[serde(default = "default_sv")]
    pub sv: String,

    /// Parton multiplicity used for the category filter
    #[serde(default = "default_parton_count")]
    pub parton_count: String,

    /// Kinematic attribute checked for an empty dataset
    #[serde(default = "default_kinematic")]
    pub kinematic: String,

    /// Unscaled kinematic attribute used for reweighting and acceptance
    #[serde(default = "default_raw_kinematic")]
    pub raw_kinematic: String,
}

fn default_singletons() -> Vec<String> {
    schema::to_owned_list(schema::DEFAULT_SINGLETONS)
}

fn default_events() -> Vec<String> {
    schema::to_owned_list(schema::DEFAULT_EVENTS)
}

fn default_truth() -> Vec<String> {
    schema::to_owned_list(schema::DEFAULT_TRUTH)
}

fn default_pf() -> String {
    schema::PF_ATTRIBUTE.to_string()
}

fn default_sv() -> String {
    schema::SV_ATTRIBUTE.to_string()
}

fn default_parton_count() -> String {
    "nPartons".to_string()
}

fn default_kinematic() -> String {
    "pt".to_string()
}

fn default_raw_kinematic() -> String {
    "rawpt".to_string()
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            singletons: default_singletons(),
            events: default_events(),
            truth: default_truth(),
            pf: default_pf(),
            sv: default_sv(),
            parton_count: default_parton_count(),
            kinematic: default_kinematic(),
            raw_kinematic: default_raw_kinematic(),
        }
    }
}

impl AttributeConfig {
    /// Every scalar a job reads, first occurrence order, no duplicates.
    pub fn required_scalars(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let extra = [
            &self.parton_count,
            &self.kinematic,
            &self.raw_kinematic,
        ];
        for name in self
            .singletons
            .iter()
            .chain(&self.events)
            .chain(&self.truth)
            .chain(extra)
        {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pf == self.sv {
            return Err(format!("pf and sv must be distinct, both are '{}'", self.pf));
        }
        for (group, list) in [
            ("singletons", &self.singletons),
            ("events", &self.events),
            ("truth", &self.truth),
        ] {
            if list.is_empty() {
                return Err(format!("{group} attribute list is empty"));
            }
        }
        let scalars = self.required_scalars();
        if scalars.contains(&self.pf) || scalars.contains(&self.sv) {
            return Err("matrix attribute also listed as a scalar".to_string());
        }
        Ok(())
    }
}

/// Reference histograms used for pT reweighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReweightConfig {
    /// Raw-density histograms, relative to `data_dir`
    #[serde(default = "default_raw_file")]
    pub raw_file: PathBuf,

    /// Rescaled-density histograms, relative to `data_dir`
    #[serde(default = "default_scaled_file")]
    pub scaled_file: PathBuf,

    /// Job-name delimiter ending the process prefix
    #[serde(default = "default_delimiter")]
    pub prefix_delimiter: String,
}

fn default_raw_file() -> PathBuf {
    PathBuf::from("flatten.json")
}

fn default_scaled_file() -> PathBuf {
    PathBuf::from("flatten_scaled.json")
}

fn default_delimiter() -> String {
    "_".to_string()
}

impl Default for ReweightConfig {
    fn default() -> Self {
        Self {
            raw_file: default_raw_file(),
            scaled_file: default_scaled_file(),
            prefix_delimiter: default_delimiter(),
        }
    }
}

/// Split fractions plus an optional shuffle seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SplitConfig {
    #[serde(flatten)]
    pub fractions: SplitFractions,

    /// Fixed shuffle seed; process randomness when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Relocation of produced artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutConfig {
    /// External copy command; source and destination are appended.
    /// Copies in-process when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Remove the scratch directory afterwards
    #[serde(default = "default_true")]
    pub cleanup: bool,

    /// Write `<job>_stageout.json` into the destination root
    #[serde(default = "default_true")]
    pub manifest: bool,
}

impl Default for StageOutConfig {
    fn default() -> Self {
        Self {
            command: None,
            cleanup: true,
            manifest: true,
        }
    }
}

impl StageOutConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(cmd) = &self.command {
            if cmd.is_empty() || cmd[0].trim().is_empty() {
                return Err("stage_out.command must name a program".to_string());
            }
        }
        Ok(())
    }
}

/// Complete conversion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    #[serde(default)]
    pub options: PipelineOptions,

    pub paths: PathConfig,

    #[serde(default)]
    pub attributes: AttributeConfig,

    #[serde(default)]
    pub processes: ProcessTable,

    #[serde(default)]
    pub reweight: ReweightConfig,

    #[serde(default)]
    pub split: SplitConfig,

    #[serde(default)]
    pub acceptance: AcceptanceWindow,

    #[serde(default)]
    pub stage_out: StageOutConfig,
}

impl ConvertConfig {
    /// Configuration with defaults everywhere except the paths.
    pub fn new(paths: PathConfig) -> Self {
        Self {
            options: PipelineOptions::default(),
            paths,
            attributes: AttributeConfig::default(),
            processes: ProcessTable::default(),
            reweight: ReweightConfig::default(),
            split: SplitConfig::default(),
            acceptance: AcceptanceWindow::default(),
            stage_out: StageOutConfig::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_attributes(mut self, attributes: AttributeConfig) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_processes(mut self, processes: ProcessTable) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.split.seed = Some(seed);
        self
    }

    pub fn with_acceptance(mut self, acceptance: AcceptanceWindow) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn with_stage_out(mut self, stage_out: StageOutConfig) -> Self {
        self.stage_out = stage_out;
        self
    }

    /// Validate the complete configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.paths.validate().map_err(|e| format!("paths: {e}"))?;
        self.attributes
            .validate()
            .map_err(|e| format!("attributes: {e}"))?;
        self.processes
            .validate()
            .map_err(|e| format!("processes: {e}"))?;
        self.split
            .fractions
            .validate()
            .map_err(|e| format!("split: {e}"))?;
        self.acceptance
            .validate()
            .map_err(|e| format!("acceptance: {e}"))?;
        self.stage_out
            .validate()
            .map_err(|e| format!("stage_out: {e}"))?;
        Ok(())
    }

    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let contents = read_config(path.as_ref())?;
        let config: ConvertConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let contents = read_config(path.as_ref())?;
        let config: ConvertConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        fs::write(path, json_string)?;
        Ok(())
    }
}

fn read_config(path: &Path) -> crate::Result<String> {
    fs::read_to_string(path).map_err(|e| {
        DatasetError::config(format!("cannot read config {}: {e}", path.display()))
    })
}
