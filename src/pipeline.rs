//! Conversion Pipeline
//!
//! Turns a list of feature store units into split training artifacts for
//! one job.
//!
//! # Architecture
//!
//! ```text
//! input list → NpzFeatureStore → DatasetAssembler (parton filter, merge)
//!                                        ↓
//!                                 DatasetValidator
//!                                        ↓
//!                       GroupNormalizer (pf, sv)  [options.normalize]
//!                                        ↓
//!                            store_raw snapshot     [options.store_raw]
//!                                        ↓
//!                            Predictor scores      [options.infer]
//!                                        ↓
//!                        PtReweighter (ptweight, ptweight_scaled)
//!                                        ↓
//!                    Splitter (acceptance window, shuffle, fractions)
//!                                        ↓
//!                     Dumper (<scratch>/<split>/<job>_<group>.npy)
//!                                        ↓
//!                         StageOut (→ <output>/<split>/…)
//! ```
//!
//! Normalization profiles and reference histograms are loaded before the
//! first unit is read.
//!
//! Everything runs on one thread over one in-memory dataset. The first
//! unrecoverable error aborts the run. An empty dataset, either after the
//! parton filter or after the acceptance window, ends the run early with
//! [`ConversionOutcome::Empty`] and nothing is staged out.
//!
//! # Example
//!
//! ```ignore
//! use jet_dataset::config::{ConvertConfig, PathConfig};
//! use jet_dataset::pipeline::ConversionPipeline;
//!
//! let config = ConvertConfig::new(PathConfig::new("data/deep", "/store/npy"));
//! let pipeline = ConversionPipeline::new(config, "ZpTT_med-2000_3")?;
//! let outcome = pipeline.run("inputs.txt")?;
//! std::process::exit(outcome.exit_code());
//! ```

use crate::assembler::{AssemblyReport, DatasetAssembler};
use crate::config::ConvertConfig;
use crate::dataset::AttributeCollection;
use crate::error::{DatasetError, Result};
use crate::export::{store_raw, Dumper};
use crate::inference::{run_inference, Predictor, ScoreColumns};
use crate::preprocessing::{GroupNormalizer, PtReweighter};
use crate::reader::{read_input_list, FeatureStore, NpzFeatureStore};
use crate::splitter::{Split, SplitIndices, Splitter};
use crate::stage_out::{StageOut, StageOutReport};
use crate::validation::{DatasetValidator, ValidationConfig};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct ConversionSummary {
    pub job_name: String,
    /// Parton multiplicity the job kept
    pub n_partons: i64,
    pub assembly: AssemblyReport,
    /// Events inside the acceptance window
    pub events_accepted: usize,
    pub train: usize,
    pub test: usize,
    pub validate: usize,
    pub snapshot: Option<PathBuf>,
    pub stage_out: StageOutReport,
}

impl ConversionSummary {
    pub fn split_size(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train,
            Split::Test => self.test,
            Split::Validate => self.validate,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    Completed(ConversionSummary),
    /// Nothing to write; the reason is logged.
    Empty(String),
}

impl ConversionOutcome {
    /// 0 for an empty run, otherwise the worst stage-out status.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConversionOutcome::Completed(summary) => summary.stage_out.worst_status,
            ConversionOutcome::Empty(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ConversionOutcome::Empty(_))
    }

    pub fn summary(&self) -> Option<&ConversionSummary> {
        match self {
            ConversionOutcome::Completed(summary) => Some(summary),
            ConversionOutcome::Empty(_) => None,
        }
    }
}

/// Logs the elapsed time of each stage.
struct StageTimer {
    start: Instant,
    last: Instant,
}

impl StageTimer {
    fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now }
    }

    fn lap(&mut self, stage: &str) {
        let now = Instant::now();
        log::info!(
            "[{stage}] {:.2?} (total {:.2?})",
            now - self.last,
            now - self.start
        );
        self.last = now;
    }
}

/// Orchestrates one conversion job.
pub struct ConversionPipeline<S: FeatureStore = NpzFeatureStore> {
    config: ConvertConfig,
    job_name: String,
    store: S,
    predictor: Option<Box<dyn Predictor>>,
    score_columns: ScoreColumns,
}

impl ConversionPipeline<NpzFeatureStore> {
    /// Validates `config` and reads units with an [`NpzFeatureStore`].
    pub fn new(config: ConvertConfig, job_name: &str) -> Result<Self> {
        config.validate().map_err(DatasetError::Config)?;
        if job_name.is_empty() {
            return Err(DatasetError::config("job name must not be empty"));
        }
        let store = NpzFeatureStore::from_config(&config.attributes);
        Ok(Self {
            config,
            job_name: job_name.to_string(),
            store,
            predictor: None,
            score_columns: ScoreColumns::default(),
        })
    }
}

impl<S: FeatureStore> ConversionPipeline<S> {
    /// Replace the unit reader.
    pub fn with_store<T: FeatureStore>(self, store: T) -> ConversionPipeline<T> {
        ConversionPipeline {
            config: self.config,
            job_name: self.job_name,
            store,
            predictor: self.predictor,
            score_columns: self.score_columns,
        }
    }

    pub fn with_predictor(mut self, predictor: Box<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn with_score_columns(mut self, columns: ScoreColumns) -> Self {
        self.score_columns = columns;
        self
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Run on the units named in a newline-separated list file.
    pub fn run<P: AsRef<Path>>(&self, input_list: P) -> Result<ConversionOutcome> {
        let files = read_input_list(input_list)?;
        self.run_files(&files)
    }

    /// Run on an explicit, ordered list of units.
    pub fn run_files(&self, files: &[PathBuf]) -> Result<ConversionOutcome> {
        if self.config.options.infer && self.predictor.is_none() {
            return Err(DatasetError::config(
                "inference enabled but no predictor was provided",
            ));
        }

        let mut timer = StageTimer::new();
        let attrs = &self.config.attributes;
        let paths = &self.config.paths;
        let n_partons = self.config.processes.multiplicity(&self.job_name);
        log::info!(
            "Job {}: {} input units, keeping {} == {}",
            self.job_name,
            files.len(),
            attrs.parton_count,
            n_partons
        );

        // Reference data is read before any unit so configuration errors
        // abort with nothing written.
        let reweighter =
            PtReweighter::from_files(&paths.data_dir, &self.config.reweight, &self.job_name)?;
        let normalizer = GroupNormalizer::new(&paths.data_dir, &attrs.kinematic);
        let profiles = if self.config.options.normalize {
            vec![
                (attrs.pf.as_str(), normalizer.load_profile(&attrs.pf)?),
                (attrs.sv.as_str(), normalizer.load_profile(&attrs.sv)?),
            ]
        } else {
            Vec::new()
        };
        timer.lap("setup");

        // Load + filter
        let assembler = DatasetAssembler::new(&self.store, &attrs.parton_count, &attrs.kinematic);
        let assembled = match assembler.assemble(files, n_partons) {
            Ok(assembled) => assembled,
            Err(DatasetError::EmptyDataset(reason)) => return Ok(self.empty(reason)),
            Err(e) => return Err(e),
        };
        let mut data = assembled.data;
        timer.lap("load");

        self.validate(&data)?;

        if !profiles.is_empty() {
            for (group, profile) in &profiles {
                normalizer.normalize_with(&mut data, group, profile)?;
            }
            timer.lap("normalize");
        }

        let snapshot = if self.config.options.store_raw {
            let path = store_raw(&data, &paths.scratch_dir, &self.job_name)?;
            timer.lap("store raw");
            Some(path)
        } else {
            None
        };

        if let Some(predictor) = self.predictor.as_deref() {
            if self.config.options.infer {
                run_inference(predictor, &mut data, self.score_columns)?;
                timer.lap("inference");
            }
        }

        reweighter.apply(&mut data, &attrs.raw_kinematic)?;
        timer.lap("reweight");

        let indices = self.splitter().split(data.scalar(&attrs.raw_kinematic)?);
        timer.lap("split");
        if indices.is_empty() {
            if let Some(path) = snapshot.as_ref().filter(|_| self.config.stage_out.cleanup) {
                StageOut::from_config(paths, &self.config.stage_out)
                    .cleanup_scratch(std::slice::from_ref(path));
            }
            return Ok(self.empty(format!(
                "no events with {} in {}",
                attrs.raw_kinematic,
                self.config.acceptance
            )));
        }

        let mut artifacts = self.dump(&indices, &data)?;
        artifacts.extend(snapshot.iter().cloned());
        timer.lap("dump");

        let report = StageOut::from_config(paths, &self.config.stage_out).run(&artifacts);
        if self.config.stage_out.manifest {
            let manifest = paths.output_dir.join(format!("{}_stageout.json", self.job_name));
            report.save_json(&manifest)?;
            log::debug!("Wrote manifest {}", manifest.display());
        }
        timer.lap("stage out");

        Ok(ConversionOutcome::Completed(ConversionSummary {
            job_name: self.job_name.clone(),
            n_partons,
            assembly: assembled.report,
            events_accepted: indices.total(),
            train: indices.train.len(),
            test: indices.test.len(),
            validate: indices.validate.len(),
            snapshot,
            stage_out: report,
        }))
    }

    fn empty(&self, reason: String) -> ConversionOutcome {
        log::info!("Job {}: empty dataset ({reason}), nothing to write", self.job_name);
        ConversionOutcome::Empty(reason)
    }

    fn validate(&self, data: &AttributeCollection) -> Result<()> {
        let attrs = &self.config.attributes;
        let mut required = attrs.required_scalars();
        required.push(attrs.pf.clone());
        required.push(attrs.sv.clone());

        let validator = DatasetValidator::with_config(ValidationConfig {
            required_attributes: required,
            parton_count: Some(attrs.parton_count.clone()),
            check_nan_inf: true,
        });
        let result = validator.validate(data);
        for warning in result.warnings() {
            log::warn!("{warning}");
        }
        if result.has_errors() {
            return Err(DatasetError::Alignment(result.errors().join("; ")));
        }
        log::debug!("{result}");
        Ok(())
    }

    fn splitter(&self) -> Splitter {
        let splitter = Splitter::new(self.config.split.fractions, self.config.acceptance);
        match self.config.split.seed {
            Some(seed) => splitter.with_seed(seed),
            None => splitter,
        }
    }

    fn dump(&self, indices: &SplitIndices, data: &AttributeCollection) -> Result<Vec<PathBuf>> {
        let dumper = Dumper::new(
            &self.config.paths.scratch_dir,
            &self.job_name,
            &self.config.attributes,
        );
        let mut artifacts = Vec::new();
        for (split, idx) in indices.iter() {
            artifacts.extend(dumper.dump(split, idx, data)?);
        }
        Ok(artifacts)
    }
}
