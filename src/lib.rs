//! Jet Dataset
//!
//! Converts per-job feature store units of reconstructed jets into
//! train/test/validate NumPy datasets for tagger training.
//!
//! # Overview
//!
//! A conversion job reads a list of `.npz` units, keeps the events whose
//! parton multiplicity matches the job's physics process, merges them into
//! one in-memory dataset, normalizes the particle-flow and secondary-vertex
//! matrices, attaches pT weights from reference histograms, and writes a
//! random split of the events inside the pT acceptance window as one `.npy`
//! file per attribute group. The files are finally relocated from scratch
//! to the output directory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Jet Dataset                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  schema/        - Attribute groups and process dispatch table   │
//! │  reader         - .npz feature store units                      │
//! │  assembler      - Parton filter and merge across units          │
//! │  preprocessing/ - Group normalization and pT reweighting        │
//! │  splitter       - Acceptance window and random splits           │
//! │  export/        - Per-split .npy dumps and raw snapshot         │
//! │  stage_out      - Relocation to final storage                   │
//! │  pipeline       - End-to-end conversion job                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use jet_dataset::{ConversionPipeline, ConvertConfig};
//!
//! let config = ConvertConfig::load_toml("convert.toml")?;
//! let outcome = ConversionPipeline::new(config, "Higgs_ggH_4")?.run("inputs.txt")?;
//! println!("exit code {}", outcome.exit_code());
//! ```

pub mod assembler;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod inference;
pub mod pipeline;
pub mod preprocessing;
pub mod reader;
pub mod schema;
pub mod splitter;
pub mod stage_out;
pub mod validation;

// Re-exports - Errors
pub use error::{DatasetError, Result};

// Re-exports - Schema
pub use schema::{AttributeGroup, GroupLayout, ProcessCategory, ProcessTable};

// Re-exports - Config
pub use config::{
    AttributeConfig, ConvertConfig, PathConfig, PipelineOptions, ReweightConfig, SplitConfig,
    StageOutConfig,
};

// Re-exports - Data
pub use dataset::{Attribute, AttributeCollection};
pub use reader::{read_input_list, FeatureStore, NpzFeatureStore};
pub use assembler::{Assembled, AssemblyReport, DatasetAssembler};

// Re-exports - Preprocessing
pub use preprocessing::{
    BinnedHistogram, ChannelStats, DensityLookup, GroupNormalizer, HistogramSet,
    NormalizationProfile, PtReweighter,
};

// Re-exports - Splitting and export
pub use export::{store_raw, Dumper};
pub use splitter::{AcceptanceWindow, Split, SplitFractions, SplitIndices, Splitter};

// Re-exports - Inference
pub use inference::{run_inference, Predictor, ScoreColumns};

// Re-exports - Stage-out
pub use stage_out::{ArtifactCopier, CommandCopier, LocalCopier, StageOut, StageOutReport};

// Re-exports - Validation
pub use validation::{DatasetValidator, Finding, Severity, ValidationConfig, ValidationResult};

// Re-exports - Pipeline
pub use pipeline::{ConversionOutcome, ConversionPipeline, ConversionSummary};
