//! Event-level preprocessing applied to the merged dataset.
//!
//! - **Normalization**: affine scaling of the `pf`/`sv` feature matrices with
//!   stored per-channel profiles
//! - **Reweighting**: per-event weights from reference pT densities
//!
//! # Example
//!
//! ```ignore
//! use jet_dataset::preprocessing::{GroupNormalizer, PtReweighter};
//!
//! let normalizer = GroupNormalizer::new(&config.paths.data_dir, "pt");
//! normalizer.normalize_group(&mut data, "pf")?;
//! normalizer.normalize_group(&mut data, "sv")?;
//!
//! let reweighter = PtReweighter::from_files(&config.paths.data_dir, &config.reweight, job)?;
//! reweighter.apply(&mut data, "rawpt")?;
//! ```

pub mod normalization;
pub mod reweight;

pub use normalization::{ChannelStats, GroupNormalizer, NormalizationOutcome, NormalizationProfile};
pub use reweight::{reweight, BinnedHistogram, DensityLookup, HistogramSet, PtReweighter};
