//! Affine normalization of feature matrices.
//!
//! Each feature group (`pf`, `sv`) has its own stored profile: one
//! `(mean, stdev)` record per matrix channel, i.e. per entry of the last
//! axis. Normalization is
//!
//! ```text
//! x[n, p, c] = (x[n, p, c] - mean[c]) / scale[c]
//! scale[c]   = stdev[c], or 1 when stdev[c] == 0
//! ```
//!
//! applied in place to every event and every object slot. Profiles are
//! produced offline from the training sample and are never shared between
//! groups.
//!
//! # Profile Format
//!
//! ```json
//! [
//!   { "mean": 0.12, "stdev": 0.31 },
//!   { "mean": -0.01, "stdev": 0.0 }
//! ]
//! ```
//!
//! Extra fields in a record are ignored.
//!
//! # Example
//!
//! ```
//! use jet_dataset::preprocessing::{ChannelStats, NormalizationProfile};
//! use ndarray::array;
//!
//! let profile = NormalizationProfile::new(vec![
//!     ChannelStats::new(1.0, 0.0),
//!     ChannelStats::new(2.0, 4.0),
//! ]);
//! let mut pf = array![[[3.0f32, 10.0]]];
//! profile.apply(&mut pf).unwrap();
//! assert_eq!(pf, array![[[2.0f32, 2.0]]]);
//! ```

use crate::dataset::AttributeCollection;
use crate::error::{DatasetError, Result};
use ndarray::{Array1, Array3, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Stored statistics of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub stdev: f64,
}

impl ChannelStats {
    pub fn new(mean: f64, stdev: f64) -> Self {
        Self { mean, stdev }
    }

    /// Divisor actually used: zero spread falls back to 1.
    #[inline]
    pub fn scale(&self) -> f64 {
        if self.stdev == 0.0 {
            1.0
        } else {
            self.stdev
        }
    }

    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale()
    }
}

/// Ordered per-channel statistics of one feature group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizationProfile {
    channels: Vec<ChannelStats>,
}

impl NormalizationProfile {
    pub fn new(channels: Vec<ChannelStats>) -> Self {
        Self { channels }
    }

    /// Load a profile stored as a JSON array of `{mean, stdev}` records.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DatasetError::config(format!(
                "cannot open normalization profile {}: {e}",
                path.display()
            ))
        })?;
        let channels: Vec<ChannelStats> = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self { channels })
    }

    pub fn channels(&self) -> &[ChannelStats] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Normalize a `[N, P, F]` matrix in place. `F` must equal the profile
    /// length.
    pub fn apply(&self, matrix: &mut Array3<f32>) -> Result<()> {
        let (_, _, n_channels) = matrix.dim();
        if n_channels != self.channels.len() {
            return Err(DatasetError::config(format!(
                "profile has {} channels, matrix has {}",
                self.channels.len(),
                n_channels
            )));
        }

        let means: Array1<f32> = self.channels.iter().map(|c| c.mean as f32).collect();
        let scales: Array1<f32> = self.channels.iter().map(|c| c.scale() as f32).collect();

        for mut lane in matrix.lanes_mut(Axis(2)) {
            Zip::from(&mut lane)
                .and(&means)
                .and(&scales)
                .for_each(|x, &mean, &scale| *x = (*x - mean) / scale);
        }
        Ok(())
    }
}

/// What happened to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationOutcome {
    /// Matrix normalized
    Applied { events: usize, channels: usize },
    /// No events; data untouched
    Skipped,
}

/// Normalizes feature groups of a dataset with per-group stored profiles.
#[derive(Debug, Clone)]
pub struct GroupNormalizer {
    data_dir: PathBuf,
    kinematic: String,
}

impl GroupNormalizer {
    /// Profiles are read from `<data_dir>/normalization_<group>.json`.
    /// `kinematic` is the scalar whose event count decides the empty guard.
    pub fn new<P: AsRef<Path>>(data_dir: P, kinematic: &str) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            kinematic: kinematic.to_string(),
        }
    }

    pub fn profile_path(&self, group: &str) -> PathBuf {
        self.data_dir.join(format!("normalization_{group}.json"))
    }

    pub fn load_profile(&self, group: &str) -> Result<NormalizationProfile> {
        NormalizationProfile::load(self.profile_path(group))
    }

    /// Normalize one group in place with a freshly loaded profile. The
    /// profile is not read when there are no events.
    pub fn normalize_group(
        &self,
        data: &mut AttributeCollection,
        group: &str,
    ) -> Result<NormalizationOutcome> {
        if self.has_no_events(data, group)? {
            return Ok(NormalizationOutcome::Skipped);
        }
        let profile = self.load_profile(group)?;
        self.normalize_with(data, group, &profile)
    }

    /// Normalize one group in place with an already loaded profile.
    pub fn normalize_with(
        &self,
        data: &mut AttributeCollection,
        group: &str,
        profile: &NormalizationProfile,
    ) -> Result<NormalizationOutcome> {
        if self.has_no_events(data, group)? {
            return Ok(NormalizationOutcome::Skipped);
        }

        let matrix = data.matrix_mut(group)?;
        profile
            .apply(matrix)
            .map_err(|e| DatasetError::config(format!("group '{group}': {e}")))?;

        let (events, _, channels) = matrix.dim();
        log::info!("Normalized '{group}': {events} events × {channels} channels");
        Ok(NormalizationOutcome::Applied { events, channels })
    }

    fn has_no_events(&self, data: &AttributeCollection, group: &str) -> Result<bool> {
        let empty = data.scalar(&self.kinematic)?.is_empty();
        if empty {
            log::debug!("Skipping normalization of '{group}': no events");
        }
        Ok(empty)
    }
}
