//! Data Export Module
//!
//! Writes each split of the dataset as one NumPy file per attribute group.
//!
//! # Layout
//!
//! ```text
//! <scratch>/<split>/<job>_<group>.npy
//! ```
//!
//! | Group | Array |
//! |-------|-------|
//! | `singletons`, `events`, `truth`, `dnn` | `[N, k]` f64, columns in declared order |
//! | `ptweight`, `ptweight_scaled` | `[N]` f64 |
//! | `pf`, `sv` | `[N, P, F]` f32 |
//!
//! Row `i` of every file of a split is the same event. `dnn` is only written
//! when the classifier outputs are present.
//!
//! # Modules
//!
//! - **snapshot**: whole-dataset `.npz` snapshot taken before reweighting

pub mod snapshot;

pub use snapshot::{store_raw, RAW_DIR};

use crate::config::AttributeConfig;
use crate::dataset::AttributeCollection;
use crate::error::{DatasetError, Result};
use crate::schema::{AttributeGroup, GroupLayout, DNN_OUTPUTS, PT_WEIGHT, PT_WEIGHT_SCALED};
use crate::splitter::Split;
use ndarray::{Array2, Axis};
use ndarray_npy::WriteNpyExt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One output group and the attributes it is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub group: AttributeGroup,
    pub members: Vec<String>,
    /// Skip the group instead of failing when a member is missing
    pub optional: bool,
}

/// Writes per-split, per-group `.npy` files under the scratch directory.
#[derive(Debug, Clone)]
pub struct Dumper {
    scratch_dir: PathBuf,
    job_name: String,
    groups: Vec<GroupSpec>,
}

impl Dumper {
    /// Standard groups from `attributes`, plus the optional `dnn` group.
    pub fn new<P: AsRef<Path>>(scratch_dir: P, job_name: &str, attributes: &AttributeConfig) -> Self {
        let groups = AttributeGroup::STANDARD
            .iter()
            .chain(std::iter::once(&AttributeGroup::Dnn))
            .map(|&group| {
                let members = match group {
                    AttributeGroup::Singletons => attributes.singletons.clone(),
                    AttributeGroup::Events => attributes.events.clone(),
                    AttributeGroup::Truth => attributes.truth.clone(),
                    AttributeGroup::Pf => vec![attributes.pf.clone()],
                    AttributeGroup::Sv => vec![attributes.sv.clone()],
                    AttributeGroup::Ptweight => vec![PT_WEIGHT.to_string()],
                    AttributeGroup::PtweightScaled => vec![PT_WEIGHT_SCALED.to_string()],
                    AttributeGroup::Dnn => DNN_OUTPUTS.iter().map(|s| s.to_string()).collect(),
                };
                GroupSpec {
                    group,
                    members,
                    optional: group == AttributeGroup::Dnn,
                }
            })
            .collect();

        Self {
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
            job_name: job_name.to_string(),
            groups,
        }
    }

    pub fn groups(&self) -> &[GroupSpec] {
        &self.groups
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// `<scratch>/<split>/<job>_<group>.npy`
    pub fn output_path(&self, split: Split, group: AttributeGroup) -> PathBuf {
        self.scratch_dir
            .join(split.name())
            .join(format!("{}_{}.npy", self.job_name, group.name()))
    }

    /// Write every group of one split. Returns the files written, in group
    /// order.
    pub fn dump(
        &self,
        split: Split,
        indices: &[usize],
        data: &AttributeCollection,
    ) -> Result<Vec<PathBuf>> {
        let n_events = data.n_events();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n_events) {
            return Err(DatasetError::Alignment(format!(
                "{split} index {bad} out of range for {n_events} events"
            )));
        }

        fs::create_dir_all(self.scratch_dir.join(split.name()))?;

        let mut written = Vec::with_capacity(self.groups.len());
        for entry in &self.groups {
            if entry.optional && !entry.members.iter().all(|m| data.contains(m)) {
                log::debug!("{split}: no '{}' attributes, group not written", entry.group);
                continue;
            }

            let path = self.output_path(split, entry.group);
            self.write_group(entry, indices, data, &path)?;
            written.push(path);
        }

        log::info!(
            "Dumped {split}: {} events into {} files",
            indices.len(),
            written.len()
        );
        Ok(written)
    }

    fn write_group(
        &self,
        entry: &GroupSpec,
        indices: &[usize],
        data: &AttributeCollection,
        path: &Path,
    ) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);

        match entry.group.layout() {
            GroupLayout::StackedScalars => {
                let stacked = stack_columns(data, &entry.members, indices)?;
                stacked.write_npy(&mut writer)?;
            }
            GroupLayout::Scalar => {
                let name = single_member(entry)?;
                data.scalar(name)?
                    .select(Axis(0), indices)
                    .write_npy(&mut writer)?;
            }
            GroupLayout::Matrix => {
                let name = single_member(entry)?;
                data.matrix(name)?
                    .select(Axis(0), indices)
                    .write_npy(&mut writer)?;
            }
        }
        writer.flush()?;

        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}

fn single_member(entry: &GroupSpec) -> Result<&str> {
    match entry.members.as_slice() {
        [name] => Ok(name.as_str()),
        other => Err(DatasetError::config(format!(
            "group '{}' needs exactly one attribute, got {}",
            entry.group,
            other.len()
        ))),
    }
}

/// `[indices.len(), names.len()]` array, column `j` taken from `names[j]`.
/// An index past the event count is an alignment error.
pub fn stack_columns(
    data: &AttributeCollection,
    names: &[String],
    indices: &[usize],
) -> Result<Array2<f64>> {
    let mut out = Array2::<f64>::zeros((indices.len(), names.len()));
    for (j, name) in names.iter().enumerate() {
        let column = data.scalar(name)?;
        for (row, &i) in indices.iter().enumerate() {
            out[[row, j]] = *column.get(i).ok_or_else(|| {
                DatasetError::Alignment(format!(
                    "index {i} out of range for '{name}' with {} events",
                    column.len()
                ))
            })?;
        }
    }
    Ok(out)
}
