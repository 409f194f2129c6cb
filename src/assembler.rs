//! Dataset assembly: load, filter by parton multiplicity, merge.
//!
//! Units are read one after another. Each unit is reduced to the events
//! whose parton count equals the job's expected multiplicity; units with no
//! such event are dropped whole, so empty arrays of possibly different shape
//! never take part in the merge. Surviving units are concatenated per
//! attribute in input order.
//!
//! An empty result is reported as [`DatasetError::EmptyDataset`], which
//! callers treat as a clean early exit.

use crate::dataset::AttributeCollection;
use crate::error::{DatasetError, Result};
use crate::reader::FeatureStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Counters collected while assembling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Units read
    pub units_read: usize,
    /// Units with at least one matching event
    pub units_contributing: usize,
    /// Events across all units before filtering
    pub events_read: usize,
    /// Events kept after filtering
    pub events_kept: usize,
}

/// Merged dataset plus counters.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub data: AttributeCollection,
    pub report: AssemblyReport,
}

/// Merges feature store units into one filtered dataset.
pub struct DatasetAssembler<S: FeatureStore> {
    store: S,
    parton_count: String,
    kinematic: String,
}

impl<S: FeatureStore> DatasetAssembler<S> {
    /// `parton_count` is the filter attribute, `kinematic` the attribute
    /// whose event count decides emptiness.
    pub fn new(store: S, parton_count: &str, kinematic: &str) -> Self {
        Self {
            store,
            parton_count: parton_count.to_string(),
            kinematic: kinematic.to_string(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load every unit, keep events with `parton_count == n_partons`, merge.
    pub fn assemble(&self, files: &[PathBuf], n_partons: i64) -> Result<Assembled> {
        let target = n_partons as f64;
        let mut report = AssemblyReport::default();
        let mut parts: Vec<AttributeCollection> = Vec::new();
        let mut capacities: BTreeMap<String, ((usize, usize), PathBuf)> = BTreeMap::new();

        for path in files {
            let unit = self.store.load(path)?;
            report.units_read += 1;
            report.events_read += unit.n_events();

            let mask: Vec<bool> = unit
                .scalar(&self.parton_count)?
                .iter()
                .map(|&c| c == target)
                .collect();
            let kept = mask.iter().filter(|&&m| m).count();
            if kept == 0 {
                log::debug!(
                    "{}: no events with {} == {}, skipped",
                    path.display(),
                    self.parton_count,
                    n_partons
                );
                continue;
            }

            check_capacities(&unit, path, &mut capacities)?;
            parts.push(unit.filter(&mask)?);
            report.units_contributing += 1;
            report.events_kept += kept;
            log::debug!("{}: kept {kept} of {} events", path.display(), mask.len());
        }

        if parts.is_empty() {
            return Err(DatasetError::EmptyDataset(format!(
                "none of {} units contributed events with {} == {}",
                files.len(),
                self.parton_count,
                n_partons
            )));
        }

        let data = AttributeCollection::concat(&parts)?;
        if data.scalar(&self.kinematic)?.is_empty() {
            return Err(DatasetError::EmptyDataset(
                "nothing passed the parton filter".to_string(),
            ));
        }

        log::info!(
            "Assembled {} events from {}/{} units ({} read, {} == {})",
            report.events_kept,
            report.units_contributing,
            report.units_read,
            report.events_read,
            self.parton_count,
            n_partons
        );
        Ok(Assembled { data, report })
    }
}

/// Matrix capacities must agree across contributing units.
fn check_capacities(
    unit: &AttributeCollection,
    path: &Path,
    seen: &mut BTreeMap<String, ((usize, usize), PathBuf)>,
) -> Result<()> {
    for (name, attr) in unit.iter() {
        let Some(capacity) = attr.matrix_capacity() else {
            continue;
        };
        match seen.get(name) {
            Some((expected, first)) if *expected != capacity => {
                return Err(DatasetError::config(format!(
                    "matrix '{}' in {} has per-event shape {:?}, but {} has {:?}",
                    name,
                    path.display(),
                    capacity,
                    first.display(),
                    expected
                )));
            }
            Some(_) => {}
            None => {
                seen.insert(name.to_string(), (capacity, path.to_path_buf()));
            }
        }
    }
    Ok(())
}
