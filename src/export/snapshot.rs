//! Whole-dataset snapshot.
//!
//! When raw storage is enabled the assembled, normalized dataset is written
//! once, before reweighting, as a single `.npz` archive holding every
//! attribute under its own name.

use crate::dataset::{Attribute, AttributeCollection};
use crate::error::Result;
use ndarray_npy::NpzWriter;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Subdirectory of the scratch area holding snapshots.
pub const RAW_DIR: &str = "raw";

/// Write `<scratch>/raw/<job>.npz`.
pub fn store_raw<P: AsRef<Path>>(
    data: &AttributeCollection,
    scratch_dir: P,
    job_name: &str,
) -> Result<PathBuf> {
    let dir = scratch_dir.as_ref().join(RAW_DIR);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{job_name}.npz"));

    let mut npz = NpzWriter::new(BufWriter::new(File::create(&path)?));
    for (name, attribute) in data.iter() {
        match attribute {
            Attribute::Scalar(values) => npz.add_array(name, values)?,
            Attribute::Matrix(values) => npz.add_array(name, values)?,
        }
    }
    npz.finish()?;

    log::info!(
        "Stored raw snapshot {} ({} attributes, {} events)",
        path.display(),
        data.len(),
        data.n_events()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{FeatureStore, NpzFeatureStore};
    use ndarray::{array, Array3};
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_readable_by_store() {
        let dir = TempDir::new().unwrap();
        let mut data = AttributeCollection::new();
        data.insert_scalar("pt", array![510.0, 720.0]).unwrap();
        data.insert_matrix("pf", Array3::from_elem((2, 4, 3), 1.5)).unwrap();

        let path = store_raw(&data, dir.path(), "Top_7").unwrap();
        assert_eq!(path, dir.path().join("raw").join("Top_7.npz"));

        let store = NpzFeatureStore::new(vec!["pt".to_string()], vec!["pf".to_string()]);
        let reloaded = store.load(&path).unwrap();
        assert_eq!(reloaded, data);
    }
}
