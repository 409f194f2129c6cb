//! Feature store reader.
//!
//! A feature store unit is one `.npz` archive holding the per-event arrays
//! of a reconstruction job: one 1-D array per singleton branch and one 3-D
//! array per object collection (`pf`, `sv`). Archives may be stored or
//! deflate-compressed (`numpy.savez_compressed`). The reader returns only
//! the configured attributes, checked for a shared event axis.

use crate::config::AttributeConfig;
use crate::dataset::AttributeCollection;
use crate::error::{DatasetError, Result};
use ndarray::{Array1, Array3, Ix1, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, ReadNpzError};
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

/// Source of feature store units.
pub trait FeatureStore {
    /// Load one unit. Any failure is fatal for the run.
    fn load(&self, path: &Path) -> Result<AttributeCollection>;
}

impl<T: FeatureStore + ?Sized> FeatureStore for &T {
    fn load(&self, path: &Path) -> Result<AttributeCollection> {
        (**self).load(path)
    }
}

/// Reads `.npz` feature store units.
#[derive(Debug, Clone)]
pub struct NpzFeatureStore {
    scalars: Vec<String>,
    matrices: Vec<String>,
}

impl NpzFeatureStore {
    /// Reader for an explicit list of scalar and matrix attributes.
    pub fn new(scalars: Vec<String>, matrices: Vec<String>) -> Self {
        Self { scalars, matrices }
    }

    /// Reader for every attribute a conversion job touches.
    pub fn from_config(attributes: &AttributeConfig) -> Self {
        Self::new(
            attributes.required_scalars(),
            vec![attributes.pf.clone(), attributes.sv.clone()],
        )
    }

    pub fn scalars(&self) -> &[String] {
        &self.scalars
    }

    pub fn matrices(&self) -> &[String] {
        &self.matrices
    }
}

impl FeatureStore for NpzFeatureStore {
    fn load(&self, path: &Path) -> Result<AttributeCollection> {
        let file = File::open(path).map_err(|source| DatasetError::UnitOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let read_err = |source| DatasetError::UnitRead {
            path: path.to_path_buf(),
            source,
        };

        let mut npz = NpzReader::new(file).map_err(read_err)?;
        let entries = npz.names().map_err(read_err)?;

        let mut collection = AttributeCollection::new();
        for name in &self.scalars {
            let entry = resolve_entry(&entries, name, path)?;
            let values = read_scalar(&mut npz, &entry).map_err(read_err)?;
            collection
                .insert_scalar(name, values)
                .map_err(|e| in_unit(e, path))?;
        }
        for name in &self.matrices {
            let entry = resolve_entry(&entries, name, path)?;
            let values = read_matrix(&mut npz, &entry).map_err(read_err)?;
            collection
                .insert_matrix(name, values)
                .map_err(|e| in_unit(e, path))?;
        }

        log::debug!(
            "Read {} events × {} attributes from {}",
            collection.n_events(),
            collection.len(),
            path.display()
        );
        Ok(collection)
    }
}

/// Read an input list: one unit path per line, blank lines ignored.
pub fn read_input_list<P: AsRef<Path>>(list: P) -> Result<Vec<PathBuf>> {
    let list = list.as_ref();
    let contents = fs::read_to_string(list).map_err(|e| {
        DatasetError::config(format!("cannot read input list {}: {e}", list.display()))
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// `.npz` entries are stored with or without the `.npy` suffix.
fn resolve_entry(entries: &[String], name: &str, path: &Path) -> Result<String> {
    let suffixed = format!("{name}.npy");
    entries
        .iter()
        .find(|e| e.as_str() == name || **e == suffixed)
        .cloned()
        .ok_or_else(|| DatasetError::MissingAttribute {
            path: path.to_path_buf(),
            name: name.to_string(),
        })
}

fn in_unit(err: DatasetError, path: &Path) -> DatasetError {
    match err {
        DatasetError::Alignment(msg) => {
            DatasetError::Alignment(format!("{}: {msg}", path.display()))
        }
        other => other,
    }
}

/// Read a 1-D array of any numeric or boolean dtype, widened to `f64`.
fn read_scalar<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    entry: &str,
) -> std::result::Result<Array1<f64>, ReadNpzError> {
    let first_err = match npz.by_name::<OwnedRepr<f64>, Ix1>(entry) {
        Ok(a) => return Ok(a),
        Err(e) => e,
    };

    macro_rules! widen {
        ($($t:ty),*) => {
            $(
                if let Ok(a) = npz.by_name::<OwnedRepr<$t>, Ix1>(entry) {
                    return Ok(a.mapv(|v| v as f64));
                }
            )*
        };
    }
    widen!(f32, i64, i32, i16, i8, u64, u32, u16, u8);

    if let Ok(a) = npz.by_name::<OwnedRepr<bool>, Ix1>(entry) {
        return Ok(a.mapv(|b| if b { 1.0 } else { 0.0 }));
    }
    Err(first_err)
}

/// Read a 3-D `[N, P, F]` array stored as `f32` or `f64`.
fn read_matrix<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    entry: &str,
) -> std::result::Result<Array3<f32>, ReadNpzError> {
    match npz.by_name::<OwnedRepr<f32>, Ix3>(entry) {
        Ok(a) => Ok(a),
        Err(e) => match npz.by_name::<OwnedRepr<f64>, Ix3>(entry) {
            Ok(a) => Ok(a.mapv(|v| v as f32)),
            Err(_) => Err(e),
        },
    }
}
