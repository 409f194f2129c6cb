//! In-memory attribute collection.
//!
//! A dataset is a set of named attributes sharing one leading dimension: the
//! event axis. Event `i` of every attribute is the same physical event, and
//! every operation here (filter, select, concatenation) keeps it that way.
//! Inserting an attribute whose event count disagrees with the collection is
//! rejected.

use crate::error::{DatasetError, Result};
use ndarray::{concatenate, Array1, Array3, ArrayView1, ArrayView3, Axis};
use std::collections::BTreeMap;

/// One per-event attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// One value per event
    Scalar(Array1<f64>),
    /// One fixed-shape `[P, F]` matrix per event, stored as `[N, P, F]`
    Matrix(Array3<f32>),
}

impl Attribute {
    /// Leading (event) dimension.
    pub fn n_events(&self) -> usize {
        match self {
            Attribute::Scalar(a) => a.len(),
            Attribute::Matrix(m) => m.len_of(Axis(0)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Attribute::Scalar(_) => "scalar",
            Attribute::Matrix(_) => "matrix",
        }
    }

    /// Per-event shape of a matrix attribute.
    pub fn matrix_capacity(&self) -> Option<(usize, usize)> {
        match self {
            Attribute::Scalar(_) => None,
            Attribute::Matrix(m) => {
                let (_, p, f) = m.dim();
                Some((p, f))
            }
        }
    }

    /// Events at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Attribute {
        match self {
            Attribute::Scalar(a) => Attribute::Scalar(a.select(Axis(0), indices)),
            Attribute::Matrix(m) => Attribute::Matrix(m.select(Axis(0), indices)),
        }
    }
}

/// Indices of the `true` entries of a mask.
pub fn mask_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect()
}

/// Named, event-aligned attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeCollection {
    attributes: BTreeMap<String, Attribute>,
}

impl AttributeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events (0 for a collection without attributes).
    pub fn n_events(&self) -> usize {
        self.attributes
            .values()
            .next()
            .map(Attribute::n_events)
            .unwrap_or(0)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Insert or replace an attribute, enforcing the shared event count.
    pub fn insert(&mut self, name: &str, attribute: Attribute) -> Result<()> {
        let replacing_only = self.attributes.len() == 1 && self.attributes.contains_key(name);
        if !self.attributes.is_empty() && !replacing_only {
            let expected = self.n_events();
            if attribute.n_events() != expected {
                return Err(DatasetError::Alignment(format!(
                    "attribute '{}' has {} events, dataset has {}",
                    name,
                    attribute.n_events(),
                    expected
                )));
            }
        }
        self.attributes.insert(name.to_string(), attribute);
        Ok(())
    }

    pub fn insert_scalar(&mut self, name: &str, values: Array1<f64>) -> Result<()> {
        self.insert(name, Attribute::Scalar(values))
    }

    pub fn insert_matrix(&mut self, name: &str, values: Array3<f32>) -> Result<()> {
        self.insert(name, Attribute::Matrix(values))
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.attributes.remove(name)
    }

    /// Scalar attribute by name.
    pub fn scalar(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        match self.attributes.get(name) {
            Some(Attribute::Scalar(a)) => Ok(a.view()),
            Some(other) => Err(DatasetError::config(format!(
                "attribute '{name}' is a {}, expected a scalar",
                other.kind()
            ))),
            None => Err(absent(name)),
        }
    }

    /// Matrix attribute by name.
    pub fn matrix(&self, name: &str) -> Result<ArrayView3<'_, f32>> {
        match self.attributes.get(name) {
            Some(Attribute::Matrix(m)) => Ok(m.view()),
            Some(other) => Err(DatasetError::config(format!(
                "attribute '{name}' is a {}, expected a matrix",
                other.kind()
            ))),
            None => Err(absent(name)),
        }
    }

    /// Mutable matrix attribute by name. The event axis cannot change
    /// through this handle, so alignment holds.
    pub fn matrix_mut(&mut self, name: &str) -> Result<&mut Array3<f32>> {
        match self.attributes.get_mut(name) {
            Some(Attribute::Matrix(m)) => Ok(m),
            Some(other) => Err(DatasetError::config(format!(
                "attribute '{name}' is a {}, expected a matrix",
                other.kind()
            ))),
            None => Err(absent(name)),
        }
    }

    /// Verify that every attribute has the same event count.
    pub fn check_alignment(&self) -> Result<usize> {
        let n = self.n_events();
        for (name, attr) in &self.attributes {
            if attr.n_events() != n {
                return Err(DatasetError::Alignment(format!(
                    "attribute '{}' has {} events, expected {}",
                    name,
                    attr.n_events(),
                    n
                )));
            }
        }
        Ok(n)
    }

    /// Keep the events where `mask` is true, across every attribute.
    pub fn filter(&self, mask: &[bool]) -> Result<Self> {
        if !self.is_empty() && mask.len() != self.n_events() {
            return Err(DatasetError::Alignment(format!(
                "mask has {} entries, dataset has {} events",
                mask.len(),
                self.n_events()
            )));
        }
        self.select(&mask_indices(mask))
    }

    /// Events at `indices`, in that order, across every attribute.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let n = self.n_events();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(DatasetError::Alignment(format!(
                "index {bad} out of range for {n} events"
            )));
        }
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.select(indices)))
            .collect();
        Ok(Self { attributes })
    }

    /// Concatenate collections along the event axis, preserving input order.
    ///
    /// Every part must carry the same attribute names with the same kinds, and
    /// matrix attributes must share their per-event capacity.
    pub fn concat(parts: &[AttributeCollection]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Ok(Self::new());
        };

        let mut attributes = BTreeMap::new();
        for (name, attr) in &first.attributes {
            let merged = match attr {
                Attribute::Scalar(_) => {
                    let mut views = Vec::with_capacity(parts.len());
                    for part in parts {
                        views.push(part.scalar(name).map_err(|_| mismatch(name))?);
                    }
                    Attribute::Scalar(concatenate(Axis(0), &views)?)
                }
                Attribute::Matrix(_) => {
                    let capacity = attr.matrix_capacity();
                    let mut views = Vec::with_capacity(parts.len());
                    for part in parts {
                        let view = part.matrix(name).map_err(|_| mismatch(name))?;
                        let (_, p, f) = view.dim();
                        if Some((p, f)) != capacity {
                            return Err(DatasetError::config(format!(
                                "matrix '{name}' capacity {:?} disagrees with {:?}",
                                (p, f),
                                capacity.unwrap_or_default()
                            )));
                        }
                        views.push(view);
                    }
                    Attribute::Matrix(concatenate(Axis(0), &views)?)
                }
            };
            attributes.insert(name.clone(), merged);
        }

        if let Some(extra) = parts
            .iter()
            .flat_map(|p| p.names())
            .find(|n| !first.contains(n))
        {
            return Err(mismatch(extra));
        }

        let merged = Self { attributes };
        merged.check_alignment()?;
        Ok(merged)
    }
}

fn absent(name: &str) -> DatasetError {
    DatasetError::config(format!("attribute '{name}' not present in dataset"))
}

fn mismatch(name: &str) -> DatasetError {
    DatasetError::Alignment(format!(
        "attribute '{name}' is not present with the same kind in every unit"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn sample(n: usize, offset: f64) -> AttributeCollection {
        let mut c = AttributeCollection::new();
        c.insert_scalar("pt", Array1::from_iter((0..n).map(|i| offset + i as f64)))
            .unwrap();
        c.insert_matrix(
            "pf",
            Array3::from_shape_fn((n, 2, 3), |(i, j, k)| (offset + i as f64) as f32 + (j * 3 + k) as f32 * 0.1),
        )
        .unwrap();
        c
    }

    #[test]
    fn test_insert_rejects_misaligned() {
        let mut c = sample(4, 0.0);
        let err = c.insert_scalar("eta", array![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, DatasetError::Alignment(_)));
        // Replacing the only attribute may change length.
        let mut single = AttributeCollection::new();
        single.insert_scalar("pt", array![1.0]).unwrap();
        single.insert_scalar("pt", array![1.0, 2.0]).unwrap();
        assert_eq!(single.n_events(), 2);
    }

    #[test]
    fn test_filter_keeps_rows_together() {
        let c = sample(5, 0.0);
        let filtered = c.filter(&[true, false, true, false, true]).unwrap();
        assert_eq!(filtered.n_events(), 3);
        assert_eq!(filtered.scalar("pt").unwrap().to_vec(), vec![0.0, 2.0, 4.0]);
        let pf = filtered.matrix("pf").unwrap();
        assert_eq!(pf[[1, 0, 0]], 2.0);
        assert_eq!(pf[[2, 0, 0]], 4.0);
    }

    #[test]
    fn test_filter_mask_length_checked() {
        let c = sample(3, 0.0);
        assert!(c.filter(&[true]).is_err());
    }

    #[test]
    fn test_select_reorders_all_attributes() {
        let c = sample(4, 10.0);
        let s = c.select(&[3, 0]).unwrap();
        assert_eq!(s.scalar("pt").unwrap().to_vec(), vec![13.0, 10.0]);
        assert_eq!(s.matrix("pf").unwrap()[[0, 0, 0]], 13.0);
        assert!(c.select(&[4]).is_err());
    }

    #[test]
    fn test_concat_preserves_order() {
        let merged = AttributeCollection::concat(&[sample(2, 0.0), sample(3, 100.0)]).unwrap();
        assert_eq!(merged.n_events(), 5);
        assert_eq!(
            merged.scalar("pt").unwrap().to_vec(),
            vec![0.0, 1.0, 100.0, 101.0, 102.0]
        );
        assert_eq!(merged.check_alignment().unwrap(), 5);
    }

    #[test]
    fn test_concat_rejects_heterogeneous_sets() {
        let mut other = sample(2, 0.0);
        other.insert_scalar("eta", array![0.1, 0.2]).unwrap();
        assert!(AttributeCollection::concat(&[sample(2, 0.0), other.clone()]).is_err());
        assert!(AttributeCollection::concat(&[other, sample(2, 0.0)]).is_err());
    }

    #[test]
    fn test_concat_rejects_capacity_mismatch() {
        let mut other = AttributeCollection::new();
        other.insert_scalar("pt", array![1.0]).unwrap();
        other.insert_matrix("pf", Array3::zeros((1, 4, 3))).unwrap();
        let err = AttributeCollection::concat(&[sample(2, 0.0), other]).unwrap_err();
        assert!(matches!(err, DatasetError::Config(_)));
    }

    #[test]
    fn test_kind_mismatch() {
        let c = sample(2, 0.0);
        assert!(c.matrix("pt").is_err());
        assert!(c.scalar("pf").is_err());
        assert!(c.scalar("nope").is_err());
    }
}
