//! Optional classifier inference.
//!
//! The classifier itself is not part of this crate: callers inject a
//! [`Predictor`]. Its `[N, K]` output is reduced to the two tagger scores
//! (`dnn_higgs`, `dnn_top`), which are stored as event-aligned scalar
//! attributes and later dumped as the `dnn` group.

use crate::dataset::AttributeCollection;
use crate::error::{DatasetError, Result};
use crate::schema::DNN_OUTPUTS;
use ndarray::{Array2, Axis};

/// Scores events of a normalized dataset.
pub trait Predictor {
    /// One row per event.
    fn predict(&self, data: &AttributeCollection) -> Result<Array2<f32>>;
}

impl<F> Predictor for F
where
    F: Fn(&AttributeCollection) -> Result<Array2<f32>>,
{
    fn predict(&self, data: &AttributeCollection) -> Result<Array2<f32>> {
        self(data)
    }
}

/// Output columns holding the higgs and top scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreColumns {
    pub higgs: usize,
    pub top: usize,
}

impl Default for ScoreColumns {
    /// A four-class model (qcd, w, higgs, top).
    fn default() -> Self {
        Self { higgs: 2, top: 3 }
    }
}

impl ScoreColumns {
    pub fn new(higgs: usize, top: usize) -> Self {
        Self { higgs, top }
    }
}

/// Run `predictor` and store its scores as `dnn_higgs` / `dnn_top`.
pub fn run_inference(
    predictor: &dyn Predictor,
    data: &mut AttributeCollection,
    columns: ScoreColumns,
) -> Result<usize> {
    let n_events = data.n_events();
    let scores = predictor.predict(data)?;
    let (rows, cols) = scores.dim();

    if rows != n_events {
        return Err(DatasetError::Inference(format!(
            "predictor returned {rows} rows for {n_events} events"
        )));
    }
    let needed = columns.higgs.max(columns.top) + 1;
    if cols < needed {
        return Err(DatasetError::Inference(format!(
            "predictor returned {cols} columns, need at least {needed}"
        )));
    }

    for (name, column) in DNN_OUTPUTS.iter().zip([columns.higgs, columns.top]) {
        let values = scores.index_axis(Axis(1), column).mapv(f64::from);
        data.insert_scalar(name, values)?;
    }

    log::info!("Inferred {rows} events ({cols} model outputs)");
    Ok(rows)
}
