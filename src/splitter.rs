//! Train/test/validation partitioning.
//!
//! Events are first restricted to a kinematic acceptance window, then the
//! surviving indices are shuffled and cut by fixed fractions:
//!
//! ```text
//! accepted = { i : min < x[i] < max }
//! shuffle(accepted)
//! train    = accepted[0 .. floor(N * f_train)]
//! test     = accepted[.. + floor(N * f_test)]
//! validate = remainder
//! ```
//!
//! Every accepted event lands in exactly one split. Events are only dropped
//! by the acceptance window, never by the cut.

use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three output partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
    Validate,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Test, Split::Validate];

    /// Directory name of the split.
    pub fn name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
            Split::Validate => "validate",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Train and test fractions; validation takes the rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitFractions {
    #[serde(default = "default_train")]
    pub train: f64,

    #[serde(default = "default_test")]
    pub test: f64,
}

fn default_train() -> f64 {
    0.7
}

fn default_test() -> f64 {
    0.15
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            train: default_train(),
            test: default_test(),
        }
    }
}

impl SplitFractions {
    pub fn new(train: f64, test: f64) -> Self {
        Self { train, test }
    }

    /// Implicit validation fraction.
    pub fn validate_fraction(&self) -> f64 {
        1.0 - self.train - self.test
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.train) {
            return Err(format!("train fraction must be in [0, 1], got {}", self.train));
        }
        if !(0.0..=1.0).contains(&self.test) {
            return Err(format!("test fraction must be in [0, 1], got {}", self.test));
        }
        if self.train + self.test > 1.0 + 1e-9 {
            return Err(format!(
                "train + test must not exceed 1, got {} + {}",
                self.train, self.test
            ));
        }
        Ok(())
    }

    /// `(n_train, n_test)` for `n` accepted events.
    pub fn sizes(&self, n: usize) -> (usize, usize) {
        let n_train = ((n as f64 * self.train).floor() as usize).min(n);
        let n_test = ((n as f64 * self.test).floor() as usize).min(n - n_train);
        (n_train, n_test)
    }
}

/// Open interval on a kinematic attribute: `min < x < max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceWindow {
    #[serde(default = "default_min")]
    pub min: f64,

    #[serde(default = "default_max")]
    pub max: f64,
}

fn default_min() -> f64 {
    450.0
}

fn default_max() -> f64 {
    1200.0
}

impl Default for AcceptanceWindow {
    fn default() -> Self {
        Self {
            min: default_min(),
            max: default_max(),
        }
    }
}

impl AcceptanceWindow {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Both bounds exclusive; NaN is never accepted.
    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        x > self.min && x < self.max
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.min < self.max) {
            return Err(format!(
                "acceptance window is empty: ({}, {})",
                self.min, self.max
            ));
        }
        Ok(())
    }
}

impl fmt::Display for AcceptanceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.min, self.max)
    }
}

/// Event indices of each split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub validate: Vec<usize>,
}

impl SplitIndices {
    pub fn get(&self, split: Split) -> &[usize] {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
            Split::Validate => &self.validate,
        }
    }

    /// Accepted events across all splits.
    pub fn total(&self) -> usize {
        self.train.len() + self.test.len() + self.validate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Split, &[usize])> {
        Split::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

/// Shuffles accepted events into train/test/validate.
#[derive(Debug, Clone)]
pub struct Splitter {
    fractions: SplitFractions,
    window: AcceptanceWindow,
    seed: Option<u64>,
}

impl Splitter {
    /// Splitter drawing its permutation from process-wide randomness.
    pub fn new(fractions: SplitFractions, window: AcceptanceWindow) -> Self {
        Self {
            fractions,
            window,
            seed: None,
        }
    }

    /// Fix the permutation seed for reproducible splits.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn fractions(&self) -> &SplitFractions {
        &self.fractions
    }

    pub fn window(&self) -> &AcceptanceWindow {
        &self.window
    }

    /// Indices of events inside the acceptance window, ascending.
    pub fn accepted_indices(&self, kinematic: ArrayView1<'_, f64>) -> Vec<usize> {
        kinematic
            .iter()
            .enumerate()
            .filter_map(|(i, &x)| self.window.contains(x).then_some(i))
            .collect()
    }

    /// Accept, shuffle and partition.
    pub fn split(&self, kinematic: ArrayView1<'_, f64>) -> SplitIndices {
        let mut indices = self.accepted_indices(kinematic);
        match self.seed {
            Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => indices.shuffle(&mut rand::thread_rng()),
        }
        let split = self.partition(indices);

        log::info!(
            "Split {} accepted of {} events ({} < x < {}): train={} test={} validate={}",
            split.total(),
            kinematic.len(),
            self.window.min,
            self.window.max,
            split.train.len(),
            split.test.len(),
            split.validate.len()
        );
        split
    }

    /// Cut an already shuffled index sequence by the configured fractions.
    pub fn partition(&self, mut shuffled: Vec<usize>) -> SplitIndices {
        let (n_train, n_test) = self.fractions.sizes(shuffled.len());
        let validate = shuffled.split_off(n_train + n_test);
        let test = shuffled.split_off(n_train);
        SplitIndices {
            train: shuffled,
            test,
            validate,
        }
    }
}
