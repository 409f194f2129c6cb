//! Dataset Validation Module
//!
//! Sanity checks run on the assembled dataset before any transformation
//! touches it, so that problems are reported against the input data.
//!
//! # Validation Categories
//!
//! 1. **Alignment**: every attribute holds the same number of events
//! 2. **Completeness**: required attributes are present
//! 3. **Value Ranges**: NaN/Inf detection in scalars and matrices
//! 4. **Parton Counts**: the filter attribute holds whole numbers
//!
//! Alignment and completeness problems are errors; the rest are warnings.
//!
//! # Usage
//!
//! ```
//! use jet_dataset::dataset::AttributeCollection;
//! use jet_dataset::validation::DatasetValidator;
//! use ndarray::array;
//!
//! let mut data = AttributeCollection::new();
//! data.insert_scalar("pt", array![500.0, f64::NAN]).unwrap();
//!
//! let result = DatasetValidator::new().validate(&data);
//! assert!(!result.has_errors());
//! assert!(result.has_warnings());
//! ```

use crate::dataset::{Attribute, AttributeCollection};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// A failed check.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub check: String,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.message)
    }
}

/// Checks run and what they found. Passing checks are only counted.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    checks: usize,
    findings: Vec<Finding>,
}

impl ValidationResult {
    fn pass(&mut self) {
        self.checks += 1;
    }

    fn fail(&mut self, check: &str, severity: Severity, message: String) {
        self.checks += 1;
        self.findings.push(Finding {
            check: check.to_string(),
            severity,
            message,
        });
    }

    pub fn check_count(&self) -> usize {
        self.checks
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// No errors and no warnings.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Warning)
    }

    /// Warnings as `check: message`.
    pub fn warnings(&self) -> Vec<String> {
        self.messages(Severity::Warning)
    }

    /// Errors as `check: message`.
    pub fn errors(&self) -> Vec<String> {
        self.messages(Severity::Error)
    }

    fn messages(&self, severity: Severity) -> Vec<String> {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .map(Finding::to_string)
            .collect()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} checks, {} errors, {} warnings",
            self.checks,
            self.errors().len(),
            self.warnings().len()
        )?;
        for finding in &self.findings {
            write!(f, "\n  - {finding}")?;
        }
        Ok(())
    }
}

/// Configuration for dataset validation.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Attributes that must be present
    pub required_attributes: Vec<String>,

    /// Attribute expected to hold integral parton counts
    pub parton_count: Option<String>,

    /// Check for NaN/Inf values
    pub check_nan_inf: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            required_attributes: Vec::new(),
            parton_count: None,
            check_nan_inf: true,
        }
    }
}

/// Validator for assembled datasets.
#[derive(Debug, Clone, Default)]
pub struct DatasetValidator {
    config: ValidationConfig,
}

impl DatasetValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Run every enabled check.
    pub fn validate(&self, data: &AttributeCollection) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_alignment(data, &mut result);
        self.validate_required(data, &mut result);

        if self.config.check_nan_inf {
            for (name, attr) in data.iter() {
                match non_finite_summary(attr) {
                    None => result.pass(),
                    Some(msg) => result.fail(&format!("finite:{name}"), Severity::Warning, msg),
                }
            }
        }

        if let Some(name) = &self.config.parton_count {
            self.validate_parton_counts(data, name, &mut result);
        }

        result
    }

    fn validate_alignment(&self, data: &AttributeCollection, result: &mut ValidationResult) {
        match data.check_alignment() {
            Ok(_) => result.pass(),
            Err(e) => result.fail("alignment", Severity::Error, e.to_string()),
        }
    }

    fn validate_required(&self, data: &AttributeCollection, result: &mut ValidationResult) {
        let missing: Vec<&str> = self
            .config
            .required_attributes
            .iter()
            .map(String::as_str)
            .filter(|name| !data.contains(name))
            .collect();

        if missing.is_empty() {
            result.pass();
        } else {
            result.fail(
                "required",
                Severity::Error,
                format!("missing attributes: {}", missing.join(", ")),
            );
        }
    }

    fn validate_parton_counts(
        &self,
        data: &AttributeCollection,
        name: &str,
        result: &mut ValidationResult,
    ) {
        let Ok(counts) = data.scalar(name) else {
            result.fail(
                "parton_count",
                Severity::Error,
                format!("'{name}' is not a scalar attribute"),
            );
            return;
        };

        let fractional = counts.iter().filter(|c| c.fract() != 0.0).count();
        if fractional == 0 {
            result.pass();
        } else {
            result.fail(
                "parton_count",
                Severity::Warning,
                format!("{fractional} non-integral values in '{name}'"),
            );
        }
    }
}

fn non_finite_summary(attr: &Attribute) -> Option<String> {
    let (nan, inf) = match attr {
        Attribute::Scalar(values) => count_non_finite(values.iter().copied()),
        Attribute::Matrix(values) => count_non_finite(values.iter().map(|&v| v as f64)),
    };

    (nan + inf > 0).then(|| format!("{nan} NaN and {inf} infinite values"))
}

fn count_non_finite(values: impl Iterator<Item = f64>) -> (usize, usize) {
    values.fold((0, 0), |(nan, inf), v| {
        if v.is_nan() {
            (nan + 1, inf)
        } else if v.is_infinite() {
            (nan, inf + 1)
        } else {
            (nan, inf)
        }
    })
}
