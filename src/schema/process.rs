//! Process-category dispatch table.
//!
//! Exclusive samples of one physical process are binned by parton
//! multiplicity. The job name tells which bin a job keeps: the first table
//! entry whose pattern occurs in the job name wins, otherwise the default.

use serde::{Deserialize, Serialize};

/// One row of the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCategory {
    /// Substring matched against the job name
    pub pattern: String,

    /// Expected parton multiplicity for matching jobs
    pub n_partons: i64,
}

impl ProcessCategory {
    pub fn new(pattern: &str, n_partons: i64) -> Self {
        Self {
            pattern: pattern.to_string(),
            n_partons,
        }
    }
}

/// Ordered first-match substring table with a fallback value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTable {
    #[serde(default = "default_partons")]
    pub default_partons: i64,

    #[serde(default = "default_categories")]
    pub categories: Vec<ProcessCategory>,
}

fn default_partons() -> i64 {
    1
}

fn default_categories() -> Vec<ProcessCategory> {
    vec![
        ProcessCategory::new("QCD", 1),
        ProcessCategory::new("Top", 3),
        ProcessCategory::new("ZpTT", 3),
        ProcessCategory::new("ZpWW", 2),
        ProcessCategory::new("ZpA0h", 2),
        ProcessCategory::new("Higgs", 2),
        ProcessCategory::new("W", 2),
    ]
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            default_partons: default_partons(),
        }
    }
}

impl ProcessTable {
    /// Parton multiplicity selected for `job_name`.
    pub fn multiplicity(&self, job_name: &str) -> i64 {
        self.categories
            .iter()
            .find(|c| job_name.contains(c.pattern.as_str()))
            .map(|c| c.n_partons)
            .unwrap_or(self.default_partons)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(c) = self.categories.iter().find(|c| c.pattern.is_empty()) {
            return Err(format!(
                "empty pattern (n_partons = {}) would match every job",
                c.n_partons
            ));
        }
        Ok(())
    }
}

/// Process-name prefix up to the first `delimiter`, used to pick histograms.
pub fn process_prefix<'a>(job_name: &'a str, delimiter: &str) -> &'a str {
    if delimiter.is_empty() {
        return job_name;
    }
    job_name.split(delimiter).next().unwrap_or(job_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = ProcessTable::default();
        assert_eq!(table.multiplicity("QCD_Pt470to600_3"), 1);
        assert_eq!(table.multiplicity("Top_lo_12"), 3);
        assert_eq!(table.multiplicity("ZpTT_med-2000_0"), 3);
        assert_eq!(table.multiplicity("ZpWW_med-1000_4"), 2);
        assert_eq!(table.multiplicity("Higgs_ggH_1"), 2);
        assert_eq!(table.multiplicity("Unknown_0"), 1);
    }

    #[test]
    fn test_first_match_wins() {
        let table = ProcessTable {
            categories: vec![ProcessCategory::new("W", 2), ProcessCategory::new("ZpWW", 5)],
            default_partons: 1,
        };
        assert_eq!(table.multiplicity("ZpWW_0"), 2);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let table = ProcessTable {
            categories: vec![ProcessCategory::new("", 4)],
            default_partons: 1,
        };
        assert!(table.validate().is_err());
        assert!(ProcessTable::default().validate().is_ok());
    }

    #[test]
    fn test_process_prefix() {
        assert_eq!(process_prefix("ZpTT_med-2000_0", "_"), "ZpTT");
        assert_eq!(process_prefix("QCD", "_"), "QCD");
        assert_eq!(process_prefix("QCD_1", ""), "QCD_1");
    }
}
