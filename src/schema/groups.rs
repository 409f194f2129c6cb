//! Output attribute groups and default branch lists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Singleton branches written by the upstream jet tree, in dump order.
pub const DEFAULT_SINGLETONS: &[&str] = &[
    "msd",
    "pt",
    "rawpt",
    "eta",
    "phi",
    "eventNumber",
    "partonM",
    "partonPt",
    "partonEta",
    "nPartons",
    "nBPartons",
    "nCPartons",
    "rho",
    "rawrho",
    "rho2",
    "rawrho2",
    "tau32",
    "tau32SD",
    "tau21",
    "tau21SD",
    "maxcsv",
    "mincsv",
    "doubleb",
    "top_ecf_bdt",
];

/// Event identifier branches.
pub const DEFAULT_EVENTS: &[&str] = &["eventNumber"];

/// Truth-label branches.
pub const DEFAULT_TRUTH: &[&str] = &["nPartons", "nBPartons", "nCPartons"];

/// Particle-flow candidate matrix attribute.
pub const PF_ATTRIBUTE: &str = "pf";

/// Secondary-vertex matrix attribute.
pub const SV_ATTRIBUTE: &str = "sv";

/// Raw-density weight attribute.
pub const PT_WEIGHT: &str = "ptweight";

/// Rescaled-density weight attribute.
pub const PT_WEIGHT_SCALED: &str = "ptweight_scaled";

/// Predictor output attributes, in column order.
pub const DNN_OUTPUTS: &[&str] = &["dnn_higgs", "dnn_top"];

/// How a group's attributes are laid out in its output unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLayout {
    /// Several scalars stacked into `[events, attributes]`
    StackedScalars,
    /// One scalar written as `[events]`
    Scalar,
    /// One matrix written as `[events, P, F]`
    Matrix,
}

/// A named output group. One unit is written per group per split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeGroup {
    Singletons,
    Events,
    Pf,
    Sv,
    Truth,
    Ptweight,
    PtweightScaled,
    Dnn,
}

impl AttributeGroup {
    /// Groups dumped on every run, in write order.
    pub const STANDARD: [AttributeGroup; 7] = [
        AttributeGroup::Singletons,
        AttributeGroup::Events,
        AttributeGroup::Pf,
        AttributeGroup::Sv,
        AttributeGroup::Truth,
        AttributeGroup::Ptweight,
        AttributeGroup::PtweightScaled,
    ];

    /// File-name token for the group.
    pub fn name(self) -> &'static str {
        match self {
            AttributeGroup::Singletons => "singletons",
            AttributeGroup::Events => "events",
            AttributeGroup::Pf => "pf",
            AttributeGroup::Sv => "sv",
            AttributeGroup::Truth => "truth",
            AttributeGroup::Ptweight => "ptweight",
            AttributeGroup::PtweightScaled => "ptweight_scaled",
            AttributeGroup::Dnn => "dnn",
        }
    }

    pub fn layout(self) -> GroupLayout {
        match self {
            AttributeGroup::Singletons
            | AttributeGroup::Events
            | AttributeGroup::Truth
            | AttributeGroup::Dnn => GroupLayout::StackedScalars,
            AttributeGroup::Ptweight | AttributeGroup::PtweightScaled => GroupLayout::Scalar,
            AttributeGroup::Pf | AttributeGroup::Sv => GroupLayout::Matrix,
        }
    }
}

impl fmt::Display for AttributeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owned copy of a static branch list.
pub fn to_owned_list(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_group_names() {
        let names: Vec<&str> = AttributeGroup::STANDARD.iter().map(|g| g.name()).collect();
        assert_eq!(
            names,
            vec!["singletons", "events", "pf", "sv", "truth", "ptweight", "ptweight_scaled"]
        );
    }

    #[test]
    fn test_layouts() {
        assert_eq!(AttributeGroup::Pf.layout(), GroupLayout::Matrix);
        assert_eq!(AttributeGroup::Truth.layout(), GroupLayout::StackedScalars);
        assert_eq!(AttributeGroup::Ptweight.layout(), GroupLayout::Scalar);
    }

    #[test]
    fn test_singletons_contain_truth_and_kinematics() {
        for name in DEFAULT_TRUTH.iter().chain(["pt", "rawpt"].iter()) {
            assert!(DEFAULT_SINGLETONS.contains(name), "missing {name}");
        }
    }
}
