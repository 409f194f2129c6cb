//! Dataset Schema Module
//!
//! Names the attributes a conversion job reads and the groups it writes.
//!
//! # Output Groups
//!
//! | Group | Layout | Content |
//! |-------|--------|---------|
//! | `singletons` | `[N, 24]` | jet kinematics, substructure, truth, b-tagging |
//! | `events` | `[N, 1]` | event number |
//! | `pf` | `[N, P, F]` | particle-flow candidates |
//! | `sv` | `[N, S, G]` | secondary vertices |
//! | `truth` | `[N, 3]` | parton counts |
//! | `ptweight` | `[N]` | raw-density pT weight |
//! | `ptweight_scaled` | `[N]` | rescaled-density pT weight |
//!
//! # Example
//!
//! ```
//! use jet_dataset::schema::{AttributeGroup, ProcessTable};
//!
//! let table = ProcessTable::default();
//! assert_eq!(table.multiplicity("Top_lo_3"), 3);
//! assert_eq!(AttributeGroup::PtweightScaled.name(), "ptweight_scaled");
//! ```

mod groups;
mod process;

pub use groups::{
    to_owned_list, AttributeGroup, GroupLayout, DEFAULT_EVENTS, DEFAULT_SINGLETONS,
    DEFAULT_TRUTH, DNN_OUTPUTS, PF_ATTRIBUTE, PT_WEIGHT, PT_WEIGHT_SCALED, SV_ATTRIBUTE,
};
pub use process::{process_prefix, ProcessCategory, ProcessTable};

/// Current schema version
pub const SCHEMA_VERSION: &str = "1.0.0";
