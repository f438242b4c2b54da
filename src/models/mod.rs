//! # Data Models
//!
//! Serde models for the release backend's wire formats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod merge_automation;
pub mod release;

pub use merge_automation::{
    AutomationStatus, AutomationTaskStatus, MergeAutomation, MergeBehavior, MergeInfo,
    MergeRevision, NewMergeAutomation,
};
pub use release::{
    NewRelease, NewXpiRelease, PartialUpdate, Phase, Release, ReleaseKind, ReleaseParams, Signoff,
};

/// Disabled branches keyed by product, as returned by `GET /disabled-products`.
pub type DisabledProducts = BTreeMap<String, Vec<String>>;

/// A `(product, branch)` toggle for automatic releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBranch {
    pub product: String,
    pub branch: String,
    #[serde(default)]
    pub disabled: bool,
}

impl ProductBranch {
    /// Mark each pair as disabled when the backend lists it.
    pub fn from_catalog(pairs: &[(String, String)], disabled: &DisabledProducts) -> Vec<Self> {
        pairs
            .iter()
            .map(|(product, branch)| Self {
                product: product.clone(),
                branch: branch.clone(),
                disabled: disabled
                    .get(product)
                    .is_some_and(|branches| branches.contains(branch)),
            })
            .collect()
    }
}
