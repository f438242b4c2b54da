//! Release, phase and sign-off models
//!
//! Wire shapes of the release backend. The backend owns every one of these
//! records; the client only holds re-fetchable copies.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which release pipeline an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    /// Full product releases (Firefox, Thunderbird, ...)
    #[default]
    Product,
    /// Browser extension releases
    Xpi,
}

impl ReleaseKind {
    /// Collection path for releases of this kind.
    pub fn releases_path(self) -> &'static str {
        match self {
            ReleaseKind::Product => "/releases",
            ReleaseKind::Xpi => "/xpi/releases",
        }
    }

    /// Collection path for phase sign-offs of this kind.
    pub fn signoff_path(self) -> &'static str {
        match self {
            ReleaseKind::Product => "/signoff",
            ReleaseKind::Xpi => "/xpi/signoff",
        }
    }
}

impl fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseKind::Product => f.write_str("product"),
            ReleaseKind::Xpi => f.write_str("xpi"),
        }
    }
}

/// A release as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Product-specific composite key, e.g. `Firefox-79.0b9-build1`
    pub name: String,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub build_number: u32,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub allow_phase_skipping: bool,
    #[serde(default)]
    pub release_eta: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpi_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpi_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpi_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpi_type: Option<String>,
}

impl Release {
    pub fn is_xpi(&self) -> bool {
        self.xpi_name.is_some()
    }

    pub fn kind(&self) -> ReleaseKind {
        if self.is_xpi() {
            ReleaseKind::Xpi
        } else {
            ReleaseKind::Product
        }
    }

    /// Version string used when suggesting partial updates.
    pub fn build_label(&self) -> String {
        let version = self
            .version
            .as_deref()
            .or(self.xpi_version.as_deref())
            .unwrap_or_default();
        format!("{}build{}", version, self.build_number)
    }
}

/// One step of a release pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub skipped: bool,
    /// Task-execution service reference of the action task
    #[serde(rename = "actionTaskId", default)]
    pub action_task_id: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
}

/// A human approval gate attached to a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signoff {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<String>,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub completed_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SignoffsResponse {
    #[serde(default)]
    pub signoffs: Vec<Signoff>,
}

/// Query parameters accepted by the release listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReleaseParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpi_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpi_version: Option<String>,
}

impl ReleaseParams {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn for_product_branch(mut self, product: &str, branch: &str) -> Self {
        self.product = Some(product.to_string());
        self.branch = Some(branch.to_string());
        self
    }
}

/// Locales shipped by a previous build, keyed under its version in `partial_updates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialUpdate {
    #[serde(rename = "buildNumber")]
    pub build_number: u32,
    pub locales: Vec<String>,
}

/// Body of `POST /releases`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRelease {
    pub branch: String,
    pub build_number: u32,
    pub product: String,
    pub repo_url: String,
    pub revision: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_eta: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_updates: Option<BTreeMap<String, PartialUpdate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_key: Option<String>,
}

/// Body of `POST /xpi/releases`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewXpiRelease {
    /// Revision of the XPI manifest repository
    pub revision: String,
    pub xpi_revision: String,
    pub xpi_name: String,
    pub xpi_version: String,
    pub build_number: u32,
}
