//! Product catalog
//!
//! Typed per-product release configuration. The catalog is loaded once at
//! startup and validated; every optional branch feature is an explicit
//! optional record rather than a loosely shaped object.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use super::ConfigError;

const BUILTIN_CATALOG: &str = include_str!("../../config/products.json");

/// Full product catalog plus the XPI manifest location.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductCatalog {
    pub products: Vec<ProductConfig>,
    #[serde(default)]
    pub xpi_manifest: Option<XpiManifestConfig>,
}

/// A releasable product.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawProductConfig")]
pub struct ProductConfig {
    pub product: String,
    pub pretty_name: String,
    pub app_name: String,
    pub enable_partials: bool,
    /// Overrides `<app_name>/config/version_display.txt`
    pub version_file: Option<String>,
    pub target: ProductTarget,
}

/// Where a product's releases are cut from.
#[derive(Debug, Clone)]
pub enum ProductTarget {
    /// In-tree products released from named branches of a Mercurial repo.
    Branches(Vec<BranchConfig>),
    /// Products released from GitHub repositories.
    Repositories(Vec<RepositoryConfig>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchConfig {
    pub pretty_name: String,
    pub project: String,
    pub branch: String,
    pub repo: String,
    #[serde(default)]
    pub enable_release_eta: bool,
    #[serde(default)]
    pub disableable: bool,
    #[serde(default)]
    pub number_of_partials: Option<usize>,
    #[serde(default)]
    pub rc: Option<RcBranch>,
    #[serde(default)]
    pub alternative: Option<AlternativeBranch>,
    #[serde(default)]
    pub product_key: Option<String>,
}

/// Release-candidate source branch used for partials of `X.0` releases.
#[derive(Debug, Clone, Deserialize)]
pub struct RcBranch {
    pub branch: String,
    pub repo: String,
    #[serde(deserialize_with = "deserialize_regex")]
    pub version_pattern: Regex,
}

/// Fallback branch searched when the primary branch lacks shipped builds.
#[derive(Debug, Clone, Deserialize)]
pub struct AlternativeBranch {
    pub branch: String,
    pub repo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub pretty_name: String,
    pub project: String,
    pub repo: String,
    #[serde(default)]
    pub enable_release_eta: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpiManifestConfig {
    pub owner: String,
    pub project: String,
    pub branch: String,
    pub repo: String,
}

#[derive(Deserialize)]
struct RawProductConfig {
    product: String,
    pretty_name: String,
    app_name: String,
    #[serde(default)]
    enable_partials: bool,
    #[serde(default)]
    version_file: Option<String>,
    #[serde(default)]
    branches: Option<Vec<BranchConfig>>,
    #[serde(default)]
    repositories: Option<Vec<RepositoryConfig>>,
}

impl TryFrom<RawProductConfig> for ProductConfig {
    type Error = String;

    fn try_from(raw: RawProductConfig) -> Result<Self, Self::Error> {
        let target = match (raw.branches, raw.repositories) {
            (Some(_), Some(_)) => {
                return Err(format!(
                    "product '{}' declares both branches and repositories",
                    raw.product
                ));
            }
            (Some(branches), None) => ProductTarget::Branches(branches),
            (None, Some(repositories)) => ProductTarget::Repositories(repositories),
            (None, None) => ProductTarget::Branches(Vec::new()),
        };

        Ok(Self {
            product: raw.product,
            pretty_name: raw.pretty_name,
            app_name: raw.app_name,
            enable_partials: raw.enable_partials,
            version_file: raw.version_file,
            target,
        })
    }
}

fn deserialize_regex<'de, D>(deserializer: D) -> Result<Regex, D::Error>
where
    D: Deserializer<'de>,
{
    let pattern = String::deserialize(deserializer)?;
    Regex::new(&pattern).map_err(serde::de::Error::custom)
}

impl ProductTarget {
    pub fn is_empty(&self) -> bool {
        match self {
            ProductTarget::Branches(branches) => branches.is_empty(),
            ProductTarget::Repositories(repos) => repos.is_empty(),
        }
    }

    fn repo_urls(&self) -> Vec<&str> {
        match self {
            ProductTarget::Branches(branches) => branches
                .iter()
                .flat_map(|b| {
                    std::iter::once(b.repo.as_str())
                        .chain(b.rc.as_ref().map(|rc| rc.repo.as_str()))
                        .chain(b.alternative.as_ref().map(|alt| alt.repo.as_str()))
                })
                .collect(),
            ProductTarget::Repositories(repos) => repos.iter().map(|r| r.repo.as_str()).collect(),
        }
    }
}

impl ProductConfig {
    pub fn branch(&self, name: &str) -> Option<&BranchConfig> {
        match &self.target {
            ProductTarget::Branches(branches) => branches.iter().find(|b| b.branch == name),
            ProductTarget::Repositories(_) => None,
        }
    }

    /// Settings for a release cut from `branch`.
    ///
    /// Repository-based products accept any branch of the chosen repository
    /// (`repo`, or the first one listed).
    pub fn release_branch(&self, branch: &str, repo: Option<&str>) -> Option<BranchConfig> {
        match &self.target {
            ProductTarget::Branches(_) => self.branch(branch).cloned(),
            ProductTarget::Repositories(repos) => {
                let repository = match repo {
                    Some(url) => repos.iter().find(|r| r.repo == url)?,
                    None => repos.first()?,
                };
                Some(BranchConfig {
                    pretty_name: repository.pretty_name.clone(),
                    project: repository.project.clone(),
                    branch: branch.to_string(),
                    repo: repository.repo.clone(),
                    enable_release_eta: repository.enable_release_eta,
                    disableable: false,
                    number_of_partials: None,
                    rc: None,
                    alternative: None,
                    product_key: None,
                })
            }
        }
    }

    /// Branch names used when querying the backend for this product.
    ///
    /// Repository-based products are tracked under the empty branch name.
    pub fn branch_names(&self) -> Vec<String> {
        match &self.target {
            ProductTarget::Branches(branches) => {
                branches.iter().map(|b| b.branch.clone()).collect()
            }
            ProductTarget::Repositories(_) => vec![String::new()],
        }
    }
}

impl ProductCatalog {
    /// Parses the catalog embedded in the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Validate product uniqueness and repository hosts.
    ///
    /// `prefixes` is the `(mercurial, github)` pair of accepted URL prefixes.
    pub fn validate(&self, prefixes: &(String, String)) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for product in &self.products {
            if !seen.insert(product.product.as_str()) {
                return Err(ConfigError::DuplicateProduct {
                    product: product.product.clone(),
                });
            }

            if product.target.is_empty() {
                return Err(ConfigError::EmptyProductTarget {
                    product: product.product.clone(),
                });
            }

            for repo in product.target.repo_urls() {
                if !(repo.starts_with(&prefixes.0) || repo.starts_with(&prefixes.1)) {
                    return Err(ConfigError::UnsupportedCatalogRepo {
                        product: product.product.clone(),
                        repo: repo.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn product(&self, name: &str) -> Option<&ProductConfig> {
        self.products.iter().find(|p| p.product == name)
    }

    /// Every `(product, branch)` pair known to the catalog.
    pub fn product_branches(&self) -> Vec<(String, String)> {
        self.products
            .iter()
            .flat_map(|p| {
                p.branch_names()
                    .into_iter()
                    .map(move |branch| (p.product.clone(), branch))
            })
            .collect()
    }

    /// `(product, branch)` pairs whose automatic releases may be toggled.
    pub fn disableable_branches(&self) -> Vec<(String, String)> {
        self.products
            .iter()
            .flat_map(|p| match &p.target {
                ProductTarget::Branches(branches) => branches
                    .iter()
                    .filter(|b| b.disableable)
                    .map(|b| (p.product.clone(), b.branch.clone()))
                    .collect::<Vec<_>>(),
                ProductTarget::Repositories(_) => Vec::new(),
            })
            .collect()
    }
}
