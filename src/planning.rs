//! Release planning helpers: build numbers, partial-update suggestions and
//! assembly of new-release requests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::api::ApiClient;
use crate::config::{BranchConfig, ProductConfig};
use crate::error::{Result, ShipitError};
use crate::fanout::join_ordered;
use crate::models::{NewRelease, PartialUpdate};
use crate::vcs::VcsClient;

pub const DEFAULT_NUMBER_OF_PARTIALS: usize = 3;

/// `X.0` is the only version shape of a release candidate.
pub fn is_rc(version: &str) -> bool {
    let mut parts = version.split('.');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(_), Some("0"), None)
    )
}

/// One past the highest build number taken, or 1.
pub fn next_build_number(taken: &[u32]) -> u32 {
    taken.iter().max().map_or(1, |max| max + 1)
}

pub async fn guess_build_number(api: &ApiClient, product: &str, version: &str) -> Result<u32> {
    let taken = api.get_build_numbers(product, version).await?;
    Ok(next_build_number(&taken))
}

pub async fn guess_xpi_build_number(
    api: &ApiClient,
    xpi_name: &str,
    xpi_version: &str,
) -> Result<u32> {
    let taken = api.get_xpi_build_numbers(xpi_name, xpi_version).await?;
    Ok(next_build_number(&taken))
}

/// Suggest `"{version}build{n}"` entries to generate partial updates from.
///
/// The most recent shipped builds of the branch come first, then the last
/// shipped build of the RC branch for RC versions, then builds of the
/// alternative branch when the branch alone has too few.
#[instrument(skip(api, product, branch), fields(product = %product.product, branch = %branch.branch))]
pub async fn guess_partial_versions(
    api: &ApiClient,
    product: &ProductConfig,
    branch: &BranchConfig,
    version: &str,
) -> Result<Vec<String>> {
    let wanted = branch
        .number_of_partials
        .unwrap_or(DEFAULT_NUMBER_OF_PARTIALS);

    let shipped = api
        .get_shipped_releases(&product.product, &branch.branch, None, None)
        .await?;
    let mut suggested: Vec<String> = shipped.iter().take(wanted).map(|r| r.build_label()).collect();

    let mut alternative_builds = Vec::new();
    if suggested.len() < wanted
        && let Some(alternative) = &branch.alternative
    {
        let shipped = api
            .get_shipped_releases(&product.product, &alternative.branch, None, None)
            .await?;
        alternative_builds = shipped
            .iter()
            .take(wanted - suggested.len())
            .map(|r| r.build_label())
            .collect();
    }

    if let Some(rc) = &branch.rc
        && is_rc(version)
    {
        let shipped = api
            .get_shipped_releases(&product.product, &rc.branch, None, None)
            .await?;
        match shipped.first() {
            Some(last) => suggested.push(last.build_label()),
            None => warn!(rc_branch = %rc.branch, "No shipped build on the RC branch"),
        }
    }

    suggested.extend(alternative_builds);
    debug!(?suggested, "Suggested partial versions");
    Ok(suggested)
}

/// Split `"<version>build<n>"`.
fn parse_partial(entry: &str) -> Result<(String, u32)> {
    let invalid = || ShipitError::Invalid(format!("Invalid partial version: {}", entry));
    let (version, build) = entry.split_once("build").ok_or_else(invalid)?;
    let build_number = build.trim().parse::<u32>().map_err(|_| invalid())?;
    Ok((version.trim().to_string(), build_number))
}

/// Resolve each partial version to its shipped release and locales.
///
/// Empty entries are ignored. Every entry must match exactly one shipped
/// release, looked up on the RC branch for RC builds matching its pattern,
/// then on the branch itself, then on the alternative branch.
pub async fn generate_partial_updates(
    api: &ApiClient,
    vcs: &VcsClient,
    product: &ProductConfig,
    branch: &BranchConfig,
    version: &str,
    partial_versions: &[String],
) -> Result<BTreeMap<String, PartialUpdate>> {
    let release_is_rc = is_rc(version);

    let lookups = partial_versions
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let api = api.clone();
            let vcs = vcs.clone();
            let product = product.clone();
            let branch = branch.clone();
            let entry = entry.to_string();
            async move {
                let (partial_version, build_number) = parse_partial(&entry)?;

                let (mut lookup_branch, mut lookup_repo) = (branch.branch.clone(), branch.repo.clone());
                if release_is_rc
                    && let Some(rc) = &branch.rc
                    && rc.version_pattern.is_match(&partial_version)
                {
                    lookup_branch = rc.branch.clone();
                    lookup_repo = rc.repo.clone();
                }

                let mut shipped = api
                    .get_shipped_releases(
                        &product.product,
                        &lookup_branch,
                        Some(&partial_version),
                        Some(build_number),
                    )
                    .await?;

                if shipped.is_empty()
                    && let Some(alternative) = &branch.alternative
                {
                    lookup_branch = alternative.branch.clone();
                    lookup_repo = alternative.repo.clone();
                    shipped = api
                        .get_shipped_releases(
                            &product.product,
                            &lookup_branch,
                            Some(&partial_version),
                            Some(build_number),
                        )
                        .await?;
                }

                let revision = match shipped.as_slice() {
                    [release] => release.revision.clone().unwrap_or_default(),
                    _ => {
                        return Err(ShipitError::Invalid(format!(
                            "Cannot obtain proper information for {} {} {} build {}",
                            product.product, lookup_branch, partial_version, build_number
                        )));
                    }
                };

                let locales = vcs
                    .get_locales(&lookup_repo, &revision, &product.app_name)
                    .await?;
                Ok::<_, ShipitError>((
                    partial_version,
                    PartialUpdate {
                        build_number,
                        locales,
                    },
                ))
            }
        });

    Ok(join_ordered(lookups).await?.into_iter().collect())
}

/// Inputs for a new product release.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub revision: String,
    pub version: String,
    pub build_number: u32,
    pub release_eta: Option<DateTime<Utc>>,
    pub partial_versions: Vec<String>,
}

/// Assemble the body of `POST /releases`.
///
/// Partial updates are generated only for products that enable them.
pub async fn build_new_release(
    api: &ApiClient,
    vcs: &VcsClient,
    product: &ProductConfig,
    branch: &BranchConfig,
    request: ReleaseRequest,
) -> Result<NewRelease> {
    let partial_updates = if product.enable_partials {
        Some(
            generate_partial_updates(
                api,
                vcs,
                product,
                branch,
                &request.version,
                &request.partial_versions,
            )
            .await?,
        )
    } else {
        None
    };

    Ok(NewRelease {
        branch: branch.branch.clone(),
        build_number: request.build_number,
        product: product.product.clone(),
        repo_url: branch.repo.clone(),
        revision: request.revision,
        version: request.version,
        release_eta: request.release_eta.filter(|_| branch.enable_release_eta),
        partial_updates,
        product_key: branch.product_key.clone(),
    })
}

/// Shorten `text` to at most `length` characters, ending in `suffix`.
pub fn maybe_shorten(text: &str, length: usize, suffix: &str) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }
    let keep = length.saturating_sub(suffix.chars().count());
    let mut shortened: String = text.chars().take(keep).collect();
    shortened.push_str(suffix);
    shortened
}

/// [`maybe_shorten`] with the defaults used for commit descriptions.
pub fn shorten(text: &str) -> String {
    maybe_shorten(text, 70, " ...")
}
