//! # Command-line front end
//!
//! Every subcommand maps onto one admin operation and prints its result as
//! JSON on stdout. Logs go to stderr.

use anyhow::{Context as _, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ApiClient, DEFAULT_RECENT_LIMIT, RevisionLookup};
use crate::config::{AppConfig, BranchConfig, ProductCatalog, ProductConfig};
use crate::models::{
    NewMergeAutomation, NewXpiRelease, ProductBranch, ReleaseKind, ReleaseParams,
};
use crate::planning::{self, ReleaseRequest};
use crate::poller::{AutomationBoard, MergeAutomationPoller, can_cancel, is_pending};
use crate::status::Reconciler;
use crate::taskcluster::TaskclusterClient;
use crate::vcs::{self, RepoHost, VcsClient, VcsEndpoints};

#[derive(Debug, Parser)]
#[command(name = "shipit-admin")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release administration client for the Ship It backend", long_about = None)]
pub struct Cli {
    /// Skip the backend heartbeat check
    #[arg(long, global = true)]
    pub skip_heartbeat: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Product releases
    Releases {
        #[command(subcommand)]
        action: ReleasesAction,
    },
    /// Extension (XPI) releases
    Xpi {
        #[command(subcommand)]
        action: XpiAction,
    },
    /// Product catalog and automatic-release toggles
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Repository lookups
    Vcs {
        #[command(subcommand)]
        action: VcsAction,
    },
    /// Merge-day automations
    Merge {
        #[command(subcommand)]
        action: MergeAction,
    },
}

/// Optional product/branch filter.
#[derive(Debug, Clone, Args)]
pub struct ProductFilter {
    #[arg(long)]
    pub product: Option<String>,
    #[arg(long, requires = "product")]
    pub branch: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ReleasesAction {
    /// Pending releases with phase states and sign-offs
    Pending {
        #[command(flatten)]
        filter: ProductFilter,
    },
    /// Recently shipped releases
    Recent {
        #[command(flatten)]
        filter: ProductFilter,
        /// Releases kept per product branch
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },
    /// Cancel a release
    Cancel {
        release: String,
        #[arg(long)]
        xpi: bool,
    },
    /// Schedule a phase of a release
    Schedule {
        release: String,
        phase: String,
        #[arg(long)]
        xpi: bool,
    },
    /// Sign off a phase
    Signoff {
        release: String,
        phase: String,
        uid: String,
        #[arg(long)]
        xpi: bool,
    },
    /// Next free build number for a version
    GuessBuild { product: String, version: String },
    /// Suggested partial-update versions
    GuessPartials {
        product: String,
        branch: String,
        version: String,
    },
    /// Create a release
    Submit(SubmitRelease),
}

#[derive(Debug, Args)]
pub struct SubmitRelease {
    pub product: String,
    pub branch: String,
    pub revision: String,
    /// Repository of repository-based products (defaults to the first one)
    #[arg(long)]
    pub repo: Option<String>,
    /// Read from the repository when omitted
    #[arg(long)]
    pub version: Option<String>,
    /// Guessed from taken build numbers when omitted
    #[arg(long)]
    pub build_number: Option<u32>,
    /// Comma-separated `<version>build<n>` list; guessed when omitted
    #[arg(long, value_delimiter = ',')]
    pub partials: Option<Vec<String>>,
    /// RFC 3339 timestamp
    #[arg(long)]
    pub release_eta: Option<DateTime<Utc>>,
    /// Print the request body without submitting it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum XpiAction {
    /// Pending XPI releases with phase states and sign-offs
    Pending,
    /// Recently shipped XPI releases
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },
    /// XPIs declared by the manifest repository
    List {
        /// Manifest revision; the branch head when omitted
        #[arg(long)]
        manifest_revision: Option<String>,
    },
    /// Create an XPI release
    Submit {
        xpi_name: String,
        /// XPI repository revision; the branch head when omitted
        #[arg(long)]
        revision: Option<String>,
        #[arg(long)]
        manifest_revision: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProductsAction {
    /// Product branches with their automatic-release state
    List,
    /// Disabled product branches as reported by the backend
    Disabled,
    Disable { product: String, branch: String },
    Enable { product: String, branch: String },
    /// Ask the backend to rebuild product details
    RebuildDetails,
}

#[derive(Debug, Subcommand)]
pub enum VcsAction {
    Pushes { repo: String, branch: String },
    Version {
        repo: String,
        revision: String,
        app_name: String,
        #[arg(long)]
        version_file: Option<String>,
    },
    Locales {
        repo: String,
        revision: String,
        app_name: String,
    },
    Branches { repo: String },
    /// Web link to a revision
    Url { repo: String, revision: String },
}

#[derive(Debug, Subcommand)]
pub enum MergeAction {
    List { product: String },
    Behaviors { product: String },
    Revisions { product: String, behavior: String },
    Submit {
        product: String,
        behavior: String,
        revision: String,
        #[arg(long)]
        dry_run: bool,
    },
    Start { product: String, id: i64 },
    Cancel { product: String, id: i64 },
    /// Poll running automations until they settle
    Watch { product: String },
}

/// Clients shared by every subcommand.
pub struct Context {
    pub config: AppConfig,
    pub catalog: ProductCatalog,
    pub api: ApiClient,
    pub taskcluster: TaskclusterClient,
    pub vcs: VcsClient,
}

impl Context {
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let catalog = config
            .product_catalog()
            .context("loading product catalog")?;
        let api = ApiClient::from_config(&config);
        let taskcluster = TaskclusterClient::new(config.taskcluster_root_url.clone());
        let vcs = VcsClient::new(VcsEndpoints::from_config(&config), api.clone());
        Ok(Self {
            config,
            catalog,
            api,
            taskcluster,
            vcs,
        })
    }

    fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.api.clone(), self.taskcluster.clone())
    }

    fn product(&self, name: &str) -> Result<&ProductConfig> {
        self.catalog
            .product(name)
            .ok_or_else(|| anyhow!("Unknown product: {}", name))
    }

    fn branch(&self, product: &ProductConfig, branch: &str, repo: Option<&str>) -> Result<BranchConfig> {
        product
            .release_branch(branch, repo)
            .ok_or_else(|| anyhow!("Unknown branch {} for {}", branch, product.product))
    }

    fn pairs(&self, filter: &ProductFilter) -> Vec<(String, String)> {
        self.catalog
            .product_branches()
            .into_iter()
            .filter(|(product, branch)| {
                filter.product.as_deref().is_none_or(|p| p == product)
                    && filter.branch.as_deref().is_none_or(|b| b == branch)
            })
            .collect()
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn kind(xpi: bool) -> ReleaseKind {
    if xpi { ReleaseKind::Xpi } else { ReleaseKind::Product }
}

/// Run one parsed command.
pub async fn run(cli: Cli, ctx: &Context) -> Result<()> {
    if !cli.skip_heartbeat {
        ctx.api
            .heartbeat()
            .await
            .context("Ship It backend is not reachable")?;
    }

    match cli.command {
        Command::Releases { action } => releases(action, ctx).await,
        Command::Xpi { action } => xpi(action, ctx).await,
        Command::Products { action } => products(action, ctx).await,
        Command::Vcs { action } => vcs_command(action, ctx).await,
        Command::Merge { action } => merge(action, ctx).await,
    }
}

async fn releases(action: ReleasesAction, ctx: &Context) -> Result<()> {
    match action {
        ReleasesAction::Pending { filter } => {
            let reconciler = ctx.reconciler();
            let pending = if filter.product.is_none() {
                reconciler
                    .pending_releases(&ReleaseParams::default(), ReleaseKind::Product)
                    .await?
            } else {
                reconciler
                    .pending_releases_for_product_branches(&ctx.pairs(&filter))
                    .await?
            };
            print_json(&pending)
        }
        ReleasesAction::Recent { filter, limit } => {
            let recent = ctx.api.get_recent_releases(&ctx.pairs(&filter), limit).await?;
            print_json(&recent)
        }
        ReleasesAction::Cancel { release, xpi } => {
            print_json(&ctx.api.cancel_release(kind(xpi), &release).await?)
        }
        ReleasesAction::Schedule {
            release,
            phase,
            xpi,
        } => print_json(&ctx.api.schedule_phase(kind(xpi), &release, &phase).await?),
        ReleasesAction::Signoff {
            release,
            phase,
            uid,
            xpi,
        } => print_json(
            &ctx.api
                .phase_signoff(kind(xpi), &release, &phase, &uid)
                .await?,
        ),
        ReleasesAction::GuessBuild { product, version } => {
            let build_number = planning::guess_build_number(&ctx.api, &product, &version).await?;
            print_json(&build_number)
        }
        ReleasesAction::GuessPartials {
            product,
            branch,
            version,
        } => {
            let product = ctx.product(&product)?;
            let branch = ctx.branch(product, &branch, None)?;
            let partials =
                planning::guess_partial_versions(&ctx.api, product, &branch, &version).await?;
            print_json(&partials)
        }
        ReleasesAction::Submit(submit) => submit_release(submit, ctx).await,
    }
}

async fn submit_release(submit: SubmitRelease, ctx: &Context) -> Result<()> {
    let product = ctx.product(&submit.product)?;
    let branch = ctx.branch(product, &submit.branch, submit.repo.as_deref())?;

    let version = match submit.version {
        Some(version) => version,
        None => {
            ctx.vcs
                .get_version(
                    &branch.repo,
                    &submit.revision,
                    &product.app_name,
                    product.version_file.as_deref(),
                )
                .await?
        }
    };
    if version.is_empty() {
        bail!(
            "Cannot read the version of {} at {}; pass --version",
            branch.repo,
            submit.revision
        );
    }

    let build_number = match submit.build_number {
        Some(build_number) => build_number,
        None => planning::guess_build_number(&ctx.api, &product.product, &version).await?,
    };

    let partial_versions = match submit.partials {
        Some(partials) => partials,
        None if product.enable_partials => {
            planning::guess_partial_versions(&ctx.api, product, &branch, &version).await?
        }
        None => Vec::new(),
    };

    let request = ReleaseRequest {
        revision: submit.revision,
        version,
        build_number,
        release_eta: submit.release_eta,
        partial_versions,
    };
    let release = planning::build_new_release(&ctx.api, &ctx.vcs, product, &branch, request).await?;

    if submit.dry_run {
        return print_json(&release);
    }
    print_json(&ctx.api.submit_release(&release).await?)
}

async fn xpi(action: XpiAction, ctx: &Context) -> Result<()> {
    match action {
        XpiAction::Pending => {
            let pending = ctx
                .reconciler()
                .pending_releases(&ReleaseParams::default(), ReleaseKind::Xpi)
                .await?;
            print_json(&pending)
        }
        XpiAction::Recent { limit } => {
            print_json(&ctx.api.get_recent_xpi_releases(limit).await?)
        }
        XpiAction::List { manifest_revision } => {
            let (owner, project, revision) = manifest_head(ctx, manifest_revision).await?;
            print_json(&ctx.api.github_xpis(&owner, &project, &revision).await?)
        }
        XpiAction::Submit {
            xpi_name,
            revision,
            manifest_revision,
            dry_run,
        } => {
            let (owner, project, manifest_revision) = manifest_head(ctx, manifest_revision).await?;
            let xpis = ctx.api.github_xpis(&owner, &project, &manifest_revision).await?;
            let source = xpis
                .into_iter()
                .find(|x| x.xpi_name == xpi_name)
                .ok_or_else(|| anyhow!("{} is not listed in the XPI manifest", xpi_name))?;

            let xpi_revision = match revision {
                Some(revision) => revision,
                None => latest_commit(ctx, &source.owner, &source.repo, &source.branch).await?,
            };
            let xpi_version = ctx
                .api
                .github_package_version(&source.owner, &source.repo, &xpi_revision)
                .await?;
            let build_number =
                planning::guess_xpi_build_number(&ctx.api, &xpi_name, &xpi_version).await?;

            let release = NewXpiRelease {
                revision: manifest_revision,
                xpi_revision,
                xpi_name,
                xpi_version,
                build_number,
            };
            if dry_run {
                return print_json(&release);
            }
            print_json(&ctx.api.submit_xpi_release(&release).await?)
        }
    }
}

/// Manifest repository coordinates and the revision to read it at.
async fn manifest_head(
    ctx: &Context,
    revision: Option<String>,
) -> Result<(String, String, String)> {
    let manifest = ctx
        .catalog
        .xpi_manifest
        .as_ref()
        .ok_or_else(|| anyhow!("No XPI manifest configured"))?;
    let revision = match revision {
        Some(revision) => revision,
        None => latest_commit(ctx, &manifest.owner, &manifest.project, &manifest.branch).await?,
    };
    Ok((manifest.owner.clone(), manifest.project.clone(), revision))
}

async fn latest_commit(ctx: &Context, owner: &str, repo: &str, branch: &str) -> Result<String> {
    let commits = ctx.api.github_commits(owner, repo, branch).await?;
    let head = commits
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No commits on {}/{} {}", owner, repo, branch))?;
    info!(
        revision = %head.revision,
        message = %planning::shorten(&head.message),
        "Using branch head"
    );
    Ok(head.revision)
}

async fn products(action: ProductsAction, ctx: &Context) -> Result<()> {
    match action {
        ProductsAction::List => {
            let disabled = ctx.api.get_disabled_products().await?;
            let toggles =
                ProductBranch::from_catalog(&ctx.catalog.disableable_branches(), &disabled);
            print_json(&toggles)
        }
        ProductsAction::Disabled => print_json(&ctx.api.get_disabled_products().await?),
        ProductsAction::Disable { product, branch } => {
            ensure_disableable(ctx, &product, &branch)?;
            print_json(&ctx.api.disable_product(&product, &branch).await?)
        }
        ProductsAction::Enable { product, branch } => {
            ensure_disableable(ctx, &product, &branch)?;
            print_json(&ctx.api.enable_product(&product, &branch).await?)
        }
        ProductsAction::RebuildDetails => {
            print_json(&ctx.api.rebuild_product_details().await?)
        }
    }
}

fn ensure_disableable(ctx: &Context, product: &str, branch: &str) -> Result<()> {
    let pair = (product.to_string(), branch.to_string());
    if ctx.catalog.disableable_branches().contains(&pair) {
        Ok(())
    } else {
        bail!("Automatic releases of {} {} cannot be toggled", product, branch)
    }
}

async fn vcs_command(action: VcsAction, ctx: &Context) -> Result<()> {
    match action {
        VcsAction::Pushes { repo, branch } => print_json(&ctx.vcs.get_pushes(&repo, &branch).await?),
        VcsAction::Version {
            repo,
            revision,
            app_name,
            version_file,
        } => print_json(
            &ctx.vcs
                .get_version(&repo, &revision, &app_name, version_file.as_deref())
                .await?,
        ),
        VcsAction::Locales {
            repo,
            revision,
            app_name,
        } => print_json(&ctx.vcs.get_locales(&repo, &revision, &app_name).await?),
        VcsAction::Branches { repo } => print_json(&ctx.vcs.get_branches(&repo).await?),
        VcsAction::Url { repo, revision } => {
            RepoHost::detect(&repo, ctx.vcs.endpoints())?;
            print_json(&vcs::repo_url_builder(&repo, &revision))
        }
    }
}

async fn merge(action: MergeAction, ctx: &Context) -> Result<()> {
    match action {
        MergeAction::List { product } => {
            print_json(&ctx.api.get_merge_automations(&product).await?)
        }
        MergeAction::Behaviors { product } => {
            print_json(&ctx.api.get_merge_behaviors(&product).await?)
        }
        MergeAction::Revisions { product, behavior } => {
            let lookup = RevisionLookup::new(ctx.api.clone());
            let revisions = lookup.revisions(&product, &behavior).await?.unwrap_or_default();
            print_json(&revisions)
        }
        MergeAction::Submit {
            product,
            behavior,
            revision,
            dry_run,
        } => {
            let lookup = RevisionLookup::new(ctx.api.clone());
            let info = lookup
                .info(&product, &behavior, &revision)
                .await?
                .ok_or_else(|| anyhow!("Revision lookup was superseded"))?;
            let automation = NewMergeAutomation {
                product,
                behavior,
                revision,
                dry_run,
                version: info.version,
                commit_message: info.commit_message,
                commit_author: info.commit_author,
            };
            print_json(&ctx.api.submit_merge_automation(&automation).await?)
        }
        MergeAction::Start { product, id } => {
            let poller = load_board(ctx, &product).await?;
            let board = poller.board();
            let automation = board
                .get(id)
                .ok_or_else(|| anyhow!("No merge automation {} for {}", id, product))?;
            if !is_pending(&automation.automation) {
                bail!(
                    "Merge automation {} is {}, only pending automations can start",
                    id,
                    automation.automation.status
                );
            }
            ctx.api.start_merge_automation(id).await?;
            refresh_after_action(ctx, &poller, &product, id).await
        }
        MergeAction::Cancel { product, id } => {
            let poller = load_board(ctx, &product).await?;
            let board = poller.board();
            let automation = board
                .get(id)
                .ok_or_else(|| anyhow!("No merge automation {} for {}", id, product))?;
            if !can_cancel(&automation.automation) {
                bail!(
                    "Merge automation {} is {} and cannot be canceled",
                    id,
                    automation.automation.status
                );
            }
            ctx.api.cancel_merge_automation(id).await?;
            refresh_after_action(ctx, &poller, &product, id).await
        }
        MergeAction::Watch { product } => {
            let poller = load_board(ctx, &product).await?;
            let shutdown = CancellationToken::new();
            let ctrl_c = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });
            poller.run(shutdown).await?;
            print_json(&poller.board())
        }
    }
}

async fn load_board(ctx: &Context, product: &str) -> Result<MergeAutomationPoller> {
    let automations = ctx.api.get_merge_automations(product).await?;
    Ok(MergeAutomationPoller::from_config(
        ctx.api.clone(),
        AutomationBoard::new(automations),
        &ctx.config,
    ))
}

/// Re-query an automation after acting on it, re-listing on failure.
async fn refresh_after_action(
    ctx: &Context,
    poller: &MergeAutomationPoller,
    product: &str,
    id: i64,
) -> Result<()> {
    if let Err(err) = poller.refresh_one(id).await {
        warn!(automation_id = id, error = %err, "Refresh failed; re-listing automations");
        let automations = ctx.api.get_merge_automations(product).await?;
        poller.replace(AutomationBoard::new(automations));
    }

    match poller.board().get(id) {
        Some(tracked) => print_json(tracked),
        None => print_json(&serde_json::json!({ "id": id, "removed": true })),
    }
}
