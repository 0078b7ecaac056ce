//! aws-cleanup: dependency-aware discovery and deletion of AWS resources.
//!
//! Scans configured services across regions, shows what depends on what,
//! and deletes selected resources in an order that respects those
//! dependencies. Real deletions sit behind an account safety gate.

use anyhow::{bail, Context, Result};
use aws_cleanup::config::{self, Settings};
use aws_cleanup::discovery::DiscoveryCoordinator;
use aws_cleanup::engine::{ExecuteOptions, ExecutionEngine, ExecutionSummary, ItemOutcome};
use aws_cleanup::graph::DependencyGraph;
use aws_cleanup::model::{Resource, ResourceCatalog, Service};
use aws_cleanup::plan;
use aws_cleanup::provider::{AwsContext, ProviderRegistry};
use aws_cleanup::safety::{AccountGate, AccountId, SafetyConfig};
use aws_cleanup::session::CleanupSession;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "aws-cleanup")]
#[command(about = "Dependency-aware AWS resource cleanup")]
#[command(version)]
struct Args {
    /// AWS profile to use
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Regions to scan (repeatable); defaults to the configured list
    #[arg(long = "region", global = true)]
    regions: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover resources and list them
    Scan {
        /// Restrict to these services (repeatable), e.g. ec2, s3
        #[arg(long = "service")]
        services: Vec<String>,

        /// Print the catalog as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Compute and show the deletion order for a selection
    Plan {
        /// Select every resource of these services (repeatable)
        #[arg(long = "service")]
        services: Vec<String>,

        /// Select specific resource ids (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Select everything discovered
        #[arg(long)]
        all: bool,
    },

    /// Plan and delete the selection (dry run unless --execute)
    Cleanup {
        /// Select every resource of these services (repeatable)
        #[arg(long = "service")]
        services: Vec<String>,

        /// Select specific resource ids (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Select everything discovered
        #[arg(long)]
        all: bool,

        /// Actually delete resources (default is dry-run)
        #[arg(long)]
        execute: bool,
    },

    /// Manage the safe/protected account lists
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
}

#[derive(Subcommand, Debug)]
enum AccountsAction {
    /// Show both lists
    List,

    /// Mark an account as safe to clean
    AddSafe { account_id: String },

    /// Mark an account as protected (deletions hard-refused)
    AddProtected { account_id: String },

    /// Remove an account from both lists
    Remove { account_id: String },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
                .add_directive("aws_config=warn".parse()?)
                .add_directive("aws_smithy_runtime=warn".parse()?)
                .add_directive("hyper=warn".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut settings = Settings::load_or_default()?;
    if !args.regions.is_empty() {
        settings.set_regions(args.regions.clone());
    }

    match args.command {
        Command::Scan { services, json } => {
            let catalog = discover(&args.profile, &settings).await?;
            report_failures(&catalog);
            let filter = parse_services(&services);
            if json {
                print_catalog_json(&catalog, &filter)?;
            } else {
                print_catalog_table(&catalog, &filter);
            }
        }

        Command::Plan { services, ids, all } => {
            let catalog = discover(&args.profile, &settings).await?;
            report_failures(&catalog);
            let mut session = CleanupSession::new();
            session
                .publish_catalog(catalog)
                .context("Failed to publish catalog")?;
            select(&mut session, &services, &ids, all)?;

            let catalog = session.catalog().expect("catalog just published").clone();
            let graph = DependencyGraph::build(&catalog);
            let plan = plan::plan(&catalog, &graph, session.selection())?;
            print_plan(&plan, &catalog);
        }

        Command::Cleanup {
            services,
            ids,
            all,
            execute,
        } => {
            let ctx = context(&args.profile, &settings).await;
            let registry = ProviderRegistry::standard(&ctx);
            let coordinator = DiscoveryCoordinator::new(&registry, &settings);
            let catalog = coordinator.discover().await;
            report_failures(&catalog);

            let mut session = CleanupSession::new();
            session
                .publish_catalog(catalog)
                .context("Failed to publish catalog")?;
            select(&mut session, &services, &ids, all)?;

            let catalog = session.catalog().expect("catalog just published").clone();
            let graph = DependencyGraph::build(&catalog);
            let plan = plan::plan(&catalog, &graph, session.selection())?;
            print_plan(&plan, &catalog);

            let safety = load_safety_config()?;
            let gate = AccountGate::new(ctx, safety);
            let engine = ExecutionEngine::new(&registry, &gate);

            let cancel = CancellationToken::new();
            let ctrlc = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current resource");
                    ctrlc.cancel();
                }
            });

            let permit = session
                .begin_execution()
                .context("Another execution is already running")?;
            let summary = engine
                .execute(
                    &plan,
                    &catalog,
                    &ExecuteOptions { dry_run: !execute },
                    &cancel,
                )
                .await;
            drop(permit);

            print_summary(&summary);
            if let Some(reason) = &summary.aborted {
                bail!("execution aborted: {reason}");
            }
            if summary.failed() > 0 {
                bail!("{} deletion(s) failed", summary.failed());
            }
        }

        Command::Accounts { action } => {
            let mut safety = load_safety_config()?;
            match action {
                AccountsAction::List => {
                    for account in &safety.safe_accounts {
                        println!("safe      {account}");
                    }
                    for account in &safety.protected_accounts {
                        println!("protected {account}");
                    }
                }
                AccountsAction::AddSafe { account_id } => {
                    safety.add_safe(AccountId(account_id));
                    save_safety_config(&safety)?;
                }
                AccountsAction::AddProtected { account_id } => {
                    safety.add_protected(AccountId(account_id));
                    save_safety_config(&safety)?;
                }
                AccountsAction::Remove { account_id } => {
                    let account = AccountId(account_id);
                    let removed =
                        safety.remove_safe(&account) | safety.remove_protected(&account);
                    if !removed {
                        warn!(account = %account, "Account was on neither list");
                    }
                    save_safety_config(&safety)?;
                }
            }
        }
    }

    Ok(())
}

async fn context(profile: &Option<String>, settings: &Settings) -> AwsContext {
    let region = settings
        .regions()
        .first()
        .map(String::as_str)
        .unwrap_or("us-east-1");
    AwsContext::with_profile(region, profile.as_deref()).await
}

async fn discover(profile: &Option<String>, settings: &Settings) -> Result<ResourceCatalog> {
    let ctx = context(profile, settings).await;
    let registry = ProviderRegistry::standard(&ctx);
    let coordinator = DiscoveryCoordinator::new(&registry, settings);
    Ok(coordinator.discover().await)
}

fn report_failures(catalog: &ResourceCatalog) {
    for failure in catalog.failures() {
        warn!(
            service = %failure.service,
            region = %failure.region,
            "Discovery failed: {:#}",
            failure.cause
        );
    }
}

fn parse_services(services: &[String]) -> BTreeSet<Service> {
    services.iter().map(|s| Service::parse(s)).collect()
}

fn select(
    session: &mut CleanupSession,
    services: &[String],
    ids: &[String],
    all: bool,
) -> Result<()> {
    if all {
        session.select_all();
    } else {
        let wanted = parse_services(services);
        let id_set: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        session.select_matching(|key| {
            wanted.contains(&key.service) || id_set.contains(key.id.as_str())
        });
    }

    if session.selection().is_empty() {
        bail!("nothing selected; use --service, --id, or --all");
    }
    info!(selected = session.selection().len(), "Selection ready");
    Ok(())
}

fn visible<'a>(
    catalog: &'a ResourceCatalog,
    filter: &'a BTreeSet<Service>,
) -> impl Iterator<Item = &'a Resource> {
    catalog
        .in_discovery_order()
        .filter(move |r| filter.is_empty() || filter.contains(&r.key.service))
}

fn print_catalog_table(catalog: &ResourceCatalog, filter: &BTreeSet<Service>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Service"),
            Cell::new("Region"),
            Cell::new("Kind"),
            Cell::new("ID"),
            Cell::new("Name"),
            Cell::new("Status"),
            Cell::new("Depends on"),
        ]);

    let mut count = 0;
    for resource in visible(catalog, filter) {
        let deps: Vec<&str> = resource.depends_on.iter().map(String::as_str).collect();
        table.add_row(vec![
            Cell::new(resource.key.service.as_str()),
            Cell::new(&resource.key.region),
            Cell::new(&resource.kind),
            Cell::new(&resource.key.id),
            Cell::new(resource.display_name()),
            Cell::new(&resource.status),
            Cell::new(deps.join(", ")),
        ]);
        count += 1;
    }

    if count == 0 {
        println!("No resources discovered");
    } else {
        println!("{table}");
        println!(
            "{count} resource(s), discovered at {}",
            catalog.discovered_at().format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

fn print_catalog_json(catalog: &ResourceCatalog, filter: &BTreeSet<Service>) -> Result<()> {
    let resources: Vec<&Resource> = visible(catalog, filter).collect();
    let out = serde_json::to_string_pretty(&resources)?;
    println!("{out}");
    Ok(())
}

fn print_plan(plan: &plan::DeletionPlan, catalog: &ResourceCatalog) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Service"),
            Cell::new("Region"),
            Cell::new("ID"),
            Cell::new("Name"),
        ]);

    for (index, key) in plan.ordered.iter().enumerate() {
        let name = catalog.get(key).map(Resource::display_name).unwrap_or("");
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(key.service.as_str()),
            Cell::new(&key.region),
            Cell::new(&key.id),
            Cell::new(name),
        ]);
    }
    println!("{table}");

    for (key, dependents) in &plan.warnings {
        let list: Vec<String> = dependents.iter().map(ToString::to_string).collect();
        warn!(
            key = %key,
            "Unselected resources depend on this one: {}",
            list.join(", ")
        );
    }
}

fn print_summary(summary: &ExecutionSummary) {
    let label = if summary.dry_run { "[dry run] " } else { "" };
    for (key, outcome) in &summary.outcomes {
        match outcome {
            ItemOutcome::Succeeded => println!("{label}deleted   {key}"),
            ItemOutcome::Simulated => println!("{label}would delete {key}"),
            ItemOutcome::Failed(e) => println!("{label}FAILED    {key}: {e}"),
            ItemOutcome::NotAttempted => println!("{label}skipped   {key}"),
        }
    }
    println!(
        "{label}{} succeeded, {} failed, {} not attempted",
        summary.succeeded(),
        summary.failed(),
        summary.not_attempted()
    );
}

fn load_safety_config() -> Result<SafetyConfig> {
    match config::safety_file_path() {
        Some(path) if path.exists() => SafetyConfig::load_from(&path),
        _ => Ok(SafetyConfig::default()),
    }
}

fn save_safety_config(safety: &SafetyConfig) -> Result<()> {
    let path = config::safety_file_path().context("Could not resolve the config directory")?;
    safety.save_to(&path)
}
