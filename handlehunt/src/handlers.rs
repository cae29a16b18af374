use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use handlehunt_core::config::{DEFAULT_CONCURRENCY, EngineConfig};
use handlehunt_core::data::Database;
use handlehunt_core::engine::{ScanEngine, ScanRequest};
use handlehunt_core::progress::{ProgressEvent, ProgressSink, SinkError};
use handlehunt_core::report::{
    ReportFormat, generate_history_report, generate_json_report, generate_search_report, save_report,
};
use handlehunt_core::store::ResultStore;
use handlehunt_scanner::catalog::DEFAULT_CATALOG_URL;
use handlehunt_scanner::{CatalogSource, FileCatalog, RemoteCatalog, SiteDefinition};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/handlehunt/";
pub const DEFAULT_DB_PATH: &str = "~/.config/handlehunt/handlehunt.db";
pub const DB_FILE_NAME: &str = "handlehunt.db";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

// Helper functions

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Open an existing database; never creates one implicitly
pub fn open_database(raw: &str) -> Result<Database> {
    let path = expand_path(raw);
    if !Database::exists(&path) {
        bail!(
            "No database at {}. Run `handlehunt init` first or pass --db",
            path.display()
        );
    }
    Database::new(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Create the config directory and a fresh database inside it
pub fn create_database(config_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create config directory {}", config_dir.display()))?;
    let db_path = config_dir.join(DB_FILE_NAME);
    Database::new(&db_path).with_context(|| format!("Failed to create database {}", db_path.display()))?;
    Ok(db_path)
}

/// Pick the catalog source from `--catalog-file` / `--catalog-url`
pub fn catalog_source(url: Option<&String>, file: Option<&PathBuf>) -> Result<Box<dyn CatalogSource>> {
    if let Some(file) = file {
        return Ok(Box::new(FileCatalog::new(file)));
    }
    let url = url.map(String::as_str).unwrap_or(DEFAULT_CATALOG_URL);
    Ok(Box::new(RemoteCatalog::with_url(url)?))
}

/// Where the catalog used for a scan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOrigin {
    Fetched(usize),
    Stored(usize),
}

/// Load the engine's catalog from `source`, falling back to the snapshot
/// stored in the database. A successful fetch replaces the snapshot.
pub async fn load_catalog(engine: &ScanEngine, db: &Database, source: &dyn CatalogSource) -> Result<CatalogOrigin> {
    match engine.refresh_catalog(source).await {
        Ok(count) => {
            db.replace_catalog(&engine.catalog().await)?;
            Ok(CatalogOrigin::Fetched(count))
        }
        Err(e) => {
            let stored = db.load_catalog()?;
            warn!("Catalog unavailable ({}), using {} stored sites", e, stored.len());
            let count = stored.len();
            engine.set_catalog(stored).await;
            Ok(CatalogOrigin::Stored(count))
        }
    }
}

/// Progress sink that reports each newly found site above the spinner
pub fn progress_sink(bar: ProgressBar) -> Arc<dyn ProgressSink> {
    Arc::new(move |event: &ProgressEvent| -> Result<(), SinkError> {
        if let ProgressEvent::Progress {
            handle,
            found_so_far,
            total_sites,
        } = event
        {
            if let Some(site) = found_so_far.last() {
                bar.println(format!(
                    "  {} {} {}",
                    "✓".green().bold(),
                    site.name.bright_white(),
                    site.render(handle).dimmed()
                ));
            }
            bar.set_message(format!(
                "{} found, checking {} sites...",
                found_so_far.len(),
                total_sites
            ));
        }
        Ok(())
    })
}

fn spinner(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a String> {
    args.get_one::<String>(name)
        .ok_or_else(|| anyhow!("missing required argument <{}>", name))
}

fn report_format(args: &ArgMatches) -> Result<ReportFormat> {
    match args.get_one::<String>("format") {
        Some(format) => ReportFormat::from_str(format).ok_or_else(|| anyhow!("unknown report format '{}'", format)),
        None => Ok(ReportFormat::Text),
    }
}

/// Print the report, or write it to `--output` when given
fn deliver_report(report: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            save_report(report, path).with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", report),
    }
    Ok(())
}

/// Renders the stored matches for a handle. `sites_checked` is only known
/// right after a search finishes; without it the text report is the
/// history view.
pub fn stored_report(db: &Database, handle: &str, format: ReportFormat, sites_checked: Option<usize>) -> Result<String> {
    let correlations = db.get_correlations(handle)?;
    let report = match (format, sites_checked) {
        (ReportFormat::Json, _) => generate_json_report(handle, &correlations, sites_checked)?,
        (ReportFormat::Text, Some(total)) => {
            let sites: Vec<SiteDefinition> = correlations.into_iter().map(|c| c.site).collect();
            generate_search_report(handle, &sites, total)
        }
        (ReportFormat::Text, None) => generate_history_report(handle, &correlations),
    };
    Ok(report)
}

/// Shown when a scan is answered from history. Only a running process
/// knows whether the earlier search failed, so the stored matches may be
/// partial.
pub fn cached_results_notice(handle: &str) -> String {
    format!(
        "'{}' was searched before, showing stored results. They may be incomplete if that \
         search failed (use --refresh to search again)",
        handle
    )
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

// Command handlers

pub async fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  HANDLEHUNT INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let force = args.get_flag("force");
    let config_dir = expand_path(args.get_one::<String>("PATH").map_or(DEFAULT_CONFIG_DIR, String::as_str));
    let db_path = config_dir.join(DB_FILE_NAME);

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    if Database::exists(&db_path) {
        let overwrite = if force {
            true
        } else {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!("  {} {}", "•".yellow(), db_path.display().to_string().bright_white());
            println!();
            println!("{}", "This will delete all stored search results.".yellow());

            let response = print_prompt("Would you like to overwrite it? [y/N]:")?;
            println!();
            response == "y" || response == "yes"
        };

        if !overwrite {
            println!("{} Keeping existing database", "→".blue());
            return Ok(());
        }
        Database::drop(&db_path).with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Existing database removed", "✓".green().bold());
    }

    println!("{} Creating database...", "→".blue());
    let db_path = create_database(&config_dir)?;
    println!(
        "{} Database initialized: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();

    let sync_catalog = if force {
        true
    } else {
        println!("{}", "CATALOG SETUP".bright_blue().bold());
        println!("handlehunt checks usernames against the WhatsMyName site catalog.");
        println!("{} {}", "Source:".blue(), DEFAULT_CATALOG_URL.bright_white());
        println!();

        let response = print_prompt("Would you like to download it now? [Y/n]:")?;
        println!();
        response != "n" && response != "no"
    };

    if sync_catalog {
        let db = Database::new(&db_path)?;
        match RemoteCatalog::new()?.fetch_catalog().await {
            Ok(sites) => {
                let stored = db.replace_catalog(&sites)?;
                println!("{} Stored {} sites", "✓".green().bold(), stored.to_string().cyan());
            }
            Err(e) => {
                println!("{} Could not download the catalog: {}", "✗".red().bold(), e);
                println!("{} Run `handlehunt catalog sync` later", "ℹ".blue());
            }
        }
    } else {
        println!("{} Skipping catalog download", "→".blue());
    }

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    if db_path != expand_path(DEFAULT_DB_PATH) {
        println!("{} Pass --db {} to use it", "ℹ".blue(), db_path.display());
    }
    println!();
    Ok(())
}

pub async fn handle_catalog_sync(args: &ArgMatches, db_arg: &str) -> Result<()> {
    let db = open_database(db_arg)?;
    let source = catalog_source(
        args.get_one::<String>("catalog-url"),
        args.get_one::<PathBuf>("catalog-file"),
    )?;

    let sites = source.fetch_catalog().await?;
    let stored = db.replace_catalog(&sites)?;
    let disabled = sites.iter().filter(|site| !site.is_enabled()).count();

    info!("Catalog snapshot replaced with {} sites", stored);
    println!(
        "{} Stored {} sites ({} disabled by the catalog)",
        "✓".green().bold(),
        stored.to_string().cyan(),
        disabled
    );
    Ok(())
}

/// Sites grouped by category, optionally restricted to one category
pub fn group_catalog<'a>(sites: &'a [SiteDefinition], category: Option<&str>) -> BTreeMap<&'a str, Vec<&'a SiteDefinition>> {
    let mut by_category: BTreeMap<&str, Vec<&SiteDefinition>> = BTreeMap::new();
    for site in sites {
        if category.is_some_and(|wanted| !site.category.eq_ignore_ascii_case(wanted)) {
            continue;
        }
        by_category.entry(site.category.as_str()).or_default().push(site);
    }
    by_category
}

pub fn handle_catalog_list(args: &ArgMatches, db_arg: &str) -> Result<()> {
    let db = open_database(db_arg)?;
    let sites = db.load_catalog()?;

    if sites.is_empty() {
        println!("No stored catalog. Run `handlehunt catalog sync` first.");
        return Ok(());
    }

    let by_category = group_catalog(&sites, args.get_one::<String>("category").map(String::as_str));
    for (category, sites) in &by_category {
        println!("## {}", category.bright_blue().bold());
        for site in sites {
            let disabled = if site.is_enabled() { "" } else { " (disabled)" };
            println!("  {} {}{}", site.name.bright_white(), site.uri_template.dimmed(), disabled.yellow());
        }
        println!();
    }
    let listed: usize = by_category.values().map(Vec::len).sum();
    println!("{} sites", listed);
    Ok(())
}

pub async fn handle_scan(args: &ArgMatches, db_arg: &str, quiet: bool) -> Result<()> {
    let handle = required(args, "HANDLE")?;
    let refresh = args.get_flag("refresh");
    let format = report_format(args)?;
    let output = args.get_one::<PathBuf>("output");
    let workers = *args.get_one::<usize>("workers").unwrap_or(&DEFAULT_CONCURRENCY);
    let timeout = *args.get_one::<u64>("timeout").unwrap_or(&DEFAULT_TIMEOUT_SECS);

    let config = EngineConfig::default()
        .with_concurrency(workers)
        .with_probe_timeout(Duration::from_secs(timeout));

    let db = Arc::new(open_database(db_arg)?);
    let bar = spinner(quiet)?;
    let engine = Arc::new(ScanEngine::new(db.clone(), config)?.with_progress_sink(progress_sink(bar.clone())));

    bar.set_message("Loading site catalog...");
    let source = catalog_source(
        args.get_one::<String>("catalog-url"),
        args.get_one::<PathBuf>("catalog-file"),
    )?;
    match load_catalog(&engine, &db, source.as_ref()).await? {
        CatalogOrigin::Fetched(count) => bar.println(format!("{} Loaded {} sites", "✓".green().bold(), count)),
        CatalogOrigin::Stored(count) => bar.println(format!(
            "{} Catalog unavailable, using {} stored sites",
            "⚠".yellow().bold(),
            count
        )),
    }

    let mut subscription = engine.subscribe(handle);
    let task = match engine.request_scan(handle, refresh).await? {
        ScanRequest::CacheHit(correlations) => {
            bar.finish_and_clear();
            println!("{} {}\n", "ℹ".blue(), cached_results_notice(handle));
            let report = match format {
                ReportFormat::Json => generate_json_report(handle, &correlations, None)?,
                ReportFormat::Text => generate_history_report(handle, &correlations),
            };
            return deliver_report(&report, output);
        }
        ScanRequest::AlreadyInProgress(task) => {
            bar.finish_and_clear();
            bail!("A search for '{}' is already running (task {})", handle, task.id);
        }
        ScanRequest::Accepted(task) => task,
    };

    bar.set_message(format!("Checking {} sites for '{}'...", task.total_sites, handle));

    while let Some(event) = subscription.recv().await {
        match event {
            ProgressEvent::Progress { .. } => {}
            ProgressEvent::Complete { .. } => {
                bar.finish_and_clear();
                println!("\n{} Search complete!\n", "✓".green().bold());
                let report = stored_report(&db, handle, format, Some(task.total_sites))?;
                return deliver_report(&report, output);
            }
            ProgressEvent::Failed { error, .. } => {
                bar.abandon();
                bail!("Search for '{}' failed: {}", handle, error);
            }
        }
    }

    bar.abandon();
    bail!("Lost track of the search for '{}'", handle)
}

pub fn handle_history(args: &ArgMatches, db_arg: &str) -> Result<()> {
    let db = open_database(db_arg)?;

    if let Some(handle) = args.get_one::<String>("HANDLE") {
        if !db.has_search_record(handle)? {
            println!("No stored results for '{}'", handle);
            return Ok(());
        }
        let report = stored_report(&db, handle, report_format(args)?, None)?;
        return deliver_report(&report, args.get_one::<PathBuf>("output"));
    }

    let searches = db.list_searches()?;
    if searches.is_empty() {
        println!("No searches stored yet");
        return Ok(());
    }
    for (handle, searched_at) in searches {
        println!(
            "  {} {}",
            handle.bright_white(),
            searched_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    Ok(())
}

pub fn handle_forget(args: &ArgMatches, db_arg: &str) -> Result<()> {
    let handle = required(args, "HANDLE")?;
    let db = open_database(db_arg)?;

    if !db.has_search_record(handle)? {
        println!("No stored results for '{}'", handle);
        return Ok(());
    }
    db.delete_search_history(handle)?;
    println!("{} Forgot '{}'", "✓".green().bold(), handle);
    Ok(())
}
