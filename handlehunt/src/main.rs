use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use handlehunt::handlers::{
    DEFAULT_DB_PATH, handle_catalog_list, handle_catalog_sync, handle_forget, handle_history, handle_init,
    handle_scan,
};
use handlehunt_core::print_banner;
use tracing::Level;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if quiet { Level::ERROR } else { Level::WARN })
        .init();

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    if let Err(e) = dispatch(&chosen_command, quiet).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(matches: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    let db = matches
        .get_one::<String>("db")
        .map_or(DEFAULT_DB_PATH, String::as_str);

    match matches.subcommand() {
        Some(("init", primary_command)) => handle_init(primary_command).await,
        Some(("catalog", primary_command)) => match primary_command.subcommand() {
            Some(("sync", secondary_command)) => handle_catalog_sync(secondary_command, db).await,
            Some(("list", secondary_command)) => handle_catalog_list(secondary_command, db),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("scan", primary_command)) => handle_scan(primary_command, db, quiet).await,
        Some(("history", primary_command)) => handle_history(primary_command, db),
        Some(("forget", primary_command)) => handle_forget(primary_command, db),
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
