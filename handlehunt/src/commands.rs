use crate::CLAP_STYLING;
use clap::{arg, command};
use handlehunt::handlers::{DEFAULT_CONFIG_DIR, DEFAULT_DB_PATH};
use handlehunt_scanner::catalog::DEFAULT_CATALOG_URL;

fn catalog_source_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(--"catalog-url" <URL>)
            .required(false)
            .help("Fetch the site catalog from this URL")
            .default_value(DEFAULT_CATALOG_URL)
            .conflicts_with("catalog-file"),
    )
    .arg(
        arg!(--"catalog-file" <PATH>)
            .required(false)
            .help("Read the site catalog from a local wmn-data.json file")
            .value_parser(clap::value_parser!(std::path::PathBuf)),
    )
}

fn report_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-o --"output" <PATH>)
            .required(false)
            .help("Save report to file (default: display to screen)")
            .value_parser(clap::value_parser!(std::path::PathBuf)),
    )
    .arg(
        arg!(-f --"format" <FORMAT>)
            .required(false)
            .help("Report format: text, json")
            .value_parser(["text", "json"])
            .default_value("text"),
    )
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("handlehunt")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("handlehunt")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(--"db" <PATH>)
                .required(false)
                .global(true)
                .help("Location of the handlehunt database")
                .default_value(DEFAULT_DB_PATH),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the handlehunt database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Directory to store the handlehunt database in")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f - -"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("catalog")
                .about("Manage the local copy of the site catalog")
                .subcommand_required(true)
                .subcommand(catalog_source_args(
                    command!("sync").about("Download the site catalog and store it in the database"),
                ))
                .subcommand(
                    command!("list").about("List the sites in the stored catalog").arg(
                        arg!(-c --"category" <CATEGORY>)
                            .required(false)
                            .help("Only list sites in this category"),
                    ),
                ),
        )
        .subcommand(report_args(catalog_source_args(
            command!("scan")
                .about("Check which sites in the catalog have an account for a username")
                .arg(arg!(<HANDLE>).help("The username to look for"))
                .arg(
                    arg!(-r --"refresh")
                        .required(false)
                        .help("Discard any previous results for this username and search again")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-w --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of concurrent probes.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("32"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-site request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                ),
        )))
        .subcommand(report_args(
            command!("history")
                .about("Show stored results")
                .arg(
                    arg!([HANDLE])
                        .required(false)
                        .help("Show the matches for this username instead of listing all searches"),
                ),
        ))
        .subcommand(
            command!("forget")
                .about("Delete the stored results for a username")
                .arg(arg!(<HANDLE>).help("The username to forget")),
        )
}
