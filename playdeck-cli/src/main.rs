#![forbid(unsafe_code)]

use clap::{command, value_parser, Arg, ArgAction};
use color_eyre::eyre::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;

use crate::commands::Command;

mod backend;
mod commands;

use libplaydeck::log::*;

fn selection_args() -> [Arg; 6] {
    [
        Arg::new("inventory")
            .help("Path to the host inventory file.")
            .short('i')
            .long("inventory")
            .required(true),
        Arg::new("config")
            .help("Path to the execution config file.")
            .short('c')
            .long("config")
            .required(true),
        Arg::new("group")
            .help("Target every host in this group. Overrides --host.")
            .short('g')
            .long("group")
            .value_parser(value_parser!(u64))
            .conflicts_with_all(["host", "select-all"]),
        Arg::new("host")
            .help("Target this host id. Can be repeated.")
            .long("host")
            .value_parser(value_parser!(u64))
            .action(ArgAction::Append),
        Arg::new("filter")
            .help("Only consider hosts whose name or address contains this text.")
            .long("filter"),
        Arg::new("select-all")
            .help("Select every host matching --filter.")
            .long("select-all")
            .action(ArgAction::SetTrue),
    ]
}

/// Command configuration
fn cli() -> clap::Command {
    command!()
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Turn debugging information on. Overrides -q. Can specify up to -vvvv.")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Silence all output. Overridden by -v.")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            command!("execution")
                .about("Configure and run playbook executions.")
                .subcommand(
                    command!("validate")
                        .about("Validate an execution config against the inventory.")
                        .args(selection_args()),
                )
                .subcommand(
                    command!("run")
                        .about("Validate, confirm, submit, and follow an execution.")
                        .args(selection_args())
                        .arg(
                            Arg::new("playbook")
                                .help("Id of the playbook to execute.")
                                .short('p')
                                .long("playbook")
                                .value_parser(value_parser!(u64))
                                .required(true),
                        )
                        .arg(
                            Arg::new("api")
                                .help("Base URL of the execution backend.")
                                .long("api")
                                .env("PLAYDECK_API_URL")
                                .required(true),
                        )
                        .arg(
                            Arg::new("yes")
                                .help("Don't ask for confirmation before submitting.")
                                .short('y')
                                .long("yes")
                                .action(ArgAction::SetTrue),
                        )
                        .arg(
                            Arg::new("level")
                                .help("Only show log entries of this level. Can be repeated.")
                                .short('l')
                                .long("level")
                                .action(ArgAction::Append),
                        )
                        .arg(
                            Arg::new("search")
                                .help("Only show log entries containing this text.")
                                .short('s')
                                .long("search"),
                        )
                        .arg(
                            Arg::new("log-host")
                                .help("Only show log entries from this host. Can be repeated.")
                                .long("log-host")
                                .action(ArgAction::Append),
                        )
                        .arg(Arg::new("no-timestamp").help("Hide timestamps.").long("no-timestamp").action(ArgAction::SetTrue))
                        .arg(Arg::new("no-host").help("Hide host names.").long("no-host").action(ArgAction::SetTrue))
                        .arg(Arg::new("no-level").help("Hide log levels.").long("no-level").action(ArgAction::SetTrue))
                        .arg(
                            Arg::new("export-dir")
                                .help("Write the filtered log to this directory when the run finishes.")
                                .short('e')
                                .long("export-dir"),
                        )
                        .arg(
                            Arg::new("context")
                                .help("Prefix for the export file name.")
                                .long("context")
                                .default_value("playbook"),
                        )
                        .arg(
                            Arg::new("poll-ms")
                                .help("Milliseconds between status and log polls.")
                                .long("poll-ms")
                                .value_parser(value_parser!(u64))
                                .default_value("1000"),
                        ),
                ),
        )
        .subcommand_required(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre()?;

    let matches = cli().get_matches();

    // Set up logging
    let logging_config = tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::new(
            time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        ))
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
        .compact();

    let quiet = matches.get_flag("quiet");
    let verbose = matches.get_count("verbose") as usize;
    let level = if quiet && verbose == 0 {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::ERROR,
            1 => LevelFilter::WARN,
            2 => LevelFilter::INFO,
            3 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    logging_config.with_max_level(level).finish().init();

    // Run the commands
    if let Some((subcommand, matches)) = matches.subcommand() {
        let ctx = commands::CliContext::new(matches);
        debug!(
            "matched subcommand {} with matches: {:?}",
            &subcommand,
            &matches.ids().map(|id| id.as_str()).collect::<Vec<_>>()
        );
        match subcommand {
            "execution" => commands::execution::ExecutionCommand::new().run(&ctx).await?,
            _ => return Err(commands::CommandErrors::InvalidSubcommand(subcommand.into()).into()),
        }
    }
    Ok(())
}
