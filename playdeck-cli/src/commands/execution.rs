use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use super::{CommandErrors, Interactive};
use async_trait::async_trait;
use clap::ArgMatches;
use color_eyre::eyre::{Result, WrapErr};
use libplaydeck::config::{validate, ExecutionConfig, ExecutionRequest, ValidationErrors};
use libplaydeck::inventory::Inventory;
use libplaydeck::lifecycle::{ControllerError, Execution, ExecutionController, ExecutionSink, Phase};
use libplaydeck::log::*;
use libplaydeck::logs::filter::format_entry;
use libplaydeck::logs::{DisplayOptions, ExportError, LogConsole, LogFilter, LogLevel};
use libplaydeck::stream::{LogSource, PartialLogStream};
use libplaydeck::target::{HostSelector, SelectionMode};
use regex::Regex;
use time::OffsetDateTime;
use tokio::fs;

use crate::backend::HttpBackend;

/// Export file name prefixes end up in a path.
const EXPORT_CONTEXT_PATTERN: &str = r"^[A-Za-z0-9_-]+$";

/// Prints controller notifications to the terminal.
#[derive(Debug, Default)]
struct ConsoleSink;

impl ExecutionSink for ConsoleSink {
    fn on_execute(&mut self, execution: &Execution) {
        println!(
            "* execution {} started ({}).",
            execution.id(),
            execution.status().label()
        );
    }

    fn on_validation_error(&mut self, errors: &ValidationErrors) {
        print_validation_errors(errors);
    }
}

fn print_validation_errors(errors: &ValidationErrors) {
    println!("* execution config is invalid.");
    for error in errors.errors() {
        println!("** {}: {}", error.field(), error);
    }
}

/// Print the visible entries past the first `printed`, returning the new
/// count.
fn print_new_entries(console: &mut LogConsole, printed: usize) -> usize {
    let display = console.engine().filter().display;
    let view = console.view();
    for entry in view.since(printed) {
        println!("{}", format_entry(entry, &display));
    }
    view.len()
}

pub struct ExecutionCommand;

impl ExecutionCommand {
    async fn read_inventory<S: Into<String>>(&self, path: S) -> Result<Inventory> {
        let inventory = fs::read_to_string(path.into())
            .await
            .wrap_err("Failed reading inventory file")?;
        serde_yaml::from_str(inventory.as_str()).wrap_err("deserializing inventory")
    }

    async fn read_config<S: Into<String>>(&self, path: S) -> Result<ExecutionConfig> {
        let config = fs::read_to_string(path.into())
            .await
            .wrap_err("Failed reading execution config file")?;
        serde_yaml::from_str(config.as_str()).wrap_err("deserializing execution config")
    }

    /// Read the inventory and the config, then apply the selection flags.
    async fn load<'a>(&self, matches: &'a ArgMatches) -> Result<(Inventory, ExecutionConfig)> {
        let inventory_file =
            self.read_argument_with_validator(matches, "inventory", &mut |_| Ok(()))?;
        let config_file = self.read_argument_with_validator(matches, "config", &mut |_| Ok(()))?;
        let inventory = self.read_inventory(inventory_file).await?;
        let mut config = self.read_config(config_file).await?;
        self.apply_selection(matches, &inventory, &mut config);
        Ok((inventory, config))
    }

    /// Without any selection flag the config's own host ids are kept.
    fn apply_selection(
        &self,
        matches: &ArgMatches,
        inventory: &Inventory,
        config: &mut ExecutionConfig,
    ) {
        let mut selector = HostSelector::new();
        if let Some(filter) = matches.get_one::<String>("filter") {
            selector.set_filter(filter.as_str());
        }

        if let Some(group) = matches.get_one::<u64>("group") {
            if inventory.group(*group).is_none() {
                warn!("group {} is not in the inventory", group);
            }
            selector.set_mode(SelectionMode::Group);
            selector.select_group(Some(*group));
        } else {
            let hosts: BTreeSet<u64> = matches
                .get_many::<u64>("host")
                .map(|ids| ids.copied().collect())
                .unwrap_or_default();
            let select_all = matches.get_flag("select-all");
            if hosts.is_empty() && !select_all {
                return;
            }
            for id in hosts {
                if inventory.host(id).is_none() {
                    warn!("host {} is not in the inventory", id);
                }
                selector.toggle(id);
            }
            if select_all {
                selector.select_all(inventory);
            }
        }

        config.selected_host_ids = selector.resolve(inventory);
        debug!(
            "selected {} host(s) in {:?} mode",
            config.selected_host_ids.len(),
            selector.mode()
        );
    }

    fn print_summary(&self, inventory: &Inventory, request: &ExecutionRequest, config: &ExecutionConfig) {
        println!(
            "** targets: {}",
            inventory.names_for(request.host_ids()).join(", ")
        );
        if let Some(options) = request.options() {
            if options.parallel {
                println!("** parallel: up to {} host(s) at once", options.max_parallel_hosts);
            }
            println!("** verbosity: {}", options.verbose_level);
        }
        for note in config.run_mode_notes() {
            println!("** {}", note);
        }
    }

    fn log_filter(&self, matches: &ArgMatches) -> Result<LogFilter> {
        let levels = matches
            .get_many::<String>("level")
            .into_iter()
            .flatten()
            .map(|level| {
                level
                    .parse::<LogLevel>()
                    .map_err(|_| CommandErrors::InvalidLogLevel(level.clone()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        let hosts: Vec<String> = matches
            .get_many::<String>("log-host")
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        let display = DisplayOptions {
            show_timestamp: !matches.get_flag("no-timestamp"),
            show_host: !matches.get_flag("no-host"),
            show_level: !matches.get_flag("no-level"),
        };
        let mut filter = LogFilter::new()
            .with_levels(levels)
            .with_hosts(hosts)
            .with_display(display);
        if let Some(search) = matches.get_one::<String>("search") {
            filter = filter.with_search(search.as_str());
        }
        Ok(filter)
    }

    async fn subcommand_validate<'a>(
        &self,
        _context: &'a super::CliContext<'a>,
        matches: &'a ArgMatches,
    ) -> Result<()> {
        let (inventory, config) = self.load(matches).await?;
        match validate(&config) {
            Ok(request) => {
                info!("execution config is valid.");
                println!("* execution config is valid.");
                self.print_summary(&inventory, &request, &config);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&request).wrap_err("serializing request")?
                );
                Ok(())
            }
            Err(errors) => {
                error!("execution config is invalid.");
                print_validation_errors(&errors);
                Err(CommandErrors::InvalidExecutionConfig.into())
            }
        }
    }

    async fn subcommand_run<'a>(
        &self,
        context: &'a super::CliContext<'a>,
        matches: &'a ArgMatches,
    ) -> Result<()> {
        let (inventory, config) = self.load(matches).await?;
        let playbook = *matches
            .get_one::<u64>("playbook")
            .ok_or_else(|| CommandErrors::RequiredUserInputMissing("playbook".into()))?;
        let api = self.read_argument_with_validator(matches, "api", &mut |_| Ok(()))?;
        let context_regex = Regex::new(EXPORT_CONTEXT_PATTERN)?;
        let export_context =
            self.read_argument_with_regex_validation(matches, "context", &context_regex)?;
        let export_dir = matches.get_one::<String>("export-dir").map(PathBuf::from);
        let poll_interval =
            Duration::from_millis(matches.get_one::<u64>("poll-ms").copied().unwrap_or(1000));
        let filter = self.log_filter(matches)?;

        let backend = HttpBackend::new(context.client.clone(), api);
        let mut controller = ExecutionController::with_sink(playbook, backend, ConsoleSink);

        let request = match controller.validate(&config) {
            Ok(request) => request,
            Err(ControllerError::Validation(_)) => {
                return Err(CommandErrors::InvalidExecutionConfig.into())
            }
            Err(err) => return Err(err.into()),
        };
        println!("* playbook {}:", playbook);
        self.print_summary(&inventory, &request, &config);

        if !matches.get_flag("yes") {
            let prompt = format!(
                "Run playbook {} on {} host(s)?",
                playbook,
                request.host_ids().len()
            );
            if !self.prompt_for_confirmation(&prompt)? {
                controller.cancel()?;
                println!("* execution cancelled.");
                return Ok(());
            }
        }

        let execution = controller.submit().await?;
        let execution_id = *execution.id();
        let mut source = controller.backend().log_source(execution_id);
        let mut console = LogConsole::with_filter(filter);
        println!("* showing logs: {}", console.engine().filter().label());

        let mut phase = controller.phase();
        let mut printed = 0;
        loop {
            if !phase.is_terminal() {
                match controller.poll().await {
                    Ok(next) => phase = next,
                    Err(ControllerError::Poll(err)) => warn!("status poll failed: {}", err),
                    Err(err) => return Err(err.into()),
                }
            }
            // Covers submissions that were accepted already finished.
            if phase.is_terminal() {
                source.finish();
            }
            match source.source().await {
                Ok(PartialLogStream::Next(records)) => {
                    let report = console.ingest_batch(records);
                    for rejected in &report.rejected {
                        warn!("skipping log record: {}", rejected);
                    }
                    printed = print_new_entries(&mut console, printed);
                    if !phase.is_terminal() {
                        tokio::time::sleep(poll_interval).await;
                    }
                }
                Ok(PartialLogStream::End) => break,
                Err(err) => {
                    warn!("fetching logs failed: {}", err);
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }

        println!("* execution {} {}.", execution_id, phase);
        for (level, count) in console.engine().level_counts() {
            println!("** {}: {}", level, count);
        }

        if let Some(dir) = export_dir {
            fs::create_dir_all(&dir)
                .await
                .wrap_err_with(|| format!("creating export directory {}", dir.display()))?;
            match console.export(&export_context, execution_id, OffsetDateTime::now_utc()) {
                Ok(artifact) => {
                    let path = artifact.write_to(&dir).await?;
                    println!("* exported logs to {}", path.display());
                }
                Err(ExportError::Empty) => println!("* no log entries to export."),
                Err(err) => return Err(err.into()),
            }
        }

        if phase == Phase::Failed {
            return Err(CommandErrors::ExecutionFailed(execution_id).into());
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> super::Command<'a> for ExecutionCommand {
    fn new() -> Self
    where
        Self: Sized,
    {
        Self {}
    }

    async fn run(&self, context: &'a super::CliContext) -> Result<()> {
        match context.matches.subcommand() {
            Some(("validate", matches)) => {
                self.subcommand_validate(context, matches).await?;
            }
            Some(("run", matches)) => {
                self.subcommand_run(context, matches).await?;
            }
            Some((name, _)) => return Err(CommandErrors::InvalidSubcommand(name.to_string()).into()),
            None => return Err(CommandErrors::NoSubcommandProvided.into()),
        }
        Ok(())
    }
}

impl<'a> super::Interactive<'a> for ExecutionCommand {}
