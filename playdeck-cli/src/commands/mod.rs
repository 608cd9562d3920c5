use async_trait::async_trait;
use clap::ArgMatches;
use color_eyre::eyre::{Result, WrapErr};
use dialoguer::Confirm;
use regex::Regex;
use thiserror::Error;

pub mod execution;

#[derive(Error, Debug)]
pub enum CommandErrors {
    #[error("Prompt interaction failed.")]
    PromptInteractionFailed(
        #[from]
        #[source]
        dialoguer::Error,
    ),
    #[error("Required user input `{0}` is missing.")]
    RequiredUserInputMissing(String),
    #[error("Argument `{0}` failed validation `{1}`")]
    InputValidationFailure(String, String),
    #[error("Unknown log level `{0}`.")]
    InvalidLogLevel(String),
    #[error("Execution config is invalid.")]
    InvalidExecutionConfig,
    #[error("Execution {0} failed.")]
    ExecutionFailed(u64),
    #[error("Invalid subcommand `{0}`.")]
    InvalidSubcommand(String),
    #[error("No subcommand provided.")]
    NoSubcommandProvided,
}

pub struct CliContext<'a> {
    pub client: reqwest::Client,
    pub matches: &'a ArgMatches,
}

impl<'a> CliContext<'a> {
    pub fn new(matches: &'a ArgMatches) -> Self {
        Self {
            client: reqwest::Client::new(),
            matches,
        }
    }
}

#[async_trait]
pub trait Command<'a> {
    fn new() -> Self
    where
        Self: Sized;

    async fn run(&self, context: &'a CliContext) -> Result<()>;
}

pub trait Interactive<'a> {
    fn prompt_for_confirmation(&self, message: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
            .map_err(CommandErrors::PromptInteractionFailed)
            .wrap_err("Prompting for confirmation failed.")
    }

    /// Read argument from the CLI args with a validation function.
    fn read_argument_with_validator<V>(
        &self,
        arg_matches: &'a ArgMatches,
        id: &'a str,
        validator: &mut V,
    ) -> Result<String>
    where
        V: FnMut(&String) -> Result<(), CommandErrors>,
    {
        if let Some(arg) = arg_matches.get_one::<String>(id) {
            validator(arg)?;
            Ok(arg.clone())
        } else {
            Err(CommandErrors::RequiredUserInputMissing(id.into()))?
        }
    }

    /// Read argument from the CLI args with regex validation.
    fn read_argument_with_regex_validation(
        &self,
        arg_matches: &'a ArgMatches,
        id: &'a str,
        regex: &Regex,
    ) -> Result<String> {
        self.read_argument_with_validator(arg_matches, id, &mut |input| {
            if regex.is_match(input) {
                Ok(())
            } else {
                Err(CommandErrors::InputValidationFailure(
                    id.into(),
                    regex.as_str().into(),
                ))
            }
        })
    }
}
