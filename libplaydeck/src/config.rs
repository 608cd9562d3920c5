//! Execution configuration drafts and their validation into an immutable
//! [`ExecutionRequest`].

use std::collections::BTreeSet;
use std::fmt;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::inventory::HostId;
use crate::log::*;

pub type Variables = Map<String, Value>;

/// Key under which the run-time options are injected into the merged
/// variables.
pub const EXECUTION_OPTIONS_KEY: &str = "_execution_options";

pub const VERBOSE_LEVEL_MIN: i64 = 0;
pub const VERBOSE_LEVEL_MAX: i64 = 4;

/// Parallelism the UI offers. Exceeding it is allowed but logged.
pub const PARALLEL_HOSTS_SOFT_LIMIT: i64 = 50;

pub fn default_max_parallel_hosts() -> i64 {
    5
}

/// A mutable execution draft as edited by the user.
///
/// Numeric fields are signed so that out-of-range input survives until
/// validation reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub selected_host_ids: BTreeSet<HostId>,
    /// Defaults from the playbook.
    pub variables: Variables,
    /// Raw JSON text typed by the user. Keys override `variables`.
    pub custom_variables: String,
    pub execute_in_parallel: bool,
    pub max_parallel_hosts: i64,
    pub verbose_level: i64,
    pub continue_on_error: bool,
    pub dry_run: bool,
    pub check_mode: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            selected_host_ids: BTreeSet::new(),
            variables: Variables::new(),
            custom_variables: String::new(),
            execute_in_parallel: false,
            max_parallel_hosts: default_max_parallel_hosts(),
            verbose_level: VERBOSE_LEVEL_MIN,
            continue_on_error: false,
            dry_run: false,
            check_mode: false,
        }
    }
}

impl ExecutionConfig {
    pub fn new(variables: Variables) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Notes shown when the user is asked to confirm the run. Dry-run and
    /// check mode are independent; when both are set both notes are shown.
    pub fn run_mode_notes(&self) -> Vec<&'static str> {
        let mut notes = vec![];
        if self.dry_run {
            notes.push("dry run: tasks are listed but not executed");
        }
        if self.check_mode {
            notes.push("check mode: changes are predicted but not applied");
        }
        notes
    }

    pub fn options(&self) -> ExecutionOptions {
        ExecutionOptions {
            parallel: self.execute_in_parallel,
            max_parallel_hosts: self.max_parallel_hosts,
            continue_on_error: self.continue_on_error,
            verbose_level: self.verbose_level,
            dry_run: self.dry_run,
            check_mode: self.check_mode,
        }
    }
}

/// Run-time options, copied verbatim from the draft into the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    pub parallel: bool,
    pub max_parallel_hosts: i64,
    pub continue_on_error: bool,
    pub verbose_level: i64,
    pub dry_run: bool,
    pub check_mode: bool,
}

impl ExecutionOptions {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "parallel": self.parallel,
            "max_parallel_hosts": self.max_parallel_hosts,
            "continue_on_error": self.continue_on_error,
            "verbose_level": self.verbose_level,
            "dry_run": self.dry_run,
            "check_mode": self.check_mode,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigField {
    #[serde(rename = "selectedHostIds")]
    SelectedHostIds,
    #[serde(rename = "customVariables")]
    CustomVariables,
    #[serde(rename = "maxParallelHosts")]
    MaxParallelHosts,
    #[serde(rename = "verboseLevel")]
    VerboseLevel,
}

impl ConfigField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigField::SelectedHostIds => "selectedHostIds",
            ConfigField::CustomVariables => "customVariables",
            ConfigField::MaxParallelHosts => "maxParallelHosts",
            ConfigField::VerboseLevel => "verboseLevel",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation failure scoped to one draft field.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("at least one host required")]
    NoHostsSelected,
    #[error("must be valid JSON")]
    MalformedCustomVariables { reason: String },
    #[error("must be a JSON object")]
    CustomVariablesNotObject,
    #[error("must be at least 1 (got {0})")]
    MaxParallelHostsTooLow(i64),
    #[error("must be between 0 and 4 (got {0})")]
    VerboseLevelOutOfRange(i64),
}

impl FieldError {
    pub fn field(&self) -> ConfigField {
        match self {
            FieldError::NoHostsSelected => ConfigField::SelectedHostIds,
            FieldError::MalformedCustomVariables { .. } | FieldError::CustomVariablesNotObject => {
                ConfigField::CustomVariables
            }
            FieldError::MaxParallelHostsTooLow(_) => ConfigField::MaxParallelHosts,
            FieldError::VerboseLevelOutOfRange(_) => ConfigField::VerboseLevel,
        }
    }
}

/// Every field error found in one validation pass. Never empty.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("execution config is invalid: {}", render(.0))]
pub struct ValidationErrors(Vec<FieldError>);

fn render(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field(), e))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn for_field(&self, field: ConfigField) -> impl Iterator<Item = &FieldError> {
        self.0.iter().filter(move |e| e.field() == field)
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

/// A validated, immutable execution request.
#[derive(Getters, Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRequest {
    host_ids: BTreeSet<HostId>,
    merged_variables: Variables,
}

impl ExecutionRequest {
    pub fn options(&self) -> Option<ExecutionOptions> {
        self.merged_variables
            .get(EXECUTION_OPTIONS_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Validate a draft. All rules run; the result is either every error found
/// or a complete request, never both.
#[tracing::instrument(skip(config), fields(hosts = config.selected_host_ids.len()))]
pub fn validate(config: &ExecutionConfig) -> Result<ExecutionRequest, ValidationErrors> {
    let mut errors = vec![];

    if config.selected_host_ids.is_empty() {
        errors.push(FieldError::NoHostsSelected);
    }

    let custom = match parse_custom_variables(&config.custom_variables) {
        Ok(custom) => custom,
        Err(error) => {
            errors.push(error);
            None
        }
    };

    if config.execute_in_parallel && config.max_parallel_hosts < 1 {
        errors.push(FieldError::MaxParallelHostsTooLow(config.max_parallel_hosts));
    }

    if !(VERBOSE_LEVEL_MIN..=VERBOSE_LEVEL_MAX).contains(&config.verbose_level) {
        errors.push(FieldError::VerboseLevelOutOfRange(config.verbose_level));
    }

    if !errors.is_empty() {
        debug!("config: {} validation error(s)", errors.len());
        return Err(ValidationErrors(errors));
    }

    if config.execute_in_parallel && config.max_parallel_hosts > PARALLEL_HOSTS_SOFT_LIMIT {
        warn!(
            "config: {} parallel hosts exceeds the usual limit of {}",
            config.max_parallel_hosts, PARALLEL_HOSTS_SOFT_LIMIT
        );
    }

    let mut merged_variables = config.variables.clone();
    if let Some(custom) = custom {
        merged_variables.extend(custom);
    }
    merged_variables.insert(
        EXECUTION_OPTIONS_KEY.to_string(),
        config.options().to_value(),
    );

    Ok(ExecutionRequest {
        host_ids: config.selected_host_ids.clone(),
        merged_variables,
    })
}

fn parse_custom_variables(raw: &str) -> Result<Option<Variables>, FieldError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(FieldError::CustomVariablesNotObject),
        Err(e) => Err(FieldError::MalformedCustomVariables {
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_that_custom_variables_override_playbook_defaults() {
        let mut config = ExecutionConfig::new(vars(json!({"a": 1, "b": 2})));
        config.selected_host_ids = BTreeSet::from([1]);
        config.custom_variables = r#"{"b": 3, "c": 4}"#.into();

        let request = validate(&config).unwrap();
        let merged = request.merged_variables();
        assert_eq!(Some(&json!(1)), merged.get("a"));
        assert_eq!(Some(&json!(3)), merged.get("b"));
        assert_eq!(Some(&json!(4)), merged.get("c"));
        assert_eq!(4, merged.len());
    }

    #[test]
    fn test_that_execution_options_are_injected_verbatim() {
        let mut config = ExecutionConfig::default();
        config.selected_host_ids = BTreeSet::from([1, 2]);
        config.execute_in_parallel = true;
        config.max_parallel_hosts = 10;
        config.verbose_level = 3;
        config.dry_run = true;
        config.check_mode = true;

        let request = validate(&config).unwrap();
        assert_eq!(
            Some(&json!({
                "parallel": true,
                "max_parallel_hosts": 10,
                "continue_on_error": false,
                "verbose_level": 3,
                "dry_run": true,
                "check_mode": true,
            })),
            request.merged_variables().get(EXECUTION_OPTIONS_KEY)
        );
        assert_eq!(Some(config.options()), request.options());
        assert_eq!(2, config.run_mode_notes().len());
    }

    #[test]
    fn test_that_all_rules_run_without_short_circuit() {
        let config = ExecutionConfig {
            custom_variables: "not json".into(),
            execute_in_parallel: true,
            max_parallel_hosts: 0,
            verbose_level: 5,
            ..ExecutionConfig::default()
        };
        let errors = validate(&config).unwrap_err();
        let fields: Vec<ConfigField> = errors.errors().iter().map(|e| e.field()).collect();
        assert_eq!(
            vec![
                ConfigField::SelectedHostIds,
                ConfigField::CustomVariables,
                ConfigField::MaxParallelHosts,
                ConfigField::VerboseLevel,
            ],
            fields
        );
    }

    #[test]
    fn test_that_parallelism_is_only_checked_when_parallel() {
        let config = ExecutionConfig {
            selected_host_ids: BTreeSet::from([1]),
            max_parallel_hosts: 0,
            ..ExecutionConfig::default()
        };
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_that_blank_custom_variables_are_ignored_and_non_objects_rejected() {
        let mut config = ExecutionConfig {
            selected_host_ids: BTreeSet::from([1]),
            custom_variables: "   \n".into(),
            ..ExecutionConfig::default()
        };
        assert!(validate(&config).is_ok());

        config.custom_variables = "[1, 2]".into();
        let errors = validate(&config).unwrap_err();
        assert_eq!(
            &[FieldError::CustomVariablesNotObject],
            errors.errors()
        );
    }

    #[test]
    fn test_that_validation_is_idempotent() {
        let mut config = ExecutionConfig::new(vars(json!({"env": "prod"})));
        assert_eq!(validate(&config).unwrap_err(), validate(&config).unwrap_err());

        config.selected_host_ids = BTreeSet::from([4, 2]);
        assert_eq!(validate(&config).unwrap(), validate(&config).unwrap());
    }

    #[test]
    fn test_that_fixing_a_draft_clears_its_errors() {
        let mut config = ExecutionConfig {
            custom_variables: "not json".into(),
            ..ExecutionConfig::default()
        };
        let errors = validate(&config).unwrap_err();
        assert_eq!(2, errors.errors().len());
        assert_eq!(
            "at least one host required",
            errors
                .for_field(ConfigField::SelectedHostIds)
                .next()
                .unwrap()
                .to_string()
        );
        assert_eq!(
            "must be valid JSON",
            errors
                .for_field(ConfigField::CustomVariables)
                .next()
                .unwrap()
                .to_string()
        );

        config.selected_host_ids = BTreeSet::from([1, 3]);
        config.custom_variables = r#"{"retries": 2}"#.into();
        let request = validate(&config).unwrap();
        assert_eq!(&BTreeSet::from([1, 3]), request.host_ids());
    }
}
