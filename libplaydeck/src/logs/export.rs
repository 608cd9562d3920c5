use std::path::{Path, PathBuf};

use derive_getters::Getters;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tokio::fs;

use super::filter::{format_entry, DisplayOptions};
use super::LogEntry;
use crate::lifecycle::ExecutionId;
use crate::log::*;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error("export context `{0}` must be non-empty and contain only letters, digits, `-` or `_`")]
    InvalidContext(String),
    #[error("formatting export timestamp failed")]
    Timestamp(#[from] time::error::Format),
    #[error("writing export to {path} failed")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A plain-text log export ready to be saved.
#[derive(Getters, Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    file_name: String,
    contents: String,
}

impl ExportArtifact {
    /// Build an export of `entries`, rendered with `display`.
    pub fn build<'a, I>(
        context: &str,
        execution_id: ExecutionId,
        at: OffsetDateTime,
        entries: I,
        display: &DisplayOptions,
    ) -> Result<Self, ExportError>
    where
        I: IntoIterator<Item = &'a LogEntry>,
    {
        let entries: Vec<&LogEntry> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(ExportError::Empty);
        }
        Ok(Self {
            file_name: file_name(context, execution_id, at)?,
            contents: render(entries, display),
        })
    }

    /// Write the export into `dir`, returning the full path.
    #[tracing::instrument(skip(self), fields(file = %self.file_name))]
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.file_name);
        fs::write(&path, self.contents.as_bytes())
            .await
            .map_err(|source| ExportError::Io {
                path: path.clone(),
                source,
            })?;
        info!("exported logs to {}", path.display());
        Ok(path)
    }
}

/// Newline-joined rendering of `entries`.
pub fn render<'a, I>(entries: I, display: &DisplayOptions) -> String
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    entries
        .into_iter()
        .map(|entry| format_entry(entry, display))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<context>-<executionId>-logs-<timestamp>.txt`, timestamp in UTC.
pub fn file_name(
    context: &str,
    execution_id: ExecutionId,
    at: OffsetDateTime,
) -> Result<String, ExportError> {
    let valid = !context.is_empty()
        && context
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ExportError::InvalidContext(context.to_string()));
    }
    let stamp = at
        .to_offset(UtcOffset::UTC)
        .format(format_description!("[year][month][day]-[hour][minute][second]"))?;
    Ok(format!("{context}-{execution_id}-logs-{stamp}.txt"))
}
