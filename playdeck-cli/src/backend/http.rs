//! The execution backend over its REST API.

use async_trait::async_trait;
use color_eyre::eyre::Result;
use libplaydeck::config::ExecutionRequest;
use libplaydeck::ipc::http::{ApiError, LogPage, SubmitExecutionBody};
use libplaydeck::lifecycle::{BackendError, Execution, ExecutionBackend, ExecutionId, PlaybookId};
use libplaydeck::log::*;
use libplaydeck::stream::{LogSource, PartialLogStream};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    pub fn new<S: Into<String>>(client: reqwest::Client, base: S) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn log_source(&self, execution_id: ExecutionId) -> HttpLogSource {
        HttpLogSource {
            client: self.client.clone(),
            base: self.base.clone(),
            execution_id,
            cursor: 0,
            finishing: false,
            ended: false,
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<ApiError>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };
        return Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Protocol(e.to_string()))
}

fn unreachable_backend(err: reqwest::Error) -> BackendError {
    BackendError::Unreachable(err.to_string())
}

#[async_trait]
impl ExecutionBackend for HttpBackend {
    #[tracing::instrument(skip(self, request))]
    async fn submit_execution(
        &self,
        playbook_id: PlaybookId,
        request: &ExecutionRequest,
    ) -> Result<Execution, BackendError> {
        let url = format!("{}/api/playbooks/{}/executions", self.base, playbook_id);
        debug!("submitting execution to {}", url);
        let response = self
            .client
            .post(&url)
            .json(&SubmitExecutionBody::from(request))
            .send()
            .await
            .map_err(unreachable_backend)?;
        decode(response).await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_execution(&self, id: ExecutionId) -> Result<Execution, BackendError> {
        let url = format!("{}/api/executions/{}", self.base, id);
        let response = self.client.get(&url).send().await.map_err(unreachable_backend)?;
        decode(response).await
    }
}

/// Pages through the log of one execution. Pages keep coming until
/// [`HttpLogSource::finish`] has been called and the backend returns an
/// empty page.
#[derive(Debug)]
pub struct HttpLogSource {
    client: reqwest::Client,
    base: String,
    execution_id: ExecutionId,
    cursor: u64,
    finishing: bool,
    ended: bool,
}

impl HttpLogSource {
    /// The execution reached a terminal status; end the stream once the
    /// remaining pages are drained.
    pub fn finish(&mut self) {
        self.finishing = true;
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    #[tracing::instrument(skip(self), fields(execution = self.execution_id, after = self.cursor))]
    async fn source(&mut self) -> Result<PartialLogStream> {
        if self.ended {
            return Err(eyre!("log source already ended"));
        }
        let url = format!(
            "{}/api/executions/{}/logs?after={}",
            self.base, self.execution_id, self.cursor
        );
        let response = self.client.get(&url).send().await.map_err(unreachable_backend)?;
        let page: LogPage = decode(response).await?;
        trace!("fetched {} log records", page.entries.len());
        self.cursor = page.next_cursor.max(self.cursor);
        if self.finishing && page.entries.is_empty() {
            self.ended = true;
            return Ok(PartialLogStream::End);
        }
        Ok(PartialLogStream::Next(page.entries))
    }
}
