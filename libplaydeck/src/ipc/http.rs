use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ExecutionRequest, Variables};
use crate::inventory::HostId;

/// Body of `POST /api/playbooks/{id}/executions`.
#[doc(hidden)]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmitExecutionBody {
    pub host_ids: Vec<HostId>,
    pub variables: Variables,
}

impl From<&ExecutionRequest> for SubmitExecutionBody {
    fn from(request: &ExecutionRequest) -> Self {
        Self {
            host_ids: request.host_ids().iter().copied().collect(),
            variables: request.merged_variables().clone(),
        }
    }
}

/// Response of `GET /api/executions/{id}/logs?after={cursor}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogPage {
    #[serde(default)]
    pub entries: Vec<Value>,
    pub next_cursor: u64,
}

/// Error body returned with non-2xx responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(alias = "error")]
    pub message: String,
}
