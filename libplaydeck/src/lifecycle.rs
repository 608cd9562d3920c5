//! The lifecycle of one playbook run.
//!
//! ```text
//! Configuring -> Confirming -> Submitting -> Running -> Succeeded | Failed
//!      ^             |              |
//!      +---cancel----+              |
//!      +-------submit failed--------+
//! ```
//!
//! Transitions are computed by [`reduce`], a pure function of the current
//! [`LifecycleState`] and a [`LifecycleEvent`]. [`ExecutionController`]
//! wraps the reducer with the validator, an [`ExecutionBackend`], and an
//! [`ExecutionSink`].

use std::fmt;

use async_trait::async_trait;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::{self, ExecutionConfig, ExecutionRequest, FieldError, ValidationErrors};
use crate::log::*;

pub type ExecutionId = u64;
pub type PlaybookId = u64;

/// Status as reported by the execution backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }
}

#[derive(Getters, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    id: ExecutionId,
    playbook_id: PlaybookId,
    status: ExecutionStatus,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Execution {
    pub fn new(
        id: ExecutionId,
        playbook_id: PlaybookId,
        status: ExecutionStatus,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            playbook_id,
            status,
            created_at,
            updated_at: created_at,
        }
    }

    /// The same execution with a newer status.
    pub fn with_status(&self, status: ExecutionStatus, at: OffsetDateTime) -> Self {
        Self {
            status,
            updated_at: at,
            ..self.clone()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Configuring,
    Confirming,
    Submitting,
    Running,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    /// Whether a request has been handed to the backend and not yet
    /// finished.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Phase::Submitting | Phase::Running)
    }

    fn for_status(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Pending | ExecutionStatus::Running => Phase::Running,
            ExecutionStatus::Success => Phase::Succeeded,
            ExecutionStatus::Failed => Phase::Failed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Configuring => "configuring",
            Phase::Confirming => "confirming",
            Phase::Submitting => "submitting",
            Phase::Running => "running",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleState {
    Configuring {
        field_errors: Vec<FieldError>,
        general_error: Option<String>,
    },
    Confirming {
        request: ExecutionRequest,
    },
    Submitting {
        request: ExecutionRequest,
    },
    Running {
        request: ExecutionRequest,
        execution: Execution,
    },
    Succeeded {
        request: ExecutionRequest,
        execution: Execution,
    },
    Failed {
        request: ExecutionRequest,
        execution: Execution,
    },
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Configuring {
            field_errors: vec![],
            general_error: None,
        }
    }
}

impl LifecycleState {
    pub fn phase(&self) -> Phase {
        match self {
            LifecycleState::Configuring { .. } => Phase::Configuring,
            LifecycleState::Confirming { .. } => Phase::Confirming,
            LifecycleState::Submitting { .. } => Phase::Submitting,
            LifecycleState::Running { .. } => Phase::Running,
            LifecycleState::Succeeded { .. } => Phase::Succeeded,
            LifecycleState::Failed { .. } => Phase::Failed,
        }
    }

    /// The request owned by this run, once validation has produced one.
    pub fn request(&self) -> Option<&ExecutionRequest> {
        match self {
            LifecycleState::Configuring { .. } => None,
            LifecycleState::Confirming { request }
            | LifecycleState::Submitting { request }
            | LifecycleState::Running { request, .. }
            | LifecycleState::Succeeded { request, .. }
            | LifecycleState::Failed { request, .. } => Some(request),
        }
    }

    pub fn execution(&self) -> Option<&Execution> {
        match self {
            LifecycleState::Running { execution, .. }
            | LifecycleState::Succeeded { execution, .. }
            | LifecycleState::Failed { execution, .. } => Some(execution),
            _ => None,
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            LifecycleState::Configuring { field_errors, .. } => field_errors,
            _ => &[],
        }
    }

    /// Error not tied to a field, e.g. a failed submission.
    pub fn general_error(&self) -> Option<&str> {
        match self {
            LifecycleState::Configuring { general_error, .. } => general_error.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum LifecycleEvent {
    /// The draft validated into a request.
    Validated(ExecutionRequest),
    /// The draft failed validation.
    Rejected(ValidationErrors),
    /// The user confirmed the run.
    Confirmed,
    /// The user backed out before submission.
    Cancelled,
    /// The backend accepted the request.
    Accepted(Execution),
    /// The submit call failed.
    SubmitFailed(String),
    /// The backend reported the execution's current status.
    StatusReported(Execution),
    /// Start over after a finished run.
    Reset,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Validated(_) => "validated",
            LifecycleEvent::Rejected(_) => "rejected",
            LifecycleEvent::Confirmed => "confirmed",
            LifecycleEvent::Cancelled => "cancelled",
            LifecycleEvent::Accepted(_) => "accepted",
            LifecycleEvent::SubmitFailed(_) => "submit_failed",
            LifecycleEvent::StatusReported(_) => "status_reported",
            LifecycleEvent::Reset => "reset",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("an execution is already {0}")]
    InFlight(Phase),
    #[error("cannot apply `{event}` while {phase}")]
    Invalid { phase: Phase, event: &'static str },
    #[error("status for execution {got} reported to the controller of execution {expected}")]
    ForeignExecution {
        expected: ExecutionId,
        got: ExecutionId,
    },
}

/// Compute the state that follows `state` when `event` happens.
///
/// Re-validating while confirming replaces the pending request, or drops
/// back to configuring when the edited draft is invalid. Once a run is
/// terminal, status reports must repeat the terminal status.
pub fn reduce(
    state: &LifecycleState,
    event: LifecycleEvent,
) -> Result<LifecycleState, TransitionError> {
    use LifecycleEvent as E;
    use LifecycleState as S;

    let phase = state.phase();
    let event_name = event.name();

    match (state, event) {
        (S::Configuring { .. } | S::Confirming { .. }, E::Validated(request)) => {
            Ok(S::Confirming { request })
        }
        (S::Configuring { .. } | S::Confirming { .. }, E::Rejected(errors)) => Ok(S::Configuring {
            field_errors: errors.into_inner(),
            general_error: None,
        }),
        (S::Configuring { .. } | S::Confirming { .. }, E::Cancelled) => Ok(S::default()),
        (S::Confirming { request }, E::Confirmed) => Ok(S::Submitting {
            request: request.clone(),
        }),
        (S::Submitting { request }, E::Accepted(execution)) => {
            Ok(settle(request.clone(), execution))
        }
        (S::Submitting { .. }, E::SubmitFailed(message)) => Ok(S::Configuring {
            field_errors: vec![],
            general_error: Some(message),
        }),
        (
            S::Running { request, execution: current }
            | S::Succeeded { request, execution: current }
            | S::Failed { request, execution: current },
            E::StatusReported(execution),
        ) => {
            if current.id != execution.id {
                return Err(TransitionError::ForeignExecution {
                    expected: current.id,
                    got: execution.id,
                });
            }
            // A finished run only accepts a repeat of its own status.
            if phase.is_terminal() && execution.status != current.status {
                return Err(TransitionError::Invalid {
                    phase,
                    event: event_name,
                });
            }
            Ok(settle(request.clone(), execution))
        }
        (S::Succeeded { .. } | S::Failed { .. }, E::Reset) => Ok(S::default()),
        (
            S::Submitting { .. } | S::Running { .. },
            E::Validated(_) | E::Rejected(_) | E::Confirmed | E::Cancelled,
        ) => Err(TransitionError::InFlight(phase)),
        _ => Err(TransitionError::Invalid {
            phase,
            event: event_name,
        }),
    }
}

fn settle(request: ExecutionRequest, execution: Execution) -> LifecycleState {
    match Phase::for_status(execution.status) {
        Phase::Succeeded => LifecycleState::Succeeded { request, execution },
        Phase::Failed => LifecycleState::Failed { request, execution },
        _ => LifecycleState::Running { request, execution },
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

/// The execution service a controller submits to.
#[async_trait]
pub trait ExecutionBackend: Send + Sync + fmt::Debug {
    async fn submit_execution(
        &self,
        playbook_id: PlaybookId,
        request: &ExecutionRequest,
    ) -> Result<Execution, BackendError>;

    async fn fetch_execution(&self, id: ExecutionId) -> Result<Execution, BackendError>;
}

/// Receives notifications from a controller. Both methods default to doing
/// nothing.
pub trait ExecutionSink: Send + fmt::Debug {
    /// Called exactly once for each accepted submission.
    fn on_execute(&mut self, execution: &Execution) {
        let _ = execution;
    }

    /// Called whenever validation fails.
    fn on_validation_error(&mut self, errors: &ValidationErrors) {
        let _ = errors;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ExecutionSink for NoopSink {}

#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("submitting execution failed: {0}")]
    Submission(#[source] BackendError),
    #[error("polling execution status failed: {0}")]
    Poll(#[source] BackendError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Drives one run at a time for a single playbook.
#[derive(Debug)]
pub struct ExecutionController<B, S = NoopSink> {
    playbook_id: PlaybookId,
    backend: B,
    sink: S,
    state: LifecycleState,
}

impl<B: ExecutionBackend> ExecutionController<B, NoopSink> {
    pub fn new(playbook_id: PlaybookId, backend: B) -> Self {
        Self::with_sink(playbook_id, backend, NoopSink)
    }
}

impl<B: ExecutionBackend, S: ExecutionSink> ExecutionController<B, S> {
    pub fn with_sink(playbook_id: PlaybookId, backend: B, sink: S) -> Self {
        Self {
            playbook_id,
            backend,
            sink,
            state: LifecycleState::default(),
        }
    }

    pub fn playbook_id(&self) -> PlaybookId {
        self.playbook_id
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn apply(&mut self, event: LifecycleEvent) -> Result<Phase, TransitionError> {
        let next = reduce(&self.state, event)?;
        if next.phase() != self.state.phase() {
            debug!(
                "execution controller: {} -> {}",
                self.state.phase(),
                next.phase()
            );
        }
        self.state = next;
        Ok(self.state.phase())
    }

    /// Validate `config`. On success the controller moves to
    /// [`Phase::Confirming`]; on failure it returns to
    /// [`Phase::Configuring`] holding the field errors. A finished run keeps
    /// its state until [`ExecutionController::reset`], but the errors are
    /// still reported.
    #[tracing::instrument(skip(self, config), fields(playbook = self.playbook_id))]
    pub fn validate(&mut self, config: &ExecutionConfig) -> Result<ExecutionRequest, ControllerError> {
        let phase = self.phase();
        if phase.is_in_flight() {
            return Err(TransitionError::InFlight(phase).into());
        }
        match config::validate(config) {
            Ok(request) => {
                self.apply(LifecycleEvent::Validated(request.clone()))?;
                Ok(request)
            }
            Err(errors) => {
                self.sink.on_validation_error(&errors);
                if let Err(err) = self.apply(LifecycleEvent::Rejected(errors.clone())) {
                    debug!("execution controller: staying {}: {}", phase, err);
                }
                Err(errors.into())
            }
        }
    }

    /// Back out of configuration or confirmation. The backend is never
    /// contacted.
    pub fn cancel(&mut self) -> Result<Phase, ControllerError> {
        Ok(self.apply(LifecycleEvent::Cancelled)?)
    }

    /// Start over after a finished run.
    pub fn reset(&mut self) -> Result<Phase, ControllerError> {
        Ok(self.apply(LifecycleEvent::Reset)?)
    }

    /// Confirm and submit the validated request. Rejected without contacting
    /// the backend while another submission is in flight.
    #[tracing::instrument(skip(self), fields(playbook = self.playbook_id))]
    pub async fn submit(&mut self) -> Result<Execution, ControllerError> {
        let request = match &self.state {
            LifecycleState::Confirming { request } => request.clone(),
            state if state.phase().is_in_flight() => {
                warn!("execution controller: rejecting duplicate submission");
                return Err(TransitionError::InFlight(state.phase()).into());
            }
            state => {
                return Err(TransitionError::Invalid {
                    phase: state.phase(),
                    event: LifecycleEvent::Confirmed.name(),
                }
                .into())
            }
        };
        self.apply(LifecycleEvent::Confirmed)?;

        match self.backend.submit_execution(self.playbook_id, &request).await {
            Ok(execution) => {
                info!(
                    "execution {} accepted for playbook {} on {} host(s)",
                    execution.id,
                    self.playbook_id,
                    request.host_ids().len()
                );
                self.apply(LifecycleEvent::Accepted(execution.clone()))?;
                self.sink.on_execute(&execution);
                Ok(execution)
            }
            Err(err) => {
                error!("submitting execution failed: {}", err);
                self.apply(LifecycleEvent::SubmitFailed(err.to_string()))?;
                Err(ControllerError::Submission(err))
            }
        }
    }

    /// Reconcile with a status pushed by the backend.
    pub fn observe(&mut self, execution: Execution) -> Result<Phase, ControllerError> {
        Ok(self.apply(LifecycleEvent::StatusReported(execution))?)
    }

    /// Ask the backend for the current status and reconcile with it.
    #[tracing::instrument(skip(self), fields(playbook = self.playbook_id))]
    pub async fn poll(&mut self) -> Result<Phase, ControllerError> {
        let id = match self.state.execution() {
            Some(execution) => execution.id,
            None => {
                return Err(TransitionError::Invalid {
                    phase: self.phase(),
                    event: "status_reported",
                }
                .into())
            }
        };
        let execution = self
            .backend
            .fetch_execution(id)
            .await
            .map_err(ControllerError::Poll)?;
        self.observe(execution)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use color_eyre::eyre::Result;
    use time::macros::datetime;

    use super::*;

    const STARTED: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);

    #[derive(Debug, Default)]
    struct FakeBackend {
        submits: Arc<AtomicUsize>,
        fail_submit: bool,
        statuses: Mutex<VecDeque<ExecutionStatus>>,
    }

    impl FakeBackend {
        fn reporting(statuses: &[ExecutionStatus]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ExecutionBackend for FakeBackend {
        async fn submit_execution(
            &self,
            playbook_id: PlaybookId,
            _request: &ExecutionRequest,
        ) -> Result<Execution, BackendError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if self.fail_submit {
                return Err(BackendError::Unreachable("connection refused".into()));
            }
            Ok(Execution::new(42, playbook_id, ExecutionStatus::Pending, STARTED))
        }

        async fn fetch_execution(&self, id: ExecutionId) -> Result<Execution, BackendError> {
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ExecutionStatus::Running);
            Ok(Execution::new(id, 7, status, STARTED))
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        executed: Vec<ExecutionId>,
        rejections: usize,
    }

    impl ExecutionSink for RecordingSink {
        fn on_execute(&mut self, execution: &Execution) {
            self.executed.push(*execution.id());
        }

        fn on_validation_error(&mut self, _errors: &ValidationErrors) {
            self.rejections += 1;
        }
    }

    fn valid_config() -> ExecutionConfig {
        ExecutionConfig {
            selected_host_ids: BTreeSet::from([1, 2]),
            ..ExecutionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_that_a_run_reaches_success() -> Result<()> {
        let backend = FakeBackend::reporting(&[ExecutionStatus::Running, ExecutionStatus::Success]);
        let mut controller = ExecutionController::with_sink(7, backend, RecordingSink::default());

        controller.validate(&valid_config())?;
        assert_eq!(Phase::Confirming, controller.phase());

        let execution = controller.submit().await?;
        assert_eq!(42, *execution.id());
        assert_eq!(Phase::Running, controller.phase());
        assert_eq!(vec![42], controller.sink().executed);

        assert_eq!(Phase::Running, controller.poll().await?);
        assert_eq!(Phase::Succeeded, controller.poll().await?);
        assert_eq!(
            Some(ExecutionStatus::Success),
            controller.state().execution().map(|e| *e.status())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_that_invalid_config_stays_configuring() -> Result<()> {
        let mut controller =
            ExecutionController::with_sink(7, FakeBackend::default(), RecordingSink::default());
        let err = controller.validate(&ExecutionConfig::default()).unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        assert_eq!(Phase::Configuring, controller.phase());
        assert_eq!(
            &[FieldError::NoHostsSelected],
            controller.state().field_errors()
        );
        assert_eq!(1, controller.sink().rejections);
        Ok(())
    }

    #[tokio::test]
    async fn test_that_second_submit_is_rejected_without_contacting_backend() -> Result<()> {
        let backend = FakeBackend::default();
        let submits = backend.submits.clone();
        let mut controller = ExecutionController::new(7, backend);
        controller.validate(&valid_config())?;
        controller.submit().await?;
        assert_eq!(Phase::Running, controller.phase());

        let err = controller.submit().await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Transition(TransitionError::InFlight(Phase::Running))
        ));
        assert_eq!(1, submits.load(Ordering::SeqCst));

        let err = controller.validate(&valid_config()).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Transition(TransitionError::InFlight(Phase::Running))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_that_submit_failure_returns_to_configuring_and_can_retry() -> Result<()> {
        let backend = FakeBackend {
            fail_submit: true,
            ..FakeBackend::default()
        };
        let mut controller = ExecutionController::with_sink(7, backend, RecordingSink::default());
        controller.validate(&valid_config())?;

        let err = controller.submit().await.unwrap_err();
        assert!(matches!(err, ControllerError::Submission(_)));
        assert_eq!(Phase::Configuring, controller.phase());
        assert!(controller.state().field_errors().is_empty());
        assert!(controller
            .state()
            .general_error()
            .is_some_and(|e| e.contains("connection refused")));
        assert!(controller.sink().executed.is_empty());

        controller.validate(&valid_config())?;
        assert_eq!(Phase::Confirming, controller.phase());
        Ok(())
    }

    #[tokio::test]
    async fn test_that_cancel_returns_to_configuring_without_backend_calls() -> Result<()> {
        let backend = FakeBackend::default();
        let submits = backend.submits.clone();
        let mut controller = ExecutionController::new(7, backend);
        controller.validate(&valid_config())?;
        assert_eq!(Phase::Configuring, controller.cancel()?);
        assert!(controller.state().request().is_none());
        assert_eq!(0, submits.load(Ordering::SeqCst));

        // Submitting without confirming a fresh request is not allowed.
        assert!(matches!(
            controller.submit().await.unwrap_err(),
            ControllerError::Transition(TransitionError::Invalid { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_that_terminal_state_only_accepts_its_own_status_and_reset() {
        let request = config::validate(&valid_config()).unwrap();
        let execution = Execution::new(9, 7, ExecutionStatus::Failed, STARTED);
        let state = LifecycleState::Failed {
            request,
            execution: execution.clone(),
        };

        let same = reduce(&state, LifecycleEvent::StatusReported(execution.clone())).unwrap();
        assert_eq!(Phase::Failed, same.phase());

        let flipped = execution.with_status(ExecutionStatus::Success, STARTED);
        assert!(matches!(
            reduce(&state, LifecycleEvent::StatusReported(flipped)),
            Err(TransitionError::Invalid { .. })
        ));

        let regressed = execution.with_status(ExecutionStatus::Running, STARTED);
        assert!(matches!(
            reduce(&state, LifecycleEvent::StatusReported(regressed)),
            Err(TransitionError::Invalid { .. })
        ));

        let foreign = Execution::new(10, 7, ExecutionStatus::Failed, STARTED);
        assert_eq!(
            Err(TransitionError::ForeignExecution {
                expected: 9,
                got: 10
            }),
            reduce(&state, LifecycleEvent::StatusReported(foreign))
        );

        assert_eq!(
            LifecycleState::default(),
            reduce(&state, LifecycleEvent::Reset).unwrap()
        );
    }

    #[tokio::test]
    async fn test_that_revalidating_while_confirming_replaces_or_drops_the_request() -> Result<()> {
        let mut controller =
            ExecutionController::with_sink(7, FakeBackend::default(), RecordingSink::default());
        controller.validate(&valid_config())?;
        assert_eq!(Phase::Confirming, controller.phase());

        let edited = ExecutionConfig {
            selected_host_ids: BTreeSet::from([3]),
            ..ExecutionConfig::default()
        };
        controller.validate(&edited)?;
        assert_eq!(Phase::Confirming, controller.phase());
        assert_eq!(
            Some(&BTreeSet::from([3])),
            controller.state().request().map(|r| r.host_ids())
        );

        let broken = ExecutionConfig {
            custom_variables: "not json".into(),
            ..valid_config()
        };
        let err = controller.validate(&broken).unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        assert_eq!(1, controller.sink().rejections);
        assert_eq!(Phase::Configuring, controller.phase());
        assert!(controller.state().request().is_none());
        assert!(matches!(
            controller.state().field_errors(),
            [FieldError::MalformedCustomVariables { .. }]
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_that_invalid_draft_after_a_finished_run_is_still_reported() -> Result<()> {
        let backend = FakeBackend::reporting(&[ExecutionStatus::Success]);
        let mut controller = ExecutionController::with_sink(7, backend, RecordingSink::default());
        controller.validate(&valid_config())?;
        controller.submit().await?;
        assert_eq!(Phase::Succeeded, controller.poll().await?);

        let err = controller.validate(&ExecutionConfig::default()).unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        assert_eq!(1, controller.sink().rejections);
        assert_eq!(Phase::Succeeded, controller.phase());
        Ok(())
    }

    #[test]
    fn test_that_accepted_terminal_status_settles_immediately() {
        let request = config::validate(&valid_config()).unwrap();
        let state = LifecycleState::Submitting { request };
        let done = Execution::new(1, 7, ExecutionStatus::Success, STARTED);
        let next = reduce(&state, LifecycleEvent::Accepted(done)).unwrap();
        assert_eq!(Phase::Succeeded, next.phase());
    }
}
