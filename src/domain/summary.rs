//! Per-target outcomes and the run summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::target::Target;
use crate::domain::transport::TransportEndpoint;
use crate::gateway::{GatewayError, Identity};

/// Unique identifier for one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        RunId(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        RunId(uuid)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Classified reason a target's dispatch step failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum FailureKind {
    /// The target could not be resolved to a gateway address.
    Resolution { detail: String },

    /// The gateway rejected the submission.
    Send { detail: String },

    /// The chosen transport endpoint was unusable.
    Transport { detail: String },

    /// The gateway signalled that the caller is being throttled. The only
    /// failure that aborts the whole batch.
    RateLimited { detail: String },
}

impl FailureKind {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FailureKind::RateLimited { .. })
    }

    /// Returns a human-readable error message for this failure.
    pub fn to_error_message(&self) -> String {
        match self {
            FailureKind::Resolution { detail } => {
                format!("target could not be resolved: {detail}")
            }
            FailureKind::Send { detail } => format!("send rejected: {detail}"),
            FailureKind::Transport { detail } => format!("transport unusable: {detail}"),
            FailureKind::RateLimited { detail } => format!("rate limited by gateway: {detail}"),
        }
    }
}

impl From<GatewayError> for FailureKind {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Resolution { detail } => FailureKind::Resolution { detail },
            GatewayError::Send {
                rate_limited: true,
                detail,
            } => FailureKind::RateLimited { detail },
            GatewayError::Send {
                rate_limited: false,
                detail,
            } => FailureKind::Send { detail },
            GatewayError::Transport { detail } => FailureKind::Transport { detail },
            // Session loss mid-batch is recorded against the target, not
            // escalated.
            GatewayError::Auth { detail } => FailureKind::Send {
                detail: format!("session error: {detail}"),
            },
        }
    }
}

/// Outcome of one dispatch step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Success {
        target: Target,
        sent_message: String,
        transport: TransportEndpoint,
        sent_at: DateTime<Utc>,
    },
    Failure {
        target: Target,
        reason: FailureKind,
        transport: TransportEndpoint,
        failed_at: DateTime<Utc>,
    },
}

impl DispatchOutcome {
    pub fn target(&self) -> &Target {
        match self {
            DispatchOutcome::Success { target, .. } => target,
            DispatchOutcome::Failure { target, .. } => target,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success { .. })
    }
}

/// How a run reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Every target in the batch was attempted.
    Completed,
    /// The gateway signalled throttling; remaining targets were never
    /// attempted.
    RateLimited,
    /// The caller cancelled the run; remaining targets were never attempted.
    Cancelled,
}

/// Aggregate result of one dispatch run.
///
/// Outcomes are in batch order and cover only attempted targets. No mutation
/// after the run reaches a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub run_id: RunId,
    /// Identity the gateway confirmed during pre-flight.
    pub identity: Identity,
    pub total_targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<DispatchOutcome>,
    pub disposition: Disposition,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchSummary {
    /// Number of targets actually attempted.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// True when the run stopped before exhausting the batch.
    pub fn aborted(&self) -> bool {
        !matches!(self.disposition, Disposition::Completed)
    }
}

/// Accumulates per-target outcomes while the loop runs.
#[derive(Debug)]
pub struct SummaryBuilder {
    run_id: RunId,
    identity: Identity,
    total_targets: usize,
    succeeded: usize,
    failed: usize,
    outcomes: Vec<DispatchOutcome>,
    started_at: DateTime<Utc>,
}

impl SummaryBuilder {
    pub fn new(run_id: RunId, identity: Identity, total_targets: usize) -> Self {
        Self {
            run_id,
            identity,
            total_targets,
            succeeded: 0,
            failed: 0,
            outcomes: Vec::with_capacity(total_targets),
            started_at: Utc::now(),
        }
    }

    /// Append the outcome for the next target in batch order.
    pub fn record(&mut self, outcome: DispatchOutcome) {
        match &outcome {
            DispatchOutcome::Success { .. } => self.succeeded += 1,
            DispatchOutcome::Failure { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn recorded(&self) -> usize {
        self.outcomes.len()
    }

    /// Seal the accumulator into an immutable summary.
    pub fn finish(self, disposition: Disposition) -> DispatchSummary {
        DispatchSummary {
            run_id: self.run_id,
            identity: self.identity,
            total_targets: self.total_targets,
            succeeded: self.succeeded,
            failed: self.failed,
            outcomes: self.outcomes,
            disposition,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
