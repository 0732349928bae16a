//! The dispatch loop: sequential, paced delivery over a rotated transport.
//!
//! One run per validated request:
//!
//! ```text
//! Idle ──pre-flight ok──> Running ──batch exhausted─────> Completed
//!   │                        │────rate-limit signal─────> Aborted
//!   └──pre-flight failed     └────caller cancellation───> Aborted
//! ```
//!
//! Pre-flight failures surface as session-level errors with no per-target
//! outcomes. Both terminal states yield a [`DispatchSummary`]; an aborted
//! run covers only the targets attempted before the stop.
//!
//! Processing within one run is strictly sequential: step N+1's gateway call
//! never begins before step N's delay and call have finished. The pacing
//! delay, the settle delay after a transport rotation, and the error-penalty
//! delay are all cooperative suspensions, and the cancellation token is
//! honored at each of them and checked again before every gateway call.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::summary::{
    DispatchOutcome, DispatchSummary, Disposition, FailureKind, RunId, SummaryBuilder,
};
use crate::domain::message::MessagePool;
use crate::domain::transport::{TransportEndpoint, transport_for};
use crate::error::{CadenceError, Result};
use crate::gateway::{Ack, MessagingGateway, Session};
use crate::pacing::{self, DelayPolicy};

pub use types::DispatchRequest;
use types::DispatchStep;

/// Configuration for the dispatcher.
///
/// Read at startup and shared read-only by every run; per-request overrides
/// are limited to the delay policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum number of targets per batch.
    pub max_batch_size: usize,

    /// Steps between transport rotations.
    pub rotation_cadence: usize,

    /// One-time extra wait after switching transport.
    pub settle_delay_ms: u64,

    /// Default pacing policy; requests may override it.
    pub delay_policy: DelayPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 30,
            rotation_cadence: 5,
            settle_delay_ms: 15_000,
            delay_policy: DelayPolicy::default(),
        }
    }
}

impl DispatcherConfig {
    /// Validate startup configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(CadenceError::Intake(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.rotation_cadence == 0 {
            return Err(CadenceError::Intake(
                "rotation_cadence must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of attempting one target.
enum StepResult {
    Sent { message: String, ack: Ack },
    Failed(FailureKind),
    Cancelled,
}

/// Drives sequential dispatch runs against a messaging gateway.
///
/// A dispatcher is cheap to share: it holds the gateway, the immutable
/// configuration, and a guarded randomness source. Each `dispatch` call is
/// an independent run; concurrent runs only contend on the RNG lock.
pub struct Dispatcher<G: MessagingGateway> {
    gateway: Arc<G>,
    config: DispatcherConfig,
    rng: Mutex<StdRng>,
}

impl<G: MessagingGateway> Dispatcher<G> {
    pub fn new(gateway: Arc<G>, config: DispatcherConfig) -> Self {
        Self {
            gateway,
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Replace the randomness source with a seeded generator for
    /// deterministic replay in tests.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run one batch to a terminal state.
    ///
    /// Returns a summary for completed and aborted runs alike; only
    /// session-level failures (intake invariants, pre-flight) surface as
    /// errors.
    #[tracing::instrument(skip(self, request, cancel), fields(targets = request.targets.len()))]
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        cancel: CancellationToken,
    ) -> Result<DispatchSummary> {
        if request.targets.is_empty() {
            return Err(CadenceError::Intake("target batch is empty".to_string()));
        }
        if request.targets.len() > self.config.max_batch_size {
            return Err(CadenceError::Intake(format!(
                "batch has {} targets, maximum is {}",
                request.targets.len(),
                self.config.max_batch_size
            )));
        }

        // Pre-flight: confirm the session is live before any dispatch step.
        let session = self
            .gateway
            .authenticate(&request.credential)
            .await
            .map_err(|e| CadenceError::Auth(e.to_string()))?;
        let identity = self
            .gateway
            .current_identity(&session)
            .await
            .map_err(|e| CadenceError::Auth(e.to_string()))?;

        let run_id = RunId::new();
        tracing::info!(
            run_id = %run_id,
            identity = %identity.username,
            targets = request.targets.len(),
            transports = request.transports.len(),
            "Pre-flight passed, starting dispatch"
        );

        let policy = request
            .delay_policy
            .clone()
            .unwrap_or_else(|| self.config.delay_policy.clone());
        let settle = Duration::from_millis(self.config.settle_delay_ms);

        let mut builder = SummaryBuilder::new(run_id, identity, request.targets.len());
        let mut previous_transport: Option<TransportEndpoint> = None;
        let mut previous_failed = false;
        let mut disposition = Disposition::Completed;

        for (index, target) in request.targets.iter().enumerate() {
            let transport = transport_for(index, &request.transports, self.config.rotation_cadence);
            let rotated =
                !request.transports.is_empty() && previous_transport.as_ref() != Some(&transport);

            let mut wait = if previous_failed {
                policy.error_penalty()
            } else {
                let mut rng = self.rng.lock();
                pacing::delay_for(index, &policy, &mut *rng)
            };
            if rotated {
                wait += settle;
            }

            let step = DispatchStep {
                index,
                target,
                transport,
                rotated,
                wait,
            };
            tracing::debug!(
                run_id = %run_id,
                step = step.index,
                target = %step.target,
                transport = %step.transport,
                rotated = step.rotated,
                wait_ms = step.wait.as_millis() as u64,
                "Pacing before step"
            );

            if !self.pause(step.wait, &cancel).await {
                tracing::info!(run_id = %run_id, step = step.index, "Cancelled during pacing delay");
                disposition = Disposition::Cancelled;
                break;
            }

            previous_transport = Some(step.transport.clone());

            match self.attempt(&session, &step, &request.pool, &cancel).await {
                StepResult::Sent { message, ack } => {
                    counter!("cadence_steps_total", "outcome" => "success").increment(1);
                    tracing::info!(
                        run_id = %run_id,
                        target = %step.target,
                        message_id = %ack.message_id,
                        "Message sent"
                    );
                    builder.record(DispatchOutcome::Success {
                        target: step.target.clone(),
                        sent_message: message,
                        transport: step.transport.clone(),
                        sent_at: chrono::Utc::now(),
                    });
                    previous_failed = false;
                }
                StepResult::Failed(reason) => {
                    counter!("cadence_steps_total", "outcome" => "failure").increment(1);
                    let fatal = reason.is_rate_limited();
                    tracing::warn!(
                        run_id = %run_id,
                        target = %step.target,
                        error = %reason.to_error_message(),
                        "Step failed"
                    );
                    builder.record(DispatchOutcome::Failure {
                        target: step.target.clone(),
                        reason,
                        transport: step.transport.clone(),
                        failed_at: chrono::Utc::now(),
                    });
                    previous_failed = true;

                    if fatal {
                        counter!("cadence_rate_limit_aborts_total").increment(1);
                        tracing::warn!(
                            run_id = %run_id,
                            attempted = builder.recorded(),
                            "Rate-limit signal from gateway, aborting batch"
                        );
                        disposition = Disposition::RateLimited;
                        break;
                    }
                }
                StepResult::Cancelled => {
                    tracing::info!(run_id = %run_id, step = step.index, "Cancelled before gateway call");
                    disposition = Disposition::Cancelled;
                    break;
                }
            }
        }

        let summary = builder.finish(disposition);
        tracing::info!(
            run_id = %run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            attempted = summary.attempted(),
            disposition = ?summary.disposition,
            "Dispatch finished"
        );
        Ok(summary)
    }

    /// Attempt one target: resolve, select a message, submit.
    async fn attempt(
        &self,
        session: &Session,
        step: &DispatchStep<'_>,
        pool: &MessagePool,
        cancel: &CancellationToken,
    ) -> StepResult {
        if cancel.is_cancelled() {
            return StepResult::Cancelled;
        }
        let address = match self
            .gateway
            .resolve(session, step.target, &step.transport)
            .await
        {
            Ok(address) => address,
            Err(e) => return StepResult::Failed(FailureKind::from(e)),
        };

        let message = {
            let mut rng = self.rng.lock();
            pool.select(&mut *rng).to_string()
        };

        if cancel.is_cancelled() {
            return StepResult::Cancelled;
        }
        match self
            .gateway
            .send(session, &address, &message, &step.transport)
            .await
        {
            Ok(ack) => StepResult::Sent { message, ack },
            Err(e) => StepResult::Failed(FailureKind::from(e)),
        }
    }

    /// Suspend for `wait`, yielding early if the run is cancelled.
    ///
    /// Returns false on cancellation.
    async fn pause(&self, wait: Duration, cancel: &CancellationToken) -> bool {
        if wait.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = cancel.cancelled() => false,
        }
    }
}
