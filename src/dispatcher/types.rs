//! Input and per-step types for the dispatch loop.

use std::time::Duration;

use crate::domain::message::MessagePool;
use crate::domain::target::{Target, TargetBatch};
use crate::domain::transport::{TransportEndpoint, TransportList};
use crate::pacing::DelayPolicy;

/// A validated dispatch request, ready for the loop.
///
/// Produced by the intake boundary; by the time one of these exists the
/// batch and pool invariants hold.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Opaque credential handed to the gateway for authentication.
    pub credential: String,
    pub targets: TargetBatch,
    pub pool: MessagePool,
    pub transports: TransportList,
    /// Per-request override of the configured delay policy.
    pub delay_policy: Option<DelayPolicy>,
}

/// Ephemeral record for one target's step, discarded once its outcome is
/// folded into the summary.
#[derive(Debug)]
pub(crate) struct DispatchStep<'a> {
    pub index: usize,
    pub target: &'a Target,
    pub transport: TransportEndpoint,
    pub rotated: bool,
    pub wait: Duration,
}
