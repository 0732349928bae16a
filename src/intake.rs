//! Request intake: raw form fields to a validated dispatch request.
//!
//! The outer collaborator (a web form, a CLI, a queue consumer) hands over
//! raw text; everything here must pass before any dispatch work begins, and
//! a failure rejects the whole request with no partial dispatch.

use serde::Deserialize;

use crate::dispatcher::{DispatchRequest, DispatcherConfig};
use crate::domain::message::MessagePool;
use crate::domain::target::TargetBatch;
use crate::domain::transport::TransportList;
use crate::error::{CadenceError, Result};
use crate::pacing::DelayPolicy;

/// Raw fields as supplied by the intake collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDispatchForm {
    /// Opaque credential for the messaging gateway session.
    pub credential: String,

    /// Newline-separated target identifiers.
    pub targets: String,

    /// Message text; `---` separator lines delimit variations.
    pub message: String,

    /// Newline-separated proxy URLs. Empty means direct transport only.
    #[serde(default)]
    pub transports: String,

    /// Optional per-request pacing override.
    #[serde(default)]
    pub delay_policy: Option<DelayPolicy>,
}

impl RawDispatchForm {
    /// Validate and normalize into a [`DispatchRequest`].
    pub fn into_request(self, config: &DispatcherConfig) -> Result<DispatchRequest> {
        if self.credential.trim().is_empty() {
            return Err(CadenceError::Intake("credential is required".to_string()));
        }
        let targets = TargetBatch::normalize(&self.targets, config.max_batch_size)?;
        let pool = MessagePool::parse(&self.message)?;
        let transports = TransportList::parse(&self.transports)?;

        Ok(DispatchRequest {
            credential: self.credential.trim().to_string(),
            targets,
            pool,
            transports,
            delay_policy: self.delay_policy,
        })
    }
}
