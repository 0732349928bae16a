//! Sequential outreach dispatcher with pacing, transport rotation, and
//! rate-limit fail-fast semantics.
//!
//! This crate takes an ordered batch of target identities plus a message (or
//! a pool of message variations) and delivers one send per target through an
//! external messaging gateway. Each step waits a progressively-increasing
//! delay before it runs, the outbound transport rotates through a proxy list
//! on a fixed cadence, and a rate-limit signal from the gateway aborts the
//! remainder of the batch immediately.

pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod intake;
pub mod pacing;

// Re-export commonly used types
pub use dispatcher::{DispatchRequest, Dispatcher, DispatcherConfig};
pub use domain::message::MessagePool;
pub use domain::summary::{
    DispatchOutcome, DispatchSummary, Disposition, FailureKind, RunId, SummaryBuilder,
};
pub use domain::target::{Target, TargetBatch};
pub use domain::transport::{TransportEndpoint, TransportList};
pub use error::{CadenceError, Result};
pub use gateway::{
    Ack, Address, GatewayError, Identity, MessagingGateway, MockGateway, RestGateway, Session,
};
pub use intake::RawDispatchForm;
pub use pacing::DelayPolicy;
