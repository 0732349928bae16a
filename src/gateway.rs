//! Messaging gateway abstraction.
//!
//! This module defines the `MessagingGateway` trait the dispatch loop drives,
//! enabling testability with mock implementations. The production
//! implementation is a JSON-over-HTTP client that routes each call through
//! the transport endpoint the rotator picked for that step.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::target::Target;
use crate::domain::transport::TransportEndpoint;

/// An authenticated gateway session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Opaque session token, sent as a bearer credential on every call.
    pub token: String,
}

/// The identity behind a session, confirmed by the pre-flight check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
}

/// Gateway-specific address for a resolved target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub message_id: String,
}

/// Errors a gateway call can fail with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Credential invalid or session no longer live.
    #[error("authentication failed: {detail}")]
    Auth { detail: String },

    /// The target does not exist or cannot be addressed.
    #[error("resolution failed: {detail}")]
    Resolution { detail: String },

    /// Submission rejected. `rate_limited` marks the throttling signal the
    /// dispatch loop must escalate.
    #[error("send failed: {detail}")]
    Send { rate_limited: bool, detail: String },

    /// The chosen transport endpoint is unusable.
    #[error("transport failed: {detail}")]
    Transport { detail: String },
}

impl GatewayError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            GatewayError::Send {
                rate_limited: true,
                ..
            }
        )
    }
}

/// Trait for the external messaging service.
///
/// The dispatch loop resolves and submits through this abstraction, passing
/// the rotated transport explicitly into every call so implementations hold
/// no mutable egress state.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Exchange a caller-supplied credential for a live session.
    async fn authenticate(&self, credential: &str) -> Result<Session, GatewayError>;

    /// Pre-flight check that the session is live; returns who it belongs to.
    async fn current_identity(&self, session: &Session) -> Result<Identity, GatewayError>;

    /// Resolve a target identifier to a gateway-specific address.
    async fn resolve(
        &self,
        session: &Session,
        target: &Target,
        transport: &TransportEndpoint,
    ) -> Result<Address, GatewayError>;

    /// Submit one message to a resolved address over the given transport.
    async fn send(
        &self,
        session: &Session,
        address: &Address,
        message: &str,
        transport: &TransportEndpoint,
    ) -> Result<Ack, GatewayError>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// JSON-over-HTTP messaging gateway.
///
/// Builds one `reqwest::Client` per transport endpoint (proxy endpoints
/// become client-level proxies) and caches them for the life of the gateway.
pub struct RestGateway {
    base_url: String,
    timeout: Duration,
    clients: dashmap::DashMap<TransportEndpoint, reqwest::Client>,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    credential: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Deserialize)]
struct ResolveResponse {
    address: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    address: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    message_id: String,
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport {
        detail: err.to_string(),
    }
}

impl RestGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: Duration::from_secs(30),
            clients: dashmap::DashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get or build the client for a transport endpoint.
    fn client_for(&self, transport: &TransportEndpoint) -> Result<reqwest::Client, GatewayError> {
        if let Some(client) = self.clients.get(transport) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let TransportEndpoint::Proxy(url) = transport {
            let proxy = reqwest::Proxy::all(url).map_err(|e| GatewayError::Transport {
                detail: format!("invalid proxy {url}: {e}"),
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| GatewayError::Transport {
            detail: format!("failed to build client: {e}"),
        })?;

        self.clients.insert(transport.clone(), client.clone());
        Ok(client)
    }

    async fn read_detail(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("{status}: {body}")
    }
}

#[async_trait]
impl MessagingGateway for RestGateway {
    #[tracing::instrument(skip(self, credential))]
    async fn authenticate(&self, credential: &str) -> Result<Session, GatewayError> {
        let client = self.client_for(&TransportEndpoint::Direct)?;
        let response = client
            .post(format!("{}/v1/session", self.base_url))
            .json(&AuthRequest { credential })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(GatewayError::Auth {
                detail: Self::read_detail(response).await,
            });
        }
        let body: AuthResponse = response.json().await.map_err(|e| GatewayError::Auth {
            detail: e.to_string(),
        })?;

        tracing::debug!("Session established");
        Ok(Session { token: body.token })
    }

    #[tracing::instrument(skip(self, session))]
    async fn current_identity(&self, session: &Session) -> Result<Identity, GatewayError> {
        let client = self.client_for(&TransportEndpoint::Direct)?;
        let response = client
            .get(format!("{}/v1/me", self.base_url))
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(GatewayError::Auth {
                detail: Self::read_detail(response).await,
            });
        }
        let identity: Identity = response.json().await.map_err(|e| GatewayError::Auth {
            detail: e.to_string(),
        })?;

        tracing::debug!(username = %identity.username, "Pre-flight identity confirmed");
        Ok(identity)
    }

    #[tracing::instrument(skip(self, session), fields(target = %target, transport = %transport))]
    async fn resolve(
        &self,
        session: &Session,
        target: &Target,
        transport: &TransportEndpoint,
    ) -> Result<Address, GatewayError> {
        let client = self.client_for(transport)?;
        let response = client
            .get(format!("{}/v1/users/{}", self.base_url, target))
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status().as_u16() {
            200 => {
                let body: ResolveResponse =
                    response.json().await.map_err(|e| GatewayError::Resolution {
                        detail: e.to_string(),
                    })?;
                Ok(Address(body.address))
            }
            401 | 403 => Err(GatewayError::Auth {
                detail: Self::read_detail(response).await,
            }),
            404 => Err(GatewayError::Resolution {
                detail: format!("unknown target {target}"),
            }),
            _ => Err(GatewayError::Resolution {
                detail: Self::read_detail(response).await,
            }),
        }
    }

    #[tracing::instrument(skip(self, session, message), fields(address = %address, transport = %transport))]
    async fn send(
        &self,
        session: &Session,
        address: &Address,
        message: &str,
        transport: &TransportEndpoint,
    ) -> Result<Ack, GatewayError> {
        let client = self.client_for(transport)?;
        let response = client
            .post(format!("{}/v1/messages", self.base_url))
            .bearer_auth(&session.token)
            .json(&SendRequest {
                address: &address.0,
                message,
            })
            .send()
            .await
            .map_err(transport_error)?;

        match response.status().as_u16() {
            429 => Err(GatewayError::Send {
                rate_limited: true,
                detail: Self::read_detail(response).await,
            }),
            401 | 403 => Err(GatewayError::Auth {
                detail: Self::read_detail(response).await,
            }),
            status if !(200..300).contains(&status) => Err(GatewayError::Send {
                rate_limited: false,
                detail: Self::read_detail(response).await,
            }),
            _ => {
                let body: SendResponse = response.json().await.map_err(|e| GatewayError::Send {
                    rate_limited: false,
                    detail: e.to_string(),
                })?;
                tracing::info!(message_id = %body.message_id, "Message accepted");
                Ok(Ack {
                    message_id: body.message_id,
                })
            }
        }
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use std::collections::HashMap;

use parking_lot::Mutex;

fn mock_address(target: &str) -> String {
    format!("addr:{target}")
}

/// Scripted in-memory gateway for tests.
///
/// Calls succeed by default; failures are queued per target in FIFO order.
/// Every call is recorded so tests can assert ordering, payloads, and the
/// transport each step used.
///
/// # Example
/// ```ignore
/// let mock = MockGateway::new();
/// mock.queue_rate_limit("carol");
/// // ... the third step's send now fails with a rate-limit signal ...
/// ```
#[derive(Default)]
pub struct MockGateway {
    auth_failure: Mutex<Option<GatewayError>>,
    identity_failure: Mutex<Option<GatewayError>>,
    identity: Mutex<String>,
    resolve_failures: Mutex<HashMap<String, Vec<GatewayError>>>,
    send_failures: Mutex<HashMap<String, Vec<GatewayError>>>,
    calls: Mutex<Vec<MockCall>>,
}

/// Record of a call made to the mock gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Authenticate,
    CurrentIdentity,
    Resolve {
        target: String,
        transport: TransportEndpoint,
    },
    Send {
        address: String,
        message: String,
        transport: TransportEndpoint,
    },
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            identity: Mutex::new("operator".to_string()),
            ..Default::default()
        }
    }

    /// Reject the next `authenticate` call.
    pub fn fail_authentication(&self, detail: &str) {
        *self.auth_failure.lock() = Some(GatewayError::Auth {
            detail: detail.to_string(),
        });
    }

    /// Reject the next pre-flight identity check.
    pub fn fail_identity_check(&self, detail: &str) {
        *self.identity_failure.lock() = Some(GatewayError::Auth {
            detail: detail.to_string(),
        });
    }

    pub fn set_identity(&self, username: &str) {
        *self.identity.lock() = username.to_string();
    }

    /// Queue a resolution failure for a target.
    ///
    /// Failures are consumed in FIFO order; once drained, calls for that
    /// target succeed again.
    pub fn queue_resolve_failure(&self, target: &str, err: GatewayError) {
        self.resolve_failures
            .lock()
            .entry(target.to_string())
            .or_default()
            .push(err);
    }

    /// Queue a send failure for a target.
    pub fn queue_send_failure(&self, target: &str, err: GatewayError) {
        self.send_failures
            .lock()
            .entry(mock_address(target))
            .or_default()
            .push(err);
    }

    /// Queue a rate-limited send failure for a target.
    pub fn queue_rate_limit(&self, target: &str) {
        self.queue_send_failure(
            target,
            GatewayError::Send {
                rate_limited: true,
                detail: "throttled".to_string(),
            },
        );
    }

    /// Get all calls that have been made to this mock gateway.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get only the send calls, in order.
    pub fn sends(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, MockCall::Send { .. }))
            .cloned()
            .collect()
    }

    pub fn send_count(&self) -> usize {
        self.sends().len()
    }

    pub fn resolve_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, MockCall::Resolve { .. }))
            .count()
    }
}

#[async_trait]
impl MessagingGateway for MockGateway {
    async fn authenticate(&self, _credential: &str) -> Result<Session, GatewayError> {
        self.calls.lock().push(MockCall::Authenticate);
        if let Some(err) = self.auth_failure.lock().take() {
            return Err(err);
        }
        Ok(Session {
            token: "mock-session".to_string(),
        })
    }

    async fn current_identity(&self, _session: &Session) -> Result<Identity, GatewayError> {
        self.calls.lock().push(MockCall::CurrentIdentity);
        if let Some(err) = self.identity_failure.lock().take() {
            return Err(err);
        }
        Ok(Identity {
            username: self.identity.lock().clone(),
        })
    }

    async fn resolve(
        &self,
        _session: &Session,
        target: &Target,
        transport: &TransportEndpoint,
    ) -> Result<Address, GatewayError> {
        self.calls.lock().push(MockCall::Resolve {
            target: target.as_str().to_string(),
            transport: transport.clone(),
        });

        let mut failures = self.resolve_failures.lock();
        if let Some(queue) = failures.get_mut(target.as_str())
            && !queue.is_empty()
        {
            return Err(queue.remove(0));
        }
        Ok(Address(mock_address(target.as_str())))
    }

    async fn send(
        &self,
        _session: &Session,
        address: &Address,
        message: &str,
        transport: &TransportEndpoint,
    ) -> Result<Ack, GatewayError> {
        self.calls.lock().push(MockCall::Send {
            address: address.0.clone(),
            message: message.to_string(),
            transport: transport.clone(),
        });

        let mut failures = self.send_failures.lock();
        if let Some(queue) = failures.get_mut(&address.0)
            && !queue.is_empty()
        {
            return Err(queue.remove(0));
        }
        Ok(Ack {
            message_id: uuid::Uuid::new_v4().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::target::TargetBatch;

    fn target(name: &str) -> Target {
        TargetBatch::normalize(name, 1)
            .unwrap()
            .iter()
            .next()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn mock_succeeds_by_default() {
        let mock = MockGateway::new();
        let session = mock.authenticate("cred").await.unwrap();
        let identity = mock.current_identity(&session).await.unwrap();
        assert_eq!(identity.username, "operator");

        let alice = target("alice");
        let address = mock
            .resolve(&session, &alice, &TransportEndpoint::Direct)
            .await
            .unwrap();
        assert_eq!(address.0, "addr:alice");

        let ack = mock
            .send(&session, &address, "hi", &TransportEndpoint::Direct)
            .await
            .unwrap();
        assert!(!ack.message_id.is_empty());
        assert_eq!(mock.calls().len(), 4);
    }

    #[tokio::test]
    async fn queued_send_failures_drain_in_fifo_order() {
        let mock = MockGateway::new();
        mock.queue_send_failure(
            "bob",
            GatewayError::Send {
                rate_limited: false,
                detail: "first".to_string(),
            },
        );
        mock.queue_rate_limit("bob");

        let session = mock.authenticate("cred").await.unwrap();
        let bob = target("bob");
        let address = mock
            .resolve(&session, &bob, &TransportEndpoint::Direct)
            .await
            .unwrap();

        let first = mock
            .send(&session, &address, "m", &TransportEndpoint::Direct)
            .await
            .unwrap_err();
        assert!(!first.is_rate_limited());

        let second = mock
            .send(&session, &address, "m", &TransportEndpoint::Direct)
            .await
            .unwrap_err();
        assert!(second.is_rate_limited());

        // Queue drained, sends succeed again
        assert!(
            mock.send(&session, &address, "m", &TransportEndpoint::Direct)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn auth_failure_is_single_shot() {
        let mock = MockGateway::new();
        mock.fail_authentication("bad credential");
        assert!(mock.authenticate("cred").await.is_err());
        assert!(mock.authenticate("cred").await.is_ok());
    }

    #[tokio::test]
    async fn records_transport_per_call() {
        let mock = MockGateway::new();
        let session = mock.authenticate("cred").await.unwrap();
        let carol = target("carol");
        let proxy = TransportEndpoint::Proxy("http://p:1".to_string());
        mock.resolve(&session, &carol, &proxy).await.unwrap();

        match &mock.calls()[1] {
            MockCall::Resolve { target, transport } => {
                assert_eq!(target, "carol");
                assert_eq!(transport, &proxy);
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }
}
