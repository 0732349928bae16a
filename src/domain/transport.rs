//! Transport endpoints and rotation.
//!
//! The rotator is a pure function of step index and configuration; the
//! dispatch loop passes the resolved transport explicitly into each gateway
//! call, so no client holds mutable egress state.

use std::fmt;

use serde::Serialize;

use crate::error::{CadenceError, Result};

/// Outbound transport for one gateway call: the process's own egress path,
/// or a proxy intermediary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum TransportEndpoint {
    Direct,
    Proxy(String),
}

impl fmt::Display for TransportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEndpoint::Direct => write!(f, "direct"),
            TransportEndpoint::Proxy(url) => write!(f, "{url}"),
        }
    }
}

/// Ordered list of proxy endpoints.
///
/// May be empty, in which case every step uses the direct transport.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TransportList(Vec<TransportEndpoint>);

impl TransportList {
    /// Parse raw newline-separated proxy URLs.
    ///
    /// Blank lines are dropped; an empty result is a valid (direct-only)
    /// list.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut endpoints = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !line.contains("://") {
                return Err(CadenceError::Intake(format!(
                    "transport endpoint is not a URL: {line}"
                )));
            }
            endpoints.push(TransportEndpoint::Proxy(line.to_string()));
        }
        Ok(TransportList(endpoints))
    }

    pub fn direct_only() -> Self {
        TransportList(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve the transport for one dispatch step.
///
/// The selected endpoint holds for a whole cadence window: slot
/// `(step_index / cadence) % len` is constant over
/// `[cadence * m, cadence * (m + 1))` and advances one slot per window,
/// cycling through the list. An empty list always resolves to the direct
/// transport.
pub fn transport_for(
    step_index: usize,
    transports: &TransportList,
    cadence: usize,
) -> TransportEndpoint {
    if transports.0.is_empty() {
        return TransportEndpoint::Direct;
    }
    let slot = (step_index / cadence.max(1)) % transports.0.len();
    transports.0[slot].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxies(n: usize) -> TransportList {
        let raw: Vec<String> = (0..n).map(|i| format!("http://proxy-{i}:8080")).collect();
        TransportList::parse(&raw.join("\n")).unwrap()
    }

    #[test]
    fn empty_list_is_always_direct() {
        let transports = TransportList::direct_only();
        for i in 0..20 {
            assert_eq!(transport_for(i, &transports, 5), TransportEndpoint::Direct);
        }
    }

    #[test]
    fn constant_within_each_cadence_window() {
        let transports = proxies(3);
        for window in 0..6 {
            let first = transport_for(window * 5, &transports, 5);
            for offset in 1..5 {
                assert_eq!(transport_for(window * 5 + offset, &transports, 5), first);
            }
        }
    }

    #[test]
    fn cycles_through_all_transports() {
        let transports = proxies(3);
        let slots: Vec<TransportEndpoint> =
            (0..3).map(|m| transport_for(m * 5, &transports, 5)).collect();
        assert_eq!(slots[0], TransportEndpoint::Proxy("http://proxy-0:8080".into()));
        assert_eq!(slots[1], TransportEndpoint::Proxy("http://proxy-1:8080".into()));
        assert_eq!(slots[2], TransportEndpoint::Proxy("http://proxy-2:8080".into()));
        // Fourth window wraps back to the first slot
        assert_eq!(transport_for(15, &transports, 5), slots[0]);
    }

    #[test]
    fn parse_drops_blank_lines() {
        let transports = TransportList::parse("\nhttp://p:1\n\n  \nsocks5://q:2\n").unwrap();
        assert_eq!(transports.len(), 2);
    }

    #[test]
    fn parse_rejects_non_urls() {
        assert!(matches!(
            TransportList::parse("not-a-url"),
            Err(CadenceError::Intake(_))
        ));
    }
}
