//! Core domain types for the dispatch engine.
//!
//! This module contains pure types with no gateway or runtime dependencies:
//! - Target identifiers and batch normalization
//! - Message pools and per-step selection
//! - Transport endpoints and rotation
//! - Per-target outcomes and the run summary

pub mod message;
pub mod summary;
pub mod target;
pub mod transport;
