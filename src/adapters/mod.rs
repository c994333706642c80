//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure. Each sub-module groups adapters by concern.
//!
//! Adapter categories:
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: In-memory store, JSONL journal and state snapshots

pub mod metrics;
pub mod persistence;
