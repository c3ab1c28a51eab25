//! Shared types for the relaymon pipeline.
//!
//! Defines the canonical [`types::LogEntry`] record produced by the parser,
//! the rolling [`types::DashboardMetrics`] snapshot, fixed-window snapshot
//! types, and the alert-rule / webhook / notification entities shared
//! between the ingestion, metrics, alert, and notification crates.

pub mod id;
pub mod types;
