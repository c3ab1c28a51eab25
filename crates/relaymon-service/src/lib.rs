//! Service wiring: configuration, the line-source poller, and the
//! coordinator that routes aggregated metrics into snapshotting and
//! alert evaluation.

pub mod config;
pub mod coordinator;
pub mod source;
