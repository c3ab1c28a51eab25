//! Metrics computation over parsed log entries.
//!
//! [`aggregator::aggregate`] is the pure rolling-snapshot computation fed
//! by the dashboard refresh cycle. [`snapshotter::WindowSnapshotter`]
//! independently persists metrics scoped to fixed time windows, one per
//! alert interval, so interval alerts stay accurate regardless of the
//! rolling display window.

pub mod aggregator;
pub mod snapshotter;

#[cfg(test)]
mod tests;
