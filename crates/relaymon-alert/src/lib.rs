//! Alert rule evaluation.
//!
//! [`engine::AlertEngine`] walks the stored rules after each aggregation
//! pass, decides trigger eligibility per rule, and hands eligible rules
//! to the notification dispatcher, one delivery attempt per webhook.

pub mod engine;
