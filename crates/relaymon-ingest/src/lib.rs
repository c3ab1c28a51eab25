//! Log ingestion: line parsing, batching, and deduplication.
//!
//! [`parser::parse`] turns one raw access-log line into a canonical
//! [`relaymon_common::types::LogEntry`], auto-detecting the structured
//! (JSON) format and the fixed-grammar fallback format per line.
//! [`buffer::IngestionBuffer`] decouples a bursty line source from
//! downstream processing with size- and timer-triggered flushes, and
//! [`dedupe::EntryDeduper`] drops entries already seen across polls.

pub mod buffer;
pub mod dedupe;
pub mod parser;

#[cfg(test)]
mod tests;
