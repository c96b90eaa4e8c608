//! Web access log metrics agent.
//!
//! Tails an access log, learns its line layout, filters and classifies each
//! request and keeps running counters, timing stats, histograms and unique
//! client sets that are read as consistent snapshots on a fixed cadence.

pub mod aggregator;
pub mod categorizer;
pub mod cli;
pub mod filter;
pub mod helpers;
pub mod instrumentation;
pub mod metrics;
pub mod parser;
pub mod runtime;
pub mod tailer;
pub mod weblog;
pub mod worker;
