//! Core of the harness
//!
//! This module provides:
//! - Transport layer for the device link (serial, simulated)
//! - Virtual device answering the console protocol
//! - Background response collection with stale-line rejection
//! - Command dispatch with completion strategies
//! - Verification: expectations, templates, tolerances, relations, verdicts
//! - Test cases, suites and the sequential runner
//! - Result ledger and reports
//! - Session lifecycle (open, run, close)
//! - Wire transcript

pub mod collector;
pub mod dispatcher;
pub mod logger;
pub mod report;
pub mod session;
pub mod simulator;
pub mod suite;
pub mod transport;
pub mod verify;
