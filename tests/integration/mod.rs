//! Integration tests for strata.
//!
//! These tests exercise the full pipeline — decomposition, staging,
//! coordinated execution, and persistence — through the public API.

mod fixtures;
mod parallel_execution;
mod recovery;
mod workflow_e2e;
