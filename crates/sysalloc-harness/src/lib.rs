//! Stress and evidence tooling for sysalloc.
//!
//! This crate provides:
//! - Stress driver: allocate, fill, release in a seeded loop, with optional
//!   injected backend failures
//! - Structured logs: lifecycle records converted to JSONL lines
//! - Summary: machine-readable totals for a stress run

#![deny(unsafe_code)]

pub mod error;
#[allow(unsafe_code)]
pub mod stress;
pub mod structured_log;

pub use error::HarnessError;
pub use stress::{StressConfig, StressSummary, run_stress};
