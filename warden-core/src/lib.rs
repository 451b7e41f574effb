// warden-core/src/lib.rs

#![allow(missing_docs)]
// Memory safety
#![deny(unsafe_code)]
// Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports: data source, catalog and store contracts
pub mod ports;

// 2. Domain: rules, PII matching, validation heuristics, issue state machine.
// Depends on nothing but ports.
pub mod domain;

// 3. Infrastructure: DuckDB, project files, Jinja, state file
pub mod infrastructure;

// 4. Application: engines, worker pools, lifecycle manager, service facade
pub mod application;

pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::WardenError;
