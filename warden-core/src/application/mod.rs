// warden-core/src/application/mod.rs

pub mod detection;
pub mod lifecycle;
pub mod pii_validator;
pub mod pool;
pub mod ports;
pub mod profiling;
pub mod rule_engine;
pub mod service;
pub mod sources;

// --- RE-EXPORTS (FACADE PATTERN) ---
// The CLI only needs `use warden_core::application::{WardenService, Target};`

pub use detection::{ColumnDetection, DetectionOutcome, DetectionReport, PiiDetectionEngine};
pub use lifecycle::{IssueCommand, IssueLifecycleManager, Transition};
pub use pii_validator::{PiiFixValidator, ValidationOutcome};
pub use pool::{PoolRegistry, WorkerPool};
pub use profiling::ProfilingEngine;
pub use rule_engine::QualityRuleEngine;
pub use service::{Target, WardenDeps, WardenService};
pub use sources::SourceRegistry;
