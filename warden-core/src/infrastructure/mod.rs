// warden-core/src/infrastructure/mod.rs

pub mod adapters;
pub mod compiler;
pub mod config;
pub mod error;
pub mod state;

pub use adapters::{DuckDbConnector, InMemoryStore, StoreState};
pub use compiler::JinjaRenderer;
pub use config::{load_or_default, load_project_config};
