// warden-core/src/domain/mod.rs

pub mod catalog;
pub mod compiler;
pub mod error;
pub mod governance;
pub mod issue;
pub mod project;
pub mod quality;

// Re-exports
pub use error::DomainError;
