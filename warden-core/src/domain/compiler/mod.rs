// warden-core/src/domain/compiler/mod.rs

pub mod sql_guard;

pub use sql_guard::{ensure_read_only, has_unresolved_placeholder};
