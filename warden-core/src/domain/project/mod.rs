// warden-core/src/domain/project/mod.rs

pub mod configuration;

pub use configuration::{
    DeclaredRules, DimensionWeights, PolicyConfig, ProfilingConfig, ProjectConfig, TimeoutConfig,
};
