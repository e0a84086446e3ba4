//! Pipeline configuration: document model, loader and provider defaults.

mod loader;
mod pipeline;
mod providers;

pub use loader::{ConfigLoader, CONFIG_ROOT_ENV, DEFAULT_CONFIG_ROOT};
pub use pipeline::{
    DeterminismConfig, FeaturesConfig, HashAlgorithm, HashingConfig, InputMode,
    NormalizationConfig, OutputFormat, PipelineConfig, ProviderConfig, QcConfig, ResolvedSource,
};
pub use providers::{ProviderDefaults, ProviderRegistry};
