//! Model configuration: provider kind, per-model knobs and env loaders.

pub mod default_config;
pub mod llm_model_config;
pub mod llm_provider;
