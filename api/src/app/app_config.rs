use contextor::{ContextorConfig, ContextorError};

/// Server settings read once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Listen address (`API_ADDRESS`, default `0.0.0.0:8000`).
    pub address: String,
    pub agent: ContextorConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ContextorError> {
        Ok(Self {
            address: std::env::var("API_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".into()),
            agent: ContextorConfig::from_env()?,
        })
    }
}
