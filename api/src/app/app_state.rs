use contextor::DocAgent;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Index, pipeline and source ledger, opened once at startup.
    pub agent: DocAgent,
}

impl AppState {
    pub fn new(agent: DocAgent) -> Self {
        Self { agent }
    }
}
