use ai_llm_service::telemetry;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file; a missing file is fine.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    telemetry::init("info")?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting documentation agent backend");

    api::start().await?;

    Ok(())
}
