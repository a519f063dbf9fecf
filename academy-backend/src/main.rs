use tracing::info;

use academy_backend::{serve, BackendConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "academy_backend=info,academy_ledger=info".into()),
        )
        .init();

    let config = BackendConfig::from_env()?;
    info!(rpc = %config.rpc_url, program = %config.program_id, mint = %config.xp_mint, "starting academy backend");

    serve(config).await;
    Ok(())
}
