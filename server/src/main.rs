use std::sync::Once;

use anyhow::Context;
use config::load_config;
use config::shared::{ExportConfig, ServiceConfig};
use server::startup::Application;
use telemetry::init_tracing;
use tracing::info;

/// Ensures crypto provider is only initialized once.
static INIT_CRYPTO: Once = Once::new();

/// Installs the default cryptographic provider for rustls.
///
/// Both the BigQuery and the Pub/Sub clients pull in rustls, and feature unification leaves
/// more than one provider enabled, so the provider has to be chosen explicitly.
fn install_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("failed to install default crypto provider");
    });
}

fn main() -> anyhow::Result<()> {
    install_crypto_provider();

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let config = load_config::<ServiceConfig>()
        .context("loading exporter configuration")?
        .apply_export_override()
        .context("applying the EXPORT_CONFIG override")?;
    log_export_config(&config.export);

    let application = Application::build(config).await?;
    info!(port = application.port(), "exporter listening");
    application.run_until_stopped().await?;

    Ok(())
}

fn log_export_config(config: &ExportConfig) {
    for (collection, rule) in &config.rules {
        info!(
            %collection,
            table = %rule.table,
            fields = ?rule.fields,
            topic = rule.topic(),
            "export rule"
        );
    }
}
