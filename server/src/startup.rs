use std::net::TcpListener;

use actix_web::{App, HttpServer, dev::Server, web};
use anyhow::anyhow;
use config::project::detect_project_id;
use config::shared::ServiceConfig;
use exporter::clients::bigquery::BigQueryClient;
use exporter::clients::pubsub::PubSubClient;
use exporter::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use exporter::destination::{Publisher, Warehouse};
use exporter::router::{ChangeEventRouter, ExportRules};
use secrecy::ExposeSecret;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

use crate::publisher::RowPublisher;
use crate::routes::events::{MAX_EVENT_BYTES, receive_event};
use crate::routes::health_check::health_check;

/// Exporter application server wrapper.
///
/// Owns the HTTP server together with the shutdown signal handed to every in-flight export.
pub struct Application {
    port: u16,
    server: Server,
    shutdown_tx: ShutdownTx,
}

impl Application {
    /// Builds the BigQuery and Pub/Sub clients, the router and the HTTP server.
    pub async fn build(config: ServiceConfig) -> anyhow::Result<Self> {
        let project_id = detect_project_id(config.bigquery.project_id.as_deref()).ok_or_else(
            || {
                anyhow!(
                    "no google cloud project found, set GOOGLE_CLOUD_PROJECT or bigquery.project_id"
                )
            },
        )?;
        info!(%project_id, "resolved default project");

        let rules = ExportRules::from_config(&config.export)?;
        if rules.is_empty() {
            warn!("no export rules configured, every event will be dropped");
        }

        let warehouse = match &config.bigquery.service_account_key {
            Some(key) => BigQueryClient::new_with_key(project_id.clone(), key.expose_secret()).await?,
            None => BigQueryClient::new_with_adc(project_id.clone()).await?,
        };

        let publisher = if config.export.uses_topics() {
            RowPublisher::PubSub(PubSubClient::new().await?)
        } else {
            RowPublisher::Disabled
        };

        let listener = TcpListener::bind(config.server.address())?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let router = ChangeEventRouter::new(rules, publisher, warehouse, project_id);
        let server = run(listener, router, shutdown_rx)?;

        Ok(Self {
            port,
            server,
            shutdown_tx,
        })
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the server until SIGINT or SIGTERM.
    ///
    /// On a signal, in-flight exports are cancelled first so their events are redelivered,
    /// then the server stops gracefully.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let server_handle = self.server.handle();
        let shutdown_tx = self.shutdown_tx;

        let signal_handle = tokio::spawn(async move {
            // Cloud Run sends SIGTERM before stopping an instance.
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    warn!(error = %err, "failed to register SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("sigint (ctrl+c) received, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("sigterm received, shutting down");
                }
            }

            if let Err(e) = shutdown_tx.shutdown() {
                warn!(error = ?e, "failed to send shutdown signal");
            }

            server_handle.stop(true).await;
        });

        self.server.await?;

        signal_handle.abort();
        let _ = signal_handle.await;

        Ok(())
    }
}

/// Registers the event receiver and health check routes for a router of type
/// `ChangeEventRouter<P, W>`.
///
/// The router and the [`ShutdownRx`] must be registered as app data.
pub fn configure_routes<P, W>(cfg: &mut web::ServiceConfig)
where
    P: Publisher + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
{
    cfg.app_data(web::PayloadConfig::new(MAX_EVENT_BYTES))
        .service(health_check)
        .route("/", web::post().to(receive_event::<P, W>));
}

/// Creates the HTTP server. Signal handling is left to [`Application::run_until_stopped`].
pub fn run<P, W>(
    listener: TcpListener,
    router: ChangeEventRouter<P, W>,
    shutdown_rx: ShutdownRx,
) -> Result<Server, std::io::Error>
where
    P: Publisher + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
{
    let router = web::Data::new(router);
    let shutdown_rx = web::Data::new(shutdown_rx);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(router.clone())
            .app_data(shutdown_rx.clone())
            .configure(configure_routes::<P, W>)
    })
    .disable_signals()
    .listen(listener)?
    .run();

    Ok(server)
}
