use block_scraper::{
    load_config, setup_logging, validate_config, Cli, CliRunner, Commands, Metrics,
    PrometheusExporter,
};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    // Validation never launches a browser
    if let Commands::Validate { config } = &args.command {
        return validate_config(config).await;
    }

    info!("Starting block-scraper v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;

    // The recorder must be installed before the metric handles are registered
    if let Some(addr) = config.server.metrics_addr()? {
        PrometheusExporter::new(addr).start()?;
    }
    let metrics = Arc::new(Metrics::new());

    let cli_runner = CliRunner::new(config, metrics).await?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx.clone());

    // the server drains its own connections on shutdown
    let serving = matches!(args.command, Commands::Serve { .. });
    let result = tokio::select! {
        result = cli_runner.run(args.command, shutdown_tx.subscribe()) => {
            info!("Application completed");
            result
        }
        _ = shutdown_rx.recv(), if !serving => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    info!("Shutting down...");
    cli_runner.service.shutdown().await;

    if let Err(e) = result {
        error!("Application error: {}", e);
        std::process::exit(1);
    }

    info!("block-scraper stopped");
    Ok(())
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }

        let _ = shutdown_tx.send(());
    })
}
