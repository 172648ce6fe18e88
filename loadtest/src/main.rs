use anyhow::Context;
use points_loadtest::{Config, ConstantVusExecutor, logging};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("points_loadtest=info");

    // Load configuration from environment
    let config = Config::from_env().context("invalid load test configuration")?;
    let options = config.scenario_options();
    info!(
        "Loaded configuration: target={}, vus={}, duration={:?}, encoding={:?}",
        options.target_url, options.vus, options.duration, options.body_encoding
    );

    let executor = ConstantVusExecutor::new(options).context("failed to set up executor")?;

    // Ctrl-C stops every VU right away; the summary is still printed
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping virtual users");
            let _ = cancel_tx.send(true);
        }
    });

    let summary = executor.run_until_cancelled(cancel_rx).await;

    summary.print_summary();
    println!("JSON: {}", summary.to_json()?);

    if let Some(ref path) = config.summary_export {
        match summary.export(path) {
            Ok(()) => info!("Summary written to {:?}", path),
            Err(e) => warn!("Failed to write summary to {:?}: {}", path, e),
        }
    }

    Ok(())
}
