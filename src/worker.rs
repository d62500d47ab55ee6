use doc_enricher::application::PollingScheduler;
use doc_enricher::infrastructure::{logging, AppConfig, Services};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init(&config.log_filter("worker"));

    let services = Services::build(&config)?;
    let ocr = services.ocr_engine(&config)?;
    let jobs = services.polling_jobs(&config, ocr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_config = services.scheduler;
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| tokio::spawn(PollingScheduler::new(job, scheduler_config).run(shutdown_rx.clone())))
        .collect();

    info!(
        jobs = handles.len(),
        concurrency = config.pipeline.concurrency,
        page_size = config.pipeline.page_size,
        "worker started"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "scheduler task panicked");
        }
    }

    info!("worker stopped");
    Ok(())
}
