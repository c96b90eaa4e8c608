// Local crates
use crate::{
    helpers::{load_config::Config, shutdown::Shutdown},
    metrics::metrics::gather_text,
    weblog::weblog::{CheckError, Collection, WebLog},
    worker::control::{WorkerError, WorkerState},
};

// External crates
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

/// One line of agent output.
#[derive(Serialize)]
struct Report<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    collection: &'a Collection,
}

/// Web log agent runtime: init, keep checking until the log can be opened,
/// then collect every `update_every_secs` until Ctrl-C.
#[instrument(name = "weblog::runtime", target = "runtime", skip_all, level = "info")]
pub async fn run_weblog_agent(cfg: Config) -> Result<()> {
    let shutdown = Shutdown::new();
    let mut shutdown_rx = shutdown.subscribe();
    let signal_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await })
    };

    let mut job = WebLog::init(cfg.weblog.clone(), &cfg.tailer)
        .await
        .context("Failed to initialize web log job")?;
    info!(
        path = %cfg.weblog.path.display(),
        pattern = job.pattern_name(),
        format = job.pattern_source(),
        update_every_secs = cfg.general.update_every_secs,
        "Web log agent initialized"
    );

    let mut ticker = interval(cfg.general.update_every());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if job.worker().state() != WorkerState::Running {
                    match job.check().await {
                        Ok(()) => info!("Tailing started"),
                        Err(CheckError::Worker(WorkerError::Stopped)) => break,
                        Err(e) => {
                            let e = anyhow::Error::from(e);
                            warn!(error = %format!("{e:#}"), "Check failed, retrying next interval");
                        }
                    }
                    continue;
                }

                match job.collect().await {
                    Ok(collection) => {
                        if let Err(e) = emit(&collection) {
                            error!(error = %format!("{e:#}"), "Failed to emit metrics");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Collection failed");
                        break;
                    }
                }
            }
        }
    }

    job.cleanup().await;
    shutdown.trigger();
    if let Err(e) = signal_task.await {
        warn!(error = %e, "Signal listener failed");
    }

    debug!(self_metrics = %gather_text(), "Agent self metrics at shutdown");
    info!("Web log agent stopped");
    Ok(())
}

/// Print one JSON line to stdout and log dimensions seen for the first time.
fn emit(collection: &Collection) -> Result<()> {
    let report = Report {
        timestamp: Utc::now(),
        collection,
    };
    let line = serde_json::to_string(&report).context("Failed to serialize metrics")?;
    println!("{line}");

    for dimension in &collection.new_dimensions {
        info!(
            chart = %dimension.chart_id,
            dimension = %dimension.dimension_id,
            "New chart dimension"
        );
    }
    Ok(())
}
