use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::join;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use fraudline_application::commands::{ingest_transaction, IngestOutcome};
use fraudline_application::consumer::{
    AlertHandler, ScoringHandler, WorkerPool, ALERT_GROUP, SCORING_GROUP,
};
use fraudline_application::queries::{list_dead_letters, list_flagged_transactions};
use fraudline_application::{AppError, AppState};
use fraudline_domain::Topic;

use crate::context::AppContext;
use crate::input::{read_requests, IngestRequest};

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// The two consumer groups: scoring on `transaction-events`, delivery on `fraud-alerts`.
pub struct Pipeline {
    scoring: WorkerPool,
    alerts: WorkerPool,
}

impl Pipeline {
    pub async fn start(state: &AppState, concurrency: usize) -> Result<Self, AppError> {
        let scoring = WorkerPool::start(
            state,
            Topic::TransactionEvents,
            SCORING_GROUP,
            concurrency,
            Arc::new(ScoringHandler::new(state.clone())),
        )
        .await?;
        let alerts = WorkerPool::start(
            state,
            Topic::FraudAlerts,
            ALERT_GROUP,
            concurrency,
            Arc::new(AlertHandler::new(state.clone())),
        )
        .await?;
        Ok(Self { scoring, alerts })
    }

    /// True when a pool stopped on its own, which only happens after a worker failure.
    pub fn is_failed(&self) -> bool {
        self.scoring.is_finished() || self.alerts.is_finished()
    }

    pub async fn shutdown(self) -> Result<(), AppError> {
        let (scoring, alerts) = join(self.scoring.shutdown(), self.alerts.shutdown()).await;
        scoring.and(alerts)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// JSONL feed of `{transaction, owner}` lines; `-` reads stdin.
    pub input: Option<String>,
    pub drain_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            input: None,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub submitted: usize,
    pub scored_inline: usize,
    pub queued: usize,
    pub rejected: usize,
    pub drained: bool,
}

/// Starts the consumers, feeds the input if any, then drains and shuts down.
/// Without input the pipeline keeps consuming until a shutdown signal.
pub async fn run(context: AppContext, options: RunOptions) -> Result<RunSummary> {
    let state = context.state.clone();
    let pipeline = Pipeline::start(&state, context.config.worker.concurrency).await?;

    let mut summary = RunSummary::default();
    match &options.input {
        Some(path) => {
            let requests = read_requests(path).await?;
            let fed = tokio::select! {
                fed = feed(&state, requests) => Some(fed),
                _ = shutdown_signal() => {
                    info!("shutdown signal received during ingest");
                    None
                }
            };
            if let Some(fed) = fed {
                summary = fed;
                summary.drained = drain(&state, &pipeline, options.drain_timeout).await;
                if !summary.drained {
                    warn!(timeout_ms = options.drain_timeout.as_millis() as u64, "drain incomplete");
                }
            }
        }
        None => {
            info!("no input given, consuming until shutdown signal");
            wait_for_exit(&pipeline).await;
        }
    }

    let stopped = pipeline.shutdown().await;
    state.channel.close().await;
    report(&state, &summary).await;
    stopped?;
    Ok(summary)
}

async fn feed(state: &AppState, requests: Vec<IngestRequest>) -> RunSummary {
    let mut summary = RunSummary::default();
    for request in requests {
        summary.submitted += 1;
        let transaction_id = request.transaction.id;
        match ingest_transaction(state, request.transaction, request.owner).await {
            Ok(IngestOutcome::Scored(result)) => {
                summary.scored_inline += 1;
                info!(
                    transaction_id = %transaction_id,
                    score = result.total,
                    flagged = result.is_fraudulent,
                    reason = %result.summary(),
                    "transaction scored"
                );
            }
            Ok(IngestOutcome::Accepted { receipt: Some(_), .. }) => summary.queued += 1,
            Ok(IngestOutcome::Accepted { receipt: None, event_id }) => {
                summary.rejected += 1;
                warn!(transaction_id = %transaction_id, event_id = %event_id, "transaction accepted but not queued");
            }
            Err(err) => {
                summary.rejected += 1;
                error!(transaction_id = %transaction_id, error = %err, "ingest failed");
            }
        }
    }
    summary
}

/// Waits until both topics have no pending records. Returns false on timeout
/// or when a worker pool has failed.
pub async fn drain(state: &AppState, pipeline: &Pipeline, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let pending = state.channel.backlog(Topic::TransactionEvents).await
            + state.channel.backlog(Topic::FraudAlerts).await;
        if pending == 0 {
            return true;
        }
        if pipeline.is_failed() {
            error!(pending, "worker pool stopped before drain completed");
            return false;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(DRAIN_POLL).await;
    }
}

async fn wait_for_exit(pipeline: &Pipeline) {
    let failed = async {
        while !pipeline.is_failed() {
            sleep(Duration::from_millis(200)).await;
        }
    };
    tokio::select! {
        _ = shutdown_signal() => info!("shutdown signal received"),
        _ = failed => error!("worker pool stopped unexpectedly"),
    }
}

async fn report(state: &AppState, summary: &RunSummary) {
    match list_flagged_transactions(state, None).await {
        Ok(flagged) => {
            for entry in &flagged {
                info!(
                    transaction_id = %entry.transaction.id,
                    user = %entry.transaction.user_id,
                    score = entry.score.total,
                    reason = %entry.score.summary(),
                    "flagged transaction"
                );
            }
            info!(count = flagged.len(), "flagged transactions");
        }
        Err(err) => warn!(error = %err, "could not list flagged transactions"),
    }
    let dead = list_dead_letters(state, None, None).await;
    if !dead.is_empty() {
        warn!(count = dead.len(), "records in dead letter queue");
    }
    info!(
        submitted = summary.submitted,
        scored_inline = summary.scored_inline,
        queued = summary.queued,
        rejected = summary.rejected,
        drained = summary.drained,
        "run finished"
    );
    info!("metrics\n{}", state.metrics.render_prometheus());
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "sigterm handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
