use std::sync::Arc;
use std::time::Duration;

use fraudline_domain::ports::{Delivery, Subscription};
use fraudline_domain::{DeadLetterCause, DeadLetterEntry, Record, Topic};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::consumer::EventHandler;
use crate::{AppError, AppState};

/// A consumer group of `concurrency` workers on one topic.
///
/// A panicking worker stops the whole pool; `join` and `shutdown` then
/// report it as a rule evaluation failure.
pub struct WorkerPool {
    name: String,
    shutdown: Arc<watch::Sender<bool>>,
    supervisor: JoinHandle<Result<(), AppError>>,
}

impl WorkerPool {
    pub async fn start(
        state: &AppState,
        topic: Topic,
        group: &str,
        concurrency: usize,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self, AppError> {
        let name = format!("{}/{}", topic, group);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);

        let mut workers = JoinSet::new();
        for _ in 0..concurrency.max(1) {
            let subscription = state
                .channel
                .subscribe(topic, group)
                .await
                .map_err(|err| AppError::Internal(err.into()))?;
            workers.spawn(run_worker(
                state.clone(),
                Arc::clone(&handler),
                subscription,
                shutdown_rx.clone(),
            ));
        }
        info!(pool = %name, handler = handler.name(), workers = workers.len(), "worker pool started");

        let supervisor = tokio::spawn(supervise(name.clone(), workers, Arc::clone(&shutdown)));
        Ok(Self {
            name,
            shutdown,
            supervisor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once every worker has exited.
    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    pub async fn shutdown(self) -> Result<(), AppError> {
        let _ = self.shutdown.send(true);
        self.join().await
    }

    pub async fn join(self) -> Result<(), AppError> {
        match self.supervisor.await {
            Ok(result) => result,
            Err(err) => Err(AppError::RuleEvaluationFailure(format!(
                "supervisor of {} failed: {}",
                self.name, err
            ))),
        }
    }
}

async fn supervise(
    name: String,
    mut workers: JoinSet<()>,
    shutdown: Arc<watch::Sender<bool>>,
) -> Result<(), AppError> {
    let mut failure = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(()) => {}
            Err(err) if err.is_panic() => {
                error!(pool = %name, error = %err, "worker panicked, stopping pool");
                let _ = shutdown.send(true);
                failure.get_or_insert_with(|| {
                    AppError::RuleEvaluationFailure(format!("worker in {} panicked: {}", name, err))
                });
            }
            Err(err) => warn!(pool = %name, error = %err, "worker cancelled"),
        }
    }
    info!(pool = %name, "worker pool stopped");
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn run_worker(
    state: AppState,
    handler: Arc<dyn EventHandler>,
    mut subscription: Box<dyn Subscription>,
    mut shutdown: watch::Receiver<bool>,
) {
    let consumer = subscription.consumer_id().to_string();
    debug!(consumer = %consumer, handler = handler.name(), "worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let delivery = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = subscription.next() => match next {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let record = delivery.record().clone();
        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!(consumer = %consumer, offset = record.offset, "shutdown while processing, releasing record");
                if let Err(err) = delivery.nack(Duration::ZERO) {
                    warn!(consumer = %consumer, error = %err, "release on shutdown failed");
                }
                break;
            }
            outcome = handler.handle(&record) => outcome,
        };
        settle(&state, &consumer, delivery, &record, outcome).await;
    }
    debug!(consumer = %consumer, "worker stopped");
}

async fn settle(
    state: &AppState,
    consumer: &str,
    delivery: Delivery,
    record: &Record,
    outcome: Result<(), AppError>,
) {
    let retry = &state.settings.retry;
    match outcome {
        Ok(()) => {
            if let Err(err) = delivery.ack() {
                warn!(consumer, topic = %record.topic, offset = record.offset, error = %err, "ack rejected");
            }
        }
        Err(err) if err.is_permanent() => {
            warn!(
                consumer,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %err,
                "permanent failure, dead-lettering without retry"
            );
            dead_letter(state, consumer, delivery, record, DeadLetterCause::PermanentInput, err).await;
        }
        Err(err) if retry.is_exhausted(record.attempt) => {
            error!(
                consumer,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                attempts = record.attempt,
                error = %err,
                "retries exhausted, dead-lettering"
            );
            dead_letter(state, consumer, delivery, record, DeadLetterCause::RetriesExhausted, err).await;
        }
        Err(err) => {
            let delay = retry.delay_for(record.attempt);
            warn!(
                consumer,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                attempt = record.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "processing failed, scheduling redelivery"
            );
            state.metrics.record_retry();
            if let Err(err) = delivery.nack(delay) {
                warn!(consumer, offset = record.offset, error = %err, "nack rejected");
            }
        }
    }
}

async fn dead_letter(
    state: &AppState,
    consumer: &str,
    delivery: Delivery,
    record: &Record,
    cause: DeadLetterCause,
    err: AppError,
) {
    let entry = DeadLetterEntry::from_record(record, cause, err.to_string());
    match state.dead_letters.route(entry).await {
        Ok(()) => {
            state.metrics.record_dead_letter();
            if let Err(err) = delivery.ack() {
                warn!(consumer, offset = record.offset, error = %err, "ack after dead-letter rejected");
            }
        }
        Err(route_err) => {
            error!(consumer, offset = record.offset, error = %route_err, "dead-letter routing failed");
            let _ = delivery.nack(state.settings.retry.delay_for(record.attempt));
        }
    }
}
