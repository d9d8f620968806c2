use std::sync::atomic::{AtomicU64, Ordering};

use fraudline_domain::PipelineMode;

#[derive(Debug, Default)]
pub struct Metrics {
    ingest_sync: AtomicU64,
    ingest_async: AtomicU64,
    ingest_errors: AtomicU64,
    publish_failures: AtomicU64,
    scored: AtomicU64,
    flagged: AtomicU64,
    alerts_published: AtomicU64,
    alerts_deduplicated: AtomicU64,
    alerts_delivered: AtomicU64,
    retries: AtomicU64,
    dead_letters: AtomicU64,
}

impl Metrics {
    pub fn record_ingest(&self, mode: PipelineMode) {
        let counter = match mode {
            PipelineMode::Sync => &self.ingest_sync,
            PipelineMode::Async => &self.ingest_async,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingest_error(&self) {
        self.ingest_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_score(&self, flagged: bool) {
        self.scored.fetch_add(1, Ordering::Relaxed);
        if flagged {
            self.flagged.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_alert_published(&self) {
        self.alerts_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_deduplicated(&self) {
        self.alerts_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_delivered(&self) {
        self.alerts_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scored(&self) -> u64 {
        self.scored.load(Ordering::Relaxed)
    }

    pub fn alerts_published(&self) -> u64 {
        self.alerts_published.load(Ordering::Relaxed)
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn dead_letters(&self) -> u64 {
        self.dead_letters.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        format!(
            "# TYPE fraudline_ingest_total counter\n\
fraudline_ingest_total{{mode=\"sync\"}} {}\n\
fraudline_ingest_total{{mode=\"async\"}} {}\n\
# TYPE fraudline_ingest_errors_total counter\n\
fraudline_ingest_errors_total {}\n\
# TYPE fraudline_publish_failures_total counter\n\
fraudline_publish_failures_total {}\n\
# TYPE fraudline_scored_total counter\n\
fraudline_scored_total {}\n\
# TYPE fraudline_flagged_total counter\n\
fraudline_flagged_total {}\n\
# TYPE fraudline_alerts_published_total counter\n\
fraudline_alerts_published_total {}\n\
# TYPE fraudline_alerts_deduplicated_total counter\n\
fraudline_alerts_deduplicated_total {}\n\
# TYPE fraudline_alerts_delivered_total counter\n\
fraudline_alerts_delivered_total {}\n\
# TYPE fraudline_retries_total counter\n\
fraudline_retries_total {}\n\
# TYPE fraudline_dead_letters_total counter\n\
fraudline_dead_letters_total {}\n",
            load(&self.ingest_sync),
            load(&self.ingest_async),
            load(&self.ingest_errors),
            load(&self.publish_failures),
            load(&self.scored),
            load(&self.flagged),
            load(&self.alerts_published),
            load(&self.alerts_deduplicated),
            load(&self.alerts_delivered),
            load(&self.retries),
            load(&self.dead_letters),
        )
    }
}
