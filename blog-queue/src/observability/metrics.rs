use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Fire-and-forget counter sink
pub trait MetricsSink: Send + Sync {
    fn increment(&self, counter: &str);
}

/// Live counters for queue operations plus free-form named counters
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_dead_lettered: AtomicU64,

    job_type_metrics: RwLock<HashMap<String, JobTypeMetrics>>,
    counters: RwLock<BTreeMap<String, u64>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_type(&self, job_type: &str, update: impl FnOnce(&mut JobTypeMetrics)) {
        let mut metrics = self.job_type_metrics.write();
        update(metrics.entry(job_type.to_string()).or_default());
    }

    pub fn record_enqueued(&self, job_type: &str) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        self.for_type(job_type, |m| m.enqueued += 1);
    }

    pub fn record_succeeded(&self, job_type: &str) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
        self.for_type(job_type, |m| m.succeeded += 1);
    }

    pub fn record_retried(&self, job_type: &str) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
        self.for_type(job_type, |m| m.retried += 1);
    }

    pub fn record_dead_lettered(&self, job_type: &str) {
        self.jobs_dead_lettered.fetch_add(1, Ordering::Relaxed);
        self.for_type(job_type, |m| m.dead_lettered += 1);
    }

    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_succeeded(&self) -> u64 {
        self.jobs_succeeded.load(Ordering::Relaxed)
    }

    pub fn jobs_retried(&self) -> u64 {
        self.jobs_retried.load(Ordering::Relaxed)
    }

    pub fn jobs_dead_lettered(&self) -> u64 {
        self.jobs_dead_lettered.load(Ordering::Relaxed)
    }

    pub fn job_type_metrics(&self, job_type: &str) -> Option<JobTypeMetrics> {
        self.job_type_metrics.read().get(job_type).cloned()
    }

    /// Current value of a named counter (0 if never incremented)
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            jobs_enqueued: self.jobs_enqueued(),
            jobs_succeeded: self.jobs_succeeded(),
            jobs_retried: self.jobs_retried(),
            jobs_dead_lettered: self.jobs_dead_lettered(),
            job_types: self.job_type_metrics.read().clone(),
            counters: self.counters.read().clone(),
        }
    }
}

impl MetricsSink for LiveMetrics {
    fn increment(&self, counter: &str) {
        *self.counters.write().entry(counter.to_string()).or_insert(0) += 1;
    }
}

/// Metrics for a specific job type
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobTypeMetrics {
    pub enqueued: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

impl JobTypeMetrics {
    /// Share of finished jobs that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        let finished = self.succeeded + self.dead_lettered;
        if finished == 0 {
            100.0
        } else {
            (self.succeeded as f64 / finished as f64) * 100.0
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub jobs_enqueued: u64,
    pub jobs_succeeded: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub job_types: HashMap<String, JobTypeMetrics>,
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    /// Jobs neither succeeded nor dead-lettered yet
    pub fn jobs_in_flight(&self) -> u64 {
        self.jobs_enqueued
            .saturating_sub(self.jobs_succeeded + self.jobs_dead_lettered)
    }
}
