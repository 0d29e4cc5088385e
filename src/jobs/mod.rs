//! Asynchronous job system
//!
//! Five named topics, each a bounded queue with a high-priority lane, a
//! per-topic concurrency cap, retry with exponential backoff, and a rate
//! limiter where the topic calls for one. Delivery is at-least-once: a
//! retried job may observe its own partial effects, so workers are
//! idempotent.

mod workers;

pub use workers::{sanitize_job_error, spawn_workers, JobsConfig, WorkerContext, WorkerPool};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{MemoriaError, Result};

/// Queue capacity per topic lane
const QUEUE_CAPACITY: usize = 10_000;

/// Jobs at or above this priority ride the high lane
pub const HIGH_PRIORITY: u8 = 8;

/// Job topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Embedding,
    BatchImport,
    Consolidation,
    Clustering,
    Decay,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::BatchImport => "batch-import",
            Self::Consolidation => "consolidation",
            Self::Clustering => "clustering",
            Self::Decay => "decay",
        }
    }

    pub fn all() -> &'static [Topic] {
        &[
            Self::Embedding,
            Self::BatchImport,
            Self::Consolidation,
            Self::Clustering,
            Self::Decay,
        ]
    }

    /// Concurrent workers per topic
    pub fn concurrency(&self) -> usize {
        match self {
            Self::Embedding => 3,
            Self::BatchImport => 2,
            Self::Consolidation => 1,
            Self::Clustering => 1,
            Self::Decay => 2,
        }
    }

    /// Rate limit as (jobs, per_seconds), if the topic has one
    pub fn rate_limit(&self) -> Option<(u32, u64)> {
        match self {
            Self::Embedding => Some((10, 1)),
            Self::Decay => Some((5, 60)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued unit of work
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub topic: Topic,
    pub payload: Value,
    pub priority: u8,
    pub attempts: u32,
}

impl Job {
    pub fn new(topic: Topic, payload: Value, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic,
            payload,
            priority: priority.min(10),
            attempts: 0,
        }
    }

    /// Exponential backoff for the next attempt, clamped to 2–5 s
    pub fn backoff(&self) -> std::time::Duration {
        let secs = 2u64.saturating_mul(1 << self.attempts.min(4));
        std::time::Duration::from_secs(secs.clamp(2, 5))
    }
}

/// Maximum delivery attempts before a retryable failure becomes permanent
pub const MAX_ATTEMPTS: u32 = 3;

struct TopicQueue {
    high_tx: Sender<Job>,
    high_rx: Receiver<Job>,
    normal_tx: Sender<Job>,
    normal_rx: Receiver<Job>,
}

impl TopicQueue {
    fn new() -> Self {
        let (high_tx, high_rx) = bounded(QUEUE_CAPACITY);
        let (normal_tx, normal_rx) = bounded(QUEUE_CAPACITY);
        Self {
            high_tx,
            high_rx,
            normal_tx,
            normal_rx,
        }
    }
}

/// Per-topic counters
#[derive(Debug, Default)]
pub struct TopicMetrics {
    pub enqueued: AtomicU64,
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub last_duration_ms: AtomicU64,
}

/// Metrics for every topic
pub struct JobMetrics {
    topics: HashMap<Topic, TopicMetrics>,
}

impl JobMetrics {
    fn new() -> Self {
        Self {
            topics: Topic::all()
                .iter()
                .map(|t| (*t, TopicMetrics::default()))
                .collect(),
        }
    }

    pub fn topic(&self, topic: Topic) -> &TopicMetrics {
        &self.topics[&topic]
    }

    pub fn snapshot(&self) -> serde_json::Map<String, Value> {
        let mut out = serde_json::Map::new();
        for (topic, metrics) in &self.topics {
            out.insert(
                topic.as_str().to_string(),
                serde_json::json!({
                    "enqueued": metrics.enqueued.load(Ordering::Relaxed),
                    "processed": metrics.processed.load(Ordering::Relaxed),
                    "failed": metrics.failed.load(Ordering::Relaxed),
                    "retried": metrics.retried.load(Ordering::Relaxed),
                    "last_duration_ms": metrics.last_duration_ms.load(Ordering::Relaxed),
                }),
            );
        }
        out
    }
}

/// Cloneable handle for enqueueing jobs and receiving them in workers
pub struct JobDispatcher {
    queues: Arc<HashMap<Topic, TopicQueue>>,
    metrics: Arc<JobMetrics>,
}

impl Clone for JobDispatcher {
    fn clone(&self) -> Self {
        Self {
            queues: self.queues.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl Default for JobDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl JobDispatcher {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(
                Topic::all()
                    .iter()
                    .map(|t| (*t, TopicQueue::new()))
                    .collect(),
            ),
            metrics: Arc::new(JobMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<JobMetrics> {
        self.metrics.clone()
    }

    /// Enqueue from synchronous code. Fails when the queue is closed
    /// (shutdown) or persistently full.
    pub fn enqueue(&self, topic: Topic, payload: Value, priority: u8) -> Result<Job> {
        let job = Job::new(topic, payload, priority);
        self.send(job.clone())?;
        Ok(job)
    }

    /// Re-enqueue a job for another attempt
    pub fn requeue(&self, mut job: Job) -> Result<()> {
        job.attempts += 1;
        self.metrics.topic(job.topic).retried.fetch_add(1, Ordering::Relaxed);
        self.send(job)
    }

    fn send(&self, job: Job) -> Result<()> {
        let queue = &self.queues[&job.topic];
        let sender = if job.priority >= HIGH_PRIORITY {
            &queue.high_tx
        } else {
            &queue.normal_tx
        };
        let topic = job.topic;
        sender
            .try_send(job)
            .map_err(|e| MemoriaError::Queue(format!("{topic} queue unavailable: {e}")))?;
        self.metrics.topic(topic).enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Receivers for a topic's lanes (high, normal)
    pub fn receivers(&self, topic: Topic) -> (Receiver<Job>, Receiver<Job>) {
        let queue = &self.queues[&topic];
        (queue.high_rx.clone(), queue.normal_rx.clone())
    }

    /// Queued job count across both lanes
    pub fn depth(&self, topic: Topic) -> usize {
        let queue = &self.queues[&topic];
        queue.high_rx.len() + queue.normal_rx.len()
    }

    /// Close every queue; workers drain what they hold and exit
    pub fn close(&self) {
        for queue in self.queues.values() {
            queue.high_tx.close();
            queue.normal_tx.close();
        }
    }
}

/// Async token bucket for per-topic rate limits
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: parking_lot::Mutex<(f64, std::time::Instant)>,
}

impl RateLimiter {
    pub fn new(jobs: u32, per_seconds: u64) -> Self {
        let capacity = jobs as f64;
        Self {
            capacity,
            refill_per_sec: capacity / per_seconds as f64,
            state: parking_lot::Mutex::new((capacity, std::time::Instant::now())),
        }
    }

    /// Wait until a token is available
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                let (tokens, last) = *state;
                let refilled =
                    (tokens + last.elapsed().as_secs_f64() * self.refill_per_sec).min(self.capacity);
                if refilled >= 1.0 {
                    *state = (refilled - 1.0, std::time::Instant::now());
                    None
                } else {
                    Some(std::time::Duration::from_secs_f64(
                        (1.0 - refilled) / self.refill_per_sec,
                    ))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}
