//! Local [`LogSink`] implementations.
//!
//! - [`TracingSink`] – writes each record to the `tracing` log; the fallback
//!   when no logging endpoint is configured.
//! - [`MemorySink`] – keeps records in memory, with optional latency and
//!   failure injection.  Used by the runtime tests and by dry runs.
//! - [`ObservedSink`] – wraps another sink and reports every outcome on the
//!   [`Topic::Records`] lane of an [`EventBus`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use turntable_types::{Event, EventPayload, LogRecord, TurntableError};

use crate::adapter::LogSink;
use crate::bus::{EventBus, Topic};

// ────────────────────────────────────────────────────────────────────────────
// TracingSink
// ────────────────────────────────────────────────────────────────────────────

/// Writes records to the log instead of the network.  Always succeeds.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl LogSink for TracingSink {
    async fn submit(&self, record: &LogRecord) -> Result<(), TurntableError> {
        let body = serde_json::to_string(record)
            .map_err(|e| TurntableError::Serialization(e.to_string()))?;
        info!(
            kind = ?record.kind(),
            model = record.model_name().unwrap_or("-"),
            bytes = body.len(),
            "record"
        );
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MemorySink
// ────────────────────────────────────────────────────────────────────────────

/// A record accepted by a [`MemorySink`], in arrival order.
#[derive(Debug, Clone)]
pub struct SubmittedRecord {
    /// Zero-based arrival index.
    pub seq: usize,
    pub received_at: DateTime<Utc>,
    pub record: LogRecord,
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SubmittedRecord>>,
    latency: Duration,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every submission by `latency` before it completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every subsequent submission fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `submit` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Snapshot of the accepted records.
    pub fn records(&self) -> Vec<SubmittedRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn submit(&self, record: &LogRecord) -> Result<(), TurntableError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TurntableError::SubmissionFailure(
                "memory sink set to fail".to_string(),
            ));
        }
        let mut records = self
            .records
            .lock()
            .map_err(|_| TurntableError::SubmissionFailure("memory sink poisoned".to_string()))?;
        let seq = records.len();
        records.push(SubmittedRecord {
            seq,
            received_at: Utc::now(),
            record: record.clone(),
        });
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObservedSink
// ────────────────────────────────────────────────────────────────────────────

/// Source tag of the events published by [`ObservedSink`].
const OBSERVED_SOURCE: &str = "turntable-middleware::sinks";

/// Forwards to an inner sink and publishes each outcome on the bus.
pub struct ObservedSink {
    inner: Arc<dyn LogSink>,
    bus: EventBus,
}

impl ObservedSink {
    pub fn new(inner: Arc<dyn LogSink>, bus: EventBus) -> Self {
        Self { inner, bus }
    }
}

#[async_trait]
impl LogSink for ObservedSink {
    async fn submit(&self, record: &LogRecord) -> Result<(), TurntableError> {
        let result = self.inner.submit(record).await;
        let payload = match &result {
            Ok(()) => EventPayload::RecordSubmitted {
                kind: record.kind(),
                model_name: record.model_name().map(str::to_string),
            },
            Err(e) => {
                warn!(kind = ?record.kind(), error = %e, "submission failed");
                EventPayload::SubmissionFailed {
                    kind: record.kind(),
                    details: e.to_string(),
                }
            }
        };
        self.bus
            .publish_to(Topic::Records, Event::new(OBSERVED_SOURCE, payload));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turntable_types::{Angles, BaselineRecord, RecordKind};

    fn baseline(model: &str) -> LogRecord {
        LogRecord::Baseline(BaselineRecord::new("s", model, Angles::default()))
    }

    #[tokio::test]
    async fn tracing_sink_accepts_everything() {
        assert!(TracingSink.submit(&baseline("a.glb")).await.is_ok());
    }

    #[tokio::test]
    async fn memory_sink_keeps_arrival_order() {
        let sink = MemorySink::new();
        sink.submit(&baseline("a.glb")).await.unwrap();
        sink.submit(&baseline("b.glb")).await.unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 0);
        assert_eq!(records[1].record.model_name(), Some("b.glb"));
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn memory_sink_failure_is_counted_but_not_stored() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        let err = sink.submit(&baseline("a.glb")).await.unwrap_err();
        assert!(matches!(err, TurntableError::SubmissionFailure(_)));
        assert_eq!(sink.attempts(), 1);
        assert!(sink.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn memory_sink_latency_delays_completion() {
        let sink = MemorySink::new().with_latency(Duration::from_millis(200));
        let start = tokio::time::Instant::now();
        sink.submit(&baseline("a.glb")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn observed_sink_reports_success_and_failure() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Records);
        let inner = Arc::new(MemorySink::new());
        let sink = ObservedSink::new(inner.clone(), bus);

        sink.submit(&baseline("a.glb")).await.unwrap();
        match rx.try_recv().unwrap().payload {
            EventPayload::RecordSubmitted { kind, model_name } => {
                assert_eq!(kind, RecordKind::Baseline);
                assert_eq!(model_name.as_deref(), Some("a.glb"));
            }
            other => panic!("unexpected payload {other:?}"),
        }

        inner.set_failing(true);
        assert!(sink.submit(&baseline("b.glb")).await.is_err());
        assert!(matches!(
            rx.try_recv().unwrap().payload,
            EventPayload::SubmissionFailed { kind: RecordKind::Baseline, .. }
        ));
    }
}
