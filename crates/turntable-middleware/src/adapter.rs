//! Collaborator seams.
//!
//! The session core never speaks HTTP or touches the page directly.  It
//! hands finished records to a [`LogSink`] and announces phase transitions
//! to a [`PhaseSink`]; adapters translate those into the outside world.
//!
//! # Overview
//!
//! - [`HttpLogSink`][crate::http_sink::HttpLogSink] – posts records to the
//!   logging endpoint.
//! - [`TracingSink`][crate::sinks::TracingSink] – writes records to the log
//!   when no endpoint is configured.
//! - [`EventBus`][crate::bus::EventBus] – the default [`PhaseSink`].

use async_trait::async_trait;
use turntable_types::{LogRecord, Phase, TurntableError};

/// Destination for submitted records.
///
/// # Contract
///
/// * `submit` makes exactly one delivery attempt.  Failures are returned as
///   [`TurntableError::SubmissionFailure`]; the sink never retries and never
///   buffers.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one record.
    async fn submit(&self, record: &LogRecord) -> Result<(), TurntableError>;
}

/// Receiver of named phase transitions (`recall`, `end`, `out_of_models`).
pub trait PhaseSink: Send + Sync {
    fn notify(&self, session_id: &str, phase: Phase);
}
