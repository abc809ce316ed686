//! `turntable-middleware` – The Nervous System
//!
//! Routes records and phase transitions between the session core and the
//! outside world without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.  Implements [`PhaseSink`] so the page (or the CLI)
//!   learns about `recall` / `end` / `out_of_models` transitions.
//! - [`adapter`] – the collaborator traits [`LogSink`] and [`PhaseSink`].
//! - [`sinks`] – [`TracingSink`], [`MemorySink`] and [`ObservedSink`].
//! - [`http_sink`] – [`HttpLogSink`]: JSON over HTTP POST to the logging
//!   endpoint, one attempt per record.

pub mod adapter;
pub mod bus;
pub mod http_sink;
pub mod sinks;

pub use adapter::{LogSink, PhaseSink};
pub use bus::{EventBus, Topic, TopicReceiver};
pub use http_sink::HttpLogSink;
pub use sinks::{MemorySink, ObservedSink, SubmittedRecord, TracingSink};
