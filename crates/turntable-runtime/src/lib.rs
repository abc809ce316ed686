//! `turntable-runtime` – The Session Engine
//!
//! Everything between "participant opens the page" and "thank-you screen":
//! choosing which models to show, gating how long each is shown, recording
//! each rotation step and running the recognition test.
//!
//! # Modules
//!
//! - [`catalog`] – [`ModelCatalog`][catalog::ModelCatalog] and
//!   [`FoilRule`][catalog::FoilRule]: the model list split into regular
//!   models and recall-only foils.
//! - [`sequence`] – [`SequenceGenerator`][sequence::SequenceGenerator]:
//!   filter, truncate and Fisher-Yates shuffle behind an injected RNG.
//! - [`session`] – [`Session`][session::Session]: sequence, cursor, counters
//!   and the cumulative seen history.
//! - [`trial`] – [`TrialController`][trial::TrialController]: the
//!   `Idle → Loading → Viewing → Advancing` state machine with its
//!   interaction ceiling and per-trial budget.
//! - [`recorder`] – [`ActionRecorder`][recorder::ActionRecorder]:
//!   before/after capture of one step with a single-permit in-flight guard.
//! - [`recall`] – [`RecallEngine`][recall::RecallEngine]: recognition-test
//!   rounds and scoring.
//! - [`runner`] – [`ExperimentRunner`][runner::ExperimentRunner]: wires the
//!   above to the loader, the log sink and the phase sink, and runs the
//!   countdown timer.
//! - [`collaborators`] – the scene-side traits
//!   [`ModelLoader`][collaborators::ModelLoader],
//!   [`ModelHandle`][collaborators::ModelHandle] and
//!   [`SnapshotSource`][collaborators::SnapshotSource].
//! - [`sim`] – [`SimScene`][sim::SimScene]: a headless scene implementing
//!   the collaborator traits.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber in the configured
//!   [`LogFormat`][telemetry::LogFormat] with an optional OTLP span
//!   exporter.

pub mod catalog;
pub mod collaborators;
pub mod recall;
pub mod recorder;
pub mod runner;
pub mod sequence;
pub mod session;
pub mod sim;
pub mod telemetry;
pub mod trial;

pub use catalog::{FoilRule, ModelCatalog};
pub use collaborators::{ModelHandle, ModelLoader, Snapshot, SnapshotSource};
pub use recall::{RecallConfig, RecallEngine, RecallItem, RecallTest, RoundPolicy};
pub use recorder::{ActionRecorder, ActiveModel, DropReason, RecorderConfig, StepOutcome, StepPermit};
pub use runner::{Collaborators, ExperimentRunner, RunnerConfig, RunnerPhase, RunnerStatus, StepEvent, TimerEvent};
pub use sequence::SequenceGenerator;
pub use session::Session;
pub use telemetry::{LogFormat, TelemetryConfig, TracerProviderGuard, init_tracing};
pub use trial::{BudgetPolicy, Transition, Trial, TrialConfig, TrialController, TrialState};
