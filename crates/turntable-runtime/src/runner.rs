//! [`ExperimentRunner`] – wires one session end to end.
//!
//! The runner owns the [`TrialController`], the [`ActionRecorder`] and the
//! [`RecallEngine`] and turns controller [`Transition`]s into side effects:
//!
//! 1. **Load** – ask the [`ModelLoader`] for the model, apply the
//!    name-seeded pose, submit the baseline record, start the countdown.
//! 2. **PhaseComplete** – announce [`Phase::Recall`] and build the first
//!    recall round.
//! 3. **Exhausted** – announce [`Phase::OutOfModels`].
//!
//! After the last recall round it announces [`Phase::End`].  With zero
//! recall rounds configured, viewing goes straight to [`Phase::End`].
//!
//! # Steps
//!
//! [`ExperimentRunner::begin_step`] reserves the recorder's in-flight slot
//! synchronously, charges the budget, and records the step on a spawned
//! task.  The outcome arrives as a [`StepEvent`] on the channel handed out
//! by [`ExperimentRunner::take_step_events`].  A shell that keeps reading
//! input while the task runs drops steps typed in the meantime instead of
//! queueing them.  [`ExperimentRunner::step`] is the awaited form.
//!
//! # Countdown timer
//!
//! With a [`BudgetPolicy::Countdown`] budget every trial spawns a task that
//! sends one [`TimerEvent::Tick`] per second, tagged with the trial's
//! generation.  The shell that drives the runner takes the receiving end
//! with [`ExperimentRunner::take_timer_events`] and feeds each event back
//! through [`ExperimentRunner::on_timer`].  A new trial, a manual advance or
//! a reset aborts the previous task, and any tick still queued for it is
//! ignored by generation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use turntable_memory::{SeenEntry, SeenStore};
//! use turntable_middleware::{EventBus, TracingSink};
//! use turntable_runtime::catalog::{FoilRule, ModelCatalog};
//! use turntable_runtime::runner::{Collaborators, ExperimentRunner, RunnerConfig};
//! use turntable_runtime::sim::SimScene;
//! use turntable_types::Action;
//!
//! # async fn demo() -> Result<(), turntable_types::TurntableError> {
//! let scene = Arc::new(SimScene::new());
//! let bus = EventBus::default();
//! let collaborators = Collaborators {
//!     loader: scene.clone(),
//!     snapshots: scene,
//!     sink: Arc::new(TracingSink),
//!     phases: Arc::new(bus.clone()),
//! };
//! let catalog = Arc::new(ModelCatalog::new(["a.glb", "b.glb"], FoilRule::default()));
//! let seen = SeenStore::open_in_memory().map_err(|e| turntable_types::TurntableError::Storage(e.to_string()))?;
//! let mut runner = ExperimentRunner::new(RunnerConfig::default(), catalog, seen, collaborators, bus)?;
//! runner.start().await;
//! runner.step(Action::Left).await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use turntable_memory::{SeenEntry, SeenStore};
use turntable_middleware::{EventBus, LogSink, PhaseSink, Topic};
use turntable_orientation::{Orientation, seeded_pose};
use turntable_types::{Action, Event, EventPayload, MemoryTestBatch, Phase, TurntableError};

use crate::catalog::ModelCatalog;
use crate::collaborators::{ModelLoader, SnapshotSource};
use crate::recall::{RecallConfig, RecallEngine, RecallTest};
use crate::recorder::{ActionRecorder, ActiveModel, DropReason, RecorderConfig, StepOutcome, StepPermit};
use crate::session::Session;
use crate::trial::{BudgetPolicy, TrialConfig, TrialController, TrialState, Transition};

/// Countdown resolution.
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Source tag of events published by the runner.
const RUNNER_SOURCE: &str = "turntable-runtime::runner";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`ExperimentRunner`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunnerConfig {
    pub trial: TrialConfig,
    pub recorder: RecorderConfig,
    pub recall: RecallConfig,
    /// Start every model at the pose derived from its name.
    pub seeded_initial_pose: bool,
    /// Seed for the sequence and recall shuffles.  `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// External collaborators the runner drives.
pub struct Collaborators {
    pub loader: Arc<dyn ModelLoader>,
    pub snapshots: Arc<dyn SnapshotSource>,
    pub sink: Arc<dyn LogSink>,
    pub phases: Arc<dyn PhaseSink>,
}

/// Countdown event sent by the per-trial timer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { generation: u64 },
}

/// Outcome of a step started with [`ExperimentRunner::begin_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    pub action: Action,
    pub outcome: StepOutcome,
}

/// Coarse position of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    Viewing,
    Recall,
    Ended,
    OutOfModels,
}

/// Snapshot of the runner for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerStatus {
    pub session_id: String,
    pub phase: RunnerPhase,
    pub state: TrialState,
    pub model: Option<String>,
    /// Model whose load has not resolved; stays set while a failed load
    /// stalls the trial.
    pub loading: Option<String>,
    pub interaction_count: usize,
    pub max_models: usize,
    pub current_index: usize,
    pub sequence_len: usize,
    pub budget: BudgetPolicy,
    pub budget_remaining: u32,
    pub recall_round: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ExperimentRunner
// ─────────────────────────────────────────────────────────────────────────────

pub struct ExperimentRunner {
    catalog: Arc<ModelCatalog>,
    controller: TrialController,
    recorder: Arc<ActionRecorder>,
    recall: RecallEngine,
    loader: Arc<dyn ModelLoader>,
    phases: Arc<dyn PhaseSink>,
    bus: EventBus,
    seeded_initial_pose: bool,
    rng: StdRng,
    phase: RunnerPhase,
    active: Option<ActiveModel>,
    timer: Option<JoinHandle<()>>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: Option<mpsc::UnboundedReceiver<TimerEvent>>,
    step_tx: mpsc::UnboundedSender<StepEvent>,
    step_rx: Option<mpsc::UnboundedReceiver<StepEvent>>,
}

impl ExperimentRunner {
    /// Create a session over `catalog` and generate its first sequence.
    ///
    /// # Errors
    ///
    /// [`TurntableError::Storage`] if the seen history cannot be read.
    pub fn new(
        config: RunnerConfig,
        catalog: Arc<ModelCatalog>,
        seen: SeenStore,
        collaborators: Collaborators,
        bus: EventBus,
    ) -> Result<Self, TurntableError> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let session = Session::generate(seen, &mut rng);
        info!(session_id = session.id(), catalog = catalog.len(), "session created");
        let controller = TrialController::new(config.trial, Arc::clone(&catalog), session, &mut rng)?;
        let recorder = Arc::new(ActionRecorder::new(
            config.recorder,
            Arc::clone(&collaborators.sink),
            collaborators.snapshots,
        ));
        let recall = RecallEngine::new(config.recall, collaborators.sink);
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (step_tx, step_rx) = mpsc::unbounded_channel();

        Ok(Self {
            catalog,
            controller,
            recorder,
            recall,
            loader: collaborators.loader,
            phases: collaborators.phases,
            bus,
            seeded_initial_pose: config.seeded_initial_pose,
            rng,
            phase: RunnerPhase::Viewing,
            active: None,
            timer: None,
            timer_tx,
            timer_rx: Some(timer_rx),
            step_tx,
            step_rx: Some(step_rx),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn session_id(&self) -> &str {
        self.controller.session().id()
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    pub fn controller(&self) -> &TrialController {
        &self.controller
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn active_model(&self) -> Option<&ActiveModel> {
        self.active.as_ref()
    }

    /// The recall round awaiting answers, if any.
    pub fn recall_test(&self) -> Option<&RecallTest> {
        self.recall.current()
    }

    /// Hand out the receiving end of the countdown channel.  Only the first
    /// call returns `Some`.
    pub fn take_timer_events(&mut self) -> Option<mpsc::UnboundedReceiver<TimerEvent>> {
        self.timer_rx.take()
    }

    /// Hand out the receiving end of the step channel.  Only the first call
    /// returns `Some`.
    pub fn take_step_events(&mut self) -> Option<mpsc::UnboundedReceiver<StepEvent>> {
        self.step_rx.take()
    }

    /// `true` while a step is being recorded.
    pub fn step_in_flight(&self) -> bool {
        self.recorder.is_busy()
    }

    /// Every model in the seen history, oldest first, with the session
    /// that showed it.
    ///
    /// # Errors
    ///
    /// [`TurntableError::Storage`] if the history cannot be read.
    pub fn seen_history(&self) -> Result<Vec<SeenEntry>, TurntableError> {
        self.controller
            .session()
            .seen()
            .entries()
            .map_err(crate::session::storage_error)
    }

    pub fn status(&self) -> RunnerStatus {
        let session = self.controller.session();
        RunnerStatus {
            session_id: session.id().to_string(),
            phase: self.phase,
            state: self.controller.state(),
            model: self.active.as_ref().map(|a| a.name.clone()),
            loading: self.controller.pending_model().map(str::to_string),
            interaction_count: session.interaction_count(),
            max_models: self.controller.config().max_models,
            current_index: session.current_index(),
            sequence_len: session.sequence().len(),
            budget: self.controller.config().budget,
            budget_remaining: self.controller.budget_remaining(),
            recall_round: self.recall.current().map(|t| t.round),
        }
    }

    // -------------------------------------------------------------------------
    // Session operations
    // -------------------------------------------------------------------------

    /// Load the first model.
    pub async fn start(&mut self) -> Transition {
        if self.phase != RunnerPhase::Viewing {
            return Transition::Ignored;
        }
        let transition = self.controller.start();
        self.apply(transition.clone()).await;
        transition
    }

    /// Record one directional step on the model on screen and wait for it.
    pub async fn step(&mut self, action: Action) -> StepOutcome {
        match self.reserve_step() {
            Ok(slot) => self.recorder.capture(slot, action).await,
            Err(reason) => StepOutcome::Dropped(reason),
        }
    }

    /// Start recording one directional step without waiting for it.
    ///
    /// The budget is charged here; the outcome is delivered as a
    /// [`StepEvent`].  Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// The [`DropReason`] when the step cannot be taken right now,
    /// including [`DropReason::InFlight`] while the previous step is still
    /// being recorded.
    pub fn begin_step(&mut self, action: Action) -> Result<(), DropReason> {
        let slot = self.reserve_step()?;
        let recorder = Arc::clone(&self.recorder);
        let tx = self.step_tx.clone();
        tokio::spawn(async move {
            let outcome = recorder.capture(slot, action).await;
            // The receiver is gone once the shell has closed.
            let _ = tx.send(StepEvent { action, outcome });
        });
        Ok(())
    }

    /// Manual "load next".
    pub async fn next(&mut self) -> Transition {
        let transition = self.controller.request_next();
        if transition != Transition::Ignored {
            self.stop_timer();
            self.apply(transition.clone()).await;
        }
        transition
    }

    /// Feed one countdown event back into the controller.
    pub async fn on_timer(&mut self, event: TimerEvent) -> Transition {
        let TimerEvent::Tick { generation } = event;
        let transition = self.controller.tick(generation);
        self.apply(transition.clone()).await;
        transition
    }

    /// Score the pending recall round.  `responses` maps model identifiers
    /// to "seen" answers; missing models count as "not seen".
    pub async fn answer(&mut self, responses: &HashMap<String, bool>) -> Option<MemoryTestBatch> {
        if self.phase != RunnerPhase::Recall {
            return None;
        }
        let batch = self.recall.score_submission(responses).await?;
        if self.recall.is_finished() {
            self.phase = RunnerPhase::Ended;
            self.phases.notify(self.session_id(), Phase::End);
        } else {
            self.build_recall_round();
        }
        Some(batch)
    }

    /// Start over with a fresh sequence.  The seen history is kept.
    ///
    /// # Errors
    ///
    /// [`TurntableError::Storage`] if the seen history cannot be read.
    pub fn reset(&mut self) -> Result<(), TurntableError> {
        self.stop_timer();
        self.active = None;
        self.controller.reset(&mut self.rng)?;
        self.recall.reset();
        self.phase = RunnerPhase::Viewing;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    fn reserve_step(&mut self) -> Result<StepPermit, DropReason> {
        let active = match self.controller.state() {
            TrialState::Viewing => self.active.as_ref(),
            _ => None,
        };
        let slot = self.recorder.reserve(active, self.controller.budget_remaining())?;
        self.controller.consume_step();
        Ok(slot)
    }

    async fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Load(model) => self.load_model(model).await,
            Transition::PhaseComplete => {
                self.end_viewing();
                if self.recall.is_finished() {
                    info!("no recall rounds configured; ending the session");
                    self.phase = RunnerPhase::Ended;
                    self.phases.notify(self.session_id(), Phase::End);
                    return;
                }
                self.phase = RunnerPhase::Recall;
                self.phases.notify(self.session_id(), Phase::Recall);
                self.build_recall_round();
            }
            Transition::Exhausted => {
                let session = self.controller.session();
                let error = TurntableError::SequenceExhausted {
                    requested: self.controller.config().max_models,
                    available: session.interaction_count(),
                };
                warn!(session_id = session.id(), error = %error, "viewing phase cut short");
                self.end_viewing();
                self.phase = RunnerPhase::OutOfModels;
                self.phases.notify(self.session_id(), Phase::OutOfModels);
            }
            Transition::Stay | Transition::Ignored => {}
        }
    }

    #[instrument(skip(self), fields(session_id = %self.controller.session().id()))]
    async fn load_model(&mut self, model: String) {
        self.stop_timer();
        self.active = None;

        let handle = match self.loader.load(&model).await {
            Ok(handle) => handle,
            Err(e) => {
                self.controller.on_load_failed(&model, &e);
                return;
            }
        };
        if self.seeded_initial_pose {
            handle.set_rotation(seeded_pose(&model));
        }
        let Some(generation) = self.controller.on_loaded(&model) else {
            return;
        };
        self.controller
            .set_baseline(Orientation::from_quaternion(handle.rotation()).angles());

        let active = ActiveModel {
            session_id: self.session_id().to_string(),
            name: model,
            handle,
        };
        // Failures are logged by the recorder; the trial goes on.
        let _ = self.recorder.record_baseline(&active).await;

        let index = self.controller.session().interaction_count();
        self.bus.publish_to(
            Topic::Phase,
            Event::new(
                RUNNER_SOURCE,
                EventPayload::TrialStarted {
                    session_id: active.session_id.clone(),
                    model_name: active.name.clone(),
                    index,
                },
            ),
        );
        self.active = Some(active);

        if self.controller.config().budget.is_countdown() {
            self.start_timer(generation);
        }
    }

    fn end_viewing(&mut self) {
        self.stop_timer();
        self.active = None;
    }

    fn build_recall_round(&mut self) {
        let seen = match self.controller.session().seen_set() {
            Ok(seen) => seen,
            Err(e) => {
                warn!(error = %e, "seen history unavailable; using this session's models only");
                self.controller.session().shown().iter().cloned().collect()
            }
        };
        let shown = self.controller.session().shown().to_vec();
        self.recall
            .build_test(&shown, &seen, &self.catalog, &mut self.rng);
    }

    fn start_timer(&mut self, generation: u64) {
        self.stop_timer();
        let tx = self.timer_tx.clone();
        self.timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_PERIOD);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(TimerEvent::Tick { generation }).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ExperimentRunner {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FoilRule;
    use crate::sim::SimScene;
    use turntable_middleware::{MemorySink, TopicReceiver};
    use turntable_types::{LogRecord, RecordKind};

    struct Harness {
        runner: ExperimentRunner,
        scene: Arc<SimScene>,
        sink: Arc<MemorySink>,
        phases: TopicReceiver,
    }

    fn catalog(regular: usize, foils: usize) -> Arc<ModelCatalog> {
        let mut names: Vec<String> = (1..=regular).map(|i| format!("Set_{i}_orig_matte_0.glb")).collect();
        names.extend((1..=foils).map(|i| format!("Set_{i}_foil.glb")));
        Arc::new(ModelCatalog::new(names, FoilRule::default()))
    }

    fn harness(config: RunnerConfig, catalog: Arc<ModelCatalog>) -> Harness {
        let scene = Arc::new(SimScene::new());
        let sink = Arc::new(MemorySink::new());
        let bus = EventBus::default();
        let phases = bus.subscribe_to(Topic::Phase);
        let collaborators = Collaborators {
            loader: scene.clone(),
            snapshots: scene.clone(),
            sink: sink.clone(),
            phases: Arc::new(bus.clone()),
        };
        let runner = ExperimentRunner::new(
            config,
            catalog,
            SeenStore::open_in_memory().unwrap(),
            collaborators,
            bus,
        )
        .unwrap();
        Harness {
            runner,
            scene,
            sink,
            phases,
        }
    }

    fn steps_config(steps: u32) -> RunnerConfig {
        RunnerConfig {
            trial: TrialConfig {
                budget: BudgetPolicy::Steps { steps },
                ..TrialConfig::default()
            },
            recorder: RecorderConfig {
                settle_delay: Duration::ZERO,
                ..RecorderConfig::default()
            },
            seeded_initial_pose: true,
            seed: Some(7),
            ..RunnerConfig::default()
        }
    }

    fn announced(rx: &mut TopicReceiver) -> Vec<Phase> {
        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EventPayload::PhaseChanged { phase, .. } = event.payload {
                phases.push(phase);
            }
        }
        phases
    }

    fn truthful(test: &RecallTest) -> HashMap<String, bool> {
        test.items
            .iter()
            .map(|i| (i.model_name.clone(), i.actually_seen))
            .collect()
    }

    #[tokio::test]
    async fn full_session_reaches_end() {
        let mut h = harness(steps_config(1), catalog(20, 5));

        assert!(matches!(h.runner.start().await, Transition::Load(_)));
        for _ in 0..9 {
            assert!(h.runner.step(Action::Right).await.is_recorded());
            assert!(matches!(h.runner.next().await, Transition::Load(_)));
        }
        assert!(h.runner.step(Action::Up).await.is_recorded());
        assert_eq!(h.runner.next().await, Transition::PhaseComplete);
        assert_eq!(h.runner.phase(), RunnerPhase::Recall);
        assert_eq!(h.scene.loads().len(), 10);
        assert_eq!(announced(&mut h.phases), vec![Phase::Recall]);

        let first = h.runner.recall_test().cloned().expect("round 1");
        assert_eq!(first.items.len(), 8);
        let batch = h.runner.answer(&truthful(&first)).await.unwrap();
        assert!(batch.results.iter().all(|r| r.correct));
        assert_eq!(h.runner.phase(), RunnerPhase::Recall);

        let second = h.runner.recall_test().cloned().expect("round 2");
        assert_eq!(second.round, 2);
        h.runner.answer(&truthful(&second)).await.unwrap();
        assert_eq!(h.runner.phase(), RunnerPhase::Ended);
        assert_eq!(announced(&mut h.phases), vec![Phase::End]);
        assert!(h.runner.answer(&HashMap::new()).await.is_none());

        // 10 baselines, 10 steps, 2 memory-test batches.
        let kinds: Vec<RecordKind> = h.sink.records().iter().map(|r| r.record.kind()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == RecordKind::Baseline).count(), 10);
        assert_eq!(kinds.iter().filter(|k| **k == RecordKind::Step).count(), 10);
        assert_eq!(kinds.iter().filter(|k| **k == RecordKind::MemoryTest).count(), 2);
    }

    #[tokio::test]
    async fn baseline_precedes_every_step_of_its_model() {
        let mut h = harness(steps_config(3), catalog(5, 0));
        h.runner.start().await;
        for _ in 0..3 {
            h.runner.step(Action::Left).await;
        }
        h.runner.next().await;
        h.runner.step(Action::Down).await;

        let mut baselined = std::collections::HashSet::new();
        for submitted in h.sink.records() {
            match &submitted.record {
                LogRecord::Baseline(b) => {
                    assert!(baselined.insert(b.model_name.clone()), "second baseline for {}", b.model_name);
                }
                LogRecord::Step(s) => {
                    assert!(baselined.contains(&s.model_name), "step before baseline for {}", s.model_name);
                }
                LogRecord::MemoryTest(_) => {}
            }
        }
        assert_eq!(baselined.len(), 2);
    }

    #[tokio::test]
    async fn seeded_pose_is_the_baseline() {
        let mut h = harness(steps_config(1), catalog(3, 0));
        let Transition::Load(model) = h.runner.start().await else {
            panic!("expected a load");
        };
        let expected = Orientation::from_quaternion(seeded_pose(&model)).angles();
        let records = h.sink.records();
        let LogRecord::Baseline(baseline) = &records[0].record else {
            panic!("first record must be the baseline");
        };
        assert_eq!(baseline.model_name, model);
        assert_eq!(baseline.initial_angles, expected);
        assert_eq!(h.runner.controller().trial().unwrap().baseline, Some(expected));
    }

    #[tokio::test]
    async fn step_budget_drops_extra_steps() {
        let mut h = harness(steps_config(2), catalog(3, 0));
        h.runner.start().await;
        assert!(h.runner.step(Action::Up).await.is_recorded());
        assert!(h.runner.step(Action::Up).await.is_recorded());
        assert_eq!(
            h.runner.step(Action::Up).await,
            StepOutcome::Dropped(DropReason::BudgetExhausted)
        );
        assert_eq!(h.runner.status().budget_remaining, 0);
    }

    #[tokio::test]
    async fn short_catalog_runs_out_of_models() {
        let mut h = harness(steps_config(1), catalog(3, 2));
        h.runner.start().await;
        h.runner.step(Action::Up).await;
        h.runner.next().await;
        h.runner.step(Action::Up).await;
        h.runner.next().await;
        h.runner.step(Action::Up).await;
        assert_eq!(h.runner.next().await, Transition::Exhausted);
        assert_eq!(h.runner.phase(), RunnerPhase::OutOfModels);
        assert_eq!(announced(&mut h.phases), vec![Phase::OutOfModels]);
        assert!(h.runner.active_model().is_none());
        assert_eq!(
            h.runner.step(Action::Up).await,
            StepOutcome::Dropped(DropReason::NoActiveTrial)
        );
    }

    #[tokio::test]
    async fn load_failure_stalls_the_trial() {
        let mut h = harness(steps_config(1), catalog(1, 0));
        h.scene.fail_on("Set_1_orig_matte_0.glb");
        assert!(matches!(h.runner.start().await, Transition::Load(_)));
        assert_eq!(h.runner.controller().state(), TrialState::Loading);
        assert!(h.runner.active_model().is_none());
        assert_eq!(
            h.runner.step(Action::Up).await,
            StepOutcome::Dropped(DropReason::NoActiveTrial)
        );
        assert_eq!(h.runner.next().await, Transition::Ignored);
        assert!(h.sink.records().is_empty());
        assert_eq!(h.runner.status().loading.as_deref(), Some("Set_1_orig_matte_0.glb"));
    }

    #[tokio::test]
    async fn zero_recall_rounds_end_the_session_after_viewing() {
        let config = RunnerConfig {
            trial: TrialConfig {
                max_models: 1,
                budget: BudgetPolicy::Steps { steps: 1 },
                ..TrialConfig::default()
            },
            recall: RecallConfig {
                rounds: 0,
                ..RecallConfig::default()
            },
            ..steps_config(1)
        };
        let mut h = harness(config, catalog(5, 2));
        h.runner.start().await;
        assert!(h.runner.step(Action::Up).await.is_recorded());
        let _ = announced(&mut h.phases);

        assert_eq!(h.runner.next().await, Transition::PhaseComplete);
        assert_eq!(h.runner.phase(), RunnerPhase::Ended);
        assert_eq!(announced(&mut h.phases), vec![Phase::End]);
        assert!(h.runner.recall_test().is_none());
        assert!(h.runner.answer(&HashMap::new()).await.is_none());
        assert!(
            h.sink
                .records()
                .iter()
                .all(|r| r.record.kind() != RecordKind::MemoryTest)
        );
    }

    #[tokio::test]
    async fn steps_typed_while_one_is_in_flight_are_dropped() {
        let mut config = steps_config(5);
        config.recorder.settle_delay = Duration::from_millis(20);
        let mut h = harness(config, catalog(3, 0));
        let mut steps = h.runner.take_step_events().expect("step channel");
        assert!(h.runner.take_step_events().is_none());
        h.runner.start().await;

        assert_eq!(h.runner.begin_step(Action::Left), Ok(()));
        assert!(h.runner.step_in_flight());
        assert_eq!(h.runner.begin_step(Action::Left), Err(DropReason::InFlight));
        assert_eq!(h.runner.begin_step(Action::Right), Err(DropReason::InFlight));
        assert_eq!(h.runner.status().budget_remaining, 4);

        let done = steps.recv().await.expect("step finished");
        assert_eq!(done.action, Action::Left);
        assert!(done.outcome.is_recorded());
        assert!(!h.runner.step_in_flight());

        assert_eq!(h.runner.begin_step(Action::Up), Ok(()));
        let done = steps.recv().await.expect("step finished");
        assert_eq!(done.action, Action::Up);
        assert!(steps.try_recv().is_err());

        let logged = h
            .sink
            .records()
            .iter()
            .filter(|r| r.record.kind() == RecordKind::Step)
            .count();
        assert_eq!(logged, 2);
        assert_eq!(h.runner.status().budget_remaining, 3);
    }

    #[tokio::test]
    async fn begin_step_checks_budget_and_trial() {
        let mut h = harness(steps_config(1), catalog(3, 0));
        assert_eq!(h.runner.begin_step(Action::Up), Err(DropReason::NoActiveTrial));
        h.runner.start().await;
        let mut steps = h.runner.take_step_events().unwrap();
        assert_eq!(h.runner.begin_step(Action::Up), Ok(()));
        steps.recv().await.unwrap();
        assert_eq!(h.runner.begin_step(Action::Up), Err(DropReason::BudgetExhausted));
    }

    #[tokio::test]
    async fn next_model_baseline_waits_for_the_in_flight_step() {
        let mut config = steps_config(1);
        config.recorder.settle_delay = Duration::from_millis(20);
        let mut h = harness(config, catalog(3, 0));
        h.runner.start().await;
        h.runner.begin_step(Action::Down).unwrap();
        assert!(matches!(h.runner.next().await, Transition::Load(_)));

        let kinds: Vec<RecordKind> = h.sink.records().iter().map(|r| r.record.kind()).collect();
        assert_eq!(kinds, vec![RecordKind::Baseline, RecordKind::Step, RecordKind::Baseline]);
    }

    #[tokio::test]
    async fn seen_history_lists_shown_models_with_session() {
        let mut h = harness(steps_config(1), catalog(5, 0));
        let Transition::Load(first) = h.runner.start().await else {
            panic!("expected a load");
        };
        h.runner.step(Action::Up).await;
        let Transition::Load(second) = h.runner.next().await else {
            panic!("expected a load");
        };
        let history = h.runner.seen_history().unwrap();
        let models: Vec<&str> = history.iter().map(|e| e.model.as_str()).collect();
        assert_eq!(models, vec![first.as_str(), second.as_str()]);
        assert!(history.iter().all(|e| e.session_id == h.runner.session_id()));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_auto_advances() {
        let config = RunnerConfig {
            trial: TrialConfig {
                budget: BudgetPolicy::Countdown { seconds: 3 },
                ..TrialConfig::default()
            },
            seed: Some(3),
            ..RunnerConfig::default()
        };
        let mut h = harness(config, catalog(5, 0));
        let mut timer = h.runner.take_timer_events().expect("timer channel");
        assert!(h.runner.take_timer_events().is_none());

        h.runner.start().await;
        let mut ticks = 0;
        while h.scene.loads().len() < 2 {
            let event = timer.recv().await.expect("timer running");
            h.runner.on_timer(event).await;
            ticks += 1;
        }
        assert_eq!(ticks, 3);
        assert_eq!(h.runner.status().budget_remaining, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_tick_after_manual_advance_is_ignored() {
        let config = RunnerConfig {
            trial: TrialConfig {
                diagnostic_mode: true,
                ..TrialConfig::default()
            },
            seed: Some(3),
            ..RunnerConfig::default()
        };
        let mut h = harness(config, catalog(5, 0));
        h.runner.start().await;
        let old = h.runner.controller().generation();
        assert!(matches!(h.runner.next().await, Transition::Load(_)));
        assert_eq!(
            h.runner.on_timer(TimerEvent::Tick { generation: old }).await,
            Transition::Ignored
        );
        assert_eq!(h.runner.status().budget_remaining, 10);
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_run() {
        let mut h = harness(steps_config(1), catalog(20, 0));
        let Transition::Load(first) = h.runner.start().await else {
            panic!("expected a load");
        };
        h.runner.reset().unwrap();
        let status = h.runner.status();
        assert_eq!(status.state, TrialState::Idle);
        assert_eq!(status.phase, RunnerPhase::Viewing);
        assert_eq!(status.interaction_count, 0);
        assert!(status.model.is_none());

        let Transition::Load(second) = h.runner.start().await else {
            panic!("expected a load");
        };
        assert_ne!(first, second);
        assert!(!h.runner.controller().session().sequence().contains(&first));
    }

    #[tokio::test]
    async fn trial_start_is_published() {
        let mut h = harness(steps_config(1), catalog(3, 0));
        h.runner.start().await;
        let event = h.phases.try_recv().expect("trial event");
        assert_eq!(event.source, RUNNER_SOURCE);
        assert!(matches!(event.payload, EventPayload::TrialStarted { index: 1, .. }));
    }
}
