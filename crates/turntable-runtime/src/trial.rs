//! [`TrialController`] – the session progression state machine.
//!
//! ```text
//!            start / advance
//!   Idle ───────────────────────► Loading ──── loaded ───► Viewing
//!    ▲                               │ ▲                      │
//!    │ reset                 failure │ │ (stall)              │ budget spent,
//!    │                               ▼ │                      │ "next" or tick 0
//!    │                            Loading                     ▼
//!    └──────────────────────────────────────────────────── Advancing
//!                                                           │    │
//!                                         ceiling reached ◄─┘    └─► sequence ran out
//!                                          PhaseComplete           SequenceExhausted
//! ```
//!
//! The controller is pure bookkeeping: it never awaits.  It hands out
//! [`Transition`]s and the runner performs the loads and notifications they
//! call for, then reports back through [`TrialController::on_loaded`] or
//! [`TrialController::on_load_failed`].
//!
//! # Budget
//!
//! Each trial gets a fresh budget from the configured [`BudgetPolicy`]:
//!
//! | Policy | Decremented by | At zero |
//! |---|---|---|
//! | `Countdown { seconds }` | each one-second tick | auto-advance |
//! | `Steps { steps }` | each recorded step | "load next" unlocks |
//!
//! # Generations
//!
//! Every trial start and every manual advance bumps the generation.  Timer
//! ticks carry the generation they were started for, so a tick that arrives
//! after the trial it belonged to has ended is ignored.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use turntable_types::{Angles, TurntableError};

use crate::catalog::ModelCatalog;
use crate::sequence::SequenceGenerator;
use crate::session::Session;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Per-trial interaction budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Wall-clock countdown; the trial auto-advances when it reaches zero.
    Countdown { seconds: u32 },
    /// Number of recorded steps; no auto-advance.
    Steps { steps: u32 },
}

impl BudgetPolicy {
    /// Budget a new trial starts with.
    pub fn initial(&self) -> u32 {
        match *self {
            BudgetPolicy::Countdown { seconds } => seconds,
            BudgetPolicy::Steps { steps } => steps,
        }
    }

    pub fn is_countdown(&self) -> bool {
        matches!(self, BudgetPolicy::Countdown { .. })
    }
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        BudgetPolicy::Countdown { seconds: 10 }
    }
}

/// Configuration bundle for [`TrialController`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrialConfig {
    /// Target length of each generated sequence.
    pub sequence_length: usize,
    /// Number of model loads after which the viewing phase is complete.
    pub max_models: usize,
    pub budget: BudgetPolicy,
    /// Unlocks "load next" at any time, including out of a stalled load.
    pub diagnostic_mode: bool,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            sequence_length: 10,
            max_models: 10,
            budget: BudgetPolicy::default(),
            diagnostic_mode: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    Idle,
    Loading,
    Viewing,
    Advancing,
    PhaseComplete,
    SequenceExhausted,
}

/// What the runner must do after a controller call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Load this model, then report back with `on_loaded` / `on_load_failed`.
    Load(String),
    /// The interaction ceiling was reached; hand off to recall.
    PhaseComplete,
    /// The sequence ran out before the ceiling.
    Exhausted,
    /// Accepted, no state change (e.g. a countdown tick above zero).
    Stay,
    /// Not applicable in the current state, or stale.
    Ignored,
}

/// One model-viewing instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub model: String,
    /// Orientation read right after load, before any step.
    pub baseline: Option<Angles>,
    /// Steps recorded during this trial.
    pub actions: u32,
    pub budget_remaining: u32,
    pub generation: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// TrialController
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the [`Session`] and is the only place its counters change.
pub struct TrialController {
    config: TrialConfig,
    catalog: Arc<ModelCatalog>,
    generator: SequenceGenerator,
    session: Session,
    state: TrialState,
    /// Model requested by the last `Load` transition.
    pending: Option<String>,
    trial: Option<Trial>,
    generation: u64,
}

impl TrialController {
    /// Build the controller and generate the first sequence.
    ///
    /// # Errors
    ///
    /// [`TurntableError::Storage`] if the seen history cannot be read.
    pub fn new<R: Rng + ?Sized>(
        config: TrialConfig,
        catalog: Arc<ModelCatalog>,
        session: Session,
        rng: &mut R,
    ) -> Result<Self, TurntableError> {
        let generator = SequenceGenerator::new(config.sequence_length);
        let mut controller = Self {
            config,
            catalog,
            generator,
            session,
            state: TrialState::Idle,
            pending: None,
            trial: None,
            generation: 0,
        };
        controller.regenerate(rng)?;
        Ok(controller)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    /// The trial being viewed, if any.
    pub fn trial(&self) -> Option<&Trial> {
        self.trial.as_ref()
    }

    /// Model of the last `Load` transition that has not resolved yet.
    pub fn pending_model(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn budget_remaining(&self) -> u32 {
        self.trial.as_ref().map_or(0, |t| t.budget_remaining)
    }

    /// `true` when a step may be recorded right now.
    pub fn can_record(&self) -> bool {
        self.state == TrialState::Viewing && self.budget_remaining() > 0
    }

    /// `true` when a manual "load next" would be accepted.
    pub fn can_load_next(&self) -> bool {
        match self.state {
            TrialState::Viewing => self.config.diagnostic_mode || self.budget_remaining() == 0,
            TrialState::Loading => self.config.diagnostic_mode,
            _ => false,
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// `Idle -> Loading | PhaseComplete | SequenceExhausted`.
    pub fn start(&mut self) -> Transition {
        if self.state != TrialState::Idle {
            debug!(state = ?self.state, "start ignored");
            return Transition::Ignored;
        }
        info!(
            session_id = self.session.id(),
            sequence_len = self.session.sequence().len(),
            "session started"
        );
        self.advance()
    }

    /// Manual "load next".
    pub fn request_next(&mut self) -> Transition {
        if !self.can_load_next() {
            debug!(state = ?self.state, budget = self.budget_remaining(), "load next ignored");
            return Transition::Ignored;
        }
        if self.state == TrialState::Loading {
            warn!(model = ?self.pending, "abandoning stalled load");
        }
        self.generation += 1;
        self.state = TrialState::Advancing;
        self.advance()
    }

    /// One countdown second for the trial of `generation`.
    pub fn tick(&mut self, generation: u64) -> Transition {
        if generation != self.generation
            || self.state != TrialState::Viewing
            || !self.config.budget.is_countdown()
        {
            debug!(generation, current = self.generation, "stale tick ignored");
            return Transition::Ignored;
        }
        let Some(trial) = self.trial.as_mut() else {
            return Transition::Ignored;
        };
        trial.budget_remaining = trial.budget_remaining.saturating_sub(1);
        if trial.budget_remaining > 0 {
            return Transition::Stay;
        }
        info!(model = %trial.model, "countdown expired; advancing");
        self.generation += 1;
        self.state = TrialState::Advancing;
        self.advance()
    }

    /// Count a recorded step against the current trial.
    pub fn consume_step(&mut self) {
        let policy = self.config.budget;
        if let Some(trial) = self.trial.as_mut() {
            trial.actions += 1;
            if let BudgetPolicy::Steps { .. } = policy {
                trial.budget_remaining = trial.budget_remaining.saturating_sub(1);
            }
        }
    }

    /// `Loading -> Viewing`.  Returns the new trial's generation, or `None`
    /// if `model` is not the load the controller is waiting for.
    pub fn on_loaded(&mut self, model: &str) -> Option<u64> {
        if self.state != TrialState::Loading || self.pending.as_deref() != Some(model) {
            warn!(model, state = ?self.state, "unexpected load completion ignored");
            return None;
        }
        self.pending = None;
        if let Err(e) = self.session.record_shown(model) {
            warn!(model, error = %e, "failed to persist seen model");
        }
        self.generation += 1;
        self.trial = Some(Trial {
            model: model.to_string(),
            baseline: None,
            actions: 0,
            budget_remaining: self.config.budget.initial(),
            generation: self.generation,
        });
        self.state = TrialState::Viewing;
        info!(
            model,
            interaction = self.session.interaction_count(),
            max = self.config.max_models,
            generation = self.generation,
            "trial started"
        );
        Some(self.generation)
    }

    /// Store the orientation captured right after load.
    pub fn set_baseline(&mut self, angles: Angles) {
        if let Some(trial) = self.trial.as_mut() {
            trial.baseline = Some(angles);
        }
    }

    /// A load failed: stay in `Loading` without retrying.
    pub fn on_load_failed(&mut self, model: &str, error: &TurntableError) {
        warn!(model, error = %error, "model load failed; trial stalled");
        self.trial = None;
    }

    /// Fresh sequence, zeroed run counters, no trial, back to `Idle`.
    ///
    /// # Errors
    ///
    /// [`TurntableError::Storage`] if the seen history cannot be read.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), TurntableError> {
        self.session.clear_run();
        self.trial = None;
        self.pending = None;
        self.generation += 1;
        self.state = TrialState::Idle;
        self.regenerate(rng)?;
        info!(session_id = self.session.id(), "session reset");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    fn regenerate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), TurntableError> {
        let seen = self.session.seen_set()?;
        let sequence = self.generator.generate(&self.catalog, &seen, rng);
        if sequence.len() < self.generator.target_len() {
            warn!(
                requested = self.generator.target_len(),
                available = sequence.len(),
                "fewer unseen models than requested"
            );
        }
        self.session.set_sequence(sequence);
        Ok(())
    }

    fn advance(&mut self) -> Transition {
        self.trial = None;
        self.pending = None;
        if self.session.interaction_count() >= self.config.max_models {
            info!(count = self.session.interaction_count(), "interaction ceiling reached");
            self.state = TrialState::PhaseComplete;
            return Transition::PhaseComplete;
        }
        match self.session.take_next() {
            Some(model) => {
                debug!(model = %model, index = self.session.current_index() - 1, "loading next model");
                self.pending = Some(model.clone());
                self.state = TrialState::Loading;
                Transition::Load(model)
            }
            None => {
                info!(
                    shown = self.session.interaction_count(),
                    "sequence exhausted before the ceiling"
                );
                self.state = TrialState::SequenceExhausted;
                Transition::Exhausted
            }
        }
    }
}
