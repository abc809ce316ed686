//! [`Session`] – the state of one experiment run.
//!
//! A session owns the viewing order, the cursor into it, the number of
//! models loaded so far, the per-run list of models actually shown and the
//! cumulative seen history.  Read access is public; every mutation goes
//! through the trial controller.

use std::collections::HashSet;

use rand::Rng;
use turntable_memory::{SeenStore, SeenStoreError};
use turntable_types::TurntableError;

/// Exclusive upper bound of the random suffix in generated ids.
const ID_SUFFIX_RANGE: u32 = 1_000_000;

/// Build an id of the form `<unix-millis>-<random 0..1e6>`.
///
/// Used for session ids and for the group id shared by the two snapshots
/// of a step.
pub fn timestamped_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{millis}-{}", rng.gen_range(0..ID_SUFFIX_RANGE))
}

pub(crate) fn storage_error(e: SeenStoreError) -> TurntableError {
    TurntableError::Storage(e.to_string())
}

/// One run: sequence, cursor, counters and seen history.
pub struct Session {
    id: String,
    sequence: Vec<String>,
    current_index: usize,
    interaction_count: usize,
    shown: Vec<String>,
    seen: SeenStore,
}

impl Session {
    pub fn new(id: impl Into<String>, seen: SeenStore) -> Self {
        Self {
            id: id.into(),
            sequence: Vec::new(),
            current_index: 0,
            interaction_count: 0,
            shown: Vec::new(),
            seen,
        }
    }

    /// Session with a freshly generated id.
    pub fn generate<R: Rng + ?Sized>(seen: SeenStore, rng: &mut R) -> Self {
        Self::new(timestamped_id(rng), seen)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> &[String] {
        &self.sequence
    }

    /// Index of the next model to load.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Models loaded in this run.
    pub fn interaction_count(&self) -> usize {
        self.interaction_count
    }

    /// Models shown in this run, in display order.
    pub fn shown(&self) -> &[String] {
        &self.shown
    }

    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }

    /// Cumulative seen history as a set.
    pub fn seen_set(&self) -> Result<HashSet<String>, TurntableError> {
        self.seen.model_set().map_err(storage_error)
    }

    /// `true` while the cursor has not passed the end of the sequence.
    pub fn has_next(&self) -> bool {
        self.current_index < self.sequence.len()
    }

    // ── Mutators (trial controller only) ─────────────────────────────────────

    pub(crate) fn set_sequence(&mut self, sequence: Vec<String>) {
        self.sequence = sequence;
        self.current_index = 0;
    }

    /// Hand out the model under the cursor and move the cursor on.
    pub(crate) fn take_next(&mut self) -> Option<String> {
        let model = self.sequence.get(self.current_index)?.clone();
        self.current_index += 1;
        Some(model)
    }

    /// Count a completed load and add the model to the shown list and the
    /// seen history.
    pub(crate) fn record_shown(&mut self, model: &str) -> Result<(), TurntableError> {
        self.interaction_count += 1;
        self.shown.push(model.to_string());
        self.seen.mark_seen(model, &self.id).map(|_| ()).map_err(storage_error)
    }

    pub(crate) fn clear_run(&mut self) {
        self.interaction_count = 0;
        self.shown.clear();
    }
}
