//! [`RecallEngine`] – the forced-choice recognition test.
//!
//! After the viewing phase the participant sees a shuffled mix of models
//! they were shown in this session and distractors they were not, and
//! answers "seen" or "not seen" for each.  Distractors are drawn from the
//! foils first, then from regular models never shown in any run.
//!
//! The test runs for a configured number of rounds.  Each scored round is
//! submitted as one [`MemoryTestBatch`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! # async fn demo(
//! #     engine: &mut turntable_runtime::recall::RecallEngine,
//! #     test: &turntable_runtime::recall::RecallTest,
//! # ) {
//! let responses: HashMap<String, bool> = test
//!     .items
//!     .iter()
//!     .map(|item| (item.model_name.clone(), item.actually_seen))
//!     .collect();
//! let batch = engine.score_submission(&responses).await.unwrap();
//! assert!(batch.results.iter().all(|r| r.correct));
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use turntable_middleware::LogSink;
use turntable_types::{LogRecord, MemoryTestBatch, MemoryTestResult};

use crate::catalog::ModelCatalog;
use crate::sequence::fisher_yates;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// How later rounds pick their items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPolicy {
    /// Every round draws a new sample of seen items and distractors.
    #[default]
    FreshSample,
    /// Later rounds repeat the first round's seen items and draw distractors
    /// that have not been used before.
    ReuseWithNewDistractors,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    pub seen_per_round: usize,
    pub unseen_per_round: usize,
    pub rounds: u32,
    pub round_policy: RoundPolicy,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            seen_per_round: 4,
            unseen_per_round: 4,
            rounds: 2,
            round_policy: RoundPolicy::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test items
// ─────────────────────────────────────────────────────────────────────────────

/// One card of the recognition screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallItem {
    pub model_name: String,
    /// Image shown in place of the 3-D model.
    pub image: String,
    /// Ground truth: shown during this session.
    pub actually_seen: bool,
}

/// One round of the recognition test, in presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallTest {
    /// 1-based round number.
    pub round: u32,
    pub items: Vec<RecallItem>,
}

// ─────────────────────────────────────────────────────────────────────────────
// RecallEngine
// ─────────────────────────────────────────────────────────────────────────────

pub struct RecallEngine {
    config: RecallConfig,
    sink: Arc<dyn LogSink>,
    completed: u32,
    current: Option<RecallTest>,
    /// Seen items of the first round, for `ReuseWithNewDistractors`.
    reused_seen: Vec<String>,
    used_distractors: HashSet<String>,
}

impl RecallEngine {
    pub fn new(config: RecallConfig, sink: Arc<dyn LogSink>) -> Self {
        Self {
            config,
            sink,
            completed: 0,
            current: None,
            reused_seen: Vec::new(),
            used_distractors: HashSet::new(),
        }
    }

    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    /// Rounds scored so far.
    pub fn rounds_completed(&self) -> u32 {
        self.completed
    }

    /// The round awaiting answers, if any.
    pub fn current(&self) -> Option<&RecallTest> {
        self.current.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.completed >= self.config.rounds
    }

    /// Build the next round.
    ///
    /// `shown` is this session's shown list and `seen_history` the cumulative
    /// seen set.  Returns the pending round unchanged if it has not been
    /// scored yet, and `None` once every round is done.
    pub fn build_test<R: Rng + ?Sized>(
        &mut self,
        shown: &[String],
        seen_history: &HashSet<String>,
        catalog: &ModelCatalog,
        rng: &mut R,
    ) -> Option<RecallTest> {
        if self.is_finished() {
            return None;
        }
        if let Some(pending) = &self.current {
            return Some(pending.clone());
        }
        let round = self.completed + 1;
        let reuse = self.config.round_policy == RoundPolicy::ReuseWithNewDistractors;

        let seen_items = if reuse && !self.reused_seen.is_empty() {
            self.reused_seen.clone()
        } else {
            let mut pool: Vec<String> = Vec::with_capacity(shown.len());
            for model in shown {
                if !pool.contains(model) {
                    pool.push(model.clone());
                }
            }
            fisher_yates(&mut pool, rng);
            pool.truncate(self.config.seen_per_round);
            if reuse {
                self.reused_seen = pool.clone();
            }
            pool
        };

        let shown_set: HashSet<&str> = shown.iter().map(String::as_str).collect();
        let excluded = |m: &str| shown_set.contains(m) || (reuse && self.used_distractors.contains(m));

        let mut foils: Vec<String> = catalog
            .foils()
            .into_iter()
            .filter(|m| !excluded(*m))
            .map(str::to_string)
            .collect();
        let mut fresh: Vec<String> = catalog
            .regular()
            .into_iter()
            .filter(|m| !seen_history.contains(*m) && !excluded(*m))
            .map(str::to_string)
            .collect();
        fisher_yates(&mut foils, rng);
        fisher_yates(&mut fresh, rng);
        let distractors: Vec<String> = foils
            .into_iter()
            .chain(fresh)
            .take(self.config.unseen_per_round)
            .collect();

        if seen_items.len() < self.config.seen_per_round
            || distractors.len() < self.config.unseen_per_round
        {
            warn!(
                round,
                seen = seen_items.len(),
                unseen = distractors.len(),
                "recall round is short of items"
            );
        }
        self.used_distractors.extend(distractors.iter().cloned());

        let mut items: Vec<RecallItem> = seen_items
            .into_iter()
            .map(|m| (m, true))
            .chain(distractors.into_iter().map(|m| (m, false)))
            .map(|(model_name, actually_seen)| RecallItem {
                image: catalog.image_for(&model_name),
                model_name,
                actually_seen,
            })
            .collect();
        fisher_yates(&mut items, rng);

        info!(round, items = items.len(), "recall round built");
        let test = RecallTest { round, items };
        self.current = Some(test.clone());
        Some(test)
    }

    /// Score the pending round and submit it as one batch.
    ///
    /// A model missing from `responses` counts as answered "not seen".
    /// Submission failures are logged and do not hold the round back.
    /// Returns `None` if no round is pending.
    #[instrument(skip_all, fields(round = self.completed + 1, answered = responses.len()))]
    pub async fn score_submission(&mut self, responses: &HashMap<String, bool>) -> Option<MemoryTestBatch> {
        let test = self.current.take()?;
        let timestamp = Utc::now();
        let results: Vec<MemoryTestResult> = test
            .items
            .iter()
            .map(|item| {
                let guessed = responses.get(&item.model_name).copied().unwrap_or(false);
                MemoryTestResult {
                    model_name: item.model_name.clone(),
                    guessed,
                    actually_seen: item.actually_seen,
                    correct: guessed == item.actually_seen,
                    memory_test_round: test.round,
                    timestamp,
                }
            })
            .collect();
        let correct = results.iter().filter(|r| r.correct).count();
        let batch = MemoryTestBatch { results };

        if let Err(e) = self.sink.submit(&LogRecord::MemoryTest(batch.clone())).await {
            warn!(round = test.round, error = %e, "memory-test batch not delivered");
        }
        self.completed += 1;
        info!(
            round = test.round,
            correct,
            total = batch.results.len(),
            finished = self.is_finished(),
            "recall round scored"
        );
        Some(batch)
    }

    /// Forget all rounds.
    pub fn reset(&mut self) {
        self.completed = 0;
        self.current = None;
        self.reused_seen.clear();
        self.used_distractors.clear();
    }
}
