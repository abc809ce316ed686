//! [`ActionRecorder`] – before/after capture of one directional step.
//!
//! A step is recorded as:
//!
//! 1. read the model's orientation and capture the "before" snapshot;
//! 2. rotate the model by `step_degrees` about the camera axis for the
//!    action;
//! 3. wait `settle_delay` so the renderer shows the new pose;
//! 4. read the orientation again and capture the "after" snapshot;
//! 5. submit one [`StepRecord`] with the after angles and the wrapped delta.
//!
//! At most one step per session is in flight.  The guard is a single-permit
//! semaphore taken with `try_acquire` in [`ActionRecorder::reserve`], before
//! anything awaits: a step requested while another is still settling or
//! submitting is dropped, not queued.  The returned [`StepPermit`] owns the
//! permit, so [`ActionRecorder::capture`] can run on a spawned task while
//! the caller keeps taking input.  Baseline records wait for the same
//! permit instead of being dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};
use turntable_middleware::LogSink;
use turntable_orientation::{CameraAxes, Orientation, OrientationDelta, Quaternion, Vec3};
use turntable_types::{Action, BaselineRecord, LogRecord, StepRecord, TurntableError};

use crate::collaborators::{ModelHandle, SnapshotSource};
use crate::session::timestamped_id;

/// The model currently on screen, as seen by the recorder.
#[derive(Clone)]
pub struct ActiveModel {
    pub session_id: String,
    pub name: String,
    pub handle: Arc<dyn ModelHandle>,
}

/// Why a step request produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Another step is still being recorded.
    InFlight,
    /// The trial's budget is spent.
    BudgetExhausted,
    /// No model is on screen.
    NoActiveTrial,
}

/// Result of [`ActionRecorder::record_step`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Recorded {
        record: StepRecord,
        delta: OrientationDelta,
        /// Outcome of the single submission attempt.
        submission: Result<(), TurntableError>,
    },
    Dropped(DropReason),
}

/// A reserved step slot: the in-flight permit plus the model it applies to.
/// Dropping it releases the slot without recording anything.
pub struct StepPermit {
    active: ActiveModel,
    _permit: OwnedSemaphorePermit,
}

impl StepPermit {
    pub fn model(&self) -> &str {
        &self.active.name
    }
}

impl StepOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, StepOutcome::Recorded { .. })
    }
}

/// Tuning for [`ActionRecorder`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecorderConfig {
    pub step_degrees: f32,
    pub settle_delay: Duration,
    pub axes: CameraAxes,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            step_degrees: 5.0,
            settle_delay: Duration::from_millis(50),
            axes: CameraAxes::default_view(),
        }
    }
}

/// Records steps and baselines for one session.
pub struct ActionRecorder {
    config: RecorderConfig,
    sink: Arc<dyn LogSink>,
    snapshots: Arc<dyn SnapshotSource>,
    permit: Arc<Semaphore>,
}

impl ActionRecorder {
    pub fn new(config: RecorderConfig, sink: Arc<dyn LogSink>, snapshots: Arc<dyn SnapshotSource>) -> Self {
        Self {
            config,
            sink,
            snapshots,
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    /// `true` while a step or baseline holds the permit.
    pub fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }

    /// World-axis rotation for `action`: up/down turn about the camera's
    /// right axis, left/right about its up axis.
    pub fn rotation_for(&self, action: Action) -> (Vec3, f32) {
        let step = self.config.step_degrees;
        let axes = self.config.axes;
        match action {
            Action::Up => (axes.right, -step),
            Action::Down => (axes.right, step),
            Action::Left => (axes.up, -step),
            Action::Right => (axes.up, step),
        }
    }

    /// Claim the step slot for `active` without waiting.
    ///
    /// Fails without side effects when there is no active model, the budget
    /// is zero, or another step is in flight.
    pub fn reserve(&self, active: Option<&ActiveModel>, budget_remaining: u32) -> Result<StepPermit, DropReason> {
        let Some(active) = active else {
            return Err(DropReason::NoActiveTrial);
        };
        if budget_remaining == 0 {
            return Err(DropReason::BudgetExhausted);
        }
        let Ok(permit) = self.permit.clone().try_acquire_owned() else {
            debug!(model = %active.name, "step dropped; previous step in flight");
            return Err(DropReason::InFlight);
        };
        Ok(StepPermit {
            active: active.clone(),
            _permit: permit,
        })
    }

    /// Rotate, capture and submit one step under a reserved slot.  The slot
    /// is released when this returns.
    #[instrument(skip_all, fields(model = %slot.active.name, %action))]
    pub async fn capture(&self, slot: StepPermit, action: Action) -> StepOutcome {
        let active = &slot.active;
        let group = timestamped_id(&mut rand::thread_rng());
        let before = Orientation::from_quaternion(active.handle.rotation());
        let before_shot = self.snapshots.capture();

        let (axis, degrees) = self.rotation_for(action);
        let rotated: Quaternion = active.handle.rotation().rotate_on_world_axis(axis, degrees);
        active.handle.set_rotation(rotated);

        tokio::time::sleep(self.config.settle_delay).await;

        let after = Orientation::from_quaternion(active.handle.rotation());
        let after_shot = self.snapshots.capture();
        let delta = before.delta_to(&after);

        let record = StepRecord {
            model_name: active.name.clone(),
            action_id: action.id(),
            s_t_img: format!("{group}_before.png"),
            s_t1_img: format!("{group}_after.png"),
            img_data1: before_shot.data_url,
            img_data2: after_shot.data_url,
            session_id: active.session_id.clone(),
            after_angles: after.angles(),
            delta_angles: delta.angles(),
        };
        debug!(yaw = delta.yaw, pitch = delta.pitch, "step captured");

        let submission = self.sink.submit(&LogRecord::Step(record.clone())).await;
        if let Err(e) = &submission {
            warn!(error = %e, "step record not delivered");
        }
        StepOutcome::Recorded {
            record,
            delta,
            submission,
        }
    }

    /// Reserve and capture in one call.
    pub async fn record_step(
        &self,
        active: Option<&ActiveModel>,
        action: Action,
        budget_remaining: u32,
    ) -> StepOutcome {
        match self.reserve(active, budget_remaining) {
            Ok(slot) => self.capture(slot, action).await,
            Err(reason) => StepOutcome::Dropped(reason),
        }
    }

    /// Submit the baseline (action id -1) for a freshly loaded model.
    ///
    /// Waits for any in-flight step to finish first.
    pub async fn record_baseline(&self, active: &ActiveModel) -> Result<BaselineRecord, TurntableError> {
        let _permit = self
            .permit
            .acquire()
            .await
            .map_err(|e| TurntableError::SubmissionFailure(e.to_string()))?;

        let initial = Orientation::from_quaternion(active.handle.rotation()).angles();
        let record = BaselineRecord::new(active.session_id.clone(), active.name.clone(), initial);
        match self.sink.submit(&LogRecord::Baseline(record.clone())).await {
            Ok(()) => {
                debug!(model = %active.name, yaw = initial.yaw, pitch = initial.pitch, "baseline submitted");
                Ok(record)
            }
            Err(e) => {
                warn!(model = %active.name, error = %e, "baseline record not delivered");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimModel, SimScene};
    use turntable_middleware::MemorySink;
    use turntable_orientation::wrap180;
    use turntable_types::RecordKind;

    fn active(name: &str) -> ActiveModel {
        ActiveModel {
            session_id: "1700000000000-5".to_string(),
            name: name.to_string(),
            handle: Arc::new(SimModel::new(name)),
        }
    }

    fn recorder(sink: Arc<MemorySink>) -> ActionRecorder {
        ActionRecorder::new(RecorderConfig::default(), sink, Arc::new(SimScene::new()))
    }

    #[tokio::test]
    async fn step_rotates_and_submits_one_record() {
        let sink = Arc::new(MemorySink::new());
        let rec = recorder(sink.clone());
        let model = active("a.glb");

        let outcome = rec.record_step(Some(&model), Action::Right, 10).await;
        let StepOutcome::Recorded { record, delta, submission } = outcome else {
            panic!("step should be recorded");
        };
        assert!(submission.is_ok());
        assert_eq!(record.action_id, 3);
        assert!((delta.yaw - 5.0).abs() < 1e-3, "delta {delta:?}");
        assert!(delta.pitch.abs() < 1e-3);
        assert!(record.s_t_img.ends_with("_before.png"));
        assert_eq!(
            record.s_t_img.trim_end_matches("_before.png"),
            record.s_t1_img.trim_end_matches("_after.png")
        );
        assert_ne!(record.img_data1, record.img_data2);
        assert_eq!(sink.records().len(), 1);
        assert!(!rec.is_busy());
    }

    #[tokio::test]
    async fn up_tilts_by_negative_pitch() {
        let sink = Arc::new(MemorySink::new());
        let rec = recorder(sink);
        let model = active("a.glb");
        let StepOutcome::Recorded { delta, .. } = rec.record_step(Some(&model), Action::Up, 1).await else {
            panic!("step should be recorded");
        };
        assert!((delta.pitch + 5.0).abs() < 1e-3, "delta {delta:?}");
    }

    #[tokio::test]
    async fn delta_matches_after_minus_before() {
        let sink = Arc::new(MemorySink::new());
        let rec = recorder(sink);
        let model = active("a.glb");
        model
            .handle
            .set_rotation(Quaternion::from_yaw_pitch_roll(2.0, 0.0, 0.0));
        let before = Orientation::from_quaternion(model.handle.rotation());
        let StepOutcome::Recorded { record, delta, .. } =
            rec.record_step(Some(&model), Action::Left, 1).await
        else {
            panic!("step should be recorded");
        };
        let expected = wrap180(record.after_angles.yaw - before.yaw);
        assert!((delta.yaw - expected).abs() < 1e-3);
        // 2° - 5° crosses the seam: after yaw is near 357.
        assert!((record.after_angles.yaw - 357.0).abs() < 1e-2, "{:?}", record.after_angles);
    }

    #[tokio::test]
    async fn back_to_back_steps_submit_exactly_once() {
        let sink = Arc::new(MemorySink::new().with_latency(Duration::from_millis(20)));
        let rec = recorder(sink.clone());
        let model = active("a.glb");

        let (first, second) = tokio::join!(
            rec.record_step(Some(&model), Action::Up, 10),
            rec.record_step(Some(&model), Action::Down, 10),
        );
        assert!(first.is_recorded());
        assert_eq!(second, StepOutcome::Dropped(DropReason::InFlight));
        assert_eq!(sink.attempts(), 1);

        // The permit is released afterwards.
        assert!(rec.record_step(Some(&model), Action::Down, 10).await.is_recorded());
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn reserved_slot_blocks_until_dropped() {
        let sink = Arc::new(MemorySink::new());
        let rec = recorder(sink.clone());
        let model = active("a.glb");

        let slot = rec.reserve(Some(&model), 10).ok().expect("free slot");
        assert_eq!(slot.model(), "a.glb");
        assert!(rec.is_busy());
        assert!(matches!(rec.reserve(Some(&model), 10), Err(DropReason::InFlight)));

        drop(slot);
        assert!(!rec.is_busy());
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn spawned_capture_holds_the_slot_until_submitted() {
        let sink = Arc::new(MemorySink::new().with_latency(Duration::from_millis(20)));
        let rec = Arc::new(recorder(sink.clone()));
        let model = active("a.glb");

        let slot = rec.reserve(Some(&model), 10).ok().expect("free slot");
        let task = tokio::spawn({
            let rec = Arc::clone(&rec);
            async move { rec.capture(slot, Action::Left).await }
        });
        assert!(matches!(rec.reserve(Some(&model), 10), Err(DropReason::InFlight)));

        assert!(task.await.unwrap().is_recorded());
        assert!(!rec.is_busy());
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test]
    async fn preconditions_drop_silently() {
        let sink = Arc::new(MemorySink::new());
        let rec = recorder(sink.clone());
        let model = active("a.glb");
        let start = model.handle.rotation();

        assert_eq!(
            rec.record_step(None, Action::Up, 10).await,
            StepOutcome::Dropped(DropReason::NoActiveTrial)
        );
        assert_eq!(
            rec.record_step(Some(&model), Action::Up, 0).await,
            StepOutcome::Dropped(DropReason::BudgetExhausted)
        );
        assert_eq!(model.handle.rotation(), start);
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn submission_failure_is_reported_and_releases_the_guard() {
        let sink = Arc::new(MemorySink::new());
        sink.set_failing(true);
        let rec = recorder(sink.clone());
        let model = active("a.glb");

        let StepOutcome::Recorded { submission, .. } = rec.record_step(Some(&model), Action::Up, 3).await else {
            panic!("step should be recorded");
        };
        assert!(matches!(submission, Err(TurntableError::SubmissionFailure(_))));
        assert!(!rec.is_busy());

        sink.set_failing(false);
        assert!(rec.record_step(Some(&model), Action::Up, 3).await.is_recorded());
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn baseline_waits_for_in_flight_step() {
        let sink = Arc::new(MemorySink::new());
        let rec = recorder(sink.clone());
        let model = active("a.glb");

        let (step, baseline) = tokio::join!(
            rec.record_step(Some(&model), Action::Up, 10),
            rec.record_baseline(&model),
        );
        assert!(step.is_recorded());
        assert!(baseline.is_ok());
        let kinds: Vec<RecordKind> = sink.records().iter().map(|r| r.record.kind()).collect();
        assert_eq!(kinds, vec![RecordKind::Step, RecordKind::Baseline]);
    }

    #[tokio::test]
    async fn baseline_carries_initial_angles() {
        let sink = Arc::new(MemorySink::new());
        let rec = recorder(sink.clone());
        let model = active("a.glb");
        model
            .handle
            .set_rotation(Quaternion::from_yaw_pitch_roll(30.0, 0.0, 0.0));
        let record = rec.record_baseline(&model).await.unwrap();
        assert_eq!(record.action_id, -1);
        assert!((record.initial_angles.yaw - 30.0).abs() < 1e-2);
        assert_eq!(sink.records()[0].record.kind(), RecordKind::Baseline);
    }
}
