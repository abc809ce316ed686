use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Data-URL prefix of an empty PNG; used for records that carry no snapshot.
pub const EMPTY_PNG_DATA_URL: &str = "data:image/png;base64,";

/// Action id written by the one-off baseline row of every trial.
pub const BASELINE_ACTION_ID: i8 = -1;

/// Directional control the participant can press while viewing a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Action {
    /// Tilt the model towards the viewer's top edge.
    Up,
    /// Tilt the model towards the viewer's bottom edge.
    Down,
    /// Turn the model to the viewer's left.
    Left,
    /// Turn the model to the viewer's right.
    Right,
}

impl Action {
    /// All actions in wire-id order.
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// Wire identifier (`0..=3`).
    pub fn id(self) -> i8 {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
        }
    }
}

impl From<Action> for i8 {
    fn from(action: Action) -> Self {
        action.id()
    }
}

impl TryFrom<i8> for Action {
    type Error = TurntableError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Action::Up),
            1 => Ok(Action::Down),
            2 => Ok(Action::Left),
            3 => Ok(Action::Right),
            other => Err(TurntableError::InvalidAction(other)),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Up => write!(f, "up"),
            Action::Down => write!(f, "down"),
            Action::Left => write!(f, "left"),
            Action::Right => write!(f, "right"),
        }
    }
}

/// Yaw/pitch pair in degrees as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Angles {
    pub yaw: f32,
    pub pitch: f32,
}

/// One rotation event: the model before and after a single directional step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub model_name: String,
    pub action_id: i8,
    /// File name of the "before" snapshot (`<group>_before.png`).
    #[serde(rename = "s_t_img")]
    pub s_t_img: String,
    /// File name of the "after" snapshot (`<group>_after.png`).
    #[serde(rename = "s_t1_img")]
    pub s_t1_img: String,
    pub img_data1: String,
    pub img_data2: String,
    pub session_id: String,
    pub after_angles: Angles,
    pub delta_angles: Angles,
}

/// Initial orientation of a freshly loaded model, logged before any step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineRecord {
    pub session_id: String,
    pub model_name: String,
    pub action_id: i8,
    pub initial_angles: Angles,
    #[serde(rename = "s_t_img")]
    pub s_t_img: String,
    #[serde(rename = "s_t1_img")]
    pub s_t1_img: String,
    pub img_data1: String,
    pub img_data2: String,
}

impl BaselineRecord {
    /// Build the baseline row for `model_name` with empty snapshot fields.
    pub fn new(session_id: impl Into<String>, model_name: impl Into<String>, initial: Angles) -> Self {
        Self {
            session_id: session_id.into(),
            model_name: model_name.into(),
            action_id: BASELINE_ACTION_ID,
            initial_angles: initial,
            s_t_img: String::new(),
            s_t1_img: String::new(),
            img_data1: EMPTY_PNG_DATA_URL.to_string(),
            img_data2: EMPTY_PNG_DATA_URL.to_string(),
        }
    }
}

/// Scored answer for one item of the recognition test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTestResult {
    pub model_name: String,
    pub guessed: bool,
    pub actually_seen: bool,
    pub correct: bool,
    pub memory_test_round: u32,
    pub timestamp: DateTime<Utc>,
}

/// Batch body submitted once per recall round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTestBatch {
    pub results: Vec<MemoryTestResult>,
}

/// Any body the core submits to the logging endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogRecord {
    Step(StepRecord),
    Baseline(BaselineRecord),
    MemoryTest(MemoryTestBatch),
}

/// Coarse classification of a [`LogRecord`], used in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Step,
    Baseline,
    MemoryTest,
}

impl LogRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            LogRecord::Step(_) => RecordKind::Step,
            LogRecord::Baseline(_) => RecordKind::Baseline,
            LogRecord::MemoryTest(_) => RecordKind::MemoryTest,
        }
    }

    /// Model the record refers to; `None` for memory-test batches.
    pub fn model_name(&self) -> Option<&str> {
        match self {
            LogRecord::Step(r) => Some(&r.model_name),
            LogRecord::Baseline(r) => Some(&r.model_name),
            LogRecord::MemoryTest(_) => None,
        }
    }
}

/// Named phase transitions announced to the embedding page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The viewing sequence finished; show the recognition test.
    Recall,
    /// Recall rounds are done; show the end screen.
    End,
    /// Fewer unseen models were available than the session required.
    OutOfModels,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Recall => write!(f, "recall"),
            Phase::End => write!(f, "end"),
            Phase::OutOfModels => write!(f, "out_of_models"),
        }
    }
}

/// Unified event wrapper for the session event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"turntable-runtime::runner"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the session event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    PhaseChanged {
        session_id: String,
        phase: Phase,
    },
    TrialStarted {
        session_id: String,
        model_name: String,
        index: usize,
    },
    RecordSubmitted {
        kind: RecordKind,
        model_name: Option<String>,
    },
    SubmissionFailed {
        kind: RecordKind,
        details: String,
    },
}

/// Error taxonomy shared by every crate of the workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TurntableError {
    #[error("Model load failed for {model}: {details}")]
    LoadFailure { model: String, details: String },

    #[error("Log submission failed: {0}")]
    SubmissionFailure(String),

    #[error("Sequence exhausted: requested {requested} models, {available} available")]
    SequenceExhausted { requested: usize, available: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid action id: {0}")]
    InvalidAction(i8),
}
