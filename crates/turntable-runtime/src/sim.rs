//! [`SimScene`] – a headless stand-in for the renderer.
//!
//! Implements both [`ModelLoader`] and [`SnapshotSource`] without touching a
//! GPU: loaded models are plain rotation cells and snapshots are numbered
//! frames.  The CLI drives full sessions against it with a small load
//! latency; the runtime tests use its failure knob.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use turntable_orientation::Quaternion;
use turntable_types::{EMPTY_PNG_DATA_URL, TurntableError};

use crate::collaborators::{ModelHandle, ModelLoader, Snapshot, SnapshotSource};

// ─────────────────────────────────────────────────────────────────────────────
// SimModel
// ─────────────────────────────────────────────────────────────────────────────

/// A loaded model: a name and a world rotation.
#[derive(Debug)]
pub struct SimModel {
    name: String,
    rotation: Mutex<Quaternion>,
}

impl SimModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rotation: Mutex::new(Quaternion::identity()),
        }
    }
}

impl ModelHandle for SimModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn rotation(&self) -> Quaternion {
        self.rotation
            .lock()
            .map(|q| *q)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    fn set_rotation(&self, rotation: Quaternion) {
        match self.rotation.lock() {
            Ok(mut q) => *q = rotation,
            Err(poisoned) => *poisoned.into_inner() = rotation,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimScene
// ─────────────────────────────────────────────────────────────────────────────

/// Headless scene holding at most one model at a time.
#[derive(Debug, Default)]
pub struct SimScene {
    latency: Duration,
    failing: Mutex<HashSet<String>>,
    loads: Mutex<Vec<String>>,
    frame: AtomicU64,
}

impl SimScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every load by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every subsequent load of `model` fail.
    pub fn fail_on(&self, model: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(model.into());
        }
    }

    /// Identifiers passed to successful loads, in order.
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Number of frames captured so far.
    pub fn frames(&self) -> u64 {
        self.frame.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for SimScene {
    async fn load(&self, name: &str) -> Result<Arc<dyn ModelHandle>, TurntableError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let fails = self
            .failing
            .lock()
            .map(|f| f.contains(name))
            .unwrap_or(false);
        if fails {
            return Err(TurntableError::LoadFailure {
                model: name.to_string(),
                details: "asset unavailable".to_string(),
            });
        }
        if let Ok(mut loads) = self.loads.lock() {
            loads.push(name.to_string());
        }
        debug!(model = name, "simulated load");
        Ok(Arc::new(SimModel::new(name)))
    }
}

impl SnapshotSource for SimScene {
    fn capture(&self) -> Snapshot {
        let frame = self.frame.fetch_add(1, Ordering::SeqCst);
        Snapshot {
            data_url: format!("{EMPTY_PNG_DATA_URL}{frame:08X}"),
        }
    }
}
