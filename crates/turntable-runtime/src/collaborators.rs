//! Scene-side collaborator traits.
//!
//! The runtime never renders anything itself.  It asks a [`ModelLoader`] for
//! a model by name, reads and writes the returned [`ModelHandle`]'s world
//! rotation, and asks a [`SnapshotSource`] for the current frame.

use std::sync::Arc;

use async_trait::async_trait;
use turntable_orientation::Quaternion;
use turntable_types::TurntableError;

/// A loaded model whose world rotation can be read and replaced.
///
/// Handles are shared with the renderer, so mutation goes through `&self`.
pub trait ModelHandle: Send + Sync {
    fn name(&self) -> &str;
    fn rotation(&self) -> Quaternion;
    fn set_rotation(&self, rotation: Quaternion);
}

/// Loads models by identifier.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load `name` and add it to the scene, replacing the previous model.
    ///
    /// # Errors
    ///
    /// [`TurntableError::LoadFailure`] when the asset cannot be fetched or
    /// parsed.
    async fn load(&self, name: &str) -> Result<Arc<dyn ModelHandle>, TurntableError>;
}

/// One captured frame as a `data:image/png;base64,...` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub data_url: String,
}

/// Captures the current frame.
pub trait SnapshotSource: Send + Sync {
    fn capture(&self) -> Snapshot;
}
