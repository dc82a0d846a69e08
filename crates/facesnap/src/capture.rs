use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera error: {0}")]
    Camera(String),
    #[error("capture did not settle within {}ms", .0.as_millis())]
    TimedOut(Duration),
}

/// Reference to a captured photo. The file itself is owned by the camera
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoRef {
    pub id: Uuid,
    pub path: PathBuf,
    pub captured_at: DateTime<Utc>,
}

/// The "capture now" operation behind the gate.
///
/// Implementations must always settle. The session can bound them with a
/// timeout, but a capture that never returns keeps the gate closed until then.
#[async_trait]
pub trait CaptureAction: Send + Sync + 'static {
    async fn capture(&self) -> Result<PhotoRef, CaptureError>;
}

/// Stand-in camera used by `facesnap replay`: waits `latency`, then either
/// hands back a photo reference under `photo_dir` or fails.
pub struct SimulatedCamera {
    pub photo_dir: PathBuf,
    pub latency: Duration,
    pub fail: bool,
}

#[async_trait]
impl CaptureAction for SimulatedCamera {
    async fn capture(&self) -> Result<PhotoRef, CaptureError> {
        tokio::time::sleep(self.latency).await;
        if self.fail {
            return Err(CaptureError::Camera("simulated sensor failure".into()));
        }
        let id = Uuid::new_v4();
        Ok(PhotoRef {
            id,
            path: self.photo_dir.join(format!("{id}.jpg")),
            captured_at: Utc::now(),
        })
    }
}
