//! `facesnap replay` — drive a capture session from a recorded frame stream.
//!
//! The stream is JSON lines: each non-blank line is the array of faces the
//! detector reported for one frame (`[]` for a frame without a face).

use anyhow::{Context, Result};
use facesnap_core::{FaceObservation, Phase};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::capture::SimulatedCamera;
use crate::config::Config;
use crate::session::{CaptureOutcome, CaptureReport, Session};

pub type Frame = Vec<FaceObservation>;

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Frames per second the stream is fed at.
    pub fps: u32,
    /// Frame indices at which a manual capture is requested.
    pub manual_at: Vec<usize>,
    /// Make every simulated capture fail.
    pub fail_captures: bool,
    /// Keep the session open after a successful capture.
    pub keep_going: bool,
}

pub fn read_frames(path: &Path) -> Result<Vec<Frame>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_frames(&text).with_context(|| format!("invalid frame stream {}", path.display()))
}

pub fn parse_frames(text: &str) -> Result<Vec<Frame>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Frame>(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

/// Feed `frames` into a session backed by a simulated camera and return
/// every capture report, in order.
pub async fn replay(
    frames: Vec<Frame>,
    config: &Config,
    opts: &ReplayOptions,
) -> Result<Vec<CaptureReport>> {
    let mut settings = config.session_settings();
    if opts.keep_going {
        settings.close_on_capture = false;
    }
    let camera = Arc::new(SimulatedCamera {
        photo_dir: config.photo_dir.clone(),
        latency: config.capture_latency(),
        fail: opts.fail_captures,
    });
    let (handle, mut reports) = Session::spawn(settings, camera)?;

    let collector = tokio::spawn(async move {
        let mut collected = Vec::new();
        while let Some(report) = reports.recv().await {
            match &report.outcome {
                CaptureOutcome::Captured { photo } => tracing::info!(
                    attempt = report.attempt,
                    trigger = %report.trigger,
                    path = %photo.path.display(),
                    "photo captured"
                ),
                CaptureOutcome::Failed { error } => tracing::warn!(
                    attempt = report.attempt,
                    trigger = %report.trigger,
                    error = %error,
                    "capture failed"
                ),
            }
            collected.push(report);
        }
        collected
    });

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(opts.fps.max(1)));
    let mut ticker = tokio::time::interval(frame_interval);

    for (index, faces) in frames.into_iter().enumerate() {
        ticker.tick().await;
        if handle.is_closed() {
            tracing::debug!(frame = index, "session closed, stopping replay");
            break;
        }
        if opts.manual_at.contains(&index) {
            tracing::debug!(frame = index, "manual capture requested");
            if handle.request_manual_capture().await.is_err() {
                break;
            }
        }
        if handle.submit_frame(faces).await.is_err() {
            break;
        }
    }

    // Let an armed or in-flight capture settle before tearing down.
    while let Ok(snapshot) = handle.snapshot().await {
        if matches!(snapshot.phase, Phase::Accumulating(_)) {
            break;
        }
        ticker.tick().await;
    }

    handle.shutdown().await?;
    Ok(collector.await?)
}
