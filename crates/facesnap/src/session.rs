use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use facesnap_core::{
    AutoCapture, CaptureTicket, ConfigError, EngineConfig, FaceObservation, Phase, Scheduler,
    TimerId, Trigger,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::capture::{CaptureAction, CaptureError, PhotoRef};

/// Capture reports buffered for a slow consumer before new ones are dropped.
const REPORT_BUFFER: usize = 16;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("capture session has ended")]
    ChannelClosed,
}

/// Runtime settings for one camera view.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub engine: EngineConfig,
    /// Upper bound on a single capture; `None` waits for the action to settle.
    pub capture_timeout: Option<Duration>,
    /// End the session after the first successful capture, as the camera
    /// view closes once a photo is taken.
    pub close_on_capture: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            capture_timeout: Some(Duration::from_secs(10)),
            close_on_capture: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaptureOutcome {
    Captured { photo: PhotoRef },
    Failed { error: String },
}

/// Emitted once per settled capture.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub attempt: u64,
    pub trigger: Trigger,
    pub outcome: CaptureOutcome,
}

/// Point-in-time view of the engine, for UIs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub phase: Phase,
    pub consecutive_acceptable: u32,
    pub capture_pending: bool,
    pub capture_in_progress: bool,
    pub captures_started: u64,
}

/// Messages sent from handles to the session loop.
enum SessionRequest {
    Frame(Vec<FaceObservation>),
    ManualCapture,
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Events the loop posts to itself from timer and capture tasks.
enum Internal {
    TimerFired(TimerId),
    CaptureSettled(CaptureTicket, Result<PhotoRef, CaptureError>),
}

/// [`Scheduler`] backed by tokio timers. A due timer is posted back onto the
/// session's event path rather than acting directly.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<Internal>,
    next_id: u64,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    fn new(tx: mpsc::UnboundedSender<Internal>) -> Self {
        Self {
            tx,
            next_id: 0,
            timers: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::TimerFired(id));
        });
        self.timers.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

/// Clone-safe handle to a running capture session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    /// Deliver one processed frame's faces (possibly none).
    pub async fn submit_frame(&self, faces: Vec<FaceObservation>) -> Result<(), SessionError> {
        self.send(SessionRequest::Frame(faces)).await
    }

    pub async fn request_manual_capture(&self) -> Result<(), SessionError> {
        self.send(SessionRequest::ManualCapture).await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionRequest::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Tear the session down and wait until no timer or capture task is
    /// left. Shutting down an ended session is a no-op.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.send(SessionRequest::Shutdown(reply_tx)).await.is_err() {
            return Ok(());
        }
        let _ = reply_rx.await;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, req: SessionRequest) -> Result<(), SessionError> {
        self.tx
            .send(req)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

pub struct Session;

impl Session {
    /// Start a session for one active camera view.
    ///
    /// Returns the handle and a stream of capture reports. The stream ends
    /// when the session does.
    pub fn spawn(
        settings: SessionSettings,
        action: Arc<dyn CaptureAction>,
    ) -> Result<(SessionHandle, mpsc::Receiver<CaptureReport>), SessionError> {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let engine = AutoCapture::new(
            settings.engine.clone(),
            TokioScheduler::new(internal_tx.clone()),
        )?;

        let (tx, rx) = mpsc::channel::<SessionRequest>(64);
        let (report_tx, report_rx) = mpsc::channel::<CaptureReport>(REPORT_BUFFER);

        let session = SessionLoop {
            engine,
            settings,
            action,
            internal_tx,
            reports: report_tx,
            capture_task: None,
        };
        tokio::spawn(session.run(rx, internal_rx));

        Ok((SessionHandle { tx }, report_rx))
    }
}

struct SessionLoop {
    engine: AutoCapture<TokioScheduler>,
    settings: SessionSettings,
    action: Arc<dyn CaptureAction>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    reports: mpsc::Sender<CaptureReport>,
    capture_task: Option<JoinHandle<()>>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<SessionRequest>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        tracing::info!("capture session started");
        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                req = requests.recv() => match req {
                    None => break,
                    Some(SessionRequest::Frame(faces)) => {
                        self.engine.on_frame(&faces);
                    }
                    Some(SessionRequest::ManualCapture) => {
                        if let Some(ticket) = self.engine.trigger_manual() {
                            self.start_capture(ticket);
                        }
                    }
                    Some(SessionRequest::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(SessionRequest::Shutdown(reply)) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                },
                Some(event) = internal.recv() => match event {
                    Internal::TimerFired(id) => {
                        if let Some(ticket) = self.engine.on_timer_fired(id) {
                            self.start_capture(ticket);
                        }
                    }
                    Internal::CaptureSettled(ticket, outcome) => {
                        self.capture_task = None;
                        let captured = outcome.is_ok();
                        if !self.engine.on_capture_settled(ticket, &outcome) {
                            continue;
                        }
                        self.publish(capture_report(ticket, outcome));
                        if captured && self.settings.close_on_capture {
                            tracing::info!("photo captured, closing session");
                            break;
                        }
                    }
                },
            }
        }

        self.engine.teardown();
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        tracing::info!(
            captures = self.engine.attempts(),
            "capture session ended"
        );
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn start_capture(&mut self, ticket: CaptureTicket) {
        let action = Arc::clone(&self.action);
        let limit = self.settings.capture_timeout;
        let tx = self.internal_tx.clone();

        self.capture_task = Some(tokio::spawn(async move {
            let outcome = match limit {
                Some(limit) => tokio::time::timeout(limit, action.capture())
                    .await
                    .unwrap_or_else(|_| Err(CaptureError::TimedOut(limit))),
                None => action.capture().await,
            };
            let _ = tx.send(Internal::CaptureSettled(ticket, outcome));
        }));
    }

    /// Hand a report to the consumer without waiting. A full stream drops
    /// the report; the loop must keep serving frames and shutdown.
    fn publish(&self, report: CaptureReport) {
        match self.reports.try_send(report) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(report)) => tracing::warn!(
                attempt = report.attempt,
                trigger = %report.trigger,
                "report stream full, capture report dropped"
            ),
            // Nobody listening; the engine state is already reset.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        let state = self.engine.state();
        EngineSnapshot {
            phase: state.phase(),
            consecutive_acceptable: state.consecutive_acceptable,
            capture_pending: state.pending_capture.is_some(),
            capture_in_progress: state.capture_in_progress,
            captures_started: self.engine.attempts(),
        }
    }
}

fn capture_report(ticket: CaptureTicket, outcome: Result<PhotoRef, CaptureError>) -> CaptureReport {
    let outcome = match outcome {
        Ok(photo) => CaptureOutcome::Captured { photo },
        Err(e) => CaptureOutcome::Failed {
            error: e.to_string(),
        },
    };
    CaptureReport {
        attempt: ticket.attempt,
        trigger: ticket.trigger,
        outcome,
    }
}

#[cfg(test)]
pub(crate) fn good_face() -> FaceObservation {
    FaceObservation {
        left_eye_open_probability: 0.9,
        right_eye_open_probability: 0.9,
        smiling_probability: 0.8,
        roll_angle: Some(0.0),
        yaw_angle: Some(0.0),
        pitch_angle: Some(0.0),
        bounds: facesnap_core::FaceBounds {
            width: 0.4,
            height: 0.4,
        },
    }
}
