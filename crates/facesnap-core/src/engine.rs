use std::fmt::Display;

use crate::config::{ConfigError, EngineConfig};
use crate::quality::FaceObservation;
use crate::scheduler::{Scheduler, TimerId};
use crate::state::{Effect, EngineState, FrameClass, Phase, Transition, Trigger};

/// Identifies one accepted capture. The owner runs the capture action and
/// hands the ticket back to [`AutoCapture::on_capture_settled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTicket {
    pub attempt: u64,
    pub trigger: Trigger,
}

/// Auto-capture decision engine.
///
/// Owns the [`EngineState`] and a [`Scheduler`] for the debounce timer. All
/// inputs (frames, timer fires, manual triggers, capture settlements) are
/// plain method calls and must arrive one at a time. Dropping the engine
/// tears it down, cancelling any pending timer.
pub struct AutoCapture<S: Scheduler> {
    config: EngineConfig,
    state: EngineState,
    scheduler: S,
    attempts: u64,
    in_flight: Option<CaptureTicket>,
    closed: bool,
}

impl<S: Scheduler> AutoCapture<S> {
    pub fn new(config: EngineConfig, scheduler: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: EngineState::default(),
            scheduler,
            attempts: 0,
            in_flight: None,
            closed: false,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn in_flight(&self) -> Option<CaptureTicket> {
        self.in_flight
    }

    /// Captures started over the engine's lifetime.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Process one frame's detected faces. Only the first face is judged.
    pub fn on_frame(&mut self, faces: &[FaceObservation]) -> Phase {
        if self.closed {
            tracing::debug!("frame after teardown ignored");
            return self.phase();
        }

        let class = match faces.first() {
            None => FrameClass::NoFace,
            Some(face) => match self.config.quality.assess(face) {
                Ok(()) => FrameClass::Acceptable,
                Err(reason) => {
                    tracing::trace!(%reason, "face rejected");
                    FrameClass::Unacceptable
                }
            },
        };

        let transition = self.state.on_frame(
            class,
            self.config.streak_threshold,
            self.config.streak_break,
        );
        self.apply(transition);

        tracing::trace!(
            ?class,
            count = self.state.consecutive_acceptable,
            "frame processed"
        );
        self.phase()
    }

    /// Deliver a debounce timer fire. Returns the ticket of the automatic
    /// capture it started, if any.
    pub fn on_timer_fired(&mut self, id: TimerId) -> Option<CaptureTicket> {
        if self.closed {
            return None;
        }
        // A fired timer is finished whether or not it is still the pending
        // one, so its scheduler entry is released unconditionally.
        self.scheduler.cancel(id);
        let transition = self.state.on_timer_fired(id);
        let ticket = self.apply(transition);
        if ticket.is_none() {
            tracing::debug!(timer = %id, "stale capture timer fire ignored");
        }
        ticket
    }

    /// User-initiated capture, subject to the same gate as auto capture.
    pub fn trigger_manual(&mut self) -> Option<CaptureTicket> {
        if self.closed {
            return None;
        }
        let transition = self.state.on_trigger(Trigger::Manual);
        let ticket = self.apply(transition);
        if ticket.is_none() {
            tracing::debug!("manual capture ignored: capture already in progress");
        }
        ticket
    }

    /// Report the outcome of a capture started by `ticket`. Failures are
    /// logged and absorbed; either way the engine returns to its initial
    /// state. Returns false if the ticket is not the capture in flight.
    pub fn on_capture_settled<T, E: Display>(
        &mut self,
        ticket: CaptureTicket,
        outcome: &Result<T, E>,
    ) -> bool {
        if self.in_flight != Some(ticket) {
            tracing::warn!(
                attempt = ticket.attempt,
                "settlement for a capture that is not in flight ignored"
            );
            return false;
        }
        self.in_flight = None;

        match outcome {
            Ok(_) => tracing::info!(
                attempt = ticket.attempt,
                trigger = %ticket.trigger,
                "capture completed"
            ),
            Err(e) => tracing::warn!(
                attempt = ticket.attempt,
                trigger = %ticket.trigger,
                error = %e,
                "capture failed"
            ),
        }

        let transition = self.state.on_capture_settled();
        self.apply(transition);
        true
    }

    /// Cancel any pending timer and stop accepting events. Idempotent.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        let transition = self.state.on_teardown();
        self.apply(transition);
        self.in_flight = None;
        self.closed = true;
        tracing::debug!("auto-capture engine torn down");
    }

    fn apply(&mut self, transition: Transition) -> Option<CaptureTicket> {
        let mut next = transition.next;
        let mut started = None;

        for effect in transition.effects {
            match effect {
                Effect::Arm => {
                    let id = self.scheduler.schedule(self.config.debounce());
                    tracing::info!(
                        timer = %id,
                        count = next.consecutive_acceptable,
                        delay_ms = self.config.debounce_ms,
                        "face stable, auto capture armed"
                    );
                    next = next.armed(id);
                }
                Effect::Cancel(id) => {
                    self.scheduler.cancel(id);
                    tracing::debug!(timer = %id, "auto capture disarmed");
                }
                Effect::StartCapture(trigger) => {
                    self.attempts += 1;
                    let ticket = CaptureTicket {
                        attempt: self.attempts,
                        trigger,
                    };
                    tracing::info!(attempt = ticket.attempt, %trigger, "capture started");
                    self.in_flight = Some(ticket);
                    started = Some(ticket);
                }
            }
        }

        self.state = next;
        started
    }
}

impl<S: Scheduler> Drop for AutoCapture<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreakBreakPolicy;
    use crate::quality::{good_face, FaceBounds};
    use crate::scheduler::ManualScheduler;
    use std::time::Duration;

    const FRAME: Duration = Duration::from_millis(33);
    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn engine() -> AutoCapture<ManualScheduler> {
        AutoCapture::new(EngineConfig::default(), ManualScheduler::new()).unwrap()
    }

    fn engine_with(policy: StreakBreakPolicy) -> AutoCapture<ManualScheduler> {
        let config = EngineConfig {
            streak_break: policy,
            ..EngineConfig::default()
        };
        AutoCapture::new(config, ManualScheduler::new()).unwrap()
    }

    fn bad_face() -> FaceObservation {
        FaceObservation {
            bounds: FaceBounds {
                width: 0.1,
                height: 0.1,
            },
            ..good_face()
        }
    }

    /// Advance virtual time and deliver every due fire to the engine.
    fn advance(engine: &mut AutoCapture<ManualScheduler>, by: Duration) -> Vec<CaptureTicket> {
        let due = engine.scheduler_mut().advance(by);
        due.into_iter()
            .filter_map(|id| engine.on_timer_fired(id))
            .collect()
    }

    fn feed_good(engine: &mut AutoCapture<ManualScheduler>, n: usize) {
        for _ in 0..n {
            engine.on_frame(&[good_face()]);
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            streak_threshold: 0,
            ..EngineConfig::default()
        };
        assert!(AutoCapture::new(config, ManualScheduler::new()).is_err());
    }

    #[test]
    fn test_nine_frames_do_not_arm() {
        let mut e = engine();
        feed_good(&mut e, 9);
        assert_eq!(e.phase(), Phase::Accumulating(9));
        assert_eq!(e.scheduler().pending_count(), 0);
        assert!(advance(&mut e, Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_tenth_frame_arms() {
        let mut e = engine();
        feed_good(&mut e, 10);
        assert_eq!(e.phase(), Phase::ArmedPendingCapture);
        assert_eq!(e.state().consecutive_acceptable, 10);
        assert_eq!(e.scheduler().pending_count(), 1);
    }

    #[test]
    fn test_only_first_face_is_judged() {
        let mut e = engine();
        e.on_frame(&[bad_face(), good_face()]);
        assert_eq!(e.phase(), Phase::Accumulating(0));
        e.on_frame(&[good_face(), bad_face()]);
        assert_eq!(e.phase(), Phase::Accumulating(1));
    }

    #[test]
    fn test_bad_frame_resets_streak() {
        let mut e = engine();
        feed_good(&mut e, 7);
        e.on_frame(&[bad_face()]);
        assert_eq!(e.phase(), Phase::Accumulating(0));
        feed_good(&mut e, 9);
        assert_eq!(e.scheduler().scheduled_total(), 0);
    }

    #[test]
    fn test_empty_frame_cancels_pending_timer() {
        let mut e = engine();
        feed_good(&mut e, 10);
        e.on_frame(&[]);
        assert_eq!(e.phase(), Phase::Accumulating(0));
        assert_eq!(e.scheduler().pending_count(), 0);
        assert!(advance(&mut e, DEBOUNCE * 2).is_empty());
    }

    #[test]
    fn test_no_double_arming_with_keep_pending() {
        let mut e = engine_with(StreakBreakPolicy::KeepPending);
        feed_good(&mut e, 10);
        e.on_frame(&[bad_face()]);
        assert_eq!(e.state().consecutive_acceptable, 0);
        assert!(e.state().pending_capture.is_some());
        feed_good(&mut e, 10);

        assert_eq!(e.scheduler().scheduled_total(), 1);
        assert_eq!(e.scheduler().pending_count(), 1);
        let fired = advance(&mut e, DEBOUNCE);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger, Trigger::Auto);
    }

    #[test]
    fn test_streak_break_rearms_with_cancel_pending() {
        let mut e = engine_with(StreakBreakPolicy::CancelPending);
        feed_good(&mut e, 10);
        e.on_frame(&[bad_face()]);
        assert_eq!(e.phase(), Phase::Accumulating(0));
        assert_eq!(e.scheduler().pending_count(), 0);

        feed_good(&mut e, 9);
        assert_eq!(e.scheduler().pending_count(), 0);
        e.on_frame(&[good_face()]);

        // The first arm was withdrawn; only the second one is live.
        assert_eq!(e.scheduler().scheduled_total(), 2);
        assert_eq!(e.scheduler().pending_count(), 1);
        assert_eq!(advance(&mut e, DEBOUNCE).len(), 1);
    }

    #[test]
    fn test_stale_timer_does_not_capture_after_streak_break() {
        let mut e = engine();
        feed_good(&mut e, 10);
        let stale = e.state().pending_capture.unwrap();
        e.on_frame(&[bad_face()]);
        assert_eq!(e.on_timer_fired(stale), None);
        assert_eq!(e.in_flight(), None);
    }

    #[test]
    fn test_stale_fire_leaves_rearmed_timer_alone() {
        let mut e = engine();
        feed_good(&mut e, 10);
        let stale = e.state().pending_capture.unwrap();
        e.on_frame(&[bad_face()]);
        feed_good(&mut e, 10);
        let current = e.state().pending_capture.unwrap();
        assert_ne!(stale, current);

        assert_eq!(e.on_timer_fired(stale), None);
        assert_eq!(e.state().pending_capture, Some(current));
        assert!(e.scheduler().is_pending(current));
        assert_eq!(e.scheduler().pending_count(), 1);
    }

    #[test]
    fn test_frames_during_capture_reset_and_never_arm() {
        let mut e = engine();
        let ticket = e.trigger_manual().unwrap();
        feed_good(&mut e, 25);
        assert_eq!(e.state().consecutive_acceptable, 0);
        assert_eq!(e.phase(), Phase::CaptureInFlight);
        assert_eq!(e.scheduler().scheduled_total(), 0);

        e.on_frame(&[bad_face()]);
        assert_eq!(e.state().consecutive_acceptable, 0);

        assert!(e.on_capture_settled(ticket, &Ok::<_, &str>("photo")));
        assert_eq!(e.phase(), Phase::Accumulating(0));
    }

    #[test]
    fn test_manual_trigger_during_capture_is_noop() {
        let mut e = engine();
        let first = e.trigger_manual();
        assert!(first.is_some());
        assert_eq!(e.trigger_manual(), None);
        assert_eq!(e.in_flight(), first);
        assert_eq!(first.unwrap().attempt, 1);
    }

    #[test]
    fn test_manual_trigger_preempts_armed_timer() {
        let mut e = engine();
        feed_good(&mut e, 10);
        let ticket = e.trigger_manual().unwrap();
        assert_eq!(ticket.trigger, Trigger::Manual);
        assert_eq!(e.scheduler().pending_count(), 0);
        assert!(advance(&mut e, DEBOUNCE).is_empty());
    }

    #[test]
    fn test_settle_resets_state_on_success_and_failure() {
        for outcome in [Ok("photo.jpg"), Err("camera unavailable")] {
            let mut e = engine();
            feed_good(&mut e, 10);
            let ticket = advance(&mut e, DEBOUNCE).pop().unwrap();
            assert_eq!(e.phase(), Phase::CaptureInFlight);

            assert!(e.on_capture_settled(ticket, &outcome));
            assert_eq!(e.state(), EngineState::default());
            assert_eq!(e.in_flight(), None);
        }
    }

    #[test]
    fn test_no_retry_after_failure() {
        let mut e = engine();
        feed_good(&mut e, 10);
        let ticket = advance(&mut e, DEBOUNCE).pop().unwrap();
        e.on_capture_settled(ticket, &Err::<(), _>("io error"));

        assert!(advance(&mut e, Duration::from_secs(10)).is_empty());
        feed_good(&mut e, 9);
        assert_eq!(e.phase(), Phase::Accumulating(9));
        e.on_frame(&[good_face()]);
        let retry = advance(&mut e, DEBOUNCE).pop().unwrap();
        assert_eq!(retry.attempt, 2);
    }

    #[test]
    fn test_mismatched_settlement_ignored() {
        let mut e = engine();
        let ticket = e.trigger_manual().unwrap();
        let bogus = CaptureTicket {
            attempt: ticket.attempt + 1,
            trigger: Trigger::Auto,
        };
        assert!(!e.on_capture_settled(bogus, &Ok::<_, &str>(())));
        assert_eq!(e.phase(), Phase::CaptureInFlight);
    }

    #[test]
    fn test_teardown_prevents_pending_fire() {
        let mut e = engine();
        feed_good(&mut e, 10);
        let id = e.state().pending_capture.unwrap();

        e.teardown();
        assert!(e.is_closed());
        assert!(!e.scheduler().is_pending(id));
        assert!(advance(&mut e, DEBOUNCE * 10).is_empty());
        assert_eq!(e.on_timer_fired(id), None);

        // Everything after teardown is inert.
        feed_good(&mut e, 20);
        assert_eq!(e.scheduler().scheduled_total(), 1);
        assert_eq!(e.trigger_manual(), None);
        e.teardown();
    }

    #[test]
    fn test_end_to_end_single_capture() {
        let mut e = engine();
        let mut captures = Vec::new();

        for _ in 0..10 {
            e.on_frame(&[good_face()]);
            captures.extend(advance(&mut e, FRAME));
        }
        assert!(captures.is_empty());
        assert_eq!(e.phase(), Phase::ArmedPendingCapture);

        captures.extend(advance(&mut e, DEBOUNCE));
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].trigger, Trigger::Auto);
        assert_eq!(e.phase(), Phase::CaptureInFlight);

        assert!(e.on_capture_settled(captures[0], &Ok::<_, &str>("photo")));
        assert_eq!(e.phase(), Phase::Accumulating(0));
        assert!(advance(&mut e, Duration::from_secs(1)).is_empty());
    }
}
