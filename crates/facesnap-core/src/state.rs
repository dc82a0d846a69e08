//! Engine state and its transition functions.
//!
//! Every transition takes the current [`EngineState`] by value and returns
//! the next one together with the side effects the owner has to carry out
//! (arm or cancel the debounce timer, start a capture). Nothing here touches
//! a clock or a camera.

use crate::config::StreakBreakPolicy;
use crate::scheduler::TimerId;

/// What started a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Auto,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Auto => write!(f, "auto"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Classification of one frame's faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    NoFace,
    Acceptable,
    Unacceptable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Schedule the debounce timer and record it with [`EngineState::armed`].
    Arm,
    Cancel(TimerId),
    StartCapture(Trigger),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: EngineState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: EngineState) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }
}

/// Coarse view of the state for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "phase", content = "count", rename_all = "snake_case")]
pub enum Phase {
    Accumulating(u32),
    ArmedPendingCapture,
    CaptureInFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineState {
    pub consecutive_acceptable: u32,
    pub pending_capture: Option<TimerId>,
    pub capture_in_progress: bool,
}

impl EngineState {
    pub fn phase(&self) -> Phase {
        if self.capture_in_progress {
            Phase::CaptureInFlight
        } else if self.pending_capture.is_some() {
            Phase::ArmedPendingCapture
        } else {
            Phase::Accumulating(self.consecutive_acceptable)
        }
    }

    /// Record the timer scheduled for an [`Effect::Arm`].
    pub fn armed(self, id: TimerId) -> Self {
        Self {
            pending_capture: Some(id),
            ..self
        }
    }

    pub fn on_frame(
        self,
        class: FrameClass,
        threshold: u32,
        policy: StreakBreakPolicy,
    ) -> Transition {
        if class == FrameClass::NoFace || self.capture_in_progress {
            return Transition {
                next: Self {
                    consecutive_acceptable: 0,
                    pending_capture: None,
                    ..self
                },
                effects: self.pending_capture.map(Effect::Cancel).into_iter().collect(),
            };
        }

        match class {
            FrameClass::Acceptable => {
                let count = self.consecutive_acceptable.saturating_add(1);
                let effects = if count >= threshold && self.pending_capture.is_none() {
                    vec![Effect::Arm]
                } else {
                    Vec::new()
                };
                Transition {
                    next: Self {
                        consecutive_acceptable: count,
                        ..self
                    },
                    effects,
                }
            }
            _ => match (policy, self.pending_capture) {
                (StreakBreakPolicy::CancelPending, Some(id)) => Transition {
                    next: Self {
                        consecutive_acceptable: 0,
                        pending_capture: None,
                        ..self
                    },
                    effects: vec![Effect::Cancel(id)],
                },
                _ => Transition {
                    next: Self {
                        consecutive_acceptable: 0,
                        ..self
                    },
                    effects: Vec::new(),
                },
            },
        }
    }

    /// A debounce timer came due. Fires for any id other than the pending
    /// one are stale and change nothing.
    pub fn on_timer_fired(self, id: TimerId) -> Transition {
        if self.pending_capture != Some(id) {
            return Transition::unchanged(self);
        }
        let cleared = Self {
            pending_capture: None,
            ..self
        };
        cleared.on_trigger(Trigger::Auto)
    }

    /// Capture gate. A trigger while a capture is in flight is a no-op.
    pub fn on_trigger(self, trigger: Trigger) -> Transition {
        if self.capture_in_progress {
            return Transition::unchanged(self);
        }
        let mut effects: Vec<Effect> =
            self.pending_capture.map(Effect::Cancel).into_iter().collect();
        effects.push(Effect::StartCapture(trigger));
        Transition {
            next: Self {
                pending_capture: None,
                capture_in_progress: true,
                ..self
            },
            effects,
        }
    }

    /// The capture action settled, successfully or not.
    pub fn on_capture_settled(self) -> Transition {
        Self::reset(self)
    }

    pub fn on_teardown(self) -> Transition {
        Self::reset(self)
    }

    fn reset(self) -> Transition {
        Transition {
            next: Self::default(),
            effects: self.pending_capture.map(Effect::Cancel).into_iter().collect(),
        }
    }
}
