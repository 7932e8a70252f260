//! Reaction to host low-memory warnings.
//!
//! Every warning moves the controller to `Pressured`, bumps the event count and
//! asks the caller to clear the memory tier. Once the count exceeds the
//! escalation threshold the caller is also asked to clear the disk tier and the
//! count starts over. Each warning (re)arms a cooldown; when it elapses without
//! another warning the controller returns to `Normal`. The cooldown only
//! clears the pressured flag: the event count carries over, so only an
//! escalation resets it.
//! The cooldown task holds only a weak reference and is aborted on drop, so it
//! never runs against a torn-down cache.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureState {
    Normal,
    Pressured,
}

/// What the owner of the tiers must do in response to a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressureAction {
    ClearMemory,
    ClearMemoryAndDisk,
}

/// A host low-memory warning, as delivered over an event stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryWarning;

#[derive(Clone, Copy, Debug)]
pub struct PressurePolicy {
    pub cooldown: Duration,
    /// Disk is cleared once the event count is strictly greater than this.
    pub escalation_threshold: u32,
}

impl Default for PressurePolicy {
    fn default() -> Self {
        Self { cooldown: DEFAULT_COOLDOWN, escalation_threshold: DEFAULT_ESCALATION_THRESHOLD }
    }
}

struct PressureInner {
    state: PressureState,
    events: u32,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub struct PressureController {
    inner: Mutex<PressureInner>,
    policy: PressurePolicy,
}

impl PressureController {
    #[must_use]
    pub fn new(policy: PressurePolicy) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PressureInner {
                state: PressureState::Normal,
                events: 0,
                generation: 0,
                timer: None,
            }),
            policy,
        })
    }

    #[must_use]
    pub fn policy(&self) -> PressurePolicy {
        self.policy
    }

    #[must_use]
    pub fn state(&self) -> PressureState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn under_pressure(&self) -> bool {
        self.state() == PressureState::Pressured
    }

    #[must_use]
    pub fn event_count(&self) -> u32 {
        self.inner.lock().events
    }

    /// Apply one warning and arm the cooldown on `rt`.
    pub fn signal(self: &Arc<Self>, rt: &Handle) -> PressureAction {
        let mut st = self.inner.lock();
        st.events = st.events.saturating_add(1);
        st.state = PressureState::Pressured;
        st.generation += 1;

        let action = if st.events > self.policy.escalation_threshold {
            st.events = 0;
            PressureAction::ClearMemoryAndDisk
        } else {
            PressureAction::ClearMemory
        };

        if let Some(prev) = st.timer.take() {
            prev.abort();
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let generation = st.generation;
        let cooldown = self.policy.cooldown;
        st.timer = Some(rt.spawn(async move {
            tokio::time::sleep(cooldown).await;
            if let Some(ctrl) = weak.upgrade() {
                ctrl.finish_cooldown(generation);
            }
        }));
        drop(st);

        log::info!(target: "imgtier::pressure", "memory warning handled: {action:?}");
        action
    }

    /// Return to `Normal` if no warning arrived since `generation` was armed.
    fn finish_cooldown(&self, generation: u64) -> bool {
        let mut st = self.inner.lock();
        if st.generation != generation || st.state != PressureState::Pressured {
            return false;
        }
        st.state = PressureState::Normal;
        st.timer = None;
        log::debug!(target: "imgtier::pressure", "cooldown elapsed; back to normal");
        true
    }
}

impl Drop for PressureController {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.get_mut().timer.take() {
            timer.abort();
        }
    }
}
