//! Fire-once deferred events, each owned by an agent.

use slotmap::SlotMap;

use crate::AgentId;

slotmap::new_key_type! {
    /// Cancellation token of a scheduled event.
    pub struct TimerId;
}

/// What happens to an agent when its timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DeferredAction {
    /// Pick a new destination.
    PickDestination,
    /// Enable movement.
    StartMovement,
}

/// An event that fired during [`Scheduler::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredEvent {
    /// The timer that fired. Already removed from the scheduler.
    pub timer: TimerId,
    /// The agent the event belongs to.
    pub agent: AgentId,
    /// The action to perform.
    pub action: DeferredAction,
}

#[derive(Debug, Clone)]
struct Timer {
    remaining: f32,
    agent: AgentId,
    action: DeferredAction,
}

/// A set of countdown timers advanced by the simulation tick.
#[derive(Debug, Clone, Default)]
pub struct Scheduler(SlotMap<TimerId, Timer>);

impl Scheduler {
    /// Schedules `action` for `agent` after `delay` seconds.
    pub fn schedule(&mut self, agent: AgentId, delay: f32, action: DeferredAction) -> TimerId {
        self.0.insert(Timer {
            remaining: delay.max(0.0),
            agent,
            action,
        })
    }

    /// Cancels a timer. Returns whether the timer was still pending.
    pub fn cancel(&mut self, timer: TimerId) -> bool {
        self.0.remove(timer).is_some()
    }

    /// Cancels every timer of `agent`. Returns the number of cancelled timers.
    pub fn cancel_agent(&mut self, agent: AgentId) -> usize {
        let before = self.0.len();
        self.0.retain(|_, timer| timer.agent != agent);
        before - self.0.len()
    }

    /// Seconds left until the timer fires, or `None` if it already fired or was cancelled.
    pub fn remaining(&self, timer: TimerId) -> Option<f32> {
        self.0.get(timer).map(|timer| timer.remaining)
    }

    /// Number of pending timers.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no timer is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Advances every timer by `dt` seconds and removes the ones that fired.
    /// Fired events are returned in the order they were due.
    pub fn advance(&mut self, dt: f32) -> Vec<FiredEvent> {
        let mut due = Vec::new();
        for (id, timer) in self.0.iter_mut() {
            timer.remaining -= dt;
            if timer.remaining <= 0.0 {
                due.push((timer.remaining, id));
            }
        }
        due.sort_by(|a, b| a.0.total_cmp(&b.0));
        due.into_iter()
            .filter_map(|(_, id)| {
                self.0.remove(id).map(|timer| FiredEvent {
                    timer: id,
                    agent: timer.agent,
                    action: timer.action,
                })
            })
            .collect()
    }
}
