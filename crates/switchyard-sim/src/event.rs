//! Scheduled switch and parameter events.

use switchyard_core::{ComponentId, EventAction};

/// A discrete change to apply to one component at a given time.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchEvent {
    /// Activation time in seconds.
    pub time: f64,
    pub target: ComponentId,
    pub action: EventAction,
}

impl SwitchEvent {
    pub fn new(time: f64, target: ComponentId, action: EventAction) -> Self {
        Self {
            time,
            target,
            action,
        }
    }

    pub fn close(time: f64, target: ComponentId) -> Self {
        Self::new(time, target, EventAction::SetClosed(true))
    }

    pub fn open(time: f64, target: ComponentId) -> Self {
        Self::new(time, target, EventAction::SetClosed(false))
    }

    pub fn set_parameter(
        time: f64,
        target: ComponentId,
        name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self::new(
            time,
            target,
            EventAction::SetParameter {
                name: name.into(),
                value,
            },
        )
    }

    pub fn remove(time: f64, target: ComponentId) -> Self {
        Self::new(time, target, EventAction::Remove)
    }
}

/// Pending events ordered by activation time, then by insertion.
#[derive(Debug, Clone)]
pub struct EventManager {
    /// Sorted by `(time, seq)`.
    queue: Vec<(u64, SwitchEvent)>,
    next_seq: u64,
    /// Latest time passed to [`due`](Self::due).
    now: f64,
    /// Events within this distance after a step time are due at that step.
    tolerance: f64,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl EventManager {
    pub fn new(tolerance: f64) -> Self {
        Self {
            queue: Vec::new(),
            next_seq: 0,
            now: f64::NEG_INFINITY,
            tolerance: tolerance.max(0.0),
        }
    }

    /// Queue an event.
    ///
    /// Events scheduled before the last processed time are moved to that
    /// time and fire at the next step.
    pub fn schedule(&mut self, mut event: SwitchEvent) {
        if event.time.is_nan() || event.time < self.now {
            log::warn!(
                "event '{}' on {} scheduled at t={}s is in the past; applying at t={}s",
                event.action,
                event.target,
                event.time,
                self.now
            );
            event.time = self.now;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let at = self
            .queue
            .partition_point(|(s, e)| (e.time, *s) <= (event.time, seq));
        self.queue.insert(at, (seq, event));
    }

    /// Remove and return every event due at `time`, in application order.
    pub fn due(&mut self, time: f64) -> Vec<SwitchEvent> {
        self.now = self.now.max(time);
        let limit = time + self.tolerance;
        let count = self.queue.partition_point(|(_, e)| e.time <= limit);
        self.queue.drain(..count).map(|(_, e)| e).collect()
    }

    /// Events not yet applied, in application order.
    pub fn pending(&self) -> impl Iterator<Item = &SwitchEvent> {
        self.queue.iter().map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Activation time of the next pending event.
    pub fn next_time(&self) -> Option<f64> {
        self.queue.first().map(|(_, e)| e.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ComponentId {
        ComponentId::new(n)
    }

    #[test]
    fn test_ordered_by_time_then_insertion() {
        let mut events = EventManager::default();
        events.schedule(SwitchEvent::open(0.2, id(1)));
        events.schedule(SwitchEvent::close(0.1, id(2)));
        events.schedule(SwitchEvent::set_parameter(0.2, id(3), "resistance", 5.0));
        events.schedule(SwitchEvent::close(0.2, id(4)));

        let targets: Vec<u32> = events.pending().map(|e| e.target.as_u32()).collect();
        assert_eq!(targets, vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_due_drains_up_to_time() {
        let mut events = EventManager::new(1e-9);
        events.schedule(SwitchEvent::open(0.5, id(1)));
        events.schedule(SwitchEvent::close(0.7, id(1)));

        assert!(events.due(0.4).is_empty());
        // a step time that accumulates to just below 0.5 still picks it up
        let due = events.due(0.49999999999999994);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].action, EventAction::SetClosed(false));
        assert_eq!(events.len(), 1);
        assert_eq!(events.next_time(), Some(0.7));
    }

    #[test]
    fn test_past_event_is_clamped() {
        let mut events = EventManager::default();
        events.due(1.0);
        events.schedule(SwitchEvent::open(0.25, id(1)));

        assert_eq!(events.next_time(), Some(1.0));
        assert_eq!(events.due(1.0).len(), 1);
    }

    #[test]
    fn test_clamped_event_keeps_insertion_order() {
        let mut events = EventManager::default();
        events.due(1.0);
        events.schedule(SwitchEvent::open(1.0, id(1)));
        events.schedule(SwitchEvent::close(0.5, id(2)));

        let due = events.due(1.0);
        assert_eq!(due[0].target, id(1));
        assert_eq!(due[1].target, id(2));
    }
}
