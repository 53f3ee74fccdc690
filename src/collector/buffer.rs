use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::trace;

use super::event::ActivityEvent;

/// Copy of the buffer contents taken under the lock, tagged with the generation it was taken at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub generation: u64,
    pub events: Vec<ActivityEvent>,
}

#[derive(Debug, Default)]
struct BufferState {
    /// Each event with the generation that appended it, so ascending.
    entries: Vec<(u64, ActivityEvent)>,
    generation: u64,
}

/// The live activity buffer shared by every listener, the pruning task and the saver.
///
/// Appends and prunes are serialized by one lock. Readers never see a half applied change and
/// can ask for everything appended after a generation they already processed.
#[derive(Debug, Clone)]
pub struct ActivityBuffer {
    state: Arc<Mutex<BufferState>>,
    changes: Arc<watch::Sender<u64>>,
}

impl Default for ActivityBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityBuffer {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Default::default(),
            changes: Arc::new(changes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, event: ActivityEvent) -> u64 {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            let generation = state.generation;
            state.entries.push((generation, event));
            generation
        };
        trace!("Buffer generation {generation}");
        self.changes.send_replace(generation);
        generation
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            generation: state.generation,
            events: state.entries.iter().map(|(_, e)| e.clone()).collect(),
        }
    }

    /// Events appended after `generation` that are still buffered.
    pub fn since(&self, generation: u64) -> Snapshot {
        let state = self.lock();
        let from = state.entries.partition_point(|(g, _)| *g <= generation);
        Snapshot {
            generation: state.generation,
            events: state.entries[from..].iter().map(|(_, e)| e.clone()).collect(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn has_changed_since(&self, generation: u64) -> bool {
        self.generation() != generation
    }

    /// Drops every event older than `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|(_, e)| e.moment >= cutoff);
        before - state.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receives the latest generation whenever something is appended.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::collector::event::{ActivityEvent, ActivityKind};

    use super::ActivityBuffer;

    #[test]
    fn test_since_returns_only_new_events() {
        let buffer = ActivityBuffer::new();
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        buffer.push(ActivityEvent::new(now, ActivityKind::Keyboard));
        let seen = buffer.snapshot();
        assert_eq!(seen.events.len(), 1);
        assert!(!buffer.has_changed_since(seen.generation));

        buffer.push(ActivityEvent::new(now, ActivityKind::Pointer));
        assert!(buffer.has_changed_since(seen.generation));
        let fresh = buffer.since(seen.generation);
        assert_eq!(fresh.events.len(), 1);
        assert_eq!(fresh.events[0].kind, ActivityKind::Pointer);
        assert_eq!(fresh.generation, 2);
    }

    #[test]
    fn test_prune_keeps_generation() {
        let buffer = ActivityBuffer::new();
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        buffer.push(ActivityEvent::new(now - Duration::days(1), ActivityKind::Keyboard));
        buffer.push(ActivityEvent::new(now, ActivityKind::Keyboard));
        assert_eq!(buffer.prune_before(now - Duration::hours(1)), 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.generation(), 2);
        assert_eq!(buffer.since(1).events.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_pushes_are_all_kept() {
        let buffer = ActivityBuffer::new();
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        let tasks = (0..8)
            .map(|i| {
                let buffer = buffer.clone();
                tokio::spawn(async move {
                    for j in 0..50 {
                        buffer.push(ActivityEvent::new(
                            now + Duration::seconds(i * 50 + j),
                            ActivityKind::Input,
                        ));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.events.len(), 400);
        assert_eq!(snapshot.generation, 400);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_generation() {
        let buffer = ActivityBuffer::new();
        let mut changes = buffer.subscribe();
        buffer.push(ActivityEvent::new(Utc::now(), ActivityKind::FileSystem));
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), 1);
    }
}
