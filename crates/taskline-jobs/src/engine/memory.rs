//! In-process engine.
//!
//! Mirrors the Redis layout (registry, FIFO list, deadline-ordered delayed
//! set, expiry deadlines) behind a single mutex, so every operation is
//! atomic with respect to concurrent callers sharing one instance.

use super::{Delivery, Engine};
use crate::clock::{Clock, SystemClock};
use crate::error::EngineResult;
use crate::item::{duration_millis, PushOptions, QueueItem, StoredRecord};
use crate::metrics::EngineMetrics;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

const BACKEND: &str = "memory";

#[derive(Debug, Default)]
struct QueueState {
    /// Visible records, head first.
    visible: VecDeque<String>,
    /// Delayed records keyed by (visible-at, insertion sequence).
    delayed: BTreeMap<(i64, u64), String>,
    /// Expiry deadlines of queued records.
    expiring: Vec<(i64, String)>,
}

impl QueueState {
    /// Drop every record whose deadline has passed.
    fn reap(&mut self, now: i64) -> usize {
        let (expired, live): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.expiring).into_iter().partition(|(deadline, _)| *deadline <= now);
        self.expiring = live;

        for (_, payload) in &expired {
            if !self.remove_visible(payload) {
                self.remove_delayed(payload);
            }
        }
        expired.len()
    }

    /// Move delayed records that became visible to the tail, earliest first.
    fn promote(&mut self, now: i64) {
        while let Some(entry) = self.delayed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let payload = entry.remove();
            self.visible.push_back(payload);
        }
    }

    fn remove_visible(&mut self, payload: &str) -> bool {
        match self.visible.iter().position(|p| p == payload) {
            Some(index) => self.visible.remove(index).is_some(),
            None => false,
        }
    }

    fn remove_delayed(&mut self, payload: &str) -> bool {
        let key = self
            .delayed
            .iter()
            .find(|(_, p)| p.as_str() == payload)
            .map(|(key, _)| *key);
        key.and_then(|key| self.delayed.remove(&key)).is_some()
    }

    /// Forget the expiry of one record, returning its deadline.
    fn take_deadline(&mut self, payload: &str) -> Option<i64> {
        let index = self.expiring.iter().position(|(_, p)| p == payload)?;
        Some(self.expiring.remove(index).0)
    }

    /// Remove the first live stored copy of `item`. Expired copies met on
    /// the way are purged.
    fn delete_copy(&mut self, item: &QueueItem, now: i64) -> bool {
        let candidates: Vec<String> = self
            .visible
            .iter()
            .chain(self.delayed.values())
            .filter(|raw| StoredRecord::holds(raw, item))
            .cloned()
            .collect();

        for raw in candidates {
            let deadline = self.take_deadline(&raw);
            if !self.remove_visible(&raw) {
                self.remove_delayed(&raw);
            }
            if deadline.map_or(true, |deadline| deadline > now) {
                return true;
            }
        }
        false
    }

    fn len(&self) -> usize {
        self.visible.len() + self.delayed.len()
    }
}

#[derive(Debug, Default)]
struct State {
    registry: BTreeSet<String>,
    queues: HashMap<String, QueueState>,
    sequence: u64,
}

impl State {
    fn queue_mut(&mut self, name: &str) -> &mut QueueState {
        self.registry.insert(name.to_string());
        self.queues.entry(name.to_string()).or_default()
    }
}

/// Engine that keeps everything in process memory.
///
/// Share one instance between workers through `Arc<MemoryEngine>`.
#[derive(Debug)]
pub struct MemoryEngine {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an empty engine on the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty engine reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Store raw bytes at the tail of a queue, bypassing the codec.
    pub fn push_raw(&self, queue: &str, raw: impl Into<String>) {
        self.state.lock().queue_mut(queue).visible.push_back(raw.into());
    }

    /// Number of records in a queue, delayed ones included.
    #[must_use]
    pub fn len(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, QueueState::len)
    }

    /// True when a queue holds no records.
    #[must_use]
    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn connect(&self) -> bool {
        true
    }

    async fn push(&self, item: &QueueItem, options: PushOptions) -> bool {
        let record = StoredRecord::new(item.with_push_options(&options));
        let payload = match record.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, item_id = %item.id, "Failed to encode item");
                EngineMetrics::error(BACKEND, "push", e.kind());
                return false;
            }
        };
        let record = record.item;

        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        state.sequence += 1;
        let sequence = state.sequence;
        let queue = state.queue_mut(&record.queue);

        match record.options.delay {
            Some(delay) if !delay.is_zero() => {
                let visible_at = now.saturating_add(duration_millis(delay));
                queue.delayed.insert((visible_at, sequence), payload.clone());
            }
            _ => queue.visible.push_back(payload.clone()),
        }

        if let Some(ttl) = record.options.expires_in {
            queue.expiring.push((now.saturating_add(duration_millis(ttl)), payload));
        }

        debug!(item_id = %record.id, queue = %record.queue, "Pushed item");
        EngineMetrics::pushed(BACKEND, &record.queue);
        true
    }

    async fn pop(&self, queue: &str) -> EngineResult<Option<Delivery>> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let Some(queue_state) = state.queues.get_mut(queue) else {
            return Ok(None);
        };

        let expired = queue_state.reap(now);
        if expired > 0 {
            debug!(queue = %queue, count = expired, "Dropped expired items");
        }
        queue_state.promote(now);

        let Some(payload) = queue_state.visible.pop_front() else {
            return Ok(None);
        };
        queue_state.take_deadline(&payload);

        EngineMetrics::popped(BACKEND, queue);
        Ok(Some(Delivery::decode(payload)))
    }

    async fn delete(&self, item: &QueueItem) -> bool {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let State {
            registry, queues, ..
        } = &mut *state;

        let removed = registry.iter().any(|name| {
            queues
                .get_mut(name)
                .is_some_and(|queue_state| queue_state.delete_copy(item, now))
        });
        if removed {
            debug!(item_id = %item.id, "Deleted item");
        }
        removed
    }

    async fn release(&self, item: Option<&QueueItem>, queue: &str) -> Option<u64> {
        let Some(item) = item else {
            debug!(queue = %queue, "Nothing to release");
            return None;
        };

        let record = StoredRecord::new(item.with_push_options(&PushOptions::from(queue)));
        let payload = match record.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, item_id = %item.id, "Failed to encode item");
                EngineMetrics::error(BACKEND, "release", e.kind());
                return None;
            }
        };

        let mut state = self.state.lock();
        let queue_state = state.queue_mut(queue);
        queue_state.visible.push_back(payload);
        u64::try_from(queue_state.visible.len()).ok()
    }

    async fn queues(&self) -> BTreeSet<String> {
        self.state.lock().registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn engine_at(start: i64) -> (Arc<ManualClock>, MemoryEngine) {
        let clock = Arc::new(ManualClock::new(start));
        let engine = MemoryEngine::with_clock(clock.clone());
        (clock, engine)
    }

    async fn pop_item(engine: &MemoryEngine, queue: &str) -> Option<QueueItem> {
        engine.pop(queue).await.unwrap().and_then(Delivery::into_item)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let engine = MemoryEngine::new();
        let first = QueueItem::new("a");
        let second = QueueItem::new("b");

        assert!(engine.push(&first, PushOptions::default()).await);
        assert!(engine.push(&second, PushOptions::default()).await);

        assert_eq!(pop_item(&engine, "default").await, Some(first));
        assert_eq!(pop_item(&engine, "default").await, Some(second));
        assert_eq!(pop_item(&engine, "default").await, None);
    }

    #[tokio::test]
    async fn test_pop_unknown_queue_is_empty() {
        let engine = MemoryEngine::new();
        assert!(engine.pop("nowhere").await.unwrap().is_none());
        assert!(engine.queues().await.is_empty());
    }

    #[tokio::test]
    async fn test_push_options_route_queue() {
        let engine = MemoryEngine::new();
        let item = QueueItem::new("a");
        assert!(engine.push(&item, "mail".into()).await);

        let popped = pop_item(&engine, "mail").await.unwrap();
        assert_eq!(popped.queue, "mail");
        assert_eq!(popped.id, item.id);
        assert!(pop_item(&engine, "default").await.is_none());
    }

    #[tokio::test]
    async fn test_delay_hides_item_until_due() {
        let (clock, engine) = engine_at(10_000);
        let item = QueueItem::new("a").delay(Duration::from_secs(1));
        assert!(engine.push(&item, PushOptions::default()).await);

        assert!(pop_item(&engine, "default").await.is_none());
        clock.advance(Duration::from_millis(999));
        assert!(pop_item(&engine, "default").await.is_none());
        clock.advance(Duration::from_millis(1));
        assert_eq!(pop_item(&engine, "default").await.map(|i| i.id), Some(item.id));
    }

    #[tokio::test]
    async fn test_delayed_items_promote_in_deadline_order() {
        let (clock, engine) = engine_at(0);
        let late = QueueItem::new("late").delay(Duration::from_secs(5));
        let early = QueueItem::new("early").delay(Duration::from_secs(2));
        engine.push(&late, PushOptions::default()).await;
        engine.push(&early, PushOptions::default()).await;

        clock.advance(Duration::from_secs(10));
        assert_eq!(pop_item(&engine, "default").await.map(|i| i.id), Some(early.id));
        assert_eq!(pop_item(&engine, "default").await.map(|i| i.id), Some(late.id));
    }

    #[tokio::test]
    async fn test_expired_item_is_never_delivered() {
        let (clock, engine) = engine_at(0);
        let doomed = QueueItem::new("a").expires_in(Duration::from_secs(1));
        let kept = QueueItem::new("b");
        engine.push(&doomed, PushOptions::default()).await;
        engine.push(&kept, PushOptions::default()).await;

        clock.advance(Duration::from_secs(1));
        assert_eq!(pop_item(&engine, "default").await.map(|i| i.id), Some(kept.id));
        assert!(pop_item(&engine, "default").await.is_none());
        assert!(engine.is_empty("default"));
    }

    #[tokio::test]
    async fn test_item_popped_before_deadline() {
        let (clock, engine) = engine_at(0);
        let item = QueueItem::new("a").expires_in(Duration::from_secs(5));
        engine.push(&item, PushOptions::default()).await;

        clock.advance(Duration::from_secs(4));
        assert!(pop_item(&engine, "default").await.is_some());
    }

    #[tokio::test]
    async fn test_delayed_item_expiring_before_visible() {
        let (clock, engine) = engine_at(0);
        let item = QueueItem::new("a")
            .delay(Duration::from_secs(10))
            .expires_in(Duration::from_secs(5));
        engine.push(&item, PushOptions::default()).await;

        clock.advance(Duration::from_secs(20));
        assert!(pop_item(&engine, "default").await.is_none());
        assert!(engine.is_empty("default"));
    }

    #[tokio::test]
    async fn test_delete_removes_exactly_one_record() {
        let engine = MemoryEngine::new();
        let item = QueueItem::new("a");
        let other = QueueItem::new("a");
        engine.push(&item, PushOptions::default()).await;
        engine.push(&other, PushOptions::default()).await;

        assert!(engine.delete(&item).await);
        assert!(!engine.delete(&item).await);
        assert_eq!(pop_item(&engine, "default").await, Some(other));
    }

    #[tokio::test]
    async fn test_delete_finds_delayed_record() {
        let (_clock, engine) = engine_at(0);
        let record = QueueItem::new("a").delay(Duration::from_secs(30));
        engine.push(&record, PushOptions::default()).await;

        assert!(engine.delete(&record).await);
        assert!(engine.is_empty("default"));
    }

    #[tokio::test]
    async fn test_delete_after_expiry_is_false() {
        let (clock, engine) = engine_at(0);
        let record = QueueItem::new("a").expires_in(Duration::from_secs(1));
        engine.push(&record, PushOptions::default()).await;

        clock.advance(Duration::from_secs(2));
        assert!(!engine.delete(&record).await);
        assert!(engine.is_empty("default"));
    }

    #[tokio::test]
    async fn test_delete_follows_push_routing() {
        let engine = MemoryEngine::new();
        let item = QueueItem::new("a");
        engine.push(&item, "other".into()).await;

        assert!(engine.delete(&item).await);
        assert!(engine.is_empty("other"));
        assert!(!engine.delete(&item).await);
    }

    #[tokio::test]
    async fn test_released_copy_names_its_queue_and_deletes() {
        let engine = MemoryEngine::new();
        let item = QueueItem::new("a");

        engine.release(Some(&item), "retry").await;
        let popped = pop_item(&engine, "retry").await.unwrap();
        assert_eq!(popped.queue, "retry");
        assert!(popped.same_payload(&item));

        engine.release(Some(&item), "retry").await;
        assert!(engine.delete(&item).await);
        assert!(engine.is_empty("retry"));
    }

    #[tokio::test]
    async fn test_duplicate_pushes_keep_their_own_windows() {
        let (clock, engine) = engine_at(0);
        let item = QueueItem::new("a").expires_in(Duration::from_secs(5));
        engine.push(&item, PushOptions::default()).await;
        engine.push(&item, PushOptions::default()).await;

        clock.advance(Duration::from_secs(1));
        assert!(pop_item(&engine, "default").await.is_some());
        clock.advance(Duration::from_secs(9));
        assert!(pop_item(&engine, "default").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_skips_expired_copy_for_live_one() {
        let (clock, engine) = engine_at(0);
        let item = QueueItem::new("a");
        engine.push(&item, PushOptions::new().expires_in(Duration::from_secs(1))).await;
        engine.push(&item, PushOptions::default()).await;

        clock.advance(Duration::from_secs(2));
        assert!(engine.delete(&item).await);
        assert!(engine.is_empty("default"));
    }

    #[tokio::test]
    async fn test_release_appends_and_registers() {
        let engine = MemoryEngine::new();
        let item = QueueItem::new("a");
        engine.push(&item, PushOptions::default()).await;

        assert_eq!(engine.release(Some(&item), "retry").await, Some(1));
        assert_eq!(engine.release(Some(&item), "retry").await, Some(2));
        assert_eq!(engine.release(None, "retry").await, None);
        assert!(engine.queues().await.contains("retry"));
    }

    #[tokio::test]
    async fn test_queues_survive_draining() {
        let engine = MemoryEngine::new();
        engine.push(&QueueItem::new("a"), PushOptions::default()).await;
        engine.push(&QueueItem::new("a"), "other".into()).await;

        while pop_item(&engine, "default").await.is_some() {}
        let names: Vec<_> = engine.queues().await.into_iter().collect();
        assert_eq!(names, vec!["default".to_string(), "other".to_string()]);
    }

    #[tokio::test]
    async fn test_raw_records_surface_as_malformed() {
        let engine = MemoryEngine::new();
        engine.push_raw("default", "{\"nope\":1}");

        match engine.pop("default").await.unwrap() {
            Some(Delivery::Malformed { raw, .. }) => assert_eq!(raw, "{\"nope\":1}"),
            other => panic!("Expected malformed delivery, got {other:?}"),
        }
        assert!(engine.is_empty("default"));
    }
}
