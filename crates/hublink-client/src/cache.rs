//! Per-service cache of events that could not be published.
//!
//! Each service gets a bounded FIFO queue, created on first insert. A full
//! queue rejects new entries; nothing already queued is ever evicted.
//! Entries carry a sequence number so replay can remove exactly the entries
//! it published, even while new ones are appended.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hublink_core::EventData;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// A cached event.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEvent {
    /// Insertion sequence, unique within one cache.
    pub seq: u64,
    pub data: EventData,
}

type Queue = Arc<Mutex<VecDeque<CachedEvent>>>;

/// Bounded per-service event queues.
#[derive(Debug)]
pub struct EventCache {
    capacity: usize,
    next_seq: AtomicU64,
    queues: RwLock<HashMap<String, Queue>>,
}

impl EventCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_seq: AtomicU64::new(0),
            queues: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn queue(&self, service_uuid: &str) -> Option<Queue> {
        self.queues.read().await.get(service_uuid).cloned()
    }

    async fn queue_or_create(&self, service_uuid: &str) -> Queue {
        if let Some(queue) = self.queue(service_uuid).await {
            return queue;
        }
        self.queues
            .write()
            .await
            .entry(service_uuid.to_string())
            .or_default()
            .clone()
    }

    /// Appends an event; returns false if the service's queue is full.
    pub async fn push(&self, service_uuid: &str, data: EventData) -> bool {
        let queue = self.queue_or_create(service_uuid).await;
        let mut queue = queue.lock().await;
        if queue.len() >= self.capacity {
            warn!(
                service = %service_uuid,
                event_id = %data.event.id,
                capacity = self.capacity,
                "event cache full, dropping event"
            );
            return false;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(service = %service_uuid, event_id = %data.event.id, seq, "event cached");
        queue.push_back(CachedEvent { seq, data });
        true
    }

    /// Copy of a service's queue in insertion order.
    pub async fn snapshot(&self, service_uuid: &str) -> Vec<CachedEvent> {
        match self.queue(service_uuid).await {
            Some(queue) => queue.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Removes the entry with the given sequence number.
    pub async fn remove(&self, service_uuid: &str, seq: u64) -> bool {
        let Some(queue) = self.queue(service_uuid).await else {
            return false;
        };
        let mut queue = queue.lock().await;
        match queue.iter().position(|entry| entry.seq == seq) {
            Some(index) => queue.remove(index).is_some(),
            None => false,
        }
    }

    pub async fn len(&self, service_uuid: &str) -> usize {
        match self.queue(service_uuid).await {
            Some(queue) => queue.lock().await.len(),
            None => 0,
        }
    }

    /// Services that have at least one cached event.
    pub async fn services(&self) -> Vec<String> {
        let queues: Vec<(String, Queue)> = self
            .queues
            .read()
            .await
            .iter()
            .map(|(uuid, queue)| (uuid.clone(), queue.clone()))
            .collect();

        let mut services = Vec::new();
        for (uuid, queue) in queues {
            if !queue.lock().await.is_empty() {
                services.push(uuid);
            }
        }
        services.sort();
        services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hublink_core::Event;

    fn data(n: i64) -> EventData {
        EventData::builder(Event::without_data("tick", "Tick", ""))
            .value(n)
            .build()
    }

    fn values(entries: &[CachedEvent]) -> Vec<i64> {
        entries
            .iter()
            .map(|e| e.data.value.as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn full_queue_rejects_new_entries() {
        let cache = EventCache::new(3);
        for n in 0..3 {
            assert!(cache.push("svc", data(n)).await);
        }
        assert!(!cache.push("svc", data(3)).await);

        assert_eq!(cache.len("svc").await, 3);
        assert_eq!(values(&cache.snapshot("svc").await), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn queues_are_per_service() {
        let cache = EventCache::new(1);
        assert!(cache.push("a", data(1)).await);
        assert!(cache.push("b", data(2)).await);
        assert!(!cache.push("a", data(3)).await);
        assert_eq!(cache.services().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn remove_by_sequence() {
        let cache = EventCache::new(10);
        for n in 0..4 {
            cache.push("svc", data(n)).await;
        }
        let snapshot = cache.snapshot("svc").await;
        assert!(cache.remove("svc", snapshot[1].seq).await);
        assert!(cache.remove("svc", snapshot[3].seq).await);
        assert!(!cache.remove("svc", snapshot[3].seq).await);

        cache.push("svc", data(9)).await;
        assert_eq!(values(&cache.snapshot("svc").await), vec![0, 2, 9]);
    }

    #[tokio::test]
    async fn unknown_service_is_empty() {
        let cache = EventCache::new(10);
        assert_eq!(cache.len("nope").await, 0);
        assert!(cache.snapshot("nope").await.is_empty());
        assert!(!cache.remove("nope", 0).await);
        assert!(cache.services().await.is_empty());
    }
}
