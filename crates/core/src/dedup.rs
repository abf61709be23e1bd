//! Bounded filter over transport message identifiers.
//!
//! Identifiers live in the window until they age past the retention period or
//! are pushed out FIFO by newer ones once capacity is reached.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct DedupWindow {
    order: VecDeque<(String, Instant)>,
    seen: HashSet<String>,
}

#[derive(Debug)]
pub struct MessageDeduplicator {
    capacity: usize,
    retention: Duration,
    window: Mutex<DedupWindow>,
}

impl MessageDeduplicator {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            retention,
            window: Mutex::new(DedupWindow {
                order: VecDeque::with_capacity(capacity),
                seen: HashSet::with_capacity(capacity),
            }),
        }
    }

    /// Records `message_id` and reports whether it is new. The check and the
    /// insert happen under one lock, so concurrent duplicates see exactly one
    /// `true`.
    pub fn check_and_insert(&self, message_id: &str) -> bool {
        self.check_and_insert_at(message_id, Instant::now())
    }

    pub fn check_and_insert_at(&self, message_id: &str, now: Instant) -> bool {
        let mut window = match self.window.lock() {
            Ok(window) => window,
            Err(poisoned) => poisoned.into_inner(),
        };

        while let Some((oldest, seen_at)) = window.order.front() {
            if now.saturating_duration_since(*seen_at) < self.retention {
                break;
            }
            let oldest = oldest.clone();
            window.order.pop_front();
            window.seen.remove(&oldest);
        }

        if window.seen.contains(message_id) {
            return false;
        }

        if window.order.len() >= self.capacity {
            if let Some((evicted, _)) = window.order.pop_front() {
                window.seen.remove(&evicted);
            }
        }
        window.order.push_back((message_id.to_string(), now));
        window.seen.insert(message_id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        match self.window.lock() {
            Ok(window) => window.order.len(),
            Err(poisoned) => poisoned.into_inner().order.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::MessageDeduplicator;

    #[test]
    fn second_delivery_within_window_is_suppressed() {
        let dedup = MessageDeduplicator::new(16, Duration::from_secs(60));

        assert!(dedup.check_and_insert("wamid-1"));
        assert!(!dedup.check_and_insert("wamid-1"));
        assert!(dedup.check_and_insert("wamid-2"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let dedup = MessageDeduplicator::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert!(dedup.check_and_insert_at("a", now));
        assert!(dedup.check_and_insert_at("b", now));
        assert!(dedup.check_and_insert_at("c", now));

        assert_eq!(dedup.len(), 2);
        assert!(!dedup.check_and_insert_at("b", now));
        assert!(!dedup.check_and_insert_at("c", now));
        assert!(dedup.check_and_insert_at("a", now), "oldest id was evicted");
    }

    #[test]
    fn identifiers_expire_after_retention() {
        let dedup = MessageDeduplicator::new(8, Duration::from_secs(10));
        let start = Instant::now();

        assert!(dedup.check_and_insert_at("a", start));
        assert!(!dedup.check_and_insert_at("a", start + Duration::from_secs(9)));
        assert!(dedup.check_and_insert_at("a", start + Duration::from_secs(11)));
    }

    #[test]
    fn concurrent_duplicates_pass_exactly_once() {
        let dedup = Arc::new(MessageDeduplicator::new(64, Duration::from_secs(60)));
        let handles = (0..8)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || dedup.check_and_insert("same-id"))
            })
            .collect::<Vec<_>>();

        let accepted = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}
