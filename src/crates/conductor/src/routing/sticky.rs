//! Bounded session-to-worker cache

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Default)]
struct Sessions {
    workers: HashMap<String, String>,
    order: VecDeque<String>,
}

/// Maps session keys to the worker last chosen for them.
///
/// Holds at most `capacity` sessions; inserting a new session into a full
/// cache evicts the oldest insertion.
pub struct StickySessions {
    capacity: usize,
    inner: Mutex<Sessions>,
}

impl StickySessions {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Sessions::default()),
        }
    }

    /// Session key for a user and job type
    pub fn key(user_id: Option<&str>, job_type: &str) -> String {
        format!("{}:{}", user_id.unwrap_or("anonymous"), job_type)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().workers.get(key).cloned()
    }

    pub fn insert(&self, key: String, worker_id: String) {
        let mut sessions = self.inner.lock();
        if sessions.workers.insert(key.clone(), worker_id).is_some() {
            return;
        }
        sessions.order.push_back(key);
        while sessions.order.len() > self.capacity {
            if let Some(oldest) = sessions.order.pop_front() {
                sessions.workers.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let sessions = StickySessions::new(2);
        sessions.insert("a".into(), "w1".into());
        sessions.insert("b".into(), "w2".into());
        sessions.insert("a".into(), "w3".into());
        sessions.insert("c".into(), "w4".into());

        assert_eq!(sessions.len(), 2);
        assert!(sessions.get("a").is_none());
        assert_eq!(sessions.get("b").as_deref(), Some("w2"));
        assert_eq!(sessions.get("c").as_deref(), Some("w4"));
    }

    #[test]
    fn test_key_format() {
        assert_eq!(StickySessions::key(Some("u1"), "workflow"), "u1:workflow");
        assert_eq!(StickySessions::key(None, "export"), "anonymous:export");
    }
}
