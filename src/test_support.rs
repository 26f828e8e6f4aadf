//! In-memory item source for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{DuelError, Result};
use crate::hn_client::ItemSource;
use crate::models::{now_unix, HackerNewsItem};

/// A story `age_days` old (minus a minute, so boundary ages stay inside the
/// window while the test runs).
pub fn story(id: u64, score: u32, age_days: i64) -> HackerNewsItem {
    HackerNewsItem {
        id,
        title: format!("Story {}", id),
        url: Some(format!("https://example.com/{}", id)),
        by: format!("user{}", id),
        score,
        time: now_unix() - age_days * 86_400 + 60,
        comments_count: id as u32,
    }
}

#[derive(Default)]
pub struct FakeSource {
    order: Mutex<Vec<u64>>,
    items: Mutex<HashMap<u64, HackerNewsItem>>,
    failing: Mutex<HashSet<u64>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    list_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(stories: impl IntoIterator<Item = HackerNewsItem>) -> Self {
        let source = FakeSource::default();
        for item in stories {
            source.push(item);
        }
        source
    }

    /// Append a story to the end of the listing.
    pub fn push(&self, item: HackerNewsItem) {
        self.order.lock().unwrap().push(item.id);
        self.items.lock().unwrap().insert(item.id, item);
    }

    pub fn fail_item(&self, id: u64) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every listing wait for one `notify_one` on the returned handle.
    pub fn hold_listing(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Completed listing calls.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemSource for FakeSource {
    async fn list_candidate_ids(&self, limit: usize) -> Result<Vec<u64>> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(DuelError::source_unavailable("fake/list", "offline"));
        }
        let order = self.order.lock().unwrap();
        Ok(order.iter().copied().take(limit).collect())
    }

    async fn fetch_details(&self, id: u64) -> Result<HackerNewsItem> {
        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&id) {
            return Err(DuelError::source_unavailable(format!("fake/item/{}", id), "failed"));
        }
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DuelError::source_unavailable(format!("fake/item/{}", id), "missing"))
    }
}
