//! Rolling buffer of eligible stories.
//!
//! `SupplyBuffer` is a cheap handle; clones share the same buffer. Items are
//! admitted by refills (list ids, fetch details, filter, dedup, optionally
//! shuffle) and removed only by `take`/`take_random`. An identifier is
//! admitted at most once per buffer lifetime, so no story is ever served
//! twice.
//!
//! At most one refill runs at a time. The guard is an async mutex: the
//! background path (`maybe_refill`) only proceeds if it can grab the guard
//! immediately and carries it into the spawned task, while the blocking
//! paths (`take` when short, `refill_now`) wait for it, which also means
//! they wait for an in-flight refill instead of starting a second one.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{RefillOrder, SupplyConfig};
use crate::error::Result;
use crate::hn_client::ItemSource;
use crate::models::{now_unix, HackerNewsItem};

struct BufferState {
    items: VecDeque<HackerNewsItem>,
    /// Every id ever admitted, including ones already taken.
    admitted: HashSet<u64>,
    last_refill: Option<Instant>,
    rng: StdRng,
}

#[derive(Clone)]
pub struct SupplyBuffer {
    source: Arc<dyn ItemSource>,
    config: Arc<SupplyConfig>,
    state: Arc<Mutex<BufferState>>,
    refill_guard: Arc<tokio::sync::Mutex<()>>,
}

/// Recency and popularity filter applied when a story is admitted.
pub fn is_eligible(item: &HackerNewsItem, config: &SupplyConfig, now: i64) -> bool {
    item.age_secs(now) <= config.max_age_secs()
        && item.score >= config.min_score
        && (!config.require_url || item.url.as_deref().is_some_and(|url| !url.is_empty()))
}

impl SupplyBuffer {
    pub fn new(source: Arc<dyn ItemSource>, config: SupplyConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            source,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(BufferState {
                items: VecDeque::new(),
                admitted: HashSet::new(),
                last_refill: None,
                rng,
            })),
            refill_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // Never held across an await, and no invariant spans a panic point
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SupplyConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_refilling(&self) -> bool {
        self.refill_guard.try_lock().is_err()
    }

    /// Below the low-water mark, or the last successful refill is stale.
    pub fn needs_refill(&self) -> bool {
        let state = self.lock();
        state.items.len() < self.config.low_water_mark
            || state
                .last_refill
                .map_or(true, |at| at.elapsed() >= self.config.staleness())
    }

    /// Remove up to `n` stories from the front, in arrival order.
    pub async fn take(&self, n: usize) -> Vec<HackerNewsItem> {
        self.ensure_available(n).await;
        let taken: Vec<HackerNewsItem> = {
            let mut state = self.lock();
            let count = n.min(state.items.len());
            state.items.drain(..count).collect()
        };
        self.after_take(n, taken.len());
        taken
    }

    /// Like `take`, but each story comes from a random position.
    pub async fn take_random(&self, n: usize) -> Vec<HackerNewsItem> {
        self.ensure_available(n).await;
        let taken: Vec<HackerNewsItem> = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let mut picked = Vec::with_capacity(n);
            while picked.len() < n && !state.items.is_empty() {
                let index = state.rng.random_range(0..state.items.len());
                if let Some(item) = state.items.remove(index) {
                    picked.push(item);
                }
            }
            picked
        };
        self.after_take(n, taken.len());
        taken
    }

    /// Return unused stories to the front, keeping their order.
    pub fn put_back(&self, items: Vec<HackerNewsItem>) {
        let mut state = self.lock();
        for item in items.into_iter().rev() {
            state.items.push_front(item);
        }
    }

    async fn ensure_available(&self, n: usize) {
        if self.len() >= n {
            return;
        }
        // Waits out a background refill if one is running
        let _guard = self.refill_guard.lock().await;
        if self.len() >= n {
            return;
        }
        if let Err(err) = self.refill_locked().await {
            warn!(error = %err, wanted = n, "refill before take failed");
        }
    }

    fn after_take(&self, wanted: usize, got: usize) {
        if got < wanted {
            info!(wanted, got, "supply exhausted");
        }
        self.maybe_refill();
    }

    /// Start a background refill if the buffer is low or stale. Returns
    /// whether one was started; a request while a refill is in flight is
    /// dropped, not queued.
    pub fn maybe_refill(&self) -> bool {
        if !self.needs_refill() {
            return false;
        }
        let guard = match Arc::clone(&self.refill_guard).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("refill already in flight");
                return false;
            }
        };
        let buffer = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = buffer.refill_locked().await {
                warn!(error = %err, "background refill failed");
            }
        });
        true
    }

    /// Refill and wait for it, sharing the single-flight guard with
    /// background refills. Returns how many stories were admitted.
    pub async fn refill_now(&self) -> Result<usize> {
        let _guard = self.refill_guard.lock().await;
        self.refill_locked().await
    }

    // Caller holds `refill_guard`.
    async fn refill_locked(&self) -> Result<usize> {
        let ids = self.source.list_candidate_ids(self.config.batch_size).await?;
        let listed = ids.len();

        let fresh: Vec<u64> = {
            let state = self.lock();
            let mut in_batch = HashSet::new();
            ids.into_iter()
                .filter(|id| !state.admitted.contains(id) && in_batch.insert(*id))
                .collect()
        };

        let fetched = self.fetch_all(fresh).await;
        let fetched_count = fetched.len();
        let now = now_unix();

        let mut guard = self.lock();
        let state = &mut *guard;
        let mut admitted: Vec<HackerNewsItem> = fetched
            .into_iter()
            .filter(|item| is_eligible(item, &self.config, now))
            .filter(|item| state.admitted.insert(item.id))
            .collect();
        if self.config.order == RefillOrder::Shuffled {
            admitted.shuffle(&mut state.rng);
        }
        let count = admitted.len();
        state.items.extend(admitted);
        state.last_refill = Some(Instant::now());

        info!(
            listed,
            fetched = fetched_count,
            admitted = count,
            buffered = state.items.len(),
            "refill complete"
        );
        Ok(count)
    }

    /// Fetch details concurrently, bounded by `max_concurrent_fetches`.
    /// Failures are dropped; survivors keep the order of `ids`.
    async fn fetch_all(&self, ids: Vec<u64>) -> Vec<HackerNewsItem> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let mut tasks = JoinSet::new();
        for (position, id) in ids.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (position, id, source.fetch_details(id).await)
            });
        }

        let mut fetched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, _, Ok(item))) => fetched.push((position, item)),
                Ok((_, id, Err(err))) => {
                    debug!(item_id = id, error = %err, "dropping story after failed fetch")
                }
                Err(err) => warn!(error = %err, "detail fetch task failed"),
            }
        }
        fetched.sort_by_key(|(position, _)| *position);
        fetched.into_iter().map(|(_, item)| item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{story, FakeSource};
    use std::time::Duration;

    fn arrival_config() -> SupplyConfig {
        SupplyConfig {
            order: RefillOrder::Arrival,
            low_water_mark: 0,
            ..SupplyConfig::default()
        }
    }

    fn ids(items: &[HackerNewsItem]) -> Vec<u64> {
        items.iter().map(|item| item.id).collect()
    }

    #[tokio::test]
    async fn take_returns_arrival_order_and_refills_when_short() {
        let source = Arc::new(FakeSource::new((1..=5).map(|id| story(id, 20, 1))));
        let supply = SupplyBuffer::new(source.clone(), arrival_config());
        assert!(supply.is_empty());

        let first = supply.take(2).await;
        assert_eq!(ids(&first), vec![1, 2]);
        let second = supply.take(2).await;
        assert_eq!(ids(&second), vec![3, 4]);
        assert_eq!(supply.len(), 1);
        assert_eq!(source.list_calls(), 1);
    }

    #[tokio::test]
    async fn ids_are_never_served_twice_across_refills() {
        let source = Arc::new(FakeSource::new((1..=4).map(|id| story(id, 20, 1))));
        let supply = SupplyBuffer::new(source.clone(), arrival_config());

        let mut served = supply.take(3).await;
        // Upstream keeps listing 1..=4 and adds 5 and 6
        source.push(story(5, 30, 1));
        source.push(story(6, 30, 1));
        served.extend(supply.take(3).await);
        served.extend(supply.take(3).await);

        let mut seen = HashSet::new();
        for item in &served {
            assert!(seen.insert(item.id), "story {} served twice", item.id);
        }
        assert_eq!(seen.len(), 6);
    }

    #[tokio::test]
    async fn only_recent_popular_stories_are_admitted() {
        let source = Arc::new(FakeSource::new(vec![
            story(1, 8, 1),
            story(2, 7, 1),
            story(3, 500, 31),
            story(4, 100, 29),
        ]));
        let supply = SupplyBuffer::new(source, arrival_config());

        assert_eq!(supply.refill_now().await.unwrap(), 2);
        let taken = supply.take(10).await;
        assert_eq!(ids(&taken), vec![1, 4]);
        let now = now_unix();
        for item in &taken {
            assert!(is_eligible(item, supply.config(), now));
        }
    }

    #[tokio::test]
    async fn require_url_rejects_text_posts() {
        let mut ask = story(2, 50, 1);
        ask.url = None;
        let source = Arc::new(FakeSource::new(vec![story(1, 50, 1), ask]));
        let config = SupplyConfig {
            require_url: true,
            ..arrival_config()
        };
        let supply = SupplyBuffer::new(source, config);
        assert_eq!(ids(&supply.take(2).await), vec![1]);
    }

    #[tokio::test]
    async fn failed_detail_fetches_are_excluded() {
        let source = Arc::new(FakeSource::new((1..=4).map(|id| story(id, 20, 1))));
        source.fail_item(2);
        let supply = SupplyBuffer::new(source.clone(), arrival_config());

        assert_eq!(ids(&supply.take(4).await), vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn unreachable_upstream_yields_empty_take() {
        let source = Arc::new(FakeSource::new((1..=4).map(|id| story(id, 20, 1))));
        source.set_offline(true);
        let supply = SupplyBuffer::new(source.clone(), arrival_config());

        assert!(supply.take(2).await.is_empty());
        assert!(supply.refill_now().await.is_err());
        // Nothing was stamped, so the next call retries
        assert!(supply.needs_refill());

        source.set_offline(false);
        assert_eq!(supply.take(2).await.len(), 2);
    }

    #[tokio::test]
    async fn back_to_back_pairs_never_overlap() {
        let source = Arc::new(FakeSource::new((1..=40).map(|id| story(id, 20 + id as u32, 2))));
        let config = SupplyConfig {
            seed: Some(11),
            ..SupplyConfig::default()
        };
        let supply = SupplyBuffer::new(source, config);

        let a = supply.take(2).await;
        let b = supply.take(2).await;
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(a.iter().all(|x| b.iter().all(|y| x.id != y.id)));
    }

    #[tokio::test]
    async fn shuffled_refill_still_admits_every_eligible_story() {
        let source = Arc::new(FakeSource::new((1..=30).map(|id| story(id, 20, 1))));
        let config = SupplyConfig {
            seed: Some(3),
            low_water_mark: 0,
            ..SupplyConfig::default()
        };
        let supply = SupplyBuffer::new(source, config);
        let mut taken = ids(&supply.take(30).await);
        taken.sort_unstable();
        assert_eq!(taken, (1..=30).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn take_random_removes_distinct_items() {
        let source = Arc::new(FakeSource::new((1..=10).map(|id| story(id, 20, 1))));
        let config = SupplyConfig {
            seed: Some(5),
            ..arrival_config()
        };
        let supply = SupplyBuffer::new(source, config);
        supply.refill_now().await.unwrap();

        let pair = supply.take_random(2).await;
        assert_eq!(pair.len(), 2);
        assert_ne!(pair[0].id, pair[1].id);
        assert_eq!(supply.len(), 8);
        let rest = supply.take(8).await;
        assert!(rest.iter().all(|item| pair.iter().all(|p| p.id != item.id)));
    }

    #[tokio::test]
    async fn put_back_restores_front_order() {
        let source = Arc::new(FakeSource::new((1..=4).map(|id| story(id, 20, 1))));
        let supply = SupplyBuffer::new(source, arrival_config());
        let taken = supply.take(2).await;
        supply.put_back(taken);
        assert_eq!(ids(&supply.take(4).await), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn overlapping_refill_requests_coalesce() {
        let source = Arc::new(FakeSource::new((1..=4).map(|id| story(id, 20, 1))));
        let gate = source.hold_listing();
        let config = SupplyConfig {
            order: RefillOrder::Arrival,
            ..SupplyConfig::default()
        };
        let supply = SupplyBuffer::new(source.clone(), config);

        assert!(supply.maybe_refill());
        assert!(supply.is_refilling());
        assert!(!supply.maybe_refill());
        assert!(!supply.maybe_refill());

        gate.notify_one();
        // Short buffer: take waits for the in-flight refill rather than
        // issuing its own
        let pair = supply.take(2).await;
        assert_eq!(ids(&pair), vec![1, 2]);
        assert_eq!(source.list_calls(), 1);
    }

    #[tokio::test]
    async fn low_buffer_schedules_background_refill() {
        let source = Arc::new(FakeSource::new((1..=6).map(|id| story(id, 20, 1))));
        let config = SupplyConfig {
            order: RefillOrder::Arrival,
            low_water_mark: 4,
            ..SupplyConfig::default()
        };
        let supply = SupplyBuffer::new(source.clone(), config);
        supply.refill_now().await.unwrap();
        assert!(!supply.needs_refill());

        supply.take(3).await;
        assert!(supply.needs_refill());
        // take already fired the background refill; wait for it to land
        supply.refill_now().await.unwrap();
        assert!(source.list_calls() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_buffer_triggers_refill() {
        let source = Arc::new(FakeSource::new((1..=10).map(|id| story(id, 20, 1))));
        let config = SupplyConfig {
            low_water_mark: 2,
            staleness_secs: 300,
            ..arrival_config()
        };
        let supply = SupplyBuffer::new(source.clone(), config);
        supply.refill_now().await.unwrap();
        assert!(!supply.needs_refill());
        assert!(!supply.maybe_refill());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!supply.needs_refill());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(supply.needs_refill());
        assert!(supply.maybe_refill());

        supply.refill_now().await.unwrap();
        assert_eq!(source.list_calls(), 3);
    }
}
