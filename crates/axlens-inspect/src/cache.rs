//! Accessibility Snapshot Cache
//!
//! Maps live elements to their last-known accessibility data with lazy TTL
//! expiry, deduplicates concurrent fetches per element, tracks per-element
//! refetch timers, and holds the single global pending-inspection slot.
//!
//! Every element-keyed association stores a weak handle: the host document
//! owns its elements, and this cache must never be the reason one stays
//! alive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::future::{LocalBoxFuture, Shared};
use futures::FutureExt;

use axlens_core::{
    AccessibilityInfo, AccessibilityProvider, CancellationToken, ElementKey, ElementRef,
    FetchError, InspectorConfig, WeakElementRef,
};

/// Outcome of a provider fetch.
pub type FetchResult = Result<AccessibilityInfo, FetchError>;

/// Deduplicated handle to a fetch already in flight.
pub type InflightFetch = Shared<LocalBoxFuture<'static, FetchResult>>;

/// Handle for a scheduled refetch timer.
///
/// The host owns timer execution; the cache records which handle is current
/// for each element and cancels a predecessor when a new one is set.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    deadline: Instant,
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    pub fn new(deadline: Instant) -> Self {
        Self {
            deadline,
            cancelled: Rc::new(Cell::new(false)),
        }
    }

    pub fn after(delay: Duration) -> Self {
        Self::new(Instant::now() + delay)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Due and not cancelled.
    pub fn is_due(&self, now: Instant) -> bool {
        !self.is_cancelled() && now >= self.deadline
    }

    /// Whether two clones track the same timer.
    pub fn same_handle(&self, other: &TimerHandle) -> bool {
        Rc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// The single most-recent outstanding inspection request.
///
/// Starting a new one cancels the previous one: only what the user is
/// currently looking at is authoritative.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    element: ElementRef,
    token: CancellationToken,
    started: Instant,
}

impl PendingRequest {
    pub fn new(element: ElementRef) -> Self {
        Self {
            element,
            token: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    pub fn element(&self) -> &ElementRef {
        &self.element
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub inserts: u64,
    pub rejected_inserts: u64,
}

struct CacheEntry {
    element: WeakElementRef,
    info: AccessibilityInfo,
    stored_at: Instant,
    ttl: Duration,
}

struct InflightEntry {
    element: WeakElementRef,
    fetch: InflightFetch,
}

struct TimerEntry {
    element: WeakElementRef,
    handle: TimerHandle,
}

/// Element-keyed accessibility data cache.
pub struct AccessibilityCache {
    provider: Rc<dyn AccessibilityProvider>,
    entries: RefCell<HashMap<ElementKey, CacheEntry>>,
    inflight: RefCell<HashMap<ElementKey, InflightEntry>>,
    timers: RefCell<HashMap<ElementKey, TimerEntry>>,
    pending: RefCell<Option<PendingRequest>>,
    stats: Cell<CacheStats>,
    ttl: Duration,
}

impl AccessibilityCache {
    pub fn new(provider: Rc<dyn AccessibilityProvider>, config: &InspectorConfig) -> Self {
        Self {
            provider,
            entries: RefCell::new(HashMap::new()),
            inflight: RefCell::new(HashMap::new()),
            timers: RefCell::new(HashMap::new()),
            pending: RefCell::new(None),
            stats: Cell::new(CacheStats::default()),
            ttl: config.ttl(),
        }
    }

    /// Fresh snapshot for an element, or None on absence or expiry.
    ///
    /// Expiry is checked lazily, only here: an expired entry is evicted at
    /// lookup time, never by a background sweep.
    pub fn get_cached(&self, element: &ElementRef) -> Option<AccessibilityInfo> {
        self.lookup_fresh(element)
    }

    /// Store a snapshot, unless it is a placeholder.
    ///
    /// Empty results mean "not yet computed" and must not shadow a later
    /// real one.
    pub fn set_cached(&self, element: &ElementRef, info: AccessibilityInfo) {
        if !info.is_meaningful() {
            self.bump(|s| s.rejected_inserts += 1);
            tracing::debug!("ignoring placeholder snapshot for {}", element);
            return;
        }
        self.entries.borrow_mut().insert(
            element.key(),
            CacheEntry {
                element: element.downgrade(),
                info,
                stored_at: Instant::now(),
                ttl: self.ttl,
            },
        );
        self.bump(|s| s.inserts += 1);
    }

    /// Unconditional removal, used on invalidation.
    pub fn delete_cached(&self, element: &ElementRef) {
        self.entries.borrow_mut().remove(&element.key());
    }

    /// Whether a non-expired entry exists. Shares the expiry check with
    /// [`get_cached`](Self::get_cached).
    pub fn has_cached(&self, element: &ElementRef) -> bool {
        self.lookup_fresh(element).is_some()
    }

    fn lookup_fresh(&self, element: &ElementRef) -> Option<AccessibilityInfo> {
        let key = element.key();
        let mut entries = self.entries.borrow_mut();

        let mut evict = false;
        let mut expired = false;
        let mut found = None;
        if let Some(entry) = entries.get(&key) {
            // The key is only an address; re-check the entry still belongs
            // to this live element and not a reused allocation.
            let same = entry
                .element
                .upgrade()
                .is_some_and(|e| e.same_element(element));
            if !same {
                evict = true;
            } else if entry.stored_at.elapsed() > entry.ttl {
                evict = true;
                expired = true;
            } else {
                found = Some(entry.info.clone());
            }
        }
        if evict {
            entries.remove(&key);
        }

        match found {
            Some(info) => {
                self.bump(|s| s.hits += 1);
                Some(info)
            }
            None => {
                self.bump(|s| {
                    if expired {
                        s.expirations += 1;
                    }
                    s.misses += 1;
                });
                None
            }
        }
    }

    /// Pending fetch for an element, if one is in flight.
    pub fn inflight(&self, element: &ElementRef) -> Option<InflightFetch> {
        let mut inflight = self.inflight.borrow_mut();
        let key = element.key();

        let mut evict = false;
        let mut found = None;
        if let Some(entry) = inflight.get(&key) {
            if entry
                .element
                .upgrade()
                .is_some_and(|e| e.same_element(element))
            {
                found = Some(entry.fetch.clone());
            } else {
                evict = true;
            }
        }
        if evict {
            inflight.remove(&key);
        }
        found
    }

    /// Track a fetch as in flight. Last writer wins: an existing handle is
    /// overwritten so new callers await the most recent attempt.
    pub fn set_inflight(&self, element: &ElementRef, fetch: InflightFetch) {
        self.inflight.borrow_mut().insert(
            element.key(),
            InflightEntry {
                element: element.downgrade(),
                fetch,
            },
        );
    }

    /// Clear the in-flight marker for an element.
    pub fn delete_inflight(&self, element: &ElementRef) {
        self.inflight.borrow_mut().remove(&element.key());
    }

    fn delete_inflight_if_current(&self, element: &ElementRef, fetch: &InflightFetch) {
        let mut inflight = self.inflight.borrow_mut();
        let key = element.key();
        if inflight
            .get(&key)
            .is_some_and(|entry| entry.fetch.ptr_eq(fetch))
        {
            inflight.remove(&key);
        }
    }

    /// Record a refetch timer, cancelling any predecessor for the same
    /// element first (debounce, not queue).
    pub fn set_refetch_timer(&self, element: &ElementRef, handle: TimerHandle) {
        let mut timers = self.timers.borrow_mut();
        let key = element.key();
        if let Some(prev) = timers.remove(&key) {
            prev.handle.cancel();
        }
        timers.insert(
            key,
            TimerEntry {
                element: element.downgrade(),
                handle,
            },
        );
    }

    pub fn get_refetch_timer(&self, element: &ElementRef) -> Option<TimerHandle> {
        self.timers
            .borrow()
            .get(&element.key())
            .map(|t| t.handle.clone())
    }

    pub fn clear_refetch_timer(&self, element: &ElementRef) {
        if let Some(entry) = self.timers.borrow_mut().remove(&element.key()) {
            entry.handle.cancel();
        }
    }

    pub fn clear_all_refetch_timers(&self) {
        for (_, entry) in self.timers.borrow_mut().drain() {
            entry.handle.cancel();
        }
    }

    /// Remove and return the elements whose timers came due. Cancelled
    /// timers and timers for dead elements are swept silently.
    pub fn take_due_timers(&self, now: Instant) -> Vec<ElementRef> {
        let mut timers = self.timers.borrow_mut();
        let stale: Vec<ElementKey> = timers
            .iter()
            .filter(|(_, t)| t.handle.is_due(now) || t.handle.is_cancelled() || !t.element.is_alive())
            .map(|(key, _)| *key)
            .collect();

        let mut due = Vec::new();
        for key in stale {
            if let Some(entry) = timers.remove(&key) {
                if entry.handle.is_due(now) {
                    if let Some(element) = entry.element.upgrade() {
                        due.push(element);
                    }
                }
            }
        }
        due
    }

    /// Replace the global pending request, cancelling the previous one.
    pub fn set_pending_request(&self, request: PendingRequest) {
        let mut pending = self.pending.borrow_mut();
        if let Some(prev) = pending.take() {
            prev.token().cancel();
        }
        *pending = Some(request);
    }

    pub fn pending_request(&self) -> Option<PendingRequest> {
        self.pending.borrow().clone()
    }

    pub fn clear_pending_request(&self) {
        self.pending.borrow_mut().take();
    }

    /// Cached lookup with fetch-on-miss.
    ///
    /// A fresh entry returns without touching the provider. On miss or
    /// expiry the call attaches to an in-flight fetch for the element, or
    /// starts one.
    pub async fn lookup(&self, element: &ElementRef) -> FetchResult {
        if let Some(info) = self.get_cached(element) {
            return Ok(info);
        }
        self.fetch_and_store(element).await
    }

    /// Cache-bypassing refetch: drops any entry first, then fetches.
    /// Still deduplicates against a fetch already in flight.
    pub async fn force_refresh(&self, element: &ElementRef) -> FetchResult {
        self.delete_cached(element);
        self.fetch_and_store(element).await
    }

    async fn fetch_and_store(&self, element: &ElementRef) -> FetchResult {
        // Check-then-set in one synchronous turn: no await between seeing
        // no in-flight fetch and installing ours.
        let fetch = match self.inflight(element) {
            Some(existing) => existing,
            None => {
                let fetch = self.provider.fetch(element).shared();
                self.set_inflight(element, fetch.clone());
                fetch
            }
        };

        let result = fetch.clone().await;

        // Clear the marker whether the fetch resolved or rejected, and only
        // if it is still the tracked one; a later attempt may have replaced
        // it while we were suspended.
        self.delete_inflight_if_current(element, &fetch);

        match &result {
            Ok(info) => self.set_cached(element, info.clone()),
            Err(err) => {
                tracing::warn!("accessibility fetch failed for {}: {}", element, err);
            }
        }
        result
    }

    /// Disable tears down live async work only; entries are cheap to keep
    /// and make re-enabling instant.
    pub fn on_state_change(&self, enabled: bool) {
        if enabled {
            return;
        }
        self.clear_all_refetch_timers();
        if let Some(prev) = self.pending.borrow_mut().take() {
            prev.token().cancel();
        }
        tracing::debug!("inspector disabled; live cache work torn down");
    }

    /// Full teardown: cancel all timers and the pending request. Entries
    /// and in-flight markers hold only weak handles and evaporate with
    /// their elements.
    pub fn cleanup(&self) {
        self.clear_all_refetch_timers();
        if let Some(prev) = self.pending.borrow_mut().take() {
            prev.token().cancel();
        }
    }

    /// Drop entries whose element is gone. Lookups already prune what they
    /// touch; this sweeps the rest.
    pub fn prune_dead(&self) {
        self.entries.borrow_mut().retain(|_, e| e.element.is_alive());
        self.inflight.borrow_mut().retain(|_, e| e.element.is_alive());
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

/// Coalesces rapid per-element update requests into one invocation after a
/// quiet period. Each call resets the element's timer; the last call in the
/// window wins.
pub struct DebouncedUpdate {
    cache: Rc<AccessibilityCache>,
    update: Box<dyn Fn(&ElementRef)>,
    delay: Duration,
}

impl DebouncedUpdate {
    pub fn new(
        cache: Rc<AccessibilityCache>,
        update: impl Fn(&ElementRef) + 'static,
        delay: Duration,
    ) -> Self {
        Self {
            cache,
            update: Box::new(update),
            delay,
        }
    }

    /// Request an update for an element, restarting its quiet window.
    pub fn call(&self, element: &ElementRef) {
        self.cache
            .set_refetch_timer(element, TimerHandle::after(self.delay));
    }

    /// Invoke the update for every element whose window elapsed.
    pub fn fire_due(&self, now: Instant) {
        for element in self.cache.take_due_timers(now) {
            (self.update)(&element);
        }
    }
}
