//! Keyed resource cache with staleness tracking and a stale-response guard.
//!
//! Every resource type gets its own [`ResourceCache`], keyed by
//! [`QueryKey`]. The cache never talks to the network itself: callers either
//! drive fetches explicitly through [`ResourceCache::begin_fetch`] /
//! [`ResourceCache::complete_fetch`], or hand a fetch closure to
//! [`ResourceCache::resolve`] and let the cache decide whether the network
//! is needed at all.
//!
//! # Guarantees
//!
//! - Reads never block on the network; [`ResourceCache::read`] returns the
//!   best currently-known value plus a staleness flag.
//! - Out-of-order completions cannot clobber newer data: each fetch carries
//!   a [`FetchToken`], and only the most recently issued token for a key is
//!   accepted. Anything older is discarded on arrival.
//! - Concurrent resolutions of one key share a single fetch; waiters are
//!   woken when it completes and observe its outcome.
//! - A failed fetch records the error but keeps the previous value, so a
//!   consumer can keep showing data while surfacing the failure.
//! - [`ResourceCache::invalidate`] marks an entry stale immediately and
//!   revokes the token of any in-flight fetch, so a response that was
//!   already on the wire cannot mask the invalidation.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vmoquery::{QueryKey, ResourceCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache: ResourceCache<Vec<String>> =
//!         ResourceCache::new("names", Duration::from_secs(30));
//!     let key = QueryKey::new("names");
//!
//!     // First resolution fetches; later ones inside the staleness window
//!     // are served from the cache.
//!     let names = cache
//!         .resolve(&key, || async { Ok::<_, String>(vec!["front door".to_string()]) })
//!         .await?;
//!     assert_eq!(names.len(), 1);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::error::{QueryError, Result};
use crate::key::QueryKey;

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// No fetch has ever been issued for this key
    Idle,
    /// The first fetch is in flight and no data has arrived yet
    Loading,
    /// The last applied fetch succeeded
    Success,
    /// The last applied fetch failed
    Error,
}

impl FetchStatus {
    /// Stable lowercase name, for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Idle => "idle",
            FetchStatus::Loading => "loading",
            FetchStatus::Success => "success",
            FetchStatus::Error => "error",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token identifying one issued fetch.
///
/// A completion is applied only if it carries the token most recently
/// issued for its key; everything older is discarded. This is what keeps a
/// slow response from overwriting the result of a fetch issued after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchToken {
    seq: u64,
}

/// Read-side view of a cache entry.
///
/// `value` is the latest successfully fetched data, kept even when a later
/// fetch failed (`error` carries the failure in that case).
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    /// Latest successfully fetched value, if any
    pub value: Option<T>,
    /// Entry lifecycle state
    pub status: FetchStatus,
    /// When the last fetch completed (success or failure)
    pub fetched_at: Option<Instant>,
    /// Message of the last failed fetch, cleared by the next success
    pub error: Option<String>,
    /// Whether the entry needs a re-fetch (never fetched, expired window,
    /// or explicitly invalidated)
    pub is_stale: bool,
    /// Whether a fetch for this key is currently in flight
    pub is_fetching: bool,
}

impl<T> Snapshot<T> {
    /// Time elapsed since the last completed fetch
    pub fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|at| at.elapsed())
    }
}

struct Entry<T> {
    value: Option<T>,
    error: Option<String>,
    status: FetchStatus,
    fetched_at: Option<Instant>,
    invalidated: bool,
    /// Sequence source for fetch tokens
    next_seq: u64,
    /// Token of the in-flight fetch whose completion will be accepted
    accepted: Option<u64>,
    /// Bumped on every applied completion, invalidation, or released claim
    epoch: u64,
    done_tx: watch::Sender<u64>,
}

impl<T> Entry<T> {
    fn new() -> Self {
        let (done_tx, _) = watch::channel(0);
        Self {
            value: None,
            error: None,
            status: FetchStatus::Idle,
            fetched_at: None,
            invalidated: false,
            next_seq: 0,
            accepted: None,
            epoch: 0,
            done_tx,
        }
    }

    fn is_fresh(&self, stale_after: Duration) -> bool {
        if self.invalidated || self.status != FetchStatus::Success {
            return false;
        }
        match self.fetched_at {
            Some(at) => at.elapsed() <= stale_after,
            None => false,
        }
    }

    /// Issue a new fetch token and make it the accepted one
    fn claim(&mut self) -> FetchToken {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.accepted = Some(seq);
        if self.status == FetchStatus::Idle {
            self.status = FetchStatus::Loading;
        }
        FetchToken { seq }
    }

    /// Wake everything waiting on this entry
    fn bump(&mut self) {
        self.epoch += 1;
        self.done_tx.send_replace(self.epoch);
    }
}

struct CacheInner<T> {
    name: &'static str,
    stale_after: Duration,
    entries: Mutex<HashMap<QueryKey, Entry<T>>>,
}

/// Keyed cache for one resource type.
///
/// Cheap to clone (`Arc` interior) and safe to share across tasks. The
/// internal lock is never held across an await point.
pub struct ResourceCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Next action for one turn of the resolve loop, decided under the lock
enum Step<T> {
    Ready(Result<T>),
    Join(watch::Receiver<u64>),
    Claim(FetchToken),
}

/// Revokes a claimed fetch if its owner disappears before completing it,
/// so waiters are not stranded behind a fetch that will never finish.
struct ClaimGuard<T> {
    inner: Arc<CacheInner<T>>,
    key: QueryKey,
    seq: u64,
    armed: bool,
}

impl<T> ClaimGuard<T> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for ClaimGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&self.key) {
            if entry.accepted == Some(self.seq) {
                entry.accepted = None;
                entry.bump();
                tracing::debug!(
                    cache = self.inner.name,
                    key = %self.key,
                    "released abandoned fetch claim"
                );
            }
        }
    }
}

impl<T: Clone> ResourceCache<T> {
    /// Create a cache for one resource type.
    ///
    /// `name` labels log lines; `stale_after` is the window after a
    /// successful fetch during which the entry is served without hitting
    /// the network again.
    pub fn new(name: &'static str, stale_after: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                name,
                stale_after,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Staleness window this cache was built with
    pub fn stale_after(&self) -> Duration {
        self.inner.stale_after
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, in-flight bookkeeping included
    pub fn clear(&self) {
        self.inner.entries.lock().unwrap().clear();
        tracing::debug!(cache = self.inner.name, "cleared cache");
    }

    /// Non-blocking peek at an entry.
    ///
    /// Reading a key that was never fetched observes an `Idle` snapshot
    /// with no value (and materializes the entry).
    pub fn read(&self, key: &QueryKey) -> Snapshot<T> {
        let mut entries = self.inner.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        Snapshot {
            value: entry.value.clone(),
            status: entry.status,
            fetched_at: entry.fetched_at,
            error: entry.error.clone(),
            is_stale: !entry.is_fresh(self.inner.stale_after),
            is_fetching: entry.accepted.is_some(),
        }
    }

    /// Register a new fetch for `key` and return its token.
    ///
    /// Returns `None` while another fetch for the key is in flight: callers
    /// that poll opportunistically simply skip their turn instead of
    /// issuing a duplicate request.
    pub fn begin_fetch(&self, key: &QueryKey) -> Option<FetchToken> {
        let mut entries = self.inner.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        if entry.accepted.is_some() {
            tracing::debug!(cache = self.inner.name, key = %key, "fetch already in flight");
            return None;
        }
        let token = entry.claim();
        tracing::debug!(cache = self.inner.name, key = %key, seq = token.seq, "fetch started");
        Some(token)
    }

    /// Apply the outcome of a fetch.
    ///
    /// The outcome is applied only if `token` is still the accepted token
    /// for the key; a completion that was superseded by a newer fetch or by
    /// an invalidation is discarded. Returns whether it was applied.
    ///
    /// A successful completion stores the value, stamps `fetched_at` and
    /// clears any invalidation. A failed completion records the error but
    /// keeps the previous value.
    pub fn complete_fetch(
        &self,
        key: &QueryKey,
        token: FetchToken,
        outcome: std::result::Result<T, String>,
    ) -> bool {
        let mut entries = self.inner.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            tracing::debug!(cache = self.inner.name, key = %key, "completion for unknown entry discarded");
            return false;
        };
        if entry.accepted != Some(token.seq) {
            tracing::debug!(
                cache = self.inner.name,
                key = %key,
                seq = token.seq,
                "discarded superseded fetch completion"
            );
            return false;
        }
        entry.accepted = None;
        entry.fetched_at = Some(Instant::now());
        match outcome {
            Ok(value) => {
                entry.value = Some(value);
                entry.error = None;
                entry.status = FetchStatus::Success;
                entry.invalidated = false;
                tracing::debug!(cache = self.inner.name, key = %key, "fetch applied");
            }
            Err(message) => {
                tracing::debug!(cache = self.inner.name, key = %key, error = %message, "fetch failed");
                entry.error = Some(message);
                entry.status = FetchStatus::Error;
            }
        }
        entry.bump();
        true
    }

    /// Mark an entry stale and force its next resolution to re-fetch.
    ///
    /// Any in-flight fetch for the key has its token revoked, so a late
    /// completion cannot re-install data that predates the invalidation.
    /// Invalidating a key that was never read is a no-op.
    pub fn invalidate(&self, key: &QueryKey) {
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.invalidated = true;
            if entry.accepted.take().is_some() {
                tracing::debug!(cache = self.inner.name, key = %key, "revoked in-flight fetch");
            }
            entry.bump();
            tracing::debug!(cache = self.inner.name, key = %key, "invalidated");
        }
    }

    /// Invalidate every entry in the cache
    pub fn invalidate_all(&self) {
        let mut entries = self.inner.entries.lock().unwrap();
        for entry in entries.values_mut() {
            entry.invalidated = true;
            entry.accepted.take();
            entry.bump();
        }
        tracing::debug!(cache = self.inner.name, entries = entries.len(), "invalidated all entries");
    }

    /// Read-through resolution.
    ///
    /// Returns the cached value when fresh. Otherwise joins the in-flight
    /// fetch for the key if there is one (waiting for its completion rather
    /// than issuing a duplicate), or claims a token, runs `fetch`, and
    /// applies the result. A resolver whose own fetch was superseded loops
    /// and observes the newer outcome instead.
    ///
    /// The fetch closure may be invoked more than once if the entry is
    /// invalidated while this resolution is in progress.
    pub async fn resolve<F, Fut, E>(&self, key: &QueryKey, fetch: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let mut joined = false;
        loop {
            let step = {
                let mut entries = self.inner.entries.lock().unwrap();
                let entry = entries.entry(key.clone()).or_insert_with(Entry::new);

                if entry.accepted.is_some() {
                    let mut rx = entry.done_tx.subscribe();
                    // Mark the current epoch as seen while still under the
                    // lock, so a completion between unlock and await cannot
                    // be missed.
                    let _ = rx.borrow_and_update();
                    Step::Join(rx)
                } else if joined {
                    // We waited on a fetch; hand back its applied outcome
                    // unless an invalidation demands a fresh claim.
                    if entry.invalidated {
                        Step::Claim(entry.claim())
                    } else {
                        match (entry.status, entry.value.clone(), entry.error.clone()) {
                            (FetchStatus::Success, Some(value), _) => Step::Ready(Ok(value)),
                            (FetchStatus::Error, _, Some(message)) => {
                                Step::Ready(Err(QueryError::Fetch(message)))
                            }
                            _ => Step::Claim(entry.claim()),
                        }
                    }
                } else if entry.is_fresh(self.inner.stale_after) {
                    match entry.value.clone() {
                        Some(value) => Step::Ready(Ok(value)),
                        None => Step::Claim(entry.claim()),
                    }
                } else {
                    Step::Claim(entry.claim())
                }
            };

            match step {
                Step::Ready(outcome) => return outcome,
                Step::Join(mut rx) => {
                    joined = true;
                    // Err means the entry (and its sender) was cleared;
                    // loop and re-evaluate either way.
                    let _ = rx.changed().await;
                }
                Step::Claim(token) => {
                    let guard = ClaimGuard {
                        inner: Arc::clone(&self.inner),
                        key: key.clone(),
                        seq: token.seq,
                        armed: true,
                    };
                    match fetch().await {
                        Ok(value) => {
                            let applied = self.complete_fetch(key, token, Ok(value.clone()));
                            guard.disarm();
                            if applied {
                                return Ok(value);
                            }
                        }
                        Err(err) => {
                            let message = err.to_string();
                            let applied = self.complete_fetch(key, token, Err(message.clone()));
                            guard.disarm();
                            if applied {
                                return Err(QueryError::Fetch(message));
                            }
                        }
                    }
                    // Superseded between claim and completion; the entry
                    // now belongs to a newer fetch (or an invalidation).
                    joined = true;
                }
            }
        }
    }
}

impl<T> fmt::Debug for ResourceCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.lock().unwrap();
        f.debug_struct("ResourceCache")
            .field("name", &self.inner.name)
            .field("stale_after", &self.inner.stale_after)
            .field("entries", &entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LONG: Duration = Duration::from_secs(3600);

    fn key() -> QueryKey {
        QueryKey::new("streams")
    }

    #[tokio::test]
    async fn test_read_absent_key_is_idle() {
        let cache: ResourceCache<Vec<u32>> = ResourceCache::new("test", LONG);
        let snap = cache.read(&key());
        assert_eq!(snap.status, FetchStatus::Idle);
        assert!(snap.value.is_none());
        assert!(snap.is_stale);
        assert!(!snap.is_fetching);
    }

    #[tokio::test]
    async fn test_begin_complete_roundtrip() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", LONG);
        let k = key();

        let token = cache.begin_fetch(&k).unwrap();
        let snap = cache.read(&k);
        assert_eq!(snap.status, FetchStatus::Loading);
        assert!(snap.is_fetching);

        assert!(cache.complete_fetch(&k, token, Ok(7)));
        let snap = cache.read(&k);
        assert_eq!(snap.status, FetchStatus::Success);
        assert_eq!(snap.value, Some(7));
        assert!(!snap.is_stale);
        assert!(!snap.is_fetching);
        assert!(snap.fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_in_flight_fetch_deduplicated() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", LONG);
        let k = key();

        let first = cache.begin_fetch(&k);
        assert!(first.is_some());
        assert!(cache.begin_fetch(&k).is_none());

        // Completing frees the slot for the next fetch
        assert!(cache.complete_fetch(&k, first.unwrap(), Ok(1)));
        assert!(cache.begin_fetch(&k).is_some());
    }

    #[tokio::test]
    async fn test_superseded_completion_discarded() {
        let cache: ResourceCache<&'static str> = ResourceCache::new("test", LONG);
        let k = key();

        // Fetch A goes out, then the entry is invalidated and fetch B goes
        // out. B completes first; A's completion arrives late.
        let token_a = cache.begin_fetch(&k).unwrap();
        cache.invalidate(&k);
        let token_b = cache.begin_fetch(&k).unwrap();

        assert!(cache.complete_fetch(&k, token_b, Ok("fresh")));
        assert!(!cache.complete_fetch(&k, token_a, Ok("stale")));

        let snap = cache.read(&k);
        assert_eq!(snap.value, Some("fresh"));
        assert_eq!(snap.status, FetchStatus::Success);
    }

    #[tokio::test]
    async fn test_resolve_serves_fresh_value_without_refetch() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", LONG);
        let k = key();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .resolve(&k, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", LONG);
        let k = key();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
            Ok::<_, String>(n)
        };

        assert_eq!(cache.resolve(&k, fetch).await.unwrap(), 0);
        // Within the staleness window: cached
        assert_eq!(cache.resolve(&k, fetch).await.unwrap(), 0);

        cache.invalidate(&k);
        assert!(cache.read(&k).is_stale);

        // Invalidation re-fetches even though the window has not elapsed
        assert_eq!(cache.resolve(&k, fetch).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.read(&k).is_stale);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_value() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", LONG);
        let k = key();

        cache
            .resolve(&k, || async { Ok::<_, String>(5) })
            .await
            .unwrap();

        cache.invalidate(&k);
        let err = cache
            .resolve(&k, || async { Err::<u32, _>("backend down".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::Fetch("backend down".to_string()));

        let snap = cache.read(&k);
        assert_eq!(snap.value, Some(5));
        assert_eq!(snap.status, FetchStatus::Error);
        assert_eq!(snap.error.as_deref(), Some("backend down"));
        assert!(snap.is_stale);
    }

    #[tokio::test]
    async fn test_error_entry_retries_on_next_resolve() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", LONG);
        let k = key();
        let calls = AtomicUsize::new(0);

        let first = cache
            .resolve(&k, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>("boom".to_string())
            })
            .await;
        assert!(first.is_err());

        let second = cache
            .resolve(&k, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(9)
            })
            .await;
        assert_eq!(second.unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_resolvers_share_one_fetch() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", LONG);
        let k = key();
        let calls = AtomicUsize::new(0);

        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(11)
        };

        let (a, b) = tokio::join!(cache.resolve(&k, fetch), cache.resolve(&k, fetch));
        assert_eq!(a.unwrap(), 11);
        assert_eq!(b.unwrap(), 11);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiters_observe_shared_failure() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", LONG);
        let k = key();
        let calls = AtomicUsize::new(0);

        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<u32, _>("unreachable host".to_string())
        };

        let (a, b) = tokio::join!(cache.resolve(&k, fetch), cache.resolve(&k, fetch));
        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_window_refetches() {
        let cache: ResourceCache<u32> = ResourceCache::new("test", Duration::ZERO);
        let k = key();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
            Ok::<_, String>(n)
        };

        assert_eq!(cache.resolve(&k, fetch).await.unwrap(), 0);
        // Zero-length window: every resolution fetches again
        assert_eq!(cache.resolve(&k, fetch).await.unwrap(), 1);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(FetchStatus::Idle.to_string(), "idle");
        assert_eq!(FetchStatus::Success.as_str(), "success");
    }
}
