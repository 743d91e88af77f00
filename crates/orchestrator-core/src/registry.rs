//! CorrelationRegistry: rendezvous between a waiting caller and the
//! workflow step that eventually produces its result.
//!
//! A caller registers a correlation id, hands the id to the workflow engine,
//! and waits on the returned [`WaitHandle`]. Whichever worker finishes the
//! process calls [`CorrelationRegistry::complete`] with the same id from any
//! task or thread.
//!
//! ## Winner rule
//!
//! Every pending entry lives in exactly one shard map. Completion, timeout
//! eviction, explicit removal and handle drop all race to *remove* the entry
//! under that shard's lock; whoever removes it decides the outcome. A
//! completion that finds nothing is a no-op reported through [`Completion`]
//! and the orphan counter, never an error.
//!
//! ```text
//!  caller                      registry shard            worker
//!  ──────                      ──────────────            ──────
//!  register(id) ─────────────▶ insert(id, slot)
//!  wait(handle, 30s) ···                                  complete(id, r)
//!        ▲                     remove(id) ◀────────────── (first remover wins)
//!        └──────────────────── slot.send(r)
//! ```
//!
//! Unrelated ids hash to independent shards, so registrations and
//! completions for different requests do not contend on one lock.

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::RegistryError;
use crate::types::CorrelationId;

/// Shard count used by [`CorrelationRegistry::new`].
pub const DEFAULT_SHARDS: usize = 16;

// ---------------------------------------------------------------------------
// Pending entries
// ---------------------------------------------------------------------------

/// A single-assignment result slot, owned by the registry until it is
/// completed or evicted.
struct PendingWaiter<T> {
    /// Distinguishes this registration from later ones that reuse the id.
    ticket: u64,
    slot: oneshot::Sender<T>,
    registered_at: Instant,
}

type Shard<T> = Mutex<HashMap<CorrelationId, PendingWaiter<T>>>;

/// What happened to a `complete` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The result was handed to the waiting caller.
    Delivered,
    /// Nothing was pending: never registered, already completed, timed out
    /// or removed.
    NoWaiter,
    /// The entry existed but its caller had already gone away.
    WaiterGone,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegistryCounters {
    registered: AtomicU64,
    delivered: AtomicU64,
    timed_out: AtomicU64,
    removed: AtomicU64,
    abandoned: AtomicU64,
    swept: AtomicU64,
    duplicates_rejected: AtomicU64,
    orphaned_completions: AtomicU64,
}

/// Registry statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub registered: u64,
    pub delivered: u64,
    pub timed_out: u64,
    pub removed: u64,
    /// Entries evicted because their handle was dropped without waiting.
    pub abandoned: u64,
    /// Entries evicted by `evict_older_than`.
    pub swept: u64,
    pub duplicates_rejected: u64,
    /// Completions that found no waiter.
    pub orphaned_completions: u64,
    pub pending: u64,
}

// ---------------------------------------------------------------------------
// CorrelationRegistry
// ---------------------------------------------------------------------------

/// Concurrent store of pending waiters keyed by correlation id.
pub struct CorrelationRegistry<T> {
    shards: Box<[Shard<T>]>,
    next_ticket: AtomicU64,
    counters: RegistryCounters,
}

impl<T> Default for CorrelationRegistry<T> {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl<T> CorrelationRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with `shards` independently locked maps (at least one).
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            next_ticket: AtomicU64::new(1),
            counters: RegistryCounters::default(),
        }
    }

    fn shard(&self, id: CorrelationId) -> MutexGuard<'_, HashMap<CorrelationId, PendingWaiter<T>>> {
        // Engine keys are often sequential; spread them with a Fibonacci hash.
        let mixed = id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        let index = (mixed as usize) % self.shards.len();
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a result slot for `id`.
    ///
    /// Rejects the registration if a waiter for `id` is still pending; the
    /// existing waiter is left untouched.
    pub fn register(self: &Arc<Self>, id: CorrelationId) -> Result<WaitHandle<T>, RegistryError> {
        let (slot, receiver) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        match self.shard(id).entry(id) {
            Entry::Occupied(_) => {
                self.counters
                    .duplicates_rejected
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    correlation_id = %id,
                    "CorrelationRegistry: rejected duplicate registration"
                );
                return Err(RegistryError::DuplicateCorrelationId(id));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingWaiter {
                    ticket,
                    slot,
                    registered_at: Instant::now(),
                });
            }
        }

        self.counters.registered.fetch_add(1, Ordering::Relaxed);
        tracing::info!(correlation_id = %id, "Registering waiter");

        Ok(WaitHandle {
            correlation_id: id,
            ticket,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Suspend until the handle's slot is assigned or `timeout` elapses.
    ///
    /// On timeout the entry is evicted and `Timeout` is returned. If a
    /// completion removed the entry between the timer firing and the
    /// eviction attempt, the completion wins and its result is returned.
    pub async fn wait(&self, mut handle: WaitHandle<T>, timeout: Duration) -> Result<T, RegistryError> {
        let id = handle.correlation_id;

        match tokio::time::timeout(timeout, &mut handle.receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(RegistryError::Cancelled(id)),
            Err(_elapsed) => {
                if handle.registry.evict(id, handle.ticket) {
                    self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        correlation_id = %id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Waiter timed out; entry evicted"
                    );
                    return Err(RegistryError::Timeout { id, timeout });
                }
                // Lost the removal race: the slot was either filled or dropped
                // by remove() under the shard lock, so try_recv is final.
                handle
                    .receiver
                    .try_recv()
                    .map_err(|_| RegistryError::Cancelled(id))
            }
        }
    }

    /// Assign the result for `id` if a waiter is still pending.
    ///
    /// Callable from any context, any number of times. Only the first call
    /// for a pending registration delivers; every other call is a no-op.
    pub fn complete(&self, id: CorrelationId, result: T) -> Completion {
        let mut shard = self.shard(id);
        let Some(waiter) = shard.remove(&id) else {
            drop(shard);
            self.counters
                .orphaned_completions
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                correlation_id = %id,
                "No waiter found for correlation id; completion discarded"
            );
            return Completion::NoWaiter;
        };

        // Sent under the shard lock so a concurrent timeout that fails to
        // evict always finds the value already in the slot.
        let waited = waiter.registered_at.elapsed();
        let sent = waiter.slot.send(result);
        drop(shard);

        match sent {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    correlation_id = %id,
                    waited_ms = waited.as_millis() as u64,
                    "Completed waiter"
                );
                Completion::Delivered
            }
            Err(_) => {
                self.counters
                    .orphaned_completions
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    correlation_id = %id,
                    "Waiter gone before completion; result discarded"
                );
                Completion::WaiterGone
            }
        }
    }

    /// Evict `id` without assigning a result. The waiter, if any, observes
    /// `Cancelled`. Idempotent; returns whether an entry was removed.
    pub fn remove(&self, id: CorrelationId) -> bool {
        let removed = self.shard(id).remove(&id).is_some();
        if removed {
            self.counters.removed.fetch_add(1, Ordering::Relaxed);
            tracing::info!(correlation_id = %id, "Removed waiter");
        }
        removed
    }

    /// Evict every entry registered more than `max_age` ago. Returns the
    /// number evicted.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        for shard in self.shards.iter() {
            let mut map = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = map.len();
            map.retain(|_, waiter| now.duration_since(waiter.registered_at) <= max_age);
            evicted += before - map.len();
        }
        if evicted > 0 {
            self.counters
                .swept
                .fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::warn!(
                evicted,
                max_age_ms = max_age.as_millis() as u64,
                "Swept stale waiters"
            );
        }
        evicted
    }

    /// Whether a waiter for `id` is pending.
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.shard(id).contains_key(&id)
    }

    /// Number of pending waiters across all shards.
    pub fn pending(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn stats(&self) -> RegistryStats {
        let c = &self.counters;
        RegistryStats {
            registered: c.registered.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            removed: c.removed.load(Ordering::Relaxed),
            abandoned: c.abandoned.load(Ordering::Relaxed),
            swept: c.swept.load(Ordering::Relaxed),
            duplicates_rejected: c.duplicates_rejected.load(Ordering::Relaxed),
            orphaned_completions: c.orphaned_completions.load(Ordering::Relaxed),
            pending: self.pending() as u64,
        }
    }

    /// Remove `id` only if it is still the registration identified by `ticket`.
    fn evict(&self, id: CorrelationId, ticket: u64) -> bool {
        let mut shard = self.shard(id);
        match shard.get(&id) {
            Some(waiter) if waiter.ticket == ticket => {
                shard.remove(&id);
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// WaitHandle
// ---------------------------------------------------------------------------

/// Caller-side handle for one registration.
///
/// Dropping the handle without waiting evicts its entry.
pub struct WaitHandle<T> {
    correlation_id: CorrelationId,
    ticket: u64,
    receiver: oneshot::Receiver<T>,
    registry: Arc<CorrelationRegistry<T>>,
}

impl<T> WaitHandle<T> {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

impl<T> std::fmt::Debug for WaitHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitHandle")
            .field("correlation_id", &self.correlation_id)
            .field("ticket", &self.ticket)
            .finish()
    }
}

impl<T> Drop for WaitHandle<T> {
    fn drop(&mut self) {
        if self.registry.evict(self.correlation_id, self.ticket) {
            self.registry
                .counters
                .abandoned
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                correlation_id = %self.correlation_id,
                "Wait handle dropped; entry evicted"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
