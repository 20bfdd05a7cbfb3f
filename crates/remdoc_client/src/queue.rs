//! Per-key mutual exclusion for session state.
//!
//! A [`SessionQueue`] hands out one [`Slot`] per key at a time. Waiters for
//! the same key are served in FIFO order; distinct keys never wait on each
//! other. A [`Transaction`] couples a slot with the value stored under its
//! key so that session state is only mutated by the slot holder.

use crate::deferred::Deferred;
use crate::error::{ClientError, ClientResult};
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

type Waiter = Box<dyn FnOnce() + Send>;
type Lanes = Arc<Mutex<HashMap<String, Lane>>>;

/// Shallow merge of a partial value into a stored one.
pub trait Merge {
    /// Overrides the fields present in `partial`.
    fn merge(&mut self, partial: Self);
}

/// The nonce pair held for one principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    /// Nonce the next proof is computed from.
    pub nonce: Option<String>,
    /// Nonce the next client nonce is computed from.
    pub next_nonce: Option<String>,
}

impl SessionRecord {
    /// Creates a record holding both nonces.
    pub fn new(nonce: impl Into<String>, next_nonce: impl Into<String>) -> Self {
        Self {
            nonce: Some(nonce.into()),
            next_nonce: Some(next_nonce.into()),
        }
    }

    /// Returns `(nonce, next_nonce)` if both are known.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (&self.nonce, &self.next_nonce) {
            (Some(nonce), Some(next)) => Some((nonce.as_str(), next.as_str())),
            _ => None,
        }
    }
}

impl Merge for SessionRecord {
    fn merge(&mut self, partial: Self) {
        if partial.nonce.is_some() {
            self.nonce = partial.nonce;
        }
        if partial.next_nonce.is_some() {
            self.next_nonce = partial.next_nonce;
        }
    }
}

#[derive(Default)]
struct Lane {
    locked: bool,
    waiters: VecDeque<Waiter>,
}

/// Runs the next waiter of `key`, or drops the lane if none is waiting.
fn advance(lanes: &Lanes, key: &str) {
    let next = {
        let mut guard = lanes.lock();
        let Some(lane) = guard.get_mut(key) else {
            return;
        };
        match lane.waiters.pop_front() {
            Some(waiter) => Some(waiter),
            None => {
                guard.remove(key);
                None
            }
        }
    };
    if let Some(waiter) = next {
        waiter();
    }
}

struct SlotInner {
    key: String,
    released: AtomicBool,
    lanes: Lanes,
}

impl Drop for SlotInner {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            warn!(key = %self.key, "slot dropped while held, releasing");
            advance(&self.lanes, &self.key);
        }
    }
}

/// Exclusive access to one key, released exactly once.
///
/// Clones share the grant. Once the last clone is dropped an unreleased
/// slot is released, so a lost slot never wedges its key.
#[derive(Clone)]
pub struct Slot {
    inner: Arc<SlotInner>,
}

impl Slot {
    /// Returns the key this slot guards.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Returns true once released.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Releases the slot and hands it to the next waiter.
    ///
    /// A second release fails with `TransactionFault`.
    pub fn release(&self) -> ClientResult<()> {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return Err(ClientError::committed());
        }
        advance(&self.inner.lanes, &self.inner.key);
        Ok(())
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("key", &self.key())
            .field("released", &self.is_released())
            .finish()
    }
}

/// A slot plus read/write access to the value stored under its key.
#[derive(Clone)]
pub struct Transaction<V> {
    slot: Slot,
    store: Arc<Mutex<HashMap<String, V>>>,
}

impl<V: Clone + Merge> Transaction<V> {
    fn check(&self) -> ClientResult<()> {
        if self.slot.is_released() {
            return Err(ClientError::committed());
        }
        Ok(())
    }

    /// Returns the key.
    pub fn key(&self) -> &str {
        self.slot.key()
    }

    /// Returns the stored value.
    pub fn get(&self) -> ClientResult<Option<V>> {
        self.check()?;
        Ok(self.store.lock().get(self.slot.key()).cloned())
    }

    /// Replaces the stored value; `None` removes it.
    pub fn set(&self, value: Option<V>) -> ClientResult<()> {
        self.check()?;
        let mut store = self.store.lock();
        match value {
            Some(value) => {
                store.insert(self.slot.key().to_string(), value);
            }
            None => {
                store.remove(self.slot.key());
            }
        }
        Ok(())
    }

    /// Merges `partial` into the stored value, storing it if absent.
    pub fn merge(&self, partial: V) -> ClientResult<()> {
        self.check()?;
        let mut store = self.store.lock();
        match store.get_mut(self.slot.key()) {
            Some(current) => current.merge(partial),
            None => {
                store.insert(self.slot.key().to_string(), partial);
            }
        }
        Ok(())
    }

    /// Releases the slot. Every later call fails with `TransactionFault`.
    pub fn commit(&self) -> ClientResult<()> {
        self.slot.release()
    }

    /// Returns true once committed.
    pub fn is_committed(&self) -> bool {
        self.slot.is_released()
    }
}

impl<V> fmt::Debug for Transaction<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction").field("slot", &self.slot).finish()
    }
}

/// Per-key FIFO lock with a value store.
pub struct SessionQueue<V = SessionRecord> {
    scheduler: Scheduler,
    lanes: Lanes,
    store: Arc<Mutex<HashMap<String, V>>>,
}

impl<V> Clone for SessionQueue<V> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            lanes: Arc::clone(&self.lanes),
            store: Arc::clone(&self.store),
        }
    }
}

impl<V: Clone + Merge + Send + 'static> SessionQueue<V> {
    /// Creates an empty queue delivering on `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            scheduler: scheduler.clone(),
            lanes: Arc::new(Mutex::new(HashMap::new())),
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Waits for exclusive access to `key`.
    pub fn acquire(&self, key: &str) -> Deferred<Slot> {
        let (deferred, resolver) = Deferred::channel(&self.scheduler);
        let slot = Slot {
            inner: Arc::new(SlotInner {
                key: key.to_string(),
                released: AtomicBool::new(false),
                lanes: Arc::clone(&self.lanes),
            }),
        };
        let waiter: Waiter = Box::new(move || resolver.resolve(slot));

        let run_now = {
            let mut lanes = self.lanes.lock();
            let lane = lanes.entry(key.to_string()).or_default();
            if lane.locked {
                lane.waiters.push_back(waiter);
                None
            } else {
                lane.locked = true;
                Some(waiter)
            }
        };
        if let Some(waiter) = run_now {
            waiter();
        }
        deferred
    }

    /// Waits for exclusive access to `key` and its stored value.
    pub fn with_transaction(&self, key: &str) -> Deferred<Transaction<V>> {
        let store = Arc::clone(&self.store);
        self.acquire(key).map(move |slot| Transaction { slot, store })
    }

    /// Returns the stored value without taking the slot.
    pub fn snapshot(&self, key: &str) -> Option<V> {
        self.store.lock().get(key).cloned()
    }

    /// Returns true if a slot for `key` is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        self.lanes.lock().get(key).map_or(false, |lane| lane.locked)
    }

    /// Number of waiters queued behind the holder of `key`.
    pub fn waiting(&self, key: &str) -> usize {
        self.lanes.lock().get(key).map_or(0, |lane| lane.waiters.len())
    }
}

impl<V> fmt::Debug for SessionQueue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionQueue")
            .field("lanes", &self.lanes.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn queue() -> (Scheduler, SessionQueue) {
        let sched = Scheduler::new();
        let queue = SessionQueue::new(&sched);
        (sched, queue)
    }

    #[test]
    fn same_key_waits_for_release() {
        let (sched, queue) = queue();
        let first = queue.acquire("alice");
        let second = queue.acquire("alice");
        sched.run_until_idle();

        let slot = first.outcome().unwrap().unwrap();
        assert!(second.is_pending());
        assert_eq!(queue.waiting("alice"), 1);

        slot.release().unwrap();
        assert_eq!(second.wait().unwrap().unwrap().key(), "alice");
        assert!(queue.is_locked("alice"));
    }

    #[test]
    fn distinct_keys_do_not_block() {
        let (sched, queue) = queue();
        let _held = queue.acquire("alice");
        let other = queue.acquire("bob");
        sched.run_until_idle();
        assert!(other.outcome().unwrap().is_ok());
    }

    #[test]
    fn double_release_faults() {
        let (_sched, queue) = queue();
        let slot = queue.acquire("alice").wait().unwrap().unwrap();
        slot.release().unwrap();
        assert_eq!(slot.release(), Err(ClientError::committed()));
        assert!(!queue.is_locked("alice"));
    }

    #[test]
    fn dropped_slot_releases_its_key() {
        let (sched, queue) = queue();
        let slot = queue.acquire("alice").wait().unwrap().unwrap();
        let copy = slot.clone();
        let next = queue.acquire("alice");
        sched.run_until_idle();
        assert!(next.is_pending());

        drop(slot);
        sched.run_until_idle();
        assert!(next.is_pending());

        drop(copy);
        let granted = next.wait().unwrap().unwrap();
        assert_eq!(granted.key(), "alice");
        granted.release().unwrap();
        assert!(!queue.is_locked("alice"));
    }

    #[test]
    fn unobserved_grant_does_not_wedge_the_key() {
        let (sched, queue) = queue();
        drop(queue.acquire("alice"));
        sched.run_until_idle();
        assert!(!queue.is_locked("alice"));

        let held = queue.acquire("alice").wait().unwrap().unwrap();
        drop(queue.acquire("alice"));
        let last = queue.acquire("alice");
        assert_eq!(queue.waiting("alice"), 2);

        held.release().unwrap();
        assert_eq!(last.wait().unwrap().unwrap().key(), "alice");
    }

    #[test]
    fn released_slot_drops_quietly() {
        let (_sched, queue) = queue();
        let slot = queue.acquire("alice").wait().unwrap().unwrap();
        slot.release().unwrap();
        let next = queue.acquire("alice");
        assert!(queue.is_locked("alice"));
        drop(slot);
        assert!(queue.is_locked("alice"));
        assert!(next.wait().unwrap().is_ok());
    }

    #[test]
    fn transaction_reads_and_merges_store() {
        let (_sched, queue) = queue();
        let tx = queue.with_transaction("alice").wait().unwrap().unwrap();
        assert_eq!(tx.get().unwrap(), None);

        tx.set(Some(SessionRecord::new("n1", "n2"))).unwrap();
        tx.merge(SessionRecord {
            nonce: Some("n3".into()),
            next_nonce: None,
        })
        .unwrap();
        assert_eq!(tx.get().unwrap(), Some(SessionRecord::new("n3", "n2")));
        tx.commit().unwrap();

        assert_eq!(tx.get(), Err(ClientError::committed()));
        assert_eq!(tx.set(None), Err(ClientError::committed()));
        assert_eq!(tx.commit(), Err(ClientError::committed()));
        assert_eq!(queue.snapshot("alice"), Some(SessionRecord::new("n3", "n2")));
    }

    #[test]
    fn set_none_removes_record() {
        let (_sched, queue) = queue();
        let tx = queue.with_transaction("alice").wait().unwrap().unwrap();
        tx.set(Some(SessionRecord::new("a", "b"))).unwrap();
        tx.set(None).unwrap();
        tx.commit().unwrap();
        assert_eq!(queue.snapshot("alice"), None);
    }

    #[test]
    fn record_pair_requires_both() {
        assert_eq!(SessionRecord::new("a", "b").pair(), Some(("a", "b")));
        assert_eq!(SessionRecord::default().pair(), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn grants_are_fifo_per_key(keys in prop::collection::vec(0u8..3, 1..24)) {
            let (sched, queue) = queue();
            let granted = Arc::new(Mutex::new(Vec::new()));
            for (i, key) in keys.iter().enumerate() {
                let granted = Arc::clone(&granted);
                queue.acquire(&key.to_string()).on_fulfilled(move |slot| {
                    granted.lock().push((slot.key().to_string(), i));
                    slot.release().unwrap();
                });
            }
            sched.run_until_idle();

            let granted = granted.lock();
            prop_assert_eq!(granted.len(), keys.len());
            for key in 0u8..3 {
                let key = key.to_string();
                let order: Vec<usize> = granted.iter().filter(|(k, _)| *k == key).map(|(_, i)| *i).collect();
                let expected: Vec<usize> = keys.iter().enumerate().filter(|(_, k)| k.to_string() == key).map(|(i, _)| i).collect();
                prop_assert_eq!(order, expected);
                prop_assert!(!queue.is_locked(&key));
            }
        }
    }
}
