use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::event::Event;

/// Lock a mutex, recovering the data if another thread panicked with it held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Monotonic id source. Ids start at zero and are never reused until
/// [`IdGenerator::reset`].
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Allocate the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next allocation will return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.next.store(0, Ordering::SeqCst);
    }
}

/// Channel name → subscription id. A channel appears at most once.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: HashMap<String, u64>,
}

impl SubscriptionTable {
    pub fn contains(&self, channel: &str) -> bool {
        self.entries.contains_key(channel)
    }

    pub fn get(&self, channel: &str) -> Option<u64> {
        self.entries.get(channel).copied()
    }

    /// Record a subscription. Returns `false` if the channel is already present.
    pub fn insert(&mut self, channel: &str, id: u64) -> bool {
        if self.entries.contains_key(channel) {
            return false;
        }
        self.entries.insert(channel.to_string(), id);
        true
    }

    pub fn remove(&mut self, channel: &str) -> Option<u64> {
        self.entries.remove(channel)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Subscribed channels with their ids, sorted by id.
    pub fn entries(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(channel, id)| (channel.clone(), *id))
            .collect();
        entries.sort_by_key(|(_, id)| *id);
        entries
    }
}

/// Holds the inbound loop back while a login exchange is in flight.
///
/// Starts held. Login releases it once the CONNECT response has been
/// consumed; session teardown holds it again.
#[derive(Debug)]
pub struct LoginGate {
    held: Mutex<bool>,
    changed: Condvar,
}

impl Default for LoginGate {
    fn default() -> Self {
        Self {
            held: Mutex::new(true),
            changed: Condvar::new(),
        }
    }
}

impl LoginGate {
    pub fn is_held(&self) -> bool {
        *lock(&self.held)
    }

    pub fn hold(&self) {
        *lock(&self.held) = true;
    }

    pub fn release(&self) {
        *lock(&self.held) = false;
        self.changed.notify_all();
    }

    /// Wait up to `timeout` for the gate to open. Returns `true` if it is open.
    pub fn wait_released(&self, timeout: Duration) -> bool {
        let held = lock(&self.held);
        let (held, _) = self
            .changed
            .wait_timeout_while(held, timeout, |held| *held)
            .unwrap_or_else(PoisonError::into_inner);
        !*held
    }
}

/// State shared by the command loop and the inbound loop for the life of
/// the process.
///
/// Flags and counters are atomics; tables are each behind their own mutex.
/// `connected` is true only between a CONNECTED response and either a
/// matching disconnect receipt or an ERROR frame.
#[derive(Default)]
pub struct Session {
    connected: AtomicBool,
    terminate: AtomicBool,
    username: Mutex<Option<String>>,
    pending_disconnect: Mutex<Option<u64>>,
    subscription_ids: IdGenerator,
    receipt_ids: IdGenerator,
    subscriptions: Mutex<SubscriptionTable>,
    known_users: Mutex<HashMap<String, String>>,
    events: Mutex<HashMap<String, Vec<Event>>>,
    login_gate: LoginGate,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Set once the current session has ended (teardown receipt, ERROR,
    /// or a lost connection).
    pub fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    pub fn username(&self) -> Option<String> {
        lock(&self.username).clone()
    }

    pub fn login_gate(&self) -> &LoginGate {
        &self.login_gate
    }

    pub fn subscription_ids(&self) -> &IdGenerator {
        &self.subscription_ids
    }

    pub fn receipt_ids(&self) -> &IdGenerator {
        &self.receipt_ids
    }

    /// `false` if `username` logged in earlier in this process with a
    /// different password.
    pub fn credentials_match(&self, username: &str, password: &str) -> bool {
        lock(&self.known_users)
            .get(username)
            .is_none_or(|known| known == password)
    }

    /// Record a successful CONNECTED exchange and open the login gate.
    pub fn complete_login(&self, username: &str, password: &str) {
        *lock(&self.username) = Some(username.to_string());
        lock(&self.known_users).insert(username.to_string(), password.to_string());
        self.terminate.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        self.login_gate.release();
    }

    /// Lock the subscription table.
    pub fn subscriptions(&self) -> MutexGuard<'_, SubscriptionTable> {
        lock(&self.subscriptions)
    }

    /// Allocate a receipt id and remember it as the teardown receipt.
    pub fn begin_disconnect(&self) -> u64 {
        let receipt = self.receipt_ids.next_id();
        *lock(&self.pending_disconnect) = Some(receipt);
        receipt
    }

    pub fn pending_disconnect(&self) -> Option<u64> {
        *lock(&self.pending_disconnect)
    }

    /// Forget a teardown receipt whose DISCONNECT never made it out.
    pub fn abandon_disconnect(&self) {
        lock(&self.pending_disconnect).take();
    }

    /// Reset everything after the teardown receipt arrived.
    ///
    /// The gate is held before `connected` drops, so a login that observes
    /// the disconnect can never race the inbound loop.
    pub fn complete_disconnect(&self) {
        self.login_gate.hold();
        self.terminate.store(true, Ordering::SeqCst);
        lock(&self.subscriptions).clear();
        lock(&self.pending_disconnect).take();
        lock(&self.username).take();
        self.subscription_ids.reset();
        self.receipt_ids.reset();
        self.connected.store(false, Ordering::SeqCst);
    }

    /// End the session after an ERROR frame or a lost connection.
    ///
    /// The server drops our subscriptions with the connection, so the table
    /// is cleared; the id counters only reset on a confirmed disconnect.
    pub fn fail(&self) {
        self.login_gate.hold();
        self.terminate.store(true, Ordering::SeqCst);
        lock(&self.subscriptions).clear();
        lock(&self.pending_disconnect).take();
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Append an event received on `channel`.
    pub fn record_event(&self, channel: &str, event: Event) {
        lock(&self.events)
            .entry(channel.to_string())
            .or_default()
            .push(event);
    }

    /// Run `f` over the event log while holding its lock.
    pub fn with_events<R>(&self, f: impl FnOnce(&HashMap<String, Vec<Event>>) -> R) -> R {
        f(&lock(&self.events))
    }

    /// Number of events held per channel, sorted by channel name.
    pub fn event_counts(&self) -> BTreeMap<String, usize> {
        lock(&self.events)
            .iter()
            .map(|(channel, events)| (channel.clone(), events.len()))
            .collect()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .field("terminate", &self.is_terminated())
            .field("username", &self.username())
            .field("subscriptions", &lock(&self.subscriptions).len())
            .field("next_subscription_id", &self.subscription_ids.peek())
            .field("next_receipt_id", &self.receipt_ids.peek())
            .finish_non_exhaustive()
    }
}
