//! Observable value cells.
//!
//! An [`Atom`] holds one value and a list of subscribers. Every write
//! notifies the subscribers synchronously, in subscription order, before the
//! write returns.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

type Subscriber<T> = Box<dyn FnMut(&T) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Atom<T> {
    value: T,
    subscribers: Mutex<Subscribers<T>>,
}

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Subscriber<T>)>,
}

impl<T> Atom<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            subscribers: Mutex::new(Subscribers {
                next_id: 1,
                entries: Vec::new(),
            }),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.notify();
    }

    /// Mutates the value in place, then notifies.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.value);
        self.notify();
        result
    }

    /// Registers `subscriber`. It must not subscribe to this same atom from
    /// inside its callback.
    pub fn subscribe(&self, subscriber: impl FnMut(&T) + Send + 'static) -> SubscriptionId {
        let mut subscribers = self.lock_subscribers();
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.entries.push((id, Box::new(subscriber)));
        id
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(entry, _)| *entry != id);
        subscribers.entries.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().entries.len()
    }

    fn notify(&mut self) {
        let subscribers = match self.subscribers.get_mut() {
            Ok(subscribers) => subscribers,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, subscriber) in subscribers.entries.iter_mut() {
            subscriber(&self.value);
        }
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Subscribers<T>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T: Default> Default for Atom<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("value", &self.value)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
