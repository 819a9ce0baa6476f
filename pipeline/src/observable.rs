//! Single-writer observable values.
//!
//! An [`Observable`] is owned by exactly one component (the writer) and
//! read by any number of [`Subscription`]s. A subscriber sees the latest
//! value immediately and is woken on every change. Dropping a subscription
//! tears it down; dropping the observable ends every subscription.
//!
//! Backed by `tokio::sync::watch`, so a slow reader never blocks the
//! writer: it simply observes the most recent value when it catches up.

use tokio::sync::watch;

/// A value with one writer and many readers.
#[derive(Debug)]
pub struct Observable<T> {
    sender: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    /// Creates an observable holding `initial`.
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Replaces the value and notifies subscribers.
    ///
    /// Stores the value even if nobody is subscribed.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Mutates the value in place through `f` and notifies subscribers.
    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        self.sender.send_modify(f);
    }

    /// Starts a new subscription.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + PartialEq> Observable<T> {
    /// Replaces the value only if it differs, returning whether it changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

/// A read handle on an [`Observable`].
#[derive(Debug, Clone)]
pub struct Subscription<T> {
    receiver: watch::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// The latest value, marking it as seen.
    pub fn current(&mut self) -> T {
        self.receiver.borrow_and_update().clone()
    }

    /// Waits for the next change and returns the new value.
    ///
    /// Returns `None` once the writer has been dropped.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Waits until `predicate` holds for the current value and returns it.
    ///
    /// Checks the current value first, so it returns immediately when the
    /// predicate already holds. Returns `None` if the writer goes away first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.receiver
            .wait_for(|value| predicate(value))
            .await
            .ok()
            .map(|value| value.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
