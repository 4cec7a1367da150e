//! In-process notification center.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use super::NotificationName;

type Handler = Arc<dyn Fn(NotificationName) + Send + Sync>;

struct Observer {
    key: Uuid,
    name: NotificationName,
    token: u64,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    observers: RwLock<Vec<Observer>>,
    next_token: AtomicU64,
}

/// Delivers named notifications to registered observers.
///
/// Observers are keyed: adding an observer again under the same key and
/// name replaces the earlier one instead of registering a duplicate.
/// Cloning the center yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct NotificationCenter {
    registry: Arc<Registry>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `name`. The returned [`Subscription`]
    /// removes it again when dropped.
    pub fn add_observer<F>(&self, key: Uuid, name: NotificationName, handler: F) -> Subscription
    where
        F: Fn(NotificationName) + Send + Sync + 'static,
    {
        let token = self.registry.next_token.fetch_add(1, Ordering::Relaxed);
        let mut observers = self.registry.observers.write();
        let before = observers.len();
        observers.retain(|o| !(o.key == key && o.name == name));
        if observers.len() != before {
            debug!("Replacing observer {} for '{}'", key, name);
        } else {
            debug!("Observer {} registered for '{}'", key, name);
        }
        observers.push(Observer {
            key,
            name,
            token,
            handler: Arc::new(handler),
        });

        Subscription {
            token,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Removes every observer registered under `key`.
    pub fn remove_observer(&self, key: Uuid) {
        self.registry.observers.write().retain(|o| o.key != key);
    }

    pub fn observer_count(&self) -> usize {
        self.registry.observers.read().len()
    }

    /// Posts a notification by its wire name. Unknown names are ignored.
    ///
    /// Returns the number of observers invoked.
    pub fn post_named(&self, name: &str) -> usize {
        match NotificationName::parse(name) {
            Some(name) => self.post(name),
            None => {
                debug!("Ignoring unknown notification '{}'", name);
                0
            }
        }
    }

    /// Posts `name` to its observers, synchronously on the calling thread.
    pub fn post(&self, name: NotificationName) -> usize {
        // Handlers run without the registry lock so they may (un)register.
        let handlers: Vec<Handler> = self
            .registry
            .observers
            .read()
            .iter()
            .filter(|o| o.name == name)
            .map(|o| o.handler.clone())
            .collect();

        trace!("Posting '{}' to {} observer(s)", name, handlers.len());
        for handler in &handlers {
            handler(name);
        }
        handlers.len()
    }
}

impl fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Keeps an observer registered. Dropping it deregisters the observer,
/// unless a newer registration under the same key already replaced it.
#[must_use = "the observer is removed when the subscription is dropped"]
pub struct Subscription {
    token: u64,
    registry: Weak<Registry>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("token", &self.token).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.observers.write().retain(|o| o.token != self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(center: &NotificationCenter, key: Uuid) -> (Subscription, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let subscription = center.add_observer(key, NotificationName::ChangeImage, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (subscription, count)
    }

    #[test]
    fn test_post_reaches_observer() {
        let center = NotificationCenter::new();
        let (_sub, count) = counter(&center, Uuid::new_v4());

        assert_eq!(center.post_named("change active image"), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let center = NotificationCenter::new();
        let (_sub, count) = counter(&center, Uuid::new_v4());

        assert_eq!(center.post_named("change image"), 0);
        assert_eq!(center.post_named(""), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reregistering_replaces_instead_of_duplicating() {
        let center = NotificationCenter::new();
        let key = Uuid::new_v4();
        let (first, first_count) = counter(&center, key);
        let (_second, second_count) = counter(&center, key);
        assert_eq!(center.observer_count(), 1);

        // Dropping the stale subscription must not remove its replacement
        drop(first);
        center.post(NotificationName::ChangeImage);
        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_subscription_deregisters() {
        let center = NotificationCenter::new();
        let (sub, count) = counter(&center, Uuid::new_v4());
        drop(sub);

        assert_eq!(center.post(NotificationName::ChangeImage), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_deregister_itself() {
        let center = NotificationCenter::new();
        let key = Uuid::new_v4();
        let inner = center.clone();
        let _sub = center.add_observer(key, NotificationName::ChangeImage, move |_| {
            inner.remove_observer(key);
        });

        assert_eq!(center.post(NotificationName::ChangeImage), 1);
        assert_eq!(center.observer_count(), 0);
    }
}
