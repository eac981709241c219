//! Observable value cell built on `tokio::sync::watch`

use std::sync::Arc;

use tokio::sync::watch;

/// A shared value that notifies subscribers whenever it changes.
///
/// Clones share the same underlying value.
#[derive(Debug)]
pub struct StateCell<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> StateCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(value)),
        }
    }

    /// Replace the value, notifying subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutate the value in place, notifying subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Read the value through a closure without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> StateCell<T> {
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let cell = StateCell::new(false);
        cell.set(true);
        assert!(cell.get());
    }

    #[test]
    fn test_clones_share_value() {
        let cell: StateCell<Option<String>> = StateCell::default();
        let other = cell.clone();
        other.set(Some("boom".into()));
        assert_eq!(cell.get(), Some("boom".to_string()));
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let cell = StateCell::new(0u32);
        let mut rx = cell.subscribe();

        cell.update(|v| *v += 2);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(cell.with(|v| *v * 10), 20);
    }
}
