//! Listener traits and the connection-event fan-out.
//!
//! Registrations pair a listener with an [`EventExecutor`]; broadcasts
//! snapshot the registration list so add/remove from any thread is safe
//! while a broadcast is in flight. An add during a broadcast may or may
//! not receive the in-flight event.

use std::sync::{Arc, RwLock};

use crate::error::ClientError;
use crate::executor::EventExecutor;
use crate::types::{AddressStatus, HistoryTx, ServerAddress, Transaction, UnspentTx};

/// Observer of connection-level events. Callbacks run on the executor the
/// listener was registered with.
pub trait ConnectionEventListener: Send + Sync {
    /// A connection run reached a live socket.
    fn on_connection(&self, _server: ServerAddress) {}

    /// The current connection run ended.
    fn on_disconnect(&self) {}
}

/// Observer of per-call transaction events. Passed per call; callbacks run
/// on the client's default executor in reply-arrival order.
pub trait TransactionEventListener: Send + Sync {
    /// A subscribed address changed status (subscribe reply or later
    /// notification; implementations must be idempotent in status
    /// handling).
    fn on_address_status_update(&self, _status: AddressStatus) {}

    fn on_unspent_transaction_update(&self, _status: AddressStatus, _unspent: Vec<UnspentTx>) {}

    fn on_transaction_history(&self, _status: AddressStatus, _history: Vec<HistoryTx>) {}

    fn on_transaction_update(&self, _transaction: Transaction) {}

    fn on_transaction_broadcast(&self, _transaction: Transaction) {}

    fn on_transaction_broadcast_error(&self, _transaction: Transaction, _error: ClientError) {}
}

/// One listener paired with the executor its callbacks run on.
pub struct ListenerRegistration<L: ?Sized> {
    pub listener: Arc<L>,
    pub executor: EventExecutor,
}

impl<L: ?Sized> Clone for ListenerRegistration<L> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            executor: self.executor.clone(),
        }
    }
}

/// Registry of connection-event listeners with snapshot iteration.
#[derive(Default)]
pub(crate) struct ConnectionListeners {
    registrations: RwLock<Vec<ListenerRegistration<dyn ConnectionEventListener>>>,
}

impl ConnectionListeners {
    pub(crate) fn add(&self, listener: Arc<dyn ConnectionEventListener>, executor: EventExecutor) {
        self.registrations.write().expect("listener list lock").push(ListenerRegistration {
            listener,
            executor,
        });
    }

    /// Remove a previously added listener by identity. Returns whether it
    /// was registered.
    pub(crate) fn remove(&self, listener: &Arc<dyn ConnectionEventListener>) -> bool {
        let mut registrations = self.registrations.write().expect("listener list lock");
        let before = registrations.len();
        registrations.retain(|registration| !Arc::ptr_eq(&registration.listener, listener));
        registrations.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.read().expect("listener list lock").len()
    }

    fn snapshot(&self) -> Vec<ListenerRegistration<dyn ConnectionEventListener>> {
        self.registrations.read().expect("listener list lock").clone()
    }

    pub(crate) fn broadcast_connection(&self, server: &ServerAddress) {
        for registration in self.snapshot() {
            let listener = registration.listener.clone();
            let server = server.clone();
            registration.executor.execute(Box::new(move || listener.on_connection(server)));
        }
    }

    pub(crate) fn broadcast_disconnect(&self) {
        for registration in self.snapshot() {
            let listener = registration.listener.clone();
            registration.executor.execute(Box::new(move || listener.on_disconnect()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingListener {
        connections: AtomicUsize,
        disconnects: AtomicUsize,
    }

    impl ConnectionEventListener for CountingListener {
        fn on_connection(&self, _server: ServerAddress) {
            self.connections.fetch_add(1, Ordering::SeqCst);
        }

        fn on_disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn server() -> ServerAddress {
        ServerAddress::new("localhost", 50001)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registration() {
        let listeners = ConnectionListeners::default();
        let executor = EventExecutor::new("test");
        let a = Arc::new(CountingListener::default());
        let b = Arc::new(CountingListener::default());
        listeners.add(a.clone(), executor.clone());
        listeners.add(b.clone(), executor.clone());

        listeners.broadcast_connection(&server());
        listeners.broadcast_disconnect();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(a.connections.load(Ordering::SeqCst), 1);
        assert_eq!(b.connections.load(Ordering::SeqCst), 1);
        assert_eq!(a.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(b.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn add_then_remove_restores_prior_state() {
        let listeners = ConnectionListeners::default();
        let executor = EventExecutor::new("test");
        let listener: Arc<dyn ConnectionEventListener> = Arc::new(CountingListener::default());

        assert_eq!(listeners.len(), 0);
        listeners.add(listener.clone(), executor);
        assert_eq!(listeners.len(), 1);
        assert!(listeners.remove(&listener));
        assert_eq!(listeners.len(), 0);
        assert!(!listeners.remove(&listener));
    }

    #[tokio::test]
    async fn removed_listener_is_not_invoked() {
        let listeners = ConnectionListeners::default();
        let executor = EventExecutor::new("test");
        let counting = Arc::new(CountingListener::default());
        let listener: Arc<dyn ConnectionEventListener> = counting.clone();
        listeners.add(listener.clone(), executor);
        listeners.remove(&listener);

        listeners.broadcast_connection(&server());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counting.connections.load(Ordering::SeqCst), 0);
    }
}
