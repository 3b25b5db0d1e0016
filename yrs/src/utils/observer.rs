use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_SUBSCRIPTION_ID: AtomicU32 = AtomicU32::new(0);

/// A handle returned by `observe*` methods. Dropping it unregisters the
/// associated callback — this is how every `observe`/`observe_deep` call in
/// registers a callback that is meant to be unsubscribed, matching the crate's existing
/// `Subscription`-returning API surface (`store.rs`'s `observe_update_v1`
/// and friends already assume this contract).
pub struct Subscription {
    id: u32,
    unsubscribe: Option<Box<dyn FnOnce(u32) + Send + Sync>>,
}

impl Subscription {
    fn new<F>(id: u32, unsubscribe: F) -> Self
    where
        F: FnOnce(u32) + Send + Sync + 'static,
    {
        Subscription {
            id,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Detaches the callback from this handle: it keeps running until the
    /// owning `Doc`/`Branch` is dropped, even after this `Subscription`
    /// itself goes out of scope.
    pub fn forget(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            (unsubscribe)(self.id);
        }
    }
}

type CallbackMap<F> = Arc<RwLock<HashMap<u32, Arc<F>>>>;

/// A multi-subscriber callback registry. Generic over the callback's
/// function type so it can back both `Fn(&TransactionMut, &Event)`
/// (shared-type observers) and `Fn(&mut TransactionMut)` (the
/// after-transaction hook) without duplicating the bookkeeping.
pub struct Observer<F: ?Sized> {
    callbacks: CallbackMap<F>,
}

impl<F: ?Sized> Default for Observer<F> {
    fn default() -> Self {
        Observer {
            callbacks: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<F: ?Sized + 'static> Observer<F> {
    pub fn subscribe(&self, f: F) -> Subscription
    where
        F: Sized,
    {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().unwrap().insert(id, Arc::new(f));
        let callbacks = self.callbacks.clone();
        Subscription::new(id, move |id| {
            callbacks.write().unwrap().remove(&id);
        })
    }

    /// Returns a consistent snapshot of currently registered callbacks, or
    /// `None` if there are none — most shared types are never observed, so
    /// callers should skip building an event eagerly in that case.
    pub fn callbacks(&self) -> Option<Vec<Arc<F>>> {
        let guard = self.callbacks.read().unwrap();
        if guard.is_empty() {
            None
        } else {
            Some(guard.values().cloned().collect())
        }
    }
}

/// Alias used where a callback needs a `&mut` borrow of its argument across
/// the call (the after-transaction hook, which may itself start a new
/// transaction or mutate transaction-local bookkeeping).
pub type ObserverMut<E> = Observer<dyn Fn(&crate::transaction::TransactionMut, &mut E)>;

impl<E: 'static> Observer<dyn Fn(&crate::transaction::TransactionMut, &mut E)> {
    pub fn subscribe_mut<F>(&self, f: F) -> Subscription
    where
        F: Fn(&crate::transaction::TransactionMut, &mut E) + 'static,
    {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let boxed: Arc<dyn Fn(&crate::transaction::TransactionMut, &mut E)> = Arc::new(f);
        self.callbacks.write().unwrap().insert(id, boxed);
        let callbacks = self.callbacks.clone();
        Subscription::new(id, move |id| {
            callbacks.write().unwrap().remove(&id);
        })
    }
}

/// Alias for the shared-type observer callback shape: a read-only borrow of
/// both the transaction and the already-built event.
pub type ObserverRef<E> = Observer<dyn Fn(&crate::transaction::TransactionMut, &E)>;

impl<E: ?Sized + 'static> Observer<dyn Fn(&crate::transaction::TransactionMut, &E)> {
    pub fn subscribe_ref<F>(&self, f: F) -> Subscription
    where
        F: Fn(&crate::transaction::TransactionMut, &E) + 'static,
    {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let boxed: Arc<dyn Fn(&crate::transaction::TransactionMut, &E)> = Arc::new(f);
        self.callbacks.write().unwrap().insert(id, boxed);
        let callbacks = self.callbacks.clone();
        Subscription::new(id, move |id| {
            callbacks.write().unwrap().remove(&id);
        })
    }
}

/// Alias for callbacks that carry no transaction context at all —
/// `Awareness` fires these, since its updates happen entirely outside the
/// document's transaction/commit machinery.
pub type ObserverFn<E> = Observer<dyn Fn(&E)>;

impl<E: ?Sized + 'static> Observer<dyn Fn(&E)> {
    pub fn subscribe_fn<F>(&self, f: F) -> Subscription
    where
        F: Fn(&E) + 'static,
    {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let boxed: Arc<dyn Fn(&E)> = Arc::new(f);
        self.callbacks.write().unwrap().insert(id, boxed);
        let callbacks = self.callbacks.clone();
        Subscription::new(id, move |id| {
            callbacks.write().unwrap().remove(&id);
        })
    }
}
