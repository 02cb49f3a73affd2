//! In-memory session provider with `GET_LOCK` semantics.
//!
//! - Named locks belong to a session id, are reentrant for that session and
//!   stay held until released or until the session is closed.
//! - Bare sessions come from a fixed set of pooled ids, so a lock taken on a
//!   bare session survives the session going out of scope.
//! - Transactions get a fresh id, buffer their record writes until commit and
//!   close their session on rollback or drop.
//! - Product reads with write intent take a row lock held until the
//!   transaction ends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::time::Instant;

use named_lock_core::error::{LockError, LockResult};
use named_lock_core::history::{HistoryStatus, LockHistory};
use named_lock_core::records::{InventoryStore, Order, Product};
use named_lock_core::timeout::LockTimeout;
use named_lock_core::traits::{
    FreeState, NamedLockSession, SessionId, SessionProvider, TransactionScope,
};

/// First id handed to transaction-scoped sessions.
const TRANSACTION_ID_BASE: u64 = 1000;

#[derive(Default)]
struct State {
    /// name -> (holder, reentrancy count)
    locks: HashMap<String, (SessionId, u32)>,
    /// product code -> holder of the row lock
    row_locks: HashMap<String, SessionId>,
    products: HashMap<String, i64>,
    orders: Vec<Order>,
    closed: Vec<SessionId>,
}

/// Shared server-side state.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<State>,
    changed: Notify,
    next_transaction: AtomicU64,
    get_lock_calls: AtomicUsize,
    /// Makes `RELEASE_LOCK` report "not held" inside transactions.
    pub refuse_release: AtomicBool,
    /// Makes `COMMIT` fail.
    pub fail_commit: AtomicBool,
    /// Makes `ROLLBACK` report an error (the session is still closed).
    pub fail_rollback: AtomicBool,
    /// Makes a transaction report a different session id once it holds a lock.
    pub drift_session: AtomicBool,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn holder(&self, name: &str) -> Option<SessionId> {
        self.state.lock().unwrap().locks.get(name).map(|(id, _)| *id)
    }

    pub fn product_quantity(&self, code: &str) -> Option<i64> {
        self.state.lock().unwrap().products.get(code).copied()
    }

    pub fn set_product(&self, code: &str, quantity: i64) {
        self.state
            .lock()
            .unwrap()
            .products
            .insert(code.to_string(), quantity);
    }

    pub fn order_count(&self, code: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.orders.iter().filter(|o| o.code == code).count()
    }

    pub fn row_lock_holder(&self, code: &str) -> Option<SessionId> {
        self.state.lock().unwrap().row_locks.get(code).copied()
    }

    pub fn was_closed(&self, id: SessionId) -> bool {
        self.state.lock().unwrap().closed.contains(&id)
    }

    pub fn get_lock_calls(&self) -> usize {
        self.get_lock_calls.load(Ordering::SeqCst)
    }

    /// Ends a session: every named lock and row lock it held is freed.
    pub fn close_session(&self, id: SessionId) {
        {
            let mut state = self.state.lock().unwrap();
            state.locks.retain(|_, (holder, _)| *holder != id);
            state.row_locks.retain(|_, holder| *holder != id);
            state.closed.push(id);
        }
        self.changed.notify_waiters();
    }

    fn next_transaction_id(&self) -> SessionId {
        SessionId::new(TRANSACTION_ID_BASE + self.next_transaction.fetch_add(1, Ordering::SeqCst))
    }

    /// Waits until `try_take` succeeds or the deadline passes.
    async fn wait_for<F>(&self, deadline: Option<Instant>, mut try_take: F) -> bool
    where
        F: FnMut(&mut State) -> bool,
    {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if try_take(&mut *self.state.lock().unwrap()) {
                return true;
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return try_take(&mut *self.state.lock().unwrap());
                    }
                }
            }
        }
    }

    async fn get_lock(&self, id: SessionId, name: &str, timeout: LockTimeout) -> bool {
        self.get_lock_calls.fetch_add(1, Ordering::SeqCst);
        let deadline = timeout.as_duration().map(|d| Instant::now() + d);
        self.wait_for(deadline, |state| match state.locks.get_mut(name) {
            None => {
                state.locks.insert(name.to_string(), (id, 1));
                true
            }
            Some((holder, count)) if *holder == id => {
                *count += 1;
                true
            }
            Some(_) => false,
        })
        .await
    }

    fn release_lock(&self, id: SessionId, name: &str) -> bool {
        let released = {
            let mut state = self.state.lock().unwrap();
            match state.locks.get_mut(name) {
                Some((holder, count)) if *holder == id => {
                    *count -= 1;
                    if *count == 0 {
                        state.locks.remove(name);
                    }
                    true
                }
                _ => false,
            }
        };
        if released {
            self.changed.notify_waiters();
        }
        released
    }

    fn is_free_lock(&self, name: &str) -> FreeState {
        if name.is_empty() {
            return FreeState::Unknown;
        }
        match self.holder(name) {
            Some(_) => FreeState::Held,
            None => FreeState::Free,
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Provider over a [`MockStore`].
#[derive(Clone)]
pub struct MockProvider {
    store: Arc<MockStore>,
    pool_size: u64,
    next_pooled: Arc<AtomicU64>,
    fail_begin: Arc<AtomicBool>,
}

impl MockProvider {
    /// Bare sessions all share one pooled connection.
    pub fn new(store: Arc<MockStore>) -> Self {
        Self::with_pool_size(store, 1)
    }

    /// Bare sessions rotate through `pool_size` pooled ids (1..=pool_size).
    pub fn with_pool_size(store: Arc<MockStore>, pool_size: u64) -> Self {
        Self {
            store,
            pool_size: pool_size.max(1),
            next_pooled: Arc::new(AtomicU64::new(0)),
            fail_begin: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &Arc<MockStore> {
        &self.store
    }

    pub fn fail_begin(&self, fail: bool) {
        self.fail_begin.store(fail, Ordering::SeqCst);
    }
}

impl SessionProvider for MockProvider {
    type Session = MockSession;
    type Transaction = MockTransaction;

    async fn session(&self) -> LockResult<MockSession> {
        let slot = self.next_pooled.fetch_add(1, Ordering::SeqCst) % self.pool_size;
        Ok(MockSession {
            store: self.store.clone(),
            id: SessionId::new(slot + 1),
        })
    }

    async fn begin(&self) -> LockResult<MockTransaction> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(LockError::Begin("begin refused".into()));
        }
        Ok(MockTransaction {
            store: self.store.clone(),
            id: self.store.next_transaction_id(),
            holds_lock: false,
            writes: Vec::new(),
            finished: false,
        })
    }
}

// ============================================================================
// Bare session
// ============================================================================

pub struct MockSession {
    store: Arc<MockStore>,
    id: SessionId,
}

impl NamedLockSession for MockSession {
    async fn session_id(&mut self) -> LockResult<SessionId> {
        Ok(self.id)
    }

    async fn get_lock(&mut self, name: &str, timeout: LockTimeout) -> LockResult<bool> {
        Ok(self.store.get_lock(self.id, name, timeout).await)
    }

    async fn release_lock(&mut self, name: &str) -> LockResult<bool> {
        Ok(self.store.release_lock(self.id, name))
    }

    async fn is_free_lock(&mut self, name: &str) -> LockResult<FreeState> {
        Ok(self.store.is_free_lock(name))
    }

    async fn lock_owner(&mut self, name: &str) -> LockResult<Option<SessionId>> {
        Ok(self.store.holder(name))
    }
}

// ============================================================================
// Transaction-scoped session
// ============================================================================

enum Write {
    Product(Product),
    Order(Order),
}

pub struct MockTransaction {
    store: Arc<MockStore>,
    id: SessionId,
    holds_lock: bool,
    writes: Vec<Write>,
    finished: bool,
}

impl MockTransaction {
    fn finish(&mut self) {
        self.finished = true;
        let mut state = self.store.state.lock().unwrap();
        state.row_locks.retain(|_, holder| *holder != self.id);
    }

    fn buffered_product(&self, code: &str) -> Option<i64> {
        self.writes.iter().rev().find_map(|w| match w {
            Write::Product(p) if p.code == code => Some(p.quantity),
            _ => None,
        })
    }
}

impl NamedLockSession for MockTransaction {
    async fn session_id(&mut self) -> LockResult<SessionId> {
        if self.holds_lock && self.store.drift_session.load(Ordering::SeqCst) {
            return Ok(SessionId::new(self.id.as_u64() + 1));
        }
        Ok(self.id)
    }

    async fn get_lock(&mut self, name: &str, timeout: LockTimeout) -> LockResult<bool> {
        let acquired = self.store.get_lock(self.id, name, timeout).await;
        self.holds_lock |= acquired;
        Ok(acquired)
    }

    async fn release_lock(&mut self, name: &str) -> LockResult<bool> {
        if self.store.refuse_release.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.store.release_lock(self.id, name))
    }

    async fn is_free_lock(&mut self, name: &str) -> LockResult<FreeState> {
        Ok(self.store.is_free_lock(name))
    }

    async fn lock_owner(&mut self, name: &str) -> LockResult<Option<SessionId>> {
        Ok(self.store.holder(name))
    }
}

impl TransactionScope for MockTransaction {
    async fn commit(mut self) -> LockResult<()> {
        if self.store.fail_commit.load(Ordering::SeqCst) {
            self.finish();
            self.store.close_session(self.id);
            return Err(LockError::Commit("commit refused".into()));
        }

        {
            let mut state = self.store.state.lock().unwrap();
            for write in self.writes.drain(..) {
                match write {
                    Write::Product(p) => {
                        state.products.insert(p.code, p.quantity);
                    }
                    Write::Order(o) => state.orders.push(o),
                }
            }
        }
        self.finish();
        self.store.changed.notify_waiters();
        Ok(())
    }

    async fn rollback(mut self) -> LockResult<()> {
        self.writes.clear();
        self.finish();
        self.store.close_session(self.id);
        if self.store.fail_rollback.load(Ordering::SeqCst) {
            return Err(LockError::Connection("rollback refused".into()));
        }
        Ok(())
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.store.close_session(self.id);
        }
    }
}

impl InventoryStore for MockTransaction {
    async fn product_for_update(&mut self, code: &str) -> LockResult<Option<Product>> {
        let id = self.id;
        self.store
            .wait_for(None, |state| match state.row_locks.get(code) {
                Some(holder) if *holder != id => false,
                _ => {
                    state.row_locks.insert(code.to_string(), id);
                    true
                }
            })
            .await;

        let quantity = self
            .buffered_product(code)
            .or_else(|| self.store.product_quantity(code));
        Ok(quantity.map(|quantity| Product {
            code: code.to_string(),
            quantity,
        }))
    }

    async fn insert_product(&mut self, product: &Product) -> LockResult<()> {
        if self.store.product_quantity(&product.code).is_some() {
            return Err(LockError::Query(
                format!("duplicate product {}", product.code).into(),
            ));
        }
        self.writes.push(Write::Product(product.clone()));
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> LockResult<()> {
        self.writes.push(Write::Product(product.clone()));
        Ok(())
    }

    async fn orders_by_code(&mut self, code: &str) -> LockResult<Vec<Order>> {
        let mut orders: Vec<Order> = {
            let state = self.store.state.lock().unwrap();
            state.orders.iter().filter(|o| o.code == code).cloned().collect()
        };
        orders.extend(self.writes.iter().filter_map(|w| match w {
            Write::Order(o) if o.code == code => Some(o.clone()),
            _ => None,
        }));
        Ok(orders)
    }

    async fn insert_order(&mut self, order: &Order) -> LockResult<()> {
        self.writes.push(Write::Order(order.clone()));
        Ok(())
    }
}

// ============================================================================
// History
// ============================================================================

/// History sink keeping entries in memory. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryHistory {
    entries: Arc<Mutex<Vec<(String, SessionId, HistoryStatus)>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, SessionId, HistoryStatus)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl LockHistory for MemoryHistory {
    async fn record_acquired(&self, name: &str, session: SessionId) -> LockResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LockError::Query("history table missing".into()));
        }
        self.entries
            .lock()
            .unwrap()
            .push((name.to_string(), session, HistoryStatus::Acquired));
        Ok(())
    }

    async fn record_released(&self, name: &str, session: SessionId) -> LockResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LockError::Query("history table missing".into()));
        }
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries
            .iter_mut()
            .rev()
            .find(|(n, s, st)| n == name && *s == session && *st == HistoryStatus::Acquired)
        {
            entry.2 = HistoryStatus::Released;
        }
        Ok(())
    }
}
