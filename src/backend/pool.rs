//! Connection pool for reasoning backends.
//!
//! The pool owns up to `pool_size` member connections. A checkout hands one
//! of them out behind a [`PooledConnection`] guard, and dropping the guard
//! returns it. Callers that cannot get a member within their timeout receive
//! a temporary connection instead, which is discarded after use.
//!
//! Every connection is loaded with the current knowledge base when it is
//! created. Replacing the knowledge base bumps a generation counter. Members
//! built from an older generation are discarded instead of being returned,
//! and discarded members are replenished in the background.

use crate::backend::connection::{BackendFactory, ReasoningBackend};
use crate::backend::knowledge_base::KnowledgeBase;
use crate::backend::types::{BackendError, ConnectionId, ConnectionKind, PoolConfig, PoolStatus};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Shared pool of reasoning backend connections
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn BackendFactory>,
    idle: Mutex<VecDeque<PoolEntry>>,
    available: Notify,
    knowledge: RwLock<KnowledgeState>,
    /// Pooled connections alive, idle or checked out
    members: AtomicUsize,
    checked_out: AtomicUsize,
    closed: AtomicBool,
    counters: PoolCounters,
}

struct KnowledgeState {
    base: KnowledgeBase,
    generation: u64,
}

#[derive(Default)]
struct PoolCounters {
    checkouts: AtomicU64,
    temporary_created: AtomicU64,
    discarded: AtomicU64,
    replenished: AtomicU64,
}

struct PoolEntry {
    id: ConnectionId,
    backend: Box<dyn ReasoningBackend>,
    generation: u64,
}

impl ConnectionPool {
    /// Create the pool and eagerly open `pool_size` connections
    pub async fn new(
        factory: Arc<dyn BackendFactory>,
        config: PoolConfig,
        knowledge_base: KnowledgeBase,
    ) -> Result<Self, BackendError> {
        let backend_name = factory.backend_name();
        let pool_size = config.pool_size;
        let shared = Arc::new(PoolShared {
            config,
            factory,
            idle: Mutex::new(VecDeque::with_capacity(pool_size)),
            available: Notify::new(),
            knowledge: RwLock::new(KnowledgeState {
                base: knowledge_base,
                generation: 0,
            }),
            members: AtomicUsize::new(0),
            checked_out: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            counters: PoolCounters::default(),
        });

        for _ in 0..pool_size {
            let entry = shared.create_connection(ConnectionKind::Pooled).await?;
            shared.members.fetch_add(1, Ordering::SeqCst);
            shared.lock_idle().push_back(entry);
        }

        info!(
            "Initialized {} connection pool with {} connections",
            backend_name, pool_size
        );
        Ok(Self { shared })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Check out a connection, waiting up to `timeout` for an idle member.
    ///
    /// When the wait times out a temporary connection is created instead, so
    /// checkout only fails if that connection cannot be opened or the pool is
    /// closed.
    pub async fn checkout(&self, timeout: Duration) -> Result<PooledConnection, BackendError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(BackendError::Unavailable("connection pool is closed".to_string()));
            }

            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.shared.pop_idle() {
                return Ok(self.hand_out(entry, ConnectionKind::Pooled));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        warn!(
            "No pooled connection available after {:?}, creating temporary connection",
            timeout
        );
        let entry = self.shared.create_connection(ConnectionKind::Temporary).await?;
        self.shared
            .counters
            .temporary_created
            .fetch_add(1, Ordering::Relaxed);
        Ok(self.hand_out(entry, ConnectionKind::Temporary))
    }

    fn hand_out(&self, entry: PoolEntry, kind: ConnectionKind) -> PooledConnection {
        self.shared.checked_out.fetch_add(1, Ordering::SeqCst);
        self.shared.counters.checkouts.fetch_add(1, Ordering::Relaxed);
        debug!("Checked out {} connection {}", kind_label(kind), entry.id);
        PooledConnection {
            backend: Some(entry.backend),
            id: entry.id,
            kind,
            generation: entry.generation,
            checked_out_at: Instant::now(),
            pool: Arc::clone(&self.shared),
        }
    }

    /// Replace the knowledge base used by every future connection.
    ///
    /// Idle members are rebuilt immediately; checked-out members are
    /// discarded when they come back. Returns the new generation.
    pub async fn set_knowledge_base(&self, knowledge_base: KnowledgeBase) -> u64 {
        let expressions = knowledge_base.len();
        let generation = {
            let mut state = self
                .shared
                .knowledge
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            state.base = knowledge_base;
            state.generation += 1;
            state.generation
        };

        let drained: Vec<PoolEntry> = self.shared.lock_idle().drain(..).collect();
        for entry in drained {
            self.shared.discard(entry.id, "knowledge base replaced");
        }

        self.shared.refill().await;
        info!(
            "Knowledge base updated to generation {} ({} expressions)",
            generation, expressions
        );
        generation
    }

    pub fn knowledge_base(&self) -> KnowledgeBase {
        self.shared.knowledge_snapshot().0
    }

    pub fn status(&self) -> PoolStatus {
        let (knowledge, generation) = self.shared.knowledge_snapshot();
        let counters = &self.shared.counters;
        PoolStatus {
            pool_size: self.shared.config.pool_size,
            idle: self.shared.lock_idle().len(),
            members: self.shared.members.load(Ordering::SeqCst),
            checked_out: self.shared.checked_out.load(Ordering::SeqCst),
            total_checkouts: counters.checkouts.load(Ordering::Relaxed),
            temporary_created: counters.temporary_created.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            replenished: counters.replenished.load(Ordering::Relaxed),
            knowledge_base_expressions: knowledge.len(),
            knowledge_base_generation: generation,
            closed: self.shared.closed.load(Ordering::SeqCst),
        }
    }

    /// Close the pool: idle connections are dropped and later returns are discarded
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<PoolEntry> = self.shared.lock_idle().drain(..).collect();
        let count = drained.len();
        for entry in drained {
            self.shared.discard(entry.id, "pool closed");
        }
        self.shared.available.notify_waiters();
        info!("Connection pool closed, dropped {} idle connections", count);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Wait until background replenishment has restored every member
    pub async fn wait_for_members(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.shared.members.load(Ordering::SeqCst) >= self.shared.config.pool_size {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl PoolShared {
    fn lock_idle(&self) -> MutexGuard<'_, VecDeque<PoolEntry>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn knowledge_snapshot(&self) -> (KnowledgeBase, u64) {
        let state = self.knowledge.read().unwrap_or_else(PoisonError::into_inner);
        (state.base.clone(), state.generation)
    }

    fn current_generation(&self) -> u64 {
        self.knowledge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    /// Pop an idle member built from the current knowledge base
    fn pop_idle(self: &Arc<Self>) -> Option<PoolEntry> {
        let generation = self.current_generation();
        loop {
            let entry = self.lock_idle().pop_front()?;
            if entry.generation == generation {
                return Some(entry);
            }
            self.discard(entry.id, "outdated knowledge base");
            self.spawn_replenish();
        }
    }

    async fn create_connection(&self, kind: ConnectionKind) -> Result<PoolEntry, BackendError> {
        let id = ConnectionId::new(kind);
        let (knowledge, generation) = self.knowledge_snapshot();

        let mut backend = self.factory.connect(&id).await?;
        for expression in knowledge.expressions() {
            if let Err(e) = backend.load_expression(expression).await {
                warn!("Connection {} rejected knowledge-base expression: {}", id, e);
            }
        }

        debug!(
            "Created {} connection {} ({} expressions loaded)",
            kind_label(kind),
            id,
            knowledge.len()
        );
        Ok(PoolEntry {
            id,
            backend,
            generation,
        })
    }

    fn release(self: &Arc<Self>, entry: PoolEntry, kind: ConnectionKind, held: Duration) {
        self.checked_out.fetch_sub(1, Ordering::SeqCst);

        if kind == ConnectionKind::Temporary {
            debug!("Discarding temporary connection {} after {:?}", entry.id, held);
            return;
        }

        let reason = if self.closed.load(Ordering::SeqCst) {
            "pool closed"
        } else if held >= self.config.staleness_threshold {
            warn!("Connection {} held for {:?}, discarding as stale", entry.id, held);
            "held past staleness threshold"
        } else if entry.generation != self.current_generation() {
            "outdated knowledge base"
        } else {
            let Err(entry) = self.return_to_idle(entry) else {
                return;
            };
            self.discard(entry.id, "idle queue full");
            return;
        };

        self.discard(entry.id, reason);
        self.spawn_replenish();
    }

    /// Push a member back to the idle queue unless the queue is already full
    fn return_to_idle(&self, entry: PoolEntry) -> Result<(), PoolEntry> {
        {
            let mut idle = self.lock_idle();
            if idle.len() >= self.config.pool_size {
                return Err(entry);
            }
            debug!("Returned connection {} to pool", entry.id);
            idle.push_back(entry);
        }
        self.available.notify_one();
        Ok(())
    }

    fn discard(&self, id: ConnectionId, reason: &str) {
        self.members.fetch_sub(1, Ordering::SeqCst);
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        debug!("Discarded connection {}: {}", id, reason);
    }

    fn spawn_replenish(self: &Arc<Self>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(self);
                handle.spawn(async move { shared.replenish().await });
            }
            Err(_) => warn!("No async runtime available, connection pool stays below capacity"),
        }
    }

    /// Reserve a member slot and open a connection for it; false when the pool is full or closed
    async fn replenish(self: &Arc<Self>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let pool_size = self.config.pool_size;
        if self
            .members
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |m| {
                (m < pool_size).then_some(m + 1)
            })
            .is_err()
        {
            return false;
        }

        match self.create_connection(ConnectionKind::Pooled).await {
            Ok(entry) => {
                self.counters.replenished.fetch_add(1, Ordering::Relaxed);
                if self.closed.load(Ordering::SeqCst) {
                    self.discard(entry.id, "pool closed");
                    return false;
                }
                if entry.generation != self.current_generation() {
                    self.discard(entry.id, "outdated knowledge base");
                    self.spawn_replenish();
                    return false;
                }
                if let Err(entry) = self.return_to_idle(entry) {
                    self.discard(entry.id, "idle queue full");
                    return false;
                }
                true
            }
            Err(e) => {
                self.members.fetch_sub(1, Ordering::SeqCst);
                warn!("Failed to replenish connection pool: {}", e);
                false
            }
        }
    }

    async fn refill(self: &Arc<Self>) {
        while self.replenish().await {}
    }
}

/// A connection checked out of the pool; returned (or discarded) on drop
pub struct PooledConnection {
    backend: Option<Box<dyn ReasoningBackend>>,
    id: ConnectionId,
    kind: ConnectionKind,
    generation: u64,
    checked_out_at: Instant,
    pool: Arc<PoolShared>,
}

impl PooledConnection {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn held_for(&self) -> Duration {
        self.checked_out_at.elapsed()
    }

    pub fn backend(&mut self) -> &mut dyn ReasoningBackend {
        self.backend
            .as_deref_mut()
            .expect("backend is only taken when the guard is dropped")
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.take() {
            let entry = PoolEntry {
                id: self.id.clone(),
                backend,
                generation: self.generation,
            };
            self.pool.release(entry, self.kind, self.checked_out_at.elapsed());
        }
    }
}

fn kind_label(kind: ConnectionKind) -> &'static str {
    match kind {
        ConnectionKind::Pooled => "pooled",
        ConnectionKind::Temporary => "temporary",
    }
}
