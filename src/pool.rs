//! STOWAGE - Store Pool
//! Hands out named stores, opening them lazily and closing the ones left idle.
//!
//! ## Concurrency Model
//! - The registry is a `Mutex<HashMap>`. A new store's engine is built outside
//!   that lock and inserted only if the name is still free, so concurrent
//!   lookups of a new name share one store and the engine factory may call
//!   back into the pool.
//! - A background sweeper thread wakes every `manager_interval` and closes
//!   entries that are idle and not kept alive.
//! - Closes started by the sweep or `close_all` run on their own threads and
//!   report completion through a `Drain`.
//!
//! Closing a store removes it from the registry but does not invalidate
//! `Arc<Store>` handles callers already hold. Such a handle reopens its engine
//! on next use, outside the pool's control.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::config::PoolConfig;
use crate::engine::{Engine, LsmEngine};
use crate::error::Result;
use crate::event::{StoreEvent, Subscriber};
use crate::store::Store;

/// Builds the (closed) engine for the store called `name`.
pub type EngineFactory = Arc<dyn Fn(&PoolConfig, &str) -> Box<dyn Engine> + Send + Sync>;

/// Called with the store name once the pool has closed and dropped that store.
pub type CloseCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Options applied when `get_store` creates a store.
///
/// They are ignored when the store is already registered: the values given
/// on first creation stay in effect until the store leaves the pool.
#[derive(Clone, Default)]
pub struct StoreOptions {
    /// Exempt the store from idle sweeps.
    pub keepalive: bool,
    pub on_close: Option<CloseCallback>,
    pub on_event: Option<Subscriber>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(callback));
        self
    }

    pub fn on_event<F>(mut self, subscriber: F) -> Self
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(subscriber));
        self
    }
}

struct StoreEntry {
    store: Arc<Store>,
    last_accessed: Instant,
    keepalive: bool,
    on_close: Option<CloseCallback>,
}

struct Sweeper {
    /// Sending, or dropping the sender with the pool, ends the sweeper loop.
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

struct PoolInner {
    config: PoolConfig,
    factory: EngineFactory,
    registry: Mutex<HashMap<String, StoreEntry>>,
    sweeper: Mutex<Option<Sweeper>>,
}

/// Pending closes started by a sweep or `close_all`.
///
/// Dropping a `Drain` leaves the closes running; `wait` blocks until they finish.
#[must_use = "dropping a Drain does not wait for the closes to finish"]
pub struct Drain {
    handles: Vec<JoinHandle<bool>>,
    removed_inline: usize,
}

impl Drain {
    fn empty() -> Self {
        Self {
            handles: Vec::new(),
            removed_inline: 0,
        }
    }

    /// Number of closes started.
    pub fn len(&self) -> usize {
        self.handles.len() + self.removed_inline
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until every close has finished. Returns how many entries were
    /// removed from the registry by these closes.
    pub fn wait(self) -> usize {
        let mut removed = self.removed_inline;
        for handle in self.handles {
            match handle.join() {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(_) => log::warn!("A store close thread panicked"),
            }
        }
        removed
    }
}

/// Registry of named stores under one root directory.
///
/// Cloning a `Pool` yields another handle to the same registry. The sweeper
/// stops when the last handle is dropped.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool over `config.root_path` using `LsmEngine` stores, and start the sweeper.
    ///
    /// Fails with `StorageError::Config` if `config` does not validate.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let factory: EngineFactory = Arc::new(|config: &PoolConfig, name: &str| {
            Box::new(LsmEngine::new(config.engine_config(name))) as Box<dyn Engine>
        });
        Self::with_engine_factory(config, factory)
    }

    /// Create a pool whose stores use engines built by `factory`, and start the sweeper.
    pub fn with_engine_factory(config: PoolConfig, factory: EngineFactory) -> Result<Self> {
        config.validate()?;
        let pool = Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                registry: Mutex::new(HashMap::new()),
                sweeper: Mutex::new(None),
            }),
        };
        pool.start();
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, StoreEntry>> {
        self.inner.registry()
    }

    /// Return the store called `name`, creating it on first use.
    ///
    /// A lookup of a registered store refreshes its idle timer; `options` only
    /// apply when the store is created. The engine is not opened here.
    pub fn get_store(&self, name: &str, options: StoreOptions) -> Arc<Store> {
        if let Some(store) = self.touch(name) {
            return store;
        }

        // The factory runs unlocked; re-check in case another lookup won the race.
        let engine = (self.inner.factory)(&self.inner.config, name);
        let mut registry = self.registry();
        if let Some(entry) = registry.get_mut(name) {
            entry.last_accessed = Instant::now();
            log::debug!("Store '{}' registered concurrently; dropping spare engine", name);
            return Arc::clone(&entry.store);
        }
        let store = Arc::new(Store::new(name, engine));
        if let Some(subscriber) = options.on_event {
            store.set_subscriber(Some(subscriber));
        }
        registry.insert(
            name.to_string(),
            StoreEntry {
                store: Arc::clone(&store),
                last_accessed: Instant::now(),
                keepalive: options.keepalive,
                on_close: options.on_close,
            },
        );
        log::info!("Store '{}' registered (keepalive: {})", name, options.keepalive);
        store
    }

    /// Refresh and return a registered store.
    fn touch(&self, name: &str) -> Option<Arc<Store>> {
        let mut registry = self.registry();
        let entry = registry.get_mut(name)?;
        entry.last_accessed = Instant::now();
        log::debug!("Store '{}' used", name);
        Some(Arc::clone(&entry.store))
    }

    /// Shorthand for `get_store(name, StoreOptions::default())`.
    pub fn store(&self, name: &str) -> Arc<Store> {
        self.get_store(name, StoreOptions::default())
    }

    /// Close the store called `name` and remove it. Returns false if it was not registered.
    pub fn close(&self, name: &str) -> bool {
        let store = match self.registry().get(name) {
            Some(entry) => Arc::clone(&entry.store),
            None => return false,
        };
        self.inner.close_entry(name, &store);
        true
    }

    /// Start closing and removing every registered store without waiting.
    pub fn close_all(&self) -> Drain {
        let snapshot: Vec<(String, Arc<Store>)> = self
            .registry()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.store)))
            .collect();
        PoolInner::spawn_closes(&self.inner, snapshot)
    }

    /// Run one idle sweep now.
    pub fn sweep(&self) -> Drain {
        PoolInner::sweep(&self.inner)
    }

    /// Start the periodic sweep. Does nothing if it is already running.
    pub fn start(&self) {
        let mut sweeper = self.inner.sweeper();
        if sweeper.is_some() {
            log::debug!("Sweeper already running");
            return;
        }
        let (stop, stopped) = mpsc::channel::<()>();
        let interval = self.inner.config.manager_interval;
        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let spawned = thread::Builder::new()
            .name("stowage-sweeper".into())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(inner) = weak.upgrade() else { break };
                        // Closes run detached; the next tick does not wait for them.
                        drop(PoolInner::sweep(&inner));
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });
        match spawned {
            Ok(handle) => *sweeper = Some(Sweeper { stop, handle }),
            Err(e) => log::error!("Failed to start sweeper thread: {}", e),
        }
    }

    /// Stop the periodic sweep. Registered stores stay open.
    pub fn stop(&self) {
        let Some(sweeper) = self.inner.sweeper().take() else {
            return;
        };
        let _ = sweeper.stop.send(());
        if sweeper.handle.thread().id() != thread::current().id()
            && sweeper.handle.join().is_err()
        {
            log::warn!("Sweeper thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.sweeper().is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry().contains_key(name)
    }

    /// Registered store names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }

    /// Exempt a registered store from idle sweeps, or make it eligible again.
    /// Returns false if the store is not registered.
    pub fn set_keepalive(&self, name: &str, keepalive: bool) -> bool {
        match self.registry().get_mut(name) {
            Some(entry) => {
                entry.keepalive = keepalive;
                true
            }
            None => false,
        }
    }
}

impl PoolInner {
    fn registry(&self) -> MutexGuard<'_, HashMap<String, StoreEntry>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweeper(&self) -> MutexGuard<'_, Option<Sweeper>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select idle entries from a snapshot of the registry and close them.
    fn sweep(inner: &Arc<PoolInner>) -> Drain {
        let now = Instant::now();
        let interval = inner.config.manager_interval;
        let idle: Vec<(String, Arc<Store>)> = inner
            .registry()
            .iter()
            .filter(|(_, entry)| {
                !entry.keepalive && now.saturating_duration_since(entry.last_accessed) >= interval
            })
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.store)))
            .collect();
        log::debug!("Sweep: {} idle store(s)", idle.len());
        if idle.is_empty() {
            return Drain::empty();
        }
        Self::spawn_closes(inner, idle)
    }

    fn spawn_closes(inner: &Arc<PoolInner>, targets: Vec<(String, Arc<Store>)>) -> Drain {
        let mut drain = Drain::empty();
        for (name, store) in targets {
            let worker = Arc::clone(inner);
            let thread_name = format!("stowage-close-{name}");
            let spawned = thread::Builder::new().name(thread_name).spawn({
                let name = name.clone();
                let store = Arc::clone(&store);
                move || worker.close_entry(&name, &store)
            });
            match spawned {
                Ok(handle) => drain.handles.push(handle),
                Err(e) => {
                    log::warn!("Closing store '{}' inline: {}", name, e);
                    if inner.close_entry(&name, &store) {
                        drain.removed_inline += 1;
                    }
                }
            }
        }
        drain
    }

    /// Close `store`, drop its entry if the registry still holds that same
    /// store, then run the entry's close callback.
    ///
    /// Close failures are logged and the entry is removed anyway. Returns
    /// whether this call removed the entry.
    fn close_entry(&self, name: &str, store: &Arc<Store>) -> bool {
        if let Err(e) = store.close() {
            log::warn!("Failed to close store '{}': {}", name, e);
        }
        let removed = {
            let mut registry = self.registry();
            match registry.get(name) {
                Some(entry) if Arc::ptr_eq(&entry.store, store) => registry.remove(name),
                _ => None,
            }
        };
        match removed {
            Some(entry) => {
                log::info!("Store '{}' closed", name);
                if let Some(on_close) = entry.on_close {
                    on_close(name);
                }
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("root_path", &self.inner.config.root_path)
            .field("manager_interval", &self.inner.config.manager_interval)
            .field("stores", &self.names())
            .finish()
    }
}
