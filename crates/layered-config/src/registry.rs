//! The [`ProviderRegistry`]: a process-wide directory mapping an opaque [`ScopeKey`] to a built
//! [`Configuration`].
//!
//! Rust has no garbage collector, so there is nothing to weakly reference a scope's owner the way
//! a reflection-based host might weak-reference a class loader. This is modelled with an explicit
//! finalize signal instead: a [`ScopeKey`] is a cloneable handle around an `Arc`, and the *last*
//! handle being dropped is the "scope death" event. A low-priority watcher thread polls for that
//! event rather than requiring callers to remember to signal it, though [`ProviderRegistry::release`]
//! remains available for explicit, synchronous release.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    thread,
    time::Duration,
};

use crate::{
    config::{Configuration, ConfigurationBuilder},
    error::ConfigError,
    source::SourceProvider,
};

/// How often the auto-release watcher polls for dead scopes.
const WATCHER_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// An opaque identity token under which a [`Configuration`] is registered. Cloning a `ScopeKey`
/// shares the same underlying identity and keeps it alive; a scope "dies" — triggering
/// auto-release — once every clone has been dropped.
#[derive(Clone)]
pub struct ScopeKey(Arc<dyn Any + Send + Sync>);

impl ScopeKey {
    /// Wraps an arbitrary value as a scope identity.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// The process-wide scope used when a caller passes no explicit scope key. Kept alive for the
    /// process's lifetime, so it never triggers auto-release.
    pub fn ambient() -> Self {
        static AMBIENT: once_cell::sync::Lazy<Arc<()>> = once_cell::sync::Lazy::new(|| Arc::new(()));
        Self(AMBIENT.clone())
    }

    fn downgrade(&self) -> Weak<dyn Any + Send + Sync> {
        Arc::downgrade(&self.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl std::fmt::Debug for ScopeKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "ScopeKey({:#x})", self.addr())
    }
}

impl PartialEq for ScopeKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for ScopeKey {}

struct Binding {
    scope: Weak<dyn Any + Send + Sync>,
    config: Arc<Configuration>,
}

struct RegistryState {
    bindings: HashMap<usize, Binding>,
    closed: bool,
}

/// Process-wide directory of scope key -> built [`Configuration`].
///
/// All public operations are internally serialized on one mutex; the lock is released before any
/// user-supplied closer runs, so `release` called re-entrantly from within a closer (e.g. a
/// `Configuration` releasing itself as part of its own teardown) cannot deadlock.
pub struct ProviderRegistry {
    state: Mutex<RegistryState>,
    watcher_running: Arc<std::sync::atomic::AtomicBool>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.state.lock().unwrap().bindings.len();
        formatter
            .debug_struct("ProviderRegistry")
            .field("bindings", &count)
            .finish_non_exhaustive()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Arc::try_unwrap(Self::new())
            .unwrap_or_else(|_| unreachable!("new() returns a uniquely owned Arc"))
    }
}

impl ProviderRegistry {
    /// Creates an empty registry and starts its auto-release watcher daemon.
    pub fn new() -> Arc<Self> {
        let registry = Arc::new(Self {
            state: Mutex::new(RegistryState {
                bindings: HashMap::new(),
                closed: false,
            }),
            watcher_running: Arc::new(std::sync::atomic::AtomicBool::new(true)),
        });
        Self::spawn_watcher(&registry);
        registry
    }

    fn spawn_watcher(self_arc: &Arc<Self>) {
        let weak_self = Arc::downgrade(self_arc);
        thread::Builder::new()
            .name("layered-config-provider-watcher".into())
            .spawn(move || loop {
                thread::sleep(WATCHER_POLL_INTERVAL);
                let Some(registry) = weak_self.upgrade() else {
                    return;
                };
                if !registry.watcher_running.load(std::sync::atomic::Ordering::Relaxed) {
                    return;
                }
                registry.sweep_dead_scopes();
            })
            .expect("failed to spawn provider-registry watcher thread");
    }

    /// Releases any binding whose scope's last [`ScopeKey`] handle has been dropped.
    fn sweep_dead_scopes(&self) {
        let dead: Vec<(usize, Arc<Configuration>)> = {
            let state = self.state.lock().unwrap();
            state
                .bindings
                .iter()
                .filter(|(_, binding)| binding.scope.strong_count() == 0)
                .map(|(&addr, binding)| (addr, binding.config.clone()))
                .collect()
        };
        for (addr, config) in dead {
            tracing::info!(addr, "auto-releasing configuration for a collected scope");
            self.release_by_config(&config);
        }
    }

    /// Returns the [`Configuration`] bound to `scope`, if any.
    pub fn current(&self, scope: &ScopeKey) -> Option<Arc<Configuration>> {
        self.state
            .lock()
            .unwrap()
            .bindings
            .get(&scope.addr())
            .map(|binding| binding.config.clone())
    }

    /// Returns the `Configuration` bound to `scope`, building and registering one via `build` if
    /// none exists yet. The registry lock is held across the build so two concurrent callers for
    /// the same never-yet-bound scope cannot both win.
    pub fn current_or_init(
        &self,
        scope: &ScopeKey,
        build: impl FnOnce() -> Configuration,
    ) -> Result<Arc<Configuration>, ConfigError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(ConfigError::Closed);
        }
        if let Some(binding) = state.bindings.get(&scope.addr()) {
            return Ok(binding.config.clone());
        }
        let config = Arc::new(build());
        tracing::debug!(scope = ?scope, "built and registered default configuration");
        state.bindings.insert(
            scope.addr(),
            Binding {
                scope: scope.downgrade(),
                config: config.clone(),
            },
        );
        Ok(config)
    }

    /// Returns the `Configuration` bound to `scope`, or atomically builds and binds one wired
    /// with every default turned on — default sources and discovered sources from `providers` —
    /// if none exists yet.
    pub fn current_or_init_default(
        &self,
        scope: &ScopeKey,
        providers: impl IntoIterator<Item = Arc<dyn SourceProvider>>,
    ) -> Result<Arc<Configuration>, ConfigError> {
        self.current_or_init(scope, || {
            ConfigurationBuilder::new()
                .add_default_sources()
                .add_discovered_sources()
                .with_source_providers(providers)
                .for_scope(scope.clone())
                .build()
        })
    }

    /// Binds `config` to `scope`. Fails with [`ConfigError::AlreadyBound`] if `scope` already has
    /// a live binding.
    pub fn register(&self, scope: &ScopeKey, config: Arc<Configuration>) -> Result<(), ConfigError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(ConfigError::Closed);
        }
        if state.bindings.contains_key(&scope.addr()) {
            return Err(ConfigError::AlreadyBound { scope: scope.clone() });
        }
        tracing::debug!(scope = ?scope, "registered configuration");
        state.bindings.insert(
            scope.addr(),
            Binding {
                scope: scope.downgrade(),
                config,
            },
        );
        Ok(())
    }

    /// Removes every binding pointing at `config` and, if `config` exposes a closer, invokes it.
    /// A `Configuration` may be bound under multiple scopes; all of them are released together.
    pub fn release(&self, config: &Arc<Configuration>) -> Result<(), ConfigError> {
        self.release_by_config(config)
    }

    fn release_by_config(&self, config: &Arc<Configuration>) -> Result<(), ConfigError> {
        let removed = {
            let mut state = self.state.lock().unwrap();
            let addrs: Vec<usize> = state
                .bindings
                .iter()
                .filter(|(_, binding)| Arc::ptr_eq(&binding.config, config))
                .map(|(&addr, _)| addr)
                .collect();
            for addr in &addrs {
                state.bindings.remove(addr);
            }
            !addrs.is_empty()
        };
        // The lock is dropped before we ever touch user-supplied close logic.
        if removed {
            tracing::debug!("released configuration");
            config.close()?;
        }
        Ok(())
    }

    /// Releases every currently registered configuration, aggregating cleanup failures into one
    /// [`ConfigError::Aggregate`]. Idempotent: calling `close` again performs no additional
    /// releases.
    pub fn close(&self) -> Result<(), ConfigError> {
        let configs: Vec<Arc<Configuration>> = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            let configs = state.bindings.values().map(|b| b.config.clone()).collect();
            state.bindings.clear();
            configs
        };
        self.watcher_running.store(false, std::sync::atomic::Ordering::Relaxed);

        let mut errors = Vec::new();
        for config in configs {
            if let Err(err) = config.close() {
                errors.push(err);
            }
        }
        ConfigError::aggregate(errors)
    }
}
