//! Module Registry
//!
//! Dependency-graph lifecycle controller for named capability modules.
//! Registration order is irrelevant to final correctness: every
//! registration re-runs the initialization queue, which initializes
//! whatever just became ready, in topological order.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::InspectorConfig;

/// Uniform lifecycle contract for module exports.
///
/// Every method is optional; the defaults do nothing.
pub trait ModuleLifecycle {
    fn initialize(&self) {}
    fn cleanup(&self) {}
    fn on_state_change(&self, _enabled: bool) {}
}

/// Module with nothing to export.
impl ModuleLifecycle for () {}

/// Error returned by a module init function.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ModuleInitError(pub String);

/// Init function run inside the registry's failure boundary.
pub type InitFn = Box<dyn FnMut() -> Result<(), ModuleInitError>>;

/// Registry failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("module already registered: {0}")]
    AlreadyRegistered(String),

    #[error("dependency cycle among modules: {}", .members.join(", "))]
    DependencyCycle { members: Vec<String> },
}

struct ModuleDescriptor {
    name: String,
    dependencies: Vec<String>,
    init: Option<InitFn>,
    exports: Rc<dyn ModuleLifecycle>,
    loaded: bool,
    initialized: bool,
    failed: bool,
    retry_count: u32,
    next_retry: Option<Instant>,
}

/// Diagnostics snapshot for one module.
#[derive(Debug, Clone)]
pub struct ModuleState {
    pub loaded: bool,
    pub initialized: bool,
    pub failed: bool,
    pub retry_count: u32,
    pub dependencies: Vec<String>,
    pub missing_dependencies: Vec<String>,
}

/// Dependency-graph lifecycle controller.
pub struct ModuleRegistry {
    modules: RefCell<HashMap<String, ModuleDescriptor>>,
    max_retries: u32,
    retry_base_delay: Duration,
    poll_interval: Duration,
}

impl ModuleRegistry {
    pub fn new(config: &InspectorConfig) -> Self {
        Self {
            modules: RefCell::new(HashMap::new()),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay(),
            poll_interval: config.registry_poll_interval(),
        }
    }

    /// Record a module and immediately initialize whatever became ready.
    ///
    /// The module is recorded even when the returned queue pass reports a
    /// dependency cycle; the cycle participants are what failed.
    pub fn register(
        &self,
        name: &str,
        dependencies: &[&str],
        init: InitFn,
        exports: Rc<dyn ModuleLifecycle>,
    ) -> Result<(), RegistryError> {
        {
            let mut modules = self.modules.borrow_mut();
            if modules.contains_key(name) {
                return Err(RegistryError::AlreadyRegistered(name.to_string()));
            }
            modules.insert(
                name.to_string(),
                ModuleDescriptor {
                    name: name.to_string(),
                    dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
                    init: Some(init),
                    exports,
                    loaded: true,
                    initialized: false,
                    failed: false,
                    retry_count: 0,
                    next_retry: None,
                },
            );
        }
        tracing::debug!("module '{}' registered ({} dependencies)", name, dependencies.len());

        self.process_initialization_queue()
    }

    /// Whether every dependency of a module is registered and initialized.
    ///
    /// Readiness deliberately requires full initialization of dependencies,
    /// not mere registration: a module must never observe a dependency whose
    /// init has not run.
    pub fn are_dependencies_ready(&self, name: &str) -> bool {
        let modules = self.modules.borrow();
        match modules.get(name) {
            Some(desc) => desc
                .dependencies
                .iter()
                .all(|dep| modules.get(dep).is_some_and(|d| d.initialized)),
            None => false,
        }
    }

    /// Attempt to initialize one module.
    ///
    /// Returns false when the module is unknown, already initialized,
    /// permanently failed, not dependency-ready, or inside a retry delay.
    pub fn initialize_module(&self, name: &str) -> bool {
        {
            let modules = self.modules.borrow();
            let Some(desc) = modules.get(name) else {
                return false;
            };
            if !desc.loaded || desc.initialized || desc.failed {
                return false;
            }
            if let Some(due) = desc.next_retry {
                if Instant::now() < due {
                    return false;
                }
            }
            let ready = desc
                .dependencies
                .iter()
                .all(|dep| modules.get(dep).is_some_and(|d| d.initialized));
            if !ready {
                return false;
            }
        }

        // Run init outside the borrow; init functions may call back in.
        let mut init = match self.modules.borrow_mut().get_mut(name) {
            Some(desc) => desc.init.take(),
            None => return false,
        };
        let result = match init.as_mut() {
            Some(init) => init(),
            None => Ok(()),
        };

        let mut modules = self.modules.borrow_mut();
        let Some(desc) = modules.get_mut(name) else {
            return false;
        };
        match result {
            Ok(()) => {
                desc.initialized = true;
                desc.next_retry = None;
                tracing::debug!("module '{}' initialized", name);
                true
            }
            Err(err) => {
                desc.init = init;
                desc.retry_count += 1;
                if desc.retry_count >= self.max_retries {
                    desc.failed = true;
                    desc.next_retry = None;
                    tracing::error!(
                        "module '{}' failed permanently after {} attempts: {}",
                        name,
                        desc.retry_count,
                        err
                    );
                } else {
                    let delay = self.retry_base_delay * desc.retry_count;
                    desc.next_retry = Some(Instant::now() + delay);
                    tracing::warn!(
                        "module '{}' init failed (attempt {}), retrying in {:?}: {}",
                        name,
                        desc.retry_count,
                        delay,
                        err
                    );
                }
                false
            }
        }
    }

    /// Initialize every ready module, in topological order.
    ///
    /// A dependency cycle permanently fails every participant and is
    /// reported; modules waiting on a retry delay or an unready dependency
    /// are skipped this pass, not failed.
    pub fn process_initialization_queue(&self) -> Result<(), RegistryError> {
        let (mut in_degree, dependents) = {
            let modules = self.modules.borrow();
            let candidates: HashSet<String> = modules
                .values()
                .filter(|d| d.loaded && !d.initialized && !d.failed)
                .map(|d| d.name.clone())
                .collect();

            let mut in_degree: HashMap<String, usize> =
                candidates.iter().map(|name| (name.clone(), 0)).collect();
            let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
            for name in &candidates {
                let Some(desc) = modules.get(name) else {
                    continue;
                };
                for dep in &desc.dependencies {
                    if candidates.contains(dep) {
                        if let Some(degree) = in_degree.get_mut(name) {
                            *degree += 1;
                        }
                        dependents.entry(dep.clone()).or_default().push(name.clone());
                    }
                }
            }
            (in_degree, dependents)
        };

        let mut ready: Vec<String> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| name.clone())
            .collect();
        ready.sort_unstable();

        // Kahn's algorithm over the pending subgraph. Edges resolve
        // structurally whether or not the init succeeded: a dependent of a
        // failed init simply fails its own readiness check.
        let mut visited = 0usize;
        while let Some(name) = ready.pop() {
            visited += 1;
            self.initialize_module(&name);
            if let Some(children) = dependents.get(&name) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push(child.clone());
                        }
                    }
                }
            }
        }

        if visited == in_degree.len() {
            return Ok(());
        }

        // Whatever Kahn could not order sits on (or behind) a cycle.
        let mut members: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name)
            .collect();
        members.sort_unstable();

        let mut modules = self.modules.borrow_mut();
        for name in &members {
            if let Some(desc) = modules.get_mut(name) {
                desc.failed = true;
                desc.next_retry = None;
            }
        }
        Err(RegistryError::DependencyCycle { members })
    }

    /// Whether a module is loaded and initialized.
    pub fn is_ready(&self, name: &str) -> bool {
        self.modules
            .borrow()
            .get(name)
            .is_some_and(|d| d.loaded && d.initialized)
    }

    /// Poll until every named module is ready, bounded by the timeout.
    ///
    /// The deadline is hard; it does not cancel initialization attempts,
    /// which may still succeed later. Each pass re-runs the queue so retry
    /// delays take effect.
    pub async fn wait_for_modules(&self, names: &[&str], timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if let Err(err) = self.process_initialization_queue() {
                tracing::error!("initialization queue: {}", err);
            }
            if names.iter().all(|name| self.is_ready(name)) {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!("timed out waiting for modules: {:?}", names);
                return false;
            }
            smol::Timer::after(self.poll_interval).await;
        }
    }

    /// Guarded accessor: a missing module logs a warning and degrades the
    /// caller instead of crashing it.
    pub fn get_module(&self, name: &str) -> Option<Rc<dyn ModuleLifecycle>> {
        let module = self.modules.borrow().get(name).map(|d| d.exports.clone());
        if module.is_none() {
            tracing::warn!("module '{}' requested but not registered", name);
        }
        module
    }

    /// Dependencies of a module that are unregistered, failed, or not yet
    /// initialized. A dependent blocked on a permanent failure shows up
    /// here.
    pub fn get_missing_dependencies(&self, name: &str) -> Vec<String> {
        let modules = self.modules.borrow();
        match modules.get(name) {
            Some(desc) => desc
                .dependencies
                .iter()
                .filter(|dep| !modules.get(*dep).is_some_and(|d| d.initialized))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Diagnostics snapshot of every module.
    pub fn module_state(&self) -> HashMap<String, ModuleState> {
        let modules = self.modules.borrow();
        modules
            .values()
            .map(|desc| {
                let missing = desc
                    .dependencies
                    .iter()
                    .filter(|dep| !modules.get(*dep).is_some_and(|d| d.initialized))
                    .cloned()
                    .collect();
                (
                    desc.name.clone(),
                    ModuleState {
                        loaded: desc.loaded,
                        initialized: desc.initialized,
                        failed: desc.failed,
                        retry_count: desc.retry_count,
                        dependencies: desc.dependencies.clone(),
                        missing_dependencies: missing,
                    },
                )
            })
            .collect()
    }

    /// Propagate an enabled/disabled transition to every registered module.
    pub fn broadcast_state_change(&self, enabled: bool) {
        let exports: Vec<Rc<dyn ModuleLifecycle>> = self
            .modules
            .borrow()
            .values()
            .map(|d| d.exports.clone())
            .collect();
        for module in exports {
            module.on_state_change(enabled);
        }
    }

    /// Run every registered module's cleanup.
    pub fn cleanup_all(&self) {
        let exports: Vec<Rc<dyn ModuleLifecycle>> = self
            .modules
            .borrow()
            .values()
            .map(|d| d.exports.clone())
            .collect();
        for module in exports {
            module.cleanup();
        }
    }
}
