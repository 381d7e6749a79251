//! Stage: lifecycle and wiring of one cluster node.
//!
//! A [`Stage`] collects configuration, then on [`Stage::start`] builds the
//! subsystems that were not injected, classifies the provider list, wires
//! the subsystems to each other, starts them and joins the cluster.
//!
//! # Lifecycle
//!
//! ```text
//! Configuring ──start──► Starting ──join ok──► Running ──stop──► Stopping ──► Stopped
//!      ▲                    │                                        ▲
//!      └── config error ────┘ (state unchanged)     Starting ──stop──┘
//! ```
//!
//! 1. **Configuring**: setters accepted. Invoking start locks the mode,
//!    even when start then fails validation.
//! 2. **Starting**: messaging, hosting and execution start in that order,
//!    then the cluster peer joins. A failure here leaves the started
//!    subsystems running; call [`Stage::stop`] to tear them down.
//! 3. **Running**: the node is an addressable cluster member. The first
//!    stage to get here becomes the process default stage.
//! 4. **Stopping**: execution drains, then the node leaves the cluster.
//!    The stage ends `Stopped` whether or not that succeeded.
//!
//! # Wiring
//!
//! Subsystems are constructed without references to each other, then
//! wired in a fixed order before any of them starts:
//!
//! ```text
//! hosting.set_node_type
//! execution.set_clock / set_hosting / set_messaging / set_executor
//! messaging.set_execution / set_clock / set_executor
//! hosting.set_execution / set_cluster_peer
//! messaging.set_cluster_peer
//! execution.set_stage / set_auto_discovery
//! execution.set_stage_providers / set_actor_class_patterns / set_actor_classes
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actor::{ActorObserver, Invocation};
use crate::binding;
use crate::config::{StageConfig, StageMode};
use crate::container::{Container, ContainerLifetime};
use crate::error::{ConfigError, InvokeError, StageError};
use crate::interface::ActorInterface;
use crate::provider::{classify, ProviderEntry};
use crate::reference::{ActorRef, ObserverRef, Reference, ReferenceFactory};
use crate::subsystems::{
    ClusterPeer, Execution, Hosting, InMemoryClusterPeer, InMemoryNetwork, LocalExecution,
    LocalHosting, LocalMessaging, Messaging, Subsystem,
};
use crate::sync::lock;
use crate::time::{Clock, SystemClock};

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique stage identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StageId(u64);

impl StageId {
    fn next() -> Self {
        Self(NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}

/// Lifecycle state of a [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    /// Accepting configuration.
    Configuring,
    /// Subsystems starting and cluster join in progress.
    Starting,
    /// Addressable cluster member.
    Running,
    /// Draining.
    Stopping,
    /// Left the cluster.
    Stopped,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuring => write!(f, "configuring"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Who controls a subsystem's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemOwnership {
    /// Created by the stage at start.
    Owned,
    /// Supplied by the caller before start.
    Injected,
}

struct Slot<T: ?Sized> {
    value: Option<Arc<T>>,
    ownership: SubsystemOwnership,
}

impl<T: ?Sized> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            ownership: SubsystemOwnership::Owned,
        }
    }
}

impl<T: ?Sized> Slot<T> {
    fn inject(&mut self, value: Arc<T>) {
        self.value = Some(value);
        self.ownership = SubsystemOwnership::Injected;
    }

    fn get(&self) -> Option<Arc<T>> {
        self.value.clone()
    }

    fn get_or_create(&mut self, create: impl FnOnce() -> Arc<T>) -> Arc<T> {
        match &self.value {
            Some(value) => Arc::clone(value),
            None => {
                let value = create();
                self.value = Some(Arc::clone(&value));
                self.ownership = SubsystemOwnership::Owned;
                value
            }
        }
    }

    fn ownership(&self) -> Option<SubsystemOwnership> {
        self.value.as_ref().map(|_| self.ownership)
    }
}

struct StageInner {
    state: StageState,
    start_requested: bool,
    config: StageConfig,
    hosting: Slot<dyn Hosting>,
    messaging: Slot<dyn Messaging>,
    execution: Slot<dyn Execution>,
    cluster_peer: Slot<dyn ClusterPeer>,
}

pub(crate) struct StageShared {
    id: StageId,
    inner: Mutex<StageInner>,
}

/// Subsystems captured under the lock for the asynchronous part of start.
struct StartPlan {
    cluster_name: String,
    mode: StageMode,
    hosting: Arc<dyn Hosting>,
    messaging: Arc<dyn Messaging>,
    execution: Arc<dyn Execution>,
    cluster_peer: Arc<dyn ClusterPeer>,
}

/// Handle to one stage. Clones share the same stage.
#[derive(Clone)]
pub struct Stage {
    shared: Arc<StageShared>,
}

/// Non-owning handle to a stage, used by every binding.
#[derive(Clone, Default)]
pub struct WeakStage {
    id: Option<StageId>,
    shared: Weak<StageShared>,
}

impl WeakStage {
    /// Handle pointing at no stage.
    pub const fn new() -> Self {
        Self {
            id: None,
            shared: Weak::new(),
        }
    }

    /// Id of the stage this handle was taken from.
    pub fn id(&self) -> Option<StageId> {
        self.id
    }

    /// The stage, while it is alive.
    pub fn upgrade(&self) -> Option<Stage> {
        self.shared.upgrade().map(|shared| Stage { shared })
    }
}

impl fmt::Debug for WeakStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStage")
            .field("id", &self.id)
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

fn resolve_pool(explicit: Option<Handle>, pool: &'static str) -> Result<Handle, ConfigError> {
    explicit
        .or_else(|| Handle::try_current().ok())
        .ok_or(ConfigError::MissingPool { pool })
}

impl Stage {
    /// Stage with a default configuration.
    pub fn new() -> Self {
        Self::with_config(StageConfig::default())
    }

    /// Stage with `config`.
    pub fn with_config(config: StageConfig) -> Self {
        Self {
            shared: Arc::new(StageShared {
                id: StageId::next(),
                inner: Mutex::new(StageInner {
                    state: StageState::Configuring,
                    start_requested: false,
                    config,
                    hosting: Slot::default(),
                    messaging: Slot::default(),
                    execution: Slot::default(),
                    cluster_peer: Slot::default(),
                }),
            }),
        }
    }

    /// Stage id.
    pub fn id(&self) -> StageId {
        self.shared.id
    }

    /// Non-owning handle to this stage.
    pub fn downgrade(&self) -> WeakStage {
        WeakStage {
            id: Some(self.shared.id),
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn inner(&self) -> MutexGuard<'_, StageInner> {
        lock(&self.shared.inner)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StageState {
        self.inner().state
    }

    /// Snapshot of the configuration.
    pub fn config(&self) -> StageConfig {
        self.inner().config.clone()
    }

    /// Cluster to join.
    pub fn cluster_name(&self) -> Option<String> {
        self.inner().config.cluster_name.clone()
    }

    /// Node mode.
    pub fn mode(&self) -> StageMode {
        self.inner().config.mode
    }

    fn configure(&self, apply: impl FnOnce(&mut StageInner)) -> Result<(), ConfigError> {
        let mut inner = self.inner();
        if inner.state != StageState::Configuring {
            return Err(ConfigError::AlreadyStarted);
        }
        apply(&mut inner);
        Ok(())
    }

    /// Set the cluster to join.
    pub fn set_cluster_name(&self, name: impl Into<String>) -> Result<(), ConfigError> {
        let name = name.into();
        self.configure(|inner| inner.config.cluster_name = Some(name))
    }

    /// Set the node mode. Fails once start was invoked, even if it failed.
    pub fn set_mode(&self, mode: StageMode) -> Result<(), ConfigError> {
        let mut inner = self.inner();
        if inner.start_requested {
            return Err(ConfigError::ModeLocked);
        }
        inner.config.mode = mode;
        Ok(())
    }

    /// Set the pool running actor work.
    pub fn set_execution_pool(&self, pool: Handle) -> Result<(), ConfigError> {
        self.configure(|inner| inner.config.execution_pool = Some(pool))
    }

    /// Set the pool running transport work.
    pub fn set_messaging_pool(&self, pool: Handle) -> Result<(), ConfigError> {
        self.configure(|inner| inner.config.messaging_pool = Some(pool))
    }

    /// Override the clock.
    pub fn set_clock(&self, clock: Arc<dyn Clock>) -> Result<(), ConfigError> {
        self.configure(|inner| inner.config.clock = Some(clock))
    }

    /// Enable or disable catalog discovery.
    pub fn set_auto_discovery(&self, enabled: bool) -> Result<(), ConfigError> {
        self.configure(|inner| inner.config.auto_discovery = enabled)
    }

    /// Run inside a managed container.
    pub fn set_container(&self, container: Arc<dyn Container>) -> Result<(), ConfigError> {
        self.configure(|inner| inner.config.container = Some(container))
    }

    /// Append a provider entry.
    pub fn add_provider(&self, entry: impl Into<ProviderEntry>) -> Result<(), ConfigError> {
        let entry = entry.into();
        self.configure(|inner| inner.config.providers.push(entry))
    }

    /// Inject a hosting subsystem. The stage will not own it.
    pub fn set_hosting(&self, hosting: Arc<dyn Hosting>) -> Result<(), ConfigError> {
        self.configure(|inner| inner.hosting.inject(hosting))
    }

    /// Inject a messaging subsystem. The stage will not own it.
    pub fn set_messaging(&self, messaging: Arc<dyn Messaging>) -> Result<(), ConfigError> {
        self.configure(|inner| inner.messaging.inject(messaging))
    }

    /// Inject an execution subsystem. The stage will not own it.
    pub fn set_execution(&self, execution: Arc<dyn Execution>) -> Result<(), ConfigError> {
        self.configure(|inner| inner.execution.inject(execution))
    }

    /// Inject a cluster peer. The stage will not own it.
    pub fn set_cluster_peer(&self, peer: Arc<dyn ClusterPeer>) -> Result<(), ConfigError> {
        self.configure(|inner| inner.cluster_peer.inject(peer))
    }

    /// Hosting subsystem, once injected or created.
    pub fn hosting(&self) -> Option<Arc<dyn Hosting>> {
        self.inner().hosting.get()
    }

    /// Messaging subsystem, once injected or created.
    pub fn messaging(&self) -> Option<Arc<dyn Messaging>> {
        self.inner().messaging.get()
    }

    /// Execution subsystem, once injected or created.
    pub fn execution(&self) -> Option<Arc<dyn Execution>> {
        self.inner().execution.get()
    }

    /// Cluster peer, once injected or created.
    pub fn cluster_peer(&self) -> Option<Arc<dyn ClusterPeer>> {
        self.inner().cluster_peer.get()
    }

    /// Whether `subsystem` was created by this stage or injected.
    pub fn ownership(&self, subsystem: Subsystem) -> Option<SubsystemOwnership> {
        let inner = self.inner();
        match subsystem {
            Subsystem::Hosting => inner.hosting.ownership(),
            Subsystem::Messaging => inner.messaging.ownership(),
            Subsystem::Execution => inner.execution.ownership(),
            Subsystem::ClusterPeer => inner.cluster_peer.ownership(),
        }
    }

    /// Validate, create and wire everything under the lock. On error the
    /// state is still `Configuring`.
    fn prepare(&self) -> Result<StartPlan, ConfigError> {
        let mut inner = self.inner();
        inner.start_requested = true;
        if inner.state != StageState::Configuring {
            return Err(ConfigError::InvalidState {
                state: inner.state,
                expected: "configuring",
            });
        }

        let cluster_name = inner
            .config
            .cluster_name
            .clone()
            .ok_or(ConfigError::MissingClusterName)?;
        let execution_pool = resolve_pool(inner.config.execution_pool.clone(), "execution")?;
        let messaging_pool = resolve_pool(inner.config.messaging_pool.clone(), "messaging")?;
        let mode = inner.config.mode;
        let auto_discovery = inner.config.auto_discovery;

        let clock: Arc<dyn Clock> = match &inner.config.clock {
            Some(clock) => Arc::clone(clock),
            None => Arc::new(SystemClock),
        };
        let hosting = inner
            .hosting
            .get_or_create(|| Arc::new(LocalHosting::new()) as Arc<dyn Hosting>);
        let messaging = inner
            .messaging
            .get_or_create(|| LocalMessaging::new() as Arc<dyn Messaging>);
        let execution = inner
            .execution
            .get_or_create(|| LocalExecution::new() as Arc<dyn Execution>);
        let cluster_peer = inner.cluster_peer.get_or_create(|| {
            Arc::new(InMemoryClusterPeer::new(InMemoryNetwork::global())) as Arc<dyn ClusterPeer>
        });

        let mut entries = inner.config.providers.clone();
        if let Some(container) = inner.config.container.clone() {
            entries.push(ProviderEntry::Extension(Arc::new(ContainerLifetime::new(
                container,
            ))));
        }
        let classified = classify(&entries);

        hosting.set_node_type(mode.node_type());
        execution.set_clock(Arc::clone(&clock));
        execution.set_hosting(Arc::clone(&hosting));
        execution.set_messaging(Arc::clone(&messaging));
        execution.set_executor(execution_pool);
        messaging.set_execution(Arc::downgrade(&execution));
        messaging.set_clock(clock);
        messaging.set_executor(messaging_pool);
        hosting.set_execution(Arc::downgrade(&execution));
        hosting.set_cluster_peer(Arc::clone(&cluster_peer));
        messaging.set_cluster_peer(Arc::clone(&cluster_peer));
        execution.set_stage(self.downgrade());
        execution.set_auto_discovery(auto_discovery);
        execution.set_stage_providers(classified.providers);
        execution.set_actor_class_patterns(classified.patterns);
        execution.set_actor_classes(classified.classes);
        debug!(stage = %self.id(), "subsystems wired");

        inner.state = StageState::Starting;
        Ok(StartPlan {
            cluster_name,
            mode,
            hosting,
            messaging,
            execution,
            cluster_peer,
        })
    }

    /// Start the stage. Completion means the node is an addressable
    /// cluster member.
    ///
    /// Configuration errors leave the stage in `Configuring`. Subsystem or
    /// join failures leave it in `Starting` with whatever already started
    /// still running.
    pub async fn start(&self) -> Result<(), StageError> {
        let plan = self.prepare().inspect_err(|error| {
            warn!(stage = %self.id(), %error, "stage start rejected");
        })?;
        info!(
            stage = %self.id(),
            cluster = %plan.cluster_name,
            mode = ?plan.mode,
            "starting stage"
        );

        plan.messaging.start().await.map_err(StageError::Messaging)?;
        plan.hosting.start().await.map_err(StageError::Hosting)?;
        plan.execution.start().await.map_err(StageError::Execution)?;
        debug!(stage = %self.id(), "subsystems started");

        plan.cluster_peer
            .join(&plan.cluster_name)
            .await
            .map_err(|source| StageError::Join {
                cluster: plan.cluster_name.clone(),
                source,
            })?;
        info!(stage = %self.id(), cluster = %plan.cluster_name, "joined cluster");

        {
            let mut inner = self.inner();
            if inner.state != StageState::Starting {
                return Err(ConfigError::InvalidState {
                    state: inner.state,
                    expected: "starting",
                }
                .into());
            }
            inner.state = StageState::Running;
        }
        let is_default = binding::set_default(self);
        info!(stage = %self.id(), is_default, "stage running");
        Ok(())
    }

    /// Run [`start`](Self::start) to completion on the calling thread.
    ///
    /// Pools must be configured explicitly unless the calling thread is
    /// inside a tokio runtime.
    pub fn start_blocking(&self) -> Result<(), StageError> {
        futures::executor::block_on(self.start())
    }

    /// Drain execution, then leave the cluster.
    ///
    /// Allowed from `Starting` or `Running`. If execution fails to stop the
    /// node stays a cluster member. The stage ends `Stopped` and gives up
    /// the default slot even when an error is returned.
    pub async fn stop(&self) -> Result<(), StageError> {
        let (execution, cluster_peer) = {
            let mut inner = self.inner();
            let state = inner.state;
            let parts = match state {
                StageState::Starting | StageState::Running => {
                    inner.execution.get().zip(inner.cluster_peer.get())
                }
                _ => None,
            };
            let Some(parts) = parts else {
                return Err(ConfigError::InvalidState {
                    state,
                    expected: "starting or running",
                }
                .into());
            };
            inner.state = StageState::Stopping;
            parts
        };
        info!(stage = %self.id(), "stopping stage");

        let result = Self::drain_and_leave(self.id(), execution, cluster_peer).await;

        self.inner().state = StageState::Stopped;
        binding::clear_default_if(self);
        match &result {
            Ok(()) => info!(stage = %self.id(), "stage stopped"),
            Err(error) => warn!(stage = %self.id(), %error, "stage stopped with error"),
        }
        result
    }

    async fn drain_and_leave(
        id: StageId,
        execution: Arc<dyn Execution>,
        cluster_peer: Arc<dyn ClusterPeer>,
    ) -> Result<(), StageError> {
        execution.stop().await.map_err(StageError::Execution)?;
        debug!(stage = %id, "execution drained");
        cluster_peer.leave().await.map_err(StageError::Leave)
    }

    /// Deactivate idle activations and expire timed-out requests.
    ///
    /// Only while running; may be called any number of times.
    pub async fn cleanup(&self, blocking: bool) -> Result<(), StageError> {
        let (execution, messaging) = {
            let inner = self.inner();
            let state = inner.state;
            let parts = match state {
                StageState::Running => inner.execution.get().zip(inner.messaging.get()),
                _ => None,
            };
            parts.ok_or(ConfigError::InvalidState {
                state,
                expected: "running",
            })?
        };

        let deactivated = execution
            .activation_cleanup(blocking)
            .await
            .map_err(StageError::Execution)?;
        let expired = messaging.timeout_cleanup();
        debug!(stage = %self.id(), deactivated, expired, blocking, "cleanup pass");
        Ok(())
    }

    /// Reference to actor `identity` of keyed interface `T`.
    pub fn get_reference<T: ActorInterface>(
        &self,
        identity: impl Into<String>,
    ) -> Result<ActorRef<T>, StageError> {
        ReferenceFactory::actor::<T>(identity)
    }

    /// Reference to the canonical instance of single-identity interface `T`.
    pub fn get_singleton_reference<T: ActorInterface>(&self) -> Result<ActorRef<T>, StageError> {
        ReferenceFactory::singleton::<T>()
    }

    /// Register a local observer and return a reference remote actors can
    /// call back through.
    pub fn get_observer_reference<T: ActorInterface>(
        &self,
        observer: Arc<dyn ActorObserver>,
    ) -> Result<ObserverRef<T>, StageError> {
        if !T::INTERFACE.is_observer() {
            return Err(StageError::InvalidArgument(format!(
                "{} is not an observer interface",
                T::INTERFACE.name()
            )));
        }
        let (execution, cluster_peer) = self.observer_parts()?;
        let object_id = Uuid::new_v4().to_string();
        let reference = ReferenceFactory::observer::<T>(cluster_peer.local_address(), object_id)?;
        execution
            .register_observer(reference.reference().clone(), observer)
            .map_err(StageError::Execution)?;
        Ok(reference)
    }

    /// Like [`get_observer_reference`](Self::get_observer_reference), with
    /// the interface taken from the observer's declaration.
    pub fn get_observer_reference_any(
        &self,
        observer: Arc<dyn ActorObserver>,
    ) -> Result<Reference, StageError> {
        let interface = observer.interface().ok_or_else(|| {
            StageError::InvalidArgument("observer declares no interface".to_string())
        })?;
        if !interface.is_observer() {
            return Err(StageError::InvalidArgument(format!(
                "{} is not an observer interface",
                interface.name()
            )));
        }
        let (execution, cluster_peer) = self.observer_parts()?;
        let reference = ReferenceFactory::observer_for(
            interface,
            cluster_peer.local_address(),
            Uuid::new_v4().to_string(),
        )?;
        execution
            .register_observer(reference.clone(), observer)
            .map_err(StageError::Execution)?;
        Ok(reference)
    }

    fn observer_parts(&self) -> Result<(Arc<dyn Execution>, Arc<dyn ClusterPeer>), StageError> {
        let inner = self.inner();
        let state = inner.state;
        let parts = match state {
            StageState::Running => inner.execution.get().zip(inner.cluster_peer.get()),
            _ => None,
        };
        let parts = parts.ok_or(ConfigError::InvalidState {
            state,
            expected: "running",
        })?;
        Ok(parts)
    }

    /// Bind the current task, or the current thread outside any task, to
    /// this stage.
    pub fn bind(&self) {
        binding::bind_context(self);
    }

    /// Bind `reference`, and its clones, to this stage.
    pub fn bind_reference(&self, reference: &impl AsRef<Reference>) {
        binding::bind_reference(reference.as_ref(), self);
    }

    pub(crate) async fn invoke(
        &self,
        reference: &Reference,
        invocation: Invocation,
    ) -> Result<serde_json::Value, InvokeError> {
        let execution = {
            let inner = self.inner();
            match inner.state {
                StageState::Running => inner.execution.get(),
                _ => None,
            }
        };
        let execution = execution.ok_or(InvokeError::NotRunning(self.id()))?;
        execution
            .invoke(reference.clone(), invocation)
            .await
            .map_err(InvokeError::Execution)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Stage {}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
