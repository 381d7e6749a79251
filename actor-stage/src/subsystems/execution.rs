//! Activation and invocation engine.
//!
//! [`LocalExecution`] keeps one activation per actor reference and runs one
//! invocation at a time per activation. An activation is created on first
//! use: the registered class builds the instance, every stage provider's
//! pre-activation hook is awaited, then the actor's own `on_activate` runs.
//! Any failure along that path fails the call and leaves no activation.
//!
//! Every actor and observer invocation runs grounded on the owning stage,
//! so references used from inside a handler resolve to that stage without
//! any explicit binding.
//!
//! # Class registration
//!
//! ```text
//! explicit classes ───────────────────────────────┐
//!                                                 ├─► registry (by interface)
//! catalog ── auto-discovery on? ── pattern match ─┘
//! ```
//!
//! Explicit classes always register. Catalog classes register only when
//! auto-discovery is enabled, only when their name matches one of the
//! patterns (or no pattern was configured), and never over an explicit
//! class for the same interface.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::{Hosting, Messaging, NodeType};
use crate::actor::{Actor, ActorContext, ActorObserver, Invocation};
use crate::binding;
use crate::catalog;
use crate::error::{ActorError, ExecutionError};
use crate::provider::{ActorClass, ClassPattern, StageProvider};
use crate::reference::{Reference, ReferenceKind};
use crate::stage::WeakStage;
use crate::sync::{lock, read, write};
use crate::time::{Clock, SystemClock};

/// Default idle time after which cleanup deactivates an activation.
pub const DEFAULT_ACTIVATION_TTL: Duration = Duration::from_secs(10 * 60);

/// Activation and invocation subsystem consumed by the stage.
#[async_trait]
pub trait Execution: Send + Sync + 'static {
    /// Set the clock used to age activations.
    fn set_clock(&self, clock: Arc<dyn Clock>);

    /// Wire hosting, used for placement and the node type.
    fn set_hosting(&self, hosting: Arc<dyn Hosting>);

    /// Wire messaging, used for remote calls.
    fn set_messaging(&self, messaging: Arc<dyn Messaging>);

    /// Set the pool running actor work.
    fn set_executor(&self, executor: Handle);

    /// Set the stage invocations are grounded on.
    fn set_stage(&self, stage: WeakStage);

    /// Enable registration of catalog classes.
    fn set_auto_discovery(&self, enabled: bool);

    /// Extensions whose hooks run around start, stop and activations.
    fn set_stage_providers(&self, providers: Vec<Arc<dyn StageProvider>>);

    /// Patterns filtering catalog classes.
    fn set_actor_class_patterns(&self, patterns: Vec<ClassPattern>);

    /// Explicit actor and observer classes.
    fn set_actor_classes(&self, classes: Vec<ActorClass>);

    /// Start execution. Messaging and hosting have started.
    async fn start(&self) -> Result<(), ExecutionError>;

    /// Deactivate every activation and stop the providers.
    async fn stop(&self) -> Result<(), ExecutionError>;

    /// Deactivate idle activations. With `blocking` unset the
    /// deactivations run in the background. Returns how many were removed.
    async fn activation_cleanup(&self, blocking: bool) -> Result<usize, ExecutionError>;

    /// True when `reference` has a live activation on this node.
    fn is_activated(&self, reference: &Reference) -> bool;

    /// Make a local observer reachable through `reference`.
    fn register_observer(
        &self,
        reference: Reference,
        observer: Arc<dyn ActorObserver>,
    ) -> Result<(), ExecutionError>;

    /// Outgoing call issued by this stage.
    async fn invoke(
        &self,
        reference: Reference,
        invocation: Invocation,
    ) -> Result<Value, ExecutionError>;

    /// Inbound call that messaging received for this node.
    async fn deliver(
        &self,
        reference: Reference,
        invocation: Invocation,
    ) -> Result<Value, ExecutionError>;
}

struct Activation {
    context: ActorContext,
    instance: tokio::sync::Mutex<Option<Box<dyn Actor>>>,
    last_used: Mutex<SystemTime>,
    retired: AtomicBool,
}

impl Activation {
    fn new(context: ActorContext, now: SystemTime) -> Self {
        Self {
            context,
            instance: tokio::sync::Mutex::new(None),
            last_used: Mutex::new(now),
            retired: AtomicBool::new(false),
        }
    }

    fn is_idle(&self, now: SystemTime, ttl: Duration) -> bool {
        let last_used = *lock(&self.last_used);
        now.duration_since(last_used).unwrap_or(Duration::ZERO) >= ttl
    }
}

/// In-process execution subsystem.
pub struct LocalExecution {
    me: Weak<LocalExecution>,
    activation_ttl: Duration,
    clock: RwLock<Arc<dyn Clock>>,
    hosting: RwLock<Option<Arc<dyn Hosting>>>,
    messaging: RwLock<Option<Arc<dyn Messaging>>>,
    executor: RwLock<Option<Handle>>,
    stage: RwLock<WeakStage>,
    auto_discovery: AtomicBool,
    providers: RwLock<Vec<Arc<dyn StageProvider>>>,
    patterns: RwLock<Vec<ClassPattern>>,
    classes: RwLock<Vec<ActorClass>>,
    registry: RwLock<HashMap<String, ActorClass>>,
    running: AtomicBool,
    activations: Mutex<HashMap<Reference, Arc<Activation>>>,
    observers: RwLock<HashMap<Reference, Arc<dyn ActorObserver>>>,
}

impl LocalExecution {
    /// Execution with [`DEFAULT_ACTIVATION_TTL`].
    pub fn new() -> Arc<Self> {
        Self::with_activation_ttl(DEFAULT_ACTIVATION_TTL)
    }

    /// Execution with a custom idle time before deactivation.
    pub fn with_activation_ttl(activation_ttl: Duration) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            activation_ttl,
            clock: RwLock::new(Arc::new(SystemClock)),
            hosting: RwLock::new(None),
            messaging: RwLock::new(None),
            executor: RwLock::new(None),
            stage: RwLock::new(WeakStage::new()),
            auto_discovery: AtomicBool::new(false),
            providers: RwLock::new(Vec::new()),
            patterns: RwLock::new(Vec::new()),
            classes: RwLock::new(Vec::new()),
            registry: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            activations: Mutex::new(HashMap::new()),
            observers: RwLock::new(HashMap::new()),
        })
    }

    /// Number of live activations.
    pub fn activation_count(&self) -> usize {
        lock(&self.activations).len()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        read(&self.observers).len()
    }

    /// Implementation class registered for `interface`, once started.
    pub fn registered_class(&self, interface: &str) -> Option<ActorClass> {
        read(&self.registry).get(interface).cloned()
    }

    /// Configured stage provider names, in order.
    pub fn provider_names(&self) -> Vec<String> {
        read(&self.providers)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Whether start completed and stop has not run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), ExecutionError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(ExecutionError::NotRunning)
        }
    }

    fn now(&self) -> SystemTime {
        read(&self.clock).now()
    }

    fn hosting(&self) -> Result<Arc<dyn Hosting>, ExecutionError> {
        read(&self.hosting)
            .clone()
            .ok_or(ExecutionError::NotWired("hosting"))
    }

    fn messaging(&self) -> Result<Arc<dyn Messaging>, ExecutionError> {
        read(&self.messaging)
            .clone()
            .ok_or(ExecutionError::NotWired("messaging"))
    }

    fn observer(&self, reference: &Reference) -> Option<Arc<dyn ActorObserver>> {
        read(&self.observers).get(reference).cloned()
    }

    fn build_registry(&self) -> HashMap<String, ActorClass> {
        let mut registry: HashMap<String, ActorClass> = HashMap::new();
        for class in read(&self.classes).iter() {
            let interface = class.interface().name().to_string();
            if let Some(existing) = registry.get(&interface) {
                debug!(
                    %interface,
                    kept = existing.name(),
                    ignored = class.name(),
                    "duplicate implementation class"
                );
                continue;
            }
            registry.insert(interface, class.clone());
        }

        if self.auto_discovery.load(Ordering::Acquire) {
            let patterns = read(&self.patterns).clone();
            for class in catalog::matching(&patterns) {
                registry
                    .entry(class.interface().name().to_string())
                    .or_insert(class);
            }
        }
        registry
    }

    fn activation_for(&self, reference: &Reference) -> Arc<Activation> {
        let now = self.now();
        let stage = read(&self.stage).clone();
        let mut activations = lock(&self.activations);
        let activation = activations
            .entry(reference.unbound())
            .or_insert_with(|| {
                Arc::new(Activation::new(
                    ActorContext::new(reference.unbound(), stage),
                    now,
                ))
            });
        Arc::clone(activation)
    }

    fn forget(&self, activation: &Arc<Activation>) {
        activation.retired.store(true, Ordering::Release);
        let mut activations = lock(&self.activations);
        let reference = activation.context.reference();
        if activations
            .get(reference)
            .is_some_and(|current| Arc::ptr_eq(current, activation))
        {
            activations.remove(reference);
        }
    }

    async fn activate(&self, ctx: &ActorContext) -> Result<Box<dyn Actor>, ExecutionError> {
        let reference = ctx.reference();
        let class = self
            .registered_class(reference.interface())
            .ok_or_else(|| ExecutionError::NoImplementation {
                interface: reference.interface().to_string(),
            })?;
        let mut actor =
            class
                .instantiate(ctx.identity())
                .ok_or_else(|| ExecutionError::NoImplementation {
                    interface: reference.interface().to_string(),
                })?;

        let failed = |source: ActorError| ExecutionError::ActivationFailed {
            reference: reference.to_string(),
            source,
        };
        let providers = read(&self.providers).clone();
        for provider in &providers {
            provider
                .pre_activation(actor.as_mut(), ctx)
                .await
                .map_err(failed)?;
        }
        actor.on_activate(ctx).await.map_err(failed)?;

        debug!(%reference, class = class.name(), "activated");
        Ok(actor)
    }

    async fn deactivate(&self, activation: &Activation) {
        let mut instance = activation.instance.lock().await;
        activation.retired.store(true, Ordering::Release);
        let Some(mut actor) = instance.take() else {
            return;
        };
        let ctx = &activation.context;
        if let Err(error) = actor.on_deactivate(ctx).await {
            warn!(reference = %ctx.reference(), %error, "on_deactivate failed");
        }
        let providers = read(&self.providers).clone();
        for provider in &providers {
            if let Err(error) = provider.post_deactivation(ctx).await {
                warn!(
                    reference = %ctx.reference(),
                    provider = provider.name(),
                    %error,
                    "post-deactivation hook failed"
                );
            }
        }
        debug!(reference = %ctx.reference(), "deactivated");
    }

    async fn dispatch(
        &self,
        reference: Reference,
        invocation: Invocation,
    ) -> Result<Value, ExecutionError> {
        self.ensure_running()?;
        if self.hosting()?.node_type() == NodeType::Client {
            return Err(ExecutionError::ClientOnly {
                interface: reference.interface().to_string(),
            });
        }

        loop {
            self.ensure_running()?;
            let activation = self.activation_for(&reference);
            let mut instance = activation.instance.lock().await;
            if activation.retired.load(Ordering::Acquire) {
                continue;
            }

            let mut actor = match instance.take() {
                Some(actor) => actor,
                None => match self.activate(&activation.context).await {
                    Ok(actor) => actor,
                    Err(error) => {
                        self.forget(&activation);
                        return Err(error);
                    }
                },
            };
            *lock(&activation.last_used) = self.now();

            let stage = read(&self.stage).clone();
            let result =
                binding::grounded(&stage, actor.handle(&activation.context, invocation)).await;
            *instance = Some(actor);
            return result.map_err(ExecutionError::Actor);
        }
    }

    async fn notify(
        &self,
        observer: Arc<dyn ActorObserver>,
        invocation: Invocation,
    ) -> Result<Value, ExecutionError> {
        let stage = read(&self.stage).clone();
        binding::grounded(&stage, observer.notify(invocation))
            .await
            .map_err(ExecutionError::Actor)
    }
}

impl fmt::Debug for LocalExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalExecution")
            .field("running", &self.is_running())
            .field("activation_ttl", &self.activation_ttl)
            .field("activations", &self.activation_count())
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[async_trait]
impl Execution for LocalExecution {
    fn set_clock(&self, clock: Arc<dyn Clock>) {
        *write(&self.clock) = clock;
    }

    fn set_hosting(&self, hosting: Arc<dyn Hosting>) {
        *write(&self.hosting) = Some(hosting);
    }

    fn set_messaging(&self, messaging: Arc<dyn Messaging>) {
        *write(&self.messaging) = Some(messaging);
    }

    fn set_executor(&self, executor: Handle) {
        *write(&self.executor) = Some(executor);
    }

    fn set_stage(&self, stage: WeakStage) {
        *write(&self.stage) = stage;
    }

    fn set_auto_discovery(&self, enabled: bool) {
        self.auto_discovery.store(enabled, Ordering::Release);
    }

    fn set_stage_providers(&self, providers: Vec<Arc<dyn StageProvider>>) {
        *write(&self.providers) = providers;
    }

    fn set_actor_class_patterns(&self, patterns: Vec<ClassPattern>) {
        *write(&self.patterns) = patterns;
    }

    fn set_actor_classes(&self, classes: Vec<ActorClass>) {
        *write(&self.classes) = classes;
    }

    async fn start(&self) -> Result<(), ExecutionError> {
        self.hosting()?;
        self.messaging()?;

        let registry = self.build_registry();
        let registered = registry.len();
        *write(&self.registry) = registry;

        let providers = read(&self.providers).clone();
        for provider in &providers {
            provider
                .start()
                .await
                .map_err(|source| ExecutionError::Provider {
                    provider: provider.name().to_string(),
                    source,
                })?;
        }

        self.running.store(true, Ordering::Release);
        debug!(
            classes = registered,
            providers = providers.len(),
            "execution started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ExecutionError> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let drained: Vec<Arc<Activation>> = lock(&self.activations)
            .drain()
            .map(|(_, activation)| activation)
            .collect();
        for activation in &drained {
            self.deactivate(activation).await;
        }
        write(&self.observers).clear();

        let providers = read(&self.providers).clone();
        for provider in &providers {
            provider
                .stop()
                .await
                .map_err(|source| ExecutionError::Provider {
                    provider: provider.name().to_string(),
                    source,
                })?;
        }

        info!(deactivated = drained.len(), "execution drained");
        Ok(())
    }

    async fn activation_cleanup(&self, blocking: bool) -> Result<usize, ExecutionError> {
        self.ensure_running()?;
        let now = self.now();
        let ttl = self.activation_ttl;
        let expired: Vec<Arc<Activation>> = {
            let mut activations = lock(&self.activations);
            let idle: Vec<Reference> = activations
                .iter()
                .filter(|(_, activation)| activation.is_idle(now, ttl))
                .map(|(reference, _)| reference.clone())
                .collect();
            idle.iter()
                .filter_map(|reference| activations.remove(reference))
                .collect()
        };
        let count = expired.len();

        let background = if blocking {
            None
        } else {
            read(&self.executor).clone().zip(self.me.upgrade())
        };
        match background {
            Some((executor, me)) => {
                executor.spawn(async move {
                    for activation in &expired {
                        me.deactivate(activation).await;
                    }
                });
            }
            None => {
                for activation in &expired {
                    self.deactivate(activation).await;
                }
            }
        }

        if count > 0 {
            debug!(count, blocking, "idle activations removed");
        }
        Ok(count)
    }

    fn is_activated(&self, reference: &Reference) -> bool {
        lock(&self.activations)
            .get(reference)
            .is_some_and(|activation| !activation.retired.load(Ordering::Acquire))
    }

    fn register_observer(
        &self,
        reference: Reference,
        observer: Arc<dyn ActorObserver>,
    ) -> Result<(), ExecutionError> {
        self.ensure_running()?;
        debug!(%reference, "observer registered");
        write(&self.observers).insert(reference.unbound(), observer);
        Ok(())
    }

    async fn invoke(
        &self,
        reference: Reference,
        invocation: Invocation,
    ) -> Result<Value, ExecutionError> {
        self.ensure_running()?;
        let hosting = self.hosting()?;

        match reference.kind() {
            ReferenceKind::Observer => {
                if let Some(observer) = self.observer(&reference) {
                    return self.notify(observer, invocation).await;
                }
                let owner = reference
                    .owner()
                    .ok_or_else(|| ExecutionError::OrphanObserver(reference.to_string()))?;
                if owner == hosting.local_address()? {
                    return Err(ExecutionError::UnknownObserver(reference.to_string()));
                }
                Ok(self
                    .messaging()?
                    .send_request(owner, &reference, invocation)
                    .await?)
            }
            ReferenceKind::Actor => {
                let target = hosting.locate(&reference).await?;
                if target == hosting.local_address()? {
                    return self.dispatch(reference, invocation).await;
                }
                Ok(self
                    .messaging()?
                    .send_request(target, &reference, invocation)
                    .await?)
            }
        }
    }

    async fn deliver(
        &self,
        reference: Reference,
        invocation: Invocation,
    ) -> Result<Value, ExecutionError> {
        if reference.kind() == ReferenceKind::Observer {
            let observer = self
                .observer(&reference)
                .ok_or_else(|| ExecutionError::UnknownObserver(reference.to_string()))?;
            return self.notify(observer, invocation).await;
        }

        let pool = read(&self.executor).clone().zip(self.me.upgrade());
        match pool {
            Some((executor, me)) => executor
                .spawn(async move { me.dispatch(reference, invocation).await })
                .await
                .map_err(|e| {
                    ExecutionError::Actor(ActorError::Failed(format!("dispatch task failed: {e}")))
                })?,
            None => self.dispatch(reference, invocation).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{ActorInterface, InterfaceType};
    use crate::subsystems::LocalHosting;
    use crate::time::ManualClock;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Counter;

    impl ActorInterface for Counter {
        const INTERFACE: InterfaceType = InterfaceType::actor("execution.tests.Counter");
    }

    #[derive(Default)]
    struct CounterActor {
        value: i64,
    }

    #[async_trait]
    impl Actor for CounterActor {
        async fn handle(
            &mut self,
            _ctx: &ActorContext,
            invocation: Invocation,
        ) -> Result<Value, ActorError> {
            match invocation.method.as_str() {
                "increment" => {
                    self.value += 1;
                    Ok(json!(self.value))
                }
                other => Err(ActorError::UnknownMethod(other.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        activations: AtomicUsize,
        deactivations: AtomicUsize,
    }

    #[async_trait]
    impl StageProvider for CountingProvider {
        async fn pre_activation(
            &self,
            _actor: &mut dyn Actor,
            _ctx: &ActorContext,
        ) -> Result<(), ActorError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn post_deactivation(&self, _ctx: &ActorContext) -> Result<(), ActorError> {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RejectingProvider;

    #[async_trait]
    impl StageProvider for RejectingProvider {
        async fn pre_activation(
            &self,
            _actor: &mut dyn Actor,
            _ctx: &ActorContext,
        ) -> Result<(), ActorError> {
            Err(ActorError::InjectionFailed("no database".to_string()))
        }
    }

    fn counter_ref(identity: &str) -> Reference {
        Reference::new(
            Counter::INTERFACE.name(),
            identity,
            ReferenceKind::Actor,
            None,
        )
    }

    async fn started(
        node_type: NodeType,
        providers: Vec<Arc<dyn StageProvider>>,
        clock: &ManualClock,
    ) -> Arc<LocalExecution> {
        let execution = LocalExecution::with_activation_ttl(Duration::from_secs(60));
        let hosting = Arc::new(LocalHosting::new());
        hosting.set_node_type(node_type);
        execution.set_clock(Arc::new(clock.clone()));
        execution.set_hosting(hosting);
        execution.set_messaging(crate::subsystems::LocalMessaging::new());
        execution.set_stage_providers(providers);
        execution.set_actor_classes(vec![ActorClass::new::<Counter, _, _>(
            "CounterActor",
            |_| CounterActor::default(),
        )]);
        execution.start().await.expect("execution should start");
        execution
    }

    #[tokio::test]
    async fn test_dispatch_activates_once() {
        let clock = ManualClock::default();
        let provider = Arc::new(CountingProvider::default());
        let providers = vec![provider.clone() as Arc<dyn StageProvider>];
        let execution = started(NodeType::Server, providers, &clock).await;

        let first = execution
            .deliver(counter_ref("a"), Invocation::new("increment", Value::Null))
            .await
            .expect("first call");
        let second = execution
            .deliver(counter_ref("a"), Invocation::new("increment", Value::Null))
            .await
            .expect("second call");

        assert_eq!(first, json!(1));
        assert_eq!(second, json!(2));
        assert_eq!(provider.activations.load(Ordering::SeqCst), 1);
        assert!(execution.is_activated(&counter_ref("a")));
    }

    #[tokio::test]
    async fn test_pre_activation_failure_fails_activation() {
        let clock = ManualClock::default();
        let providers: Vec<Arc<dyn StageProvider>> = vec![Arc::new(RejectingProvider)];
        let execution = started(NodeType::Server, providers, &clock).await;

        let result = execution
            .deliver(counter_ref("a"), Invocation::new("increment", Value::Null))
            .await;

        assert!(matches!(
            result,
            Err(ExecutionError::ActivationFailed {
                source: ActorError::InjectionFailed(_),
                ..
            })
        ));
        assert_eq!(execution.activation_count(), 0);
    }

    #[tokio::test]
    async fn test_client_never_activates() {
        let clock = ManualClock::default();
        let execution = started(NodeType::Client, Vec::new(), &clock).await;

        let result = execution
            .deliver(counter_ref("a"), Invocation::new("increment", Value::Null))
            .await;

        assert!(matches!(result, Err(ExecutionError::ClientOnly { .. })));
    }

    #[tokio::test]
    async fn test_cleanup_removes_idle_activations() {
        let clock = ManualClock::default();
        let provider = Arc::new(CountingProvider::default());
        let providers = vec![provider.clone() as Arc<dyn StageProvider>];
        let execution = started(NodeType::Server, providers, &clock).await;
        execution
            .deliver(counter_ref("idle"), Invocation::new("increment", Value::Null))
            .await
            .expect("call");

        clock.advance(Duration::from_secs(30));
        assert_eq!(execution.activation_cleanup(true).await, Ok(0));

        clock.advance(Duration::from_secs(30));
        assert_eq!(execution.activation_cleanup(true).await, Ok(1));
        assert_eq!(execution.activation_count(), 0);
        assert_eq!(provider.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_drains_activations() {
        let clock = ManualClock::default();
        let provider = Arc::new(CountingProvider::default());
        let providers = vec![provider.clone() as Arc<dyn StageProvider>];
        let execution = started(NodeType::Server, providers, &clock).await;
        for identity in ["a", "b"] {
            execution
                .deliver(counter_ref(identity), Invocation::new("increment", Value::Null))
                .await
                .expect("call");
        }

        execution.stop().await.expect("stop");

        assert_eq!(execution.activation_count(), 0);
        assert_eq!(provider.deactivations.load(Ordering::SeqCst), 2);
        assert!(!execution.is_running());
    }

    #[tokio::test]
    async fn test_unknown_interface_has_no_implementation() {
        let clock = ManualClock::default();
        let execution = started(NodeType::Server, Vec::new(), &clock).await;
        let reference = Reference::new("execution.tests.Missing", "x", ReferenceKind::Actor, None);

        let result = execution
            .deliver(reference, Invocation::new("anything", Value::Null))
            .await;

        assert!(matches!(
            result,
            Err(ExecutionError::NoImplementation { .. })
        ));
    }
}
