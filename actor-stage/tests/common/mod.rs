//! Shared fixtures for stage integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use actor_stage::subsystems::{Envelope, MessageListener};
use actor_stage::{
    Actor, ActorClass, ActorContext, ActorError, ActorInterface, ActorObserver, ClassPattern,
    Clock, ClusterError, ClusterMember, ClusterPeer, Execution, ExecutionError, Hosting,
    HostingError, InMemoryClusterPeer, InMemoryNetwork, InterfaceType, Invocation, LocalExecution,
    LocalHosting, LocalMessaging, Messaging, MessagingError, NodeAddress, NodeType, ObserverRef,
    Reference, StageProvider, WeakStage,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Ordered record of subsystem calls, shared by every recording fake.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub struct RecordingHosting {
    pub inner: LocalHosting,
    journal: Journal,
}

impl RecordingHosting {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalHosting::new(),
            journal,
        })
    }
}

#[async_trait]
impl Hosting for RecordingHosting {
    fn set_node_type(&self, node_type: NodeType) {
        self.journal.record("hosting.set_node_type");
        self.inner.set_node_type(node_type);
    }

    fn node_type(&self) -> NodeType {
        self.inner.node_type()
    }

    fn set_execution(&self, execution: Weak<dyn Execution>) {
        self.journal.record("hosting.set_execution");
        self.inner.set_execution(execution);
    }

    fn set_cluster_peer(&self, peer: Arc<dyn ClusterPeer>) {
        self.journal.record("hosting.set_cluster_peer");
        self.inner.set_cluster_peer(peer);
    }

    async fn start(&self) -> Result<(), HostingError> {
        self.journal.record("hosting.start");
        self.inner.start().await
    }

    fn local_address(&self) -> Result<NodeAddress, HostingError> {
        self.inner.local_address()
    }

    async fn locate(&self, reference: &Reference) -> Result<NodeAddress, HostingError> {
        self.inner.locate(reference).await
    }
}

pub struct RecordingMessaging {
    pub inner: Arc<LocalMessaging>,
    journal: Journal,
}

impl RecordingMessaging {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalMessaging::new(),
            journal,
        })
    }
}

#[async_trait]
impl Messaging for RecordingMessaging {
    fn set_execution(&self, execution: Weak<dyn Execution>) {
        self.journal.record("messaging.set_execution");
        self.inner.set_execution(execution);
    }

    fn set_clock(&self, clock: Arc<dyn Clock>) {
        self.journal.record("messaging.set_clock");
        self.inner.set_clock(clock);
    }

    fn set_executor(&self, executor: Handle) {
        self.journal.record("messaging.set_executor");
        self.inner.set_executor(executor);
    }

    fn set_cluster_peer(&self, peer: Arc<dyn ClusterPeer>) {
        self.journal.record("messaging.set_cluster_peer");
        self.inner.set_cluster_peer(peer);
    }

    async fn start(&self) -> Result<(), MessagingError> {
        self.journal.record("messaging.start");
        self.inner.start().await
    }

    fn timeout_cleanup(&self) -> usize {
        self.journal.record("messaging.timeout_cleanup");
        self.inner.timeout_cleanup()
    }

    async fn send_request(
        &self,
        to: NodeAddress,
        reference: &Reference,
        invocation: Invocation,
    ) -> Result<Value, MessagingError> {
        self.inner.send_request(to, reference, invocation).await
    }
}

pub struct RecordingExecution {
    pub inner: Arc<LocalExecution>,
    journal: Journal,
    pub providers: Mutex<Vec<String>>,
    pub patterns: Mutex<Vec<String>>,
    pub classes: Mutex<Vec<String>>,
}

impl RecordingExecution {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalExecution::new(),
            journal,
            providers: Mutex::default(),
            patterns: Mutex::default(),
            classes: Mutex::default(),
        })
    }
}

#[async_trait]
impl Execution for RecordingExecution {
    fn set_clock(&self, clock: Arc<dyn Clock>) {
        self.journal.record("execution.set_clock");
        self.inner.set_clock(clock);
    }

    fn set_hosting(&self, hosting: Arc<dyn Hosting>) {
        self.journal.record("execution.set_hosting");
        self.inner.set_hosting(hosting);
    }

    fn set_messaging(&self, messaging: Arc<dyn Messaging>) {
        self.journal.record("execution.set_messaging");
        self.inner.set_messaging(messaging);
    }

    fn set_executor(&self, executor: Handle) {
        self.journal.record("execution.set_executor");
        self.inner.set_executor(executor);
    }

    fn set_stage(&self, stage: WeakStage) {
        self.journal.record("execution.set_stage");
        self.inner.set_stage(stage);
    }

    fn set_auto_discovery(&self, enabled: bool) {
        self.journal.record("execution.set_auto_discovery");
        self.inner.set_auto_discovery(enabled);
    }

    fn set_stage_providers(&self, providers: Vec<Arc<dyn StageProvider>>) {
        self.journal.record("execution.set_stage_providers");
        *self.providers.lock().unwrap() = providers.iter().map(|p| p.name().to_string()).collect();
        self.inner.set_stage_providers(providers);
    }

    fn set_actor_class_patterns(&self, patterns: Vec<ClassPattern>) {
        self.journal.record("execution.set_actor_class_patterns");
        *self.patterns.lock().unwrap() = patterns.iter().map(|p| p.as_str().to_string()).collect();
        self.inner.set_actor_class_patterns(patterns);
    }

    fn set_actor_classes(&self, classes: Vec<ActorClass>) {
        self.journal.record("execution.set_actor_classes");
        *self.classes.lock().unwrap() = classes.iter().map(|c| c.name().to_string()).collect();
        self.inner.set_actor_classes(classes);
    }

    async fn start(&self) -> Result<(), ExecutionError> {
        self.journal.record("execution.start");
        self.inner.start().await
    }

    async fn stop(&self) -> Result<(), ExecutionError> {
        self.journal.record("execution.stop");
        self.inner.stop().await
    }

    async fn activation_cleanup(&self, blocking: bool) -> Result<usize, ExecutionError> {
        self.journal.record("execution.activation_cleanup");
        self.inner.activation_cleanup(blocking).await
    }

    fn is_activated(&self, reference: &Reference) -> bool {
        self.inner.is_activated(reference)
    }

    fn register_observer(
        &self,
        reference: Reference,
        observer: Arc<dyn ActorObserver>,
    ) -> Result<(), ExecutionError> {
        self.inner.register_observer(reference, observer)
    }

    async fn invoke(
        &self,
        reference: Reference,
        invocation: Invocation,
    ) -> Result<Value, ExecutionError> {
        self.inner.invoke(reference, invocation).await
    }

    async fn deliver(
        &self,
        reference: Reference,
        invocation: Invocation,
    ) -> Result<Value, ExecutionError> {
        self.inner.deliver(reference, invocation).await
    }
}

pub struct RecordingPeer {
    pub inner: InMemoryClusterPeer,
    journal: Journal,
    fail_join: AtomicBool,
    fail_leave: AtomicBool,
}

impl RecordingPeer {
    pub fn new(network: Arc<InMemoryNetwork>, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryClusterPeer::new(network),
            journal,
            fail_join: AtomicBool::new(false),
            fail_leave: AtomicBool::new(false),
        })
    }

    pub fn fail_next_join(&self) {
        self.fail_join.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_leave(&self) {
        self.fail_leave.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterPeer for RecordingPeer {
    fn local_address(&self) -> NodeAddress {
        self.inner.local_address()
    }

    fn set_node_type(&self, node_type: NodeType) {
        self.journal.record("peer.set_node_type");
        self.inner.set_node_type(node_type);
    }

    fn register_listener(&self, listener: Weak<dyn MessageListener>) {
        self.journal.record("peer.register_listener");
        self.inner.register_listener(listener);
    }

    async fn join(&self, cluster_name: &str) -> Result<(), ClusterError> {
        self.journal.record("peer.join");
        if self.fail_join.swap(false, Ordering::SeqCst) {
            return Err(ClusterError::OperationFailed("join refused".to_string()));
        }
        self.inner.join(cluster_name).await
    }

    async fn leave(&self) -> Result<(), ClusterError> {
        self.journal.record("peer.leave");
        if self.fail_leave.swap(false, Ordering::SeqCst) {
            return Err(ClusterError::OperationFailed("leave refused".to_string()));
        }
        self.inner.leave().await
    }

    fn members(&self) -> Vec<ClusterMember> {
        self.inner.members()
    }

    async fn send(&self, envelope: Envelope) -> Result<(), ClusterError> {
        self.inner.send(envelope).await
    }
}

/// Subsystem fakes sharing one journal.
pub struct Recorded {
    pub journal: Journal,
    pub hosting: Arc<RecordingHosting>,
    pub messaging: Arc<RecordingMessaging>,
    pub execution: Arc<RecordingExecution>,
    pub peer: Arc<RecordingPeer>,
}

impl Recorded {
    pub fn new(network: Arc<InMemoryNetwork>) -> Self {
        let journal = Journal::default();
        Self {
            hosting: RecordingHosting::new(journal.clone()),
            messaging: RecordingMessaging::new(journal.clone()),
            execution: RecordingExecution::new(journal.clone()),
            peer: RecordingPeer::new(network, journal.clone()),
            journal,
        }
    }

    pub fn inject(&self, stage: &actor_stage::Stage) {
        stage.set_hosting(self.hosting.clone()).unwrap();
        stage.set_messaging(self.messaging.clone()).unwrap();
        stage.set_execution(self.execution.clone()).unwrap();
        stage.set_cluster_peer(self.peer.clone()).unwrap();
    }
}

pub struct Counter;

impl ActorInterface for Counter {
    const INTERFACE: InterfaceType = InterfaceType::actor("tests.Counter");
}

#[derive(Default)]
pub struct CounterActor {
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
            "get" => Ok(json!(self.value)),
            other => Err(ActorError::UnknownMethod(other.to_string())),
        }
    }
}

pub fn counter_class() -> ActorClass {
    ActorClass::new::<Counter, _, _>("tests.CounterActor", |_| CounterActor::default())
}

pub struct ChatRoom;

impl ActorInterface for ChatRoom {
    const INTERFACE: InterfaceType = InterfaceType::actor("tests.ChatRoom");
}

pub struct ChatListener;

impl ActorInterface for ChatListener {
    const INTERFACE: InterfaceType = InterfaceType::observer("tests.ChatListener");
}

/// Keeps subscribers and fans every post out to them.
#[derive(Default)]
pub struct ChatRoomActor {
    listeners: Vec<ObserverRef<ChatListener>>,
}

#[async_trait]
impl Actor for ChatRoomActor {
    async fn handle(
        &mut self,
        _ctx: &ActorContext,
        invocation: Invocation,
    ) -> Result<Value, ActorError> {
        match invocation.method.as_str() {
            "subscribe" => {
                self.listeners.push(invocation.decode()?);
                Ok(json!(self.listeners.len()))
            }
            "post" => {
                let text: String = invocation.decode()?;
                for listener in &self.listeners {
                    listener
                        .invoke("received", json!(text))
                        .await
                        .map_err(|e| ActorError::Failed(e.to_string()))?;
                }
                Ok(json!(self.listeners.len()))
            }
            other => Err(ActorError::UnknownMethod(other.to_string())),
        }
    }
}

pub fn chat_room_class() -> ActorClass {
    ActorClass::new::<ChatRoom, _, _>("tests.ChatRoomActor", |_| ChatRoomActor::default())
}

/// Observer collecting every message it receives.
#[derive(Default)]
pub struct Inbox {
    pub messages: Mutex<Vec<String>>,
}

impl Inbox {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActorObserver for Inbox {
    fn interface(&self) -> Option<InterfaceType> {
        Some(ChatListener::INTERFACE)
    }

    async fn notify(&self, invocation: Invocation) -> Result<Value, ActorError> {
        let text: String = invocation.decode()?;
        self.messages.lock().unwrap().push(text);
        Ok(Value::Null)
    }
}
