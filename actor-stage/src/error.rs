//! Error types for the stage and its collaborators.

use thiserror::Error;

use crate::stage::{StageId, StageState};
use crate::subsystems::NodeAddress;

/// Invalid configuration or lifecycle transition.
///
/// Raised synchronously and never retried by the stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The stage mode was changed after start had been requested.
    #[error("stage mode cannot be changed after startup")]
    ModeLocked,

    /// A configuration setter was called after start had been requested.
    #[error("stage configuration cannot be changed after startup")]
    AlreadyStarted,

    /// The requested operation is not valid in the current lifecycle state.
    #[error("stage is {state}, expected {expected}")]
    InvalidState {
        /// Current lifecycle state.
        state: StageState,
        /// States in which the operation is allowed.
        expected: &'static str,
    },

    /// No cluster name was configured before start.
    #[error("cluster name is required")]
    MissingClusterName,

    /// No pool was configured and no tokio runtime is current.
    #[error("no {pool} pool configured and no tokio runtime is current")]
    MissingPool {
        /// Which pool could not be resolved.
        pool: &'static str,
    },

    /// Stage settings could not be parsed.
    #[error("invalid stage settings: {0}")]
    Parse(String),
}

/// Errors surfaced by the stage's public operations.
#[derive(Debug, Error)]
pub enum StageError {
    /// Invalid configuration or lifecycle transition.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Wrong reference-acquisition form or unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Hosting failed to start.
    #[error("hosting failed: {0}")]
    Hosting(#[source] HostingError),

    /// Messaging failed to start.
    #[error("messaging failed: {0}")]
    Messaging(#[source] MessagingError),

    /// Execution failed to start, stop, clean up or register an observer.
    #[error("execution failed: {0}")]
    Execution(#[source] ExecutionError),

    /// Joining the cluster failed. Subsystems already started keep running.
    #[error("failed to join cluster {cluster}: {source}")]
    Join {
        /// Cluster that was being joined.
        cluster: String,
        /// Failure reported by the cluster peer.
        #[source]
        source: ClusterError,
    },

    /// Leaving the cluster failed after execution drained.
    #[error("failed to leave cluster: {0}")]
    Leave(#[source] ClusterError),
}

/// Errors from the cluster peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// The peer is already a member of a cluster.
    #[error("already joined cluster {cluster}")]
    AlreadyJoined {
        /// Cluster the peer belongs to.
        cluster: String,
    },

    /// The operation needs cluster membership.
    #[error("not joined to any cluster")]
    NotJoined,

    /// The destination is not a member of the cluster.
    #[error("unknown node: {0}")]
    UnknownNode(NodeAddress),

    /// The destination is a member but accepts no messages.
    #[error("node {0} is not accepting messages")]
    Unreachable(NodeAddress),

    /// Generic failure reported by a cluster implementation.
    #[error("cluster operation failed: {0}")]
    OperationFailed(String),
}

/// Errors from the hosting subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostingError {
    /// A collaborator was not wired before use.
    #[error("hosting is missing its {0}")]
    NotWired(&'static str),

    /// No member of the cluster accepts activations.
    #[error("no server node available to host {interface}")]
    NoServers {
        /// Interface that needed a placement.
        interface: String,
    },
}

/// Errors from the messaging subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// A collaborator was not wired before use.
    #[error("messaging is missing its {0}")]
    NotWired(&'static str),

    /// No response arrived before the request deadline.
    #[error("request {correlation} timed out")]
    Timeout {
        /// Correlation id of the expired request.
        correlation: u64,
    },

    /// The request was dropped without a response.
    #[error("request {correlation} was cancelled")]
    Cancelled {
        /// Correlation id of the dropped request.
        correlation: u64,
    },

    /// The remote node reported a failure.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// Transport failure from the cluster peer.
    #[error("transport failure: {0}")]
    Cluster(#[from] ClusterError),
}

/// Errors from the execution subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// A collaborator was not wired before use.
    #[error("execution is missing its {0}")]
    NotWired(&'static str),

    /// Execution is not running.
    #[error("execution is not running")]
    NotRunning,

    /// This node is a front end and never activates actors.
    #[error("front-end node cannot activate {interface}")]
    ClientOnly {
        /// Interface whose activation was requested.
        interface: String,
    },

    /// No registered implementation for the interface.
    #[error("no implementation registered for {interface}")]
    NoImplementation {
        /// Interface without an implementation.
        interface: String,
    },

    /// Activation failed, including pre-activation hook failures.
    #[error("activation of {reference} failed: {source}")]
    ActivationFailed {
        /// Display form of the reference being activated.
        reference: String,
        /// Underlying failure.
        #[source]
        source: ActorError,
    },

    /// The observer is not registered on this node.
    #[error("unknown observer {0}")]
    UnknownObserver(String),

    /// An observer reference without an owning node.
    #[error("observer reference {0} has no owner")]
    OrphanObserver(String),

    /// A stage provider hook failed.
    #[error("provider {provider} failed: {source}")]
    Provider {
        /// Name of the failing provider.
        provider: String,
        /// Underlying failure.
        #[source]
        source: ActorError,
    },

    /// The invoked actor or observer returned an error.
    #[error(transparent)]
    Actor(#[from] ActorError),

    /// Placement failed.
    #[error(transparent)]
    Hosting(#[from] HostingError),

    /// Remote delivery failed.
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

/// Errors raised by actor and observer implementations and their hooks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActorError {
    /// The invoked method does not exist.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The invocation payload could not be decoded or the reply encoded.
    #[error("payload error: {0}")]
    Payload(String),

    /// Container injection failed before activation.
    #[error("injection failed: {0}")]
    InjectionFailed(String),

    /// Application-level failure.
    #[error("{0}")]
    Failed(String),
}

/// Failure to decide which stage issues a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No binding applies and no default stage is running.
    #[error("no stage bound to this call and no default stage running")]
    Unbound,

    /// The reference is bound to a stage that no longer exists.
    #[error("reference is bound to {stage}, which has been dropped")]
    StageGone {
        /// Identity of the dropped stage.
        stage: StageId,
    },
}

/// Errors from invoking a reference.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No stage could be resolved for the call.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The resolved stage has no running execution.
    #[error("{0} is not running")]
    NotRunning(StageId),

    /// The resolved stage failed to execute the call.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The request could not be encoded into an invocation payload.
    #[error("request encoding failed: {0}")]
    Encode(String),

    /// The reply could not be decoded into the requested type.
    #[error("reply decoding failed: {0}")]
    Decode(String),
}
