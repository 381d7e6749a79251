//! The four collaborating subsystems of a stage.
//!
//! Each subsystem is a trait so tests and embedders can inject their own
//! implementation before start. When no override is supplied the stage
//! creates the in-memory default:
//!
//! | Trait | Default | Role |
//! |-------|---------|------|
//! | [`ClusterPeer`] | [`InMemoryClusterPeer`] | membership and envelope delivery |
//! | [`Hosting`] | [`LocalHosting`] | placement and activation directory |
//! | [`Messaging`] | [`LocalMessaging`] | request/response correlation |
//! | [`Execution`] | [`LocalExecution`] | activations, dispatch, observers |
//!
//! Subsystems are built without cross-references and wired afterwards.
//! Back-edges towards execution are weak so the wiring never forms an
//! ownership cycle.

mod cluster;
mod execution;
mod hosting;
mod messaging;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cluster::{
    ClusterMember, ClusterPeer, Envelope, EnvelopeBody, InMemoryClusterPeer, InMemoryNetwork,
    MessageListener, NodeAddress,
};
pub use execution::{Execution, LocalExecution, DEFAULT_ACTIVATION_TTL};
pub use hosting::{Hosting, LocalHosting};
pub use messaging::{LocalMessaging, Messaging, DEFAULT_RESPONSE_TIMEOUT};

/// Whether a node may hold activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeType {
    /// Accepts activations.
    #[default]
    Server,
    /// Client only.
    Client,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Names one of the four subsystems of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Placement and directory.
    Hosting,
    /// Transport.
    Messaging,
    /// Activation and invocation.
    Execution,
    /// Cluster membership.
    ClusterPeer,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hosting => write!(f, "hosting"),
            Self::Messaging => write!(f, "messaging"),
            Self::Execution => write!(f, "execution"),
            Self::ClusterPeer => write!(f, "cluster peer"),
        }
    }
}
