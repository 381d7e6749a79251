//! Placement and activation directory.
//!
//! [`LocalHosting`] places actors with rendezvous hashing over the server
//! members of the cluster. Every member computes the same owner for a
//! reference without coordination. Placements are cached and re-validated
//! against membership on each lookup, and an activation already live on
//! this node always wins.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use tracing::debug;

use super::{ClusterMember, ClusterPeer, Execution, NodeAddress, NodeType};
use crate::error::HostingError;
use crate::reference::Reference;
use crate::sync::{lock, read, write};

/// Placement subsystem consumed by the stage.
#[async_trait]
pub trait Hosting: Send + Sync + 'static {
    /// Set whether this node accepts activations.
    fn set_node_type(&self, node_type: NodeType);

    /// Whether this node accepts activations.
    fn node_type(&self) -> NodeType;

    /// Wire the execution subsystem, used to query local activations.
    fn set_execution(&self, execution: Weak<dyn Execution>);

    /// Wire the cluster peer, used to learn membership.
    fn set_cluster_peer(&self, peer: Arc<dyn ClusterPeer>);

    /// Start hosting. Messaging has started; execution has not.
    async fn start(&self) -> Result<(), HostingError>;

    /// Address of this node.
    fn local_address(&self) -> Result<NodeAddress, HostingError>;

    /// Node that hosts (or will host) the activation behind `reference`.
    async fn locate(&self, reference: &Reference) -> Result<NodeAddress, HostingError>;
}

/// Rendezvous-hash placement with a cached directory.
#[derive(Default)]
pub struct LocalHosting {
    node_type: RwLock<NodeType>,
    execution: RwLock<Option<Weak<dyn Execution>>>,
    peer: RwLock<Option<Arc<dyn ClusterPeer>>>,
    directory: Mutex<HashMap<Reference, NodeAddress>>,
}

impl LocalHosting {
    /// Create an unwired hosting subsystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached placements.
    pub fn directory_len(&self) -> usize {
        lock(&self.directory).len()
    }

    fn peer(&self) -> Result<Arc<dyn ClusterPeer>, HostingError> {
        read(&self.peer)
            .clone()
            .ok_or(HostingError::NotWired("cluster peer"))
    }

    fn is_local_activation(&self, reference: &Reference) -> bool {
        read(&self.execution)
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|execution| execution.is_activated(reference))
    }
}

impl fmt::Debug for LocalHosting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHosting")
            .field("node_type", &*read(&self.node_type))
            .field("directory", &self.directory_len())
            .finish()
    }
}

fn rendezvous_owner(reference: &Reference, servers: &[ClusterMember]) -> Option<NodeAddress> {
    servers
        .iter()
        .max_by_key(|member| {
            let mut hasher = DefaultHasher::new();
            member.address.hash(&mut hasher);
            reference.hash(&mut hasher);
            hasher.finish()
        })
        .map(|member| member.address)
}

#[async_trait]
impl Hosting for LocalHosting {
    fn set_node_type(&self, node_type: NodeType) {
        *write(&self.node_type) = node_type;
    }

    fn node_type(&self) -> NodeType {
        *read(&self.node_type)
    }

    fn set_execution(&self, execution: Weak<dyn Execution>) {
        *write(&self.execution) = Some(execution);
    }

    fn set_cluster_peer(&self, peer: Arc<dyn ClusterPeer>) {
        *write(&self.peer) = Some(peer);
    }

    async fn start(&self) -> Result<(), HostingError> {
        let peer = self.peer()?;
        if read(&self.execution).is_none() {
            return Err(HostingError::NotWired("execution"));
        }
        let node_type = self.node_type();
        peer.set_node_type(node_type);
        debug!(address = %peer.local_address(), %node_type, "hosting started");
        Ok(())
    }

    fn local_address(&self) -> Result<NodeAddress, HostingError> {
        Ok(self.peer()?.local_address())
    }

    async fn locate(&self, reference: &Reference) -> Result<NodeAddress, HostingError> {
        let peer = self.peer()?;
        let local = peer.local_address();
        if self.is_local_activation(reference) {
            return Ok(local);
        }

        let servers: Vec<ClusterMember> = peer
            .members()
            .into_iter()
            .filter(ClusterMember::is_server)
            .collect();

        let mut directory = lock(&self.directory);
        if let Some(cached) = directory.get(reference) {
            if servers.iter().any(|m| m.address == *cached) {
                return Ok(*cached);
            }
            directory.remove(reference);
        }

        let owner = rendezvous_owner(reference, &servers).ok_or_else(|| HostingError::NoServers {
            interface: reference.interface().to_string(),
        })?;
        directory.insert(reference.unbound(), owner);
        debug!(%reference, %owner, "placed activation");
        Ok(owner)
    }
}
