//! Cluster membership and envelope delivery.
//!
//! [`InMemoryNetwork`] keeps one member table per cluster name. Peers on
//! the same network that join the same cluster see each other and can
//! exchange [`Envelope`]s. Delivery is one-way: the receiving node's
//! registered [`MessageListener`] decides what to do with the envelope.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::NodeType;
use crate::actor::Invocation;
use crate::error::ClusterError;
use crate::reference::Reference;
use crate::sync::{lock, read, write};

/// Address of one node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddress(Uuid);

impl NodeAddress {
    /// Fresh random address.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Address from a known uuid.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying uuid.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0.simple())
    }
}

/// A member as seen by the cluster peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterMember {
    /// Member address.
    pub address: NodeAddress,
    /// Whether the member accepts activations.
    pub node_type: NodeType,
}

impl ClusterMember {
    /// True when the member may host activations.
    pub fn is_server(&self) -> bool {
        self.node_type == NodeType::Server
    }
}

/// Unit of node-to-node delivery.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Sending node.
    pub from: NodeAddress,
    /// Destination node.
    pub to: NodeAddress,
    /// Payload.
    pub body: EnvelopeBody,
}

/// Request or response carried by an [`Envelope`].
#[derive(Debug, Clone)]
pub enum EnvelopeBody {
    /// Call on an actor or observer hosted by the destination.
    Request {
        /// Correlation id chosen by the sender.
        correlation: u64,
        /// Target of the call.
        reference: Reference,
        /// Method and arguments.
        invocation: Invocation,
    },
    /// Reply to an earlier request.
    Response {
        /// Correlation id of the request.
        correlation: u64,
        /// Reply value or the remote failure message.
        result: Result<Value, String>,
    },
}

/// Receiver of envelopes addressed to a node.
///
/// `deliver` must not block; implementations hand the envelope to their
/// own executor.
pub trait MessageListener: Send + Sync {
    /// Accept one envelope.
    fn deliver(&self, envelope: Envelope);
}

/// Cluster membership consumed by the stage.
#[async_trait]
pub trait ClusterPeer: Send + Sync + 'static {
    /// Address of this node.
    fn local_address(&self) -> NodeAddress;

    /// Announce whether this node accepts activations.
    fn set_node_type(&self, node_type: NodeType);

    /// Register the receiver for envelopes addressed to this node.
    fn register_listener(&self, listener: Weak<dyn MessageListener>);

    /// Become a member of `cluster_name`. Completion means addressable.
    async fn join(&self, cluster_name: &str) -> Result<(), ClusterError>;

    /// Leave the cluster.
    async fn leave(&self) -> Result<(), ClusterError>;

    /// Current members of the joined cluster, this node included.
    fn members(&self) -> Vec<ClusterMember>;

    /// Deliver an envelope to another member.
    async fn send(&self, envelope: Envelope) -> Result<(), ClusterError>;
}

struct PeerState {
    address: NodeAddress,
    node_type: RwLock<NodeType>,
    listener: RwLock<Option<Weak<dyn MessageListener>>>,
}

/// Named clusters shared by in-memory peers.
#[derive(Default)]
pub struct InMemoryNetwork {
    clusters: Mutex<HashMap<String, HashMap<NodeAddress, Weak<PeerState>>>>,
}

impl InMemoryNetwork {
    /// Create an isolated network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Network shared by every default cluster peer in the process.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<InMemoryNetwork>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(InMemoryNetwork::new))
    }

    /// Number of live members of `cluster_name`.
    pub fn member_count(&self, cluster_name: &str) -> usize {
        lock(&self.clusters)
            .get(cluster_name)
            .map(|members| members.values().filter(|m| m.strong_count() > 0).count())
            .unwrap_or(0)
    }

    fn insert(&self, cluster_name: &str, peer: &Arc<PeerState>) {
        lock(&self.clusters)
            .entry(cluster_name.to_string())
            .or_default()
            .insert(peer.address, Arc::downgrade(peer));
    }

    fn remove(&self, cluster_name: &str, address: &NodeAddress) {
        let mut clusters = lock(&self.clusters);
        if let Some(members) = clusters.get_mut(cluster_name) {
            members.remove(address);
            if members.is_empty() {
                clusters.remove(cluster_name);
            }
        }
    }

    fn member(&self, cluster_name: &str, address: &NodeAddress) -> Option<Arc<PeerState>> {
        lock(&self.clusters)
            .get(cluster_name)
            .and_then(|members| members.get(address))
            .and_then(Weak::upgrade)
    }

    fn members(&self, cluster_name: &str) -> Vec<ClusterMember> {
        let mut members: Vec<ClusterMember> = lock(&self.clusters)
            .get(cluster_name)
            .map(|members| {
                members
                    .values()
                    .filter_map(Weak::upgrade)
                    .map(|peer| ClusterMember {
                        address: peer.address,
                        node_type: *read(&peer.node_type),
                    })
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by_key(|m| m.address);
        members
    }
}

impl fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clusters = lock(&self.clusters);
        let mut names: Vec<&String> = clusters.keys().collect();
        names.sort();
        f.debug_struct("InMemoryNetwork").field("clusters", &names).finish()
    }
}

/// Cluster peer over an [`InMemoryNetwork`].
pub struct InMemoryClusterPeer {
    network: Arc<InMemoryNetwork>,
    state: Arc<PeerState>,
    cluster: RwLock<Option<String>>,
}

impl InMemoryClusterPeer {
    /// Peer on `network` with a fresh address.
    pub fn new(network: Arc<InMemoryNetwork>) -> Self {
        Self {
            network,
            state: Arc::new(PeerState {
                address: NodeAddress::random(),
                node_type: RwLock::new(NodeType::default()),
                listener: RwLock::new(None),
            }),
            cluster: RwLock::new(None),
        }
    }

    /// Cluster currently joined.
    pub fn cluster_name(&self) -> Option<String> {
        read(&self.cluster).clone()
    }

    fn joined(&self) -> Result<String, ClusterError> {
        self.cluster_name().ok_or(ClusterError::NotJoined)
    }
}

impl fmt::Debug for InMemoryClusterPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryClusterPeer")
            .field("address", &self.state.address)
            .field("cluster", &*read(&self.cluster))
            .finish()
    }
}

#[async_trait]
impl ClusterPeer for InMemoryClusterPeer {
    fn local_address(&self) -> NodeAddress {
        self.state.address
    }

    fn set_node_type(&self, node_type: NodeType) {
        *write(&self.state.node_type) = node_type;
    }

    fn register_listener(&self, listener: Weak<dyn MessageListener>) {
        *write(&self.state.listener) = Some(listener);
    }

    async fn join(&self, cluster_name: &str) -> Result<(), ClusterError> {
        let mut cluster = write(&self.cluster);
        if let Some(current) = cluster.as_ref() {
            return Err(ClusterError::AlreadyJoined {
                cluster: current.clone(),
            });
        }
        self.network.insert(cluster_name, &self.state);
        *cluster = Some(cluster_name.to_string());
        debug!(address = %self.state.address, cluster = cluster_name, "joined in-memory cluster");
        Ok(())
    }

    async fn leave(&self) -> Result<(), ClusterError> {
        let mut cluster = write(&self.cluster);
        let name = cluster.take().ok_or(ClusterError::NotJoined)?;
        self.network.remove(&name, &self.state.address);
        debug!(address = %self.state.address, cluster = %name, "left in-memory cluster");
        Ok(())
    }

    fn members(&self) -> Vec<ClusterMember> {
        match self.cluster_name() {
            Some(name) => self.network.members(&name),
            None => Vec::new(),
        }
    }

    async fn send(&self, envelope: Envelope) -> Result<(), ClusterError> {
        let cluster = self.joined()?;
        let target = self
            .network
            .member(&cluster, &envelope.to)
            .ok_or(ClusterError::UnknownNode(envelope.to))?;
        let listener = read(&target.listener)
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(ClusterError::Unreachable(envelope.to))?;
        listener.deliver(envelope);
        Ok(())
    }
}

impl Drop for InMemoryClusterPeer {
    fn drop(&mut self) {
        if let Some(name) = read(&self.cluster).as_ref() {
            self.network.remove(name, &self.state.address);
        }
    }
}
