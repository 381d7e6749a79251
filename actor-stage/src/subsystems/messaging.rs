//! Request/response correlation over the cluster peer.
//!
//! [`LocalMessaging`] turns a one-way envelope transport into calls that
//! wait for a reply. Each outgoing request gets a correlation id and a
//! deadline computed from the wired clock. Replies complete the matching
//! pending request; [`Messaging::timeout_cleanup`] fails the ones whose
//! deadline passed.
//!
//! Inbound requests are dispatched to execution on the messaging executor,
//! so a slow actor never runs on the sender's task.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::{ClusterPeer, Envelope, EnvelopeBody, Execution, MessageListener, NodeAddress};
use crate::actor::Invocation;
use crate::error::MessagingError;
use crate::reference::Reference;
use crate::sync::{lock, read, write};
use crate::time::{Clock, SystemClock};

/// Default time a request waits for its reply before cleanup fails it.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport subsystem consumed by the stage.
#[async_trait]
pub trait Messaging: Send + Sync + 'static {
    /// Wire the execution subsystem, which handles inbound calls.
    fn set_execution(&self, execution: Weak<dyn Execution>);

    /// Set the clock used for request deadlines.
    fn set_clock(&self, clock: Arc<dyn Clock>);

    /// Set the pool running inbound dispatch.
    fn set_executor(&self, executor: Handle);

    /// Wire the cluster peer used as transport.
    fn set_cluster_peer(&self, peer: Arc<dyn ClusterPeer>);

    /// Start messaging. Neither hosting nor execution has started yet.
    async fn start(&self) -> Result<(), MessagingError>;

    /// Fail every pending request whose deadline passed. Returns how many.
    fn timeout_cleanup(&self) -> usize;

    /// Call `reference` on node `to` and wait for the reply.
    async fn send_request(
        &self,
        to: NodeAddress,
        reference: &Reference,
        invocation: Invocation,
    ) -> Result<Value, MessagingError>;
}

struct PendingRequest {
    deadline: SystemTime,
    reply: oneshot::Sender<Result<Value, MessagingError>>,
}

/// Messaging over any [`ClusterPeer`].
pub struct LocalMessaging {
    me: Weak<LocalMessaging>,
    response_timeout: Duration,
    execution: RwLock<Option<Weak<dyn Execution>>>,
    clock: RwLock<Arc<dyn Clock>>,
    executor: RwLock<Option<Handle>>,
    peer: RwLock<Option<Arc<dyn ClusterPeer>>>,
    next_correlation: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
}

impl LocalMessaging {
    /// Messaging with [`DEFAULT_RESPONSE_TIMEOUT`].
    pub fn new() -> Arc<Self> {
        Self::with_response_timeout(DEFAULT_RESPONSE_TIMEOUT)
    }

    /// Messaging with a custom response timeout.
    pub fn with_response_timeout(response_timeout: Duration) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            response_timeout,
            execution: RwLock::new(None),
            clock: RwLock::new(Arc::new(SystemClock)),
            executor: RwLock::new(None),
            peer: RwLock::new(None),
            next_correlation: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Number of requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }

    fn peer(&self) -> Result<Arc<dyn ClusterPeer>, MessagingError> {
        read(&self.peer)
            .clone()
            .ok_or(MessagingError::NotWired("cluster peer"))
    }

    fn on_request(
        &self,
        from: NodeAddress,
        correlation: u64,
        reference: Reference,
        invocation: Invocation,
    ) {
        let Some(executor) = read(&self.executor).clone() else {
            warn!(correlation, "dropping inbound request: messaging has no executor");
            return;
        };
        let execution = read(&self.execution).clone();
        let peer = read(&self.peer).clone();

        executor.spawn(async move {
            let result = match execution.as_ref().and_then(Weak::upgrade) {
                Some(execution) => execution
                    .deliver(reference, invocation)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("execution is gone".to_string()),
            };
            let Some(peer) = peer else {
                return;
            };
            let reply = Envelope {
                from: peer.local_address(),
                to: from,
                body: EnvelopeBody::Response { correlation, result },
            };
            if let Err(error) = peer.send(reply).await {
                warn!(correlation, %error, "failed to send response");
            }
        });
    }

    fn on_response(&self, correlation: u64, result: Result<Value, String>) {
        let Some(pending) = lock(&self.pending).remove(&correlation) else {
            debug!(correlation, "response for unknown or expired request");
            return;
        };
        if pending
            .reply
            .send(result.map_err(MessagingError::Remote))
            .is_err()
        {
            trace!(correlation, "caller stopped waiting for response");
        }
    }
}

impl fmt::Debug for LocalMessaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMessaging")
            .field("response_timeout", &self.response_timeout)
            .field("pending", &self.pending_requests())
            .finish()
    }
}

impl MessageListener for LocalMessaging {
    fn deliver(&self, envelope: Envelope) {
        match envelope.body {
            EnvelopeBody::Request {
                correlation,
                reference,
                invocation,
            } => self.on_request(envelope.from, correlation, reference, invocation),
            EnvelopeBody::Response {
                correlation,
                result,
            } => self.on_response(correlation, result),
        }
    }
}

#[async_trait]
impl Messaging for LocalMessaging {
    fn set_execution(&self, execution: Weak<dyn Execution>) {
        *write(&self.execution) = Some(execution);
    }

    fn set_clock(&self, clock: Arc<dyn Clock>) {
        *write(&self.clock) = clock;
    }

    fn set_executor(&self, executor: Handle) {
        *write(&self.executor) = Some(executor);
    }

    fn set_cluster_peer(&self, peer: Arc<dyn ClusterPeer>) {
        *write(&self.peer) = Some(peer);
    }

    async fn start(&self) -> Result<(), MessagingError> {
        let peer = self.peer()?;
        if read(&self.execution).is_none() {
            return Err(MessagingError::NotWired("execution"));
        }
        if read(&self.executor).is_none() {
            return Err(MessagingError::NotWired("executor"));
        }
        let me: Weak<dyn MessageListener> = self.me.clone();
        peer.register_listener(me);
        debug!(address = %peer.local_address(), "messaging started");
        Ok(())
    }

    fn timeout_cleanup(&self) -> usize {
        let now = read(&self.clock).now();
        let expired: Vec<(u64, PendingRequest)> = {
            let mut pending = lock(&self.pending);
            let ids: Vec<u64> = pending
                .iter()
                .filter(|(_, request)| request.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|request| (id, request)))
                .collect()
        };

        let count = expired.len();
        for (correlation, request) in expired {
            debug!(correlation, "request timed out");
            if request
                .reply
                .send(Err(MessagingError::Timeout { correlation }))
                .is_err()
            {
                trace!(correlation, "timed out caller already gone");
            }
        }
        if count > 0 {
            warn!(count, "expired pending requests");
        }
        count
    }

    async fn send_request(
        &self,
        to: NodeAddress,
        reference: &Reference,
        invocation: Invocation,
    ) -> Result<Value, MessagingError> {
        let peer = self.peer()?;
        let correlation = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        let deadline = read(&self.clock).now() + self.response_timeout;
        let (reply, response) = oneshot::channel();
        lock(&self.pending).insert(correlation, PendingRequest { deadline, reply });

        let envelope = Envelope {
            from: peer.local_address(),
            to,
            body: EnvelopeBody::Request {
                correlation,
                reference: reference.unbound(),
                invocation,
            },
        };
        if let Err(error) = peer.send(envelope).await {
            lock(&self.pending).remove(&correlation);
            return Err(error.into());
        }

        response
            .await
            .unwrap_or(Err(MessagingError::Cancelled { correlation }))
    }
}
