//! Actor and observer references.
//!
//! A [`Reference`] names a target: interface, identity, kind and, for
//! observers, the node owning the observer object. It carries no
//! subsystem state. Which stage issues a call through it is decided when
//! the call is made (see [`binding`](crate::binding)), so references can be
//! built before any stage starts and serialized across nodes.
//!
//! [`ActorRef`] and [`ObserverRef`] are typed wrappers produced by
//! [`ReferenceFactory`], which enforces the identity mode of the interface.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::Invocation;
use crate::binding::{self, ReferenceBinding};
use crate::error::{InvokeError, StageError};
use crate::interface::{ActorInterface, InterfaceType, NO_IDENTITY};
use crate::subsystems::NodeAddress;

/// What a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Virtual actor, activated on demand.
    Actor,
    /// Observer object living on its owner node.
    Observer,
}

/// Untyped reference to an actor or observer.
///
/// Equality and hashing ignore the stage binding.
#[derive(Clone, Serialize, Deserialize)]
pub struct Reference {
    interface: String,
    identity: String,
    kind: ReferenceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner: Option<NodeAddress>,
    #[serde(skip)]
    binding: ReferenceBinding,
}

impl Reference {
    pub(crate) fn new(
        interface: impl Into<String>,
        identity: impl Into<String>,
        kind: ReferenceKind,
        owner: Option<NodeAddress>,
    ) -> Self {
        Self {
            interface: interface.into(),
            identity: identity.into(),
            kind,
            owner,
            binding: ReferenceBinding::default(),
        }
    }

    /// Interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Identity, [`NO_IDENTITY`] for single-identity interfaces.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Actor or observer.
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// Node owning the observer object.
    pub fn owner(&self) -> Option<NodeAddress> {
        self.owner
    }

    /// Invoke `method` through the stage resolved for this reference.
    pub async fn invoke(&self, method: &str, payload: Value) -> Result<Value, InvokeError> {
        let stage = binding::resolve(self)?;
        stage.invoke(self, Invocation::new(method, payload)).await
    }

    /// Copy with a fresh, unset binding slot.
    pub(crate) fn unbound(&self) -> Self {
        Self::new(
            self.interface.clone(),
            self.identity.clone(),
            self.kind,
            self.owner,
        )
    }

    pub(crate) fn binding(&self) -> &ReferenceBinding {
        &self.binding
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.interface == other.interface
            && self.identity == other.identity
            && self.kind == other.kind
            && self.owner == other.owner
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.interface.hash(state);
        self.identity.hash(state);
        self.kind.hash(state);
        self.owner.hash(state);
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("interface", &self.interface)
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .finish()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.interface, self.identity)?;
        if let Some(owner) = self.owner {
            write!(f, "@{owner}")?;
        }
        Ok(())
    }
}

impl AsRef<Reference> for Reference {
    fn as_ref(&self) -> &Reference {
        self
    }
}

async fn typed_call<Req, Resp>(
    reference: &Reference,
    method: &str,
    request: &Req,
) -> Result<Resp, InvokeError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let payload = serde_json::to_value(request).map_err(|e| InvokeError::Encode(e.to_string()))?;
    let reply = reference.invoke(method, payload).await?;
    serde_json::from_value(reply).map_err(|e| InvokeError::Decode(e.to_string()))
}

/// Typed reference to an actor implementing interface `T`.
///
/// ```rust,ignore
/// let room: ActorRef<ChatRoom> = stage.get_reference("lobby")?;
/// let history: Vec<String> = room.call("history", &()).await?;
/// ```
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorRef<T> {
    reference: Reference,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> ActorRef<T> {
    fn wrap(reference: Reference) -> Self {
        Self {
            reference,
            _marker: PhantomData,
        }
    }

    /// Untyped reference.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Actor identity.
    pub fn identity(&self) -> &str {
        self.reference.identity()
    }

    /// Invoke `method` with a raw payload.
    pub async fn invoke(&self, method: &str, payload: Value) -> Result<Value, InvokeError> {
        self.reference.invoke(method, payload).await
    }

    /// Invoke `method` with a typed request and decode the reply.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, InvokeError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        typed_call(&self.reference, method, request).await
    }
}

impl<T> Clone for ActorRef<T> {
    fn clone(&self) -> Self {
        Self::wrap(self.reference.clone())
    }
}

impl<T> PartialEq for ActorRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl<T> Eq for ActorRef<T> {}

impl<T> fmt::Debug for ActorRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActorRef").field(&self.reference).finish()
    }
}

impl<T> AsRef<Reference> for ActorRef<T> {
    fn as_ref(&self) -> &Reference {
        &self.reference
    }
}

/// Typed reference to an observer implementing interface `T`.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverRef<T> {
    reference: Reference,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObserverRef<T> {
    fn wrap(reference: Reference) -> Self {
        Self {
            reference,
            _marker: PhantomData,
        }
    }

    /// Untyped reference.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Node owning the observer object.
    pub fn owner(&self) -> Option<NodeAddress> {
        self.reference.owner()
    }

    /// Invoke `method` on the observer with a raw payload.
    pub async fn invoke(&self, method: &str, payload: Value) -> Result<Value, InvokeError> {
        self.reference.invoke(method, payload).await
    }

    /// Invoke `method` with a typed request and decode the reply.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, InvokeError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        typed_call(&self.reference, method, request).await
    }
}

impl<T> Clone for ObserverRef<T> {
    fn clone(&self) -> Self {
        Self::wrap(self.reference.clone())
    }
}

impl<T> fmt::Debug for ObserverRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObserverRef").field(&self.reference).finish()
    }
}

impl<T> AsRef<Reference> for ObserverRef<T> {
    fn as_ref(&self) -> &Reference {
        &self.reference
    }
}

/// Builds references while enforcing identity modes. Pure: no subsystem
/// is touched until the reference is invoked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceFactory;

impl ReferenceFactory {
    /// Reference to the actor `identity` of a keyed interface.
    pub fn actor<T: ActorInterface>(
        identity: impl Into<String>,
    ) -> Result<ActorRef<T>, StageError> {
        let interface = T::INTERFACE;
        if interface.is_single_identity() {
            return Err(StageError::InvalidArgument(format!(
                "{} is single-identity; request it without an identity",
                interface.name()
            )));
        }
        if !interface.is_actor() {
            return Err(StageError::InvalidArgument(format!(
                "{} is not an actor interface",
                interface.name()
            )));
        }
        Ok(ActorRef::wrap(Reference::new(
            interface.name(),
            identity,
            ReferenceKind::Actor,
            None,
        )))
    }

    /// Reference to the canonical instance of a single-identity interface.
    pub fn singleton<T: ActorInterface>() -> Result<ActorRef<T>, StageError> {
        let interface = T::INTERFACE;
        if !interface.is_single_identity() {
            return Err(StageError::InvalidArgument(format!(
                "{} is keyed; request it with an identity",
                interface.name()
            )));
        }
        if !interface.is_actor() {
            return Err(StageError::InvalidArgument(format!(
                "{} is not an actor interface",
                interface.name()
            )));
        }
        Ok(ActorRef::wrap(Reference::new(
            interface.name(),
            NO_IDENTITY,
            ReferenceKind::Actor,
            None,
        )))
    }

    /// Reference to the observer object `object_id` owned by `owner`.
    pub fn observer<T: ActorInterface>(
        owner: NodeAddress,
        object_id: impl Into<String>,
    ) -> Result<ObserverRef<T>, StageError> {
        let reference = Self::observer_for(T::INTERFACE, owner, object_id)?;
        Ok(ObserverRef::wrap(reference))
    }

    /// Untyped observer reference for a runtime interface descriptor.
    pub fn observer_for(
        interface: InterfaceType,
        owner: NodeAddress,
        object_id: impl Into<String>,
    ) -> Result<Reference, StageError> {
        if !interface.is_observer() {
            return Err(StageError::InvalidArgument(format!(
                "{} is not an observer interface",
                interface.name()
            )));
        }
        Ok(Reference::new(
            interface.name(),
            object_id,
            ReferenceKind::Observer,
            Some(owner),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ChatRoom;
    impl ActorInterface for ChatRoom {
        const INTERFACE: InterfaceType = InterfaceType::actor("ChatRoom");
    }

    struct Registry;
    impl ActorInterface for Registry {
        const INTERFACE: InterfaceType = InterfaceType::singleton_actor("Registry");
    }

    struct ChatListener;
    impl ActorInterface for ChatListener {
        const INTERFACE: InterfaceType = InterfaceType::observer("ChatListener");
    }

    #[test]
    fn test_keyed_reference() {
        let room = ReferenceFactory::actor::<ChatRoom>("lobby").expect("keyed reference");
        assert_eq!(room.identity(), "lobby");
        assert_eq!(room.reference().interface(), "ChatRoom");
        assert_eq!(room.reference().kind(), ReferenceKind::Actor);
    }

    #[test]
    fn test_single_identity_rejects_keyed_form() {
        for identity in ["", "a", NO_IDENTITY] {
            let result = ReferenceFactory::actor::<Registry>(identity);
            assert!(matches!(result, Err(StageError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_single_identity_is_canonical() {
        let first = ReferenceFactory::singleton::<Registry>().expect("singleton");
        let second = ReferenceFactory::singleton::<Registry>().expect("singleton");
        assert_eq!(first.identity(), NO_IDENTITY);
        assert_eq!(first, second);
    }

    #[test]
    fn test_keyed_rejects_identity_less_form() {
        let result = ReferenceFactory::singleton::<ChatRoom>();
        assert!(matches!(result, Err(StageError::InvalidArgument(_))));
    }

    #[test]
    fn test_observer_requires_capability() {
        let owner = NodeAddress::random();
        let listener =
            ReferenceFactory::observer::<ChatListener>(owner, "obj-1").expect("observer");
        assert_eq!(listener.owner(), Some(owner));
        assert_eq!(listener.reference().kind(), ReferenceKind::Observer);

        let result = ReferenceFactory::observer::<ChatRoom>(owner, "obj-2");
        assert!(matches!(result, Err(StageError::InvalidArgument(_))));
    }

    #[test]
    fn test_serde_drops_binding_keeps_identity() {
        let room = ReferenceFactory::actor::<ChatRoom>("lobby").expect("keyed reference");
        let json = serde_json::to_string(&room).expect("serialize");
        assert!(!json.contains("binding"));

        let back: ActorRef<ChatRoom> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, room);
        assert!(back.reference().binding().get().is_none());
    }

    #[test]
    fn test_display() {
        let owner = NodeAddress::random();
        let listener = ReferenceFactory::observer_for(ChatListener::INTERFACE, owner, "obj")
            .expect("observer");
        assert_eq!(listener.to_string(), format!("ChatListener/obj@{owner}"));
    }
}
