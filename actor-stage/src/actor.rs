//! Actor and observer implementation traits.
//!
//! Implementations are registered with a stage through
//! [`ActorClass`](crate::ActorClass) provider entries. Execution creates one
//! instance per identity on first use and runs one invocation at a time per
//! instance.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::Container;
use crate::error::ActorError;
use crate::interface::InterfaceType;
use crate::reference::Reference;
use crate::stage::{Stage, WeakStage};

/// A method call carried to an actor or observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Method name.
    pub method: String,
    /// Method arguments.
    pub payload: Value,
}

impl Invocation {
    /// Create an invocation.
    pub fn new(method: impl Into<String>, payload: Value) -> Self {
        Self {
            method: method.into(),
            payload,
        }
    }

    /// Decode the payload into a typed request.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ActorError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| ActorError::Payload(e.to_string()))
    }
}

/// Context handed to an actor during activation, dispatch and deactivation.
#[derive(Debug, Clone)]
pub struct ActorContext {
    reference: Reference,
    stage: WeakStage,
}

impl ActorContext {
    pub(crate) fn new(reference: Reference, stage: WeakStage) -> Self {
        Self { reference, stage }
    }

    /// Reference to the actor being invoked.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Identity of the actor being invoked.
    pub fn identity(&self) -> &str {
        self.reference.identity()
    }

    /// Stage hosting this activation, while it is alive.
    pub fn stage(&self) -> Option<Stage> {
        self.stage.upgrade()
    }
}

/// Actor implementation.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Counter { value: i64 }
///
/// #[async_trait]
/// impl Actor for Counter {
///     async fn handle(&mut self, _ctx: &ActorContext, inv: Invocation) -> Result<Value, ActorError> {
///         match inv.method.as_str() {
///             "increment" => { self.value += 1; Ok(json!(self.value)) }
///             other => Err(ActorError::UnknownMethod(other.to_string())),
///         }
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Actor: Send + 'static {
    /// Called once after every pre-activation hook succeeded.
    async fn on_activate(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called when the activation is removed (idle cleanup or stage stop).
    async fn on_deactivate(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Receive dependencies from the managed container before first use.
    fn inject(&mut self, _container: &dyn Container) -> Result<(), ActorError> {
        Ok(())
    }

    /// Handle one invocation.
    async fn handle(&mut self, ctx: &ActorContext, invocation: Invocation)
        -> Result<Value, ActorError>;
}

/// Observer object living in the caller's process.
///
/// Remote actors call back into observers through an
/// [`ObserverRef`](crate::ObserverRef).
#[async_trait::async_trait]
pub trait ActorObserver: Send + Sync + 'static {
    /// Interface this observer declares, used when a reference is requested
    /// without naming the interface.
    fn interface(&self) -> Option<InterfaceType> {
        None
    }

    /// Handle one callback.
    async fn notify(&self, invocation: Invocation) -> Result<Value, ActorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        text: String,
    }

    #[test]
    fn test_decode_payload() {
        let invocation = Invocation::new("post", json!({ "text": "hello" }));
        let post: Post = invocation.decode().expect("payload should decode");
        assert_eq!(post.text, "hello");
    }

    #[test]
    fn test_decode_payload_mismatch() {
        let invocation = Invocation::new("post", json!(42));
        let result: Result<Post, _> = invocation.decode();
        assert!(matches!(result, Err(ActorError::Payload(_))));
    }
}
