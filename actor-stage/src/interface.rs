//! Actor and observer interface descriptors.
//!
//! An [`InterfaceType`] is the runtime description of an addressable
//! interface: its name, how instances are identified, and which reference
//! capabilities it carries. Typed references are built from types that
//! implement [`ActorInterface`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Canonical identity carried by every reference to a single-identity type.
pub const NO_IDENTITY: &str = "$no-identity";

bitflags! {
    /// Reference capabilities of an interface.
    ///
    /// Only implementation classes whose interface carries at least one of
    /// these capabilities are registered with execution.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Addressable actor, activated on demand.
        const ACTOR = 0b01;
        /// Observer living in a caller's process, invoked via callbacks.
        const OBSERVER = 0b10;
    }
}

/// How instances of an interface are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityMode {
    /// Instances are addressed by a caller-supplied identity string.
    Keyed,
    /// Exactly one canonical instance exists; its identity is [`NO_IDENTITY`].
    Singleton,
}

/// Runtime descriptor of an actor or observer interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceType {
    name: &'static str,
    identity: IdentityMode,
    capabilities: Capabilities,
}

impl InterfaceType {
    /// Descriptor with explicit identity mode and capabilities.
    pub const fn new(
        name: &'static str,
        identity: IdentityMode,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            name,
            identity,
            capabilities,
        }
    }

    /// Keyed actor interface.
    pub const fn actor(name: &'static str) -> Self {
        Self::new(name, IdentityMode::Keyed, Capabilities::ACTOR)
    }

    /// Actor interface with a single canonical instance.
    pub const fn singleton_actor(name: &'static str) -> Self {
        Self::new(name, IdentityMode::Singleton, Capabilities::ACTOR)
    }

    /// Observer interface. Observer references are identified by the
    /// registered object, never by a caller-supplied identity.
    pub const fn observer(name: &'static str) -> Self {
        Self::new(name, IdentityMode::Keyed, Capabilities::OBSERVER)
    }

    /// Interface name, used as the routing key for implementations.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Identity mode.
    pub fn identity(&self) -> IdentityMode {
        self.identity
    }

    /// Reference capabilities.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// True when references are only available through the identity-less form.
    pub fn is_single_identity(&self) -> bool {
        self.identity == IdentityMode::Singleton
    }

    /// True when the interface can be referenced as an actor.
    pub fn is_actor(&self) -> bool {
        self.capabilities.contains(Capabilities::ACTOR)
    }

    /// True when the interface can be referenced as an observer.
    pub fn is_observer(&self) -> bool {
        self.capabilities.contains(Capabilities::OBSERVER)
    }
}

/// Static binding between a Rust type and its interface descriptor.
///
/// ```rust,ignore
/// struct ChatRoom;
///
/// impl ActorInterface for ChatRoom {
///     const INTERFACE: InterfaceType = InterfaceType::actor("ChatRoom");
/// }
/// ```
pub trait ActorInterface: 'static {
    /// Descriptor of this interface.
    const INTERFACE: InterfaceType;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_modes() {
        let keyed = InterfaceType::actor("Player");
        assert!(keyed.is_actor());
        assert!(!keyed.is_observer());
        assert!(!keyed.is_single_identity());

        let singleton = InterfaceType::singleton_actor("Leaderboard");
        assert!(singleton.is_single_identity());

        let observer = InterfaceType::observer("ChatListener");
        assert!(observer.is_observer());
        assert!(!observer.is_actor());
    }

    #[test]
    fn test_capabilities_can_be_empty() {
        let plain = InterfaceType::new("Helper", IdentityMode::Keyed, Capabilities::empty());
        assert!(!plain.is_actor());
        assert!(!plain.is_observer());
    }
}
