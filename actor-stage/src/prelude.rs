//! Convenient re-exports for applications embedding a stage.
//!
//! ```rust,ignore
//! use actor_stage::prelude::*;
//! ```

pub use crate::actor::{Actor, ActorContext, ActorObserver, Invocation};
pub use crate::config::{StageConfig, StageMode, StageSettings};
pub use crate::error::{ActorError, InvokeError, StageError};
pub use crate::interface::{ActorInterface, InterfaceType};
pub use crate::provider::{ActorClass, ProviderEntry, StageProvider};
pub use crate::reference::{ActorRef, ObserverRef, Reference};
pub use crate::stage::{Stage, StageState};
