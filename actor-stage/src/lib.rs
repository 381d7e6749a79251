//! # actor-stage
//!
//! The stage is one runtime node of a virtual actor cluster. It owns (or
//! fronts for) the four collaborating subsystems of a node and decides which
//! stage in the current process issues a call made through a reference.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Stage                                │
//! │   configure → classify providers → wire → start → join      │
//! ├──────────────┬──────────────┬──────────────┬────────────────┤
//! │  Messaging   │   Hosting    │  Execution   │  ClusterPeer   │
//! │  • requests  │  • placement │  • activation│  • membership  │
//! │  • timeouts  │  • directory │  • dispatch  │  • delivery    │
//! └──────────────┴──────────────┴──────────────┴────────────────┘
//!          ▲
//!          │ resolve(reference): reference binding → dispatch
//!          │ grounding → task (or thread) binding → process default
//!   ActorRef / ObserverRef
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use actor_stage::prelude::*;
//!
//! let stage = Stage::with_config(
//!     StageConfig::builder()
//!         .cluster_name("chat")
//!         .mode(StageMode::Host)
//!         .provider(ActorClass::new::<ChatRoom, _, _>("ChatRoomActor", |_| ChatRoomActor::default()))
//!         .build(),
//! );
//! stage.start().await?;
//!
//! let room = stage.get_reference::<ChatRoom>("lobby")?;
//! let reply = room.invoke("post", serde_json::json!({ "text": "hi" })).await?;
//!
//! stage.stop().await?;
//! ```
//!
//! ## Modules
//!
//! - [`stage`] - lifecycle and cross-wiring of the subsystems
//! - [`provider`] - provider entries and their classification
//! - [`reference`] - references and the reference factory
//! - [`binding`] - stage resolution for outgoing calls
//! - [`subsystems`] - collaborator traits and in-memory defaults

#![deny(missing_docs)]

pub mod actor;
pub mod binding;
pub mod catalog;
pub mod config;
pub mod container;
pub mod error;
pub mod interface;
pub mod prelude;
pub mod provider;
pub mod reference;
pub mod stage;
pub mod subsystems;
pub mod time;

mod sync;

pub use actor::{Actor, ActorContext, ActorObserver, Invocation};
pub use binding::BindingSource;
pub use config::{StageConfig, StageConfigBuilder, StageMode, StageSettings};
pub use container::{Container, MapContainer};
pub use error::{
    ActorError, ClusterError, ConfigError, ExecutionError, HostingError, InvokeError,
    MessagingError, ResolveError, StageError,
};
pub use interface::{ActorInterface, Capabilities, IdentityMode, InterfaceType, NO_IDENTITY};
pub use provider::{
    classify, ActorClass, ClassPattern, ClassifiedProviders, ProviderEntry, StageProvider,
};
pub use reference::{ActorRef, ObserverRef, Reference, ReferenceFactory, ReferenceKind};
pub use stage::{Stage, StageId, StageState, SubsystemOwnership, WeakStage};
pub use subsystems::{
    ClusterMember, ClusterPeer, Execution, Hosting, InMemoryClusterPeer, InMemoryNetwork,
    LocalExecution, LocalHosting, LocalMessaging, Messaging, NodeAddress, NodeType, Subsystem,
};
pub use time::{Clock, ManualClock, SystemClock};
