//! Stage configuration.
//!
//! [`StageConfig`] collects everything a [`Stage`](crate::Stage) needs before
//! start: the cluster to join, the node mode, the pools that run execution
//! and transport work, and the raw provider list. It can be built in code
//! through [`StageConfig::builder`] or loaded from a [`StageSettings`]
//! document.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = StageConfig::builder()
//!     .cluster_name("chat")
//!     .mode(StageMode::FrontEnd)
//!     .provider("com\\.example\\..*")
//!     .build();
//!
//! let settings = StageSettings::from_json_str(
//!     r#"{ "clusterName": "chat", "stageMode": "FRONT_END" }"#,
//! )?;
//! let config = settings.into_config();
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::container::Container;
use crate::error::ConfigError;
use crate::provider::ProviderEntry;
use crate::subsystems::NodeType;
use crate::time::Clock;

/// Whether a stage may hold live activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageMode {
    /// Hosts activations.
    #[default]
    Host,
    /// Client only: issues calls, never activates actors.
    FrontEnd,
}

impl StageMode {
    /// Hosting node type for this mode.
    pub fn node_type(self) -> NodeType {
        match self {
            StageMode::Host => NodeType::Server,
            StageMode::FrontEnd => NodeType::Client,
        }
    }
}

/// Configuration of a single stage.
#[derive(Debug, Clone, Default)]
pub struct StageConfig {
    pub(crate) cluster_name: Option<String>,
    pub(crate) mode: StageMode,
    pub(crate) execution_pool: Option<Handle>,
    pub(crate) messaging_pool: Option<Handle>,
    pub(crate) clock: Option<Arc<dyn Clock>>,
    pub(crate) auto_discovery: bool,
    pub(crate) providers: Vec<ProviderEntry>,
    pub(crate) container: Option<Arc<dyn Container>>,
}

impl StageConfig {
    /// Start building a configuration.
    pub fn builder() -> StageConfigBuilder {
        StageConfigBuilder::default()
    }

    /// Cluster this stage joins on start.
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Node mode.
    pub fn mode(&self) -> StageMode {
        self.mode
    }

    /// Pool for actor execution work, if explicitly set.
    pub fn execution_pool(&self) -> Option<&Handle> {
        self.execution_pool.as_ref()
    }

    /// Pool for transport work, if explicitly set.
    pub fn messaging_pool(&self) -> Option<&Handle> {
        self.messaging_pool.as_ref()
    }

    /// Clock override, if set.
    pub fn clock(&self) -> Option<&Arc<dyn Clock>> {
        self.clock.as_ref()
    }

    /// Whether catalog classes are considered for registration.
    pub fn auto_discovery(&self) -> bool {
        self.auto_discovery
    }

    /// Raw provider list, in insertion order.
    pub fn providers(&self) -> &[ProviderEntry] {
        &self.providers
    }

    /// Managed container, if the stage runs inside one.
    pub fn container(&self) -> Option<&Arc<dyn Container>> {
        self.container.as_ref()
    }
}

/// Builder for [`StageConfig`].
#[derive(Debug, Clone, Default)]
pub struct StageConfigBuilder {
    config: StageConfig,
}

impl StageConfigBuilder {
    /// Set the cluster name.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.config.cluster_name = Some(name.into());
        self
    }

    /// Set the node mode.
    pub fn mode(mut self, mode: StageMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the execution pool.
    pub fn execution_pool(mut self, pool: Handle) -> Self {
        self.config.execution_pool = Some(pool);
        self
    }

    /// Set the messaging pool.
    pub fn messaging_pool(mut self, pool: Handle) -> Self {
        self.config.messaging_pool = Some(pool);
        self
    }

    /// Override the clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = Some(clock);
        self
    }

    /// Enable or disable catalog discovery.
    pub fn auto_discovery(mut self, enabled: bool) -> Self {
        self.config.auto_discovery = enabled;
        self
    }

    /// Append a provider entry.
    pub fn provider(mut self, entry: impl Into<ProviderEntry>) -> Self {
        self.config.providers.push(entry.into());
        self
    }

    /// Run inside a managed container.
    pub fn container(mut self, container: Arc<dyn Container>) -> Self {
        self.config.container = Some(container);
        self
    }

    /// Build the configuration (infallible).
    pub fn build(self) -> StageConfig {
        self.config
    }
}

/// Serializable stage settings.
///
/// Field names follow the camelCase keys of stage configuration documents:
/// `clusterName`, `stageMode`, `autoDiscovery`, `actorClassPatterns`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageSettings {
    /// Cluster to join.
    pub cluster_name: Option<String>,
    /// Node mode (`HOST` or `FRONT_END`).
    pub stage_mode: StageMode,
    /// Whether catalog classes are considered for registration.
    pub auto_discovery: bool,
    /// Actor class name patterns appended to the provider list.
    pub actor_class_patterns: Vec<String>,
}

impl StageSettings {
    /// Parse settings from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Convert into a stage configuration.
    pub fn into_config(self) -> StageConfig {
        StageConfig {
            cluster_name: self.cluster_name,
            mode: self.stage_mode,
            auto_discovery: self.auto_discovery,
            providers: self
                .actor_class_patterns
                .into_iter()
                .map(ProviderEntry::ActorClassPattern)
                .collect(),
            ..StageConfig::default()
        }
    }
}
