//! Provider entries and their classification.
//!
//! A stage accepts one flat, ordered list of provider entries. Start sorts
//! it into the three registrations execution consumes:
//!
//! ```text
//! [ActorClass, "com.example.*", Extension, Opaque, …]
//!        │             │            │        │
//!        ▼             ▼            ▼        ▼
//!     classes       patterns    providers  (dropped)
//! ```
//!
//! Classification never fails. Entries that are not recognized, classes
//! without the actor or observer capability, and patterns that do not
//! compile are dropped so unrelated configuration can share the list.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::actor::{Actor, ActorContext};
use crate::error::ActorError;
use crate::interface::{ActorInterface, Capabilities, InterfaceType};

/// Extension installed into a stage: lifetime hooks around start, stop and
/// every activation.
#[async_trait]
pub trait StageProvider: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called when execution starts, in provider order.
    async fn start(&self) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called after execution drained its activations.
    async fn stop(&self) -> Result<(), ActorError> {
        Ok(())
    }

    /// Awaited before an actor's first use. A failure fails the activation.
    async fn pre_activation(
        &self,
        _actor: &mut dyn Actor,
        _ctx: &ActorContext,
    ) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called after an actor was deactivated.
    async fn post_deactivation(&self, _ctx: &ActorContext) -> Result<(), ActorError> {
        Ok(())
    }
}

/// Factory creating an actor instance for an identity.
pub type ActorFactory = Arc<dyn Fn(&str) -> Box<dyn Actor> + Send + Sync>;

/// Actor or observer implementation class.
#[derive(Clone)]
pub struct ActorClass {
    name: String,
    interface: InterfaceType,
    factory: Option<ActorFactory>,
}

impl ActorClass {
    /// Actor implementation of interface `I`, created per identity by `factory`.
    pub fn new<I, A, F>(name: impl Into<String>, factory: F) -> Self
    where
        I: ActorInterface,
        A: Actor,
        F: Fn(&str) -> A + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            interface: I::INTERFACE,
            factory: Some(Arc::new(move |identity| Box::new(factory(identity)))),
        }
    }

    /// Implementation class without a factory, e.g. an observer class.
    pub fn declared(name: impl Into<String>, interface: InterfaceType) -> Self {
        Self {
            name: name.into(),
            interface,
            factory: None,
        }
    }

    /// Implementation class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interface implemented by this class.
    pub fn interface(&self) -> InterfaceType {
        self.interface
    }

    /// Capabilities the class carries through its interface.
    pub fn capabilities(&self) -> Capabilities {
        self.interface.capabilities()
    }

    /// Create an instance for `identity`, if the class can be instantiated.
    pub fn instantiate(&self, identity: &str) -> Option<Box<dyn Actor>> {
        self.factory.as_ref().map(|factory| factory(identity))
    }
}

impl fmt::Debug for ActorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorClass")
            .field("name", &self.name)
            .field("interface", &self.interface.name())
            .field("instantiable", &self.factory.is_some())
            .finish()
    }
}

/// Compiled actor class name pattern.
///
/// Patterns match whole class names.
#[derive(Debug, Clone)]
pub struct ClassPattern {
    source: String,
    regex: Regex,
}

impl ClassPattern {
    /// Compile a pattern.
    pub fn compile(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self { source, regex })
    }

    /// Pattern as written in the configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when `class_name` matches the whole pattern.
    pub fn matches(&self, class_name: &str) -> bool {
        self.regex.is_match(class_name)
    }
}

/// One entry of the stage provider list.
#[derive(Clone)]
pub enum ProviderEntry {
    /// Extension with lifetime hooks.
    Extension(Arc<dyn StageProvider>),
    /// Actor class name pattern filtering discovered implementations.
    ActorClassPattern(String),
    /// Explicit actor or observer implementation class.
    ActorClass(ActorClass),
    /// Unrelated configuration object; ignored by classification.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl ProviderEntry {
    /// Extension entry.
    pub fn extension(provider: impl StageProvider) -> Self {
        ProviderEntry::Extension(Arc::new(provider))
    }

    /// Pattern entry.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        ProviderEntry::ActorClassPattern(pattern.into())
    }

    /// Opaque entry.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        ProviderEntry::Opaque(Arc::new(value))
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderEntry::Extension(provider) => {
                f.debug_tuple("Extension").field(&provider.name()).finish()
            }
            ProviderEntry::ActorClassPattern(pattern) => {
                f.debug_tuple("ActorClassPattern").field(pattern).finish()
            }
            ProviderEntry::ActorClass(class) => f.debug_tuple("ActorClass").field(class).finish(),
            ProviderEntry::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

impl From<&str> for ProviderEntry {
    fn from(pattern: &str) -> Self {
        ProviderEntry::pattern(pattern)
    }
}

impl From<String> for ProviderEntry {
    fn from(pattern: String) -> Self {
        ProviderEntry::ActorClassPattern(pattern)
    }
}

impl From<ActorClass> for ProviderEntry {
    fn from(class: ActorClass) -> Self {
        ProviderEntry::ActorClass(class)
    }
}

impl From<Arc<dyn StageProvider>> for ProviderEntry {
    fn from(provider: Arc<dyn StageProvider>) -> Self {
        ProviderEntry::Extension(provider)
    }
}

/// Output of [`classify`].
#[derive(Default, Clone)]
pub struct ClassifiedProviders {
    /// Extensions, in input order.
    pub providers: Vec<Arc<dyn StageProvider>>,
    /// Compiled class name patterns, in input order.
    pub patterns: Vec<ClassPattern>,
    /// Actor and observer classes, in input order.
    pub classes: Vec<ActorClass>,
}

impl fmt::Debug for ClassifiedProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ClassifiedProviders")
            .field("providers", &providers)
            .field("patterns", &self.patterns)
            .field("classes", &self.classes)
            .finish()
    }
}

/// Partition provider entries into extensions, patterns and classes.
///
/// Relative order is preserved within each output. Unrecognized entries are
/// dropped without error.
pub fn classify<'a>(entries: impl IntoIterator<Item = &'a ProviderEntry>) -> ClassifiedProviders {
    let mut out = ClassifiedProviders::default();
    let mut dropped = 0usize;

    for entry in entries {
        match entry {
            ProviderEntry::Extension(provider) => out.providers.push(Arc::clone(provider)),
            ProviderEntry::ActorClassPattern(source) => {
                match ClassPattern::compile(source.as_str()) {
                    Ok(pattern) => out.patterns.push(pattern),
                    Err(error) => {
                        warn!(pattern = %source, %error, "dropping invalid actor class pattern");
                        dropped += 1;
                    }
                }
            }
            ProviderEntry::ActorClass(class)
                if class
                    .capabilities()
                    .intersects(Capabilities::ACTOR | Capabilities::OBSERVER) =>
            {
                out.classes.push(class.clone())
            }
            ProviderEntry::ActorClass(_) | ProviderEntry::Opaque(_) => dropped += 1,
        }
    }

    debug!(
        providers = out.providers.len(),
        patterns = out.patterns.len(),
        classes = out.classes.len(),
        dropped,
        "classified provider entries"
    );
    out
}
