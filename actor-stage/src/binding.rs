//! Which stage issues a call made through a reference.
//!
//! Several stages may live in one process. When a reference is invoked the
//! issuing stage is resolved in this order:
//!
//! 1. the stage bound to that reference value, if any. A bound stage that
//!    has been dropped is an error; the call is never re-routed;
//! 2. the stage grounding the current actor or observer invocation;
//! 3. the stage bound to the current call context: the running tokio task,
//!    or the OS thread when called outside any task;
//! 4. the process default stage (the first stage to reach running).
//!
//! Every binding holds a [`WeakStage`], so none of them keeps a stage
//! alive. There is no unbind: a later bind in the same scope overwrites.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, RwLock};

use tokio::task;
use tracing::debug;

use crate::error::ResolveError;
use crate::reference::Reference;
use crate::stage::{Stage, WeakStage};
use crate::sync::{lock, read, write};

thread_local! {
    static THREAD_CONTEXT: RefCell<WeakStage> = const { RefCell::new(WeakStage::new()) };
}

/// Context bindings of tokio tasks. A task keeps its binding across
/// awaits whichever worker it resumes on.
static TASK_CONTEXT: LazyLock<Mutex<HashMap<task::Id, WeakStage>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

tokio::task_local! {
    static DISPATCH_STAGE: WeakStage;
}

static DEFAULT_STAGE: RwLock<WeakStage> = RwLock::new(WeakStage::new());

/// Where a resolved stage came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    /// Bound to the reference value.
    Reference,
    /// Grounding of the running actor or observer invocation.
    Dispatch,
    /// Bound to the current task, or thread outside any task.
    Context,
    /// Process default.
    Default,
}

/// Binding slot carried by a reference and shared by its clones.
#[derive(Clone, Default)]
pub(crate) struct ReferenceBinding(Arc<RwLock<Option<WeakStage>>>);

impl ReferenceBinding {
    pub(crate) fn get(&self) -> Option<WeakStage> {
        read(&self.0).clone()
    }

    pub(crate) fn set(&self, stage: WeakStage) {
        *write(&self.0) = Some(stage);
    }
}

/// Bind the current call context to `stage`.
///
/// Inside a tokio task the binding belongs to that task only; spawned
/// tasks do not inherit it. Outside any task it belongs to the thread.
pub fn bind_context(stage: &Stage) {
    let weak = stage.downgrade();
    match task::try_id() {
        Some(id) => {
            let mut table = lock(&TASK_CONTEXT);
            // Bindings to dropped stages resolve as absent anyway.
            table.retain(|_, bound| bound.upgrade().is_some());
            table.insert(id, weak);
            debug!(stage = %stage.id(), task = %id, "bound task context");
        }
        None => {
            THREAD_CONTEXT.with(|slot| *slot.borrow_mut() = weak);
            debug!(stage = %stage.id(), "bound thread context");
        }
    }
}

/// Stage bound to the current call context, while it is alive.
pub fn current_context() -> Option<Stage> {
    match task::try_id() {
        Some(id) => lock(&TASK_CONTEXT).get(&id).and_then(WeakStage::upgrade),
        None => THREAD_CONTEXT.with(|slot| slot.borrow().upgrade()),
    }
}

/// Bind `reference`, and every clone of it, to `stage`.
pub fn bind_reference(reference: &Reference, stage: &Stage) {
    reference.binding().set(stage.downgrade());
    debug!(%reference, stage = %stage.id(), "bound reference");
}

/// Stage grounding the current invocation, if any.
pub fn dispatch_stage() -> Option<Stage> {
    DISPATCH_STAGE
        .try_with(|stage| stage.upgrade())
        .ok()
        .flatten()
}

/// Run `future` grounded on `stage`.
///
/// Execution implementations wrap every actor and observer invocation in
/// this so references used by the handler resolve to the hosting stage.
pub async fn grounded<F: Future>(stage: &WeakStage, future: F) -> F::Output {
    DISPATCH_STAGE.scope(stage.clone(), future).await
}

/// Process default stage, while it is alive.
pub fn default_stage() -> Option<Stage> {
    read(&DEFAULT_STAGE).upgrade()
}

/// Make `stage` the default unless a live default exists. Returns true
/// when `stage` holds the slot afterwards.
pub(crate) fn set_default(stage: &Stage) -> bool {
    let mut slot = write(&DEFAULT_STAGE);
    match slot.upgrade() {
        Some(current) => current.id() == stage.id(),
        None => {
            *slot = stage.downgrade();
            debug!(stage = %stage.id(), "default stage claimed");
            true
        }
    }
}

/// Clear the default slot if `stage` holds it.
pub(crate) fn clear_default_if(stage: &Stage) {
    let mut slot = write(&DEFAULT_STAGE);
    if slot.id() == Some(stage.id()) {
        *slot = WeakStage::new();
        debug!(stage = %stage.id(), "default stage released");
    }
}

/// Resolve the stage issuing a call through `reference`.
pub fn resolve(reference: &Reference) -> Result<Stage, ResolveError> {
    resolve_with_source(reference).map(|(stage, _)| stage)
}

/// Like [`resolve`], also reporting which binding applied.
pub fn resolve_with_source(reference: &Reference) -> Result<(Stage, BindingSource), ResolveError> {
    let resolved = if let Some(bound) = reference.binding().get() {
        let stage = bound.upgrade().ok_or(ResolveError::StageGone {
            stage: bound.id().unwrap_or_default(),
        })?;
        (stage, BindingSource::Reference)
    } else if let Some(stage) = dispatch_stage() {
        (stage, BindingSource::Dispatch)
    } else if let Some(stage) = current_context() {
        (stage, BindingSource::Context)
    } else if let Some(stage) = default_stage() {
        (stage, BindingSource::Default)
    } else {
        return Err(ResolveError::Unbound);
    };

    debug!(%reference, stage = %resolved.0.id(), source = ?resolved.1, "resolved stage");
    Ok(resolved)
}
