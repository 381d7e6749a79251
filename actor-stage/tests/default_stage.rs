//! Process default stage. Kept in its own test binary: the default slot is
//! process-wide, so no other test may start a stage here.

mod common;

use std::sync::Arc;

use actor_stage::binding::{self, BindingSource};
use actor_stage::{
    ClusterError, InMemoryClusterPeer, InMemoryNetwork, ResolveError, Stage, StageError,
    StageState,
};
use common::{counter_class, init_tracing, Counter, Recorded};
use serde_json::{json, Value};
use tokio::sync::oneshot;

fn stage(cluster: &str) -> Stage {
    let stage = Stage::new();
    stage.set_cluster_name(cluster).unwrap();
    stage.add_provider(counter_class()).unwrap();
    stage
        .set_cluster_peer(Arc::new(InMemoryClusterPeer::new(InMemoryNetwork::new())))
        .unwrap();
    stage
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_default_stage_lifecycle() {
    init_tracing();
    let counter = Stage::new().get_reference::<Counter>("default").unwrap();
    assert_eq!(
        binding::resolve(counter.reference()).err(),
        Some(ResolveError::Unbound)
    );

    let first = stage("default-first");
    let second = stage("default-second");
    first.start().await.expect("start first");
    second.start().await.expect("start second");
    assert_eq!(binding::default_stage(), Some(first.clone()));

    // Unbound references resolve to the first stage that reached running.
    assert_eq!(counter.invoke("increment", Value::Null).await.unwrap(), json!(1));
    let first_execution = first.execution().unwrap();
    assert!(first_execution.is_activated(counter.reference()));

    // A context binding wins on its own thread only.
    let copy = counter.clone();
    let second_for_thread = second.clone();
    let on_bound_thread = std::thread::spawn(move || {
        second_for_thread.bind();
        binding::resolve_with_source(copy.reference()).map(|(s, source)| (s.id(), source))
    })
    .join()
    .expect("thread");
    assert_eq!(on_bound_thread, Ok((second.id(), BindingSource::Context)));

    let copy = counter.clone();
    let on_other_thread = std::thread::spawn(move || {
        binding::resolve_with_source(copy.reference()).map(|(s, source)| (s.id(), source))
    })
    .join()
    .expect("thread");
    assert_eq!(on_other_thread, Ok((first.id(), BindingSource::Default)));

    // Inside tasks the context is the task, not the worker thread.
    let (bound_tx, bound_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let copy = counter.clone();
    let second_for_task = second.clone();
    let binder = tokio::spawn(async move {
        second_for_task.bind();
        let _ = bound_tx.send(());
        let _ = release_rx.await;
        binding::resolve_with_source(copy.reference()).map(|(s, source)| (s.id(), source))
    });
    bound_rx.await.expect("task bound");

    let copy = counter.clone();
    let unbound = tokio::spawn(async move {
        binding::resolve_with_source(copy.reference()).map(|(s, source)| (s.id(), source))
    })
    .await
    .expect("task");
    assert_eq!(unbound, Ok((first.id(), BindingSource::Default)));

    let _ = release_tx.send(());
    let on_bound_task = binder.await.expect("task");
    assert_eq!(on_bound_task, Ok((second.id(), BindingSource::Context)));

    // Stopping the default releases the slot; the next start claims it.
    first.stop().await.expect("stop first");
    assert_eq!(binding::default_stage(), None);
    let third = stage("default-third");
    third.start().await.expect("start third");
    assert_eq!(binding::default_stage(), Some(third.clone()));

    second.stop().await.expect("stop second");

    // A stop that fails to leave still gives up the slot.
    let recorded = Recorded::new(InMemoryNetwork::new());
    recorded.peer.fail_next_leave();
    let failing = Stage::new();
    failing.set_cluster_name("default-failing").unwrap();
    recorded.inject(&failing);
    third.stop().await.expect("stop third");
    failing.start().await.expect("start failing");
    assert_eq!(binding::default_stage(), Some(failing.clone()));

    let stopped = failing.stop().await;
    assert!(matches!(
        stopped,
        Err(StageError::Leave(ClusterError::OperationFailed(_)))
    ));
    assert_eq!(failing.state(), StageState::Stopped);
    assert_eq!(binding::default_stage(), None);

    let fourth = stage("default-fourth");
    fourth.start().await.expect("start fourth");
    assert_eq!(binding::default_stage(), Some(fourth.clone()));
    fourth.stop().await.expect("stop fourth");
}
