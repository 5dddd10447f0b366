// tests/stream_assignment.rs

use std::sync::Arc;

use streamdag::computation::{
    ArgumentType, BufferIdentity, DeviceArray, ElementState, KernelId, LaunchConfig,
};
use streamdag::context::{ComputationHandle, ContextOptions, ExecutionContext};
use streamdag::errors::SchedError;
use streamdag::runtime::{DeviceRuntime, StreamId};
use streamdag::types::IssuePolicyKind;
use streamdag_test_utils::builders::writer;
use streamdag_test_utils::{init_tracing, RecordingRuntime, RuntimeCall};

struct Fixture {
    rt: Arc<RecordingRuntime>,
    ctx: ExecutionContext,
    x: DeviceArray,
    y: DeviceArray,
    /// `pointer float`
    one: KernelId,
    /// `pointer float, pointer float`
    two: KernelId,
}

impl Fixture {
    fn new(options: ContextOptions) -> Self {
        init_tracing();
        let rt = Arc::new(RecordingRuntime::new());
        let mut ctx = ExecutionContext::new(rt.clone(), options);
        let x = ctx.allocate_array(ArgumentType::Float, 16).unwrap();
        let y = ctx.allocate_array(ArgumentType::Float, 16).unwrap();
        let one = ctx.declare_kernel("one", "pointer float").unwrap();
        let two = ctx.declare_kernel("two", "pointer float, pointer float").unwrap();
        rt.clear();
        Self {
            rt,
            ctx,
            x,
            y,
            one,
            two,
        }
    }

    fn one(&mut self, array: &DeviceArray) -> ComputationHandle {
        self.ctx
            .launch(self.one, LaunchConfig::default(), &[array.into()])
            .unwrap()
    }

    fn two(&mut self, a: &DeviceArray, b: &DeviceArray) -> ComputationHandle {
        self.ctx
            .launch(self.two, LaunchConfig::default(), &[a.into(), b.into()])
            .unwrap()
    }

    fn stream_of(&self, h: ComputationHandle) -> StreamId {
        self.ctx.dag().element(h.vertex()).stream().unwrap()
    }
}

#[test]
fn a_chain_stays_on_one_stream_without_waits() {
    let mut f = Fixture::new(ContextOptions::default());
    let x = f.x.clone();
    let a = f.one(&x);
    let b = f.one(&x);
    let c = f.one(&x);

    assert_eq!(f.stream_of(a), f.stream_of(b));
    assert_eq!(f.stream_of(b), f.stream_of(c));
    assert_eq!(f.rt.wait_count(), 0);
    assert_eq!(f.ctx.streams().num_streams(), 1);
}

#[test]
fn independent_work_runs_on_distinct_streams() {
    let mut f = Fixture::new(ContextOptions::default());
    let (x, y) = (f.x.clone(), f.y.clone());
    let a = f.one(&x);
    let b = f.one(&y);

    assert_ne!(f.stream_of(a), f.stream_of(b));
    assert_eq!(f.rt.wait_count(), 0);
}

#[test]
fn a_join_waits_on_every_off_stream_parent() {
    let mut f = Fixture::new(ContextOptions::default());
    let (x, y) = (f.x.clone(), f.y.clone());
    let a = f.one(&x);
    let b = f.one(&y);
    let c = f.two(&x, &y);

    let sc = f.stream_of(c);
    assert_ne!(sc, f.stream_of(a));
    assert_ne!(sc, f.stream_of(b));

    let parent_events: Vec<_> = [a, b]
        .iter()
        .map(|h| f.ctx.dag().element(h.vertex()).completion_event().unwrap())
        .collect();
    assert_eq!(f.rt.waits_on(sc), parent_events);

    f.ctx.wait(c).unwrap();
    assert_eq!(f.rt.sim().executed().unwrap(), vec!["one", "one", "two"]);
}

#[test]
fn waits_are_emitted_before_the_issue() {
    let mut f = Fixture::new(ContextOptions::default());
    let (x, y) = (f.x.clone(), f.y.clone());
    f.one(&x);
    f.one(&y);
    f.rt.clear();
    let c = f.two(&x, &y);
    let sc = f.stream_of(c);

    let calls = f.rt.calls();
    let issue_at = calls
        .iter()
        .position(|call| matches!(call, RuntimeCall::Issue { label, .. } if label == "two"))
        .unwrap();
    let waits: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, RuntimeCall::WaitEvent { stream, .. } if *stream == sc))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(waits.len(), 2);
    assert!(waits.iter().all(|&w| w < issue_at));
    assert!(matches!(
        calls[issue_at + 2],
        RuntimeCall::RecordEvent { stream, .. } if stream == sc
    ));
}

#[test]
fn busy_streams_are_not_reused_but_idle_ones_are() {
    let mut f = Fixture::new(ContextOptions::default());
    let (x, y) = (f.x.clone(), f.y.clone());
    let a = f.one(&x);
    let b = f.one(&y);
    assert_ne!(f.stream_of(a), f.stream_of(b));

    f.ctx.synchronize().unwrap();
    assert!(!f.ctx.is_any_computation_active().unwrap());

    // Both streams are idle now; the oldest one is handed out first.
    let c = f.one(&x);
    assert_eq!(f.stream_of(c), f.stream_of(a));
    let d = f.one(&y);
    assert_eq!(f.stream_of(d), f.stream_of(b));
    assert_eq!(f.ctx.streams().num_streams(), 2);
}

#[test]
fn second_child_of_a_parent_leaves_its_stream() {
    let mut f = Fixture::new(ContextOptions::default());
    let (x, y) = (f.x.clone(), f.y.clone());
    let a = f.two(&x, &y);
    let b = f.one(&x);
    let c = f.one(&y);

    assert_eq!(f.stream_of(b), f.stream_of(a));
    assert_ne!(f.stream_of(c), f.stream_of(a));
    assert_eq!(f.rt.waits_on(f.stream_of(c)).len(), 1);
}

#[test]
fn finished_parents_need_no_wait() {
    let mut f = Fixture::new(ContextOptions::default());
    let (x, y) = (f.x.clone(), f.y.clone());
    let a = f.one(&x);
    let b = f.one(&y);
    f.ctx.wait(a).unwrap();
    f.ctx.wait(b).unwrap();
    f.rt.clear();

    let c = f.two(&x, &y);
    assert_eq!(f.ctx.dag().parent_vertices(c.vertex()).count(), 2);
    assert_eq!(f.rt.wait_count(), 0);
}

#[test]
fn frontier_stays_stale_until_the_next_append() {
    let mut f = Fixture::new(ContextOptions::default());
    let x = f.x.clone();
    let a = f.one(&x);
    f.ctx.synchronize().unwrap();

    assert_eq!(f.ctx.state(a).unwrap(), ElementState::Finished);
    assert_eq!(f.ctx.dag().frontier(), &[a.vertex()]);
    assert!(!f.ctx.dag().vertex(a.vertex()).is_frontier());

    // The stale entry still takes part in the dependency check.
    let b = f.one(&x);
    assert_eq!(
        f.ctx.dag().parent_vertices(b.vertex()).collect::<Vec<_>>(),
        vec![a.vertex()]
    );
    assert_eq!(f.ctx.dag().frontier(), &[b.vertex()]);
}

#[test]
fn device_failure_fails_children_closed() {
    let mut f = Fixture::new(ContextOptions::default());
    f.rt.sim().fail_executions_of("one").unwrap();
    let (x, y) = (f.x.clone(), f.y.clone());
    let bad = f.one(&x);
    let join = f.two(&x, &y);
    let read_y = f.ctx.access_array(&y, false).unwrap();

    f.ctx.synchronize().unwrap();
    assert!(matches!(
        f.ctx.wait(bad),
        Err(SchedError::LaunchFailed { .. })
    ));
    assert!(matches!(
        f.ctx.wait(join),
        Err(SchedError::ParentFailed { parent, .. }) if parent == bad.vertex()
    ));
    // The read of y depends on the failed join and fails as well.
    assert_eq!(f.ctx.state(read_y).unwrap(), ElementState::Failed);
    assert!(f.rt.sim().executed().unwrap().is_empty());
}

#[test]
fn failed_stream_is_not_reused_while_work_is_still_queued() {
    let mut f = Fixture::new(ContextOptions::default());
    f.rt.sim().fail_executions_of("two").unwrap();
    let (x, y) = (f.x.clone(), f.y.clone());
    let bad = f.two(&x, &x);
    let child = f.one(&x);
    let s0 = f.stream_of(bad);
    assert_eq!(f.stream_of(child), s0);

    // Run the failing launch and its record only; the child stays queued.
    f.rt.sim().step().unwrap();
    f.rt.sim().step().unwrap();
    assert_eq!(f.rt.sim().pending_operations().unwrap(), 2);

    let independent = f.one(&y);
    assert_eq!(f.ctx.state(bad).unwrap(), ElementState::Failed);
    assert_eq!(f.ctx.state(child).unwrap(), ElementState::Running);
    assert!(f.ctx.is_any_computation_active().unwrap());
    assert_ne!(f.stream_of(independent), s0);

    f.ctx.wait(independent).unwrap();
    assert!(matches!(
        f.ctx.wait(child),
        Err(SchedError::ParentFailed { parent, .. }) if parent == bad.vertex()
    ));
    assert_eq!(f.rt.sim().executed().unwrap(), vec!["one"]);
    assert!(!f.ctx.is_any_computation_active().unwrap());
}

#[test]
fn held_back_descendants_fail_without_being_issued() {
    let mut f = Fixture::new(ContextOptions {
        issue_policy: IssuePolicyKind::Deferred,
        batch_size: 2,
        ..ContextOptions::default()
    });
    f.rt.sim().fail_executions_of("two").unwrap();
    let (x, y) = (f.x.clone(), f.y.clone());
    let bad = f.two(&x, &y);
    let issued = f.one(&x);
    let held = f.one(&x);
    assert!(f.ctx.has_pending_work());

    // Drive the device without letting the context observe anything.
    f.rt.sim().run_until_idle().unwrap();

    assert_eq!(f.ctx.state(held).unwrap(), ElementState::Failed);
    assert_eq!(f.ctx.state(issued).unwrap(), ElementState::Failed);
    assert!(matches!(
        f.ctx.wait(held),
        Err(SchedError::ParentFailed { parent, .. }) if parent == issued.vertex()
    ));
    assert!(matches!(
        f.ctx.wait(issued),
        Err(SchedError::ParentFailed { parent, .. }) if parent == bad.vertex()
    ));
    let labels: Vec<String> = f.rt.issued().into_iter().map(|(l, _)| l).collect();
    assert_eq!(labels, vec!["two", "one"]);
}

#[test]
fn launch_on_a_freed_buffer_fails_and_its_children_fail_closed() {
    let mut f = Fixture::new(ContextOptions::default());
    let y = f.y.clone();
    f.rt.free(y.buffer_id()).unwrap();
    assert!(!f.rt.sim().is_allocated(y.buffer_id()).unwrap());

    let stale = f.one(&y);
    let child = f.one(&y);
    assert!(matches!(
        f.ctx.wait(stale),
        Err(SchedError::LaunchFailed { vertex, reason })
            if vertex == stale.vertex() && reason.contains("invalid buffer")
    ));
    assert!(matches!(
        f.ctx.wait(child),
        Err(SchedError::ParentFailed { parent, .. }) if parent == stale.vertex()
    ));
    // Only the stale launch reached the device, and it was turned away there.
    let labels: Vec<String> = f.rt.issued().into_iter().map(|(l, _)| l).collect();
    assert_eq!(labels, vec!["one"]);
    assert!(f.rt.sim().executed().unwrap().is_empty());
}

#[test]
fn launch_on_a_never_allocated_buffer_fails() {
    let mut f = Fixture::new(ContextOptions::default());
    assert!(!f.rt.sim().is_allocated(streamdag::computation::BufferId(999)).unwrap());

    let h = f.ctx.register_execution(writer(&[999])).unwrap();
    assert_eq!(f.ctx.state(h).unwrap(), ElementState::Failed);
    assert!(matches!(f.ctx.wait(h), Err(SchedError::LaunchFailed { .. })));
    assert!(!f.ctx.is_any_computation_active().unwrap());
}

#[test]
fn rejected_launch_is_never_followed_by_its_children() {
    let mut f = Fixture::new(ContextOptions::default());
    f.rt.sim().fail_launches_of("one").unwrap();
    let (x, y) = (f.x.clone(), f.y.clone());
    let bad = f.one(&x);
    let child = f.two(&x, &y);

    assert_eq!(f.ctx.state(bad).unwrap(), ElementState::Failed);
    assert_eq!(f.ctx.state(child).unwrap(), ElementState::Failed);
    let issued: Vec<String> = f.rt.issued().into_iter().map(|(label, _)| label).collect();
    assert_eq!(issued, vec!["one"]);
    assert!(matches!(
        f.ctx.wait(child),
        Err(SchedError::ParentFailed { .. })
    ));
}

#[test]
fn deferred_issue_batches_in_registration_order() {
    let mut f = Fixture::new(ContextOptions {
        issue_policy: IssuePolicyKind::Deferred,
        batch_size: 3,
        ..ContextOptions::default()
    });
    let (x, y) = (f.x.clone(), f.y.clone());
    f.one(&x);
    f.one(&y);
    assert!(f.rt.issued().is_empty());
    assert!(f.ctx.has_pending_work());

    let c = f.two(&x, &y);
    let labels: Vec<String> = f.rt.issued().into_iter().map(|(l, _)| l).collect();
    assert_eq!(labels, vec!["one", "one", "two"]);
    assert_eq!(f.rt.waits_on(f.stream_of(c)).len(), 2);
    assert!(!f.ctx.has_pending_work());
}

#[test]
fn stream_cap_shares_streams_and_stays_ordered() {
    let mut f = Fixture::new(ContextOptions {
        max_streams: Some(1),
        ..ContextOptions::default()
    });
    let (x, y) = (f.x.clone(), f.y.clone());
    let a = f.one(&x);
    let b = f.one(&y);
    let c = f.two(&x, &y);

    assert_eq!(f.stream_of(a), f.stream_of(b));
    assert_eq!(f.stream_of(b), f.stream_of(c));
    f.ctx.wait(c).unwrap();
    assert_eq!(f.rt.sim().live_streams().unwrap(), 1);
}

#[test]
fn cleanup_destroys_streams_and_events() {
    let mut f = Fixture::new(ContextOptions::default());
    let (x, y) = (f.x.clone(), f.y.clone());
    f.one(&x);
    f.one(&y);

    f.ctx.cleanup().unwrap();
    let destroyed = f
        .rt
        .calls()
        .iter()
        .filter(|c| matches!(c, RuntimeCall::DestroyStream(_)))
        .count();
    assert_eq!(destroyed, 2);
    assert_eq!(f.rt.sim().live_streams().unwrap(), 0);
    assert_eq!(f.rt.sim().live_events().unwrap(), 0);

    f.ctx.cleanup().unwrap();
}
