// ============================================================================
// spark-observe - Lifecycle Coordinator
// Phase queues and begin/end batching for bind, attach, detach and unbind
// ============================================================================
//
// Every phase transition of the component tree goes through one coordinator.
// Nested begin/end pairs only bump a depth counter; the outermost `end_*`
// drains the phase's queues once. Tasks registered during a batch defer the
// drain until they complete.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::queue::PhaseQueue;
use super::task::{done_task, AggregateTask, LifecycleTask};
use crate::core::constants::*;

// =============================================================================
// PARTICIPANT TRAITS
// =============================================================================

/// Member of the flush queue: something that publishes deferred changes.
pub trait Flushable {
    fn flush(&self, flags: u32);
}

/// A participant in the phase queues.
///
/// `hooks()` declares which callbacks the node implements (`HOOK_*` bits).
/// Enqueueing a node for a hook it does not declare does nothing, so callers
/// never have to check first.
#[allow(unused_variables)]
pub trait LifecycleNode {
    fn hooks(&self) -> u32;

    fn connect(&self, flags: u32) {}

    fn patch(&self, flags: u32) {}

    fn bound(&self, flags: u32) {}

    fn mount(&self, flags: u32) {}

    fn attached(&self, flags: u32) {}

    /// Remove nodes from the host. Returns true if the node was returned to a cache.
    fn unmount(&self, flags: u32) -> bool {
        false
    }

    fn detached(&self, flags: u32) {}

    fn unbound(&self, flags: u32) {}

    fn unbind_after_detach(&self, flags: u32) {}
}

/// Names a queue for [`Lifecycle::pending`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Queue {
    Flush,
    Connect,
    Patch,
    Bound,
    Mount,
    Attached,
    Unmount,
    Detached,
    Unbound,
    UnbindAfterDetach,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Sequences phase callbacks for a component tree.
pub struct Lifecycle {
    self_weak: Weak<Lifecycle>,

    bind_depth: Cell<u32>,
    unbind_depth: Cell<u32>,
    attach_depth: Cell<u32>,
    detach_depth: Cell<u32>,

    flush: PhaseQueue<dyn Flushable>,
    connect: PhaseQueue<dyn LifecycleNode>,
    patch: PhaseQueue<dyn LifecycleNode>,
    bound: PhaseQueue<dyn LifecycleNode>,
    mount: PhaseQueue<dyn LifecycleNode>,
    attached: PhaseQueue<dyn LifecycleNode>,
    unmount: PhaseQueue<dyn LifecycleNode>,
    detached: PhaseQueue<dyn LifecycleNode>,
    unbound: PhaseQueue<dyn LifecycleNode>,
    unbind_after_detach: PhaseQueue<dyn LifecycleNode>,

    /// Async work registered during the current batch
    task: RefCell<Option<Rc<AggregateTask>>>,
}

impl Lifecycle {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            self_weak: self_weak.clone(),
            bind_depth: Cell::new(0),
            unbind_depth: Cell::new(0),
            attach_depth: Cell::new(0),
            detach_depth: Cell::new(0),
            flush: PhaseQueue::new("flush"),
            connect: PhaseQueue::new("connect"),
            patch: PhaseQueue::new("patch"),
            bound: PhaseQueue::new("bound"),
            mount: PhaseQueue::new("mount"),
            attached: PhaseQueue::new("attached"),
            unmount: PhaseQueue::new("unmount"),
            detached: PhaseQueue::new("detached"),
            unbound: PhaseQueue::new("unbound"),
            unbind_after_detach: PhaseQueue::new("unbind-after-detach"),
            task: RefCell::new(None),
        })
    }

    /// Number of nodes currently waiting in `queue`.
    pub fn pending(&self, queue: Queue) -> usize {
        match queue {
            Queue::Flush => self.flush.count(),
            Queue::Connect => self.connect.count(),
            Queue::Patch => self.patch.count(),
            Queue::Bound => self.bound.count(),
            Queue::Mount => self.mount.count(),
            Queue::Attached => self.attached.count(),
            Queue::Unmount => self.unmount.count(),
            Queue::Detached => self.detached.count(),
            Queue::Unbound => self.unbound.count(),
            Queue::UnbindAfterDetach => self.unbind_after_detach.count(),
        }
    }

    pub fn is_binding(&self) -> bool {
        self.bind_depth.get() > 0
    }

    pub fn is_unbinding(&self) -> bool {
        self.unbind_depth.get() > 0
    }

    pub fn is_attaching(&self) -> bool {
        self.attach_depth.get() > 0
    }

    pub fn is_detaching(&self) -> bool {
        self.detach_depth.get() > 0
    }

    // =========================================================================
    // ENQUEUE
    // =========================================================================

    pub fn enqueue_flush(&self, node: Rc<dyn Flushable>) -> bool {
        self.flush.enqueue(node)
    }

    fn enqueue_node(queue: &PhaseQueue<dyn LifecycleNode>, hook: u32, node: Rc<dyn LifecycleNode>) -> bool {
        if node.hooks() & hook == 0 {
            return false;
        }
        queue.enqueue(node)
    }

    pub fn enqueue_connect(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.connect, HOOK_CONNECT, node)
    }

    pub fn enqueue_patch(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.patch, HOOK_PATCH, node)
    }

    pub fn enqueue_bound(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.bound, HOOK_BOUND, node)
    }

    pub fn enqueue_mount(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.mount, HOOK_MOUNT, node)
    }

    pub fn enqueue_attached(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.attached, HOOK_ATTACHED, node)
    }

    pub fn enqueue_unmount(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.unmount, HOOK_UNMOUNT, node)
    }

    pub fn enqueue_detached(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.detached, HOOK_DETACHED, node)
    }

    pub fn enqueue_unbound(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.unbound, HOOK_UNBOUND, node)
    }

    pub fn enqueue_unbind_after_detach(&self, node: Rc<dyn LifecycleNode>) -> bool {
        Self::enqueue_node(&self.unbind_after_detach, HOOK_UNBIND_AFTER_DETACH, node)
    }

    /// Attach async work to the current batch. Done tasks are ignored.
    pub fn register_task(&self, task: Rc<dyn LifecycleTask>) {
        if task.is_done() {
            return;
        }
        let aggregate = self.task.borrow_mut().get_or_insert_with(AggregateTask::new).clone();
        aggregate.add_task(task);
    }

    // =========================================================================
    // STANDALONE QUEUES
    // =========================================================================

    /// Drain the flush queue until it stays empty.
    pub fn process_flush_queue(&self, flags: u32) {
        let flags = flags | FROM_SYNC_FLUSH;
        self.flush.drain(|node| node.flush(flags));
    }

    /// Drain the connect queue once; late arrivals wait for the next call.
    pub fn process_connect_queue(&self, flags: u32) {
        self.connect.drain_once(|node| node.connect(flags));
    }

    /// Flush pending changes, then patch until nothing is left.
    pub fn process_patch_queue(&self, flags: u32) {
        self.process_flush_queue(flags);
        self.patch.drain(|node| node.patch(flags));
    }

    /// Frame tick: publish everything pending in the flush queue.
    pub fn tick(&self) {
        self.process_flush_queue(FROM_TICK);
    }

    // =========================================================================
    // BATCHES
    // =========================================================================

    pub fn begin_bind(&self) {
        self.bind_depth.set(self.bind_depth.get() + 1);
    }

    pub fn end_bind(&self, flags: u32) -> Rc<dyn LifecycleTask> {
        if !Self::leave(&self.bind_depth) {
            return done_task();
        }
        self.finish_batch(flags, Self::process_bind_queues)
    }

    pub fn begin_unbind(&self) {
        self.unbind_depth.set(self.unbind_depth.get() + 1);
    }

    pub fn end_unbind(&self, flags: u32) -> Rc<dyn LifecycleTask> {
        if !Self::leave(&self.unbind_depth) {
            return done_task();
        }
        self.finish_batch(flags, Self::process_unbind_queues)
    }

    pub fn begin_attach(&self) {
        self.attach_depth.set(self.attach_depth.get() + 1);
    }

    pub fn end_attach(&self, flags: u32) -> Rc<dyn LifecycleTask> {
        if !Self::leave(&self.attach_depth) {
            return done_task();
        }
        self.finish_batch(flags, Self::process_attach_queues)
    }

    pub fn begin_detach(&self) {
        self.detach_depth.set(self.detach_depth.get() + 1);
    }

    pub fn end_detach(&self, flags: u32) -> Rc<dyn LifecycleTask> {
        if !Self::leave(&self.detach_depth) {
            return done_task();
        }
        self.finish_batch(flags, Self::process_detach_queues)
    }

    /// Decrement a depth counter. True when the outermost batch just closed.
    fn leave(depth: &Cell<u32>) -> bool {
        let current = depth.get();
        if current == 0 {
            tracing::warn!("lifecycle batch ended without a matching begin");
            return false;
        }
        depth.set(current - 1);
        current == 1
    }

    /// Drain the closed batch now, or once its registered work completes.
    ///
    /// A drain may start follow-up work of its own; the returned task covers
    /// both the registered work and that follow-up.
    fn finish_batch(
        &self,
        flags: u32,
        process: fn(&Lifecycle, u32) -> Option<Rc<dyn LifecycleTask>>,
    ) -> Rc<dyn LifecycleTask> {
        let pending = self.task.borrow_mut().take().filter(|task| !task.is_done());
        match pending {
            Some(task) => {
                tracing::trace!(tasks = task.len(), "batch waits for async work");
                let batch = AggregateTask::new();
                let lifecycle = self.self_weak.clone();
                let outer = batch.clone();
                // Registered before the batch watches `task`, so the follow-up
                // joins the batch before it can complete
                task.on_done(Box::new(move || {
                    let follow_up = lifecycle.upgrade().and_then(|lifecycle| process(&lifecycle, flags));
                    if let Some(follow_up) = follow_up {
                        outer.add_task(follow_up);
                    }
                }));
                batch.add_task(task);
                batch
            }
            None => match process(self, flags) {
                Some(follow_up) if !follow_up.is_done() => follow_up,
                _ => done_task(),
            },
        }
    }

    // =========================================================================
    // DRAIN ORDERS
    // =========================================================================

    fn process_bind_queues(&self, flags: u32) -> Option<Rc<dyn LifecycleTask>> {
        self.flush.drain(|node| node.flush(flags));
        self.connect.drain_once(|node| node.connect(flags));
        self.bound.drain(|node| node.bound(flags));
        None
    }

    fn process_unbind_queues(&self, flags: u32) -> Option<Rc<dyn LifecycleTask>> {
        self.unbound.drain(|node| node.unbound(flags));
        None
    }

    fn process_attach_queues(&self, flags: u32) -> Option<Rc<dyn LifecycleTask>> {
        self.flush.drain(|node| node.flush(flags));
        self.mount.drain(|node| node.mount(flags));
        self.connect.drain_once(|node| node.connect(flags));
        self.attached.drain(|node| node.attached(flags));
        None
    }

    /// The unbind that follows a detach belongs to the detach batch: its task
    /// is handed back so `end_detach` completes only after it.
    fn process_detach_queues(&self, flags: u32) -> Option<Rc<dyn LifecycleTask>> {
        let flush_flags = flags | DO_NOT_UPDATE_DOM;
        self.flush.drain(|node| node.flush(flush_flags));
        self.unmount.drain(|node| {
            node.unmount(flags);
        });
        self.detached.drain(|node| node.detached(flags));

        if self.unbind_after_detach.count() == 0 {
            return None;
        }
        // Work registered by whatever batch is open stays with that batch
        let open_batch_task = self.task.borrow_mut().take();
        self.begin_unbind();
        self.unbind_after_detach
            .drain(|node| node.unbind_after_detach(flags));
        let task = self.end_unbind(flags);
        // Inside an outer unbind batch the drain's work is still unclaimed
        let unclaimed = std::mem::replace(&mut *self.task.borrow_mut(), open_batch_task);
        if let Some(unclaimed) = unclaimed {
            self.register_task(unclaimed);
        }
        Some(task)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::task::{Deferred, PromiseTask};

    /// Records every callback it receives into a shared log.
    struct Recorder {
        name: &'static str,
        hooks: u32,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &'static str, hooks: u32, log: &Rc<RefCell<Vec<String>>>) -> Rc<Self> {
            Rc::new(Self {
                name,
                hooks,
                log: log.clone(),
            })
        }

        fn record(&self, phase: &str) {
            self.log.borrow_mut().push(format!("{}:{}", self.name, phase));
        }
    }

    impl Flushable for Recorder {
        fn flush(&self, _flags: u32) {
            self.record("flush");
        }
    }

    impl LifecycleNode for Recorder {
        fn hooks(&self) -> u32 {
            self.hooks
        }
        fn connect(&self, _flags: u32) {
            self.record("connect");
        }
        fn patch(&self, _flags: u32) {
            self.record("patch");
        }
        fn bound(&self, _flags: u32) {
            self.record("bound");
        }
        fn mount(&self, _flags: u32) {
            self.record("mount");
        }
        fn attached(&self, _flags: u32) {
            self.record("attached");
        }
        fn unmount(&self, _flags: u32) -> bool {
            self.record("unmount");
            false
        }
        fn detached(&self, _flags: u32) {
            self.record("detached");
        }
        fn unbound(&self, _flags: u32) {
            self.record("unbound");
        }
        fn unbind_after_detach(&self, _flags: u32) {
            self.record("unbind-after-detach");
        }
    }

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn nested_bind_drains_once_at_outermost_end() {
        let lifecycle = Lifecycle::new();
        let log = log();
        let recorder = Recorder::new("a", HOOK_BOUND, &log);

        lifecycle.begin_bind();
        lifecycle.begin_bind();
        lifecycle.enqueue_bound(recorder.clone());
        assert!(lifecycle.end_bind(FROM_BIND).is_done());
        assert!(log.borrow().is_empty());
        assert_eq!(lifecycle.pending(Queue::Bound), 1);

        assert!(lifecycle.end_bind(FROM_BIND).is_done());
        assert_eq!(*log.borrow(), vec!["a:bound"]);
        assert_eq!(lifecycle.pending(Queue::Bound), 0);
    }

    #[test]
    fn undeclared_hooks_are_not_enqueued() {
        let lifecycle = Lifecycle::new();
        let log = log();
        let recorder = Recorder::new("a", HOOK_BOUND, &log);
        assert!(!lifecycle.enqueue_attached(recorder.clone()));
        assert!(lifecycle.enqueue_bound(recorder.clone()));
        assert!(!lifecycle.enqueue_bound(recorder));
        assert_eq!(lifecycle.pending(Queue::Attached), 0);
        assert_eq!(lifecycle.pending(Queue::Bound), 1);
    }

    #[test]
    fn attach_drains_flush_mount_connect_attached() {
        let lifecycle = Lifecycle::new();
        let log = log();
        let recorder = Recorder::new("a", HOOK_ALL, &log);

        lifecycle.begin_attach();
        lifecycle.enqueue_attached(recorder.clone());
        lifecycle.enqueue_connect(recorder.clone());
        lifecycle.enqueue_mount(recorder.clone());
        lifecycle.enqueue_flush(recorder.clone());
        lifecycle.end_attach(FROM_ATTACH);

        assert_eq!(
            *log.borrow(),
            vec!["a:flush", "a:mount", "a:connect", "a:attached"]
        );
    }

    #[test]
    fn detach_runs_unbind_after_detach_last() {
        let lifecycle = Lifecycle::new();
        let log = log();
        let recorder = Recorder::new("a", HOOK_ALL, &log);

        lifecycle.begin_detach();
        lifecycle.enqueue_unbind_after_detach(recorder.clone());
        lifecycle.enqueue_detached(recorder.clone());
        lifecycle.enqueue_unmount(recorder.clone());
        lifecycle.end_detach(FROM_DETACH);

        assert_eq!(
            *log.borrow(),
            vec!["a:unmount", "a:detached", "a:unbind-after-detach"]
        );
        assert!(!lifecycle.is_unbinding());
    }

    #[test]
    fn detach_flush_carries_do_not_update_dom() {
        struct FlagRecorder(Cell<u32>);
        impl Flushable for FlagRecorder {
            fn flush(&self, flags: u32) {
                self.0.set(flags);
            }
        }

        let lifecycle = Lifecycle::new();
        let recorder = Rc::new(FlagRecorder(Cell::new(0)));
        lifecycle.begin_detach();
        lifecycle.enqueue_flush(recorder.clone());
        lifecycle.end_detach(FROM_DETACH);
        assert_ne!(recorder.0.get() & DO_NOT_UPDATE_DOM, 0);

        lifecycle.enqueue_flush(recorder.clone());
        lifecycle.process_flush_queue(NONE);
        assert_eq!(recorder.0.get(), FROM_SYNC_FLUSH);
    }

    #[test]
    fn registered_task_defers_drain() {
        let lifecycle = Lifecycle::new();
        let log = log();
        let recorder = Recorder::new("a", HOOK_BOUND, &log);
        let deferred = Deferred::<()>::new();

        lifecycle.begin_bind();
        lifecycle.enqueue_bound(recorder);
        lifecycle.register_task(PromiseTask::new(&deferred, |_| None));
        let task = lifecycle.end_bind(FROM_BIND);

        assert!(!task.is_done());
        assert!(log.borrow().is_empty());

        deferred.resolve(());
        assert!(task.is_done());
        assert_eq!(*log.borrow(), vec!["a:bound"]);
    }

    /// Unbinds asynchronously after detach, gated on a deferred.
    struct SlowUnbind {
        lifecycle: Weak<Lifecycle>,
        gate: Deferred<()>,
    }

    impl LifecycleNode for SlowUnbind {
        fn hooks(&self) -> u32 {
            HOOK_UNBIND_AFTER_DETACH
        }
        fn unbind_after_detach(&self, _flags: u32) {
            if let Some(lifecycle) = self.lifecycle.upgrade() {
                lifecycle.register_task(PromiseTask::new(&self.gate, |_| None));
            }
        }
    }

    #[test]
    fn detach_task_covers_unbind_after_detach() {
        let lifecycle = Lifecycle::new();
        let node = Rc::new(SlowUnbind {
            lifecycle: Rc::downgrade(&lifecycle),
            gate: Deferred::new(),
        });

        lifecycle.begin_detach();
        lifecycle.enqueue_unbind_after_detach(node.clone());
        let task = lifecycle.end_detach(FROM_DETACH);
        assert!(!task.is_done());

        // a later, unrelated batch does not inherit the pending unbind
        let log = log();
        let recorder = Recorder::new("b", HOOK_BOUND, &log);
        lifecycle.begin_bind();
        lifecycle.enqueue_bound(recorder);
        assert!(lifecycle.end_bind(FROM_BIND).is_done());
        assert_eq!(*log.borrow(), vec!["b:bound"]);

        node.gate.resolve(());
        assert!(task.is_done());
    }

    #[test]
    fn deferred_detach_waits_for_its_unbind_too() {
        let lifecycle = Lifecycle::new();
        let node = Rc::new(SlowUnbind {
            lifecycle: Rc::downgrade(&lifecycle),
            gate: Deferred::new(),
        });
        let registered = Deferred::<()>::new();

        lifecycle.begin_detach();
        lifecycle.enqueue_unbind_after_detach(node.clone());
        lifecycle.register_task(PromiseTask::new(&registered, |_| None));
        let task = lifecycle.end_detach(FROM_DETACH);
        assert_eq!(lifecycle.pending(Queue::UnbindAfterDetach), 1);

        registered.resolve(());
        assert_eq!(lifecycle.pending(Queue::UnbindAfterDetach), 0);
        assert!(!task.is_done());

        node.gate.resolve(());
        assert!(task.is_done());
    }

    #[test]
    fn patch_queue_flushes_first() {
        let lifecycle = Lifecycle::new();
        let log = log();
        let recorder = Recorder::new("a", HOOK_PATCH, &log);
        lifecycle.enqueue_patch(recorder.clone());
        lifecycle.enqueue_flush(recorder);
        lifecycle.process_patch_queue(NONE);
        assert_eq!(*log.borrow(), vec!["a:flush", "a:patch"]);
    }

    #[test]
    fn unbalanced_end_is_ignored() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.end_unbind(NONE).is_done());
        assert!(!lifecycle.is_unbinding());
    }
}
