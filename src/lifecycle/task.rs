// ============================================================================
// spark-observe - Lifecycle Tasks
// Completion tokens for batches that may finish asynchronously
// ============================================================================
//
// A lifecycle task is a cooperative completion token. Done tasks are shared
// singletons in spirit; aggregates finish when every child has finished;
// promise tasks wrap a `Deferred` and run one continuation on settlement.
// Cancellation is best-effort and never flips `done` synchronously.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

// =============================================================================
// TASK CONTRACT
// =============================================================================

/// A unit of lifecycle work that may complete later.
pub trait LifecycleTask {
    fn is_done(&self) -> bool;

    /// Whether `cancel` would currently have any effect.
    fn can_cancel(&self) -> bool;

    /// Request cancellation. Does not mark the task done.
    fn cancel(&self);

    /// Future that resolves once the task is done.
    fn wait(&self) -> TaskWait;

    /// Run `callback` when the task completes, or right away if it already has.
    fn on_done(&self, callback: Box<dyn FnOnce()>);
}

// =============================================================================
// COMPLETION
// =============================================================================

/// Shared done-flag with callbacks and wakers.
#[derive(Default)]
struct Completion {
    done: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
    wakers: RefCell<Vec<Waker>>,
}

impl Completion {
    fn new(done: bool) -> Rc<Self> {
        let completion = Rc::new(Self::default());
        completion.done.set(done);
        completion
    }

    fn is_done(&self) -> bool {
        self.done.get()
    }

    fn reopen(&self) {
        self.done.set(false);
    }

    fn complete(&self) {
        if self.done.replace(true) {
            return;
        }
        // Collect first, then notify
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        let wakers = std::mem::take(&mut *self.wakers.borrow_mut());
        for callback in callbacks {
            callback();
        }
        for waker in wakers {
            waker.wake();
        }
    }

    fn on_done(&self, callback: Box<dyn FnOnce()>) {
        if self.done.get() {
            callback();
        } else {
            self.callbacks.borrow_mut().push(callback);
        }
    }
}

/// Future returned by [`LifecycleTask::wait`].
pub struct TaskWait {
    completion: Rc<Completion>,
}

impl Future for TaskWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.completion.is_done() {
            return Poll::Ready(());
        }
        let mut wakers = self.completion.wakers.borrow_mut();
        if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
            wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

// =============================================================================
// DONE TASK
// =============================================================================

/// A task that is already complete.
pub struct DoneTask {
    completion: Rc<Completion>,
}

impl LifecycleTask for DoneTask {
    fn is_done(&self) -> bool {
        true
    }

    fn can_cancel(&self) -> bool {
        false
    }

    fn cancel(&self) {}

    fn wait(&self) -> TaskWait {
        TaskWait {
            completion: self.completion.clone(),
        }
    }

    fn on_done(&self, callback: Box<dyn FnOnce()>) {
        callback();
    }
}

/// The already-completed task.
pub fn done_task() -> Rc<dyn LifecycleTask> {
    Rc::new(DoneTask {
        completion: Completion::new(true),
    })
}

// =============================================================================
// AGGREGATE TASK
// =============================================================================

/// Composes child tasks; done once every child is done.
pub struct AggregateTask {
    self_weak: Weak<AggregateTask>,
    tasks: RefCell<Vec<Rc<dyn LifecycleTask>>>,
    completion: Rc<Completion>,
}

impl AggregateTask {
    /// An empty aggregate, which counts as done until a pending child joins.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            self_weak: self_weak.clone(),
            tasks: RefCell::new(Vec::new()),
            completion: Completion::new(true),
        })
    }

    /// Add a child. Children that are already done are ignored.
    pub fn add_task(&self, task: Rc<dyn LifecycleTask>) {
        if task.is_done() {
            return;
        }
        self.tasks.borrow_mut().push(task.clone());
        self.completion.reopen();
        // Pending children keep the aggregate alive until they finish
        let this = self.self_weak.upgrade();
        task.on_done(Box::new(move || {
            if let Some(aggregate) = this {
                aggregate.check_done();
            }
        }));
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    fn check_done(&self) {
        let all_done = self.tasks.borrow().iter().all(|t| t.is_done());
        if all_done {
            self.completion.complete();
        }
    }
}

impl LifecycleTask for AggregateTask {
    fn is_done(&self) -> bool {
        self.completion.is_done()
    }

    fn can_cancel(&self) -> bool {
        if self.is_done() {
            return false;
        }
        self.tasks.borrow().iter().all(|t| t.can_cancel())
    }

    fn cancel(&self) {
        if !self.can_cancel() {
            return;
        }
        let tasks = self.tasks.borrow().clone();
        for task in tasks {
            task.cancel();
        }
    }

    fn wait(&self) -> TaskWait {
        TaskWait {
            completion: self.completion.clone(),
        }
    }

    fn on_done(&self, callback: Box<dyn FnOnce()>) {
        self.completion.on_done(callback);
    }
}

impl fmt::Debug for AggregateTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateTask")
            .field("tasks", &self.len())
            .field("done", &self.is_done())
            .finish()
    }
}

// =============================================================================
// DEFERRED
// =============================================================================

struct DeferredInner<T> {
    value: RefCell<Option<T>>,
    callbacks: RefCell<Vec<Box<dyn FnOnce(T)>>>,
    wakers: RefCell<Vec<Waker>>,
}

/// A single-threaded awaitable that settles once with a value.
pub struct Deferred<T> {
    inner: Rc<DeferredInner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DeferredInner {
                value: RefCell::new(None),
                callbacks: RefCell::new(Vec::new()),
                wakers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// An already-settled deferred.
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    pub fn is_settled(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    pub fn value(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Settle with `value`. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        if self.is_settled() {
            return false;
        }
        *self.inner.value.borrow_mut() = Some(value.clone());
        let callbacks = std::mem::take(&mut *self.inner.callbacks.borrow_mut());
        let wakers = std::mem::take(&mut *self.inner.wakers.borrow_mut());
        for callback in callbacks {
            callback(value.clone());
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Run `callback` on settlement, or immediately if already settled.
    pub fn then(&self, callback: impl FnOnce(T) + 'static) {
        let settled = self.value();
        match settled {
            Some(value) => callback(value),
            None => self.inner.callbacks.borrow_mut().push(Box::new(callback)),
        }
    }

    /// Future resolving to the settled value.
    pub fn settled(&self) -> DeferredWait<T> {
        DeferredWait {
            deferred: self.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Deferred::settled`].
pub struct DeferredWait<T> {
    deferred: Deferred<T>,
}

impl<T: Clone + 'static> Future for DeferredWait<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if let Some(value) = self.deferred.value() {
            return Poll::Ready(value);
        }
        self.deferred.inner.wakers.borrow_mut().push(cx.waker().clone());
        Poll::Pending
    }
}

// =============================================================================
// PROMISE TASK
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PromiseState {
    Waiting,
    Running,
    Cancelled,
    Finished,
}

/// Runs a continuation once a [`Deferred`] settles, unless cancelled first.
///
/// The continuation may hand back a follow-up task; the promise task completes
/// when that follow-up does.
pub struct PromiseTask {
    state: Cell<PromiseState>,
    completion: Rc<Completion>,
}

impl PromiseTask {
    pub fn new<T, F>(deferred: &Deferred<T>, next: F) -> Rc<Self>
    where
        T: Clone + 'static,
        F: FnOnce(T) -> Option<Rc<dyn LifecycleTask>> + 'static,
    {
        let task = Rc::new(Self {
            state: Cell::new(PromiseState::Waiting),
            completion: Completion::new(false),
        });
        let this = task.clone();
        deferred.then(move |value| this.settle(value, next));
        task
    }

    fn settle<T>(&self, value: T, next: impl FnOnce(T) -> Option<Rc<dyn LifecycleTask>>) {
        if self.state.get() == PromiseState::Cancelled {
            self.completion.complete();
            return;
        }
        self.state.set(PromiseState::Running);
        match next(value) {
            Some(follow_up) if !follow_up.is_done() => {
                let completion = self.completion.clone();
                follow_up.on_done(Box::new(move || completion.complete()));
            }
            _ => {
                self.state.set(PromiseState::Finished);
                self.completion.complete();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.get() == PromiseState::Cancelled
    }
}

impl LifecycleTask for PromiseTask {
    fn is_done(&self) -> bool {
        self.completion.is_done()
    }

    fn can_cancel(&self) -> bool {
        self.state.get() == PromiseState::Waiting
    }

    fn cancel(&self) {
        if self.can_cancel() {
            self.state.set(PromiseState::Cancelled);
        }
    }

    fn wait(&self) -> TaskWait {
        TaskWait {
            completion: self.completion.clone(),
        }
    }

    fn on_done(&self, callback: Box<dyn FnOnce()>) {
        self.completion.on_done(callback);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures_task::noop_waker_ref;

    fn poll_once<F: Future>(future: &mut F) -> Poll<F::Output>
    where
        F: Unpin,
    {
        let mut cx = Context::from_waker(noop_waker_ref());
        Pin::new(future).poll(&mut cx)
    }

    #[test]
    fn done_task_is_done() {
        let task = done_task();
        assert!(task.is_done());
        assert!(!task.can_cancel());
        pollster::block_on(task.wait());

        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        task.on_done(Box::new(move || flag.set(true)));
        assert!(ran.get());
    }

    #[test]
    fn aggregate_completes_after_all_children() {
        let a = Deferred::<u32>::new();
        let b = Deferred::<u32>::new();
        let task_a = PromiseTask::new(&a, |_| None);
        let task_b = PromiseTask::new(&b, |_| None);

        let aggregate = AggregateTask::new();
        assert!(aggregate.is_done());
        aggregate.add_task(task_a);
        aggregate.add_task(task_b);
        aggregate.add_task(done_task());
        assert_eq!(aggregate.len(), 2);
        assert!(!aggregate.is_done());

        let mut wait = aggregate.wait();
        assert_eq!(poll_once(&mut wait), Poll::Pending);

        a.resolve(1);
        assert!(!aggregate.is_done());
        b.resolve(2);
        assert!(aggregate.is_done());
        assert_eq!(poll_once(&mut wait), Poll::Ready(()));
    }

    #[test]
    fn aggregate_cancel_needs_every_child() {
        let a = Deferred::<u32>::new();
        let b = Deferred::<u32>::new();
        let task_a = PromiseTask::new(&a, |_| None);
        let follow_up = Deferred::<u32>::new();
        let inner = follow_up.clone();
        let task_b = PromiseTask::new(&b, move |_| {
            Some(PromiseTask::new(&inner, |_| None) as Rc<dyn LifecycleTask>)
        });

        let aggregate = AggregateTask::new();
        aggregate.add_task(task_a.clone());
        aggregate.add_task(task_b.clone());
        assert!(aggregate.can_cancel());

        // b has started its continuation and can no longer be cancelled
        b.resolve(0);
        assert!(!task_b.can_cancel());
        assert!(!aggregate.can_cancel());
        aggregate.cancel();
        assert!(!task_a.is_cancelled());

        follow_up.resolve(0);
        assert!(task_b.is_done());
        a.resolve(0);
        assert!(aggregate.is_done());
    }

    #[test]
    fn cancelled_promise_skips_continuation() {
        let deferred = Deferred::<u32>::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let task = PromiseTask::new(&deferred, move |_| {
            flag.set(true);
            None
        });

        task.cancel();
        assert!(task.is_cancelled());
        assert!(!task.is_done());

        deferred.resolve(7);
        assert!(!ran.get());
        assert!(task.is_done());
    }

    #[test]
    fn cancel_after_settlement_is_noop() {
        let deferred = Deferred::resolved(3u32);
        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();
        let task = PromiseTask::new(&deferred, move |v| {
            sink.set(v);
            None
        });
        assert_eq!(seen.get(), 3);
        assert!(!task.can_cancel());
        task.cancel();
        assert!(!task.is_cancelled());
        assert!(task.is_done());
    }

    #[test]
    fn deferred_settles_once() {
        let deferred = Deferred::<&'static str>::new();
        let mut settled = deferred.settled();
        assert_eq!(poll_once(&mut settled), Poll::Pending);
        assert!(deferred.resolve("first"));
        assert!(!deferred.resolve("second"));
        assert_eq!(poll_once(&mut settled), Poll::Ready("first"));
        assert_eq!(pollster::block_on(deferred.settled()), "first");
    }
}
