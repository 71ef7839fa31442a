//! A bounded thread pool with lazy worker growth.
//!
//! A [`ThreadPool`] dispatches [`Task`]s to worker threads in FIFO order.
//! Workers are not created up front: a new one is spawned, up to the pool's
//! limit, only when a task arrives and every existing worker is busy. Each
//! task carries its own result slot and condition, so callers [`join`]
//! individual tasks rather than the pool; a finished task can be pushed
//! again.
//!
//! One mutex guards all pool state; each task has its own mutex for its
//! result and the transition to `Done`. The pool lock is never held while
//! running user code, and the task lock is never held while acquiring the
//! pool lock.
//!
//! [`join`]: Task::join

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

/// Most workers a pool may ever be asked to create.
pub const MAX_THREADS: usize = 20;

/// Most tasks that may be queued (not yet running) at once.
pub const MAX_TASKS: usize = 100_000;

/// Error codes of the pool and task APIs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// A parameter was out of range, or the pool is shutting down.
    #[error("invalid argument")]
    InvalidArgument,
    /// The queue already holds [`MAX_TASKS`] tasks.
    #[error("too many queued tasks")]
    TooManyTasks,
    /// The task is currently queued or running.
    #[error("task is in a pool")]
    TaskInPool,
    /// The task was never pushed to a pool.
    #[error("task was not pushed")]
    TaskNotPushed,
    /// The pool still has queued or running tasks.
    #[error("pool has unfinished tasks")]
    HasTasks,
    /// The operation is a stub.
    #[error("not implemented")]
    NotImplemented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    New,
    Queued,
    Running,
    Done,
}

struct TaskInner<R> {
    state: TaskState,
    result: Option<R>,
    bound: bool,
}

/// A unit of work: a rerunnable closure plus a result slot.
///
/// Tasks are `Arc`-shared between the caller and the pool. The state
/// machine is `New -> Queued -> Running -> Done`, and a `Done` task may be
/// pushed again, which re-runs the closure and replaces the result.
///
/// ```
/// use userland::{Task, ThreadPool};
///
/// let mut pool = ThreadPool::new(2).unwrap();
/// let task = Task::new(|| "done");
/// pool.push(&task).unwrap();
/// assert_eq!(task.join().unwrap(), "done");
/// pool.wait_idle();
/// pool.shutdown().unwrap();
/// ```
pub struct Task<R> {
    func: Mutex<Box<dyn FnMut() -> R + Send>>,
    inner: Mutex<TaskInner<R>>,
    done: Condvar,
}

impl<R: Send + 'static> Task<R> {
    /// Creates a task in the `New` state. It does nothing until pushed.
    pub fn new(func: impl FnMut() -> R + Send + 'static) -> Arc<Task<R>> {
        Arc::new(Task {
            func: Mutex::new(Box::new(func)),
            inner: Mutex::new(TaskInner {
                state: TaskState::New,
                result: None,
                bound: false,
            }),
            done: Condvar::new(),
        })
    }

    /// Racy observation: true if the task has finished its latest run.
    pub fn is_finished(&self) -> bool {
        self.inner.lock().unwrap().state == TaskState::Done
    }

    /// Racy observation: true if a worker is running the task right now.
    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().state == TaskState::Running
    }

    /// Blocks until the task is `Done` and returns its result.
    ///
    /// Fails with [`PoolError::TaskNotPushed`] if the task was never
    /// pushed. The result stays in the task, so `join` can be called
    /// again and the task can still be re-pushed or deleted.
    pub fn join(&self) -> Result<R, PoolError>
    where
        R: Clone,
    {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == TaskState::New || !inner.bound {
            return Err(PoolError::TaskNotPushed);
        }
        while inner.state != TaskState::Done {
            inner = self.done.wait(inner).unwrap();
        }
        Ok(inner.result.clone().expect("done task has a result"))
    }

    /// Stub.
    // TODO: wire this to Condvar::wait_timeout; PoolError needs a timeout
    // variant first.
    pub fn timed_join(&self, _timeout: Duration) -> Result<R, PoolError>
    where
        R: Clone,
    {
        Err(PoolError::NotImplemented)
    }

    /// Stub.
    pub fn detach(&self) -> Result<(), PoolError> {
        Err(PoolError::NotImplemented)
    }

    /// Consumes the caller's handle, refusing while the task is queued or
    /// running.
    pub fn delete(task: Arc<Task<R>>) -> Result<(), PoolError> {
        let inner = task.inner.lock().unwrap();
        if matches!(inner.state, TaskState::Queued | TaskState::Running) {
            return Err(PoolError::TaskInPool);
        }
        Ok(())
    }
}

/// Type-erased view of a task, which is what the queue holds.
trait Runnable: Send + Sync {
    fn run(&self);
}

impl<R: Send + 'static> Runnable for Task<R> {
    fn run(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = TaskState::Running;
        }
        let result = {
            let mut func = self.func.lock().unwrap();
            (*func)()
        };
        let mut inner = self.inner.lock().unwrap();
        inner.result = Some(result);
        inner.state = TaskState::Done;
        self.done.notify_all();
    }
}

struct State {
    queue: VecDeque<Arc<dyn Runnable>>,
    handles: Vec<JoinHandle<()>>,
    max_threads: usize,
    created: usize,
    busy: usize,
    shutting_down: bool,
}

struct Shared {
    state: Mutex<State>,
    task_available: Condvar,
    all_idle: Condvar,
}

/// A fixed-capacity pool of lazily created worker threads.
pub struct ThreadPool {
    shared: Arc<Shared>,
}

impl ThreadPool {
    /// Creates a pool that will grow to at most `max_threads` workers.
    ///
    /// No worker is spawned yet; fails with
    /// [`PoolError::InvalidArgument`] unless `1 <= max_threads <=`
    /// [`MAX_THREADS`].
    pub fn new(max_threads: usize) -> Result<ThreadPool, PoolError> {
        if max_threads == 0 || max_threads > MAX_THREADS {
            return Err(PoolError::InvalidArgument);
        }
        Ok(ThreadPool {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    handles: Vec::new(),
                    max_threads,
                    created: 0,
                    busy: 0,
                    shutting_down: false,
                }),
                task_available: Condvar::new(),
                all_idle: Condvar::new(),
            }),
        })
    }

    /// Number of workers created so far.
    pub fn thread_count(&self) -> usize {
        self.shared.state.lock().unwrap().created
    }

    /// Appends a task to the queue.
    ///
    /// The task must be `New` or `Done`; pushing a queued or running task
    /// fails with [`PoolError::TaskInPool`], and a `Done` task is simply
    /// run again. If every existing worker is busy and the pool is below
    /// its limit, one new worker is spawned to pick the task up.
    pub fn push<R: Send + 'static>(&self, task: &Arc<Task<R>>) -> Result<(), PoolError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.shutting_down {
            return Err(PoolError::InvalidArgument);
        }
        if state.queue.len() >= MAX_TASKS {
            return Err(PoolError::TooManyTasks);
        }
        {
            let mut inner = task.inner.lock().unwrap();
            if !matches!(inner.state, TaskState::New | TaskState::Done) {
                return Err(PoolError::TaskInPool);
            }
            inner.state = TaskState::Queued;
            inner.result = None;
            inner.bound = true;
        }
        state.queue.push_back(Arc::clone(task) as Arc<dyn Runnable>);

        // Lazy growth, decided under the pool lock so two pushes cannot
        // both spawn for the same vacancy.
        if state.created < state.max_threads && state.busy == state.created {
            let shared = Arc::clone(&self.shared);
            if let Ok(handle) = thread::Builder::new().spawn(move || worker_loop(shared)) {
                state.handles.push(handle);
                state.created += 1;
            }
        }

        self.shared.task_available.notify_one();
        Ok(())
    }

    /// Blocks until the pool is quiescent: nothing queued, nobody busy.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while !state.queue.is_empty() || state.busy > 0 {
            state = self.shared.all_idle.wait(state).unwrap();
        }
    }

    /// Shuts the pool down, joining every worker.
    ///
    /// Refuses with [`PoolError::HasTasks`] while any task is queued or
    /// running. After a successful shutdown the pool accepts no more
    /// pushes.
    pub fn shutdown(&mut self) -> Result<(), PoolError> {
        let handles = {
            let mut state = self.shared.state.lock().unwrap();
            if !state.queue.is_empty() || state.busy > 0 {
                return Err(PoolError::HasTasks);
            }
            state.shutting_down = true;
            std::mem::take(&mut state.handles)
        };
        self.shared.task_available.notify_all();
        for handle in handles {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for ThreadPool {
    /// Unlike [`shutdown`], drop cannot refuse: it stops the workers
    /// regardless. A running task finishes first; tasks still queued
    /// never run and stay `Queued`.
    ///
    /// [`shutdown`]: ThreadPool::shutdown
    fn drop(&mut self) {
        let handles = {
            let mut state = self.shared.state.lock().unwrap();
            state.shutting_down = true;
            std::mem::take(&mut state.handles)
        };
        self.shared.task_available.notify_all();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let mut state = shared.state.lock().unwrap();
    loop {
        while !state.shutting_down && state.queue.is_empty() {
            state = shared.task_available.wait(state).unwrap();
        }
        if state.shutting_down {
            state.created -= 1;
            return;
        }
        let task = state.queue.pop_front().expect("queue checked non-empty");
        state.busy += 1;
        drop(state);

        // User code runs without the pool lock.
        task.run();

        state = shared.state.lock().unwrap();
        state.busy -= 1;
        if state.queue.is_empty() && state.busy == 0 {
            shared.all_idle.notify_all();
        }
    }
}
