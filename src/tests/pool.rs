use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::pool::{MAX_TASKS, MAX_THREADS, PoolError, Task, ThreadPool};

fn wait_until(what: impl Fn() -> bool) {
    for _ in 0..500 {
        if what() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached within 5s");
}

#[test]
fn pool_size_is_validated() {
    assert_eq!(ThreadPool::new(0).err(), Some(PoolError::InvalidArgument));
    assert_eq!(
        ThreadPool::new(MAX_THREADS + 1).err(),
        Some(PoolError::InvalidArgument)
    );
    assert!(ThreadPool::new(MAX_THREADS).is_ok());
}

#[test]
fn no_workers_until_first_push() {
    let mut pool = ThreadPool::new(3).unwrap();
    assert_eq!(pool.thread_count(), 0);
    let task = Task::new(|| 1);
    pool.push(&task).unwrap();
    assert_eq!(pool.thread_count(), 1);
    assert_eq!(task.join().unwrap(), 1);
    pool.wait_idle();
    pool.shutdown().unwrap();
}

#[test]
fn push_then_join_returns_the_result() {
    let mut pool = ThreadPool::new(2).unwrap();
    let task = Task::new(|| 6 * 7);
    pool.push(&task).unwrap();
    assert_eq!(task.join().unwrap(), 42);
    assert!(task.is_finished());
    pool.wait_idle();
    pool.shutdown().unwrap();
}

#[test]
fn join_before_push_fails() {
    let task = Task::new(|| 0);
    assert_eq!(task.join(), Err(PoolError::TaskNotPushed));
}

#[test]
fn workers_grow_lazily_up_to_the_limit() {
    let mut pool = ThreadPool::new(2).unwrap();
    let tasks: Vec<_> = (0..5)
        .map(|i| {
            Task::new(move || {
                thread::sleep(Duration::from_millis(200));
                i
            })
        })
        .collect();

    pool.push(&tasks[0]).unwrap();
    wait_until(|| tasks[0].is_running());
    pool.push(&tasks[1]).unwrap();
    wait_until(|| tasks[1].is_running());
    for task in &tasks[2..] {
        pool.push(task).unwrap();
    }
    // both workers exist, and the limit holds despite three queued tasks
    assert_eq!(pool.thread_count(), 2);

    for (i, task) in tasks.iter().enumerate() {
        assert_eq!(task.join().unwrap(), i);
    }
    assert_eq!(pool.thread_count(), 2);
    pool.wait_idle();
    pool.shutdown().unwrap();
}

#[test]
fn done_task_can_be_pushed_again() {
    let mut pool = ThreadPool::new(1).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = Task::new(move || counter.fetch_add(1, Ordering::SeqCst) + 1);

    pool.push(&task).unwrap();
    assert_eq!(task.join().unwrap(), 1);
    pool.push(&task).unwrap();
    assert_eq!(task.join().unwrap(), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    pool.wait_idle();
    pool.shutdown().unwrap();
}

#[test]
fn live_task_cannot_be_pushed_deleted_or_outwaited() {
    let mut pool = ThreadPool::new(1).unwrap();
    let (release, gate) = mpsc::channel::<()>();
    let running = Task::new(move || {
        gate.recv().unwrap();
        "ran"
    });
    let queued = Task::new(|| "queued");

    pool.push(&running).unwrap();
    wait_until(|| running.is_running());
    pool.push(&queued).unwrap();

    assert_eq!(pool.push(&running), Err(PoolError::TaskInPool));
    assert_eq!(pool.push(&queued), Err(PoolError::TaskInPool));
    assert_eq!(
        Task::delete(Arc::clone(&queued)),
        Err(PoolError::TaskInPool)
    );
    assert_eq!(pool.shutdown(), Err(PoolError::HasTasks));

    release.send(()).unwrap();
    assert_eq!(running.join().unwrap(), "ran");
    assert_eq!(queued.join().unwrap(), "queued");

    pool.wait_idle();
    pool.shutdown().unwrap();
    Task::delete(running).unwrap();
    Task::delete(queued).unwrap();
}

#[test]
fn queue_capacity_is_bounded() {
    let mut pool = ThreadPool::new(1).unwrap();
    let (release, gate) = mpsc::channel::<()>();
    let blocker = Task::new(move || {
        gate.recv().unwrap();
        0usize
    });
    pool.push(&blocker).unwrap();
    wait_until(|| blocker.is_running());

    let filler: Vec<_> = (0..MAX_TASKS).map(|i| Task::new(move || i)).collect();
    for task in &filler {
        pool.push(task).unwrap();
    }
    let one_too_many = Task::new(|| 0usize);
    assert_eq!(pool.push(&one_too_many), Err(PoolError::TooManyTasks));

    release.send(()).unwrap();
    pool.wait_idle();
    pool.shutdown().unwrap();
}

#[test]
fn push_after_shutdown_is_refused() {
    let mut pool = ThreadPool::new(1).unwrap();
    pool.shutdown().unwrap();
    let task = Task::new(|| 0);
    assert_eq!(pool.push(&task), Err(PoolError::InvalidArgument));
}

#[test]
fn optional_operations_are_stubs() {
    let task = Task::new(|| 0);
    assert_eq!(
        task.timed_join(Duration::from_millis(1)),
        Err(PoolError::NotImplemented)
    );
    assert_eq!(task.detach(), Err(PoolError::NotImplemented));
}

#[test]
fn delete_of_new_and_done_tasks_succeeds() {
    let fresh = Task::new(|| 0);
    Task::delete(fresh).unwrap();

    let mut pool = ThreadPool::new(1).unwrap();
    let task = Task::new(|| 0);
    pool.push(&task).unwrap();
    task.join().unwrap();
    pool.wait_idle();
    Task::delete(task).unwrap();
    pool.shutdown().unwrap();
}
