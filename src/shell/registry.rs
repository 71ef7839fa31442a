use crate::posix::{self, ExitStatus};

const FLOOR: usize = 10;
const GROW_FACTOR: usize = 2;

/// An ordered list of child PIDs the shell has forked and not yet reaped.
///
/// The registry owns no processes; it only remembers who to `waitpid` for.
/// Backing storage starts at a small floor, doubles when full, and halves
/// when fewer than half the slots are in use while more than the floor's
/// worth of children remain.
///
/// A foreground pipeline uses one registry for the duration of a segment;
/// the driver keeps a long-lived one for background children.
#[derive(Debug, Default)]
pub struct PidRegistry {
    pids: Vec<u32>,
}

impl PidRegistry {
    /// Creates an empty registry with the floor capacity.
    pub fn new() -> PidRegistry {
        PidRegistry {
            pids: Vec::with_capacity(FLOOR),
        }
    }

    /// Number of registered children.
    pub fn len(&self) -> usize {
        self.pids.len()
    }

    /// True if no children are registered.
    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// Current backing capacity. Exposed so the grow/shrink policy is
    /// observable.
    pub fn capacity(&self) -> usize {
        self.pids.capacity()
    }

    /// Registers a forked child.
    pub fn push(&mut self, pid: u32) {
        if self.pids.len() == self.pids.capacity() {
            self.pids.reserve_exact(self.pids.capacity());
        }
        self.pids.push(pid);
    }

    fn shrink_if_sparse(&mut self) {
        let cap = self.pids.capacity();
        if self.pids.len() * GROW_FACTOR < cap && self.pids.len() > FLOOR {
            self.pids.shrink_to(cap / GROW_FACTOR);
        }
    }

    /// Non-blocking sweep: removes every child that has already terminated.
    ///
    /// Children that are still running stay registered, in order; so does
    /// any entry `waitpid` reports an error for.
    pub fn reap_finished(&mut self) {
        let mut index = 0;
        while index < self.pids.len() {
            match posix::waitpid(self.pids[index], posix::WNOHANG) {
                Ok((0, _)) | Err(_) => index += 1,
                Ok((pid, status)) => {
                    tracing::debug!(pid, ?status, "reaped background child");
                    self.pids.remove(index);
                }
            }
        }
        self.shrink_if_sparse();
    }

    /// Blocking reap of every registered child, in registration order.
    ///
    /// Returns the exit status of the last child that exited normally, or
    /// zero if none did. The registry is empty afterwards.
    pub fn wait_all(&mut self) -> i32 {
        let mut code = 0;
        for &pid in &self.pids {
            if let Ok((_, status)) = posix::waitpid(pid, 0) {
                tracing::trace!(pid, ?status, "reaped pipeline child");
                if let ExitStatus::Exited(c) = status {
                    code = c as i32;
                }
            }
        }
        self.pids.clear();
        self.shrink_if_sparse();
        code
    }

    /// Hands the registered PIDs over to the caller, emptying the registry.
    pub fn into_pids(self) -> Vec<u32> {
        self.pids
    }
}
