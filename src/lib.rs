//! A toy Unix userland in three parts.
//!
//! This crate bundles three small systems components that share nothing but
//! a taste for explicit resource management:
//!
//! * [`shell`] — a command-line executor. An incremental [`Parser`] turns
//!   raw bytes into command lines; [`execute_command_line`] runs them as
//!   pipelines of forked children with redirection, `&&`/`||` sequencing,
//!   and `&` backgrounding. The `ush` binary wraps it in a stdin read loop.
//!
//! * [`userfs`] — an in-memory filesystem. A [`UserFs`] context owns named
//!   files made of fixed-size blocks and hands out integer descriptors with
//!   per-descriptor cursors and access modes. Files can be unlinked while
//!   still open; the storage lives until the last descriptor goes away.
//!
//! * [`pool`] — a bounded thread pool. Workers are spawned lazily, tasks
//!   are dispatched FIFO, and every task can be joined synchronously for
//!   its result.
//!
//! # Examples
//!
//! Write to the user filesystem and read it back:
//!
//! ```
//! use userland::{OpenFlags, UserFs};
//!
//! let mut fs = UserFs::new();
//! let fd = fs.open("notes", OpenFlags::CREATE).unwrap();
//! fs.write(fd, b"hello").unwrap();
//! fs.close(fd).unwrap();
//!
//! let fd = fs.open("notes", OpenFlags::READ_ONLY).unwrap();
//! let mut buf = [0u8; 16];
//! assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
//! assert_eq!(&buf[..5], b"hello");
//! ```
//!
//! Run a task on the pool and join it:
//!
//! ```
//! use userland::{Task, ThreadPool};
//!
//! let mut pool = ThreadPool::new(4).unwrap();
//! let task = Task::new(|| 6 * 7);
//! pool.push(&task).unwrap();
//! assert_eq!(task.join().unwrap(), 42);
//! pool.wait_idle();
//! pool.shutdown().unwrap();
//! ```

#![warn(missing_docs)]

#[cfg(unix)]
mod posix;

#[cfg(unix)]
pub mod shell;

pub mod pool;
pub mod userfs;

#[cfg(unix)]
pub use self::posix::ExitStatus;
#[cfg(unix)]
pub use self::shell::{
    Command, CommandLine, Expr, Outcome, Output, ParseError, Parser, PidRegistry,
    execute_command_line,
};

pub use self::pool::{PoolError, Task, ThreadPool};
pub use self::userfs::{FsError, OpenFlags, UserFs};
