//! The shell executor.
//!
//! [`Parser`] turns bytes read from standard input into [`CommandLine`]
//! values; [`execute_command_line`] runs one command line as a sequence of
//! pipeline segments joined by `&&`/`||`, forking one child per external
//! command. [`PidRegistry`] tracks children that have not been reaped yet,
//! which is how background pipelines survive across command lines.
//!
//! The driver loop lives in the `ush` binary; everything here is callable
//! from library clients and from tests.

mod exec;
mod parser;
mod registry;

pub use self::exec::{Outcome, execute_command_line};
pub use self::parser::{Command, CommandLine, Expr, Output, ParseError, Parser};
pub use self::registry::PidRegistry;
