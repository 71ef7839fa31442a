use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;

use crate::posix;
use crate::shell::parser::{Command, CommandLine, Expr, Output};
use crate::shell::registry::PidRegistry;

/// Result of executing a command line (or one pipeline segment of it).
#[derive(Debug, Default)]
pub struct Outcome {
    /// True if an `exit` builtin asked the shell to terminate.
    pub need_exit: bool,
    /// Exit code of the last pipeline that ran in the foreground, or the
    /// argument of `exit`.
    pub code: i32,
    /// Children of a background pipeline, not yet reaped. The caller takes
    /// ownership and reaps them later.
    pub background: Vec<u32>,
}

impl Outcome {
    fn with_code(code: i32) -> Outcome {
        Outcome {
            code,
            ..Outcome::default()
        }
    }
}

/// Executes one parsed command line and returns its outcome.
///
/// The line is split into pipeline segments at `&&`/`||` boundaries and the
/// segments run left to right: after each one, the next segment runs only
/// if the operator agrees with the code so far (`&&` wants zero, `||` wants
/// non-zero); otherwise it is skipped and the code carries over. Only the
/// final segment honors the line's output redirection and `&`; interior
/// segments always write to stdout and are always waited for.
pub fn execute_command_line(line: &CommandLine) -> Outcome {
    let (cmds, mut op_index) = collect_segment(&line.exprs, 0);
    let mut outcome = run_segment_of(line, &cmds, op_index == line.exprs.len());

    while op_index < line.exprs.len() {
        if outcome.need_exit {
            return outcome;
        }
        let run = match line.exprs[op_index] {
            Expr::And => outcome.code == 0,
            Expr::Or => outcome.code != 0,
            // collect_segment only stops at And/Or
            _ => unreachable!(),
        };
        let (cmds, next_op) = collect_segment(&line.exprs, op_index + 1);
        if run {
            let next = run_segment_of(line, &cmds, next_op == line.exprs.len());
            outcome.need_exit = next.need_exit;
            outcome.code = next.code;
            outcome.background.extend(next.background);
        }
        op_index = next_op;
    }
    outcome
}

/// Collects the commands of the pipeline segment starting at `start`,
/// skipping `Pipe` markers. Returns the commands and the index of the
/// operator (or the end of the list) that terminated the segment.
fn collect_segment(exprs: &[Expr], start: usize) -> (Vec<&Command>, usize) {
    let mut cmds = Vec::new();
    let mut index = start;
    while index < exprs.len() {
        match &exprs[index] {
            Expr::Command(cmd) => cmds.push(cmd),
            Expr::Pipe => (),
            Expr::And | Expr::Or => break,
        }
        index += 1;
    }
    (cmds, index)
}

fn run_segment_of(line: &CommandLine, cmds: &[&Command], terminal: bool) -> Outcome {
    if terminal {
        run_segment(cmds, &line.output, !line.background)
    } else {
        run_segment(cmds, &Output::Stdout, true)
    }
}

/// Runs one pipeline segment.
///
/// Spawns the commands left to right, wiring each stage's stdout to the
/// next stage's stdin through an anonymous pipe; the terminal stage gets
/// `output`. With `wait`, reaps the children in spawn order and returns the
/// last normal exit status as the code; without it, hands the PIDs to the
/// caller.
fn run_segment(cmds: &[&Command], output: &Output, wait: bool) -> Outcome {
    if cmds.is_empty() {
        eprintln!("ush: empty pipeline");
        return Outcome::with_code(1);
    }

    let mut pids = PidRegistry::new();
    let mut input: Option<File> = None;

    for (index, &cmd) in cmds.iter().enumerate() {
        let last = index == cmds.len() - 1;

        let (pipe_write, next_input) = if last {
            (None, None)
        } else {
            match posix::pipe() {
                Ok((read, write)) => (Some(write), Some(read)),
                Err(err) => {
                    eprintln!("ush: pipe: {err}");
                    pids.wait_all();
                    return Outcome::with_code(1);
                }
            }
        };

        if cmd.exe == "cd" && last && pids.is_empty() {
            let code = change_directory(cmd);
            if code != 0 {
                return Outcome::with_code(code);
            }
        } else if cmd.exe == "exit" {
            if last {
                // `exit` never forks. As the sole command it terminates the
                // shell; at the end of a longer pipeline it only supplies
                // the code, after the earlier stages are reaped.
                let sole = pids.is_empty();
                pids.wait_all();
                return Outcome {
                    need_exit: sole,
                    code: exit_code(cmd),
                    background: Vec::new(),
                };
            }
            // Non-terminal `exit` is skipped: no child is spawned for this
            // stage, so the next stage reads EOF from its pipe.
        } else {
            match posix::fork() {
                Ok(0) => exec_child(cmd, input, pipe_write, next_input, index == 0, wait, output, last),
                Ok(pid) => {
                    tracing::debug!(pid, exe = %cmd.exe, "spawned pipeline stage");
                    pids.push(pid);
                }
                Err(err) => {
                    eprintln!("ush: fork: {err}");
                    pids.wait_all();
                    return Outcome::with_code(1);
                }
            }
        }

        // The parent's copy of this stage's write end drops here; the read
        // end becomes the next stage's stdin.
        input = next_input;
    }

    if wait {
        Outcome::with_code(pids.wait_all())
    } else {
        Outcome {
            need_exit: false,
            code: 0,
            background: pids.into_pids(),
        }
    }
}

/// Final setup inside a forked child: wire the standard streams, close the
/// leftover pipe ends, and exec. Never returns.
#[allow(clippy::too_many_arguments)]
fn exec_child(
    cmd: &Command,
    input: Option<File>,
    pipe_write: Option<File>,
    next_input: Option<File>,
    first: bool,
    wait: bool,
    output: &Output,
    last: bool,
) -> ! {
    // The child inherited the read end of its own output pipe; close it so
    // the downstream stage sees EOF when this one exits.
    drop(next_input);

    if let Some(file) = input {
        if posix::dup2(file.as_raw_fd(), 0).is_err() {
            eprintln!("ush: input redirection failed");
            posix::_exit(1);
        }
    } else if first && !wait {
        // First command of a background pipeline reads nothing.
        let _ = posix::close(0);
    }

    if let Some(file) = pipe_write {
        if posix::dup2(file.as_raw_fd(), 1).is_err() {
            eprintln!("ush: output redirection failed");
            posix::_exit(1);
        }
    } else if last {
        match open_output(output) {
            Ok(None) => (),
            Ok(Some(file)) => {
                if posix::dup2(file.as_raw_fd(), 1).is_err() {
                    eprintln!("ush: output redirection failed");
                    posix::_exit(1);
                }
            }
            Err(err) => {
                eprintln!("ush: cannot open output file: {err}");
                posix::_exit(1);
            }
        }
    }

    let err = exec_command(cmd);
    eprintln!("ush: {}: {err}", cmd.exe);
    posix::_exit(127);
}

fn exec_command(cmd: &Command) -> io::Error {
    let mut argv: Vec<&str> = Vec::with_capacity(cmd.args.len() + 1);
    argv.push(&cmd.exe);
    argv.extend(cmd.args.iter().map(String::as_str));
    match posix::execvp(&cmd.exe, &argv) {
        Ok(()) => unreachable!("execvp returned without error"),
        Err(err) => err,
    }
}

fn open_output(output: &Output) -> io::Result<Option<File>> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).mode(0o777);
    match output {
        Output::Stdout => Ok(None),
        Output::Truncate(path) => opts.truncate(true).open(path).map(Some),
        Output::Append(path) => opts.append(true).open(path).map(Some),
    }
}

fn change_directory(cmd: &Command) -> i32 {
    if cmd.args.len() != 1 {
        eprintln!("ush: cd: expected exactly one argument");
        return 1;
    }
    match posix::chdir(OsStr::new(&cmd.args[0])) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("ush: cd: {}: {err}", cmd.args[0]);
            1
        }
    }
}

/// Parses `exit`'s argument the way `strtol` would: an optional sign and a
/// run of leading digits, anything else ignored, zero if nothing parses.
fn exit_code(cmd: &Command) -> i32 {
    let Some(arg) = cmd.args.first() else {
        return 0;
    };
    let arg = arg.trim();
    let end = arg
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '+' || c == '-')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    arg[..end].parse().unwrap_or(0)
}
