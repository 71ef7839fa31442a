//! `ush` - the userland shell.
//!
//! Reads command lines from standard input, executes them, and exits with
//! the code of the last foreground pipeline (or the argument of `exit`).
//! Set `RUST_LOG=debug` to watch spawn/reap events on stderr.

use std::io::{self, Read};

use userland::shell::{Parser, PidRegistry, execute_command_line};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let mut parser = Parser::new();
    let mut background = PidRegistry::new();
    let mut code = 0;

    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; 1024];
    loop {
        let count = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(count) => count,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                eprintln!("ush: read: {err}");
                break;
            }
        };
        parser.feed(&buf[..count]);

        while let Some(parsed) = parser.pop_next() {
            let line = match parsed {
                Ok(line) => line,
                Err(err) => {
                    println!("ush: parse error: {err}");
                    continue;
                }
            };

            let outcome = execute_command_line(&line);
            code = outcome.code;
            for pid in outcome.background {
                background.push(pid);
            }
            background.reap_finished();

            if outcome.need_exit {
                tracing::debug!(code, "exit requested");
                std::process::exit(code);
            }
        }
    }

    std::process::exit(code);
}
