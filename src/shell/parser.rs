use std::collections::VecDeque;

use thiserror::Error;

/// A single external command: an executable name and its arguments.
///
/// The executable is looked up through `PATH` at exec time; the parser does
/// no resolution of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Program to execute.
    pub exe: String,
    /// Arguments, not including the program name itself.
    pub args: Vec<String>,
}

/// One element of a parsed command line.
///
/// A command line is an alternating sequence of commands and operators;
/// `Pipe` separates commands within a pipeline segment, while `And`/`Or`
/// terminate a segment and decide whether the next one runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// An external command (or builtin) to run.
    Command(Command),
    /// `|` - feed the previous command's stdout to the next one's stdin.
    Pipe,
    /// `&&` - run the next segment only if the previous one succeeded.
    And,
    /// `||` - run the next segment only if the previous one failed.
    Or,
}

/// Where the final pipeline segment sends its standard output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Inherit the shell's standard output.
    Stdout,
    /// `> path` - create or truncate the file.
    Truncate(String),
    /// `>> path` - create or append to the file.
    Append(String),
}

/// A fully parsed command line, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Commands and operators in source order.
    pub exprs: Vec<Expr>,
    /// Output disposition of the final pipeline segment.
    pub output: Output,
    /// Whether the final pipeline segment runs in the background (`&`).
    pub background: bool,
}

/// Reason a line could not be parsed.
///
/// The driver prints these and moves on; a parse error never terminates
/// the shell.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// An operator with no command on one of its sides, e.g. `| cat` or
    /// `a &&`.
    #[error("missing command around an operator")]
    MissingCommand,
    /// `>` or `>>` with no file name after it.
    #[error("missing redirection target")]
    MissingRedirectTarget,
    /// Output redirection somewhere other than the end of the line.
    #[error("output redirection must come last")]
    MisplacedRedirect,
    /// `&` somewhere other than the end of the line.
    #[error("'&' is only allowed at the end of a line")]
    MisplacedBackground,
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Pipe,
    And,
    Or,
    RedirectNew,
    RedirectAppend,
    Background,
}

fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            _ if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Or);
                } else {
                    tokens.push(Token::Pipe);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::And);
                } else {
                    tokens.push(Token::Background);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::RedirectAppend);
                } else {
                    tokens.push(Token::RedirectNew);
                }
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '|' | '&' | '>') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    tokens
}

fn parse_line(line: &str) -> Result<Option<CommandLine>, ParseError> {
    let tokens = tokenize(line);
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut exprs = Vec::new();
    let mut current: Option<Command> = None;
    let mut output = Output::Stdout;
    let mut background = false;

    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        if background {
            return Err(ParseError::MisplacedBackground);
        }
        match token {
            Token::Word(word) => {
                if output != Output::Stdout {
                    return Err(ParseError::MisplacedRedirect);
                }
                match current {
                    None => current = Some(Command { exe: word, args: vec![] }),
                    Some(ref mut cmd) => cmd.args.push(word),
                }
            }
            Token::Pipe | Token::And | Token::Or => {
                if output != Output::Stdout {
                    return Err(ParseError::MisplacedRedirect);
                }
                let cmd = current.take().ok_or(ParseError::MissingCommand)?;
                exprs.push(Expr::Command(cmd));
                exprs.push(match token {
                    Token::Pipe => Expr::Pipe,
                    Token::And => Expr::And,
                    _ => Expr::Or,
                });
            }
            Token::RedirectNew | Token::RedirectAppend => {
                if current.is_none() {
                    return Err(ParseError::MissingCommand);
                }
                if output != Output::Stdout {
                    return Err(ParseError::MisplacedRedirect);
                }
                let target = match iter.next() {
                    Some(Token::Word(path)) => path,
                    _ => return Err(ParseError::MissingRedirectTarget),
                };
                output = match token {
                    Token::RedirectNew => Output::Truncate(target),
                    _ => Output::Append(target),
                };
            }
            Token::Background => background = true,
        }
    }

    let cmd = current.take().ok_or(ParseError::MissingCommand)?;
    exprs.push(Expr::Command(cmd));

    Ok(Some(CommandLine {
        exprs,
        output,
        background,
    }))
}

/// Incremental command-line parser.
///
/// Bytes arrive in arbitrary chunks via [`feed`]; whenever a `\n` completes
/// a line, the line is parsed and queued. [`pop_next`] drains the queue one
/// command line (or parse error) at a time. A feed can complete zero, one,
/// or many lines.
///
/// There is no quoting, variable expansion, or globbing; words are split on
/// whitespace and the only operators are `|`, `||`, `&&`, `&`, `>`, `>>`.
///
/// [`feed`]: Parser::feed
/// [`pop_next`]: Parser::pop_next
///
/// # Examples
///
/// ```
/// use userland::Parser;
///
/// let mut parser = Parser::new();
/// parser.feed(b"echo hello | wc -c\n");
/// let line = parser.pop_next().unwrap().unwrap();
/// assert_eq!(line.exprs.len(), 3);
/// assert!(parser.pop_next().is_none());
/// ```
#[derive(Debug, Default)]
pub struct Parser {
    buf: Vec<u8>,
    ready: VecDeque<Result<CommandLine, ParseError>>,
}

impl Parser {
    /// Creates an empty parser.
    pub fn new() -> Parser {
        Parser::default()
    }

    /// Appends a chunk of input and parses any lines it completes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            match parse_line(&line) {
                Ok(None) => (),
                Ok(Some(cl)) => self.ready.push_back(Ok(cl)),
                Err(err) => self.ready.push_back(Err(err)),
            }
        }
    }

    /// Pops the next parsed command line, if a complete one is available.
    pub fn pop_next(&mut self) -> Option<Result<CommandLine, ParseError>> {
        self.ready.pop_front()
    }
}
