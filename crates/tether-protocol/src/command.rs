//! Command grammar for the tether line protocol
//!
//! Every input line has the shape `<command>[ <arg>...]`. The first
//! whitespace-delimited token selects a command; the remainder is passed as
//! positional string arguments. There is no quoting grammar, so an argument
//! containing whitespace cannot be expressed as a single argument.
//!
//! The set of commands an endpoint accepts is closed and known at compile
//! time: dispatch is a `match` on [`Command`], not a lookup of dynamically
//! registered handlers. A token outside the endpoint's [`CommandSet`] is
//! reported back to the sender and changes no state.

use std::fmt;

/// A protocol command token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Register a signature: `reg <signature>`
    Reg,
    /// Leave a relay pair, or close the connection when unbound
    Exit,
    /// Liveness check, answered with `pong`
    Ping,
    /// Introspect an endpoint property: `info <prop>`
    Info,
    /// List the available commands
    Help,
    /// List connected agents (client-capable endpoints only)
    Ls,
    /// Bind to an agent by index: `use <index>` (client-capable only)
    Use,
    /// Working-directory update relayed from an agent: `chdir <cwd>`
    Chdir,
}

impl Command {
    /// Commands every endpoint accepts
    pub const BASE: [Command; 5] = [
        Command::Reg,
        Command::Exit,
        Command::Ping,
        Command::Info,
        Command::Help,
    ];

    /// Additional commands accepted by client-capable endpoints
    pub const CLIENT: [Command; 2] = [Command::Ls, Command::Use];

    /// The wire token for this command
    pub fn token(&self) -> &'static str {
        match self {
            Command::Reg => "reg",
            Command::Exit => "exit",
            Command::Ping => "ping",
            Command::Info => "info",
            Command::Help => "help",
            Command::Ls => "ls",
            Command::Use => "use",
            Command::Chdir => "chdir",
        }
    }

    /// Parse a wire token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "reg" => Some(Command::Reg),
            "exit" => Some(Command::Exit),
            "ping" => Some(Command::Ping),
            "info" => Some(Command::Info),
            "help" => Some(Command::Help),
            "ls" => Some(Command::Ls),
            "use" => Some(Command::Use),
            "chdir" => Some(Command::Chdir),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// The ordered set of commands an endpoint variant accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet(Vec<Command>);

impl CommandSet {
    /// Base set: `reg`, `exit`, `ping`, `info`, `help`
    pub fn base() -> Self {
        Self(Command::BASE.to_vec())
    }

    /// Client set: base plus `ls` and `use`
    pub fn client() -> Self {
        let mut cmds = Command::BASE.to_vec();
        cmds.extend(Command::CLIENT);
        Self(cmds)
    }

    /// Whether this set accepts the given command
    pub fn contains(&self, cmd: Command) -> bool {
        self.0.contains(&cmd)
    }

    /// Comma-joined token list, used in `help` and error replies
    pub fn join(&self) -> String {
        self.0
            .iter()
            .map(Command::token)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A parsed input line: leading command token plus positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// The trimmed input line as received
    pub raw: String,
    /// First whitespace-delimited token (empty for a blank line)
    pub head: String,
    /// Remaining tokens
    pub args: Vec<String>,
}

impl Line {
    /// Split an input line into command token and arguments
    pub fn parse(input: &str) -> Self {
        let raw = input.trim().to_string();
        let mut tokens = raw.split_whitespace();
        let head = tokens.next().unwrap_or_default().to_string();
        let args = tokens.map(str::to_string).collect();
        Self { raw, head, args }
    }

    /// The command, if the head token is a recognized token at all
    pub fn command(&self) -> Option<Command> {
        Command::from_token(&self.head)
    }

    /// Positional argument by index
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Everything after the command token, re-joined with single spaces
    pub fn rest(&self) -> String {
        self.args.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_token_roundtrip() {
        for cmd in [
            Command::Reg,
            Command::Exit,
            Command::Ping,
            Command::Info,
            Command::Help,
            Command::Ls,
            Command::Use,
            Command::Chdir,
        ] {
            let token = cmd.token();
            let recovered = Command::from_token(token).unwrap();
            assert_eq!(recovered, cmd);
        }
    }

    #[test]
    fn test_parse_command_with_args() {
        let line = Line::parse("reg bob@host1\n");
        assert_eq!(line.command(), Some(Command::Reg));
        assert_eq!(line.arg(0), Some("bob@host1"));
        assert_eq!(line.raw, "reg bob@host1");
    }

    #[test]
    fn test_parse_collapses_whitespace_runs() {
        let line = Line::parse("use   3");
        assert_eq!(line.command(), Some(Command::Use));
        assert_eq!(line.args, vec!["3"]);
    }

    #[test]
    fn test_parse_unknown_head() {
        let line = Line::parse("frobnicate now");
        assert_eq!(line.command(), None);
        assert_eq!(line.head, "frobnicate");
        assert_eq!(line.rest(), "now");
    }

    #[test]
    fn test_parse_blank_line() {
        let line = Line::parse("   ");
        assert_eq!(line.head, "");
        assert!(line.args.is_empty());
        assert_eq!(line.command(), None);
    }

    #[test]
    fn test_command_sets() {
        let base = CommandSet::base();
        assert!(base.contains(Command::Reg));
        assert!(!base.contains(Command::Use));

        let client = CommandSet::client();
        assert!(client.contains(Command::Ls));
        assert!(client.contains(Command::Use));
        assert_eq!(client.join(), "reg, exit, ping, info, help, ls, use");
    }
}
