//! Line protocol parsing
//!
//! Turns one trimmed line from a client into a `Command`. Parsing is pure;
//! applying a command against the registry is `ChatServer`'s job.

/// A single client request
///
/// Variants are listed in dispatch priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `/quit` - end the session
    Quit,
    /// `/ping`
    Ping,
    /// `/uptime`
    Uptime,
    /// `/users`
    Users,
    /// `/admin`
    Admin,
    /// `/whoami`
    WhoAmI,
    /// `/rename <name>`
    Rename(String),
    /// `@<user> <text>`
    Private { target: String, text: String },
    /// `@<user>` without a message body
    PrivateUsage,
    /// `/calc <a> <op> <b>`
    Calc(Calculation),
    /// `/mute [user]` - the admin check precedes the argument check
    Mute(Option<String>),
    /// `/unmute [user]`
    Unmute(Option<String>),
    /// Free text for the room
    Chat(String),
    /// Malformed command, dropped without reply
    Ignored,
}

impl Command {
    /// Parse one line. The input should already be trimmed.
    ///
    /// Command words must stand alone: `/muteX` is chat, not `/mute`.
    pub fn parse(line: &str) -> Self {
        match line {
            "/quit" => Command::Quit,
            "/ping" => Command::Ping,
            "/uptime" => Command::Uptime,
            "/users" => Command::Users,
            "/admin" => Command::Admin,
            "/whoami" => Command::WhoAmI,
            _ => Self::parse_with_args(line),
        }
    }

    fn parse_with_args(line: &str) -> Self {
        let (head, rest) = split_head(line);
        match head {
            "/rename" => rest.map_or(Command::Ignored, |name| Command::Rename(name.to_string())),
            _ if line.starts_with('@') => parse_private(&line[1..]),
            "/calc" => Calculation::parse(line).map_or(Command::Ignored, Command::Calc),
            "/mute" => Command::Mute(rest.map(str::to_string)),
            "/unmute" => Command::Unmute(rest.map(str::to_string)),
            _ => Command::Chat(line.to_string()),
        }
    }
}

/// Split off the first whitespace-delimited token
fn split_head(line: &str) -> (&str, Option<&str>) {
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) => {
            let rest = rest.trim();
            (head, (!rest.is_empty()).then_some(rest))
        }
        None => (line, None),
    }
}

fn parse_private(body: &str) -> Command {
    match body.split_once(' ') {
        Some((target, text)) => Command::Private {
            target: target.to_string(),
            text: text.to_string(),
        },
        None => Command::PrivateUsage,
    }
}

/// Arithmetic operator accepted by `/calc`
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    /// Anything else; evaluates to the `Err` marker
    Other(String),
}

impl Operator {
    fn parse(s: &str) -> Self {
        match s {
            "+" => Operator::Add,
            "-" => Operator::Sub,
            "*" => Operator::Mul,
            "/" => Operator::Div,
            other => Operator::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Add => f.write_str("+"),
            Operator::Sub => f.write_str("-"),
            Operator::Mul => f.write_str("*"),
            Operator::Div => f.write_str("/"),
            Operator::Other(op) => f.write_str(op),
        }
    }
}

/// A validated `/calc` expression
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub lhs: f64,
    pub op: Operator,
    pub rhs: f64,
}

/// Result of evaluating a `Calculation`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalcOutcome {
    Value(f64),
    DivisionByZero,
    UnknownOperator,
}

impl Calculation {
    /// Parse `/calc <a> <op> <b>`. Returns `None` on wrong arity or
    /// non-numeric operands.
    fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [_, lhs, op, rhs] = parts.as_slice() else {
            return None;
        };
        Some(Self {
            lhs: lhs.parse().ok()?,
            op: Operator::parse(op),
            rhs: rhs.parse().ok()?,
        })
    }

    pub fn evaluate(&self) -> CalcOutcome {
        match self.op {
            Operator::Add => CalcOutcome::Value(self.lhs + self.rhs),
            Operator::Sub => CalcOutcome::Value(self.lhs - self.rhs),
            Operator::Mul => CalcOutcome::Value(self.lhs * self.rhs),
            Operator::Div if self.rhs == 0.0 => CalcOutcome::DivisionByZero,
            Operator::Div => CalcOutcome::Value(self.lhs / self.rhs),
            Operator::Other(_) => CalcOutcome::UnknownOperator,
        }
    }
}

impl std::fmt::Display for CalcOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalcOutcome::Value(v) => write!(f, "{}", v),
            CalcOutcome::DivisionByZero => f.write_str("DivZero"),
            CalcOutcome::UnknownOperator => f.write_str("Err"),
        }
    }
}
