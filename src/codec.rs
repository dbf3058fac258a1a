//! Command encoding and reply decoding for the line-oriented ASCII protocol.
//!
//! Commands to the InjectMan are a marker letter, a three-digit code, and optional integer
//! parameters separated by single spaces:
//!
//! ```text
//! C001            query program version
//! C007 10 0 25 1000 1000 1000
//! ```
//!
//! Replies echo the code behind an acknowledgement marker (`A` or `a`) followed by integer
//! fields, e.g. `A010 595 0 778 0`.
//!
//! The Arduino voltage controller uses mnemonic commands instead (`!SI 1 500`, `?SS 1`),
//! built with [`encode_mnemonic`] and read back positionally with [`positional_field`].

use crate::error::{AppResult, DaqError};
use std::fmt;

/// Marker letter prefixed to every numeric command code.
pub const CODE_MARKER: char = 'C';

/// Largest command code that fits the three-digit token.
pub const MAX_COMMAND_CODE: u32 = 999;

/// A command for the InjectMan, either encoded from a code or passed through literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Numeric command code with integer parameters.
    Code {
        /// Code in `[1, 999]`.
        code: u32,
        /// Parameters appended after the code token.
        params: Vec<i64>,
    },
    /// Raw command text sent exactly as given.
    Literal(String),
}

impl Command {
    /// Command code without parameters.
    pub fn code(code: u32) -> Self {
        Command::Code {
            code,
            params: Vec::new(),
        }
    }

    /// Command code with parameters.
    pub fn with_params(code: u32, params: impl IntoIterator<Item = i64>) -> Self {
        Command::Code {
            code,
            params: params.into_iter().collect(),
        }
    }

    /// Literal command text.
    pub fn literal(text: impl Into<String>) -> Self {
        Command::Literal(text.into())
    }

    /// Render the wire text (without terminator).
    pub fn render(&self) -> AppResult<String> {
        match self {
            Command::Code { code, params } => encode(*code, params),
            Command::Literal(text) => Ok(text.clone()),
        }
    }
}

impl From<u32> for Command {
    fn from(code: u32) -> Self {
        Command::code(code)
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Command::literal(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Command::Literal(text)
    }
}

/// Encode a command code and its parameters.
///
/// `encode(5, &[10, 11, 12])` gives `"C005 10 11 12"`; an empty parameter list gives just
/// the code token.
///
/// # Errors
///
/// [`DaqError::InvalidCommandCode`] if `code` is not in `[1, 999]`.
pub fn encode(code: u32, params: &[i64]) -> AppResult<String> {
    if code == 0 || code > MAX_COMMAND_CODE {
        return Err(DaqError::InvalidCommandCode(code));
    }
    let mut out = format!("{CODE_MARKER}{code:03}");
    append_params(&mut out, params);
    Ok(out)
}

/// Encode a mnemonic command such as `!SI 1 500` or `?SS 1`.
pub fn encode_mnemonic(prefix: char, name: &str, params: &[i64]) -> String {
    let mut out = format!("{prefix}{name}");
    append_params(&mut out, params);
    out
}

fn append_params(out: &mut String, params: &[i64]) {
    for p in params {
        out.push(' ');
        out.push_str(&p.to_string());
    }
}

/// A decoded acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Acknowledgement marker as received (`A` or `a`).
    pub marker: char,
    /// Code-bearing remainder of the first token, e.g. `"010"`.
    pub code: String,
    /// Integer fields following the first token.
    pub fields: Vec<i64>,
}

impl Reply {
    /// Leading status field; 0 means a move completed successfully.
    pub fn status(&self) -> Option<i64> {
        self.fields.first().copied()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.marker, self.code)?;
        for field in &self.fields {
            write!(f, " {field}")?;
        }
        Ok(())
    }
}

/// Decode an acknowledgement of the form `A<code> <int> <int> ...`.
///
/// # Errors
///
/// [`DaqError::MalformedReply`] if the reply does not start with `a`/`A` or a field is not a
/// base-10 integer.
pub fn decode(reply: &str) -> AppResult<Reply> {
    let mut tokens = reply.split(' ');
    let head = tokens.next().unwrap_or_default();

    let mut chars = head.chars();
    let marker = match chars.next() {
        Some(c @ ('a' | 'A')) => c,
        Some(_) => {
            return Err(DaqError::malformed(
                reply,
                "expected the first character to be 'a' or 'A'",
            ))
        }
        None => return Err(DaqError::malformed(reply, "empty reply")),
    };
    let code = chars.as_str().to_string();

    let fields = tokens
        .map(|tok| {
            tok.parse::<i64>()
                .map_err(|_| DaqError::malformed(reply, format!("field '{tok}' is not an integer")))
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Reply {
        marker,
        code,
        fields,
    })
}

/// Parse the whitespace-separated token at `index` of a reply as an integer.
pub fn positional_field(reply: &str, index: usize) -> AppResult<i64> {
    let token = reply
        .split_whitespace()
        .nth(index)
        .ok_or_else(|| DaqError::malformed(reply, format!("missing field {index}")))?;
    token
        .parse::<i64>()
        .map_err(|_| DaqError::malformed(reply, format!("field '{token}' is not an integer")))
}
