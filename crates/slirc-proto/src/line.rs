//! Raw IRC lines.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// One raw line: `[:prefix] COMMAND param... [:trailing]`.
///
/// Commands are upper-cased on parse. Only the last parameter may contain
/// spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Line {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

impl FromStr for Line {
    type Err = ProtocolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut rest = raw.trim_end_matches(['\r', '\n']).trim_start_matches(' ');
        if rest.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let prefix = match rest.strip_prefix(':') {
            Some(after) => {
                let (prefix, tail) = after.split_once(' ').unwrap_or((after, ""));
                rest = tail.trim_start_matches(' ');
                Some(prefix.to_string())
            }
            None => None,
        };

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(ProtocolError::MissingCommand);
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (param, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(param.to_string());
            rest = tail;
        }

        Ok(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}
