//! Server-to-server line format.
//!
//! Lines are `[:prefix] COMMAND param... [:trailing]`. [`Line`] is the
//! untyped wire shape; [`Command`] is the typed view the link handlers
//! work with. The prefix of a server command is the sender's SID; the
//! prefix of a user command is the user's UID.

pub use slirc_proto::Line;
use slirc_proto::ProtocolError;
use std::str::FromStr;

/// Description prefix marking a hidden server.
pub const HIDDEN_PREFIX: &str = "(H) ";

/// A server introduction as carried by `SERVER` and `SID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIntro {
    pub name: String,
    pub hops: u32,
    pub sid: String,
    pub description: String,
    pub hidden: bool,
}

impl ServerIntro {
    fn description_param(&self) -> String {
        if self.hidden {
            format!("{HIDDEN_PREFIX}{}", self.description)
        } else {
            self.description.clone()
        }
    }
}

/// A user introduction as carried by `UID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIntro {
    pub nick: String,
    pub hops: u32,
    pub ts: i64,
    pub user: String,
    pub host: String,
    pub uid: String,
    pub modes: String,
    pub realname: String,
}

/// Typed S2S commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PASS <password> TS 6 :<sid>`
    Pass { password: String, sid: String },
    /// `SERVER <name> <hops> <sid> :<description>`
    Server(ServerIntro),
    /// `:<parent> SID <name> <hops> <sid> :<description>`
    Sid(ServerIntro),
    /// `:<server> UID <nick> <hops> <ts> <user> <host> <uid> <modes> :<realname>`
    Uid(UserIntro),
    /// `:<uid> QUIT :<reason>`
    Quit { reason: String },
    /// `:<source> SQUIT <sid> :<reason>`
    Squit { target: String, reason: String },
    /// `:<server> EOB`
    Eob,
    /// `:<source> PING <origin> [<destination>]`
    Ping {
        origin: String,
        destination: Option<String>,
    },
    /// `:<source> PONG <origin> [<destination>]`
    Pong {
        origin: String,
        destination: Option<String>,
    },
    /// `:<server> VERSION :<text>`
    Version { text: String },
    /// `:<source> GLINE <mask> <duration> :<reason>`
    Gline {
        mask: String,
        duration: i64,
        reason: String,
    },
    /// `ERROR :<message>`
    Error { message: String },
    /// Anything else, relayed untouched.
    Other(String),
}

fn need(line: &Line, count: usize, command: &'static str) -> Result<(), ProtocolError> {
    if line.params.len() < count {
        Err(ProtocolError::NeedMoreParams(command))
    } else {
        Ok(())
    }
}

fn number<T: FromStr>(value: &str, command: &'static str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        command,
        value: value.to_string(),
    })
}

fn server_intro(line: &Line, command: &'static str) -> Result<ServerIntro, ProtocolError> {
    need(line, 4, command)?;
    let raw = &line.params[3];
    let (description, hidden) = match raw.strip_prefix(HIDDEN_PREFIX) {
        Some(rest) => (rest.to_string(), true),
        None => (raw.clone(), false),
    };
    Ok(ServerIntro {
        name: line.params[0].clone(),
        hops: number(&line.params[1], command)?,
        sid: line.params[2].clone(),
        description,
        hidden,
    })
}

impl Command {
    /// Typed view of a wire line.
    pub fn from_line(line: &Line) -> Result<Self, ProtocolError> {
        let p = &line.params;
        Ok(match line.command.as_str() {
            "PASS" => {
                need(line, 1, "PASS")?;
                Self::Pass {
                    password: p[0].clone(),
                    sid: p.get(3).cloned().unwrap_or_default(),
                }
            }
            "SERVER" => Self::Server(server_intro(line, "SERVER")?),
            "SID" => Self::Sid(server_intro(line, "SID")?),
            "UID" => {
                need(line, 8, "UID")?;
                Self::Uid(UserIntro {
                    nick: p[0].clone(),
                    hops: number(&p[1], "UID")?,
                    ts: number(&p[2], "UID")?,
                    user: p[3].clone(),
                    host: p[4].clone(),
                    uid: p[5].clone(),
                    modes: p[6].clone(),
                    realname: p[7].clone(),
                })
            }
            "QUIT" => Self::Quit {
                reason: p.first().cloned().unwrap_or_default(),
            },
            "SQUIT" => {
                need(line, 1, "SQUIT")?;
                Self::Squit {
                    target: p[0].clone(),
                    reason: p.get(1).cloned().unwrap_or_default(),
                }
            }
            "EOB" => Self::Eob,
            "PING" => {
                need(line, 1, "PING")?;
                Self::Ping {
                    origin: p[0].clone(),
                    destination: p.get(1).cloned(),
                }
            }
            "PONG" => {
                need(line, 1, "PONG")?;
                Self::Pong {
                    origin: p[0].clone(),
                    destination: p.get(1).cloned(),
                }
            }
            "VERSION" => Self::Version {
                text: p.first().cloned().unwrap_or_default(),
            },
            "GLINE" => {
                need(line, 3, "GLINE")?;
                Self::Gline {
                    mask: p[0].clone(),
                    duration: number(&p[1], "GLINE")?,
                    reason: p[2].clone(),
                }
            }
            "ERROR" => Self::Error {
                message: p.first().cloned().unwrap_or_default(),
            },
            other => Self::Other(other.to_string()),
        })
    }

    /// Wire form of this command. `Other` has no parameters of its own and
    /// renders as the bare command word.
    pub fn into_line(self, prefix: Option<&str>) -> Line {
        let line = match self {
            Self::Pass { password, sid } => Line::new(
                "PASS",
                vec![password, "TS".to_string(), "6".to_string(), sid],
            ),
            Self::Server(intro) => Line::new(
                "SERVER",
                vec![
                    intro.name.clone(),
                    intro.hops.to_string(),
                    intro.sid.clone(),
                    intro.description_param(),
                ],
            ),
            Self::Sid(intro) => Line::new(
                "SID",
                vec![
                    intro.name.clone(),
                    intro.hops.to_string(),
                    intro.sid.clone(),
                    intro.description_param(),
                ],
            ),
            Self::Uid(u) => Line::new(
                "UID",
                vec![
                    u.nick,
                    u.hops.to_string(),
                    u.ts.to_string(),
                    u.user,
                    u.host,
                    u.uid,
                    u.modes,
                    u.realname,
                ],
            ),
            Self::Quit { reason } => Line::new("QUIT", vec![reason]),
            Self::Squit { target, reason } => Line::new("SQUIT", vec![target, reason]),
            Self::Eob => Line::new("EOB", Vec::new()),
            Self::Ping {
                origin,
                destination,
            } => Line::new("PING", std::iter::once(origin).chain(destination).collect()),
            Self::Pong {
                origin,
                destination,
            } => Line::new("PONG", std::iter::once(origin).chain(destination).collect()),
            Self::Version { text } => Line::new("VERSION", vec![text]),
            Self::Gline {
                mask,
                duration,
                reason,
            } => Line::new("GLINE", vec![mask, duration.to_string(), reason]),
            Self::Error { message } => Line::new("ERROR", vec![message]),
            Self::Other(command) => Line::new(command, Vec::new()),
        };
        match prefix {
            Some(prefix) => line.with_prefix(prefix),
            None => line,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Pass { .. } => "PASS",
            Self::Server(_) => "SERVER",
            Self::Sid(_) => "SID",
            Self::Uid(_) => "UID",
            Self::Quit { .. } => "QUIT",
            Self::Squit { .. } => "SQUIT",
            Self::Eob => "EOB",
            Self::Ping { .. } => "PING",
            Self::Pong { .. } => "PONG",
            Self::Version { .. } => "VERSION",
            Self::Gline { .. } => "GLINE",
            Self::Error { .. } => "ERROR",
            Self::Other(name) => name,
        }
    }
}
