//! S2S Handshake State Machine.
//!
//! Manages the transition from an unconnected socket to an established
//! server link. Both sides send `PASS` then `SERVER`; the side that
//! accepted the connection answers with its own pair once the peer's
//! credentials check out.

use super::protocol::{Command, ServerIntro};
use crate::config::LinkBlock;
use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Initial state.
    Unconnected,
    /// We initiated the connection (outbound).
    /// We have sent PASS and SERVER, waiting for remote PASS/SERVER.
    OutboundInitiated,
    /// We received a connection (inbound).
    /// We are waiting for PASS and SERVER.
    InboundReceived,
    /// Credentials accepted; the link belongs to the sync manager now.
    Established,
}

/// The server on the other end of a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePeer {
    pub name: String,
    pub sid: String,
    pub description: String,
    pub hidden: bool,
}

#[derive(Debug)]
pub struct HandshakeMachine {
    pub state: HandshakeState,
    remote_pass: Option<(String, String)>,
    remote_server: Option<ServerIntro>,

    // Local identity
    local_sid: String,
    local_name: String,
    local_desc: String,
}

impl HandshakeMachine {
    pub fn new(local_sid: String, local_name: String, local_desc: String) -> Self {
        Self {
            state: HandshakeState::Unconnected,
            remote_pass: None,
            remote_server: None,
            local_sid,
            local_name,
            local_desc,
        }
    }

    pub fn transition(&mut self, new_state: HandshakeState) {
        self.state = new_state;
    }

    /// Our `PASS` and `SERVER`, sent first on outbound links and as the
    /// answer on inbound ones.
    pub fn introduction(&self, password: &str) -> Vec<Command> {
        vec![
            Command::Pass {
                password: password.to_string(),
                sid: self.local_sid.clone(),
            },
            Command::Server(ServerIntro {
                name: self.local_name.clone(),
                hops: 1,
                sid: self.local_sid.clone(),
                description: self.local_desc.clone(),
                hidden: false,
            }),
        ]
    }

    /// Feed one command from the peer. Returns the commands to send back.
    pub fn step(
        &mut self,
        command: Command,
        links: &[LinkBlock],
    ) -> Result<Vec<Command>, LinkError> {
        match self.state {
            HandshakeState::Unconnected => Err(LinkError::Protocol(format!(
                "{} before the link was set up",
                command.name()
            ))),
            HandshakeState::OutboundInitiated | HandshakeState::InboundReceived => {
                self.handle_step(command, links)
            }
            HandshakeState::Established => Ok(Vec::new()),
        }
    }

    fn handle_step(
        &mut self,
        command: Command,
        links: &[LinkBlock],
    ) -> Result<Vec<Command>, LinkError> {
        match command {
            Command::Pass { password, sid } => {
                self.remote_pass = Some((password, sid));
                Ok(Vec::new())
            }
            Command::Server(intro) => {
                if self.remote_pass.is_none() {
                    return Err(LinkError::Protocol("SERVER before PASS".to_string()));
                }
                self.remote_server = Some(intro);
                let block = self.verify_credentials(links)?;
                let replies = match self.state {
                    HandshakeState::InboundReceived => self.introduction(&block.password),
                    _ => Vec::new(),
                };
                self.state = HandshakeState::Established;
                Ok(replies)
            }
            Command::Error { message } => Err(LinkError::Remote(message)),
            other => Err(LinkError::Protocol(format!(
                "unexpected {} during handshake",
                other.name()
            ))),
        }
    }

    fn verify_credentials<'a>(&self, links: &'a [LinkBlock]) -> Result<&'a LinkBlock, LinkError> {
        let (Some((password, pass_sid)), Some(server)) = (&self.remote_pass, &self.remote_server)
        else {
            return Err(LinkError::Protocol("incomplete handshake".to_string()));
        };

        let block = links
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(&server.name))
            .ok_or_else(|| LinkError::UnknownServer(server.name.clone()))?;

        if block.password != *password {
            return Err(LinkError::AuthenticationFailed(server.name.clone()));
        }
        if let Some(expected) = &block.sid
            && *expected != server.sid
        {
            return Err(LinkError::SidMismatch {
                name: server.name.clone(),
                expected: expected.clone(),
                got: server.sid.clone(),
            });
        }
        if !pass_sid.is_empty() && *pass_sid != server.sid {
            return Err(LinkError::Protocol(format!(
                "PASS announced SID {pass_sid} but SERVER announced {}",
                server.sid
            )));
        }
        Ok(block)
    }

    /// The authenticated peer, once established.
    pub fn peer(&self) -> Option<RemotePeer> {
        if self.state != HandshakeState::Established {
            return None;
        }
        self.remote_server.as_ref().map(|s| RemotePeer {
            name: s.name.clone(),
            sid: s.sid.clone(),
            description: s.description.clone(),
            hidden: s.hidden,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> Vec<LinkBlock> {
        vec![LinkBlock {
            name: "leaf.example".to_string(),
            hostname: "127.0.0.1".to_string(),
            port: 7000,
            password: "secret".to_string(),
            autoconnect: false,
            sid: Some("0LF".to_string()),
        }]
    }

    fn machine(state: HandshakeState) -> HandshakeMachine {
        let mut m = HandshakeMachine::new(
            "0HB".to_string(),
            "hub.example".to_string(),
            "Hub".to_string(),
        );
        m.transition(state);
        m
    }

    fn pass(password: &str, sid: &str) -> Command {
        Command::Pass {
            password: password.to_string(),
            sid: sid.to_string(),
        }
    }

    fn server(name: &str, sid: &str) -> Command {
        Command::Server(ServerIntro {
            name: name.to_string(),
            hops: 1,
            sid: sid.to_string(),
            description: "Leaf".to_string(),
            hidden: false,
        })
    }

    #[test]
    fn inbound_answers_with_own_introduction() {
        let mut m = machine(HandshakeState::InboundReceived);
        assert!(m.step(pass("secret", "0LF"), &links()).unwrap().is_empty());
        let replies = m.step(server("Leaf.Example", "0LF"), &links()).unwrap();

        assert_eq!(m.state, HandshakeState::Established);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], pass("secret", "0HB"));
        assert_eq!(replies[1].name(), "SERVER");
        assert_eq!(m.peer().unwrap().sid, "0LF");
    }

    #[test]
    fn outbound_completes_silently() {
        let mut m = machine(HandshakeState::OutboundInitiated);
        m.step(pass("secret", "0LF"), &links()).unwrap();
        assert!(m.step(server("leaf.example", "0LF"), &links()).unwrap().is_empty());
        assert_eq!(m.state, HandshakeState::Established);
    }

    #[test]
    fn rejects_bad_credentials() {
        let mut m = machine(HandshakeState::InboundReceived);
        m.step(pass("wrong", "0LF"), &links()).unwrap();
        assert!(matches!(
            m.step(server("leaf.example", "0LF"), &links()),
            Err(LinkError::AuthenticationFailed(_))
        ));
        assert!(m.peer().is_none());

        let mut m = machine(HandshakeState::InboundReceived);
        m.step(pass("secret", "0XX"), &links()).unwrap();
        assert!(matches!(
            m.step(server("leaf.example", "0XX"), &links()),
            Err(LinkError::SidMismatch { .. })
        ));

        let mut m = machine(HandshakeState::InboundReceived);
        m.step(pass("secret", "0ST"), &links()).unwrap();
        assert!(matches!(
            m.step(server("stranger.example", "0ST"), &links()),
            Err(LinkError::UnknownServer(_))
        ));
    }

    #[test]
    fn rejects_out_of_order_commands() {
        let mut m = machine(HandshakeState::InboundReceived);
        assert!(matches!(
            m.step(server("leaf.example", "0LF"), &links()),
            Err(LinkError::Protocol(_))
        ));

        let mut m = machine(HandshakeState::InboundReceived);
        assert!(matches!(m.step(Command::Eob, &links()), Err(LinkError::Protocol(_))));

        let mut m = machine(HandshakeState::Unconnected);
        assert!(m.step(pass("secret", "0LF"), &links()).is_err());
    }

    #[test]
    fn peer_error_aborts() {
        let mut m = machine(HandshakeState::OutboundInitiated);
        let err = m
            .step(
                Command::Error {
                    message: "Invalid credentials".to_string(),
                },
                &links(),
            )
            .unwrap_err();
        assert!(matches!(err, LinkError::Remote(_)));
    }
}
