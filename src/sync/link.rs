//! Per-connection link tasks.
//!
//! A link task owns one socket. It runs the handshake itself, then hands
//! the authenticated peer to the sync manager and from there on only
//! shuttles lines: inbound lines become [`SyncEvent::Inbound`], lines the
//! manager queues for the peer are written out. When the manager drops
//! its sender the queue drains and the socket closes.

use super::handshake::{HandshakeMachine, HandshakeState, RemotePeer};
use super::manager::{SyncEvent, SyncHandle};
use super::protocol::{Command, Line};
use crate::config::{Config, LinkBlock};
use crate::error::{LinkError, ProtocolError};
use crate::metrics;
use crate::telemetry::spans;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{Instrument, debug, info, warn};

/// Time allowed from connect to accepted credentials.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_LINE_LENGTH: usize = 8192;

/// What every link task needs to know, shared read-only.
#[derive(Debug, Clone)]
pub struct LinkContext {
    pub local_name: String,
    pub local_sid: String,
    pub local_desc: String,
    pub links: Vec<LinkBlock>,
    pub sendq: usize,
    pub connect_retry: Duration,
}

impl LinkContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            local_name: config.server.name.clone(),
            local_sid: config.server.sid.clone(),
            local_desc: config.server.description.clone(),
            links: config.links.clone(),
            sendq: config.linking.sendq,
            connect_retry: Duration::from_secs(config.linking.connect_retry),
        }
    }

    fn machine(&self, state: HandshakeState) -> HandshakeMachine {
        let mut machine = HandshakeMachine::new(
            self.local_sid.clone(),
            self.local_name.clone(),
            self.local_desc.clone(),
        );
        machine.transition(state);
        machine
    }
}

type LineStream<S> = Framed<S, LinesCodec>;

async fn send_line<S>(framed: &mut LineStream<S>, line: &Line) -> Result<(), LinkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(line.to_string()).await?;
    metrics::record_line("out");
    Ok(())
}

/// Best-effort `ERROR` before hanging up.
async fn reject<S>(framed: &mut LineStream<S>, error: &LinkError)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    metrics::record_link_error(error.error_code());
    if let Some(message) = error.peer_message() {
        let line = Command::Error { message }.into_line(None);
        let _ = send_line(framed, &line).await;
    }
}

async fn handshake<S>(
    framed: &mut LineStream<S>,
    machine: &mut HandshakeMachine,
    links: &[LinkBlock],
) -> Result<RemotePeer, LinkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while machine.state != HandshakeState::Established {
        let raw = framed.next().await.ok_or(LinkError::Closed)??;
        metrics::record_line("in");
        let line = match raw.parse::<Line>() {
            Err(ProtocolError::Empty) => continue,
            parsed => parsed?,
        };
        let command = Command::from_line(&line)?;
        for reply in machine.step(command, links)? {
            send_line(framed, &reply.into_line(None)).await?;
        }
    }
    machine
        .peer()
        .ok_or_else(|| LinkError::Protocol("handshake ended without a peer".to_string()))
}

/// Move lines between the socket and the manager until either side ends.
async fn pump<S>(
    framed: &mut LineStream<S>,
    rx: &mut mpsc::Receiver<Arc<Line>>,
    handle: &SyncHandle,
    link: slirc_tree::LinkId,
) -> Result<(), LinkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(line) => send_line(framed, &line).await?,
                // The manager closed this link.
                None => return Ok(()),
            },
            inbound = framed.next() => match inbound {
                Some(Ok(raw)) => {
                    metrics::record_line("in");
                    match raw.parse::<Line>() {
                        Ok(line) => handle.send(SyncEvent::Inbound { link, line }).await?,
                        Err(ProtocolError::Empty) => {}
                        Err(e) => warn!(error = %e, "Dropping malformed line"),
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(LinkError::Closed),
            },
        }
    }
}

/// Drive one connection from handshake to close.
///
/// `opening` is sent before anything is read (our PASS/SERVER on
/// outbound links, nothing on inbound ones).
pub async fn run_link<S>(
    handle: SyncHandle,
    ctx: Arc<LinkContext>,
    stream: S,
    mut machine: HandshakeMachine,
    opening: Vec<Command>,
) -> Result<(), LinkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    for command in opening {
        send_line(&mut framed, &command.into_line(None)).await?;
    }

    let outcome = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        handshake(&mut framed, &mut machine, &ctx.links),
    )
    .await
    .unwrap_or(Err(LinkError::Timeout));
    let peer = match outcome {
        Ok(peer) => peer,
        Err(e) => {
            reject(&mut framed, &e).await;
            return Err(e);
        }
    };
    tracing::Span::current().record("peer", peer.name.as_str());

    let link = handle.next_link_id();
    let (tx, mut rx) = mpsc::channel(ctx.sendq);
    let (reply, accepted) = oneshot::channel();
    handle
        .send(SyncEvent::LinkUp {
            link,
            peer: peer.clone(),
            tx,
            reply,
        })
        .await?;
    if let Err(e) = accepted.await.map_err(|_| LinkError::ManagerGone)? {
        reject(&mut framed, &e).await;
        return Err(e);
    }

    let result = pump(&mut framed, &mut rx, &handle, link)
        .instrument(spans::peer(&peer.sid, &peer.name))
        .await;
    let reason = match &result {
        Ok(()) => "Link closed".to_string(),
        Err(e) => e.to_string(),
    };
    // Ignored by the manager if it already dropped the link.
    let _ = handle.send(SyncEvent::LinkDown { link, reason }).await;
    result
}

/// Accept inbound server connections on `addr`.
pub async fn listen(
    handle: SyncHandle,
    ctx: Arc<LinkContext>,
    addr: SocketAddr,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "S2S listener started");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept S2S connection");
                continue;
            }
        };
        if handle.is_closed() {
            info!("S2S listener stopping");
            return Ok(());
        }
        info!(peer = %peer_addr, "Inbound S2S connection");

        let handle = handle.clone();
        let ctx = Arc::clone(&ctx);
        tokio::spawn(
            async move {
                let machine = ctx.machine(HandshakeState::InboundReceived);
                if let Err(e) = run_link(handle, Arc::clone(&ctx), stream, machine, Vec::new()).await {
                    warn!(error = %e, "Inbound link ended");
                }
            }
            .instrument(spans::connection(peer_addr, "inbound")),
        );
    }
}

async fn connect_once(
    handle: &SyncHandle,
    ctx: &Arc<LinkContext>,
    block: &LinkBlock,
) -> Result<(), LinkError> {
    let stream = TcpStream::connect(block.address()).await?;
    let peer_addr = stream.peer_addr()?;
    let machine = ctx.machine(HandshakeState::OutboundInitiated);
    let opening = machine.introduction(&block.password);
    run_link(handle.clone(), Arc::clone(ctx), stream, machine, opening)
        .instrument(spans::connection(peer_addr, "outbound"))
        .await
}

/// Keep an autoconnect link up, retrying every `connect_retry`.
pub async fn autoconnect(handle: SyncHandle, ctx: Arc<LinkContext>, block: LinkBlock) {
    loop {
        if handle.is_closed() {
            break;
        }
        if handle.is_known(&block.name).await {
            debug!(server = %block.name, "Already linked, skipping autoconnect");
        } else {
            info!(server = %block.name, address = %block.address(), "Connecting to peer");
            match connect_once(&handle, &ctx, &block).await {
                Ok(()) => info!(server = %block.name, "Link closed"),
                Err(LinkError::ManagerGone) => break,
                Err(e) => warn!(server = %block.name, error = %e, "Link attempt failed"),
            }
        }
        tokio::time::sleep(ctx.connect_retry).await;
    }
}
