//! Sync manager: the single owner of network state.
//!
//! One tokio task runs [`SyncManager::run`]. Link tasks, the keepalive
//! ticker and the HTTP surface only ever talk to it through
//! [`SyncHandle`]. Each [`SyncEvent`] is handled to completion before the
//! next one is looked at, so the topology never sees two writers.
//!
//! Outbound lines are queued with `try_send`. A link whose queue is full
//! is closed with "SendQ exceeded" once the current event is done.

use super::burst;
use super::handshake::RemotePeer;
use super::keepalive::{self, KeepaliveAction};
use super::protocol::{Command, Line, ServerIntro, UserIntro};
use crate::config::Config;
use crate::error::LinkError;
use crate::metrics;
use crate::state::{EventBus, NoticeLog, TopologyEvent, User, UserManager, XLine, XLineStore};
use serde::Serialize;
use slirc_tree::{
    BanRules, BurstHooks, Clock, LinkId, LocalServer, NewServer, NodeId, NoticeClass, NoticeSink,
    ServerId, SplitPolicy, Topology, TopologyOptions,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Server notices kept in memory.
const NOTICE_HISTORY: usize = 128;

/// Everything the manager needs from the configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub local: LocalServer,
    /// Seconds between pings on a direct link.
    pub ping_freq: i64,
    /// Seconds without PONG before a latency warning. 0 disables.
    pub ping_warn_time: i64,
    pub policy: SplitPolicy,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            local: LocalServer {
                name: config.server.name.clone(),
                sid: ServerId::new(config.server.sid.clone()),
                description: config.server.description.clone(),
                version: format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            },
            ping_freq: config.linking.ping_freq as i64,
            ping_warn_time: config.linking.ping_warn_time as i64,
            policy: SplitPolicy {
                quiet_bursts: config.linking.quiet_bursts,
                hide_splits: config.linking.hide_splits,
            },
        }
    }
}

/// One row of the network map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntry {
    pub name: String,
    pub sid: String,
    pub description: String,
    pub version: String,
    pub hops: u32,
    pub users: u32,
    pub opers: u32,
    pub bursting: bool,
    pub hidden: bool,
    pub rtt_ms: i64,
}

/// Messages for the sync manager.
#[derive(Debug)]
pub enum SyncEvent {
    /// A handshake finished. The reply says whether the peer was accepted.
    LinkUp {
        link: LinkId,
        peer: RemotePeer,
        tx: mpsc::Sender<Arc<Line>>,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    /// A line arrived on an established link.
    Inbound { link: LinkId, line: Line },
    /// The connection behind a link is gone.
    LinkDown { link: LinkId, reason: String },
    /// Keepalive timer.
    Tick,
    /// Is a server of this name anywhere in the tree?
    IsKnown {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    Map {
        reply: oneshot::Sender<Vec<MapEntry>>,
    },
    /// Close every link and stop.
    Shutdown { reason: String },
}

/// Cloneable sender side of the manager's queue.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncEvent>,
    next_link: Arc<AtomicU64>,
}

impl SyncHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            tx,
            next_link: Arc::new(AtomicU64::new(1)),
        };
        (handle, rx)
    }

    pub fn next_link_id(&self) -> LinkId {
        LinkId(self.next_link.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn send(&self, event: SyncEvent) -> Result<(), LinkError> {
        self.tx.send(event).await.map_err(|_| LinkError::ManagerGone)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn is_known(&self, name: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let event = SyncEvent::IsKnown {
            name: name.to_string(),
            reply,
        };
        if self.send(event).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn map(&self) -> Option<Vec<MapEntry>> {
        let (reply, rx) = oneshot::channel();
        self.send(SyncEvent::Map { reply }).await.ok()?;
        rx.await.ok()
    }
}

/// A direct link as the manager sees it.
#[derive(Debug)]
pub(super) struct LinkHandle {
    pub(super) node: NodeId,
    pub(super) name: String,
    pub(super) tx: mpsc::Sender<Arc<Line>>,
}

pub struct SyncManager {
    pub(super) settings: SyncSettings,
    pub(super) topology: Topology,
    pub(super) users: UserManager,
    pub(super) bans: XLineStore,
    pub(super) notices: NoticeLog,
    pub(super) events: EventBus,
    pub(super) links: HashMap<LinkId, LinkHandle>,
    overflowed: Vec<LinkId>,
}

impl SyncManager {
    pub fn new(settings: SyncSettings, clock: Box<dyn Clock>, events: EventBus) -> Self {
        let topology = Topology::new(
            settings.local.clone(),
            clock,
            TopologyOptions {
                ping_freq: settings.ping_freq,
            },
        );
        Self {
            settings,
            topology,
            users: UserManager::new(events.clone()),
            bans: XLineStore::new(),
            notices: NoticeLog::new(NOTICE_HISTORY),
            events,
            links: HashMap::new(),
            overflowed: Vec::new(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn users(&self) -> &UserManager {
        &self.users
    }

    pub fn bans(&self) -> &XLineStore {
        &self.bans
    }

    pub fn notices(&self) -> &NoticeLog {
        &self.notices
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<SyncEvent>) {
        info!(server = %self.settings.local.name, sid = %self.settings.local.sid, "Sync manager started");
        self.update_gauges();
        while let Some(event) = rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        info!("Sync manager stopped");
    }

    /// Apply one event. Returns `false` once the manager should stop.
    pub fn handle(&mut self, event: SyncEvent) -> bool {
        let keep_running = match event {
            SyncEvent::LinkUp {
                link,
                peer,
                tx,
                reply,
            } => {
                let result = self.link_up(link, peer, tx);
                if reply.send(result).is_err() {
                    // The link task is gone; nobody will report it down.
                    self.link_lost(link, "Link task ended during handshake");
                }
                true
            }
            SyncEvent::Inbound { link, line } => {
                self.inbound(link, line);
                true
            }
            SyncEvent::LinkDown { link, reason } => {
                self.link_lost(link, &reason);
                true
            }
            SyncEvent::Tick => {
                self.tick();
                true
            }
            SyncEvent::IsKnown { name, reply } => {
                let _ = reply.send(self.topology.find_by_name(&name).is_some());
                true
            }
            SyncEvent::Map { reply } => {
                let _ = reply.send(self.map());
                true
            }
            SyncEvent::Shutdown { reason } => {
                let links: Vec<LinkId> = self.links.keys().copied().collect();
                for link in links {
                    self.close_link(link, &reason);
                }
                false
            }
        };

        while let Some(link) = self.overflowed.pop() {
            warn!(%link, "SendQ exceeded");
            metrics::record_link_error("sendq");
            self.close_link(link, "SendQ exceeded");
        }
        keep_running
    }

    pub fn map(&self) -> Vec<MapEntry> {
        self.topology
            .subtree(self.topology.root_id())
            .into_iter()
            .filter_map(|id| {
                let node = self.topology.get(id)?;
                Some(MapEntry {
                    name: node.name().to_string(),
                    sid: node.sid().to_string(),
                    description: node.description().to_string(),
                    version: node.version().to_string(),
                    hops: self.topology.hops(id),
                    users: node.user_count(),
                    opers: node.oper_count(),
                    bursting: node.is_bursting(),
                    hidden: node.is_hidden(),
                    rtt_ms: node.rtt_ms(),
                })
            })
            .collect()
    }

    pub(super) fn local_sid(&self) -> &str {
        self.settings.local.sid.as_str()
    }

    pub(super) fn update_gauges(&self) {
        metrics::set_topology(self.topology.server_count(), self.links.len());
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    pub(super) fn send_to(&mut self, link: LinkId, line: Arc<Line>) {
        let Some(handle) = self.links.get(&link) else {
            return;
        };
        match handle.tx.try_send(line) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                if !self.overflowed.contains(&link) {
                    self.overflowed.push(link);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%link, "Link task already gone");
            }
        }
    }

    /// Send to every direct link except `except`.
    pub(super) fn broadcast(&mut self, line: Arc<Line>, except: Option<LinkId>) {
        let targets: Vec<LinkId> = self
            .links
            .keys()
            .copied()
            .filter(|link| Some(*link) != except)
            .collect();
        for link in targets {
            self.send_to(link, Arc::clone(&line));
        }
    }

    /// Send towards the server named by `target` (SID or name).
    fn forward(&mut self, target: &str, line: Arc<Line>, from: LinkId) {
        let node = self
            .topology
            .find_by_sid(target)
            .or_else(|| self.topology.find_by_name(target));
        let route = node.and_then(|id| self.topology.get(id)).and_then(|n| n.link());
        match route {
            Some(link) if link != from => self.send_to(link, line),
            Some(_) => warn!(%from, to = target, "Refusing to route a line back where it came from"),
            None => debug!(to = target, command = %line.command, "No route to target"),
        }
    }

    // ------------------------------------------------------------------
    // Link lifecycle
    // ------------------------------------------------------------------

    fn link_up(
        &mut self,
        link: LinkId,
        peer: RemotePeer,
        tx: mpsc::Sender<Arc<Line>>,
    ) -> Result<(), LinkError> {
        let root = self.topology.root_id();
        let created = self.topology.create_server(NewServer {
            name: peer.name.clone(),
            sid: ServerId::new(peer.sid.clone()),
            description: peer.description.clone(),
            parent: root,
            link: Some(link),
            hidden: peer.hidden,
        });
        let node = match created {
            Ok(node) => node,
            Err(e) => {
                warn!(server = %peer.name, sid = %peer.sid, error = %e, "Refusing link");
                self.notices.notice(
                    NoticeClass::LinkLocal,
                    &format!("Link with \x02{}\x02 refused: {}", peer.name, e),
                );
                metrics::record_link_error("loop");
                return Err(LinkError::Loop {
                    name: peer.name,
                    sid: peer.sid,
                });
            }
        };

        info!(server = %peer.name, sid = %peer.sid, %link, "Server linked, bursting");
        self.links.insert(
            link,
            LinkHandle {
                node,
                name: peer.name.clone(),
                tx,
            },
        );
        self.notices.notice(
            NoticeClass::LinkLocal,
            &format!("Bursting to \x02{}\x02 ({})", peer.name, peer.sid),
        );
        self.events.publish(TopologyEvent::ServerLinked {
            name: peer.name.clone(),
            sid: peer.sid.clone(),
        });

        let now = self.topology.now_secs();
        for line in burst::build(&self.topology, &self.users, &self.bans, node, now) {
            self.send_to(link, Arc::new(line));
        }

        let intro = Command::Sid(ServerIntro {
            name: peer.name,
            hops: self.topology.hops(node) + 1,
            sid: peer.sid,
            description: peer.description,
            hidden: peer.hidden,
        })
        .into_line(Some(self.local_sid()));
        self.broadcast(Arc::new(intro), Some(link));

        self.update_gauges();
        Ok(())
    }

    /// The connection behind `link` is gone. Safe to call more than once.
    pub(super) fn link_lost(&mut self, link: LinkId, reason: &str) {
        let Some(handle) = self.links.remove(&link) else {
            return;
        };
        info!(server = %handle.name, %link, reason, "Lost server link");
        self.notices.notice(
            NoticeClass::LinkLocal,
            &format!("Lost link to \x02{}\x02: {}", handle.name, reason),
        );

        let sid = self.topology.get(handle.node).map(|n| n.sid().to_string());
        self.netsplit(handle.node, reason);
        if let Some(sid) = sid {
            let squit = Command::Squit {
                target: sid,
                reason: reason.to_string(),
            }
            .into_line(Some(self.local_sid()));
            self.broadcast(Arc::new(squit), None);
        }
    }

    /// Close a link from our side: tell the peer why, then drop it.
    pub(super) fn close_link(&mut self, link: LinkId, reason: &str) {
        if let Some(handle) = self.links.get(&link) {
            let error = Command::Error {
                message: format!("Closing link: {reason}"),
            }
            .into_line(None);
            // A full queue may be why we are closing.
            let _ = handle.tx.try_send(Arc::new(error));
        }
        self.link_lost(link, reason);
    }

    fn reject_link(&mut self, link: LinkId, error: LinkError) {
        warn!(%link, error = %error, "Dropping link");
        metrics::record_link_error(error.error_code());
        let reason = error.peer_message().unwrap_or_else(|| error.to_string());
        self.close_link(link, &reason);
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    fn inbound(&mut self, link: LinkId, line: Line) {
        let Some(peer) = self.links.get(&link).map(|l| l.node) else {
            debug!(%link, command = %line.command, "Line from a closed link");
            return;
        };
        let command = match Command::from_line(&line) {
            Ok(command) => command,
            Err(e) => {
                self.reject_link(link, e.into());
                return;
            }
        };

        // Server lines carry a SID prefix, user lines a UID whose first
        // three characters are the SID of the user's server.
        let source = match line.prefix.as_deref() {
            None => Some(peer),
            Some(prefix) => self
                .topology
                .find_by_sid(prefix.get(..3).unwrap_or(prefix)),
        };
        let Some(source) = source else {
            debug!(%link, prefix = ?line.prefix, command = %line.command, "Line from unknown source");
            return;
        };
        if self.topology.route_of(source) != Some(peer) {
            let error = LinkError::Protocol(format!(
                "{} from {} arrived from the wrong direction",
                line.command,
                line.prefix.as_deref().unwrap_or("?")
            ));
            self.reject_link(link, error);
            return;
        }

        let line = Arc::new(line);
        match command {
            Command::Pass { .. } | Command::Server(_) => {
                let error = LinkError::Protocol(format!("unexpected {} after handshake", line.command));
                self.reject_link(link, error);
            }
            Command::Sid(intro) => self.on_sid(link, source, intro, line),
            Command::Uid(user) => self.on_uid(link, source, user, line),
            Command::Quit { .. } => self.on_quit(link, line),
            Command::Squit { target, reason } => self.on_squit(link, peer, &target, &reason, line),
            Command::Eob => self.on_eob(link, source, line),
            Command::Ping {
                origin,
                destination,
            } => self.on_ping(link, origin, destination, line),
            Command::Pong { destination, .. } => self.on_pong(link, source, destination, line),
            Command::Version { text } => {
                self.topology.set_version(source, text);
                self.broadcast(line, Some(link));
            }
            Command::Gline {
                mask,
                duration,
                reason,
            } => self.on_gline(link, source, mask, duration, reason, line),
            Command::Error { message } => {
                warn!(%link, message = %message, "Peer sent ERROR");
                self.link_lost(link, &format!("Remote error: {message}"));
            }
            Command::Other(name) => {
                debug!(%link, command = %name, "Relaying unhandled command");
                self.broadcast(line, Some(link));
            }
        }
    }

    fn on_sid(&mut self, link: LinkId, parent: NodeId, intro: ServerIntro, line: Arc<Line>) {
        let parent_name = self
            .topology
            .get(parent)
            .map(|n| n.name().to_string())
            .unwrap_or_default();
        let created = self.topology.create_server(NewServer {
            name: intro.name.clone(),
            sid: ServerId::new(intro.sid.clone()),
            description: intro.description,
            parent,
            link: Some(link),
            hidden: intro.hidden,
        });
        match created {
            Ok(_) => {
                debug!(server = %intro.name, sid = %intro.sid, parent = %parent_name, "Server introduced");
                self.notices.notice(
                    NoticeClass::LinkRemote,
                    &format!(
                        "Server \x02{}\x02 ({}) introduced by \x02{}\x02",
                        intro.name, intro.sid, parent_name
                    ),
                );
                self.broadcast(line, Some(link));
                self.update_gauges();
            }
            Err(e) => {
                warn!(server = %intro.name, sid = %intro.sid, error = %e, "Duplicate server introduced");
                self.reject_link(
                    link,
                    LinkError::Loop {
                        name: intro.name,
                        sid: intro.sid,
                    },
                );
            }
        }
    }

    fn on_uid(&mut self, link: LinkId, server: NodeId, intro: UserIntro, line: Arc<Line>) {
        let Some(server_name) = self.topology.get(server).map(|n| n.name().to_string()) else {
            return;
        };
        let user = User {
            uid: intro.uid,
            nick: intro.nick,
            user: intro.user,
            host: intro.host,
            realname: intro.realname,
            modes: intro.modes,
            ts: intro.ts,
            server: server_name,
            local: false,
        };
        let oper = user.is_oper();
        match self.users.add(user) {
            Ok(()) => {
                self.topology.adjust_user_count(server, 1);
                if oper {
                    self.topology.adjust_oper_count(server, 1);
                }
                self.broadcast(line, Some(link));
            }
            Err(user) => {
                warn!(uid = %user.uid, nick = %user.nick, "Ignoring UID that collides with a known user");
            }
        }
    }

    fn on_quit(&mut self, link: LinkId, line: Arc<Line>) {
        let Some(uid) = line.prefix.as_deref() else {
            return;
        };
        let Some(user) = self.users.remove(uid) else {
            debug!(uid, "QUIT for unknown user");
            return;
        };
        if let Some(server) = self.topology.find_by_name(&user.server) {
            self.topology.adjust_user_count(server, -1);
            if user.is_oper() {
                self.topology.adjust_oper_count(server, -1);
            }
        }
        self.broadcast(line, Some(link));
    }

    fn on_squit(&mut self, link: LinkId, peer: NodeId, target: &str, reason: &str, line: Arc<Line>) {
        let node = self
            .topology
            .find_by_sid(target)
            .or_else(|| self.topology.find_by_name(target));
        match node {
            None => debug!(server = target, "SQUIT for a server that is already gone"),
            Some(node) if node == self.topology.root_id() || node == peer => {
                self.link_lost(link, reason);
            }
            Some(node) if self.topology.route_of(node) == Some(peer) => {
                self.netsplit(node, reason);
                self.broadcast(line, Some(link));
            }
            Some(_) => warn!(%link, server = target, "Ignoring SQUIT for a server behind another link"),
        }
    }

    fn on_eob(&mut self, link: LinkId, server: NodeId, line: Arc<Line>) {
        let mut hooks = BurstHooks {
            bans: &mut self.bans,
            notices: &mut self.notices,
            events: &mut self.events,
        };
        if let Some(report) = self.topology.finish_burst(server, &mut hooks) {
            info!(server = %report.name, duration_ms = report.duration_ms, direct = report.direct, "End of burst");
            if report.direct {
                metrics::record_burst(report.duration_ms);
            }
        }
        self.broadcast(line, Some(link));
    }

    fn on_ping(&mut self, link: LinkId, origin: String, destination: Option<String>, line: Arc<Line>) {
        match destination {
            Some(dest) if dest != self.local_sid() && !dest.eq_ignore_ascii_case(&self.settings.local.name) => {
                self.forward(&dest, line, link);
            }
            _ => {
                let pong = Command::Pong {
                    origin: self.local_sid().to_string(),
                    destination: Some(origin),
                }
                .into_line(Some(self.local_sid()));
                self.send_to(link, Arc::new(pong));
            }
        }
    }

    fn on_pong(&mut self, link: LinkId, source: NodeId, destination: Option<String>, line: Arc<Line>) {
        match destination {
            Some(dest) if dest != self.local_sid() && !dest.eq_ignore_ascii_case(&self.settings.local.name) => {
                self.forward(&dest, line, link);
            }
            _ => {
                if let Some(rtt) = self.topology.record_pong(source) {
                    debug!(%link, rtt_ms = rtt, "PONG");
                }
            }
        }
    }

    fn on_gline(
        &mut self,
        link: LinkId,
        source: NodeId,
        mask: String,
        duration: i64,
        reason: String,
        line: Arc<Line>,
    ) {
        let Some(node) = self.topology.get(source) else {
            return;
        };
        let bursting = node.is_bursting();
        let setter = node.name().to_string();
        self.bans.queue(XLine {
            mask,
            reason,
            setter,
            set_at: self.topology.now_secs(),
            duration,
        });
        if !bursting {
            self.bans.apply_pending();
        }
        self.broadcast(line, Some(link));
    }

    // ------------------------------------------------------------------
    // Keepalive
    // ------------------------------------------------------------------

    fn tick(&mut self) {
        let now = self.topology.now_secs();
        let now_ms = self.topology.now_millis();
        let actions = keepalive::check(
            &self.topology,
            now,
            self.settings.ping_freq,
            self.settings.ping_warn_time,
        );

        for action in actions {
            match action {
                KeepaliveAction::SendPing(node) => {
                    let Some((link, sid)) = self
                        .topology
                        .get(node)
                        .and_then(|n| Some((n.link()?, n.sid().to_string())))
                    else {
                        continue;
                    };
                    let ping = Command::Ping {
                        origin: self.local_sid().to_string(),
                        destination: Some(sid),
                    }
                    .into_line(Some(self.local_sid()));
                    self.topology.set_next_ping_time(node, now + self.settings.ping_freq);
                    self.topology.mark_ping_sent(node, now_ms);
                    self.topology.set_warned(node, false);
                    self.send_to(link, Arc::new(ping));
                }
                KeepaliveAction::Warn(node) => {
                    let Some(name) = self.topology.get(node).map(|n| n.name().to_string()) else {
                        continue;
                    };
                    self.topology.set_warned(node, true);
                    warn!(server = %name, "High latency on link");
                    self.notices.notice(
                        NoticeClass::LinkLocal,
                        &format!(
                            "Server \x02{}\x02 has not responded to PING for {} seconds, high latency.",
                            name, self.settings.ping_warn_time
                        ),
                    );
                }
                KeepaliveAction::Timeout(node) => {
                    let Some((name, link)) = self
                        .topology
                        .get(node)
                        .map(|n| (n.name().to_string(), n.link()))
                    else {
                        continue;
                    };
                    self.notices.notice(
                        NoticeClass::LinkLocal,
                        &format!("Server \x02{name}\x02 pinged out"),
                    );
                    metrics::record_ping_timeout();
                    if let Some(link) = link {
                        self.close_link(link, "Ping timeout");
                    }
                }
            }
        }

        let expired = self.bans.prune_expired(now);
        if expired > 0 {
            debug!(count = expired, "Expired G-lines removed");
        }
    }
}
