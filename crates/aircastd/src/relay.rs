use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use aircast_media::protocol::{ControlMessage, LinkStatus};

pub const DEFAULT_MAX_PROTOCOL_ERRORS: u32 = 8;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Consecutive malformed/out-of-place messages tolerated per connection
    /// before it is dropped. Any valid message resets the count.
    pub max_protocol_errors: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_protocol_errors: DEFAULT_MAX_PROTOCOL_ERRORS,
        }
    }
}

type ConnId = u64;

/// Outbound queue handle for one connection. Forwarding posts here and
/// returns immediately; a per-connection writer task drains the queue, so a
/// slow consumer never blocks traffic of unrelated pairings.
#[derive(Debug, Clone)]
struct PeerHandle {
    conn_id: ConnId,
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    fn send_control(&self, msg: &ControlMessage) {
        if let Ok(json) = msg.encode() {
            let _ = self.tx.send(Message::Text(json.into()));
        }
    }

    fn send_close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

#[derive(Debug)]
struct GuestSlot {
    handle: PeerHandle,
    caller_name: String,
}

#[derive(Debug)]
struct PairingSession {
    host: PeerHandle,
    guest: Option<GuestSlot>,
}

#[derive(Debug, Default)]
struct RelayState {
    // host_id -> live pairing. Last-registered-wins on host_id collisions.
    sessions: HashMap<String, PairingSession>,
}

type SharedState = Arc<Mutex<RelayState>>;

pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: RelayConfig,
}

/// Handle for a relay spawned in the background (tests, embedded use).
pub struct RelayHandle {
    pub local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl RelayServer {
    pub async fn bind(addr: &str, config: RelayConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind relay listener on {addr}"))?;
        let local_addr = listener.local_addr().context("relay local addr")?;
        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept loop. Each connection is handled by its own task; a failure in
    /// one connection never takes the relay down.
    pub async fn run(self) {
        info!(addr = %self.local_addr, "relay listening");
        let state: SharedState = Arc::new(Mutex::new(RelayState::default()));
        let next_conn_id = Arc::new(AtomicU64::new(1));
        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(err = %err, "relay accept failed");
                    continue;
                }
            };
            let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
            let state = state.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, conn_id, state, config).await {
                    debug!(conn_id, peer = %peer_addr, err = %err, "connection ended with error");
                }
            });
        }
    }

    pub fn spawn(self) -> RelayHandle {
        let local_addr = self.local_addr;
        let task = tokio::spawn(self.run());
        RelayHandle { local_addr, task }
    }
}

/// Role a connection currently plays. A connection starts unbound and is
/// promoted by its first accepted control message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnRole {
    Unbound,
    Host { host_id: String },
    Guest { host_id: String },
}

async fn handle_connection(
    stream: TcpStream,
    conn_id: ConnId,
    state: SharedState,
    config: RelayConfig,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake")?;
    let (mut sink, mut reader) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    let handle = PeerHandle {
        conn_id,
        tx: out_tx,
    };
    let mut role = ConnRole::Unbound;
    let mut violations: u32 = 0;

    while let Some(incoming) = reader.next().await {
        let msg = match incoming {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let outcome = match msg {
            Message::Text(text) => on_text(&state, &handle, &mut role, text.as_str()),
            Message::Binary(data) => on_binary(&state, &role, Message::Binary(data)),
            Message::Close(_) => break,
            // tungstenite answers pings internally.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(()),
        };
        match outcome {
            Ok(()) => violations = 0,
            Err(Fault::Report(reason)) => {
                handle.send_control(&ControlMessage::Error {
                    message: reason.clone(),
                });
                violations += 1;
                if violations >= config.max_protocol_errors {
                    warn!(conn_id, reason = %reason, "protocol error budget exhausted");
                    handle.send_close();
                    break;
                }
            }
            Err(Fault::Disconnect(reason)) => {
                handle.send_control(&ControlMessage::Error { message: reason });
                handle.send_close();
                break;
            }
        }
    }

    cleanup_connection(&state, conn_id, &role);
    drop(handle);
    let _ = writer.await;
    Ok(())
}

/// A fault is always reported to the originating connection; `Disconnect`
/// additionally closes it (pairing failures), `Report` leaves it open so
/// the peer can retry, bounded by the violation budget.
enum Fault {
    Report(String),
    Disconnect(String),
}

fn on_text(
    state: &SharedState,
    handle: &PeerHandle,
    role: &mut ConnRole,
    text: &str,
) -> Result<(), Fault> {
    let msg = match ControlMessage::parse(text) {
        Ok(msg) => msg,
        Err(err) => {
            return Err(Fault::Report(format!("malformed control message: {err}")));
        }
    };
    debug!(conn_id = handle.conn_id, tag = msg.tag(), "control message");
    match msg {
        ControlMessage::RegisterHost { host_id } => register_host(state, handle, role, host_id),
        ControlMessage::ConnectGuest {
            target_host_id,
            caller_name,
        } => connect_guest(state, handle, role, target_host_id, caller_name),
        // Anything else from a paired endpoint is relayed verbatim to its
        // peer; the relay does not interpret it.
        other => forward_control(state, role, other, text),
    }
}

fn register_host(
    state: &SharedState,
    handle: &PeerHandle,
    role: &mut ConnRole,
    host_id: String,
) -> Result<(), Fault> {
    if host_id.trim().is_empty() {
        return Err(Fault::Report("host id must not be empty".to_string()));
    }
    if let ConnRole::Guest { .. } = role {
        return Err(Fault::Report(
            "a guest connection cannot register as host".to_string(),
        ));
    }

    let mut guard = state.lock().expect("relay state poisoned");
    // Re-registering under a new id abandons the old binding first.
    if let ConnRole::Host { host_id: old_id } = &*role {
        if *old_id != host_id {
            if let Some(prev) = guard.sessions.remove(old_id) {
                orphan_guest(&prev);
            }
        }
    }
    // Last-registered-wins: an existing binding for this id (stale page,
    // reload) is replaced, and any guest paired to it is orphaned.
    if let Some(prev) = guard.sessions.remove(&host_id) {
        if prev.host.conn_id != handle.conn_id {
            prev.host.send_control(&ControlMessage::Error {
                message: "host id re-registered by another connection".to_string(),
            });
            prev.host.send_close();
        }
        orphan_guest(&prev);
    }
    info!(conn_id = handle.conn_id, host_id = %host_id, "host registered");
    guard.sessions.insert(
        host_id.clone(),
        PairingSession {
            host: handle.clone(),
            guest: None,
        },
    );
    *role = ConnRole::Host { host_id };
    Ok(())
}

fn orphan_guest(session: &PairingSession) {
    if let Some(guest) = &session.guest {
        guest.handle.send_control(&ControlMessage::GuestDisconnected);
        guest.handle.send_close();
    }
}

fn connect_guest(
    state: &SharedState,
    handle: &PeerHandle,
    role: &mut ConnRole,
    target_host_id: String,
    caller_name: String,
) -> Result<(), Fault> {
    if *role != ConnRole::Unbound {
        return Err(Fault::Report(
            "connection is already bound to a pairing".to_string(),
        ));
    }

    let mut guard = state.lock().expect("relay state poisoned");
    let Some(session) = guard.sessions.get_mut(&target_host_id) else {
        return Err(Fault::Disconnect(format!(
            "unknown host id {target_host_id}"
        )));
    };
    if session.guest.is_some() {
        // The existing pairing stays intact; only the second caller is
        // turned away.
        return Err(Fault::Disconnect(format!(
            "host {target_host_id} already has a caller"
        )));
    }

    session.host.send_control(&ControlMessage::GuestConnected {
        caller_name: caller_name.clone(),
    });
    handle.send_control(&ControlMessage::Status {
        status: LinkStatus::Connected,
    });
    info!(conn_id = handle.conn_id, host_id = %target_host_id, caller = %caller_name, "guest paired");
    session.guest = Some(GuestSlot {
        handle: handle.clone(),
        caller_name,
    });
    *role = ConnRole::Guest {
        host_id: target_host_id,
    };
    Ok(())
}

fn forward_control(
    state: &SharedState,
    role: &ConnRole,
    msg: ControlMessage,
    raw: &str,
) -> Result<(), Fault> {
    let Some(peer) = paired_peer(state, role) else {
        return Err(Fault::Report(format!(
            "{} has no paired peer to deliver to",
            msg.tag()
        )));
    };
    // Forward the original text, not a re-serialization.
    let _ = peer.tx.send(Message::Text(raw.to_string().into()));
    Ok(())
}

fn on_binary(state: &SharedState, role: &ConnRole, frame: Message) -> Result<(), Fault> {
    let Some(peer) = paired_peer(state, role) else {
        return Err(Fault::Report(
            "no paired peer for audio frame".to_string(),
        ));
    };
    let _ = peer.tx.send(frame);
    Ok(())
}

/// The opposite endpoint of this connection's pairing, if any. Audio and
/// forwarded control both route through here; an unpaired host simply has
/// no peer yet.
fn paired_peer(state: &SharedState, role: &ConnRole) -> Option<PeerHandle> {
    let guard = state.lock().expect("relay state poisoned");
    match role {
        ConnRole::Unbound => None,
        ConnRole::Host { host_id } => guard
            .sessions
            .get(host_id)
            .and_then(|s| s.guest.as_ref())
            .map(|g| g.handle.clone()),
        ConnRole::Guest { host_id } => guard.sessions.get(host_id).map(|s| s.host.clone()),
    }
}

fn cleanup_connection(state: &SharedState, conn_id: ConnId, role: &ConnRole) {
    let mut guard = state.lock().expect("relay state poisoned");
    match role {
        ConnRole::Unbound => {}
        ConnRole::Host { host_id } => {
            // Only tear down if this connection still owns the binding; a
            // newer registration may have replaced it already.
            let owns = guard
                .sessions
                .get(host_id)
                .map(|s| s.host.conn_id == conn_id)
                .unwrap_or(false);
            if owns {
                if let Some(session) = guard.sessions.remove(host_id) {
                    // A guest paired to a dead host is meaningless; close it
                    // rather than letting it time out.
                    orphan_guest(&session);
                    info!(conn_id, host_id = %host_id, "host disconnected, pairing removed");
                }
            }
        }
        ConnRole::Guest { host_id } => {
            if let Some(session) = guard.sessions.get_mut(host_id) {
                let occupied_by_me = session
                    .guest
                    .as_ref()
                    .map(|g| g.handle.conn_id == conn_id)
                    .unwrap_or(false);
                if occupied_by_me {
                    let caller = session
                        .guest
                        .take()
                        .map(|g| g.caller_name)
                        .unwrap_or_default();
                    session.host.send_control(&ControlMessage::GuestDisconnected);
                    info!(conn_id, host_id = %host_id, caller = %caller, "guest disconnected");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::{SplitSink, SplitStream};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
    type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

    async fn spawn_relay() -> RelayHandle {
        let server = RelayServer::bind("127.0.0.1:0", RelayConfig::default())
            .await
            .expect("bind relay");
        server.spawn()
    }

    async fn connect(url: &str) -> (WsSink, WsReader) {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("connect to relay");
        ws.split()
    }

    async fn send(sink: &mut WsSink, msg: &ControlMessage) {
        sink.send(Message::Text(msg.encode().expect("encode").into()))
            .await
            .expect("send control");
    }

    async fn recv_control(reader: &mut WsReader) -> ControlMessage {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), reader.next())
                .await
                .expect("timed out waiting for control message")
                .expect("connection closed")
                .expect("websocket error");
            match msg {
                Message::Text(text) => {
                    return ControlMessage::parse(text.as_str()).expect("parse control")
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("expected control message, got {other:?}"),
            }
        }
    }

    async fn recv_binary(reader: &mut WsReader) -> Vec<u8> {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), reader.next())
                .await
                .expect("timed out waiting for audio frame")
                .expect("connection closed")
                .expect("websocket error");
            match msg {
                Message::Binary(data) => return data.to_vec(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("expected audio frame, got {other:?}"),
            }
        }
    }

    async fn expect_closed(reader: &mut WsReader) {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), reader.next())
                .await
                .expect("timed out waiting for close")
            {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    }

    fn register(host_id: &str) -> ControlMessage {
        ControlMessage::RegisterHost {
            host_id: host_id.to_string(),
        }
    }

    fn connect_guest_msg(host_id: &str, caller: &str) -> ControlMessage {
        ControlMessage::ConnectGuest {
            target_host_id: host_id.to_string(),
            caller_name: caller.to_string(),
        }
    }

    #[tokio::test]
    async fn pairing_happy_path_notifies_both_sides() {
        let relay = spawn_relay().await;
        let (mut host_tx, mut host_rx) = connect(&relay.ws_url()).await;
        send(&mut host_tx, &register("8X2-A9D")).await;

        let (mut guest_tx, mut guest_rx) = connect(&relay.ws_url()).await;
        send(&mut guest_tx, &connect_guest_msg("8X2-A9D", "Matej")).await;

        assert_eq!(
            recv_control(&mut guest_rx).await,
            ControlMessage::Status {
                status: LinkStatus::Connected
            }
        );
        assert_eq!(
            recv_control(&mut host_rx).await,
            ControlMessage::GuestConnected {
                caller_name: "Matej".to_string()
            }
        );
        relay.shutdown();
    }

    #[tokio::test]
    async fn unknown_host_is_rejected_and_closed() {
        let relay = spawn_relay().await;
        let (mut guest_tx, mut guest_rx) = connect(&relay.ws_url()).await;
        send(&mut guest_tx, &connect_guest_msg("NO-SUCH", "Matej")).await;

        match recv_control(&mut guest_rx).await {
            ControlMessage::Error { message } => assert!(message.contains("unknown host")),
            other => panic!("expected error, got {other:?}"),
        }
        expect_closed(&mut guest_rx).await;
        relay.shutdown();
    }

    #[tokio::test]
    async fn second_guest_rejected_first_pairing_intact() {
        let relay = spawn_relay().await;
        let (mut host_tx, mut host_rx) = connect(&relay.ws_url()).await;
        send(&mut host_tx, &register("7QD-K2M")).await;

        let (mut first_tx, mut first_rx) = connect(&relay.ws_url()).await;
        send(&mut first_tx, &connect_guest_msg("7QD-K2M", "Ana")).await;
        recv_control(&mut first_rx).await;
        recv_control(&mut host_rx).await;

        let (mut second_tx, mut second_rx) = connect(&relay.ws_url()).await;
        send(&mut second_tx, &connect_guest_msg("7QD-K2M", "Bor")).await;
        match recv_control(&mut second_rx).await {
            ControlMessage::Error { message } => assert!(message.contains("already has a caller")),
            other => panic!("expected error, got {other:?}"),
        }
        expect_closed(&mut second_rx).await;

        // First pairing still forwards audio both ways.
        first_tx
            .send(Message::Binary(vec![1u8, 2, 3, 4].into()))
            .await
            .expect("guest audio");
        assert_eq!(recv_binary(&mut host_rx).await, vec![1u8, 2, 3, 4]);
        relay.shutdown();
    }

    #[tokio::test]
    async fn audio_frames_forward_verbatim_in_both_directions() {
        let relay = spawn_relay().await;
        let (mut host_tx, mut host_rx) = connect(&relay.ws_url()).await;
        send(&mut host_tx, &register("HST-AAA")).await;
        let (mut guest_tx, mut guest_rx) = connect(&relay.ws_url()).await;
        send(&mut guest_tx, &connect_guest_msg("HST-AAA", "Matej")).await;
        recv_control(&mut guest_rx).await;
        recv_control(&mut host_rx).await;

        let uplink: Vec<u8> = (0u8..64).collect();
        guest_tx
            .send(Message::Binary(uplink.clone().into()))
            .await
            .expect("uplink");
        assert_eq!(recv_binary(&mut host_rx).await, uplink);

        let downlink = vec![9u8; 32];
        host_tx
            .send(Message::Binary(downlink.clone().into()))
            .await
            .expect("downlink");
        assert_eq!(recv_binary(&mut guest_rx).await, downlink);
        relay.shutdown();
    }

    #[tokio::test]
    async fn host_disconnect_closes_guest_promptly() {
        let relay = spawn_relay().await;
        let (mut host_tx, mut host_rx) = connect(&relay.ws_url()).await;
        send(&mut host_tx, &register("GON-ERR")).await;
        let (mut guest_tx, mut guest_rx) = connect(&relay.ws_url()).await;
        send(&mut guest_tx, &connect_guest_msg("GON-ERR", "Matej")).await;
        recv_control(&mut guest_rx).await;
        recv_control(&mut host_rx).await;

        host_tx.close().await.expect("host close");

        assert_eq!(
            recv_control(&mut guest_rx).await,
            ControlMessage::GuestDisconnected
        );
        expect_closed(&mut guest_rx).await;

        // The pairing is gone: a fresh guest sees unknown host.
        let (mut late_tx, mut late_rx) = connect(&relay.ws_url()).await;
        send(&mut late_tx, &connect_guest_msg("GON-ERR", "Late")).await;
        match recv_control(&mut late_rx).await {
            ControlMessage::Error { message } => assert!(message.contains("unknown host")),
            other => panic!("expected error, got {other:?}"),
        }
        relay.shutdown();
    }

    #[tokio::test]
    async fn guest_disconnect_notifies_host_and_frees_slot() {
        let relay = spawn_relay().await;
        let (mut host_tx, mut host_rx) = connect(&relay.ws_url()).await;
        send(&mut host_tx, &register("RTY-911")).await;
        let (mut guest_tx, mut guest_rx) = connect(&relay.ws_url()).await;
        send(&mut guest_tx, &connect_guest_msg("RTY-911", "Ana")).await;
        recv_control(&mut guest_rx).await;
        recv_control(&mut host_rx).await;

        guest_tx.close().await.expect("guest close");
        assert_eq!(
            recv_control(&mut host_rx).await,
            ControlMessage::GuestDisconnected
        );

        // Slot is free again for a new caller.
        let (mut next_tx, mut next_rx) = connect(&relay.ws_url()).await;
        send(&mut next_tx, &connect_guest_msg("RTY-911", "Bor")).await;
        assert_eq!(
            recv_control(&mut next_rx).await,
            ControlMessage::Status {
                status: LinkStatus::Connected
            }
        );
        relay.shutdown();
    }

    #[tokio::test]
    async fn reregistration_replaces_binding_and_orphans_guest() {
        let relay = spawn_relay().await;
        let (mut old_tx, mut old_rx) = connect(&relay.ws_url()).await;
        send(&mut old_tx, &register("DUP-COD")).await;
        let (mut guest_tx, mut guest_rx) = connect(&relay.ws_url()).await;
        send(&mut guest_tx, &connect_guest_msg("DUP-COD", "Ana")).await;
        recv_control(&mut guest_rx).await;
        recv_control(&mut old_rx).await;

        // A reloaded host page registers the same code from a new connection.
        let (mut new_tx, mut new_rx) = connect(&relay.ws_url()).await;
        send(&mut new_tx, &register("DUP-COD")).await;

        assert_eq!(
            recv_control(&mut guest_rx).await,
            ControlMessage::GuestDisconnected
        );
        expect_closed(&mut guest_rx).await;

        // The new binding accepts callers.
        let (mut fresh_tx, mut fresh_rx) = connect(&relay.ws_url()).await;
        send(&mut fresh_tx, &connect_guest_msg("DUP-COD", "Bor")).await;
        assert_eq!(
            recv_control(&mut fresh_rx).await,
            ControlMessage::Status {
                status: LinkStatus::Connected
            }
        );
        assert_eq!(
            recv_control(&mut new_rx).await,
            ControlMessage::GuestConnected {
                caller_name: "Bor".to_string()
            }
        );
        relay.shutdown();
    }

    #[tokio::test]
    async fn malformed_json_reports_error_but_keeps_connection() {
        let relay = spawn_relay().await;
        let (mut conn_tx, mut conn_rx) = connect(&relay.ws_url()).await;
        conn_tx
            .send(Message::Text("{not json".to_string().into()))
            .await
            .expect("send garbage");
        match recv_control(&mut conn_rx).await {
            ControlMessage::Error { message } => {
                assert!(message.contains("malformed control message"))
            }
            other => panic!("expected error, got {other:?}"),
        }

        // Connection survived: a valid registration still works.
        send(&mut conn_tx, &register("OKP-111")).await;
        let (mut guest_tx, mut guest_rx) = connect(&relay.ws_url()).await;
        send(&mut guest_tx, &connect_guest_msg("OKP-111", "Ana")).await;
        assert_eq!(
            recv_control(&mut guest_rx).await,
            ControlMessage::Status {
                status: LinkStatus::Connected
            }
        );
        relay.shutdown();
    }

    #[tokio::test]
    async fn repeated_violations_exhaust_budget_and_drop_connection() {
        let relay = {
            let server = RelayServer::bind(
                "127.0.0.1:0",
                RelayConfig {
                    max_protocol_errors: 2,
                },
            )
            .await
            .expect("bind relay");
            server.spawn()
        };
        let (mut conn_tx, mut conn_rx) = connect(&relay.ws_url()).await;
        for _ in 0..2 {
            conn_tx
                .send(Message::Text("garbage".to_string().into()))
                .await
                .expect("send garbage");
        }
        // Two error reports, then the relay hangs up.
        recv_control(&mut conn_rx).await;
        recv_control(&mut conn_rx).await;
        expect_closed(&mut conn_rx).await;
        relay.shutdown();
    }

    #[tokio::test]
    async fn empty_host_id_is_rejected() {
        let relay = spawn_relay().await;
        let (mut conn_tx, mut conn_rx) = connect(&relay.ws_url()).await;
        send(&mut conn_tx, &register("  ")).await;
        match recv_control(&mut conn_rx).await {
            ControlMessage::Error { message } => assert!(message.contains("must not be empty")),
            other => panic!("expected error, got {other:?}"),
        }
        relay.shutdown();
    }
}
