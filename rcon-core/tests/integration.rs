//! Integration tests: full sessions against scripted fake servers on
//! localhost, for both wire variants.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rcon_core::{
    AuthState, Backoff, Command, ConnectOptions, Connection, ConnectionInfo, InFlightPolicy,
    Opcode, Packet, PacketType, ProbeOutcome, RconCodec, RconError, Supervisor, Target,
    WireVariant, probe,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

const PASSWORD: &str = "CookieMonster420";

type ServerSide<S = TcpStream> = Framed<S, RconCodec>;

// ── Helpers ──────────────────────────────────────────────────────

async fn ephemeral_listener() -> (TcpListener, ConnectionInfo) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, ConnectionInfo::new("127.0.0.1", port, PASSWORD))
}

async fn accept(listener: &TcpListener, variant: WireVariant) -> ServerSide {
    let (stream, _) = listener.accept().await.unwrap();
    Framed::new(stream, RconCodec::new(variant))
}

async fn next_packet<S: AsyncRead + AsyncWrite + Unpin>(server: &mut ServerSide<S>) -> Packet {
    tokio::time::timeout(Duration::from_secs(5), server.next())
        .await
        .expect("timeout waiting for client packet")
        .expect("client hung up")
        .expect("client sent a bad packet")
}

fn text(body: &str) -> Packet {
    Packet::new_opcode(Opcode::ResponseValue, body.to_owned()).unwrap()
}

fn source_reply(id: i32, body: &str) -> Packet {
    Packet::new_source(id, PacketType::RESPONSE_VALUE, body.to_owned()).unwrap()
}

/// Read the auth packet and answer with `reply`.
async fn opcode_login<S: AsyncRead + AsyncWrite + Unpin>(server: &mut ServerSide<S>, reply: &str) {
    let auth = next_packet(server).await;
    assert_eq!(auth.opcode().unwrap(), Opcode::Auth);
    assert_eq!(auth.text(), PASSWORD);
    server.send(text(reply)).await.unwrap();
}

/// Source-style login, including the empty response value that
/// precedes the real auth response.
async fn source_login(server: &mut ServerSide) {
    let auth = next_packet(server).await;
    assert_eq!(auth.packet_type(), Some(PacketType::AUTH));
    assert_eq!(auth.text(), PASSWORD);
    let id = auth.id().unwrap();
    server.send(source_reply(id, "")).await.unwrap();
    server
        .send(Packet::new_source(id, PacketType::AUTH_RESPONSE, "").unwrap())
        .await
        .unwrap();
}

async fn until(mut ready: impl FnMut() -> bool) {
    while !ready() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Opcode variant ───────────────────────────────────────────────

#[tokio::test]
async fn test_login_and_list_players() {
    let (listener, info) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Opcode).await;
        opcode_login(&mut server, "Password Accepted").await;

        let cmd = next_packet(&mut server).await;
        assert_eq!(cmd.opcode().unwrap(), Opcode::ExecCommand);
        assert_eq!(cmd.text(), "listplayers");
        server.send(text("Players: 0")).await.unwrap();

        let cmd = next_packet(&mut server).await;
        assert_eq!(cmd.opcode().unwrap(), Opcode::Announce);
        assert_eq!(cmd.text(), "restart in 5");
        server.send(text("ok")).await.unwrap();
    });

    let conn = Connection::open(info, ConnectOptions::default()).await.unwrap();
    assert!(conn.is_ready());
    assert_eq!(conn.execute("listplayers").await.unwrap(), "Players: 0");
    assert_eq!(
        conn.execute_command(Command::announce("restart in 5"))
            .await
            .unwrap(),
        "ok"
    );
    conn.disconnect();
    server.await.unwrap();
}

#[tokio::test]
async fn test_wrong_password() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Opcode).await;
        opcode_login(&mut server, "Invalid password").await;
    });

    let conn = Connection::new(info, ConnectOptions::default());
    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, RconError::AuthenticationFailed(_)), "{err}");
    assert!(conn.phase().is_closed());
    assert!(matches!(
        conn.execute("listplayers").await,
        Err(RconError::NotConnected)
    ));
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let conn = Connection::new(
        ConnectionInfo::new("127.0.0.1", port, PASSWORD),
        ConnectOptions::default(),
    );
    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, RconError::ConnectRefused(_)), "{err}");
    assert!(err.is_retryable());
    assert!(conn.phase().is_closed());
}

#[tokio::test]
async fn test_execute_while_authenticating_is_rejected() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Opcode).await;
        let _auth = next_packet(&mut server).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        server.send(text("Password Accepted")).await.unwrap();
        // Hold the socket open.
        let _ = server.next().await;
    });

    let conn = Connection::new(info, ConnectOptions::default());
    let (connected, early) = tokio::join!(conn.connect(), async {
        until(|| conn.auth_state() == AuthState::Authenticating).await;
        conn.execute("listplayers").await
    });
    assert!(matches!(early, Err(RconError::NotConnected)));
    connected.unwrap();
    assert!(conn.is_ready());
}

#[tokio::test]
async fn test_late_reply_to_abandoned_command_is_absorbed() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Opcode).await;
        opcode_login(&mut server, "Password Accepted").await;

        assert_eq!(next_packet(&mut server).await.text(), "slow");
        // Only answer once the client has moved on.
        assert_eq!(next_packet(&mut server).await.text(), "fast");
        server.send(text("late answer to slow")).await.unwrap();
        server.send(text("answer to fast")).await.unwrap();
        let _ = server.next().await;
    });

    let conn = Connection::open(info, ConnectOptions::default()).await.unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(100), conn.execute("slow")).await;
    assert!(abandoned.is_err());
    assert_eq!(conn.pending_count(), 0);

    assert_eq!(conn.execute("fast").await.unwrap(), "answer to fast");
    assert!(conn.is_ready());
}

/// Answers every command with `re: <cmd>` except `save`, which it
/// never answers. One session per accepted socket.
async fn serve_all_but_save(listener: TcpListener) {
    loop {
        let mut server = accept(&listener, WireVariant::Opcode).await;
        tokio::spawn(async move {
            opcode_login(&mut server, "Password Accepted").await;
            while let Some(Ok(cmd)) = server.next().await {
                if cmd.text() != "save" {
                    let reply = format!("re: {}", cmd.text());
                    server.send(text(&reply)).await.unwrap();
                }
            }
        });
    }
}

#[tokio::test]
async fn test_unanswered_command_does_not_poison_later_ones() {
    let (listener, info) = ephemeral_listener().await;
    tokio::spawn(serve_all_but_save(listener));

    let options = ConnectOptions::default().with_command_timeout(Duration::from_millis(200));
    let conn = Connection::open(info.clone(), options.clone()).await.unwrap();

    let err = conn.execute("save").await.unwrap_err();
    assert!(matches!(err, RconError::CommandTimeout { .. }), "{err}");
    // Replies carry no id, so pairing is lost: the session is dropped.
    conn.closed().await;
    assert!(matches!(
        conn.execute("listplayers").await,
        Err(RconError::NotConnected)
    ));

    let fresh = Connection::open(info, options).await.unwrap();
    for cmd in ["listplayers", "help", "status"] {
        assert_eq!(fresh.execute(cmd).await.unwrap(), format!("re: {cmd}"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_command_timeout_fires_on_schedule() {
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let mut server = Framed::new(server, RconCodec::new(WireVariant::Opcode));
        opcode_login(&mut server, "Password Accepted").await;
        // Read but never answer.
        while server.next().await.is_some() {}
    });

    let timeout = Duration::from_millis(250);
    let conn = Connection::new(
        ConnectionInfo::new("127.0.0.1", 16007, PASSWORD),
        ConnectOptions::default().with_command_timeout(timeout),
    );
    conn.connect_stream(client).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = conn.execute("save").await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(
        matches!(err, RconError::CommandTimeout { timeout: t, .. } if t == timeout),
        "{err}"
    );
    assert!(elapsed >= timeout, "{elapsed:?}");
    assert!(elapsed < timeout + Duration::from_millis(50), "{elapsed:?}");
}

#[tokio::test]
async fn test_single_flight_queues() {
    let (listener, info) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Opcode).await;
        opcode_login(&mut server, "Password Accepted").await;

        assert_eq!(next_packet(&mut server).await.text(), "one");
        // Nothing else may arrive while "one" is unanswered.
        let early = tokio::time::timeout(Duration::from_millis(150), server.next()).await;
        assert!(early.is_err(), "second command sent before first reply");
        server.send(text("reply one")).await.unwrap();

        assert_eq!(next_packet(&mut server).await.text(), "two");
        server.send(text("reply two")).await.unwrap();
    });

    let conn = Connection::open(info, ConnectOptions::default()).await.unwrap();
    let (one, two) = tokio::join!(conn.execute("one"), async {
        until(|| conn.pending_count() == 1).await;
        conn.execute("two").await
    });
    assert_eq!(one.unwrap(), "reply one");
    assert_eq!(two.unwrap(), "reply two");
    server.await.unwrap();
}

#[tokio::test]
async fn test_single_flight_rejects() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Opcode).await;
        opcode_login(&mut server, "Password Accepted").await;
        assert_eq!(next_packet(&mut server).await.text(), "one");
        tokio::time::sleep(Duration::from_millis(100)).await;
        server.send(text("reply one")).await.unwrap();
        let _ = server.next().await;
    });

    let options = ConnectOptions::default().with_in_flight(InFlightPolicy::Reject);
    let conn = Connection::open(info, options).await.unwrap();
    let (one, two) = tokio::join!(conn.execute("one"), async {
        until(|| conn.pending_count() == 1).await;
        conn.execute("two").await
    });
    assert_eq!(one.unwrap(), "reply one");
    assert!(matches!(two, Err(RconError::CommandAlreadyInFlight)));
}

#[tokio::test]
async fn test_malformed_packet_closes_connection() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Opcode).await;
        opcode_login(&mut server, "Password Accepted").await;
        let _cmd = next_packet(&mut server).await;
        // Size field of zero cannot hold an opcode byte.
        server.get_mut().write_all(&0i32.to_le_bytes()).await.unwrap();
        let _ = server.next().await;
    });

    let conn = Connection::open(info, ConnectOptions::default()).await.unwrap();
    let err = conn.execute("listplayers").await.unwrap_err();
    assert!(matches!(err, RconError::MalformedPacket(_)), "{err}");
    conn.closed().await;
    assert!(conn.phase().is_closed());
}

// ── Source variant ───────────────────────────────────────────────

#[tokio::test]
async fn test_source_replies_out_of_order() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Source).await;
        source_login(&mut server).await;

        let first = next_packet(&mut server).await;
        let second = next_packet(&mut server).await;
        assert_eq!(first.packet_type(), Some(PacketType::EXEC_COMMAND));
        assert_ne!(first.id(), second.id());
        for cmd in [second, first] {
            let reply = source_reply(cmd.id().unwrap(), &format!("re: {}", cmd.text()));
            server.send(reply).await.unwrap();
        }
        let _ = server.next().await;
    });

    let conn = Connection::open(info, ConnectOptions::new(WireVariant::Source))
        .await
        .unwrap();
    let (status, users) = tokio::join!(conn.execute("status"), conn.execute("users"));
    assert_eq!(status.unwrap(), "re: status");
    assert_eq!(users.unwrap(), "re: users");
}

#[tokio::test]
async fn test_dropped_execute_is_withdrawn() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Source).await;
        source_login(&mut server).await;
        let slow = next_packet(&mut server).await;
        let next = next_packet(&mut server).await;
        server.send(source_reply(slow.id().unwrap(), "late")).await.unwrap();
        server.send(source_reply(next.id().unwrap(), "on time")).await.unwrap();
        let _ = server.next().await;
    });

    let conn = Connection::open(info, ConnectOptions::new(WireVariant::Source))
        .await
        .unwrap();
    let abandoned = tokio::time::timeout(Duration::from_millis(50), conn.execute("slow")).await;
    assert!(abandoned.is_err());
    assert_eq!(conn.pending_count(), 0);

    assert_eq!(conn.execute("next").await.unwrap(), "on time");
    assert!(conn.is_ready());
}

#[tokio::test]
async fn test_source_disconnect_fails_every_pending_request() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Source).await;
        source_login(&mut server).await;
        // Never answer.
        while server.next().await.is_some() {}
    });

    let conn = Connection::open(info, ConnectOptions::new(WireVariant::Source))
        .await
        .unwrap();
    let (a, b, ()) = tokio::join!(conn.execute("status"), conn.execute("users"), async {
        until(|| conn.pending_count() == 2).await;
        conn.disconnect();
    });
    assert!(matches!(a, Err(RconError::ConnectionClosed)));
    assert!(matches!(b, Err(RconError::ConnectionClosed)));
    assert_eq!(conn.pending_count(), 0);
}

#[tokio::test]
async fn test_source_auth_failure() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Source).await;
        let _auth = next_packet(&mut server).await;
        server
            .send(Packet::new_source(-1, PacketType::AUTH_RESPONSE, "").unwrap())
            .await
            .unwrap();
    });

    let err = Connection::open(info, ConnectOptions::new(WireVariant::Source))
        .await
        .unwrap_err();
    assert!(matches!(err, RconError::AuthenticationFailed(_)), "{err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_source_session_revoked() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        let mut server = accept(&listener, WireVariant::Source).await;
        source_login(&mut server).await;
        let _cmd = next_packet(&mut server).await;
        server.send(source_reply(-1, "")).await.unwrap();
        let _ = server.next().await;
    });

    let conn = Connection::open(info, ConnectOptions::new(WireVariant::Source))
        .await
        .unwrap();
    let err = conn.execute("status").await.unwrap_err();
    assert!(matches!(err, RconError::AuthenticationFailed(_)), "{err}");
    assert!(conn.phase().is_closed());
}

// ── Probe / reconnect ────────────────────────────────────────────

#[tokio::test]
async fn test_probe_accepted_and_rejected() {
    let (listener, info) = ephemeral_listener().await;

    tokio::spawn(async move {
        for reply in ["Password Accepted", "Invalid password"] {
            let mut server = accept(&listener, WireVariant::Opcode).await;
            opcode_login(&mut server, reply).await;
        }
    });

    let options = ConnectOptions::default();
    let report = probe(&info, &options).await;
    assert_eq!(report.outcome, ProbeOutcome::Accepted);
    assert!(report.is_available());

    let report = probe(&info, &options).await;
    assert!(matches!(report.outcome, ProbeOutcome::Rejected(_)));
}

#[tokio::test]
async fn test_supervisor_waits_for_server() {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = std_listener.local_addr().unwrap().port();
    drop(std_listener);

    // Server comes up a little after the first attempts are refused.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let mut server = accept(&listener, WireVariant::Opcode).await;
        opcode_login(&mut server, "Password Accepted").await;
        let _ = server.next().await;
    });

    let target = Target::new(
        ConnectionInfo::new("127.0.0.1", port, PASSWORD),
        ConnectOptions::default(),
    );
    let supervisor =
        Supervisor::new(target, Backoff::fixed(Duration::from_millis(50))).max_attempts(40);
    let conn = supervisor.connect().await.unwrap();
    assert!(conn.is_ready());
}
