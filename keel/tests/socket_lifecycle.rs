//! End-to-end socket tests over TCP loopback.

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use compio::buf::BufResult;
use compio::runtime::Task;
use keel::prelude::*;
use keel::{Metadata, PeerInfo, PlainAuthenticator, ProtocolEngine, Transport, ZmtpError};
use keel_core::monitor::SocketMonitor;
use keel_core::transport::Listener;
use keel_zmtp::codec::{encode_frame, FLAG_COMMAND, FLAG_MORE};
use keel_zmtp::command::{encode_command, encode_ready};
use keel_zmtp::greeting::ZmtpGreeting;

async fn listening_endpoint(events: &SocketMonitor) -> String {
    loop {
        if let SocketEvent::Listening(endpoint) = events.recv_async().await.unwrap() {
            return endpoint.to_string();
        }
    }
}

fn spawn_bind(server: &Rc<Socket>) -> Task<keel::Result<TransportAddr>> {
    let server = server.clone();
    compio::runtime::spawn(async move { server.bind("tcp://127.0.0.1:0").await })
}

/// Greeting plus READY for a raw NULL peer.
fn null_preamble(socket_type: &str, as_server: bool) -> Vec<u8> {
    let mut props = Metadata::new();
    props.insert("Socket-Type", socket_type.to_string());
    let mut wire = ZmtpGreeting::new("NULL", as_server).encode();
    wire.extend_from_slice(&encode_frame(FLAG_COMMAND, &encode_ready(&props)));
    wire
}

async fn read_until_eof(transport: &mut Transport) -> usize {
    let mut total = 0;
    loop {
        let BufResult(res, _) = transport.read(Vec::with_capacity(256)).await;
        match res {
            Ok(0) | Err(_) => return total,
            Ok(n) => total += n,
        }
    }
}

fn client_with(options: SocketOptions) -> Socket {
    Socket::with_options(SocketType::Client, SecurityMechanism::Null, options)
}

#[compio::test]
async fn test_role_checks_happen_before_io() {
    let client = keel::new_client(SecurityMechanism::Null);
    let server = keel::new_server(SecurityMechanism::Null);

    // Unroutable/invalid endpoints prove no parsing or dialing happened
    let err = client.bind("not an endpoint").await.unwrap_err();
    assert!(err.is_invalid_action());
    let err = server.connect("not an endpoint").await.unwrap_err();
    assert!(matches!(
        err,
        KeelError::InvalidSocketAction {
            action: "connect",
            socket_type: SocketType::Server
        }
    ));

    assert_eq!(client.connection_count().await, 0);
    assert_eq!(server.connection_count().await, 0);
}

#[compio::test]
async fn test_invalid_endpoint() {
    let client = keel::new_client(SecurityMechanism::Null);
    let err = client.connect("tcp//127.0.0.1:1").await.unwrap_err();
    assert!(matches!(err, KeelError::Endpoint(_)));
}

#[compio::test]
async fn test_bind_port_zero_then_ping() {
    keel::dev_tracing::init_tracing();

    let mut server = keel::new_server(SecurityMechanism::Null);
    let events = server.monitor();
    let server = Rc::new(server);
    let bind = spawn_bind(&server);

    let endpoint = listening_endpoint(&events).await;
    let client = keel::new_client(SecurityMechanism::Null);
    client.connect(&endpoint).await.unwrap();

    let local = bind.await.unwrap();
    assert_eq!(local.to_endpoint().to_string(), endpoint);
    assert_eq!(server.connection_count().await, 1);
    assert_eq!(client.connection_count().await, 1);

    client.send("ping").await.unwrap();
    assert_eq!(server.recv().await.unwrap(), "ping");

    server.send("pong").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), "pong");
}

#[compio::test]
async fn test_messages_arrive_in_order() {
    let mut server = keel::new_server(SecurityMechanism::Null);
    let events = server.monitor();
    let server = Rc::new(server);
    let bind = spawn_bind(&server);

    let client = keel::new_client(SecurityMechanism::Null);
    client.connect(&listening_endpoint(&events).await).await.unwrap();
    bind.await.unwrap();

    for i in 0..50u32 {
        client.send(format!("msg-{i}")).await.unwrap();
    }
    for i in 0..50u32 {
        assert_eq!(server.recv().await.unwrap(), format!("msg-{i}").as_str());
    }
}

#[compio::test]
async fn test_send_targets_first_connection() {
    let mut server = keel::new_server(SecurityMechanism::Null);
    let events = server.monitor();
    let server = Rc::new(server);

    let bind = compio::runtime::spawn({
        let server = server.clone();
        async move {
            server.bind("tcp://127.0.0.1:0").await?;
            server.bind("tcp://127.0.0.1:0").await?;
            Ok::<_, KeelError>(())
        }
    });

    let options = SocketOptions::default().with_recv_timeout(Duration::from_millis(200));
    let first = client_with(options.clone());
    let second = client_with(options);
    first.connect(&listening_endpoint(&events).await).await.unwrap();
    second.connect(&listening_endpoint(&events).await).await.unwrap();
    bind.await.unwrap();
    assert_eq!(server.connection_count().await, 2);

    server.send("only-first").await.unwrap();
    server.send("again").await.unwrap();
    assert_eq!(first.recv().await.unwrap(), "only-first");
    assert_eq!(first.recv().await.unwrap(), "again");
    assert!(matches!(second.recv().await, Err(KeelError::Timeout(_))));

    // Fan-in: both connections feed the one inbound stream
    first.send("from-first").await.unwrap();
    second.send("from-second").await.unwrap();
    let mut got = HashSet::new();
    got.insert(server.recv().await.unwrap());
    got.insert(server.recv().await.unwrap());
    assert!(got.contains("from-first".as_bytes()));
    assert!(got.contains("from-second".as_bytes()));
}

#[compio::test]
async fn test_send_without_connection() {
    let client = keel::new_client(SecurityMechanism::Null);
    assert!(matches!(
        client.send("nobody").await,
        Err(KeelError::NotConnected)
    ));
}

#[compio::test]
async fn test_connect_retries_until_listener_appears() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let endpoint = format!("tcp://127.0.0.1:{port}");

    let mut client = client_with(
        SocketOptions::default().with_reconnect_ivl(Duration::from_millis(20)),
    );
    let events = client.monitor();
    let client = Rc::new(client);

    let connect = compio::runtime::spawn({
        let client = client.clone();
        let endpoint = endpoint.clone();
        async move { client.connect(&endpoint).await }
    });

    // At least one dial failed before anything listens
    loop {
        if let SocketEvent::ConnectRetried { attempt, delay, .. } = events.recv_async().await.unwrap() {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(20));
            break;
        }
    }

    let server = keel::new_server(SecurityMechanism::Null);
    server.bind(&endpoint).await.unwrap();
    connect.await.unwrap();

    client.send("late").await.unwrap();
    assert_eq!(server.recv().await.unwrap(), "late");
}

#[compio::test]
async fn test_connect_attempt_cap() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let client = client_with(
        SocketOptions::default()
            .with_reconnect_ivl(Duration::from_millis(5))
            .with_connect_attempts(3),
    );

    let err = client
        .connect(&format!("tcp://127.0.0.1:{port}"))
        .await
        .unwrap_err();
    assert!(matches!(err, KeelError::ConnectRetriesExhausted { attempts: 3, .. }));
    assert_eq!(client.connection_count().await, 0);
}

#[compio::test]
async fn test_connect_deadline() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let client = client_with(
        SocketOptions::default()
            .with_reconnect_ivl(Duration::from_millis(10))
            .with_connect_timeout(Duration::from_millis(100)),
    );

    let err = client
        .connect(&format!("tcp://127.0.0.1:{port}"))
        .await
        .unwrap_err();
    assert!(matches!(err, KeelError::ConnectTimeout { .. }));
}

#[compio::test]
async fn test_bind_address_in_use() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut server = keel::new_server(SecurityMechanism::Null);
    let events = server.monitor();

    let err = server
        .bind(&format!("tcp://127.0.0.1:{port}"))
        .await
        .unwrap_err();
    assert!(matches!(err, KeelError::Io(_)));
    assert!(err.local_addr().is_none());
    assert_eq!(server.connection_count().await, 0);
    assert!(matches!(
        events.try_recv().unwrap(),
        SocketEvent::BindFailed { .. }
    ));
}

#[compio::test]
async fn test_close_is_idempotent_and_final() {
    let listener = Listener::bind(&Endpoint::parse("tcp://127.0.0.1:0").unwrap())
        .await
        .unwrap();
    let endpoint = listener.local_addr().unwrap().to_endpoint().to_string();
    let peer = compio::runtime::spawn(async move {
        let mut raw = listener.accept().await.unwrap();
        raw.write_all(null_preamble("SERVER", true)).await.unwrap();
        raw
    });

    let mut client = keel::new_client(SecurityMechanism::Null);
    let events = client.monitor();
    client.connect(&endpoint).await.unwrap();
    let mut raw = peer.await;

    client.close().await;
    client.close().await;
    assert!(client.is_closed().await);

    // The peer sees our greeting and READY, then EOF
    let seen = compio::time::timeout(Duration::from_secs(5), read_until_eof(&mut raw))
        .await
        .expect("peer never saw EOF");
    assert!(seen >= 64);

    assert!(matches!(client.send("x").await, Err(KeelError::SocketClosed)));
    assert!(matches!(client.recv().await, Err(KeelError::SocketClosed)));
    assert!(matches!(
        client.connect(&endpoint).await,
        Err(KeelError::SocketClosed)
    ));
    // The record stays, closed
    assert_eq!(client.connection_count().await, 1);

    let closed_events = events
        .drain()
        .filter(|e| matches!(e, SocketEvent::Closed))
        .count();
    assert_eq!(closed_events, 1);
}

#[compio::test]
async fn test_close_aborts_blocked_send() {
    let listener = Listener::bind(&Endpoint::parse("tcp://127.0.0.1:0").unwrap())
        .await
        .unwrap();
    let endpoint = listener.local_addr().unwrap().to_endpoint().to_string();
    // Completes the handshake, then never reads again
    let peer = compio::runtime::spawn(async move {
        let mut raw = listener.accept().await.unwrap();
        raw.write_all(null_preamble("SERVER", true)).await.unwrap();
        raw
    });

    let client = Rc::new(keel::new_client(SecurityMechanism::Null));
    client.connect(&endpoint).await.unwrap();
    let _raw = peer.await;

    let sender = client.clone();
    let send = compio::runtime::spawn(async move {
        sender.send(vec![0u8; 64 * 1024 * 1024]).await
    });
    compio::time::sleep(Duration::from_millis(100)).await;

    // The pending write does not hold the socket lock
    assert_eq!(client.connection_count().await, 1);
    assert!(!client.is_closed().await);

    compio::time::timeout(Duration::from_secs(3), client.close())
        .await
        .expect("close waited on a blocked send");
    assert!(client.is_closed().await);

    let result = compio::time::timeout(Duration::from_secs(3), send)
        .await
        .expect("send never finished after close");
    assert!(result.is_err());
}

#[compio::test]
async fn test_recv_drains_queue_after_close() {
    let mut server = keel::new_server(SecurityMechanism::Null);
    let events = server.monitor();
    let server = Rc::new(server);
    let bind = spawn_bind(&server);

    let client = keel::new_client(SecurityMechanism::Null);
    client.connect(&listening_endpoint(&events).await).await.unwrap();
    bind.await.unwrap();

    client.send("a").await.unwrap();
    client.send("b").await.unwrap();
    compio::time::sleep(Duration::from_millis(100)).await;

    server.close().await;
    assert_eq!(server.recv().await.unwrap(), "a");
    assert_eq!(server.recv().await.unwrap(), "b");
    assert!(matches!(server.recv().await, Err(KeelError::SocketClosed)));
}

#[compio::test]
async fn test_commands_and_errors_pass_through_recv() {
    let mut server = keel::new_server(SecurityMechanism::Null);
    let events = server.monitor();
    let server = Rc::new(server);
    let bind = spawn_bind(&server);

    let endpoint = Endpoint::parse(&listening_endpoint(&events).await).unwrap();
    let mut raw = Transport::dial(&endpoint).await.unwrap();

    let mut wire = null_preamble("CLIENT", false);
    wire.extend_from_slice(&encode_frame(FLAG_COMMAND, &encode_command(b"PING", b"")));
    wire.extend_from_slice(&encode_frame(0, b"data"));
    wire.extend_from_slice(&encode_frame(FLAG_MORE, b"part"));
    raw.write_all(wire).await.unwrap();
    bind.await.unwrap();

    let msg = server.recv_message().await.unwrap();
    assert_eq!(msg.kind, MessageKind::Command);
    assert_eq!(msg.body.as_ref(), b"\x04PING");

    assert_eq!(server.recv().await.unwrap(), "data");
    assert!(matches!(server.recv().await, Err(KeelError::Protocol(_))));
}

#[compio::test]
async fn test_plain_sockets() {
    let auth = PlainAuthenticator::new().with_user("admin", "secret");
    let mut server = keel::new_server(SecurityMechanism::PlainServer(auth));
    let events = server.monitor();
    let server = Rc::new(server);
    let bind = spawn_bind(&server);

    let client = keel::new_client(SecurityMechanism::plain_client("admin", "secret"));
    client.connect(&listening_endpoint(&events).await).await.unwrap();
    bind.await.unwrap();

    client.send("authenticated").await.unwrap();
    assert_eq!(server.recv().await.unwrap(), "authenticated");
}

#[compio::test]
async fn test_bind_handshake_failure_keeps_address() {
    let auth = PlainAuthenticator::new().with_user("admin", "secret");
    let mut server = keel::new_server(SecurityMechanism::PlainServer(auth));
    let events = server.monitor();
    let server = Rc::new(server);
    let bind = spawn_bind(&server);

    let endpoint = listening_endpoint(&events).await;
    let client = keel::new_client(SecurityMechanism::plain_client("admin", "wrong"));
    let err = client.connect(&endpoint).await.unwrap_err();
    assert!(matches!(err, KeelError::Authentication(_)));

    let err = bind.await.unwrap_err();
    let local = err.local_addr().expect("bind error keeps the listener address");
    assert_eq!(local.to_endpoint().to_string(), endpoint);
    assert!(matches!(
        err,
        KeelError::BindHandshake { ref source, .. } if matches!(**source, KeelError::Authentication(_))
    ));

    assert_eq!(server.connection_count().await, 0);
    assert_eq!(client.connection_count().await, 0);
}

#[compio::test]
async fn test_handshake_timeout() {
    let listener = Listener::bind(&Endpoint::parse("tcp://127.0.0.1:0").unwrap())
        .await
        .unwrap();
    let endpoint = listener.local_addr().unwrap().to_endpoint().to_string();

    // Accepts, then says nothing
    let silent = compio::runtime::spawn(async move { listener.accept().await });

    let client = client_with(
        SocketOptions::default().with_handshake_timeout(Duration::from_millis(100)),
    );
    let err = client.connect(&endpoint).await.unwrap_err();
    assert!(matches!(err, KeelError::HandshakeTimeout(d) if d == Duration::from_millis(100)));
    assert_eq!(client.connection_count().await, 0);
    drop(silent);
}

thread_local! {
    static CLOSED_ENGINES: Cell<u32> = const { Cell::new(0) };
}

/// Engine whose handshake always fails.
struct RefusingEngine {
    transport: Option<Transport>,
}

#[async_trait::async_trait(?Send)]
impl ProtocolEngine for RefusingEngine {
    fn new(transport: Transport, _options: &SocketOptions) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    async fn prepare(
        &mut self,
        _mechanism: &SecurityMechanism,
        _socket_type: SocketType,
        _as_server: bool,
        _extra: Option<&Metadata>,
    ) -> Result<PeerInfo, ZmtpError> {
        Err(ZmtpError::Protocol("refusing every peer"))
    }

    fn recv(&mut self, _inbound: flume::Sender<Message>) {}

    async fn send_frame(&mut self, _body: Bytes) -> Result<(), ZmtpError> {
        Err(ZmtpError::Closed)
    }

    async fn close(&mut self) {
        CLOSED_ENGINES.with(|closed| closed.set(closed.get() + 1));
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.shutdown().await;
        }
    }
}

#[compio::test]
async fn test_failed_handshake_releases_connection() {
    let listener = Listener::bind(&Endpoint::parse("tcp://127.0.0.1:0").unwrap())
        .await
        .unwrap();
    let endpoint = listener.local_addr().unwrap().to_endpoint().to_string();
    let peer = compio::runtime::spawn(async move { listener.accept().await.unwrap() });

    let mut client: Socket<RefusingEngine> =
        Socket::with_engine(SocketType::Client, SecurityMechanism::Null, SocketOptions::default());
    let events = client.monitor();

    let err = client.connect(&endpoint).await.unwrap_err();
    assert!(matches!(err, KeelError::Protocol(_)));
    assert_eq!(client.connection_count().await, 0);
    assert_eq!(CLOSED_ENGINES.with(Cell::get), 1);
    assert!(events
        .drain()
        .any(|e| matches!(e, SocketEvent::HandshakeFailed { .. })));

    // The transport was shut down, so the peer reads EOF
    let mut raw = peer.await;
    let seen = compio::time::timeout(Duration::from_secs(5), read_until_eof(&mut raw))
        .await
        .expect("transport was left open");
    assert_eq!(seen, 0);
}
