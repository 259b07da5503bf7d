//! One authenticated RCON session over one TCP socket.
//!
//! After authentication the framed socket is split into a reader task
//! and a writer task, the same way every connection in this crate is
//! driven. The reader decodes packets in arrival order and hands each
//! one to the correlator under the session lock, so no two packets of a
//! connection are ever processed concurrently.

use std::fmt;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::RconCodec;
use crate::command::Command;
use crate::error::RconError;
use crate::network::options::{ConnectOptions, InFlightPolicy};
use crate::opcode::{PacketType, WireVariant};
use crate::packet::{AUTH_REQUEST_ID, Packet};
use crate::state::{AuthState, ConnectionPhase, Correlator, Dispatch};

/// Packets queued for the writer task before `execute()` waits.
const OUTBOUND_CAPACITY: usize = 100;

type RconFramed<S> = Framed<S, RconCodec>;

// ── ConnectionInfo ───────────────────────────────────────────────

/// Where to connect and with which secret.
#[derive(Clone)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
    password: String,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A connect recipe: everything needed to build a fresh [`Connection`].
#[derive(Debug, Clone)]
pub struct Target {
    pub info: ConnectionInfo,
    pub options: ConnectOptions,
}

impl Target {
    pub fn new(info: ConnectionInfo, options: ConnectOptions) -> Self {
        Self { info, options }
    }

    /// A new, idle connection to this target.
    pub fn connection(&self) -> Connection {
        Connection::new(self.info.clone(), self.options.clone())
    }
}

// ── Shared state ─────────────────────────────────────────────────

struct Inner {
    session: Mutex<Session>,
    /// Cancelled exactly once, when the connection closes.
    closed: CancellationToken,
    /// Single-flight gate; present only for the opcode variant.
    flight: Option<Semaphore>,
}

struct Session {
    phase: ConnectionPhase,
    correlator: Correlator,
    link: Option<Link>,
}

/// The live socket: a sender into the writer task plus both task handles.
struct Link {
    outbound: mpsc::Sender<Packet>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Inner {
    /// Close the connection and reject everything pending with `cause`.
    ///
    /// Runs under one lock acquisition, so every pending request sees
    /// the same outcome. Returns `false` if already closed.
    fn shutdown(&self, cause: RconError) -> bool {
        let mut session = self.session.lock();
        let uptime = session.phase.ready_duration();
        if !session.phase.close() {
            return false;
        }
        let failed = session.correlator.fail_all(&cause);
        if let Some(link) = session.link.take() {
            link.reader.abort();
            link.writer.abort();
        }
        drop(session);

        self.closed.cancel();
        if let Some(flight) = &self.flight {
            flight.close();
        }
        debug!(failed, ?uptime, "connection closed: {cause}");
        true
    }
}

/// Withdraws a pending request if the `execute()` future ends early.
struct PendingGuard<'a> {
    inner: &'a Inner,
    id: i32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.session.lock().correlator.cancel(self.id);
    }
}

// ── Connection ───────────────────────────────────────────────────

/// A single-use RCON session.
///
/// `connect` → `execute`* → `disconnect`. Reconnecting means building
/// a new `Connection`; see [`crate::reconnect`].
pub struct Connection {
    info: ConnectionInfo,
    options: ConnectOptions,
    inner: Arc<Inner>,
    next_id: AtomicI32,
}

impl Connection {
    pub fn new(info: ConnectionInfo, options: ConnectOptions) -> Self {
        let flight = (!options.variant.has_ids()).then(|| Semaphore::new(1));
        let inner = Inner {
            session: Mutex::new(Session {
                phase: ConnectionPhase::Idle,
                correlator: Correlator::new(options.variant),
                link: None,
            }),
            closed: CancellationToken::new(),
            flight,
        };
        Self {
            info,
            options,
            inner: Arc::new(inner),
            next_id: AtomicI32::new(AUTH_REQUEST_ID + 1),
        }
    }

    /// Build and connect in one step.
    pub async fn open(info: ConnectionInfo, options: ConnectOptions) -> Result<Self, RconError> {
        let conn = Self::new(info, options);
        conn.connect().await?;
        Ok(conn)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn variant(&self) -> WireVariant {
        self.options.variant
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.session.lock().phase.clone()
    }

    pub fn auth_state(&self) -> AuthState {
        self.inner.session.lock().phase.auth_state()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.session.lock().phase.is_ready()
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.session.lock().correlator.pending_count()
    }

    /// Resolves once the connection is closed, for whatever reason.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    // ── Connect / Auth ───────────────────────────────────────────

    /// Open the TCP socket and authenticate.
    ///
    /// Resolves once the connection is `Ready`. Fails with
    /// `ConnectTimeout`/`ConnectRefused` if the socket does not come
    /// up, `AuthenticationFailed` if the password is refused, and
    /// `AuthTimeout` if the server never answers the auth packet.
    pub async fn connect(&self) -> Result<(), RconError> {
        self.inner.session.lock().phase.begin_connect()?;
        info!(server = %self.info, variant = %self.options.variant, "connecting");

        let opened = tokio::select! {
            _ = self.inner.closed.cancelled() => Err(RconError::ConnectionClosed),
            result = open_socket(&self.info, self.options.connect_timeout) => result,
        };
        match opened {
            Ok(stream) => self.authenticate(stream).await,
            Err(e) => {
                warn!(server = %self.info, "connect failed: {e}");
                self.inner.shutdown(RconError::ConnectionClosed);
                Err(e)
            }
        }
    }

    /// Authenticate over a stream that is already open.
    pub async fn connect_stream<S>(&self, stream: S) -> Result<(), RconError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.inner.session.lock().phase.begin_connect()?;
        self.authenticate(stream).await
    }

    async fn authenticate<S>(&self, stream: S) -> Result<(), RconError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.inner.session.lock().phase.begin_auth()?;

        let codec =
            RconCodec::new(self.options.variant).with_max_packet_size(self.options.max_packet_size);
        let mut framed = Framed::new(stream, codec);

        let outcome = tokio::select! {
            _ = self.inner.closed.cancelled() => Err(RconError::ConnectionClosed),
            result = exchange_auth(&mut framed, self.info.password(), &self.options) => result,
        };

        match outcome {
            Ok(()) => self.promote(framed),
            Err(e) => {
                if let RconError::AuthenticationFailed(reason) = &e {
                    warn!(server = %self.info, "authentication rejected: {reason}");
                    // Fails only if a disconnect already closed us.
                    let _ = self.inner.session.lock().phase.fail_auth();
                }
                self.inner.shutdown(e.clone());
                Err(e)
            }
        }
    }

    /// Move to `Ready` and hand the socket to the reader/writer tasks.
    fn promote<S>(&self, framed: RconFramed<S>) -> Result<(), RconError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut session = self.inner.session.lock();
        session.phase.complete_auth()?;

        let (sink, stream) = framed.split();
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        // Tasks block on the session lock until the link is stored.
        let writer = tokio::spawn(write_loop(sink, rx, Arc::clone(&self.inner)));
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&self.inner)));
        session.link = Some(Link {
            outbound,
            reader,
            writer,
        });

        info!(server = %self.info, "authenticated");
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Run a console command with the default timeout.
    pub async fn execute(&self, command: &str) -> Result<String, RconError> {
        self.execute_command(Command::exec(command)).await
    }

    /// Run a typed command with the default timeout.
    pub async fn execute_command(&self, command: Command) -> Result<String, RconError> {
        self.execute_with_timeout(command, self.options.command_timeout)
            .await
    }

    /// Send `command` and wait up to `timeout` for its response body.
    ///
    /// Dropping the returned future withdraws the request; a response
    /// that arrives afterwards is logged and discarded.
    ///
    /// On the opcode variant a timeout also closes the connection:
    /// responses carry no id, so once one may never arrive the
    /// remaining ones can no longer be paired with their commands.
    pub async fn execute_with_timeout(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<String, RconError> {
        if !self.is_ready() {
            return Err(RconError::NotConnected);
        }
        let _slot = self.acquire_slot().await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let packet = command.to_packet(self.options.variant, id)?;
        let label = command.to_string();
        let (reply, response) = oneshot::channel();

        let outbound = {
            let mut session = self.inner.session.lock();
            if !session.phase.is_ready() {
                return Err(RconError::NotConnected);
            }
            let outbound = session
                .link
                .as_ref()
                .map(|link| link.outbound.clone())
                .ok_or(RconError::NotConnected)?;
            session.correlator.track(id, label.clone(), timeout, reply)?;
            outbound
        };
        let _pending = PendingGuard {
            inner: &self.inner,
            id,
        };

        debug!(id, command = %label, "sending command");
        outbound
            .send(packet)
            .await
            .map_err(|_| RconError::ConnectionClosed)?;

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RconError::ConnectionClosed),
            Err(_) => {
                warn!(id, command = %label, ?timeout, "command timed out");
                let error = RconError::CommandTimeout {
                    command: label,
                    timeout,
                };
                if !self.options.variant.has_ids() {
                    self.inner.session.lock().correlator.cancel(id);
                    self.inner.shutdown(error.clone());
                }
                Err(error)
            }
        }
    }

    /// Take the single-flight slot on the opcode variant.
    async fn acquire_slot(&self) -> Result<Option<SemaphorePermit<'_>>, RconError> {
        let Some(flight) = &self.inner.flight else {
            return Ok(None);
        };
        let permit = match self.options.in_flight {
            InFlightPolicy::Queue => flight
                .acquire()
                .await
                .map_err(|_| RconError::ConnectionClosed)?,
            InFlightPolicy::Reject => flight.try_acquire().map_err(|e| match e {
                TryAcquireError::NoPermits => RconError::CommandAlreadyInFlight,
                TryAcquireError::Closed => RconError::ConnectionClosed,
            })?,
        };
        Ok(Some(permit))
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Close the socket and reject every pending request with
    /// `ConnectionClosed`. Calling it again is a no-op.
    pub fn disconnect(&self) {
        if self.inner.shutdown(RconError::ConnectionClosed) {
            info!(server = %self.info, "disconnected");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.inner.shutdown(RconError::ConnectionClosed);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("variant", &self.options.variant)
            .field("phase", &self.phase())
            .finish()
    }
}

// ── Socket / auth helpers ────────────────────────────────────────

/// Open a TCP socket to `info` within `timeout`.
pub(crate) async fn open_socket(
    info: &ConnectionInfo,
    timeout: Duration,
) -> Result<TcpStream, RconError> {
    let address = info.address();
    let stream = dial(TcpStream::connect(&address), &address, timeout).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Bound a pending connect by `timeout` and sort its failure.
async fn dial<F, S>(connecting: F, address: &str, timeout: Duration) -> Result<S, RconError>
where
    F: Future<Output = io::Result<S>>,
{
    match tokio::time::timeout(timeout, connecting).await {
        Err(_) => Err(RconError::ConnectTimeout(timeout)),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
            Err(RconError::ConnectRefused(address.to_owned()))
        }
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(stream)) => Ok(stream),
    }
}

/// Send the auth packet and judge the first reply.
pub(crate) async fn exchange_auth<S>(
    framed: &mut RconFramed<S>,
    password: &str,
    options: &ConnectOptions,
) -> Result<(), RconError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed
        .send(Packet::auth(options.variant, password)?)
        .await
        .map_err(lost_during_auth)?;

    let reply = tokio::time::timeout(options.auth_timeout, next_auth_reply(framed, options.variant))
        .await
        .map_err(|_| RconError::AuthTimeout(options.auth_timeout))??;

    judge_auth(&reply, options)
}

/// The first packet that answers the auth request.
///
/// Source servers send an empty `RESPONSE_VALUE` ahead of the real
/// `AUTH_RESPONSE`; that one is skipped.
async fn next_auth_reply<S>(
    framed: &mut RconFramed<S>,
    variant: WireVariant,
) -> Result<Packet, RconError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = framed.next().await {
        let packet = frame.map_err(lost_during_auth)?;
        if variant == WireVariant::Source
            && packet.packet_type() == Some(PacketType::RESPONSE_VALUE)
            && !packet.is_auth_failure()
        {
            debug!("skipping empty response ahead of auth reply");
            continue;
        }
        return Ok(packet);
    }
    Err(RconError::AuthenticationFailed(
        "server closed the connection during authentication".into(),
    ))
}

pub(crate) fn judge_auth(reply: &Packet, options: &ConnectOptions) -> Result<(), RconError> {
    match options.variant {
        WireVariant::Source if reply.is_auth_failure() => Err(RconError::AuthenticationFailed(
            "server answered with id -1".into(),
        )),
        WireVariant::Source => Ok(()),
        WireVariant::Opcode if options.auth_matcher.accepts(reply) => Ok(()),
        WireVariant::Opcode => Err(RconError::AuthenticationFailed(format!(
            "unexpected reply {:?}",
            reply.text()
        ))),
    }
}

/// A socket that dies mid-handshake is a refusal, not a transport bug.
fn lost_during_auth(e: RconError) -> RconError {
    match e {
        RconError::Io(io) => RconError::AuthenticationFailed(format!(
            "connection lost during authentication: {io}"
        )),
        other => other,
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn write_loop<S>(
    mut sink: SplitSink<RconFramed<S>, Packet>,
    mut rx: mpsc::Receiver<Packet>,
    inner: Arc<Inner>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(packet) = rx.recv().await {
        if let Err(e) = sink.send(packet).await {
            error!("write failed: {e}");
            inner.shutdown(RconError::ConnectionClosed);
            return;
        }
    }
}

async fn read_loop<S>(mut stream: SplitStream<RconFramed<S>>, inner: Arc<Inner>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cause = loop {
        match stream.next().await {
            Some(Ok(packet)) => {
                if packet.is_auth_failure() {
                    break RconError::AuthenticationFailed(
                        "server revoked the session (id -1)".into(),
                    );
                }
                let outcome = inner.session.lock().correlator.dispatch(&packet);
                match outcome {
                    Dispatch::Delivered { id } => debug!(id, "response delivered"),
                    Dispatch::Stale { id, command } => {
                        warn!(id, "discarding late response to `{command}`")
                    }
                    Dispatch::Unmatched { id } => {
                        warn!(?id, "discarding response with no pending request")
                    }
                }
            }
            Some(Err(RconError::MalformedPacket(reason))) => {
                error!("malformed packet, closing: {reason}");
                break RconError::MalformedPacket(reason);
            }
            Some(Err(e)) => {
                debug!("read failed: {e}");
                break RconError::ConnectionClosed;
            }
            None => {
                debug!("server closed the connection");
                break RconError::ConnectionClosed;
            }
        }
    };
    inner.shutdown(cause);
}

// ── Tests ────────────────────────────────────────────────────────
