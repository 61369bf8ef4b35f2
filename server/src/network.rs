//! Server network layer handling TCP connections and the simulation clock

use crate::config::ServerConfig;
use crate::game::{Engine, JoinError, Removal, Seat};
use crate::player::{ConnectionId, Outbox};
use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tron_shared::{Command, POLL_INTERVAL_MS};

/// Frames a connection may have queued before it counts as stalled.
pub const OUTBOX_CAPACITY: usize = 64;

/// Join attempts made while the board has no safe spawn cell.
pub const JOIN_ATTEMPTS: usize = 3;

/// Pause after a failed accept before listening again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub type SharedEngine = Arc<Mutex<Engine>>;

/// Accepts players and drives the tick loop for one arena
pub struct Server {
    listener: TcpListener,
    engine: SharedEngine,
    config: ServerConfig,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        engine: Engine,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            engine: Arc::new(Mutex::new(engine)),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    /// Spawns the fixed-rate simulation task
    fn spawn_tick_loop(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let period = self.config.tick_period();

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let report = engine.lock().await.tick(Instant::now());
                for connection in &report.removed {
                    debug!("Tick evicted connection {}", connection);
                }
            }
        })
    }

    /// Main server loop: one task per accepted connection. Runs until the
    /// future is dropped, which also stops the tick loop.
    pub async fn run(self) {
        let _ticker = TickerGuard(self.spawn_tick_loop());
        info!(
            "Arena {}x{} started, ticking every {:?}",
            self.config.width,
            self.config.height,
            self.config.tick_period()
        );

        let listener = &self.listener;
        loop {
            let (stream, peer) = accept_next(move || listener.accept()).await;
            info!("Client connected from {}", peer);
            let engine = Arc::clone(&self.engine);
            let config = self.config.clone();
            tokio::spawn(handle_connection(stream, peer, engine, config));
        }
    }
}

/// Stops the tick loop once the accept loop is dropped
struct TickerGuard(JoinHandle<()>);

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Waits for the next accepted connection. Failed accepts (aborted
/// handshakes, fd exhaustion) are logged and retried after a short pause.
pub async fn accept_next<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Seats one client, then pumps its input until it leaves or stalls
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    engine: SharedEngine,
    config: ServerConfig,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", peer, e);
    }
    let (reader, writer) = stream.into_split();
    let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
    let mut writer_task = tokio::spawn(write_outbox(writer, inbox));

    let identity = peer.ip().to_string();
    let seat = match join_with_retry(&engine, &identity, outbox, config.tick_period()).await {
        Ok(seat) => seat,
        Err(e) => {
            warn!("Rejected {}: {}", peer, e);
            return;
        }
    };

    let reason = tokio::select! {
        reason = read_commands(reader, &engine, seat.connection, config.connection_timeout()) => reason,
        _ = &mut writer_task => Removal::SendFailed,
    };

    let removed = engine.lock().await.leave(seat.connection, reason);
    if removed.is_empty() {
        debug!("{} ({}) was already removed", peer, seat.connection);
    } else {
        info!("Client {} disconnected: {:?}", peer, reason);
    }
}

/// Tries to seat a client, waiting a tick between attempts while the board
/// is too crowded to spawn.
pub async fn join_with_retry(
    engine: &SharedEngine,
    identity: &str,
    outbox: Outbox,
    retry_period: Duration,
) -> Result<Seat, JoinError> {
    let mut attempt = 1;
    loop {
        let result = engine
            .lock()
            .await
            .join(identity, outbox.clone(), Instant::now());
        match result {
            Err(JoinError::NoSafeSpawn(_)) if attempt < JOIN_ATTEMPTS => {
                debug!(
                    "Join attempt {}/{} for {} found no spawn",
                    attempt, JOIN_ATTEMPTS, identity
                );
                attempt += 1;
                time::sleep(retry_period).await;
            }
            other => return other,
        }
    }
}

/// Drains queued frames onto the socket until every sender is gone
pub async fn write_outbox<W>(mut writer: W, mut inbox: mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(text) = inbox.recv().await {
        if let Err(e) = writer.write_all(text.as_bytes()).await {
            debug!("Write failed: {}", e);
            return Err(e);
        }
    }
    writer.shutdown().await
}

/// Reads single-byte commands until the peer closes, errors or goes quiet
/// for longer than `timeout`.
pub async fn read_commands<R>(
    mut reader: R,
    engine: &SharedEngine,
    connection: ConnectionId,
    timeout: Duration,
) -> Removal
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; 256];
    let poll = Duration::from_millis(POLL_INTERVAL_MS);
    let mut last_seen = time::Instant::now();

    loop {
        match time::timeout(poll, reader.read(&mut buffer)).await {
            Err(_) => {
                if last_seen.elapsed() >= timeout {
                    warn!("Connection {} silent for {:?}", connection, timeout);
                    return Removal::TimedOut;
                }
            }
            Ok(Ok(0)) => return Removal::Disconnected,
            Ok(Ok(n)) => {
                last_seen = time::Instant::now();
                apply_commands(engine, connection, &buffer[..n]).await;
            }
            Ok(Err(e)) => {
                debug!("Read error on {}: {}", connection, e);
                return Removal::Disconnected;
            }
        }
    }
}

async fn apply_commands(engine: &SharedEngine, connection: ConnectionId, bytes: &[u8]) {
    let mut engine = engine.lock().await;
    for byte in bytes {
        match Command::from_byte(*byte) {
            Command::Heartbeat => debug!("Heartbeat from {}", connection),
            Command::Turn(direction) => {
                engine.steer(connection, direction);
            }
            Command::Ignored => {}
        }
    }
}
