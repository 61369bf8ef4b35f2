use crate::game::ClientGameState;
use log::{info, warn};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tron_shared::{Command, FrameBuffer, ServerMessage, HEARTBEAT, HEARTBEAT_INTERVAL_MS};

pub const CONNECT_ATTEMPTS: usize = 3;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Where steering decisions come from.
#[derive(Debug)]
pub enum Steering {
    /// Raw key bytes, typically forwarded from stdin.
    Keys(mpsc::Receiver<u8>),
    /// Turn only when the cell ahead is blocked.
    Autopilot,
    /// Never steer.
    Passive,
}

pub async fn connect_with_retry(
    server: &str,
    attempts: usize,
    delay: Duration,
) -> io::Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(server).await {
            Ok(stream) => {
                info!("Connected to {}", server);
                return Ok(stream);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "Connection attempt {}/{} to {} failed: {}",
                    attempt, attempts, server, e
                );
                attempt += 1;
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct Client<R, W> {
    reader: R,
    writer: W,
    steering: Steering,
    heartbeat: Duration,
    max_frames: Option<usize>,
    state: ClientGameState,
    decoder: FrameBuffer,
}

impl Client<tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf> {
    pub async fn connect(server: &str, steering: Steering) -> io::Result<Self> {
        let stream = connect_with_retry(server, CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Client::new(reader, writer, steering))
    }
}

impl<R, W> Client<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, steering: Steering) -> Self {
        Client {
            reader,
            writer,
            steering,
            heartbeat: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            max_frames: None,
            state: ClientGameState::new(),
            decoder: FrameBuffer::default(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Stops the session after this many frames.
    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn state(&self) -> &ClientGameState {
        &self.state
    }

    async fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        self.writer.write_all(&[byte]).await?;
        self.writer.flush().await
    }

    fn done(&self) -> bool {
        self.max_frames
            .map_or(false, |max| self.state.frames_received >= max)
    }

    async fn handle_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        for message in self.decoder.push(bytes) {
            let is_frame = matches!(message, ServerMessage::State(_));
            self.state.apply(message);
            if !is_frame {
                continue;
            }

            info!("{}", self.state.summary());
            if matches!(self.steering, Steering::Autopilot) {
                if let Some(turn) = self.state.choose_turn() {
                    self.send_byte(turn.key()).await?;
                }
            }
        }
        Ok(())
    }

    /// Runs until the server closes the connection or the frame limit is hit.
    pub async fn run(&mut self) -> io::Result<()> {
        // First heartbeat goes out one interval after the session starts.
        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buffer = vec![0u8; 4096];

        while !self.done() {
            tokio::select! {
                biased;

                _ = heartbeat.tick() => {
                    self.send_byte(HEARTBEAT).await?;
                },

                result = self.reader.read(&mut buffer) => {
                    match result? {
                        0 => {
                            info!("Server closed the connection");
                            break;
                        }
                        n => self.handle_bytes(&buffer[..n]).await?,
                    }
                },

                key = next_key(&mut self.steering) => {
                    match key {
                        Some(byte) => {
                            if let Command::Turn(_) = Command::from_byte(byte) {
                                self.send_byte(byte).await?;
                            }
                        }
                        None => self.steering = Steering::Passive,
                    }
                },
            }
        }

        let _ = self.writer.shutdown().await;
        Ok(())
    }
}

/// Resolves with the next key in keyboard mode; pends forever otherwise.
async fn next_key(steering: &mut Steering) -> Option<u8> {
    match steering {
        Steering::Keys(keys) => keys.recv().await,
        Steering::Autopilot | Steering::Passive => std::future::pending().await,
    }
}
