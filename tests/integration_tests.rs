//! Integration tests for the arena server and client
//!
//! These tests run a real server on a loopback port and talk to it over TCP.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tron_client::network::{Client, Steering};
use tron_server::config::ServerConfig;
use tron_server::game::Engine;
use tron_server::ledger::HighScoreLedger;
use tron_server::network::{Server, SharedEngine};
use tron_shared::{Assignment, Direction, Frame, FrameBuffer, ServerMessage};

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        width: 40,
        height: 20,
        tick_ms: 50,
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig) -> (SocketAddr, SharedEngine) {
    let engine = Engine::new(&config, HighScoreLedger::in_memory());
    let server = Server::new(config, engine).await.unwrap();
    let addr = server.local_addr().unwrap();
    let engine = server.engine();
    tokio::spawn(async move { server.run().await });
    (addr, engine)
}

/// Raw TCP peer that decodes whatever the server pushes
struct TestPeer {
    stream: TcpStream,
    decoder: FrameBuffer,
    pending: VecDeque<ServerMessage>,
}

impl TestPeer {
    async fn connect(addr: SocketAddr) -> Self {
        TestPeer {
            stream: TcpStream::connect(addr).await.unwrap(),
            decoder: FrameBuffer::default(),
            pending: VecDeque::new(),
        }
    }

    /// Next decoded message, or `None` on EOF or after two quiet seconds.
    async fn next(&mut self) -> Option<ServerMessage> {
        let mut buffer = [0u8; 4096];
        while self.pending.is_empty() {
            match timeout(Duration::from_secs(2), self.stream.read(&mut buffer)).await {
                Ok(Ok(n)) if n > 0 => self.pending.extend(self.decoder.push(&buffer[..n])),
                _ => return None,
            }
        }
        self.pending.pop_front()
    }

    async fn assignment(&mut self) -> Assignment {
        loop {
            match self.next().await {
                Some(ServerMessage::Assigned(assignment)) => return assignment,
                Some(_) => continue,
                None => panic!("connection ended before an assignment arrived"),
            }
        }
    }

    async fn frame(&mut self) -> Frame {
        loop {
            match self.next().await {
                Some(ServerMessage::State(frame)) => return frame,
                Some(_) => continue,
                None => panic!("connection ended before a frame arrived"),
            }
        }
    }

    /// True if the server closes the connection before `limit` elapses.
    async fn closed_within(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let mut buffer = [0u8; 4096];
        while Instant::now() < deadline {
            match timeout(Duration::from_millis(200), self.stream.read(&mut buffer)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                _ => {}
            }
        }
        false
    }

    async fn send(&mut self, byte: u8) {
        self.stream.write_all(&[byte]).await.unwrap();
    }
}

async fn wait_for_players(engine: &SharedEngine, expected: usize) -> bool {
    for _ in 0..50 {
        if engine.lock().await.player_count() == expected {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// A joining peer gets its seat first, then a full frame containing it
    #[tokio::test]
    async fn join_receives_assignment_and_frame() {
        let (addr, _engine) = start_server(test_config()).await;
        let mut peer = TestPeer::connect(addr).await;

        let assignment = peer.assignment().await;
        assert_eq!(assignment.player_index, 0);
        assert_eq!(assignment.color_index, 0);

        let frame = peer.frame().await;
        assert!(frame.running);
        assert_eq!(frame.width(), 40);
        assert_eq!(frame.height(), 20);
        let me = frame.player(0).expect("own row in frame");
        assert!(me.alive);
        assert_eq!(frame.cell(me.x, me.y), Some(1));
    }

    /// Seats beyond the configured maximum are refused by closing the socket
    #[tokio::test]
    async fn join_beyond_capacity_is_rejected() {
        let (addr, engine) = start_server(test_config()).await;

        let mut peers = Vec::new();
        let mut colors = Vec::new();
        for _ in 0..4 {
            let mut peer = TestPeer::connect(addr).await;
            colors.push(peer.assignment().await.color_index);
            peers.push(peer);
        }
        colors.sort_unstable();
        assert_eq!(colors, vec![0, 1, 2, 3]);

        let mut extra = TestPeer::connect(addr).await;
        assert!(extra.closed_within(Duration::from_secs(3)).await);
        assert_eq!(engine.lock().await.player_count(), 4);
    }

    /// Dropping a connection frees its seat for the next joiner
    #[tokio::test]
    async fn disconnect_frees_slot() {
        let (addr, engine) = start_server(test_config()).await;

        let mut first = TestPeer::connect(addr).await;
        assert_eq!(first.assignment().await.color_index, 0);
        let mut second = TestPeer::connect(addr).await;
        assert_eq!(second.assignment().await.color_index, 1);

        drop(first);
        assert!(wait_for_players(&engine, 1).await);

        // The survivor's frames stop carrying the departed color.
        let mut departed_gone = false;
        for _ in 0..60 {
            let frame = second.frame().await;
            if frame.players.len() == 1 && frame.player(0).is_none() {
                assert!(frame.board.iter().flatten().all(|cell| *cell != 1));
                departed_gone = true;
                break;
            }
        }
        assert!(departed_gone);

        let mut third = TestPeer::connect(addr).await;
        let assignment = third.assignment().await;
        assert_eq!(assignment.color_index, 0);
        assert_eq!(assignment.player_index, 0);
    }

    /// Heartbeats hold the connection open; silence gets it dropped
    #[tokio::test]
    async fn heartbeat_keeps_connection_alive() {
        let config = ServerConfig {
            timeout_ms: 600,
            ..test_config()
        };
        let (addr, engine) = start_server(config).await;
        let mut peer = TestPeer::connect(addr).await;
        peer.assignment().await;

        for _ in 0..10 {
            peer.send(b'h').await;
            sleep(Duration::from_millis(150)).await;
        }
        assert_eq!(engine.lock().await.player_count(), 1);

        assert!(peer.closed_within(Duration::from_secs(3)).await);
        assert!(wait_for_players(&engine, 0).await);
    }
}

/// GAMEPLAY TESTS
mod gameplay_tests {
    use super::*;

    /// A perpendicular key changes the heading the server reports
    #[tokio::test]
    async fn turn_key_changes_heading() {
        let (addr, engine) = start_server(test_config()).await;
        let mut peer = TestPeer::connect(addr).await;
        let assignment = peer.assignment().await;

        let heading = engine
            .lock()
            .await
            .player(assignment.color_index)
            .map(|p| p.direction)
            .unwrap();
        let turn = match heading {
            Direction::Up | Direction::Down => Direction::Left,
            Direction::Left | Direction::Right => Direction::Up,
        };
        peer.send(turn.key()).await;

        let mut turned = false;
        for _ in 0..20 {
            let frame = peer.frame().await;
            if let Some(me) = frame.player(assignment.color_index) {
                if me.alive && Direction::from_delta(me.dx, me.dy) == Some(turn) {
                    turned = true;
                    break;
                }
            }
        }
        assert!(turned);
    }

    /// Frames keep arriving every tick and every alive head sits on its own color
    #[tokio::test]
    async fn frames_stream_each_tick() {
        let (addr, _engine) = start_server(test_config()).await;
        let mut peer = TestPeer::connect(addr).await;
        peer.assignment().await;

        for _ in 0..5 {
            let frame = peer.frame().await;
            for row in frame.players.iter().filter(|p| p.alive) {
                assert_eq!(frame.cell(row.x, row.y), Some(row.color_index as u8 + 1));
            }
        }
    }
}

/// CLIENT LIBRARY TESTS
mod client_tests {
    use super::*;

    /// The library client joins, decodes frames and stops at its frame limit
    #[tokio::test]
    async fn autopilot_client_plays_session() {
        let (addr, engine) = start_server(test_config()).await;

        let mut client = Client::connect(&addr.to_string(), Steering::Autopilot)
            .await
            .unwrap()
            .with_max_frames(Some(5));
        client.run().await.unwrap();

        let state = client.state();
        assert_eq!(state.frames_received, 5);
        assert_eq!(state.assignment.map(|a| a.color_index), Some(0));
        assert!(state.frame.is_some());

        drop(client);
        assert!(wait_for_players(&engine, 0).await);
    }
}
