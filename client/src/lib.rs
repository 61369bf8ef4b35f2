//! # Lightcycle Arena Client Library
//!
//! A headless client for the arena server. It joins over TCP, keeps the
//! connection alive with periodic heartbeats and decodes the text frames the
//! server pushes every tick.
//!
//! ## Architecture Overview
//!
//! The server is fully authoritative, so the client keeps no simulation of
//! its own. It holds the latest decoded frame and its own seat assignment,
//! and decides when to send movement keys.
//!
//! ### Steering
//! Keys can be forwarded from stdin one byte at a time, chosen by a simple
//! autopilot that turns only when the cell ahead is blocked, or not sent at
//! all for a spectator-style session.
//!
//! ### Reassembly
//! TCP delivers frames in arbitrary pieces. [`tron_shared::FrameBuffer`]
//! buffers partial lines, discards malformed frames and resynchronizes at
//! the next frame start.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The client's view of the arena: assignment, latest frame, one-line
//! summaries and the autopilot.
//!
//! ### Network Module (`network`)
//! Connection retry, the session loop, heartbeats and key forwarding.

pub mod game;
pub mod network;
