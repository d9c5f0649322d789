//! A reliable, ordered, message-oriented transport engine layered over an
//! unreliable, unordered datagram substrate.
//!
//! This crate owns the ARQ state machine only: framing, sequencing,
//! retransmission timing and congestion control. It never touches a socket.
//! An embedder reads datagrams from wherever it likes, demultiplexes them to
//! the right [`control::ControlBlock`] by conversation id (see
//! [`segment::peek_conv`]), hands them to [`control::ControlBlock::input`],
//! and drives the clock with [`control::ControlBlock::update`]. See
//! `demos/udp_send.rs` and `demos/udp_recv.rs` for a worked example over
//! `UdpSocket`.

pub mod config;
pub mod control;
pub mod error;
pub mod segment;
pub mod seq;

pub use config::{Config, NoDelay};
pub use control::ControlBlock;
pub use error::{Error, Result};
pub use segment::peek_conv;
