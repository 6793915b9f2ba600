//! Minitel 1 driver core — STUM M1 over a 1200 baud, 7-bit serial link.
//!
//! This crate sits between an application and a raw byte stream and provides:
//! - a bidirectional protocol engine that parses the terminal's mixed stream
//!   of printable characters, C0 controls, SEP and ESC sequences into typed
//!   [`Event`]s, and emits correctly framed commands the other way;
//! - an asynchronous transaction facility resolving a pending request when a
//!   specific acknowledgement SEP arrives (or times out);
//! - a character-set-aware text layer tracking the terminal's G0/G1 shift
//!   state and compressing repeated glyphs with REP;
//! - a bit-addressable graphics overlay mapping an 80x72 pixel framebuffer
//!   onto the 40x24 grid of G1 semi-graphic cells, flushing only changed
//!   cells.
//!
//! The driver performs no blocking I/O of its own: it consumes bytes and
//! time through the [`ByteStream`] and [`Clock`] traits, so it runs the same
//! against a serial port, a socket, or the in-memory [`LoopbackStream`].

pub mod color;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod graphics;
pub mod loopback;
pub mod parser;
pub mod stream;
pub mod terminal;
pub mod transaction;

// Re-export main types
pub use color::Color;
pub use config::MinitelConfig;
pub use error::{MinitelError, MinitelResult};
pub use event::{Event, EventFifo};
pub use graphics::{DrawMode, FlushMode, MinitelGfx};
pub use loopback::{LoopbackStream, ManualClock};
pub use parser::RxParser;
pub use stream::{ByteStream, Clock, SystemClock};
pub use terminal::{CharSet, LineOptions, LineTerminator, Minitel, SessionState, TextSize};
pub use transaction::{TransactionEngine, TransactionOutcome};
