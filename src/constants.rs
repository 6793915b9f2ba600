// src/constants.rs
//! Wire-level constants of the STUM M1 protocol.

// ---- C0 control codes ----
pub const C_NUL: u8 = 0x00;
pub const C_BS: u8 = 0x08;
pub const C_HT: u8 = 0x09; // cursor right
pub const C_LF: u8 = 0x0A; // cursor down
pub const C_VT: u8 = 0x0B; // cursor up
pub const C_FF: u8 = 0x0C; // clear screen
pub const C_CR: u8 = 0x0D;
pub const C_SO: u8 = 0x0E; // shift-out, G1 semi-graphics
pub const C_SI: u8 = 0x0F; // shift-in, G0 alphanumerics
pub const C_REP: u8 = 0x12; // repeat last glyph
pub const C_SEP: u8 = 0x13; // two-byte separator prefix
pub const C_CAN: u8 = 0x18; // clear line
pub const C_ESC: u8 = 0x1B;
pub const C_RS: u8 = 0x1E; // home
pub const C_US: u8 = 0x1F; // cursor position prefix
pub const C_DEL: u8 = 0x7F;

// ---- SEP second bytes (function keys and status) ----
pub const SEP_ENVOI: u8 = 0x41; // 4/1 ENVOI / send
pub const SEP_RETOUR: u8 = 0x42; // 4/2 previous
pub const SEP_REPETITION: u8 = 0x43; // 4/3
pub const SEP_GUIDE: u8 = 0x44; // 4/4
pub const SEP_ANNULATION: u8 = 0x45; // 4/5 cancel
pub const SEP_SOMMAIRE: u8 = 0x46; // 4/6 index
pub const SEP_CORRECTION: u8 = 0x47; // 4/7
pub const SEP_SUITE: u8 = 0x48; // 4/8 next
pub const SEP_CONNEXION: u8 = 0x49; // 4/9 Connexion/Fin
pub const SEP_STATUS_PT: u8 = 0x54; // 5/4 session (PT) status change

/// Row/col carried by the session-status SEP 5/4.
pub const SEP_SESSION_ROW: u8 = 5;
pub const SEP_SESSION_COL: u8 = 4;

// ---- PRO3 routing: module codes and controls (ESC 0x3B framing) ----
pub const PRO3_PREFIX: u8 = 0x3B;
pub const PRO3_OFF: u8 = 0x60; // 6/0
pub const PRO3_ON: u8 = 0x61; // 6/1

pub const MOD_SCREEN_TX: u8 = 0x50;
pub const MOD_KEYBOARD_TX: u8 = 0x51;
pub const MOD_MODEM_TX: u8 = 0x52;
pub const MOD_SOCKET_TX: u8 = 0x53;

pub const MOD_SCREEN_RX: u8 = 0x58;
pub const MOD_KEYBOARD_RX: u8 = 0x59;
pub const MOD_MODEM_RX: u8 = 0x5A;
pub const MOD_SOCKET_RX: u8 = 0x5B;

// ---- ESC opcodes the driver emits ----
pub const ESC_CURSOR_REQUEST: u8 = 0x61; // terminal answers US row col

// ---- REP run-length coding parameters ----
/// A run shorter than this is cheaper sent as plain glyphs.
pub const REP_THRESHOLD: usize = 4;
/// Largest count a single REP can carry (count byte 0x20..=0x7E).
pub const REP_MAX_COUNT: usize = 95;
/// Count byte base: a chunk of `k` glyphs is coded as `0x1F + k`.
pub const REP_COUNT_BASE: u8 = 0x1F;

// ---- Screen geometry ----
pub const SCREEN_ROWS: u8 = 24;
pub const SCREEN_COLS: u8 = 40;
