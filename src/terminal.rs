// src/terminal.rs
//! The Minitel driver — coordinates transport, parsing, transactions and
//! the transmit engine.
//!
//! One [`Minitel`] instance wraps one byte stream. The application calls
//! [`Minitel::poll`] from its main loop; everything else is either a
//! non-blocking command emitter or a thin blocking helper looping over
//! `poll` and the event FIFO.

use tracing::{debug, trace};

use crate::color::Color;
use crate::config::MinitelConfig;
use crate::constants::*;
use crate::error::{MinitelError, MinitelResult};
use crate::event::{Event, EventFifo};
use crate::parser::RxParser;
use crate::stream::{ByteStream, Clock, SystemClock};
use crate::transaction::{TransactionEngine, TransactionOutcome};

/// Which character set the terminal currently has selected.
///
/// Tracked locally so shift bytes (SI/SO) are elided when the target set is
/// already current. `US`-based cursor moves, FF and RS reset the terminal to
/// G0, and the tracker follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharSet {
    /// Alphanumerics.
    G0,
    /// Six-sub-pixel semi-graphic glyphs.
    G1,
}

/// Session lifecycle around the PT line.
///
/// `start_session`/`end_session` are invoked by the external PT/TP
/// collaborator when it asserts or releases the line; receipt of the
/// SEP 5/4 status change advances the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Double-size attribute opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TextSize {
    Normal = 0x4C,
    DoubleHeight = 0x4D,
    DoubleWidth = 0x4E,
    Double = 0x4F,
}

/// How a completed `read_line` ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineTerminator {
    /// CR or LF.
    Newline,
    /// The ENVOI function key (SEP 4/1).
    Envoi,
}

/// Options for [`Minitel::read_line`].
#[derive(Clone, Debug)]
pub struct LineOptions {
    /// Overall deadline in milliseconds; 0 means no deadline.
    pub timeout_ms: u32,
    /// Terminate on the ENVOI key as well as CR/LF.
    pub stop_on_envoi: bool,
    /// Echo accepted characters (and edits) back to the terminal.
    pub echo: bool,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            stop_on_envoi: true,
            echo: false,
        }
    }
}

pub struct Minitel<S: ByteStream, C: Clock = SystemClock> {
    io: S,
    clock: C,
    config: MinitelConfig,
    parser: RxParser,
    events: EventFifo,
    transactions: TransactionEngine,
    session: SessionState,
    current_set: CharSet,
}

impl<S: ByteStream> Minitel<S> {
    /// Wrap a stream with the wall clock and default configuration.
    pub fn new(io: S) -> Self {
        Self::with_clock(io, SystemClock::new())
    }
}

impl<S: ByteStream, C: Clock> Minitel<S, C> {
    pub fn with_clock(io: S, clock: C) -> Self {
        Self::with_clock_and_config(io, clock, MinitelConfig::default())
    }

    pub fn with_clock_and_config(io: S, clock: C, config: MinitelConfig) -> Self {
        let events = EventFifo::new(config.event_capacity);
        Self {
            io,
            clock,
            config,
            parser: RxParser::new(),
            events,
            transactions: TransactionEngine::new(),
            session: SessionState::Closed,
            current_set: CharSet::G0,
        }
    }

    // ------------------------------------------------------------------
    // Polling and the unified event API
    // ------------------------------------------------------------------

    /// Drain the stream into the parser, then tick the transaction engine.
    ///
    /// Non-blocking; call it often from the application loop.
    pub fn poll(&mut self) {
        while let Some(byte) = self.io.read_byte() {
            if let Some(event) = self.parser.feed(byte) {
                self.dispatch_event(event);
            }
        }
        self.transactions.check_timeout(self.clock.now_ms());
    }

    fn dispatch_event(&mut self, event: Event) {
        if let Event::Sep { row, col, .. } = event {
            self.transactions.on_sep(row, col);
            if row == SEP_SESSION_ROW && col == SEP_SESSION_COL {
                self.apply_session_sep();
            }
        }
        self.events.push(event);
    }

    pub fn event_available(&self) -> bool {
        !self.events.is_empty()
    }

    /// Pop the next parsed event, if any.
    pub fn read_event(&mut self) -> Option<Event> {
        self.events.pop()
    }

    /// Block until an event arrives or `timeout_ms` elapses (0 = no
    /// deadline). On deadline the returned event is [`Event::Timeout`].
    pub fn wait_event(&mut self, timeout_ms: u32) -> Event {
        let start = self.clock.now_ms();
        loop {
            self.poll();
            if let Some(event) = self.events.pop() {
                return event;
            }
            if timeout_ms > 0 && self.clock.now_ms().wrapping_sub(start) > timeout_ms {
                return Event::Timeout;
            }
        }
    }

    /// Block for the next `Char` event; other events are discarded.
    pub fn read_char(&mut self, timeout_ms: u32) -> MinitelResult<u8> {
        let start = self.clock.now_ms();
        loop {
            let remaining = if timeout_ms == 0 {
                0
            } else {
                let elapsed = self.clock.now_ms().wrapping_sub(start);
                if elapsed >= timeout_ms {
                    return Err(MinitelError::Timeout(timeout_ms));
                }
                timeout_ms - elapsed
            };
            match self.wait_event(remaining) {
                Event::Char(c) => return Ok(c),
                Event::Timeout => return Err(MinitelError::Timeout(timeout_ms)),
                _ => {}
            }
        }
    }

    /// Line editor over the unified event stream.
    ///
    /// Accepts printables up to `max_len`, BS edits, CR/LF terminates, and
    /// the ENVOI key terminates when `options.stop_on_envoi`. On timeout the
    /// partial line stays in `buf` and a typed error is returned.
    pub fn read_line(
        &mut self,
        buf: &mut String,
        max_len: usize,
        options: &LineOptions,
    ) -> MinitelResult<LineTerminator> {
        if max_len == 0 {
            return Err(MinitelError::EmptyLineBuffer);
        }
        buf.clear();
        let start = self.clock.now_ms();
        loop {
            if options.timeout_ms > 0
                && self.clock.now_ms().wrapping_sub(start) > options.timeout_ms
            {
                return Err(MinitelError::Timeout(options.timeout_ms));
            }

            // Short inner slice keeps the outer deadline responsive.
            match self.wait_event(self.config.read_poll_slice_ms) {
                Event::Timeout => continue,
                Event::Char(c) => match c {
                    C_CR | C_LF => {
                        if options.echo {
                            self.newline();
                        }
                        return Ok(LineTerminator::Newline);
                    }
                    C_BS => {
                        if buf.pop().is_some() && options.echo {
                            self.write_raw(&[C_BS, b' ', C_BS]);
                        }
                    }
                    0x20..=0x7E if buf.len() < max_len => {
                        buf.push(c as char);
                        if options.echo {
                            self.put_char(c);
                        }
                    }
                    _ => {}
                },
                Event::Sep { code, .. } if options.stop_on_envoi && code == SEP_ENVOI => {
                    if options.echo {
                        self.newline();
                    }
                    return Ok(LineTerminator::Envoi);
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Called by the PT collaborator after asserting the line.
    pub fn start_session(&mut self) {
        self.session = SessionState::Opening;
        debug!("session opening");
    }

    /// Called by the PT collaborator after releasing the line.
    pub fn end_session(&mut self) {
        self.session = SessionState::Closing;
        debug!("session closing");
    }

    pub fn session_state(&self) -> SessionState {
        self.session
    }

    fn apply_session_sep(&mut self) {
        let next = match self.session {
            SessionState::Opening => SessionState::Open,
            SessionState::Closing => SessionState::Closed,
            other => other,
        };
        if next != self.session {
            debug!(from = ?self.session, to = ?next, "session status SEP");
            self.session = next;
        }
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Arm a wait for the acknowledgement SEP (row, col); fails while one
    /// is already pending. `timeout_ms == 0` means no deadline.
    pub fn begin_wait_sep(&mut self, row: u8, col: u8, timeout_ms: u32) -> MinitelResult<()> {
        let now = self.clock.now_ms();
        self.transactions.begin_wait_sep(row, col, timeout_ms, now)
    }

    pub fn cancel_transaction(&mut self) {
        self.transactions.cancel();
    }

    pub fn transaction_active(&self) -> bool {
        self.transactions.is_active()
    }

    pub fn transaction_outcome(&self) -> Option<TransactionOutcome> {
        self.transactions.last_outcome()
    }

    // ------------------------------------------------------------------
    // Raw TX
    // ------------------------------------------------------------------

    /// Write one byte; the high bit is stripped (parity belongs to the
    /// link layer).
    pub fn write_raw_byte(&mut self, byte: u8) {
        let v = byte & 0x7F;
        trace!(byte = v, "tx");
        self.io.write_byte(v);
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_raw_byte(b);
        }
    }

    // ------------------------------------------------------------------
    // Screen and text
    // ------------------------------------------------------------------

    /// Clear the full screen (FF). Resets the terminal to G0.
    pub fn clear_screen(&mut self) {
        self.write_raw_byte(C_FF);
        self.current_set = CharSet::G0;
    }

    /// Home the cursor (RS). Resets the terminal to G0.
    pub fn home(&mut self) {
        self.write_raw_byte(C_RS);
        self.current_set = CharSet::G0;
    }

    /// Absolute cursor move, clamped to 1..=24 x 1..=40.
    ///
    /// `US` resets attributes, so the shift tracker drops back to G0.
    pub fn set_cursor(&mut self, row: u8, col: u8) {
        let row = row.clamp(1, SCREEN_ROWS);
        let col = col.clamp(1, SCREEN_COLS);
        self.write_raw(&[C_US, 0x40 | row, 0x40 | col]);
        self.current_set = CharSet::G0;
    }

    /// Address the status row 0; leaving it requires an LF.
    pub fn set_cursor_row0(&mut self, col: u8) {
        let col = col.clamp(1, SCREEN_COLS);
        self.write_raw(&[C_US, 0x40, 0x40 | col]);
        self.current_set = CharSet::G0;
    }

    /// Single alphanumeric character; shifts to G0 first when needed.
    pub fn put_char(&mut self, c: u8) {
        if self.current_set != CharSet::G0 {
            self.write_raw_byte(C_SI);
            self.current_set = CharSet::G0;
        }
        self.write_raw_byte(c);
    }

    /// Print text in G0 with REP run-length compression.
    pub fn print(&mut self, s: &str) {
        if self.current_set != CharSet::G0 {
            self.write_raw_byte(C_SI);
            self.current_set = CharSet::G0;
        }
        self.print_optimized(s.as_bytes());
    }

    pub fn println(&mut self, s: &str) {
        self.print(s);
        self.newline();
    }

    /// CR LF.
    pub fn newline(&mut self) {
        self.put_char(C_CR);
        self.put_char(C_LF);
    }

    /// Print a run of semi-graphic codes in G1, REP-compressed.
    pub fn print_semi_graphics(&mut self, codes: &[u8]) {
        self.begin_semi_graphics();
        self.print_optimized(codes);
    }

    /// Shift to G1 unless already there.
    pub fn begin_semi_graphics(&mut self) {
        if self.current_set != CharSet::G1 {
            self.write_raw_byte(C_SO);
            self.current_set = CharSet::G1;
        }
    }

    /// Shift back to G0 unless already there.
    pub fn end_semi_graphics(&mut self) {
        if self.current_set != CharSet::G0 {
            self.write_raw_byte(C_SI);
            self.current_set = CharSet::G0;
        }
    }

    /// One semi-graphic glyph; shifts to G1 first when needed.
    pub fn put_semi_graphic(&mut self, code: u8) {
        self.begin_semi_graphics();
        self.write_raw_byte(code);
    }

    /// Position, draw one G1 glyph, return to G0.
    pub fn put_semi_graphic_at(&mut self, row: u8, col: u8, code: u8) {
        self.set_cursor(row, col);
        self.put_semi_graphic(code);
        self.end_semi_graphics();
    }

    /// REP-coded run-length writer. Runs of length < 4 go out verbatim;
    /// longer runs emit the glyph once followed by `REP, 0x1F + count`,
    /// chunked at 95.
    fn print_optimized(&mut self, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            let glyph = bytes[i];
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] == glyph {
                j += 1;
            }
            let mut run = j - i;

            if run < REP_THRESHOLD {
                for _ in 0..run {
                    self.write_raw_byte(glyph);
                }
            } else {
                while run > 0 {
                    let chunk = run.min(REP_MAX_COUNT);
                    if chunk < REP_THRESHOLD {
                        for _ in 0..chunk {
                            self.write_raw_byte(glyph);
                        }
                    } else {
                        self.write_raw_byte(glyph);
                        self.write_raw_byte(C_REP);
                        self.write_raw_byte(REP_COUNT_BASE + chunk as u8);
                    }
                    run -= chunk;
                }
            }
            i = j;
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn set_char_color(&mut self, color: Color) {
        self.write_raw(&[C_ESC, 0x40 | color.index()]);
    }

    pub fn set_bg_color(&mut self, color: Color) {
        self.write_raw(&[C_ESC, 0x50 | color.index()]);
    }

    pub fn set_flash(&mut self, on: bool) {
        self.write_raw(&[C_ESC, if on { 0x48 } else { 0x49 }]);
    }

    pub fn set_lining(&mut self, on: bool) {
        self.write_raw(&[C_ESC, if on { 0x4A } else { 0x59 }]);
    }

    /// Conceal (`true`) or reveal (`false`) subsequent characters.
    pub fn set_concealed(&mut self, on: bool) {
        self.write_raw(&[C_ESC, if on { 0x58 } else { 0x5F }]);
    }

    pub fn set_text_size(&mut self, size: TextSize) {
        self.write_raw(&[C_ESC, size as u8]);
    }

    /// Which set the tracker believes the terminal has selected.
    pub fn current_set(&self) -> CharSet {
        self.current_set
    }

    // ------------------------------------------------------------------
    // Cursor position report
    // ------------------------------------------------------------------

    /// Ask the terminal where its cursor is (`ESC 0x61`); the reply is
    /// `US row col`. Any deviation from that shape fails.
    pub fn request_cursor_position(&mut self, timeout_ms: u32) -> MinitelResult<(u8, u8)> {
        self.write_raw(&[C_ESC, ESC_CURSOR_REQUEST]);
        self.parser.set_report_us(true);
        let result = self.await_cursor_report(timeout_ms);
        self.parser.set_report_us(false);
        result
    }

    fn await_cursor_report(&mut self, timeout_ms: u32) -> MinitelResult<(u8, u8)> {
        let start = self.clock.now_ms();
        let mut row: Option<u8> = None;
        let mut saw_us = false;
        loop {
            self.poll();
            while let Some(event) = self.events.pop() {
                match event {
                    Event::Control(C_US) if !saw_us => saw_us = true,
                    Event::Char(b) if saw_us && row.is_none() => row = Some(b & 0x3F),
                    Event::Char(b) if saw_us => return Ok((row.unwrap_or(0), b & 0x3F)),
                    _ => return Err(MinitelError::UnexpectedReply),
                }
            }
            if timeout_ms > 0 && self.clock.now_ms().wrapping_sub(start) > timeout_ms {
                return Err(MinitelError::Timeout(timeout_ms));
            }
        }
    }

    // ------------------------------------------------------------------
    // PRO3 routing
    // ------------------------------------------------------------------

    /// Emit one five-byte PRO3 frame: `ESC 0x3B control rx tx`.
    pub fn send_pro3(&mut self, control: u8, rx_module: u8, tx_module: u8) {
        self.write_raw(&[C_ESC, PRO3_PREFIX, control, rx_module, tx_module]);
    }

    /// Switch the terminal into socket keyboard routing.
    pub fn enable_pro3(&mut self) {
        self.write_raw(&[C_ESC, PRO3_PREFIX, PRO3_ON, 0x5F, 0x5F]);
    }

    /// Route the keyboard to the peripheral socket only:
    /// keyboard->modem OFF, modem->screen OFF, keyboard->socket ON.
    ///
    /// When `use_transaction`, a wait for the SEP 5/4 status change is armed
    /// first; PRO3 does not always ack with a specific SEP, so this stays
    /// fire-and-forget by default.
    pub fn configure_keyboard_to_socket(
        &mut self,
        use_transaction: bool,
        timeout_ms: u32,
    ) -> MinitelResult<()> {
        if use_transaction {
            self.begin_wait_sep(SEP_SESSION_ROW, SEP_SESSION_COL, timeout_ms)?;
        }
        self.send_pro3(PRO3_OFF, MOD_MODEM_RX, MOD_KEYBOARD_TX);
        self.send_pro3(PRO3_OFF, MOD_SCREEN_RX, MOD_MODEM_TX);
        self.send_pro3(PRO3_ON, MOD_SOCKET_RX, MOD_KEYBOARD_TX);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackStream, ManualClock};

    fn driver() -> (Minitel<LoopbackStream, ManualClock>, LoopbackStream, ManualClock) {
        let stream = LoopbackStream::new();
        let clock = ManualClock::new();
        let m = Minitel::with_clock(stream.clone(), clock.clone());
        (m, stream, clock)
    }

    #[test]
    fn shift_bytes_are_elided_when_set_is_current() {
        let (mut m, stream, _) = driver();
        m.put_char(b'A'); // already G0: no SI
        assert_eq!(stream.take_written(), vec![0x41]);

        m.begin_semi_graphics();
        m.begin_semi_graphics(); // second shift elided
        assert_eq!(stream.take_written(), vec![C_SO]);

        m.put_char(b'B'); // back to G0 first
        assert_eq!(stream.take_written(), vec![C_SI, 0x42]);
        assert_eq!(m.current_set(), CharSet::G0);
    }

    #[test]
    fn cursor_move_clamps_and_resets_shift() {
        let (mut m, stream, _) = driver();
        m.begin_semi_graphics();
        m.set_cursor(30, 50);
        assert_eq!(
            stream.take_written(),
            vec![C_SO, C_US, 0x40 | 24, 0x40 | 40]
        );
        assert_eq!(m.current_set(), CharSet::G0);

        m.set_cursor_row0(5);
        assert_eq!(stream.take_written(), vec![C_US, 0x40, 0x45]);
    }

    #[test]
    fn clear_and_home_reset_shift() {
        let (mut m, stream, _) = driver();
        m.begin_semi_graphics();
        m.clear_screen();
        m.home();
        assert_eq!(stream.take_written(), vec![C_SO, C_FF, C_RS]);
        assert_eq!(m.current_set(), CharSet::G0);
    }

    #[test]
    fn print_compresses_runs_with_rep() {
        // S3: from G1, print("AAAAA") -> SI 'A' REP 0x24, five bytes total.
        let (mut m, stream, _) = driver();
        m.begin_semi_graphics();
        stream.take_written();
        m.print("AAAAA");
        assert_eq!(stream.take_written(), vec![C_SI, 0x41, C_REP, 0x24]);
    }

    #[test]
    fn short_runs_are_sent_verbatim() {
        let (mut m, stream, _) = driver();
        m.print("AAB");
        assert_eq!(stream.take_written(), vec![0x41, 0x41, 0x42]);
    }

    #[test]
    fn long_runs_are_chunked_at_95() {
        let (mut m, stream, _) = driver();
        let text: String = std::iter::repeat('A').take(100).collect();
        m.print(&text);
        assert_eq!(
            stream.take_written(),
            vec![0x41, C_REP, 0x1F + 95, 0x41, C_REP, 0x1F + 5]
        );
    }

    #[test]
    fn attribute_opcodes() {
        let (mut m, stream, _) = driver();
        m.set_char_color(Color::Green);
        m.set_bg_color(Color::Blue);
        m.set_flash(true);
        m.set_flash(false);
        m.set_lining(true);
        m.set_concealed(true);
        m.set_concealed(false);
        m.set_text_size(TextSize::Double);
        assert_eq!(
            stream.take_written(),
            vec![
                C_ESC, 0x42, C_ESC, 0x54, C_ESC, 0x48, C_ESC, 0x49, C_ESC, 0x4A,
                C_ESC, 0x58, C_ESC, 0x5F, C_ESC, 0x4F
            ]
        );
    }

    #[test]
    fn poll_parses_queued_input_into_events() {
        let (mut m, stream, _) = driver();
        // S1: SEP with parity bits set on the wire
        stream.queue_input(&[0x93, 0xC1]);
        m.poll();
        assert_eq!(
            m.read_event(),
            Some(Event::Sep {
                code: 0x41,
                row: 4,
                col: 1
            })
        );
        assert!(!m.event_available());
    }

    #[test]
    fn transaction_success_and_session_transition() {
        // S4
        let (mut m, stream, _) = driver();
        m.start_session();
        m.begin_wait_sep(5, 4, 1000).unwrap();
        stream.queue_input(&[0x13, 0x54]);
        m.poll();
        assert!(!m.transaction_active());
        assert_eq!(m.transaction_outcome(), Some(TransactionOutcome::Success));
        assert_eq!(m.session_state(), SessionState::Open);
    }

    #[test]
    fn transaction_times_out_on_poll() {
        let (mut m, _, clock) = driver();
        m.begin_wait_sep(5, 4, 100).unwrap();
        clock.advance(101);
        m.poll();
        assert_eq!(m.transaction_outcome(), Some(TransactionOutcome::Timeout));
        // slot is free again
        m.begin_wait_sep(4, 1, 100).unwrap();
    }

    #[test]
    fn wait_event_returns_timeout_event() {
        let (mut m, _, clock) = driver();
        clock.step_per_read(10);
        assert_eq!(m.wait_event(50), Event::Timeout);
    }

    #[test]
    fn read_char_skips_non_char_events() {
        let (mut m, stream, clock) = driver();
        clock.step_per_read(1);
        stream.queue_input(&[0x13, 0x48, 0xC1]); // SEP 4/8 then 'A'
        assert_eq!(m.read_char(1000), Ok(0x41));
    }

    #[test]
    fn read_line_accepts_edits_and_newline() {
        let (mut m, stream, clock) = driver();
        clock.step_per_read(1);
        stream.queue_input(b"HJ\x08I\r"); // HJ, backspace, I, CR
        let mut line = String::new();
        let end = m
            .read_line(&mut line, 40, &LineOptions::default())
            .unwrap();
        assert_eq!(end, LineTerminator::Newline);
        assert_eq!(line, "HI");
    }

    #[test]
    fn read_line_stops_on_envoi() {
        let (mut m, stream, clock) = driver();
        clock.step_per_read(1);
        stream.queue_input(&[b'O', b'K', 0x13, SEP_ENVOI]);
        let mut line = String::new();
        let end = m
            .read_line(&mut line, 40, &LineOptions::default())
            .unwrap();
        assert_eq!(end, LineTerminator::Envoi);
        assert_eq!(line, "OK");
    }

    #[test]
    fn read_line_timeout_keeps_partial_input() {
        let (mut m, stream, clock) = driver();
        clock.step_per_read(5);
        stream.queue_input(b"AB");
        let mut line = String::new();
        let opts = LineOptions {
            timeout_ms: 300,
            ..LineOptions::default()
        };
        assert_eq!(
            m.read_line(&mut line, 40, &opts),
            Err(MinitelError::Timeout(300))
        );
        assert_eq!(line, "AB");
    }

    #[test]
    fn read_line_rejects_zero_capacity() {
        let (mut m, _, _) = driver();
        let mut line = String::new();
        assert_eq!(
            m.read_line(&mut line, 0, &LineOptions::default()),
            Err(MinitelError::EmptyLineBuffer)
        );
    }

    #[test]
    fn read_line_echoes_locally() {
        let (mut m, stream, clock) = driver();
        clock.step_per_read(1);
        stream.queue_input(b"A\x08B\r");
        let mut line = String::new();
        let opts = LineOptions {
            echo: true,
            ..LineOptions::default()
        };
        m.read_line(&mut line, 40, &opts).unwrap();
        assert_eq!(line, "B");
        assert_eq!(
            stream.take_written(),
            vec![b'A', C_BS, b' ', C_BS, b'B', C_CR, C_LF]
        );
    }

    #[test]
    fn cursor_position_round_trip() {
        let (mut m, stream, clock) = driver();
        clock.step_per_read(1);
        // terminal replies US row col
        stream.queue_input(&[C_US, 0x40 | 12, 0x40 | 7]);
        let pos = m.request_cursor_position(1000).unwrap();
        assert_eq!(pos, (12, 7));
        assert_eq!(stream.take_written(), vec![C_ESC, ESC_CURSOR_REQUEST]);
        // mode is back off: a stray US is silent again
        stream.queue_input(&[C_US]);
        m.poll();
        assert!(!m.event_available());
    }

    #[test]
    fn cursor_position_rejects_malformed_reply() {
        let (mut m, stream, clock) = driver();
        clock.step_per_read(1);
        stream.queue_input(&[0x13, 0x41]); // a SEP instead of US row col
        assert_eq!(
            m.request_cursor_position(1000),
            Err(MinitelError::UnexpectedReply)
        );
    }

    #[test]
    fn cursor_position_times_out() {
        let (mut m, _, clock) = driver();
        clock.step_per_read(10);
        assert_eq!(
            m.request_cursor_position(50),
            Err(MinitelError::Timeout(50))
        );
    }

    #[test]
    fn pro3_frames() {
        let (mut m, stream, _) = driver();
        m.configure_keyboard_to_socket(false, 0).unwrap();
        assert_eq!(
            stream.take_written(),
            vec![
                C_ESC, PRO3_PREFIX, PRO3_OFF, MOD_MODEM_RX, MOD_KEYBOARD_TX,
                C_ESC, PRO3_PREFIX, PRO3_OFF, MOD_SCREEN_RX, MOD_MODEM_TX,
                C_ESC, PRO3_PREFIX, PRO3_ON, MOD_SOCKET_RX, MOD_KEYBOARD_TX,
            ]
        );
        m.enable_pro3();
        assert_eq!(
            stream.take_written(),
            vec![C_ESC, PRO3_PREFIX, PRO3_ON, 0x5F, 0x5F]
        );
    }

    #[test]
    fn high_bit_is_stripped_on_tx() {
        let (mut m, stream, _) = driver();
        m.write_raw(&[0xC1, 0x8C]);
        assert_eq!(stream.take_written(), vec![0x41, 0x0C]);
    }
}
