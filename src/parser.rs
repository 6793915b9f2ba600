// src/parser.rs
//! Receive-side byte parser.
//!
//! A small prefix-dispatched state machine over parity-stripped 7-bit bytes.
//! Each byte yields at most one [`Event`]; SEP and ESC sequences surface as a
//! single event once their last byte arrives, so consumers never observe a
//! partial sequence.

use tracing::trace;

use crate::constants::*;
use crate::event::Event;

/// ESC sub-state.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum EscState {
    Idle,
    GotEsc,
    CollectPro3,
}

pub struct RxParser {
    waiting_sep_second: bool,
    esc_state: EscState,
    esc_buf: [u8; 3],
    esc_len: u8,
    /// When raised, US is delivered as `Control(0x1F)` instead of being
    /// consumed; the driver raises it only while a cursor-position report
    /// is expected.
    report_us: bool,
}

impl RxParser {
    pub fn new() -> Self {
        Self {
            waiting_sep_second: false,
            esc_state: EscState::Idle,
            esc_buf: [0; 3],
            esc_len: 0,
            report_us: false,
        }
    }

    /// Consume one received byte; returns the completed event, if any.
    ///
    /// Dispatch order matters: a pending ESC or SEP sequence always claims
    /// the byte first, then local-echo editing controls are swallowed, then
    /// sequence starters, and only then plain classification.
    pub fn feed(&mut self, byte: u8) -> Option<Event> {
        let c = byte & 0x7F; // strip parity bit

        if self.esc_state != EscState::Idle {
            return self.feed_esc(c);
        }

        if self.waiting_sep_second {
            self.waiting_sep_second = false;
            return Some(Event::Sep {
                code: c,
                row: (c >> 4) & 0x07,
                col: c & 0x0F,
            });
        }

        if self.is_silent_control(c) {
            trace!(byte = c, "editing control consumed");
            return None;
        }

        match c {
            C_ESC => {
                self.esc_state = EscState::GotEsc;
                None
            }
            C_SEP => {
                self.waiting_sep_second = true;
                None
            }
            C_CR | C_LF | C_BS => Some(Event::Char(c)),
            _ if c < 0x20 => Some(Event::Control(c)),
            _ => Some(Event::Char(c)), // 0x20..=0x7E
        }
    }

    fn feed_esc(&mut self, c: u8) -> Option<Event> {
        match self.esc_state {
            EscState::Idle => None,
            EscState::GotEsc => {
                if c == PRO3_PREFIX {
                    self.esc_state = EscState::CollectPro3;
                    self.esc_len = 0;
                    None
                } else if (0x40..=0x7F).contains(&c) {
                    self.esc_state = EscState::Idle;
                    Some(Event::EscSeq {
                        opcode: c,
                        data: [0; 3],
                        len: 0,
                    })
                } else {
                    trace!(byte = c, "unsupported ESC follower dropped");
                    self.esc_state = EscState::Idle;
                    None
                }
            }
            EscState::CollectPro3 => {
                self.esc_buf[self.esc_len as usize] = c;
                self.esc_len += 1;
                if self.esc_len == 3 {
                    self.esc_state = EscState::Idle;
                    self.esc_len = 0;
                    Some(Event::EscSeq {
                        opcode: PRO3_PREFIX,
                        data: self.esc_buf,
                        len: 3,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Local-echo editing and positioning controls the application never
    /// needs to see. US leaves this set while a cursor report is expected.
    fn is_silent_control(&self, c: u8) -> bool {
        match c {
            C_HT | C_VT | C_CAN | C_RS | C_DEL => true,
            C_US => !self.report_us,
            _ => false,
        }
    }

    /// Deliver US as `Control(0x1F)` while `on` (cursor-report mode).
    pub fn set_report_us(&mut self, on: bool) {
        self.report_us = on;
    }

    /// True when no sequence is in flight.
    pub fn is_idle(&self) -> bool {
        !self.waiting_sep_second && self.esc_state == EscState::Idle
    }
}

impl Default for RxParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn feed_all(parser: &mut RxParser, bytes: &[u8]) -> Vec<Event> {
        bytes.iter().filter_map(|&b| parser.feed(b)).collect()
    }

    #[test]
    fn parity_bit_is_stripped() {
        let mut p = RxParser::new();
        // 0xC1 = 'A' with even-parity bit set
        assert_eq!(p.feed(0xC1), Some(Event::Char(0x41)));
    }

    #[test]
    fn sep_sequence_yields_single_event() {
        let mut p = RxParser::new();
        assert_eq!(p.feed(0x13), None);
        assert!(!p.is_idle());
        assert_eq!(
            p.feed(0x41),
            Some(Event::Sep {
                code: 0x41,
                row: 4,
                col: 1
            })
        );
        assert!(p.is_idle());
    }

    #[test]
    fn sep_code_law_holds() {
        // For every reachable SEP: code == 0x40 | (row << 4) | col.
        let mut p = RxParser::new();
        for second in 0x40..=0x7Fu8 {
            p.feed(0x13);
            if let Some(Event::Sep { code, row, col }) = p.feed(second) {
                assert_eq!(code & 0x7F, second);
                assert!(row < 8);
                assert!(col < 16);
                assert_eq!(0x40 | (row << 4) | col, second);
            } else {
                panic!("expected a Sep event for second byte {second:#04x}");
            }
        }
    }

    #[test]
    fn bare_esc_opcode() {
        let mut p = RxParser::new();
        assert_eq!(p.feed(0x1B), None);
        assert_eq!(
            p.feed(0x48),
            Some(Event::EscSeq {
                opcode: 0x48,
                data: [0; 3],
                len: 0
            })
        );
        assert!(p.is_idle());
    }

    #[test]
    fn pro3_collects_exactly_three_bytes() {
        let mut p = RxParser::new();
        let events = feed_all(&mut p, &[0x1B, 0x3B, 0x61, 0x5F, 0x5F]);
        assert_eq!(
            events,
            vec![Event::EscSeq {
                opcode: 0x3B,
                data: [0x61, 0x5F, 0x5F],
                len: 3
            }]
        );
        assert!(p.is_idle());
    }

    #[test]
    fn bad_esc_follower_is_dropped_silently() {
        let mut p = RxParser::new();
        assert_eq!(p.feed(0x1B), None);
        assert_eq!(p.feed(0x05), None); // outside {0x3B, 0x40..0x7F}
        assert!(p.is_idle());
        // parser recovered: next byte classifies normally
        assert_eq!(p.feed(b'X'), Some(Event::Char(b'X')));
    }

    #[test]
    fn editing_controls_are_swallowed() {
        let mut p = RxParser::new();
        for b in [C_HT, C_VT, C_CAN, C_RS, C_US, C_DEL] {
            assert_eq!(p.feed(b), None, "byte {b:#04x} should be silent");
        }
    }

    #[test]
    fn cr_lf_bs_are_chars_not_controls() {
        let mut p = RxParser::new();
        assert_eq!(p.feed(0x0D), Some(Event::Char(0x0D)));
        assert_eq!(p.feed(0x0A), Some(Event::Char(0x0A)));
        assert_eq!(p.feed(0x08), Some(Event::Char(0x08)));
    }

    #[test]
    fn other_c0_surface_as_control() {
        let mut p = RxParser::new();
        assert_eq!(p.feed(0x07), Some(Event::Control(0x07)));
        assert_eq!(p.feed(0x0C), Some(Event::Control(0x0C)));
    }

    #[test]
    fn report_us_mode_delivers_cursor_report() {
        let mut p = RxParser::new();
        p.set_report_us(true);
        let events = feed_all(&mut p, &[0x1F, 0x45, 0x4A]);
        assert_eq!(
            events,
            vec![
                Event::Control(0x1F),
                Event::Char(0x45),
                Event::Char(0x4A)
            ]
        );
        p.set_report_us(false);
        assert_eq!(p.feed(0x1F), None);
    }

    #[test]
    fn random_soup_never_leaves_state_dangling() {
        // After any complete event emission the (sep, esc) pair must be back
        // to (false, Idle), and the parser must never panic.
        let mut rng = rand::thread_rng();
        let mut p = RxParser::new();
        for _ in 0..20_000 {
            let b: u8 = rng.gen();
            if p.feed(b).is_some() {
                assert!(p.is_idle());
            }
        }
        // Drain any half-open sequence, then confirm recovery.
        for b in [0x20u8, 0x20, 0x20, 0x20] {
            p.feed(b);
        }
        assert!(p.is_idle());
    }
}
