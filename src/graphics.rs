// src/graphics.rs
//! Bit-addressable graphics overlay on the G1 semi-graphic grid.
//!
//! An 80x72 pixel framebuffer maps onto the 40x24 cell grid: each cell holds
//! a 2x3 block of sub-pixels coded as a six-bit mask, plus a foreground
//! colour. Drawing mutates the bitmap; `flush` walks it against a shadow copy
//! of what is already on screen and emits the minimal byte delta. At 1200
//! baud every redundant byte is a visible redraw delay, so the flush path
//! groups identical cells into REP-coded runs and moves the cursor by
//! whichever of the relative or absolute forms is cheaper.

use tracing::debug;

use crate::color::Color;
use crate::constants::{
    C_BS, C_HT, C_LF, C_REP, C_VT, REP_COUNT_BASE, REP_THRESHOLD, SCREEN_COLS, SCREEN_ROWS,
};
use crate::stream::{ByteStream, Clock, SystemClock};
use crate::terminal::Minitel;

/// Pixel-space width (two sub-pixels per cell column).
pub const PIXEL_COLS: i32 = SCREEN_COLS as i32 * 2; // 80
/// Pixel-space height (three sub-pixels per cell row).
pub const PIXEL_ROWS: i32 = SCREEN_ROWS as i32 * 3; // 72
/// Cells on the 40x24 grid.
pub const NUM_CELLS: usize = SCREEN_COLS as usize * SCREEN_ROWS as usize; // 960

/// Longest run grouped during a flush.
const RUN_MAX: u8 = 64;
/// Byte cost of the absolute move: US row col + SO to re-enter G1.
const ABS_MOVE_COST: i32 = 4;

/// What a drawing call does beyond mutating the bitmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawMode {
    /// Mutate the framebuffer only; nothing is sent until `flush`.
    BitmapOnly,
    /// Additionally repaint each touched cell on screen right away.
    Immediate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushMode {
    /// Redraw every cell, row by row.
    FullRedraw,
    /// Send only cells that differ from the shadow copy.
    OptimizedDiff,
}

/// Map a six-bit sub-pixel mask to its G1 glyph code.
///
/// Injective over 0..=63: blank is 0x20, fully lit is the STUM trap code
/// 0x5F, the rest split across 0x21..=0x3F and 0x60..=0x7E.
pub fn mask_to_g1(mask: u8) -> u8 {
    let mask = mask & 0x3F;
    match mask {
        0 => 0x20,
        0x3F => 0x5F,
        1..=0x1F => 0x20 + mask,
        _ => 0x60 + (mask - 0x20),
    }
}

fn cell_index(col: u8, row: u8) -> usize {
    row as usize * SCREEN_COLS as usize + col as usize
}

/// Sub-pixel index inside a cell: (0,0)->0, (1,0)->1, (0,1)->2, (1,1)->3,
/// (0,2)->4, (1,2)->5.
fn sub_pixel_index(x_in_cell: i32, y_in_cell: i32) -> u8 {
    (y_in_cell * 2 + x_in_cell) as u8
}

struct Run {
    start_col: u8,
    code: u8,
    color: u8,
    len: u8,
}

/// Pixel framebuffer bound to the transmit side of one driver.
///
/// Holds the driver exclusively for its lifetime; the tracked cursor and
/// shift state stay valid because nothing else can write to the terminal
/// in between flushes.
pub struct MinitelGfx<'a, S: ByteStream, C: Clock = SystemClock> {
    dev: &'a mut Minitel<S, C>,

    draw_mode: DrawMode,
    draw_color: Color,

    cell_mask: [u8; NUM_CELLS],
    cell_color: [u8; NUM_CELLS],
    // What is currently on the wire/screen; updated only by flush (and the
    // immediate-mode per-cell path).
    last_cell_mask: [u8; NUM_CELLS],
    last_cell_color: [u8; NUM_CELLS],

    // Belief of the terminal's foreground colour.
    term_fg: Color,

    // Tracked cursor, 1-based terminal coordinates.
    cur_row: u8,
    cur_col: u8,
    has_cursor: bool,
}

impl<'a, S: ByteStream, C: Clock> MinitelGfx<'a, S, C> {
    pub fn new(dev: &'a mut Minitel<S, C>) -> Self {
        Self {
            dev,
            draw_mode: DrawMode::BitmapOnly,
            draw_color: Color::White,
            cell_mask: [0; NUM_CELLS],
            cell_color: [Color::White.index(); NUM_CELLS],
            // Shadows claim "unknown" so the first flush repaints everything.
            last_cell_mask: [0xFF; NUM_CELLS],
            last_cell_color: [Color::White.index(); NUM_CELLS],
            term_fg: Color::White,
            cur_row: 1,
            cur_col: 1,
            has_cursor: false,
        }
    }

    /// Access the underlying driver (e.g. to poll between frames).
    pub fn device(&mut self) -> &mut Minitel<S, C> {
        self.dev
    }

    pub fn set_draw_mode(&mut self, mode: DrawMode) {
        self.draw_mode = mode;
    }

    /// Colour stamped on cells when pixels are turned on.
    pub fn set_draw_color(&mut self, color: Color) {
        self.draw_color = color;
    }

    pub fn draw_color(&self) -> Color {
        self.draw_color
    }

    /// Reset the bitmap. With `update_screen` the terminal is cleared too
    /// and the shadows sync to blank; otherwise the shadows are invalidated
    /// so the next flush repaints every cell.
    pub fn clear(&mut self, update_screen: bool) {
        self.cell_mask = [0; NUM_CELLS];
        self.cell_color = [Color::White.index(); NUM_CELLS];
        self.last_cell_color = [Color::White.index(); NUM_CELLS];
        if update_screen {
            self.last_cell_mask = [0; NUM_CELLS];
            self.dev.clear_screen();
            self.dev.home();
            self.term_fg = Color::White;
        } else {
            self.last_cell_mask = [0xFF; NUM_CELLS];
        }
        self.has_cursor = false;
        self.cur_row = 1;
        self.cur_col = 1;
    }

    // ------------------------------------------------------------------
    // Pixel access
    // ------------------------------------------------------------------

    /// Set or clear one pixel. Setting stamps the cell with the current
    /// draw colour; clearing leaves the colour alone so partially lit
    /// cells keep theirs.
    pub fn draw_pixel(&mut self, x: i32, y: i32, on: bool) {
        if x < 0 || x >= PIXEL_COLS || y < 0 || y >= PIXEL_ROWS {
            return;
        }
        let col = (x / 2) as u8;
        let row = (y / 3) as u8;
        let bit = 1u8 << sub_pixel_index(x % 2, y % 3);

        let k = cell_index(col, row);
        if on {
            self.cell_mask[k] |= bit;
            self.cell_color[k] = self.draw_color.index();
        } else {
            self.cell_mask[k] &= !bit;
        }

        if self.draw_mode == DrawMode::Immediate {
            self.update_cell(col, row);
        }
    }

    /// Current state of one pixel (off-grid reads as unset).
    pub fn pixel(&self, x: i32, y: i32) -> bool {
        if x < 0 || x >= PIXEL_COLS || y < 0 || y >= PIXEL_ROWS {
            return false;
        }
        let k = cell_index((x / 2) as u8, (y / 3) as u8);
        self.cell_mask[k] & (1 << sub_pixel_index(x % 2, y % 3)) != 0
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Integer Bresenham line, endpoints included.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, on: bool) {
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.draw_pixel(x, y, on);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Thick line: parallel offset lines along the minor axis.
    pub fn draw_line_thick(
        &mut self,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        thickness: u8,
        on: bool,
    ) {
        if thickness <= 1 {
            self.draw_line(x0, y0, x1, y1, on);
            return;
        }
        let half = thickness as i32 / 2;
        if (x1 - x0).abs() >= (y1 - y0).abs() {
            for o in -half..=half {
                self.draw_line(x0, y0 + o, x1, y1 + o, on);
            }
        } else {
            for o in -half..=half {
                self.draw_line(x0 + o, y0, x1 + o, y1, on);
            }
        }
    }

    pub fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, filled: bool, on: bool) {
        if w <= 0 || h <= 0 {
            return;
        }
        let x2 = x + w - 1;
        let y2 = y + h - 1;
        if filled {
            for yy in y..=y2 {
                self.draw_line(x, yy, x2, yy, on);
            }
        } else {
            self.draw_line(x, y, x2, y, on);
            self.draw_line(x, y2, x2, y2, on);
            self.draw_line(x, y, x, y2, on);
            self.draw_line(x2, y, x2, y2, on);
        }
    }

    /// Open chain of thick segments through the given points.
    pub fn draw_polyline(&mut self, points: &[(i32, i32)], thickness: u8, on: bool) {
        for pair in points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            self.draw_line_thick(x0, y0, x1, y1, thickness, on);
        }
    }

    /// Closed polygon; filled variant scanline-fills with even-odd parity,
    /// then strokes the outline so edges honour the thickness.
    pub fn draw_polygon(&mut self, points: &[(i32, i32)], filled: bool, thickness: u8, on: bool) {
        if points.len() < 2 {
            return;
        }
        if filled {
            let min_y = points.iter().map(|p| p.1).min().unwrap_or(0);
            let max_y = points.iter().map(|p| p.1).max().unwrap_or(0);
            for y in min_y..=max_y {
                let mut crossings: Vec<i32> = Vec::new();
                for i in 0..points.len() {
                    let (x1, y1) = points[i];
                    let (x2, y2) = points[(i + 1) % points.len()];
                    if (y1 <= y && y2 > y) || (y2 <= y && y1 > y) {
                        let t = (y - y1) as f32 / (y2 - y1) as f32;
                        crossings.push(x1 + (t * (x2 - x1) as f32).round() as i32);
                    }
                }
                crossings.sort_unstable();
                for span in crossings.chunks_exact(2) {
                    self.draw_line(span[0], y, span[1], y, on);
                }
            }
        }
        for i in 0..points.len() {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % points.len()];
            self.draw_line_thick(x0, y0, x1, y1, thickness, on);
        }
    }

    pub fn draw_triangle(
        &mut self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        x3: i32,
        y3: i32,
        filled: bool,
        thickness: u8,
        on: bool,
    ) {
        self.draw_polygon(&[(x1, y1), (x2, y2), (x3, y3)], filled, thickness, on);
    }

    /// Circle by midpoint algorithm; `filled` paints horizontal spans,
    /// otherwise `thickness` shrinks concentric outlines inward.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, filled: bool, thickness: u8, on: bool) {
        if radius < 0 {
            return;
        }
        if filled {
            for dy in -radius..=radius {
                let dx = (((radius * radius - dy * dy) as f32).sqrt()) as i32;
                self.draw_line(cx - dx, cy + dy, cx + dx, cy + dy, on);
            }
            return;
        }
        for inset in 0..thickness.max(1) as i32 {
            let r = radius - inset;
            if r < 0 {
                break;
            }
            self.circle_outline(cx, cy, r, on);
        }
    }

    fn circle_outline(&mut self, cx: i32, cy: i32, r: i32, on: bool) {
        let mut x = r;
        let mut y = 0;
        let mut err = 1 - r;
        while x >= y {
            self.draw_pixel(cx + x, cy + y, on);
            self.draw_pixel(cx + y, cy + x, on);
            self.draw_pixel(cx - y, cy + x, on);
            self.draw_pixel(cx - x, cy + y, on);
            self.draw_pixel(cx - x, cy - y, on);
            self.draw_pixel(cx - y, cy - x, on);
            self.draw_pixel(cx + y, cy - x, on);
            self.draw_pixel(cx + x, cy - y, on);
            y += 1;
            if err < 0 {
                err += 2 * y + 1;
            } else {
                x -= 1;
                err += 2 * (y - x) + 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Flush
    // ------------------------------------------------------------------

    pub fn flush(&mut self, mode: FlushMode) {
        match mode {
            FlushMode::FullRedraw => self.flush_full(),
            FlushMode::OptimizedDiff => self.flush_diff(),
        }
    }

    fn flush_full(&mut self) {
        for row in 0..SCREEN_ROWS {
            self.dev.set_cursor(row + 1, 1);
            self.cur_row = row + 1;
            self.cur_col = 1;
            self.has_cursor = true;
            self.dev.begin_semi_graphics();

            let mut run: Option<Run> = None;
            for col in 0..SCREEN_COLS {
                let k = cell_index(col, row);
                let code = mask_to_g1(self.cell_mask[k]);
                let color = self.cell_color[k];
                let extends = matches!(run.as_ref(),
                    Some(r) if r.code == code && r.color == color && r.len < RUN_MAX);
                if extends {
                    if let Some(r) = run.as_mut() {
                        r.len += 1;
                    }
                } else {
                    if let Some(r) = run.take() {
                        self.emit_run(r.code, r.len, r.color);
                    }
                    run = Some(Run { start_col: col, code, color, len: 1 });
                }
            }
            if let Some(r) = run {
                self.emit_run(r.code, r.len, r.color);
            }
            self.dev.end_semi_graphics();
            self.sync_row_shadow(row);
        }
        debug!("full redraw flushed");
    }

    fn flush_diff(&mut self) {
        let mut emitted = false;
        for row in 0..SCREEN_ROWS {
            let mut run: Option<Run> = None;
            for col in 0..SCREEN_COLS {
                let k = cell_index(col, row);
                let dirty = self.cell_mask[k] != self.last_cell_mask[k]
                    || self.cell_color[k] != self.last_cell_color[k];

                if !dirty {
                    // A clean cell terminates the segment.
                    if let Some(r) = run.take() {
                        self.emit_run_at(row, r);
                        emitted = true;
                    }
                    continue;
                }

                let code = mask_to_g1(self.cell_mask[k]);
                let color = self.cell_color[k];
                let extends = matches!(run.as_ref(),
                    Some(r) if r.code == code && r.color == color && r.len < RUN_MAX);
                if extends {
                    if let Some(r) = run.as_mut() {
                        r.len += 1;
                    }
                } else {
                    if let Some(r) = run.take() {
                        self.emit_run_at(row, r);
                        emitted = true;
                    }
                    run = Some(Run { start_col: col, code, color, len: 1 });
                }
            }
            if let Some(r) = run.take() {
                self.emit_run_at(row, r);
                emitted = true;
            }
            self.sync_row_shadow(row);
        }
        debug!(emitted, "diff flushed");
    }

    fn sync_row_shadow(&mut self, row: u8) {
        let start = cell_index(0, row);
        let end = start + SCREEN_COLS as usize;
        self.last_cell_mask[start..end].copy_from_slice(&self.cell_mask[start..end]);
        self.last_cell_color[start..end].copy_from_slice(&self.cell_color[start..end]);
    }

    /// Move to the run's first cell, enter G1 and emit it.
    fn emit_run_at(&mut self, row: u8, run: Run) {
        self.goto_cell(row + 1, run.start_col + 1);
        self.dev.begin_semi_graphics();
        self.emit_run(run.code, run.len, run.color);
    }

    /// Emit one run at the tracked cursor: colour change if it differs,
    /// REP coding when the run is long enough, then advance the tracker.
    fn emit_run(&mut self, code: u8, len: u8, color_idx: u8) {
        if len == 0 {
            return;
        }
        let color = Color::from_index(color_idx);
        if color != self.term_fg {
            self.dev.set_char_color(color);
            self.term_fg = color;
        }
        if (len as usize) < REP_THRESHOLD {
            for _ in 0..len {
                self.dev.put_semi_graphic(code);
            }
        } else {
            self.dev.put_semi_graphic(code);
            self.dev.write_raw_byte(C_REP);
            self.dev.write_raw_byte(REP_COUNT_BASE + len);
        }
        for _ in 0..len {
            self.advance_cursor();
        }
    }

    /// Cheapest path to a cell: LF/VT/HT/BS walk when the Manhattan cost
    /// beats the 4-byte absolute form (`US row col` plus SO, since US
    /// resets attributes and drops the terminal to G0).
    fn goto_cell(&mut self, row: u8, col: u8) {
        let row = row.clamp(1, SCREEN_ROWS);
        let col = col.clamp(1, SCREEN_COLS);

        if !self.has_cursor {
            self.dev.set_cursor(row, col);
            self.dev.begin_semi_graphics();
            self.cur_row = row;
            self.cur_col = col;
            self.has_cursor = true;
            return;
        }

        let dr = row as i32 - self.cur_row as i32;
        let dc = col as i32 - self.cur_col as i32;
        if dr.abs() + dc.abs() <= ABS_MOVE_COST {
            // Vertical first, then horizontal; each byte keeps G1.
            for _ in 0..dr.abs() {
                self.dev.write_raw_byte(if dr > 0 { C_LF } else { C_VT });
            }
            for _ in 0..dc.abs() {
                self.dev.write_raw_byte(if dc > 0 { C_HT } else { C_BS });
            }
        } else {
            self.dev.set_cursor(row, col);
            self.dev.begin_semi_graphics();
        }
        self.cur_row = row;
        self.cur_col = col;
    }

    /// One printed glyph moves the cursor right, wrapping to the next row
    /// and capping at the bottom (scroll is not modelled).
    fn advance_cursor(&mut self) {
        self.cur_col += 1;
        if self.cur_col > SCREEN_COLS {
            self.cur_col = 1;
            if self.cur_row < SCREEN_ROWS {
                self.cur_row += 1;
            }
        }
    }

    /// Immediate-mode repaint of one cell.
    fn update_cell(&mut self, col: u8, row: u8) {
        let k = cell_index(col, row);
        if self.cell_mask[k] == self.last_cell_mask[k]
            && self.cell_color[k] == self.last_cell_color[k]
        {
            return;
        }
        self.goto_cell(row + 1, col + 1);
        self.dev.begin_semi_graphics();
        let color = Color::from_index(self.cell_color[k]);
        if color != self.term_fg {
            self.dev.set_char_color(color);
            self.term_fg = color;
        }
        self.dev.put_semi_graphic(mask_to_g1(self.cell_mask[k]));
        self.advance_cursor();
        self.last_cell_mask[k] = self.cell_mask[k];
        self.last_cell_color[k] = self.cell_color[k];
    }
}
