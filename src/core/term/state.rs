//! Screen state behind the display sink
//!
//! A fixed-geometry cell grid with a cursor, current drawing attributes and a
//! bounded scrollback. The parser drives it; the renderer reads it.

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

/// Default number of scrollback rows kept
pub const DEFAULT_SCROLLBACK: usize = 1000;

/// Grid state of one display surface
pub struct TerminalState {
    pub cols: u16,
    pub rows: u16,
    pub screen: ScreenBuffer,
    pub cursor: CursorState,
    pub current_attrs: CellAttrs,
}

impl TerminalState {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            screen: ScreenBuffer::new(cols, rows, scrollback_limit),
            cursor: CursorState::default(),
            current_attrs: CellAttrs::default(),
        }
    }

    /// Change geometry, keeping the cursor line on screen.
    ///
    /// Shrinking moves rows above the cursor into scrollback instead of
    /// dropping the bottom of the screen.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        let cols = cols.max(1);
        let rows = rows.max(1);

        if rows < self.rows {
            let overflow = (self.cursor.row + 1).saturating_sub(rows);
            for _ in 0..overflow {
                if !self.screen.rows.is_empty() {
                    let removed = self.screen.rows.remove(0);
                    self.screen.push_to_scrollback(removed);
                }
            }
            self.cursor.row -= overflow;
        }

        self.cols = cols;
        self.rows = rows;
        self.screen.resize(cols, rows);
        self.cursor.col = self.cursor.col.min(cols.saturating_sub(1));
        self.cursor.row = self.cursor.row.min(rows.saturating_sub(1));
    }

    /// Put a character at the cursor, wrapping at the right edge
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;

        if width == 0 {
            self.append_to_previous_cell(ch);
            return;
        }

        if self.cursor.col + width > self.cols {
            self.screen.rows[self.cursor.row as usize].wrapped = true;
            self.cursor.col = 0;
            self.linefeed();
        }

        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let attrs = self.current_attrs.clone();

        self.handle_wide_char_overwrite(row, col);

        let cells = &mut self.screen.rows[row].cells;
        cells[col] = Cell {
            grapheme: ch.to_string(),
            width: width as u8,
            attrs: attrs.clone(),
        };
        if width == 2 && col + 1 < cells.len() {
            cells[col + 1] = Cell::continuation(&attrs);
        }

        self.screen.mark_dirty();
        self.cursor.col += width;
    }

    fn append_to_previous_cell(&mut self, ch: char) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        if col > 0 {
            self.screen.rows[row].cells[col - 1].grapheme.push(ch);
            self.screen.mark_dirty();
        }
    }

    fn handle_wide_char_overwrite(&mut self, row: usize, col: usize) {
        let attrs = self.current_attrs.clone();
        let cells = &mut self.screen.rows[row].cells;

        if col > 0 && cells[col].is_continuation() {
            cells[col - 1].clear(&attrs);
        }
        if cells[col].width == 2 && col + 1 < cells.len() {
            cells[col + 1].clear(&attrs);
        }
    }

    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
    }

    /// Line feed, scrolling the grid when the cursor is on the last row
    pub fn linefeed(&mut self) {
        if self.cursor.row + 1 >= self.rows {
            self.scroll_up(1);
        } else {
            self.cursor.row += 1;
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor.col >= self.cols {
            self.cursor.col = self.cols.saturating_sub(1);
        }
        self.cursor.col = self.cursor.col.saturating_sub(1);
    }

    pub fn horizontal_tab(&mut self) {
        let next = ((self.cursor.col / 8) + 1) * 8;
        self.cursor.col = next.min(self.cols.saturating_sub(1));
    }

    /// Scroll the whole grid up by n lines into scrollback
    pub fn scroll_up(&mut self, n: u16) {
        let cols = self.cols;
        for _ in 0..n {
            if self.screen.rows.is_empty() {
                break;
            }
            let removed = self.screen.rows.remove(0);
            self.screen.push_to_scrollback(removed);
            self.screen.rows.push(Row::new(cols));
        }
        self.screen.mark_dirty();
    }

    pub fn cursor_up(&mut self, n: u16) {
        self.cursor.row = self.cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        self.cursor.row = self.cursor.row.saturating_add(n).min(self.rows.saturating_sub(1));
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_add(n).min(self.cols.saturating_sub(1));
    }

    pub fn cursor_backward(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.cursor.row = row.saturating_sub(1).min(self.rows.saturating_sub(1));
        self.cursor.col = col.saturating_sub(1).min(self.cols.saturating_sub(1));
    }

    /// Set cursor column (1-indexed parameter)
    pub fn cursor_column(&mut self, col: u16) {
        self.cursor.col = col.saturating_sub(1).min(self.cols.saturating_sub(1));
    }

    /// Erase in display (ED). Mode 3 also drops scrollback.
    pub fn erase_in_display(&mut self, mode: u16) {
        let attrs = self.current_attrs.clone();
        let cursor_row = self.cursor.row as usize;
        match mode {
            0 => {
                self.erase_in_line(0);
                for row in self.screen.rows.iter_mut().skip(cursor_row + 1) {
                    row.clear(&attrs);
                }
            }
            1 => {
                for row in self.screen.rows.iter_mut().take(cursor_row) {
                    row.clear(&attrs);
                }
                self.erase_in_line(1);
            }
            2 => {
                for row in &mut self.screen.rows {
                    row.clear(&attrs);
                }
            }
            3 => {
                for row in &mut self.screen.rows {
                    row.clear(&attrs);
                }
                self.screen.scrollback.clear();
                self.screen.scroll_offset = 0;
            }
            _ => {}
        }
        self.screen.mark_dirty();
    }

    /// Erase in line (EL)
    pub fn erase_in_line(&mut self, mode: u16) {
        let attrs = self.current_attrs.clone();
        let col = self.cursor.col as usize;
        let Some(row) = self.screen.rows.get_mut(self.cursor.row as usize) else {
            return;
        };

        match mode {
            0 => {
                for cell in row.cells.iter_mut().skip(col) {
                    cell.clear(&attrs);
                }
                row.wrapped = false;
            }
            1 => {
                for cell in row.cells.iter_mut().take(col + 1) {
                    cell.clear(&attrs);
                }
            }
            2 => row.clear(&attrs),
            _ => {}
        }
        self.screen.mark_dirty();
    }

    /// Wipe the visible grid and scrollback and home the cursor
    pub fn clear_all(&mut self) {
        self.current_attrs.reset();
        self.erase_in_display(3);
        self.cursor = CursorState::default();
    }

    /// Text of a visible row with trailing blanks trimmed
    pub fn row_text(&self, row: usize) -> String {
        self.screen
            .rows
            .get(row)
            .map(Row::text)
            .unwrap_or_default()
    }

    /// Rows above the cursor joined to the cursor row by soft wraps
    pub fn wrapped_rows_above_cursor(&self) -> u16 {
        let mut count = 0;
        let mut row = self.cursor.row as usize;
        while row > 0 && self.screen.rows.get(row - 1).is_some_and(|r| r.wrapped) {
            count += 1;
            row -= 1;
        }
        count
    }

    /// All visible rows as text, trailing empty rows dropped
    pub fn visible_text(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.screen.rows.iter().map(Row::text).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }
}

/// Visible rows plus scrollback
pub struct ScreenBuffer {
    pub rows: Vec<Row>,
    /// Oldest first
    pub scrollback: Vec<Row>,
    pub scrollback_limit: usize,
    /// 0 = live view, >0 = scrolled back by that many rows
    pub scroll_offset: usize,
    pub dirty: bool,
}

impl ScreenBuffer {
    pub fn new(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
            scrollback: Vec::new(),
            scrollback_limit,
            scroll_offset: 0,
            dirty: true,
        }
    }

    pub fn resize(&mut self, new_cols: u16, new_rows: u16) {
        while self.rows.len() < new_rows as usize {
            self.rows.push(Row::new(new_cols));
        }
        self.rows.truncate(new_rows as usize);

        for row in &mut self.rows {
            row.resize(new_cols);
        }
        for row in &mut self.scrollback {
            row.resize(new_cols);
        }
        self.scroll_offset = self.scroll_offset.min(self.scrollback.len());
        self.mark_dirty();
    }

    pub fn push_to_scrollback(&mut self, row: Row) {
        if self.scrollback_limit == 0 {
            return;
        }
        self.scrollback.push(row);
        if self.scrollback.len() > self.scrollback_limit {
            let excess = self.scrollback.len() - self.scrollback_limit;
            self.scrollback.drain(..excess);
        }
    }

    /// Row shown at a visible position, accounting for the scroll offset
    pub fn get_row_at(&self, visible_row: usize) -> Option<&Row> {
        if self.scroll_offset == 0 {
            return self.rows.get(visible_row);
        }
        let total_scrollback = self.scrollback.len();
        let absolute = total_scrollback.saturating_sub(self.scroll_offset) + visible_row;
        if absolute < total_scrollback {
            self.scrollback.get(absolute)
        } else {
            self.rows.get(absolute - total_scrollback)
        }
    }

    pub fn scroll_view_up(&mut self, n: usize) {
        self.scroll_offset = (self.scroll_offset + n).min(self.scrollback.len());
        self.mark_dirty();
    }

    pub fn scroll_view_down(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
        self.mark_dirty();
    }

    pub fn scroll_to_bottom(&mut self) {
        if self.scroll_offset != 0 {
            self.scroll_offset = 0;
            self.mark_dirty();
        }
    }

    pub fn is_scrolled(&self) -> bool {
        self.scroll_offset > 0
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// A single row
#[derive(Clone)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub wrapped: bool,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
            wrapped: false,
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
    }

    pub fn clear(&mut self, attrs: &CellAttrs) {
        for cell in &mut self.cells {
            cell.clear(attrs);
        }
        self.wrapped = false;
    }

    pub fn text(&self) -> String {
        let mut text: String = self
            .cells
            .iter()
            .filter(|c| !c.is_continuation())
            .map(Cell::display_char)
            .collect();
        text.truncate(text.trim_end().len());
        text
    }
}

/// A single cell
#[derive(Clone)]
pub struct Cell {
    pub grapheme: String,
    pub width: u8,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            attrs: CellAttrs::default(),
        }
    }
}

impl Cell {
    pub fn clear(&mut self, attrs: &CellAttrs) {
        self.grapheme.clear();
        self.width = 1;
        self.attrs = attrs.clone();
    }

    pub fn continuation(attrs: &CellAttrs) -> Self {
        Self {
            grapheme: String::new(),
            width: 0,
            attrs: attrs.clone(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    /// Space if empty
    pub fn display_char(&self) -> &str {
        if self.grapheme.is_empty() {
            " "
        } else {
            &self.grapheme
        }
    }
}

/// Cell attributes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Color as set by SGR
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct AttrFlags: u8 {
        const BOLD      = 0b0000_0001;
        const DIM       = 0b0000_0010;
        const ITALIC    = 0b0000_0100;
        const UNDERLINE = 0b0000_1000;
        const INVERSE   = 0b0001_0000;
    }
}

/// Cursor state
#[derive(Clone, Debug, PartialEq)]
pub struct CursorState {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
        }
    }
}
