//! Terminal renderer using crossterm
//!
//! Paints the title bar, the empty workspace and the terminal panel (header
//! plus the display sink's grid) to the console.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{
        Attribute, Color as TermColor, ResetColor, SetAttribute, SetBackgroundColor,
        SetForegroundColor,
    },
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::{Color, ColorScheme};
use crate::core::term::{AttrFlags, CellAttrs, Color as CellColor, TerminalState};
use crate::ui::panel::{Rect, TerminalPanel};

/// Status shown in the chrome
pub struct Status<'a> {
    /// Routing mode name
    pub mode: &'a str,
}

/// Pad or truncate `text` to exactly `width` columns
pub fn fit_to_width(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(width);
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.extend(std::iter::repeat(' ').take(width - used));
    out
}

/// Left and right aligned text on one line of `width` columns.
/// The right side wins when both do not fit.
fn spread(left: &str, right: &str, width: usize) -> String {
    let right_width = right.width();
    if right_width >= width {
        return fit_to_width(left, width);
    }
    let left = fit_to_width(left, width - right_width);
    format!("{}{}", left, right)
}

/// Header line of the terminal panel
pub fn header_text(width: usize, expanded: bool, scroll_offset: usize) -> String {
    let arrow = if expanded { "▾" } else { "▴" };
    let mut left = format!(" {} Terminal", arrow);
    if scroll_offset > 0 {
        left.push_str(&format!("  [↑ {} lines]", scroll_offset));
    }
    let toggle = if expanded { "^E collapse" } else { "^E expand" };
    let hints = [toggle, "^K clear", "^T theme", "^Q quit"];

    // Drop optional hints from the end until the line fits; ^E and ^K stay
    let mut shown = hints.len();
    let right = loop {
        let right = format!("{} ", hints[..shown].join("  "));
        if shown <= 2 || left.width() + right.width() < width {
            break right;
        }
        shown -= 1;
    };
    spread(&left, &right, width)
}

/// Resolve a cell color against the scheme
pub fn resolve_color(color: CellColor, scheme: &ColorScheme, foreground: bool) -> TermColor {
    match color {
        CellColor::Default if foreground => scheme.terminal_fg.to_crossterm(),
        CellColor::Default => scheme.terminal_bg.to_crossterm(),
        CellColor::Indexed(index) => scheme
            .ansi(index)
            .map(|c| c.to_crossterm())
            .unwrap_or(TermColor::AnsiValue(index)),
        CellColor::Rgb(r, g, b) => TermColor::Rgb { r, g, b },
    }
}

/// Terminal renderer
pub struct Renderer {
    /// Whether the terminal has been initialized
    initialized: bool,
    scheme: ColorScheme,
}

impl Renderer {
    pub fn new(scheme: ColorScheme) -> Self {
        Self {
            initialized: false,
            scheme,
        }
    }

    pub fn scheme(&self) -> &ColorScheme {
        &self.scheme
    }

    pub fn set_scheme(&mut self, scheme: ColorScheme) {
        self.scheme = scheme;
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            crossterm::event::EnableMouseCapture,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;

        stdout.flush()?;
        self.initialized = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(stdout, Show);
        let _ = execute!(stdout, EnableLineWrap);
        let _ = execute!(stdout, crossterm::event::DisableMouseCapture);
        let _ = execute!(stdout, LeaveAlternateScreen);
        let _ = stdout.flush();

        // Raw mode last; the shell must get its terminal back
        terminal::disable_raw_mode()?;
        Ok(())
    }

    /// Render a full frame
    pub fn render(
        &mut self,
        panel: &TerminalPanel,
        state: &TerminalState,
        status: &Status<'_>,
    ) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());

        // Begin synchronized update (reduces flicker)
        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        let (cols, _) = panel.screen_size();
        self.render_title(&mut out, cols, status)?;
        self.render_workspace(&mut out, panel.workspace_rect())?;

        let rect = panel.rect();
        if rect.height > 0 {
            let header = header_text(
                rect.width as usize,
                panel.is_expanded(),
                state.screen.scroll_offset,
            );
            self.paint_line(
                &mut out,
                rect.x,
                rect.y,
                &header,
                self.scheme.header_fg,
                self.scheme.header_bg,
            )?;
        }

        let content = panel.content_rect();
        self.render_grid(&mut out, content, state)?;

        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;

        let cursor = &state.cursor;
        let on_screen = cursor.col < content.width && cursor.row < content.height;
        if cursor.visible && on_screen && !state.screen.is_scrolled() {
            queue!(out, MoveTo(content.x + cursor.col, content.y + cursor.row), Show)?;
        }

        // End synchronized update
        write!(out, "\x1b[?2026l")?;
        out.flush()
    }

    fn render_title<W: Write>(&self, out: &mut W, cols: u16, status: &Status<'_>) -> io::Result<()> {
        let left = format!(" ideterm · {} mode", status.mode);
        let right = format!("{} ", self.scheme.name);
        let line = spread(&left, &right, cols as usize);
        self.paint_line(out, 0, 0, &line, self.scheme.title_fg, self.scheme.title_bg)
    }

    fn render_workspace<W: Write>(&self, out: &mut W, rect: Rect) -> io::Result<()> {
        let blank = " ".repeat(rect.width as usize);
        for row in 0..rect.height {
            self.paint_line(
                out,
                rect.x,
                rect.y + row,
                &blank,
                self.scheme.workspace_fg,
                self.scheme.workspace_bg,
            )?;
        }
        Ok(())
    }

    fn paint_line<W: Write>(
        &self,
        out: &mut W,
        x: u16,
        y: u16,
        text: &str,
        fg: Color,
        bg: Color,
    ) -> io::Result<()> {
        queue!(
            out,
            MoveTo(x, y),
            SetAttribute(Attribute::Reset),
            SetForegroundColor(fg.to_crossterm()),
            SetBackgroundColor(bg.to_crossterm())
        )?;
        write!(out, "{}", text)
    }

    /// Grid rows into `rect`, line by line, batching runs of equal attributes
    fn render_grid<W: Write>(&self, out: &mut W, rect: Rect, state: &TerminalState) -> io::Result<()> {
        let blank = " ".repeat(rect.width as usize);
        let mut line_buffer = String::with_capacity(256);

        for row_idx in 0..rect.height {
            let y = rect.y + row_idx;
            self.paint_line(
                out,
                rect.x,
                y,
                &blank,
                self.scheme.terminal_fg,
                self.scheme.terminal_bg,
            )?;

            let row = match state.screen.get_row_at(row_idx as usize) {
                Some(r) => r,
                None => continue,
            };
            queue!(out, MoveTo(rect.x, y))?;

            let mut current_attrs = CellAttrs::default();
            let mut col_idx: u16 = 0;
            line_buffer.clear();

            for cell in &row.cells {
                if cell.is_continuation() {
                    continue;
                }
                let width = u16::from(cell.width.max(1));
                if col_idx + width > rect.width {
                    break;
                }

                if cell.attrs != current_attrs {
                    if !line_buffer.is_empty() {
                        self.apply_attrs(out, &current_attrs)?;
                        write!(out, "{}", line_buffer)?;
                        line_buffer.clear();
                    }
                    current_attrs = cell.attrs.clone();
                }

                line_buffer.push_str(cell.display_char());
                col_idx += width;
            }

            if !line_buffer.is_empty() {
                self.apply_attrs(out, &current_attrs)?;
                write!(out, "{}", line_buffer)?;
            }
        }
        Ok(())
    }

    /// Apply cell attributes
    fn apply_attrs<W: Write>(&self, out: &mut W, attrs: &CellAttrs) -> io::Result<()> {
        queue!(out, SetAttribute(Attribute::Reset))?;

        if attrs.flags.contains(AttrFlags::BOLD) {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if attrs.flags.contains(AttrFlags::DIM) {
            queue!(out, SetAttribute(Attribute::Dim))?;
        }
        if attrs.flags.contains(AttrFlags::ITALIC) {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if attrs.flags.contains(AttrFlags::UNDERLINE) {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }

        let mut fg = resolve_color(attrs.fg, &self.scheme, true);
        let mut bg = resolve_color(attrs.bg, &self.scheme, false);
        if attrs.flags.contains(AttrFlags::INVERSE) {
            std::mem::swap(&mut fg, &mut bg);
        }
        queue!(out, SetForegroundColor(fg), SetBackgroundColor(bg))
    }

    /// Get terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_to_width_pads_and_truncates() {
        assert_eq!(fit_to_width("abc", 5), "abc  ");
        assert_eq!(fit_to_width("abcdef", 4), "abcd");
        // A wide char that would straddle the edge is dropped
        assert_eq!(fit_to_width("a日本", 4), "a日 ");
    }

    #[test]
    fn test_header_text() {
        let header = header_text(60, false, 0);
        assert_eq!(header.width(), 60);
        assert!(header.starts_with(" ▴ Terminal"));
        assert!(header.trim_end().ends_with("^Q quit"));

        let header = header_text(60, true, 12);
        assert!(header.contains("[↑ 12 lines]"));
        assert!(header.contains("^E collapse"));

        assert!(!header.contains("^Q quit"));

        // Key hints win over the scroll indicator on a narrow screen
        let header = header_text(36, true, 12);
        assert_eq!(header.width(), 36);
        assert!(header.ends_with("^E collapse  ^K clear "));
        assert!(header.starts_with(" ▾ Terminal"));

        assert_eq!(header_text(8, true, 0), " ▾ Termi");
    }

    #[test]
    fn test_resolve_color_uses_scheme_palette() {
        let scheme = ColorScheme::tokyo_night();

        assert_eq!(
            resolve_color(CellColor::Indexed(2), &scheme, true),
            scheme.ansi[2].to_crossterm()
        );
        assert_eq!(
            resolve_color(CellColor::Default, &scheme, false),
            scheme.terminal_bg.to_crossterm()
        );
        assert_eq!(
            resolve_color(CellColor::Indexed(200), &scheme, true),
            TermColor::AnsiValue(200)
        );
        assert_eq!(
            resolve_color(CellColor::Rgb(1, 2, 3), &scheme, true),
            TermColor::Rgb { r: 1, g: 2, b: 3 }
        );
    }
}
