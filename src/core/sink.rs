//! Display sink
//!
//! The append-only styled text surface a terminal session writes to. Text is
//! interpreted through the escape-sequence parser into a fixed-geometry grid
//! with scrollback; the renderer paints that grid into the host view.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use super::term::{TerminalState, VtParser};

/// SGR reset
pub const RESET: &str = "\x1b[0m";

/// Erase the current row and return to column 0
const ERASE_LINE: &str = "\r\x1b[2K";

/// Inner width of the welcome banner box
const BANNER_WIDTH: usize = 38;

/// Smallest geometry a fit may produce
const MIN_COLS: u16 = 2;
const MIN_ROWS: u16 = 1;

/// Identifier of a host view a session can be bound to
pub type ViewId = u64;

/// A view that can host a terminal session
pub trait HostView {
    fn view_id(&self) -> ViewId;

    /// Content area in character cells (cols, rows), `None` before layout
    fn content_size(&self) -> Option<(u16, u16)>;
}

/// Styles the sink understands, expressed as SGR escapes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
    Bold,
    Info,
    Error,
    Success,
    Prompt,
    Hint,
}

impl Style {
    pub fn sgr(self) -> &'static str {
        match self {
            Style::Bold => "\x1b[1m",
            Style::Info => "\x1b[1;34m",
            Style::Error => "\x1b[31m",
            Style::Success => "\x1b[36m",
            Style::Prompt => "\x1b[32m",
            Style::Hint => "\x1b[90m",
        }
    }

    pub fn paint(self, text: &str) -> String {
        format!("{}{}{}", self.sgr(), text, RESET)
    }
}

/// Prompt decoration written before every input line
pub fn prompt() -> String {
    format!("{} ", Style::Prompt.paint("❯"))
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FitError {
    #[error("host view {0} has not been laid out")]
    Unmeasured(ViewId),

    #[error("host view {view} measured {cols}x{rows}")]
    ZeroSized { view: ViewId, cols: u16, rows: u16 },

    #[error("display sink has been released")]
    Released,
}

/// Scrolling, styled output surface of one session
pub struct DisplaySink {
    state: TerminalState,
    parser: VtParser,
    released: bool,
    written: usize,
}

impl DisplaySink {
    pub fn new(cols: u16, rows: u16, scrollback: usize) -> Self {
        Self {
            state: TerminalState::with_scrollback(cols, rows, scrollback),
            parser: VtParser::new(),
            released: false,
            written: 0,
        }
    }

    /// Write text as-is, no implicit newline
    pub fn write(&mut self, text: &str) {
        if self.released || text.is_empty() {
            return;
        }
        self.written += text.len();
        self.state.screen.scroll_to_bottom();
        self.parser.feed_str(text, &mut self.state);
    }

    /// Write text followed by a line break
    pub fn write_line(&mut self, text: &str) {
        self.write(text);
        self.write("\r\n");
    }

    pub fn write_styled(&mut self, style: Style, text: &str) {
        self.write(&style.paint(text));
    }

    pub fn write_styled_line(&mut self, style: Style, text: &str) {
        self.write_line(&style.paint(text));
    }

    /// Write multi-line text, normalizing bare `\n` to `\r\n`
    pub fn write_block(&mut self, style: Option<Style>, text: &str) {
        for line in text.trim_end_matches(['\r', '\n']).split('\n') {
            let line = line.trim_end_matches('\r');
            match style {
                Some(style) => self.write_styled_line(style, line),
                None => self.write_line(line),
            }
        }
    }

    pub fn write_prompt(&mut self) {
        self.write(&prompt());
    }

    /// Clear the prompt and pending input, including the rows it wrapped
    /// onto, and return to its first column
    pub fn erase_input(&mut self) {
        match self.state.wrapped_rows_above_cursor() {
            0 => self.write(ERASE_LINE),
            above => self.write(&format!("\r\x1b[{}A\x1b[0J", above)),
        }
    }

    /// Whether the prompt and pending input span more than the cursor row
    /// or the cursor sits past the last column
    pub fn input_wraps(&self) -> bool {
        self.state.wrapped_rows_above_cursor() > 0 || self.state.cursor.col >= self.state.cols
    }

    /// Wipe the visible grid and scrollback
    pub fn clear(&mut self) {
        if self.released {
            return;
        }
        self.state.clear_all();
    }

    /// Welcome banner written once per session
    pub fn write_banner(&mut self, title: &str, subtitle: &str) {
        let rule = "─".repeat(BANNER_WIDTH);
        self.write_styled_line(Style::Info, &format!("╭{}╮", rule));
        self.write_styled_line(Style::Info, &format!("│{:^width$}│", title, width = BANNER_WIDTH));
        self.write_styled_line(Style::Info, &format!("│{:^width$}│", subtitle, width = BANNER_WIDTH));
        self.write_styled_line(Style::Info, &format!("╰{}╯", rule));
        self.write_styled_line(Style::Hint, "Type \"help\" for available commands and examples");
        self.write("\r\n");
        self.write_prompt();
    }

    /// Recompute geometry from the host's current size.
    ///
    /// Returns `Ok(true)` when the geometry changed, `Ok(false)` when it
    /// already matched.
    pub fn resize_to_fit(&mut self, host: &dyn HostView) -> Result<bool, FitError> {
        if self.released {
            return Err(FitError::Released);
        }
        let view = host.view_id();
        let (cols, rows) = host.content_size().ok_or(FitError::Unmeasured(view))?;
        if cols == 0 || rows == 0 {
            return Err(FitError::ZeroSized { view, cols, rows });
        }

        let cols = cols.max(MIN_COLS);
        let rows = rows.max(MIN_ROWS);
        if (cols, rows) == self.geometry() {
            return Ok(false);
        }
        self.state.resize(cols, rows);
        Ok(true)
    }

    /// (cols, rows)
    pub fn geometry(&self) -> (u16, u16) {
        (self.state.cols, self.state.rows)
    }

    /// Drop grid resources; every later write is ignored
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state = TerminalState::with_scrollback(1, 1, 0);
        self.parser = VtParser::new();
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Total bytes accepted since creation
    pub fn bytes_written(&self) -> usize {
        self.written
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TerminalState {
        &mut self.state
    }

    /// Visible rows as plain text
    pub fn text(&self) -> Vec<String> {
        self.state.visible_text()
    }
}

/// Sink shared between the session and its dispatch worker
pub type SharedSink = Arc<Mutex<DisplaySink>>;

/// Lock a shared sink, recovering from a poisoned lock
pub fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, DisplaySink> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write access for asynchronous write-backs.
///
/// Writes are dropped once the owning session is no longer alive. Every block
/// starts on a cleared line and ends with a prompt redraw request.
#[derive(Clone)]
pub struct SinkHandle {
    sink: SharedSink,
    alive: Arc<AtomicBool>,
    redraw: Sender<()>,
}

impl SinkHandle {
    pub fn new(sink: SharedSink, alive: Arc<AtomicBool>, redraw: Sender<()>) -> Self {
        Self { sink, alive, redraw }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Write a block of complete lines in place of the current prompt line.
    /// Returns false if the write was dropped.
    pub fn emit(&self, write: impl FnOnce(&mut DisplaySink)) -> bool {
        if !self.is_alive() {
            return false;
        }
        {
            let mut sink = lock_sink(&self.sink);
            if sink.is_released() {
                return false;
            }
            sink.erase_input();
            write(&mut sink);
        }
        let _ = self.redraw.send(());
        true
    }

    /// Wipe the sink and request a prompt redraw
    pub fn clear(&self) -> bool {
        if !self.is_alive() {
            return false;
        }
        lock_sink(&self.sink).clear();
        let _ = self.redraw.send(());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct FixedHost(Option<(u16, u16)>);

    impl HostView for FixedHost {
        fn view_id(&self) -> ViewId {
            7
        }

        fn content_size(&self) -> Option<(u16, u16)> {
            self.0
        }
    }

    #[test]
    fn test_write_and_write_line() {
        let mut sink = DisplaySink::new(40, 5, 100);
        sink.write("abc");
        sink.write_line("def");
        sink.write("ghi");

        assert_eq!(sink.text(), vec!["abcdef", "ghi"]);
    }

    #[test]
    fn test_banner_ends_with_prompt() {
        let mut sink = DisplaySink::new(60, 12, 100);
        sink.write_banner("Welcome to ideterm", "Remote Commands Ready");

        let text = sink.text();
        assert!(text[1].contains("Welcome to ideterm"));
        assert!(text[4].starts_with("Type \"help\""));
        assert_eq!(text.last().map(String::as_str), Some("❯"));
        assert_eq!(text[0].chars().count(), BANNER_WIDTH + 2);
        assert_eq!(text[1].chars().count(), BANNER_WIDTH + 2);
    }

    #[test]
    fn test_write_block_normalizes_newlines() {
        let mut sink = DisplaySink::new(20, 5, 100);
        sink.write_block(None, "file1\nfile2\n");

        assert_eq!(sink.text(), vec!["file1", "file2"]);
        assert_eq!(sink.state().cursor.col, 0);
    }

    #[test]
    fn test_resize_to_fit_is_idempotent() {
        let mut sink = DisplaySink::new(80, 24, 100);
        let host = FixedHost(Some((100, 30)));

        assert_eq!(sink.resize_to_fit(&host), Ok(true));
        assert_eq!(sink.resize_to_fit(&host), Ok(false));
        assert_eq!(sink.geometry(), (100, 30));
    }

    #[test]
    fn test_resize_to_fit_rejects_unmeasured_hosts() {
        let mut sink = DisplaySink::new(80, 24, 100);

        assert_eq!(sink.resize_to_fit(&FixedHost(None)), Err(FitError::Unmeasured(7)));
        assert_eq!(
            sink.resize_to_fit(&FixedHost(Some((0, 10)))),
            Err(FitError::ZeroSized { view: 7, cols: 0, rows: 10 })
        );
        assert_eq!(sink.geometry(), (80, 24));
    }

    #[test]
    fn test_released_sink_ignores_writes() {
        let mut sink = DisplaySink::new(20, 5, 100);
        sink.write("before");
        let written = sink.bytes_written();

        sink.release();
        sink.write_line("after");
        sink.clear();

        assert!(sink.is_released());
        assert_eq!(sink.bytes_written(), written);
        assert!(sink.text().is_empty());
        assert_eq!(
            sink.resize_to_fit(&FixedHost(Some((10, 10)))),
            Err(FitError::Released)
        );
    }

    #[test]
    fn test_handle_replaces_prompt_line_and_requests_redraw() {
        let sink: SharedSink = Arc::new(Mutex::new(DisplaySink::new(20, 5, 100)));
        let alive = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();
        let handle = SinkHandle::new(sink.clone(), alive.clone(), tx);

        lock_sink(&sink).write_prompt();
        assert!(handle.emit(|s| s.write_line("output")));

        assert_eq!(lock_sink(&sink).text(), vec!["output"]);
        assert!(rx.try_recv().is_ok());

        alive.store(false, Ordering::SeqCst);
        assert!(!handle.emit(|s| s.write_line("late")));
        assert!(!handle.clear());
        assert_eq!(lock_sink(&sink).text(), vec!["output"]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_replaces_wrapped_input() {
        let sink: SharedSink = Arc::new(Mutex::new(DisplaySink::new(10, 5, 100)));
        let alive = Arc::new(AtomicBool::new(true));
        let (tx, _rx) = mpsc::channel();
        let handle = SinkHandle::new(sink.clone(), alive, tx);

        {
            let mut s = lock_sink(&sink);
            s.write_line("before");
            s.write_prompt();
            s.write("abcdefghijklmn");
            assert!(s.input_wraps());
        }
        assert!(handle.emit(|s| s.write_line("output")));

        let s = lock_sink(&sink);
        assert_eq!(s.text(), vec!["before", "output"]);
        assert!(!s.input_wraps());
    }
}
