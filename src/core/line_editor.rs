//! Line editing
//!
//! Turns key events into edits of the in-progress input line, browses the
//! submitted-command history and echoes everything to the display sink.
//! A completed line is handed back to the caller for routing.

use bitflags::bitflags;

use super::sink::DisplaySink;

/// Erase one rendered column
const RUBOUT: &str = "\x08 \x08";

bitflags! {
    /// Modifier keys held during a key event
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
        const META  = 0b1000;
    }
}

impl Modifiers {
    /// Alt, Ctrl or Meta held
    pub fn is_chord(self) -> bool {
        self.intersects(Modifiers::CTRL | Modifiers::ALT | Modifiers::META)
    }
}

/// Key events the line editor understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyInput {
    Char(char, Modifiers),
    Enter,
    Backspace,
    Up,
    Down,
    /// Anything else; ignored
    Other,
}

impl KeyInput {
    /// Plain character with no modifiers
    pub fn char(ch: char) -> Self {
        KeyInput::Char(ch, Modifiers::empty())
    }
}

/// The unsubmitted input buffer. The cursor counts characters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Line {
    text: String,
    cursor: usize,
}

impl Line {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    /// Insert at the cursor and advance it
    pub fn insert(&mut self, ch: char) {
        let at = self.byte_offset(self.cursor);
        self.text.insert(at, ch);
        self.cursor += 1;
    }

    /// Remove the character before the cursor. False when at the start.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let at = self.byte_offset(self.cursor - 1);
        self.text.remove(at);
        self.cursor -= 1;
        true
    }

    /// Replace the contents, cursor at the end
    pub fn set(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.cursor = self.len();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

/// Submitted lines in submission order, with a browsing position.
///
/// `position == len()` means a fresh line is being edited.
#[derive(Clone, Debug, Default)]
pub struct History {
    entries: Vec<String>,
    position: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted line and stop browsing
    pub fn push(&mut self, line: String) {
        self.entries.push(line);
        self.position = self.entries.len();
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Step towards older entries. `None` at the oldest entry.
    pub fn back(&mut self) -> Option<&str> {
        if self.position == 0 {
            return None;
        }
        self.position -= 1;
        self.entries.get(self.position).map(String::as_str)
    }

    /// Step towards newer entries, yielding `""` on reaching the fresh line.
    /// `None` when already on the fresh line.
    pub fn forward(&mut self) -> Option<&str> {
        if self.position >= self.entries.len() {
            return None;
        }
        self.position += 1;
        Some(self.entries.get(self.position).map_or("", String::as_str))
    }
}

/// Key-driven editor for one session's input line
#[derive(Default)]
pub struct LineEditor {
    line: Line,
    history: History,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self) -> &Line {
        &self.line
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Apply one key event. Returns the trimmed line when Enter submits one.
    pub fn handle_key(&mut self, key: KeyInput, sink: &mut DisplaySink) -> Option<String> {
        match key {
            KeyInput::Enter => {
                let trimmed = self.line.as_str().trim().to_string();
                let submitted = if trimmed.is_empty() {
                    None
                } else {
                    self.history.push(trimmed.clone());
                    Some(trimmed)
                };
                self.line.clear();
                sink.write("\r\n");
                sink.write_prompt();
                submitted
            }
            KeyInput::Backspace => {
                if self.line.backspace() {
                    if sink.input_wraps() {
                        self.redraw(sink);
                    } else {
                        sink.write(RUBOUT);
                    }
                }
                None
            }
            KeyInput::Up => {
                if let Some(entry) = self.history.back() {
                    self.line.set(entry);
                    self.redraw(sink);
                }
                None
            }
            KeyInput::Down => {
                if let Some(entry) = self.history.forward() {
                    self.line.set(entry);
                    self.redraw(sink);
                }
                None
            }
            KeyInput::Char(ch, mods) => {
                if !mods.is_chord() && !ch.is_control() {
                    self.line.insert(ch);
                    let mut buf = [0u8; 4];
                    sink.write(ch.encode_utf8(&mut buf));
                }
                None
            }
            KeyInput::Other => None,
        }
    }

    /// Feed a finite key sequence, collecting submitted lines in order
    pub fn run<I>(&mut self, keys: I, sink: &mut DisplaySink) -> Vec<String>
    where
        I: IntoIterator<Item = KeyInput>,
    {
        keys.into_iter()
            .filter_map(|key| self.handle_key(key, sink))
            .collect()
    }

    /// Clear the rendered line and draw prompt plus current input
    pub fn redraw(&self, sink: &mut DisplaySink) {
        sink.erase_input();
        sink.write_prompt();
        sink.write(self.line.as_str());
    }
}
