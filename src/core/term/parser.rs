//! Escape sequence parser
//!
//! Consumes decoded characters and applies C0 controls, CSI and SGR
//! sequences to a [`TerminalState`]. OSC strings are consumed and ignored.

use super::state::{AttrFlags, Color, TerminalState};

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<char>,
    current_param: Option<u16>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    EscapeInOsc,
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
        }
    }

    /// Feed every character of `text`
    pub fn feed_str(&mut self, text: &str, state: &mut TerminalState) {
        for ch in text.chars() {
            self.feed(ch, state);
        }
    }

    /// Feed a single character
    pub fn feed(&mut self, ch: char, state: &mut TerminalState) {
        let in_osc = matches!(self.state, ParserState::OscString | ParserState::EscapeInOsc);
        if (ch as u32) < 0x20 && !in_osc {
            match ch {
                '\x1b' => self.enter_escape(),
                '\x08' => state.backspace(),
                '\t' => state.horizontal_tab(),
                '\n' | '\x0b' | '\x0c' => state.linefeed(),
                '\r' => state.carriage_return(),
                _ => {}
            }
            return;
        }

        match self.state {
            ParserState::Ground => self.ground(ch, state),
            ParserState::Escape => self.escape(ch, state),
            ParserState::CsiEntry => self.csi_entry(ch, state),
            ParserState::CsiParam => self.csi_param(ch, state),
            ParserState::CsiIntermediate => self.csi_intermediate(ch, state),
            ParserState::OscString => self.osc_string(ch),
            ParserState::EscapeInOsc => self.escape_in_osc(ch, state),
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn ground(&mut self, ch: char, state: &mut TerminalState) {
        if ch != '\x7f' {
            state.put_char(ch);
        }
    }

    fn escape(&mut self, ch: char, state: &mut TerminalState) {
        match ch {
            '[' => self.state = ParserState::CsiEntry,
            ']' => self.state = ParserState::OscString,
            'E' => {
                state.carriage_return();
                state.linefeed();
                self.state = ParserState::Ground;
            }
            'D' => {
                state.linefeed();
                self.state = ParserState::Ground;
            }
            'c' => {
                state.clear_all();
                self.state = ParserState::Ground;
            }
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_entry(&mut self, ch: char, state: &mut TerminalState) {
        match ch {
            '0'..='9' => {
                self.current_param = ch.to_digit(10).map(|d| d as u16);
                self.state = ParserState::CsiParam;
            }
            ';' => {
                self.params.push(0);
                self.state = ParserState::CsiParam;
            }
            '?' | '>' | '!' | '=' => self.intermediates.push(ch),
            ' '..='/' => {
                self.intermediates.push(ch);
                self.state = ParserState::CsiIntermediate;
            }
            '@'..='~' => self.execute_csi(ch, state),
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_param(&mut self, ch: char, state: &mut TerminalState) {
        match ch {
            '0'..='9' => {
                let digit = ch.to_digit(10).unwrap_or(0) as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            ';' | ':' => {
                self.params.push(self.current_param.take().unwrap_or(0));
            }
            ' '..='/' => {
                if let Some(p) = self.current_param.take() {
                    self.params.push(p);
                }
                self.intermediates.push(ch);
                self.state = ParserState::CsiIntermediate;
            }
            '@'..='~' => {
                if let Some(p) = self.current_param.take() {
                    self.params.push(p);
                }
                self.execute_csi(ch, state);
            }
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_intermediate(&mut self, ch: char, state: &mut TerminalState) {
        match ch {
            ' '..='/' => self.intermediates.push(ch),
            '@'..='~' => self.execute_csi(ch, state),
            _ => self.state = ParserState::Ground,
        }
    }

    fn osc_string(&mut self, ch: char) {
        match ch {
            '\x07' | '\u{9c}' => self.state = ParserState::Ground,
            '\x1b' => self.state = ParserState::EscapeInOsc,
            _ => {}
        }
    }

    fn escape_in_osc(&mut self, ch: char, state: &mut TerminalState) {
        if ch == '\\' {
            self.state = ParserState::Ground;
        } else {
            self.enter_escape();
            self.escape(ch, state);
        }
    }

    fn param(&self, index: usize, default: u16) -> u16 {
        self.params.get(index).copied().unwrap_or(default)
    }

    fn count(&self) -> u16 {
        self.param(0, 1).max(1)
    }

    fn execute_csi(&mut self, final_char: char, state: &mut TerminalState) {
        let private = !self.intermediates.is_empty();

        match (private, final_char) {
            (false, 'A') => state.cursor_up(self.count()),
            (false, 'B') => state.cursor_down(self.count()),
            (false, 'C') => state.cursor_forward(self.count()),
            (false, 'D') => state.cursor_backward(self.count()),
            (false, 'G') => state.cursor_column(self.param(0, 1)),
            (false, 'H') | (false, 'f') => {
                state.cursor_position(self.param(0, 1), self.param(1, 1))
            }
            (false, 'J') => state.erase_in_display(self.param(0, 0)),
            (false, 'K') => state.erase_in_line(self.param(0, 0)),
            (false, 'm') => self.execute_sgr(state),
            (true, 'h') | (true, 'l') if self.params.contains(&25) => {
                state.cursor.visible = final_char == 'h';
            }
            _ => {
                tracing::debug!(
                    "Unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                    self.intermediates,
                    self.params,
                    final_char
                );
            }
        }

        self.state = ParserState::Ground;
    }

    fn execute_sgr(&self, state: &mut TerminalState) {
        if self.params.is_empty() {
            state.current_attrs.reset();
            return;
        }

        let attrs = &mut state.current_attrs;
        let mut iter = self.params.iter().copied();

        while let Some(param) = iter.next() {
            match param {
                0 => attrs.reset(),
                1 => attrs.flags |= AttrFlags::BOLD,
                2 => attrs.flags |= AttrFlags::DIM,
                3 => attrs.flags |= AttrFlags::ITALIC,
                4 => attrs.flags |= AttrFlags::UNDERLINE,
                7 => attrs.flags |= AttrFlags::INVERSE,
                22 => attrs.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
                23 => attrs.flags &= !AttrFlags::ITALIC,
                24 => attrs.flags &= !AttrFlags::UNDERLINE,
                27 => attrs.flags &= !AttrFlags::INVERSE,
                30..=37 => attrs.fg = Color::Indexed((param - 30) as u8),
                38 => attrs.fg = extended_color(&mut iter).unwrap_or(attrs.fg),
                39 => attrs.fg = Color::Default,
                40..=47 => attrs.bg = Color::Indexed((param - 40) as u8),
                48 => attrs.bg = extended_color(&mut iter).unwrap_or(attrs.bg),
                49 => attrs.bg = Color::Default,
                90..=97 => attrs.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => attrs.bg = Color::Indexed((param - 100 + 8) as u8),
                _ => {}
            }
        }
    }
}

/// Parse the tail of `38;5;n` / `38;2;r;g;b`
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match iter.next()? {
        5 => iter.next().map(|n| Color::Indexed(n as u8)),
        2 => {
            let r = iter.next().unwrap_or(0) as u8;
            let g = iter.next().unwrap_or(0) as u8;
            let b = iter.next().unwrap_or(0) as u8;
            Some(Color::Rgb(r, g, b))
        }
        _ => None,
    }
}
