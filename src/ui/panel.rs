//! Terminal panel
//!
//! The panel docked at the bottom of the screen that hosts the terminal
//! session. It can be collapsed to a few rows or expanded to fill everything
//! below the title bar; switching animates the height.

use std::time::{Duration, Instant};

use crate::core::sink::{HostView, ViewId};

/// Length of the expand/collapse animation
pub const TRANSITION: Duration = Duration::from_millis(200);

/// Rows taken by the title bar above the workspace
pub const TITLE_ROWS: u16 = 1;

/// Rows taken by the panel header
pub const HEADER_ROWS: u16 = 1;

/// A rectangle in screen cells
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

#[derive(Clone, Copy, Debug)]
struct Transition {
    from: u16,
    to: u16,
    started: Instant,
}

pub struct TerminalPanel {
    id: ViewId,
    /// Outer window size (cols, rows)
    screen: (u16, u16),
    collapsed_rows: u16,
    expanded: bool,
    /// Current height, header included
    height: u16,
    transition: Option<Transition>,
}

impl TerminalPanel {
    pub fn new(id: ViewId, screen: (u16, u16), collapsed_rows: u16, expanded: bool) -> Self {
        let mut panel = Self {
            id,
            screen,
            collapsed_rows: collapsed_rows.max(HEADER_ROWS + 1),
            expanded,
            height: 0,
            transition: None,
        };
        panel.height = panel.target_height();
        panel
    }

    fn available_rows(&self) -> u16 {
        self.screen.1.saturating_sub(TITLE_ROWS)
    }

    /// Height the panel settles at in its current state
    pub fn target_height(&self) -> u16 {
        let available = self.available_rows();
        if self.expanded {
            available
        } else {
            self.collapsed_rows.min(available)
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Switch between collapsed and expanded, starting the animation.
    /// Returns the new state.
    pub fn toggle(&mut self, now: Instant) -> bool {
        self.expanded = !self.expanded;
        self.transition = Some(Transition {
            from: self.height,
            to: self.target_height(),
            started: now,
        });
        self.expanded
    }

    /// Advance the animation. Returns true when the height changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(transition) = self.transition else {
            return false;
        };

        let elapsed = now.saturating_duration_since(transition.started);
        let height = if elapsed >= TRANSITION {
            self.transition = None;
            transition.to
        } else {
            let progress = elapsed.as_secs_f32() / TRANSITION.as_secs_f32();
            let from = f32::from(transition.from);
            let to = f32::from(transition.to);
            (from + (to - from) * progress).round() as u16
        };

        let changed = height != self.height;
        self.height = height;
        changed
    }

    /// The outer window was resized; snap to the new layout
    pub fn set_screen_size(&mut self, cols: u16, rows: u16) {
        self.screen = (cols, rows);
        self.transition = None;
        self.height = self.target_height();
    }

    pub fn screen_size(&self) -> (u16, u16) {
        self.screen
    }

    /// The whole panel, header included
    pub fn rect(&self) -> Rect {
        Rect {
            x: 0,
            y: self.screen.1.saturating_sub(self.height),
            width: self.screen.0,
            height: self.height,
        }
    }

    /// Area below the header where the terminal grid is drawn
    pub fn content_rect(&self) -> Rect {
        let rect = self.rect();
        let header = HEADER_ROWS.min(rect.height);
        Rect {
            y: rect.y + header,
            height: rect.height - header,
            ..rect
        }
    }

    /// Empty area between the title bar and the panel
    pub fn workspace_rect(&self) -> Rect {
        let top = TITLE_ROWS.min(self.screen.1);
        Rect {
            x: 0,
            y: top,
            width: self.screen.0,
            height: self.rect().y.saturating_sub(top),
        }
    }
}

impl HostView for TerminalPanel {
    fn view_id(&self) -> ViewId {
        self.id
    }

    fn content_size(&self) -> Option<(u16, u16)> {
        if self.screen.0 == 0 || self.screen.1 == 0 {
            return None;
        }
        let content = self.content_rect();
        Some((content.width, content.height))
    }
}
