//! User interface rendering and input handling.
//!
//! - **panel**: the terminal panel host view and its expand/collapse animation
//! - **renderer**: paints the chrome and the display sink grid
//! - **keymapper**: keyboard and mouse input to shortcuts and editor keys

pub mod keymapper;
pub mod panel;
pub mod renderer;

pub use keymapper::{AppAction, KeyMapper};
pub use panel::TerminalPanel;
pub use renderer::{Renderer, Status};
