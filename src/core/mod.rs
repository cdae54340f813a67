//! Core terminal session components.
//!
//! - **term**: screen grid with scrollback and the escape-sequence parser
//! - **sink**: display sink a session writes to, plus the liveness-guarded handle
//! - **line_editor**: input line and command history driven by key events
//! - **router**: builtins and remote routing of submitted lines
//! - **remote**: HTTP execution and translation endpoints
//! - **session**: sessions bound to host views, FIFO dispatch worker
//!
//! # Architecture
//!
//! ```text
//! SessionManager
//! └── Session (one per host view)
//!     ├── LineEditor (Line + History)
//!     ├── DisplaySink
//!     │   ├── TerminalState (cell grid + scrollback)
//!     │   └── VtParser
//!     └── dispatch worker ── CommandRouter
//!                            ├── CommandExecutor   (HttpExecutor)
//!                            └── CommandTranslator (ChatTranslator)
//! ```

pub mod line_editor;
pub mod remote;
pub mod router;
pub mod session;
pub mod sink;
pub mod term;
