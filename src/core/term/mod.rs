//! Screen state and escape-sequence parsing for the display sink.

mod parser;
mod state;

pub use parser::VtParser;
pub use state::*;
