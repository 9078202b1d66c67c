//! Live single-line view of a child's output with a status line pinned to
//! the bottom row.

pub mod ansi;
pub mod guard;
pub mod redraw;
pub mod render;
pub mod screen;
pub mod state;
pub mod status;

pub use ansi::{AnsiFilter, Filtered, StyleSet};
pub use guard::DisplayGuard;
pub use redraw::{RedrawCoordinator, RedrawTarget};
pub use render::{LineRenderer, ShadowLine};
pub use state::{RenderMode, TermSize, TerminalState};
pub use status::{Spinner, StatusLine};
