//! Cursor, scroll and clear sequences used to keep the child's line above a
//! status line pinned to the last terminal row.

use std::io::{self, Write};

use crossterm::cursor::{MoveTo, MoveToColumn, MoveUp, RestorePosition, SavePosition};
use crossterm::queue;
use crossterm::style::{Attribute, SetAttribute};
use crossterm::terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, ScrollUp};

use super::state::{TermSize, TerminalState};

fn rows_u16(rows: usize) -> u16 {
    u16::try_from(rows).unwrap_or(u16::MAX)
}

pub fn reset_format<W: Write>(out: &mut W) -> io::Result<()> {
    queue!(out, SetAttribute(Attribute::Reset))
}

/// Leaves an empty row under the cursor for the status line.
pub fn reserve_status_row<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(b"\n")?;
    queue!(out, MoveUp(1))
}

/// Moves to column 0 of the first row of a logical line spanning `rows` rows,
/// optionally erasing every row on the way up.
pub fn return_to_start_line<W: Write>(out: &mut W, rows: usize, clear_text: bool) -> io::Result<()> {
    if clear_text {
        for _ in 1..rows {
            queue!(out, Clear(ClearType::CurrentLine), MoveUp(1))?;
        }
        queue!(out, Clear(ClearType::CurrentLine))?;
    } else if rows > 1 {
        queue!(out, MoveUp(rows_u16(rows - 1)))?;
    }
    queue!(out, MoveToColumn(0))
}

/// Starts a new terminal row for the current logical line while keeping a
/// free row below it for the status line.
pub fn advance_row<W: Write>(out: &mut W, rows_used: usize, size: TermSize) -> io::Result<()> {
    if rows_used >= usize::from(size.rows).saturating_sub(2) {
        out.write_all(b"\n")?;
        queue!(out, ScrollUp(1), MoveUp(1))
    } else {
        out.write_all(b"\n\n")?;
        queue!(out, MoveUp(1))
    }
}

/// Clears everything below the cursor and moves to the status row.
pub fn goto_status_line<W: Write>(out: &mut W, size: TermSize) -> io::Result<()> {
    queue!(
        out,
        Clear(ClearType::FromCursorDown),
        MoveTo(0, size.rows.saturating_sub(1))
    )
}

pub fn write_status_line<W: Write>(out: &mut W, size: TermSize, text: &str) -> io::Result<()> {
    queue!(out, SavePosition)?;
    goto_status_line(out, size)?;
    out.write_all(text.as_bytes())?;
    queue!(out, RestorePosition)
}

/// Erases the status line without moving the cursor.
pub fn tidy_status_line<W: Write>(out: &mut W, size: TermSize) -> io::Result<()> {
    reset_format(out)?;
    queue!(out, SavePosition)?;
    goto_status_line(out, size)?;
    queue!(out, RestorePosition)
}

/// Wipes the viewport. The first call moves the view into the alternate
/// screen buffer so the original scrollback survives the session.
pub fn clear_screen<W: Write>(out: &mut W, state: &mut TerminalState) -> io::Result<()> {
    if state.alternate_buffer_active() {
        queue!(
            out,
            Clear(ClearType::All),
            Clear(ClearType::Purge),
            MoveTo(0, 0)
        )
    } else {
        return_to_start_line(out, state.wrapped_rows(), false)?;
        queue!(
            out,
            Clear(ClearType::FromCursorDown),
            EnterAlternateScreen,
            Clear(ClearType::Purge),
            MoveTo(0, 0)
        )?;
        state.set_alternate_buffer(true);
        Ok(())
    }
}

pub fn leave_alternate_screen<W: Write>(out: &mut W, state: &mut TerminalState) -> io::Result<()> {
    if state.alternate_buffer_active() {
        queue!(out, LeaveAlternateScreen)?;
        state.set_alternate_buffer(false);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::state::RenderMode;
    use std::time::Instant;

    #[test]
    fn return_to_start_clears_each_wrapped_row() {
        let mut out = Vec::new();
        return_to_start_line(&mut out, 3, true).expect("write");
        let rendered = String::from_utf8(out).expect("utf8");
        assert_eq!(rendered.matches("\x1b[2K").count(), 3);
        assert_eq!(rendered.matches("\x1b[1A").count(), 2);
    }

    #[test]
    fn return_to_start_without_clearing_never_emits_zero_moves() {
        let mut out = Vec::new();
        return_to_start_line(&mut out, 1, false).expect("write");
        let rendered = String::from_utf8(out).expect("utf8");
        assert!(!rendered.contains('A'));
    }

    #[test]
    fn clear_screen_switches_to_alternate_buffer_once() {
        let mut state = TerminalState::new(TermSize::new(20, 5), Instant::now(), RenderMode::Compact);
        let mut out = Vec::new();
        clear_screen(&mut out, &mut state).expect("first clear");
        assert!(state.alternate_buffer_active());
        let first = String::from_utf8(std::mem::take(&mut out)).expect("utf8");
        assert!(first.contains("\x1b[?1049h"));

        clear_screen(&mut out, &mut state).expect("second clear");
        let second = String::from_utf8(out).expect("utf8");
        assert!(!second.contains("\x1b[?1049h"));
        assert!(second.contains("\x1b[2J"));
    }
}
