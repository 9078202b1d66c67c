use std::io::{self, Write};
use std::time::Instant;

use super::ansi::{AnsiFilter, Filtered, StyleSet};
use super::screen;
use super::state::{next_tab_stop, TermSize, TerminalState};
use super::status::StatusLine;
use crate::stats::StatSampler;

pub const SHADOW_CAPACITY: usize = 2048;

const BACKSPACE: u8 = 0x08;
const VERTICAL_TAB: u8 = 0x0b;
const FORM_FEED: u8 = 0x0c;

/// Printable bytes of the current logical line, kept so the line can be
/// replayed after the screen is wiped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowLine {
    bytes: Vec<u8>,
}

impl ShadowLine {
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(SHADOW_CAPACITY),
        }
    }

    /// Appends a byte, dropping it once the line is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.bytes.len() >= SHADOW_CAPACITY {
            return false;
        }
        self.bytes.push(byte);
        true
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.bytes.pop()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.bytes, Vec::with_capacity(SHADOW_CAPACITY))
    }
}

fn is_utf8_continuation(byte: u8) -> bool {
    (0x80..=0xbf).contains(&byte)
}

/// Owns every piece of display state: the terminal geometry, the escape
/// filter, the shadow of the current line and the status line. All terminal
/// output goes through here so callers only need to serialize access to one
/// value.
pub struct LineRenderer<W: Write> {
    out: W,
    state: TerminalState,
    filter: AnsiFilter,
    shadow: ShadowLine,
    status: StatusLine,
    sampler: StatSampler,
    /// Rows of the finished compact line still on screen, erased lazily by
    /// the next printable byte.
    pending_clear: Option<usize>,
}

impl<W: Write> LineRenderer<W> {
    pub fn new(out: W, state: TerminalState, status: StatusLine, sampler: StatSampler) -> Self {
        Self {
            out,
            state,
            filter: AnsiFilter::new(),
            shadow: ShadowLine::new(),
            status,
            sampler,
            pending_clear: None,
        }
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    pub fn styles(&self) -> &StyleSet {
        self.filter.styles()
    }

    pub fn shadow(&self) -> &ShadowLine {
        &self.shadow
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Makes room for the status line below the cursor.
    pub fn start(&mut self) -> io::Result<()> {
        screen::reserve_status_row(&mut self.out)?;
        self.out.flush()
    }

    /// Renders one chunk of child output.
    pub fn feed(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            match self.filter.feed(byte) {
                Filtered::Pass(byte) => self.emit(byte)?,
                Filtered::Verbatim(sequence) => self.out.write_all(sequence)?,
                Filtered::Swallow => {}
            }
        }
        self.out.flush()
    }

    /// Renders a keystroke forwarded to the child. Only printable ASCII is
    /// echoed, and it never touches the escape parser's state.
    pub fn echo_input(&mut self, byte: u8) -> io::Result<()> {
        if !(0x20..=0x7e).contains(&byte) {
            return Ok(());
        }
        self.put_printable(byte)?;
        self.out.flush()
    }

    fn emit(&mut self, byte: u8) -> io::Result<()> {
        match byte {
            b'\t' => self.expand_tab(),
            b'\n' | b'\r' | VERTICAL_TAB | FORM_FEED => self.line_break(byte),
            BACKSPACE => self.backspace(),
            0x20..=0x7e | 0x80..=0xff => self.put_printable(byte),
            _ => Ok(()),
        }
    }

    fn expand_tab(&mut self) -> io::Result<()> {
        let stop = next_tab_stop(self.state.printable_count());
        while self.state.printable_count() < stop {
            self.put_printable(b' ')?;
        }
        Ok(())
    }

    fn line_break(&mut self, byte: u8) -> io::Result<()> {
        if self.state.is_verbose() {
            return match byte {
                b'\n' => {
                    screen::reset_format(&mut self.out)?;
                    screen::advance_row(&mut self.out, self.state.wrapped_rows(), self.state.size())?;
                    self.state.set_printable_count(0);
                    self.status.advance_spinner();
                    self.repaint_status()
                }
                b'\r' => {
                    screen::return_to_start_line(&mut self.out, self.state.wrapped_rows(), false)?;
                    self.state.set_printable_count(0);
                    Ok(())
                }
                _ => Ok(()),
            };
        }

        if self.pending_clear.is_none() {
            self.pending_clear = Some(self.state.wrapped_rows());
            self.state.set_printable_count(0);
            self.shadow.clear();
            self.status.advance_spinner();
        }
        Ok(())
    }

    fn backspace(&mut self) -> io::Result<()> {
        self.out.write_all(&[BACKSPACE])?;
        self.state.retreat();
        self.shadow.pop();
        Ok(())
    }

    fn put_printable(&mut self, byte: u8) -> io::Result<()> {
        if let Some(rows) = self.pending_clear.take() {
            self.repaint_status()?;
            screen::return_to_start_line(&mut self.out, rows, true)?;
        }

        let advances = !is_utf8_continuation(byte);
        if advances && self.state.at_wrap_boundary() {
            screen::advance_row(&mut self.out, self.state.wrapped_rows(), self.state.size())?;
            self.repaint_status()?;
        }

        if !self.state.is_verbose() {
            self.shadow.push(byte);
        }
        self.out.write_all(&[byte])?;
        if advances {
            self.state.advance(1);
        }
        Ok(())
    }

    /// Redraws the status line from the last readings, then puts the child's
    /// styles back in effect.
    fn repaint_status(&mut self) -> io::Result<()> {
        screen::reset_format(&mut self.out)?;
        let text = self.status.compose(
            self.state.elapsed(),
            &self.sampler.last(),
            self.state.columns(),
        );
        screen::write_status_line(&mut self.out, self.state.size(), &text)?;
        self.filter.styles().write_to(&mut self.out)
    }

    /// Periodic refresh: samples every metric and repaints the status line.
    pub fn tick(&mut self, now: Instant) -> io::Result<()> {
        self.sampler.refresh(now);
        self.repaint_status()?;
        self.out.flush()
    }

    /// Records a new terminal size. The first resize of a burst also wipes
    /// what may have been mangled by the terminal reflowing its contents.
    pub fn begin_resize(&mut self, size: TermSize, first_in_burst: bool) -> io::Result<()> {
        self.state.resize(size);
        tracing::debug!(
            columns = size.columns,
            rows = size.rows,
            first_in_burst,
            "terminal resized"
        );
        if first_in_burst {
            if self.state.is_verbose() {
                screen::tidy_status_line(&mut self.out, self.state.size())?;
            } else {
                screen::clear_screen(&mut self.out, &mut self.state)?;
            }
        }
        self.out.flush()
    }

    /// Rebuilds the view after a resize burst has settled.
    pub fn repaint(&mut self) -> io::Result<()> {
        tracing::debug!(
            shadow_len = self.shadow.len(),
            printable_count = self.state.printable_count(),
            "repainting"
        );
        if !self.state.is_verbose() {
            screen::clear_screen(&mut self.out, &mut self.state)?;
            self.pending_clear = None;
            self.filter.styles().write_to(&mut self.out)?;
            let line = self.shadow.take();
            self.state.set_printable_count(0);
            for byte in line {
                self.put_printable(byte)?;
            }
        }
        self.repaint_status()?;
        self.out.flush()
    }

    /// Normal shutdown: leaves the cursor on the last row with the status
    /// line erased and the alternate buffer closed.
    pub fn finish(&mut self) -> io::Result<()> {
        screen::leave_alternate_screen(&mut self.out, &mut self.state)?;
        screen::reset_format(&mut self.out)?;
        screen::goto_status_line(&mut self.out, self.state.size())?;
        self.out.flush()
    }

    /// Best-effort cleanup on interruption.
    pub fn abort(&mut self) -> io::Result<()> {
        screen::tidy_status_line(&mut self.out, self.state.size())?;
        screen::reset_format(&mut self.out)?;
        screen::leave_alternate_screen(&mut self.out, &mut self.state)?;
        self.out.flush()
    }
}

#[cfg(test)]
#[path = "../tests/render_tests.rs"]
mod tests;
