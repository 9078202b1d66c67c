use std::time::{Duration, Instant};

pub const TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Only the most recent logical line stays on screen.
    Compact,
    /// Everything scrolls past; the status line stays pinned at the bottom.
    Verbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub columns: u16,
    pub rows: u16,
}

impl TermSize {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerminalState {
    size: TermSize,
    printable_count: usize,
    alternate_buffer_active: bool,
    start: Instant,
    mode: RenderMode,
}

impl TerminalState {
    pub fn new(size: TermSize, start: Instant, mode: RenderMode) -> Self {
        Self {
            size: TermSize::new(size.columns, size.rows),
            printable_count: 0,
            alternate_buffer_active: false,
            start,
            mode,
        }
    }

    pub fn size(&self) -> TermSize {
        self.size
    }

    pub fn columns(&self) -> u16 {
        self.size.columns
    }

    pub fn rows(&self) -> u16 {
        self.size.rows
    }

    pub fn resize(&mut self, size: TermSize) {
        self.size = TermSize::new(size.columns, size.rows);
    }

    pub fn is_verbose(&self) -> bool {
        self.mode == RenderMode::Verbose
    }

    pub fn printable_count(&self) -> usize {
        self.printable_count
    }

    pub(crate) fn set_printable_count(&mut self, count: usize) {
        self.printable_count = count;
    }

    pub(crate) fn advance(&mut self, columns: usize) {
        self.printable_count = self.printable_count.saturating_add(columns);
    }

    pub(crate) fn retreat(&mut self) {
        self.printable_count = self.printable_count.saturating_sub(1);
    }

    pub fn alternate_buffer_active(&self) -> bool {
        self.alternate_buffer_active
    }

    pub(crate) fn set_alternate_buffer(&mut self, active: bool) {
        self.alternate_buffer_active = active;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Terminal rows taken by the current logical line.
    pub fn wrapped_rows(&self) -> usize {
        wrapped_rows(self.printable_count, self.size.columns)
    }

    /// True when the next cursor-advancing byte has to start a new row.
    pub fn at_wrap_boundary(&self) -> bool {
        at_wrap_boundary(self.printable_count, self.size.columns)
    }

    /// Zero-based row of the cursor within the logical line.
    pub fn cursor_row(&self) -> usize {
        self.printable_count / usize::from(self.size.columns)
    }

    /// Zero-based column of the cursor within its row.
    pub fn cursor_column(&self) -> usize {
        self.printable_count % usize::from(self.size.columns)
    }
}

pub fn wrapped_rows(printable_count: usize, columns: u16) -> usize {
    printable_count.div_ceil(usize::from(columns.max(1)))
}

pub fn at_wrap_boundary(printable_count: usize, columns: u16) -> bool {
    printable_count > 0 && printable_count % usize::from(columns.max(1)) == 0
}

/// Tab stops sit at multiples of [`TAB_WIDTH`] counted from the start of the
/// logical line, regardless of where the terminal rows break.
pub fn next_tab_stop(printable_count: usize) -> usize {
    (printable_count / TAB_WIDTH + 1) * TAB_WIDTH
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(columns: u16, count: usize) -> TerminalState {
        let mut state = TerminalState::new(
            TermSize::new(columns, 24),
            Instant::now(),
            RenderMode::Compact,
        );
        state.set_printable_count(count);
        state
    }

    #[test]
    fn wrapped_rows_is_ceiling_division() {
        for columns in 1u16..=40 {
            for count in 0usize..=200 {
                let expected = (count + usize::from(columns) - 1) / usize::from(columns);
                assert_eq!(wrapped_rows(count, columns), expected, "{count}/{columns}");
            }
        }
    }

    #[test]
    fn wrapped_rows_matches_fresh_computation_after_resize() {
        let mut resized = state(80, 173);
        assert_eq!(resized.wrapped_rows(), 3);
        for columns in [1u16, 7, 10, 33, 80, 200] {
            resized.resize(TermSize::new(columns, 24));
            assert_eq!(resized.wrapped_rows(), state(columns, 173).wrapped_rows());
        }
    }

    #[test]
    fn zero_sized_terminal_is_clamped() {
        let size = TermSize::new(0, 0);
        assert_eq!(size, TermSize::new(1, 1));
        assert_eq!(wrapped_rows(5, 0), 5);
    }

    #[test]
    fn wrap_boundary_only_on_full_rows() {
        assert!(!at_wrap_boundary(0, 10));
        assert!(!at_wrap_boundary(9, 10));
        assert!(at_wrap_boundary(10, 10));
        assert!(!at_wrap_boundary(11, 10));
        assert!(at_wrap_boundary(20, 10));
    }

    #[test]
    fn tab_stops_follow_logical_line() {
        assert_eq!(next_tab_stop(0), 8);
        assert_eq!(next_tab_stop(3), 8);
        assert_eq!(next_tab_stop(8), 16);
        assert_eq!(next_tab_stop(79), 80);
    }

    #[test]
    fn cursor_position_rolls_into_next_row() {
        let at_edge = state(80, 80);
        assert_eq!(at_edge.cursor_row(), 1);
        assert_eq!(at_edge.cursor_column(), 0);
        assert_eq!(at_edge.wrapped_rows(), 1);
    }
}
