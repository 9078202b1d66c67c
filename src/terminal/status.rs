//! Composes the status line: elapsed clock, spinner and resource readings.

use std::time::Duration;

use anstyle::Style;

use crate::stats::{Metric, MetricValue, Reading, Readings};
use crate::ui::theme::Theme;

const SPINNER_GLYPHS: [char; 4] = ['-', '\\', '|', '/'];
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Spinner {
    phase: usize,
}

impl Spinner {
    pub fn glyph(&self) -> char {
        SPINNER_GLYPHS[self.phase % SPINNER_GLYPHS.len()]
    }

    pub fn advance(&mut self) {
        self.phase = (self.phase + 1) % SPINNER_GLYPHS.len();
    }
}

pub fn format_clock(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs() % SECONDS_PER_DAY;
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

pub fn format_reading(reading: &Reading) -> String {
    match (reading.metric, reading.value) {
        (_, MetricValue::Rates { rx, tx }) => format!("Rx/Tx: {rx:4.1}KB/s / {tx:.1}KB/s"),
        (Metric::Cpu, MetricValue::Percent(value)) => format!("CPU: {value:4.1}%"),
        (Metric::Memory, MetricValue::Percent(value)) => format!("Mem: {value:4.1}%"),
        (Metric::Disk, MetricValue::Percent(value)) => format!("Disk: {value:4.1}%"),
        (Metric::Network, MetricValue::Percent(value)) => format!("Net: {value:4.1}%"),
    }
}

#[derive(Debug, Clone)]
pub struct StatusLine {
    spinner: Spinner,
    color_enabled: bool,
    theme: Theme,
}

impl StatusLine {
    pub fn new(color_enabled: bool) -> Self {
        Self {
            spinner: Spinner::default(),
            color_enabled,
            theme: Theme::default(),
        }
    }

    pub fn advance_spinner(&mut self) {
        self.spinner.advance();
    }

    fn paint(&self, out: &mut String, style: Style, text: &str) {
        if self.color_enabled {
            out.push_str(&format!("{}{}{}", style.render(), text, style.render_reset()));
        } else {
            out.push_str(text);
        }
    }

    /// Builds the status text. Segments are appended only while the visible
    /// width stays strictly below `columns`; one that does not fit is skipped.
    pub fn compose(&self, elapsed: Duration, readings: &Readings, columns: u16) -> String {
        let columns = usize::from(columns);
        let mut clock = format!("{} {}", format_clock(elapsed), self.spinner.glyph());
        clock.truncate(columns.saturating_sub(1));

        let mut out = String::new();
        let mut width = clock.len();
        self.paint(&mut out, self.theme.accent, &clock);

        for reading in readings.iter() {
            let text = format_reading(&reading);
            let segment_width = text.len() + 3;
            if width + segment_width >= columns {
                continue;
            }
            out.push_str(" [");
            self.paint(&mut out, self.theme.classification(reading.class), &text);
            out.push(']');
            width += segment_width;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Classification;

    fn reading(metric: Metric, value: MetricValue) -> Reading {
        Reading {
            metric,
            value,
            class: Classification::Normal,
        }
    }

    fn sample_readings() -> Readings {
        Readings {
            cpu: Some(reading(Metric::Cpu, MetricValue::Percent(12.34))),
            memory: Some(reading(Metric::Memory, MetricValue::Percent(45.6))),
            network: Some(reading(
                Metric::Network,
                MetricValue::Rates { rx: 12.3, tx: 4.5 },
            )),
            disk: Some(reading(Metric::Disk, MetricValue::Percent(1.0))),
        }
    }

    #[test]
    fn spinner_cycles_through_four_glyphs() {
        let mut spinner = Spinner::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(spinner.glyph());
            spinner.advance();
        }
        assert_eq!(seen, vec!['-', '\\', '|', '/', '-']);
    }

    #[test]
    fn clock_wraps_after_a_day() {
        assert_eq!(format_clock(Duration::from_secs(3661)), "01:01:01");
        assert_eq!(format_clock(Duration::from_secs(86_400 + 59)), "00:00:59");
    }

    #[test]
    fn full_width_status_lists_every_metric_in_order() {
        let status = StatusLine::new(false);
        let text = status.compose(Duration::from_secs(5), &sample_readings(), 200);
        assert_eq!(
            text,
            "00:00:05 - [CPU: 12.3%] [Mem: 45.6%] [Rx/Tx: 12.3KB/s / 4.5KB/s] [Disk:  1.0%]"
        );
    }

    #[test]
    fn segments_that_do_not_fit_are_skipped() {
        let status = StatusLine::new(false);
        // "00:00:05 - [CPU: 12.3%]" is 23 wide, so 23 columns is not enough.
        let text = status.compose(Duration::from_secs(5), &sample_readings(), 23);
        assert_eq!(text, "00:00:05 -");
        let text = status.compose(Duration::from_secs(5), &sample_readings(), 24);
        assert_eq!(text, "00:00:05 - [CPU: 12.3%]");
        // Network does not fit after CPU and memory, but disk still does.
        let text = status.compose(Duration::from_secs(5), &sample_readings(), 52);
        assert_eq!(text, "00:00:05 - [CPU: 12.3%] [Mem: 45.6%] [Disk:  1.0%]");
    }

    #[test]
    fn missing_readings_leave_only_the_clock() {
        let mut status = StatusLine::new(false);
        status.advance_spinner();
        let text = status.compose(Duration::ZERO, &Readings::default(), 80);
        assert_eq!(text, "00:00:00 \\");
    }

    #[test]
    fn colors_wrap_only_the_segment_text() {
        let theme = Theme::default();
        let status = StatusLine::new(true);
        let mut readings = Readings::default();
        readings.cpu = Some(Reading {
            metric: Metric::Cpu,
            value: MetricValue::Percent(90.0),
            class: Classification::Critical,
        });
        let text = status.compose(Duration::ZERO, &readings, 80);
        let expected_cpu = format!(
            " [{}CPU: 90.0%{}]",
            theme.error.render(),
            theme.error.render_reset()
        );
        assert!(text.ends_with(&expected_cpu), "{text:?}");
        assert!(text.starts_with(&theme.accent.render().to_string()));
    }
}
