use std::time::Instant;

const BYTES_PER_KB: f64 = 1000.0;

/// Byte counters summed over every interface except loopback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkTotals {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl NetworkTotals {
    pub fn parse(contents: &str) -> Option<Self> {
        let mut totals = Self::default();
        let mut interfaces = 0usize;
        for line in contents.lines() {
            let Some((name, counters)) = line.split_once(':') else {
                continue;
            };
            if name.trim() == "lo" {
                continue;
            }
            let fields: Vec<&str> = counters.split_whitespace().collect();
            if fields.len() < 9 {
                continue;
            }
            let (Ok(rx), Ok(tx)) = (fields[0].parse::<u64>(), fields[8].parse::<u64>()) else {
                continue;
            };
            totals.rx_bytes = totals.rx_bytes.saturating_add(rx);
            totals.tx_bytes = totals.tx_bytes.saturating_add(tx);
            interfaces += 1;
        }
        (interfaces > 0).then_some(totals)
    }
}

#[derive(Debug, Default)]
pub struct NetworkSampler {
    previous: Option<(NetworkTotals, Instant)>,
}

impl NetworkSampler {
    /// Returns receive and transmit rates in KB/s.
    pub fn sample(&mut self, contents: &str, now: Instant) -> Option<(f32, f32)> {
        let current = NetworkTotals::parse(contents)?;
        let (previous, previous_time) = self.previous.replace((current, now))?;
        let seconds = now.checked_duration_since(previous_time)?.as_secs_f64();
        if seconds <= 0.0 {
            return None;
        }
        let rx = current.rx_bytes.checked_sub(previous.rx_bytes)?;
        let tx = current.tx_bytes.checked_sub(previous.tx_bytes)?;
        Some((
            (rx as f64 / BYTES_PER_KB / seconds) as f32,
            (tx as f64 / BYTES_PER_KB / seconds) as f32,
        ))
    }
}
