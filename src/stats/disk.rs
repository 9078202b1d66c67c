use std::collections::HashSet;
use std::time::Instant;

const DEVICE_PREFIXES: [&str; 3] = ["sd", "hd", "nvme"];
const IO_TICKS_FIELD: usize = 12;

/// Milliseconds spent doing I/O, summed over the first physical disk of each
/// major number so partitions are not counted twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskBusy {
    pub io_ms: u64,
}

impl DiskBusy {
    pub fn parse(contents: &str) -> Option<Self> {
        let mut seen_majors = HashSet::new();
        let mut io_ms = 0u64;
        for line in contents.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() <= IO_TICKS_FIELD {
                continue;
            }
            let name = parts[2];
            if !DEVICE_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
                continue;
            }
            let Ok(major) = parts[0].parse::<u32>() else {
                continue;
            };
            if !seen_majors.insert(major) {
                continue;
            }
            if let Ok(ticks) = parts[IO_TICKS_FIELD].parse::<u64>() {
                io_ms = io_ms.saturating_add(ticks);
            }
        }
        (!seen_majors.is_empty()).then_some(Self { io_ms })
    }
}

#[derive(Debug, Default)]
pub struct DiskSampler {
    previous: Option<(DiskBusy, Instant)>,
}

impl DiskSampler {
    pub fn sample(&mut self, contents: &str, now: Instant) -> Option<f32> {
        let current = DiskBusy::parse(contents)?;
        let (previous, previous_time) = self.previous.replace((current, now))?;
        let wall_ms = now.checked_duration_since(previous_time)?.as_secs_f64() * 1000.0;
        if wall_ms <= 0.0 {
            return None;
        }
        let busy_ms = current.io_ms.checked_sub(previous.io_ms)?;
        Some((busy_ms as f64 * 100.0 / wall_ms) as f32)
    }
}
