#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemoryInfo {
    pub fn parse(contents: &str) -> Option<Self> {
        let mut total = None;
        let mut available = None;
        for line in contents.lines() {
            let mut parts = line.split_whitespace();
            let target = match parts.next() {
                Some("MemTotal:") => &mut total,
                Some("MemAvailable:") => &mut available,
                _ => continue,
            };
            *target = parts.next().and_then(|value| value.parse::<u64>().ok());
            if total.is_some() && available.is_some() {
                break;
            }
        }
        let total_kb = total.filter(|total| *total > 0)?;
        Some(Self {
            total_kb,
            available_kb: available?,
        })
    }

    pub fn used_percent(&self) -> f32 {
        let available = self.available_kb.min(self.total_kb) as f64;
        ((1.0 - available / self.total_kb as f64) * 100.0) as f32
    }
}

/// Memory usage is instantaneous, but the sampler still skips its first call
/// so all metrics appear together after the warm-up tick.
#[derive(Debug, Default)]
pub struct MemorySampler {
    primed: bool,
}

impl MemorySampler {
    pub fn sample(&mut self, contents: &str) -> Option<f32> {
        let info = MemoryInfo::parse(contents)?;
        if !self.primed {
            self.primed = true;
            return None;
        }
        Some(info.used_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       1000 kB\nMemFree:         100 kB\nMemAvailable:    400 kB\nBuffers:          10 kB\n";

    #[test]
    fn parses_total_and_available() {
        let info = MemoryInfo::parse(MEMINFO).expect("meminfo");
        assert_eq!(info.total_kb, 1000);
        assert_eq!(info.available_kb, 400);
        assert!((info.used_percent() - 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn first_call_primes_sampler() {
        let mut sampler = MemorySampler::default();
        assert_eq!(sampler.sample(MEMINFO), None);
        assert_eq!(sampler.sample(MEMINFO), Some(60.0));
    }

    #[test]
    fn missing_fields_report_nothing() {
        assert_eq!(MemoryInfo::parse("MemTotal: 1000 kB\n"), None);
        assert_eq!(MemoryInfo::parse("MemTotal: 0 kB\nMemAvailable: 0 kB\n"), None);
    }
}
