/// Aggregate jiffies from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub busy: u64,
    pub idle: u64,
}

impl CpuTicks {
    pub fn parse(contents: &str) -> Option<Self> {
        let line = contents
            .lines()
            .find(|line| line.split_whitespace().next() == Some("cpu"))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|field| field.parse().unwrap_or(0))
            .collect();
        if fields.len() < 4 {
            return None;
        }
        let field = |index: usize| fields.get(index).copied().unwrap_or(0);
        // user nice system idle iowait irq softirq steal guest guest_nice
        let busy = [0, 1, 2, 5, 6, 7, 8, 9].into_iter().map(field).sum();
        let idle = field(3) + field(4);
        Some(Self { busy, idle })
    }
}

#[derive(Debug, Default)]
pub struct CpuSampler {
    previous: Option<CpuTicks>,
}

impl CpuSampler {
    pub fn sample(&mut self, contents: &str) -> Option<f32> {
        let current = CpuTicks::parse(contents)?;
        let previous = self.previous.replace(current)?;
        let busy = current.busy.checked_sub(previous.busy)?;
        let idle = current.idle.checked_sub(previous.idle)?;
        let total = busy + idle;
        if total == 0 {
            return None;
        }
        Some((busy as f64 / total as f64 * 100.0) as f32)
    }
}
