use std::num::NonZeroUsize;

/// Running average of a per-batch quantity, weighted by batch size.
#[derive(Debug, Default, Clone, Copy)]
pub struct AverageMeter {
    sum: f64,
    count: usize,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the average `value` of `n` samples.
    pub fn update(&mut self, value: f32, n: usize) {
        self.sum += value as f64 * n as f64;
        self.count += n;
    }

    pub fn avg(&self) -> f32 {
        if self.count == 0 {
            return 0.;
        }
        (self.sum / self.count as f64) as f32
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Every how many steps a pass of `total_batches` logs progress to print about `report_lines`
/// lines. Always at least one.
pub fn report_interval(total_batches: usize, report_lines: NonZeroUsize) -> usize {
    (total_batches / report_lines.get()).max(1)
}
