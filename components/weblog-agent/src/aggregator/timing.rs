// External crates
use std::time::Duration;

/// Running min/max/sum/count over one interval, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingStat {
    min: u64,
    max: u64,
    sum: u64,
    count: u64,
}

impl TimingStat {
    pub fn observe(&mut self, value: Duration) {
        let micros = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);

        if self.count == 0 {
            self.min = micros;
            self.max = micros;
        } else {
            self.min = self.min.min(micros);
            self.max = self.max.max(micros);
        }
        self.sum = self.sum.saturating_add(micros);
        self.count += 1;
    }

    /// False until the first observation after a reset.
    pub fn is_active(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<u64> {
        self.is_active().then_some(self.min)
    }

    pub fn max(&self) -> Option<u64> {
        self.is_active().then_some(self.max)
    }

    /// Integer mean. Truncation keeps it within `[min, max]`.
    pub fn avg(&self) -> Option<u64> {
        self.is_active().then(|| self.sum / self.count)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
