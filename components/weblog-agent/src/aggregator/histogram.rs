// External crates
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistogramError {
    #[error("histogram needs at least one bucket bound")]
    Empty,

    #[error("histogram bounds must be strictly increasing (bound {index} is {bound}ms)")]
    NotIncreasing { index: usize, bound: u64 },
}

/// Fixed-bucket latency histogram with an overflow bucket.
///
/// Bounds are configured in milliseconds. Buckets are exclusive: an
/// observation lands in the first bucket whose bound it does not exceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bounds_ms: Vec<u64>,
    counts: Vec<u64>,
}

impl Histogram {
    pub fn new(bounds_ms: &[u64]) -> Result<Self, HistogramError> {
        if bounds_ms.is_empty() {
            return Err(HistogramError::Empty);
        }
        for (index, pair) in bounds_ms.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(HistogramError::NotIncreasing {
                    index: index + 1,
                    bound: pair[1],
                });
            }
        }

        Ok(Self {
            bounds_ms: bounds_ms.to_vec(),
            counts: vec![0; bounds_ms.len() + 1], // +inf bucket
        })
    }

    pub fn observe(&mut self, value: Duration) {
        let micros = value.as_micros();
        let slot = self
            .bounds_ms
            .iter()
            .position(|&bound| micros <= u128::from(bound) * 1_000)
            .unwrap_or(self.bounds_ms.len());
        self.counts[slot] += 1;
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `(suffix, count)` pairs in bucket order, ending with `inf`.
    pub fn buckets(&self) -> impl Iterator<Item = (String, u64)> + '_ {
        self.bounds_ms
            .iter()
            .map(|b| b.to_string())
            .chain(std::iter::once("inf".to_string()))
            .zip(self.counts.iter().copied())
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }
}
