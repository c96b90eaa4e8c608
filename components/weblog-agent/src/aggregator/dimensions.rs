// External crates
use serde::Serialize;
use std::collections::HashSet;

/// Notification that a dynamic metric key appeared for the first time, so
/// the charting side can add a dimension for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DimensionEvent {
    pub chart_id: String,
    pub dimension_id: String,
}

/// Queue of first-seen dimensions. Each `(chart, dimension)` pair is
/// reported once for the lifetime of the aggregator.
#[derive(Debug, Clone, Default)]
pub struct DimensionTracker {
    seen: HashSet<(String, String)>,
    pending: Vec<DimensionEvent>,
}

impl DimensionTracker {
    pub fn observe(&mut self, chart_id: &str, dimension_id: &str) {
        let key = (chart_id.to_string(), dimension_id.to_string());
        if self.seen.contains(&key) {
            return;
        }
        tracing::debug!(chart = chart_id, dimension = dimension_id, "New dimension");
        self.pending.push(DimensionEvent {
            chart_id: key.0.clone(),
            dimension_id: key.1.clone(),
        });
        self.seen.insert(key);
    }

    pub fn drain(&mut self) -> Vec<DimensionEvent> {
        std::mem::take(&mut self.pending)
    }
}
