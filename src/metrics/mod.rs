use crate::logging::{LogEvent, LogFields};
use serde_json::json;
use std::time::Duration;

/// Counters accumulated across evaluations of one engine instance.
#[derive(Debug, Default, Clone)]
pub struct EngineMetrics {
    evaluations: u64,
    components_placed: u64,
    components_rejected: u64,
    reduction_rounds: u64,
    beautify_accepted: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_evaluation(&mut self, placed: usize, rejected: usize) {
        self.evaluations = self.evaluations.saturating_add(1);
        self.components_placed = self.components_placed.saturating_add(placed as u64);
        self.components_rejected = self.components_rejected.saturating_add(rejected as u64);
    }

    pub fn record_reduction_rounds(&mut self, rounds: usize) {
        self.reduction_rounds = self.reduction_rounds.saturating_add(rounds as u64);
    }

    pub fn record_beautify_accepted(&mut self, regions: usize) {
        if regions > 0 {
            self.beautify_accepted = self.beautify_accepted.saturating_add(regions as u64);
        }
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            evaluations: self.evaluations,
            components_placed: self.components_placed,
            components_rejected: self.components_rejected,
            reduction_rounds: self.reduction_rounds,
            beautify_accepted: self.beautify_accepted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub evaluations: u64,
    pub components_placed: u64,
    pub components_rejected: u64,
    pub reduction_rounds: u64,
    pub beautify_accepted: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::info(target, "engine_metrics").with_fields(self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("evaluations".to_string(), json!(self.evaluations));
        map.insert(
            "components_placed".to_string(),
            json!(self.components_placed),
        );
        map.insert(
            "components_rejected".to_string(),
            json!(self.components_rejected),
        );
        map.insert("reduction_rounds".to_string(), json!(self.reduction_rounds));
        map.insert(
            "beautify_accepted".to_string(),
            json!(self.beautify_accepted),
        );
        map
    }
}
