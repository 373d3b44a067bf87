use std::collections::BTreeMap;

use crate::db::models::{SensorSummary, StoredReading};

/// Round to 2 decimal places, half away from zero.
///
/// Operates on the binary `f64`, so values such as `1.005` that are stored
/// slightly below the midpoint round down.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug)]
struct Accumulator {
    sum: f64,
    count: usize,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new(value: f64) -> Self {
        Self { sum: value, count: 1, min: value, max: value }
    }

    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn finish(self, sensor_id: i32) -> SensorSummary {
        SensorSummary {
            sensor_id,
            average: round2(self.sum / self.count as f64),
            max: round2(self.max),
            min: round2(self.min),
        }
    }
}

/// Per-sensor average, maximum and minimum of `readings`.
///
/// Sensors without readings produce no entry. Statistics are computed on the
/// raw values and rounded once at the end. The result happens to be ordered
/// by sensor id; callers should not rely on it.
pub fn summarize(readings: &[StoredReading]) -> Vec<SensorSummary> {
    let mut by_sensor: BTreeMap<i32, Accumulator> = BTreeMap::new();

    for r in readings {
        by_sensor
            .entry(r.sensor_id)
            .and_modify(|acc| acc.push(r.value))
            .or_insert_with(|| Accumulator::new(r.value));
    }

    by_sensor
        .into_iter()
        .map(|(sensor_id, acc)| acc.finish(sensor_id))
        .collect()
}
