use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

/// Number of occurrences per event, e.g., problems per outcome.
#[derive(Debug)]
pub struct CountingStats<E: Eq + Hash> {
    values: FxHashMap<E, usize>,
}

impl<E: Eq + Hash> CountingStats<E> {
    pub fn new() -> Self {
        Self {
            values: FxHashMap::default(),
        }
    }

    pub fn get(&self, event: &E) -> usize {
        self.values.get(event).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, event: E) {
        *self.values.entry(event).or_insert(0) += 1;
    }
}

/// Durations grouped by event, e.g., solving times per outcome.
#[derive(Debug)]
pub struct DurationStats<E: Eq + Hash + Copy> {
    values: FxHashMap<E, Vec<Duration>>,
}

impl<E: Eq + Hash + Copy> DurationStats<E> {
    pub fn new() -> Self {
        Self {
            values: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, event: E, duration: Duration) {
        self.values.entry(event).or_insert_with(Vec::new).push(duration);
    }

    pub fn count(&self, event: E) -> usize {
        self.values.get(&event).map_or(0, Vec::len)
    }

    pub fn sum(&self, event: E) -> Duration {
        self.values
            .get(&event)
            .map_or_else(|| Duration::new(0, 0), |v| v.iter().sum())
    }

    pub fn avg(&self, event: E) -> Duration {
        #[allow(clippy::cast_possible_truncation)]
        let count = self.count(event) as u32;

        if count == 0 {
            return Duration::new(0, 0);
        }
        self.sum(event) / count
    }

    pub fn min(&self, event: E) -> Duration {
        self.values
            .get(&event)
            .and_then(|v| v.iter().min().copied())
            .unwrap_or_else(|| Duration::new(0, 0))
    }

    pub fn max(&self, event: E) -> Duration {
        self.values
            .get(&event)
            .and_then(|v| v.iter().max().copied())
            .unwrap_or_else(|| Duration::new(0, 0))
    }
}

impl<E: Eq + Hash + Ord + Copy + fmt::Display> fmt::Display for DurationStats<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<E> = self.values.keys().copied().collect();
        events.sort();
        for stat in events {
            let sum = self.sum(stat);
            let avg = self.avg(stat);
            let min = self.min(stat);
            let max = self.max(stat);
            writeln!(
                f,
                "  {} count {}  sum {}.{:03}  avg: {}.{:03}  min {}.{:03}  max {}.{:03}",
                stat,
                self.count(stat),
                sum.as_secs(),
                sum.subsec_millis(),
                avg.as_secs(),
                avg.subsec_millis(),
                min.as_secs(),
                min.subsec_millis(),
                max.as_secs(),
                max.subsec_millis()
            )?;
        }
        Ok(())
    }
}
