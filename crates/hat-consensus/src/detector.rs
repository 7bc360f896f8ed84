// SYBIL / ECLIPSE DETECTOR
// Response-timing analysis over bounded per-validator windows.
//
// SAFETY INVARIANTS:
// 1. Each validator window holds at most `window_size` entries; oldest evicted first
// 2. Detection is advisory; it never rejects or drops a response
// 3. Per-validator windows are independent; recording never blocks other validators

use dashmap::DashMap;
use hat_core::{Address, Amount, Hash256, SybilConfig, ValidationTimestamp};
use log::warn;
use std::collections::{HashMap, VecDeque};

pub struct SybilDetector {
    windows: DashMap<Address, VecDeque<ValidationTimestamp>>,
    config: SybilConfig,
}

impl SybilDetector {
    pub fn new(config: SybilConfig) -> Self {
        SybilDetector {
            windows: DashMap::new(),
            config,
        }
    }

    pub fn record(&self, validator: Address, task_hash: Hash256, timestamp_ms: u64) {
        let mut window = self.windows.entry(validator).or_default();
        if window.len() >= self.config.window_size {
            window.pop_front();
        }
        window.push_back(ValidationTimestamp {
            task_hash,
            validator,
            timestamp_ms,
        });
    }

    pub fn window_len(&self, validator: &Address) -> usize {
        self.windows.get(validator).map_or(0, |w| w.len())
    }

    /// Earliest recorded timestamp per validator for `task_hash`, ascending.
    pub fn timestamps_for_task(&self, task_hash: &Hash256) -> Vec<(Address, u64)> {
        let mut earliest: HashMap<Address, u64> = HashMap::new();
        for window in self.windows.iter() {
            for entry in window.value().iter().filter(|e| e.task_hash == *task_hash) {
                earliest
                    .entry(entry.validator)
                    .and_modify(|t| *t = (*t).min(entry.timestamp_ms))
                    .or_insert(entry.timestamp_ms);
            }
        }
        let mut out: Vec<(Address, u64)> = earliest.into_iter().collect();
        out.sort_by_key(|(a, t)| (*t, *a));
        out
    }

    /// Flags `task_hash` when at least `min_coordinated_validators` distinct
    /// validators responded inside one `[t, t + coordination_window_ms)` span.
    pub fn detect_coordinated(&self, task_hash: &Hash256) -> bool {
        let times: Vec<u64> = self.timestamps_for_task(task_hash).into_iter().map(|(_, t)| t).collect();
        let needed = self.config.min_coordinated_validators;
        if needed == 0 || times.len() < needed {
            return false;
        }

        let window = self.config.coordination_window_ms;
        let mut end = 0;
        for start in 0..times.len() {
            while end < times.len() && times[end] - times[start] < window {
                end += 1;
            }
            if end - start >= needed {
                warn!(
                    "Coordinated responses on task {}: {} validators within {} ms",
                    task_hash,
                    end - start,
                    window
                );
                return true;
            }
        }
        false
    }

    /// True when one member holds more than the configured share of the
    /// committee's total stake.
    pub fn stake_concentration_exceeded(&self, committee: &[(Address, Amount)]) -> bool {
        let total: u128 = committee.iter().map(|(_, s)| *s as u128).sum();
        if total == 0 {
            return false;
        }
        let limit = self.config.max_stake_concentration;
        committee.iter().any(|(addr, stake)| {
            let share = *stake as f64 / total as f64;
            if share > limit {
                warn!("Validator {} holds {:.1}% of committee stake", addr, share * 100.0);
                true
            } else {
                false
            }
        })
    }
}
