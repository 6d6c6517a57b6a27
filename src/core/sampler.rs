//! Rate-limited sampling and burst deduplication
//!
//! Decides, per module and level, whether a log call proceeds, and folds
//! bursts of identical messages into aggregated deliveries.
//!
//! # Rules
//!
//! - **Level bypass**: Error and Fatal always pass, unconditionally.
//! - **Rule resolution**: exact module name, else the longest matching
//!   module-name prefix, else the library default (rate 1.0).
//! - **Minimum interval**: a rejected call inside the interval does not
//!   update the last-allowed timestamp.
//! - **Burst limit**: per (module, level) counter over a rolling one-second
//!   window.
//! - **Random sampling**: a uniform draw passes iff it is below the rate.

use super::config::SamplingRule;
use super::level::LogLevel;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time span during which repeated identical messages aggregate.
const DEDUPE_WINDOW: Duration = Duration::from_secs(5);

/// Every Nth suppressed repeat is delivered as an aggregate.
const DEDUPE_EMIT_EVERY: u32 = 10;

/// Stale dedupe entries are evicted once the cache grows past this.
const DEDUPE_CACHE_CAP: usize = 1024;

const BURST_WINDOW: Duration = Duration::from_secs(1);

type SampleKey = (String, LogLevel);

/// Outcome of a deduplication check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeDecision {
    /// First occurrence inside the window; deliver normally.
    Deliver,
    /// Repeat inside the window; drop it.
    Suppress,
    /// Deliver one entry carrying the accumulated repeat count; the
    /// tracking entry resets.
    Aggregate(u32),
}

#[derive(Debug)]
struct DedupeEntry {
    count: u32,
    first_seen: Instant,
    last_seen: Instant,
}

#[derive(Debug)]
struct BurstWindow {
    window_start: Instant,
    count: u32,
}

/// Counters for sampling observability.
#[derive(Debug, Default)]
pub struct SamplerMetrics {
    passed: AtomicU64,
    suppressed: AtomicU64,
    deduped: AtomicU64,
}

impl SamplerMetrics {
    #[inline]
    pub fn passed_count(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn deduped_count(&self) -> u64 {
        self.deduped.load(Ordering::Relaxed)
    }

    #[inline]
    fn record_passed(&self) {
        self.passed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_deduped(&self) {
        self.deduped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sampler holding the per-module rules and all suppression state.
pub struct Sampler {
    rules: RwLock<HashMap<String, SamplingRule>>,
    interval_state: Mutex<HashMap<SampleKey, Instant>>,
    burst_state: Mutex<HashMap<SampleKey, BurstWindow>>,
    dedupe: Mutex<HashMap<(String, LogLevel, String), DedupeEntry>>,
    metrics: SamplerMetrics,
}

impl Sampler {
    pub fn new(rules: HashMap<String, SamplingRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            interval_state: Mutex::new(HashMap::new()),
            burst_state: Mutex::new(HashMap::new()),
            dedupe: Mutex::new(HashMap::new()),
            metrics: SamplerMetrics::default(),
        }
    }

    /// Replace the rule set. Last writer wins; suppression state carries
    /// over so an interval already in flight keeps holding.
    pub fn set_rules(&self, rules: HashMap<String, SamplingRule>) {
        *self.rules.write() = rules;
    }

    /// Resolve the rule for a module: exact match, else the longest
    /// matching prefix, else the default rule.
    fn resolve(&self, module: &str) -> SamplingRule {
        let rules = self.rules.read();
        if let Some(rule) = rules.get(module) {
            return rule.clone();
        }
        rules
            .iter()
            .filter(|(pattern, _)| module.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, rule)| rule.clone())
            .unwrap_or_default()
    }

    /// Decide whether an entry at `level` from `module` proceeds.
    pub fn should_log(&self, module: &str, level: LogLevel) -> bool {
        if level.is_critical() {
            self.metrics.record_passed();
            return true;
        }

        let rule = self.resolve(module);

        if let Some(interval) = rule.min_interval() {
            let key = (module.to_string(), level);
            let mut state = self.interval_state.lock();
            let now = Instant::now();
            match state.get(&key) {
                Some(last) if now.duration_since(*last) < interval => {
                    self.metrics.record_suppressed();
                    return false;
                }
                _ => {
                    state.insert(key, now);
                }
            }
        }

        if let Some(limit) = rule.burst_limit {
            let key = (module.to_string(), level);
            let mut state = self.burst_state.lock();
            let now = Instant::now();
            let window = state.entry(key).or_insert(BurstWindow {
                window_start: now,
                count: 0,
            });
            if now.duration_since(window.window_start) >= BURST_WINDOW {
                window.window_start = now;
                window.count = 0;
            }
            if window.count >= limit {
                self.metrics.record_suppressed();
                return false;
            }
            window.count += 1;
        }

        let pass = if rule.rate >= 1.0 {
            true
        } else if rule.rate <= 0.0 {
            false
        } else {
            rand::thread_rng().gen::<f64>() < rule.rate
        };

        if pass {
            self.metrics.record_passed();
        } else {
            self.metrics.record_suppressed();
        }
        pass
    }

    /// Fold repeats of the same (module, level, message) within the window.
    pub fn check_dedupe(&self, module: &str, level: LogLevel, message: &str) -> DedupeDecision {
        let key = (module.to_string(), level, message.to_string());
        let now = Instant::now();
        let mut cache = self.dedupe.lock();

        let decision = match cache.get_mut(&key) {
            Some(entry) if now.duration_since(entry.last_seen) <= DEDUPE_WINDOW => {
                entry.count += 1;
                entry.last_seen = now;
                if entry.count % DEDUPE_EMIT_EVERY == 0
                    || now.duration_since(entry.first_seen) >= DEDUPE_WINDOW
                {
                    let count = entry.count;
                    cache.remove(&key);
                    DedupeDecision::Aggregate(count)
                } else {
                    DedupeDecision::Suppress
                }
            }
            _ => {
                cache.insert(
                    key,
                    DedupeEntry {
                        count: 1,
                        first_seen: now,
                        last_seen: now,
                    },
                );
                DedupeDecision::Deliver
            }
        };

        if cache.len() > DEDUPE_CACHE_CAP {
            cache.retain(|_, entry| now.duration_since(entry.last_seen) <= DEDUPE_WINDOW);
        }

        if decision == DedupeDecision::Suppress {
            self.metrics.record_deduped();
        }
        decision
    }

    pub fn metrics(&self) -> &SamplerMetrics {
        &self.metrics
    }
}
