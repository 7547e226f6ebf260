//! Aggregation store: latest reading per sensor plus windowed arrival counts.
//!
//! One writer (the listener task) calls [`Store::record`]; any number of
//! HTTP handlers call [`Store::snapshot`] concurrently. All state sits behind
//! a single `RwLock`, so a snapshot never observes a half-applied record.
//!
//! Windowing is driven by *arrival* time taken from the store's [`Clock`],
//! not by the timestamp the sensor reports. Arrival stamps are clamped to be
//! non-decreasing, which keeps the event log sorted and lets eviction pop
//! from the front.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn, Span};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::models::{Reading, SensorIdentity};

// ---

/// Window and bound settings for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // ---
    /// A sensor with no arrival inside this window drops out of the latest view.
    pub freshness_window: TimeDelta,

    /// Arrivals are counted, and retained, over this trailing window.
    pub counting_window: TimeDelta,

    /// Hard cap on retained arrivals; the oldest are dropped beyond it.
    pub max_events: usize,

    /// Readings whose own timestamp is further than this from now are
    /// rejected. `None` accepts any timestamp.
    pub max_reading_skew: Option<TimeDelta>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            freshness_window: TimeDelta::minutes(5),
            counting_window: TimeDelta::hours(1),
            max_events: 100_000,
            max_reading_skew: Some(TimeDelta::hours(24)),
        }
    }
}

/// Point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Latest reading per fresh sensor, keyed by name.
    pub latest: BTreeMap<String, Reading>,

    /// Arrivals in the counting window per sensor. Every configured sensor
    /// is present, with `0` when silent.
    pub counts: BTreeMap<String, u64>,
}

/// Size summary used by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub known_sensors: usize,
    pub fresh_sensors: usize,
    pub events: usize,
}

#[derive(Debug, Clone)]
struct Arrival {
    at: DateTime<Utc>,
    name: String,
}

#[derive(Debug, Default)]
struct State {
    latest: BTreeMap<String, Reading>,
    events: VecDeque<Arrival>,
}

pub struct Store {
    known: BTreeSet<String>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
    span: Span,
}

impl Store {
    // ---
    pub fn new(
        identity: &SensorIdentity,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        span: Span,
    ) -> Self {
        // ---
        Self {
            known: identity.names().map(str::to_owned).collect(),
            config,
            clock,
            state: RwLock::new(State::default()),
            span,
        }
    }

    /// Record one reading: append an arrival, evict, replace the latest value.
    pub fn record(&self, reading: Reading) -> Result<(), StoreError> {
        // ---
        let _entered = self.span.enter();
        let now = self.clock.now();
        self.check_skew(&reading, now)?;

        let mut state = self.write();

        // Never stamp an arrival earlier than the last one, even if the clock steps back.
        let at = state.events.back().map_or(now, |last| last.at.max(now));
        state.events.push_back(Arrival {
            at,
            name: reading.name.clone(),
        });

        let overflow = state.events.len().saturating_sub(self.config.max_events);
        if overflow > 0 {
            state.events.drain(..overflow);
            warn!(
                dropped = overflow,
                max_events = self.config.max_events,
                "event log over capacity; dropped oldest arrivals"
            );
        }

        let evicted = state.evict(at, &self.config);
        if evicted > 0 {
            debug!(evicted, "evicted expired arrivals");
        }

        debug!(
            name = %reading.name,
            id = reading.sensor_id,
            temperature_c = reading.temperature_c,
            humidity = reading.humidity,
            "recorded reading"
        );
        state.latest.insert(reading.name.clone(), reading);
        Ok(())
    }

    /// Run the eviction pass outside of `record`. Returns the number of
    /// arrivals removed from the log.
    pub fn evict_expired(&self) -> usize {
        // ---
        let now = self.clock.now();
        let mut state = self.write();
        state.evict(now, &self.config)
    }

    /// Consistent copy of the latest readings and windowed counts.
    ///
    /// Applies the same cutoffs as eviction, so data that has aged out since
    /// the last `record` is already hidden here.
    pub fn snapshot(&self) -> Snapshot {
        // ---
        let now = self.clock.now();
        let state = self.read();
        self.snapshot_of(&state, now)
    }

    /// Sensor and event totals, read under a single lock.
    pub fn summary(&self) -> StoreSummary {
        // ---
        let now = self.clock.now();
        let state = self.read();
        StoreSummary {
            known_sensors: self.known.len(),
            fresh_sensors: self.snapshot_of(&state, now).latest.len(),
            events: state.events.len(),
        }
    }

    fn snapshot_of(&self, state: &State, now: DateTime<Utc>) -> Snapshot {
        // ---
        let count_cutoff = now - self.config.counting_window;
        let fresh_cutoff = now - self.config.freshness_window;

        let mut counts: BTreeMap<String, u64> =
            self.known.iter().map(|name| (name.clone(), 0)).collect();
        let mut fresh: HashSet<&str> = HashSet::new();

        for arrival in state.events.iter().filter(|a| a.at > count_cutoff) {
            *counts.entry(arrival.name.clone()).or_insert(0) += 1;
            if arrival.at > fresh_cutoff {
                fresh.insert(arrival.name.as_str());
            }
        }

        let latest = state
            .latest
            .iter()
            .filter(|(name, _)| fresh.contains(name.as_str()))
            .map(|(name, reading)| (name.clone(), reading.clone()))
            .collect();

        Snapshot { latest, counts }
    }

    fn check_skew(&self, reading: &Reading, now: DateTime<Utc>) -> Result<(), StoreError> {
        // ---
        let Some(max_skew) = self.config.max_reading_skew else {
            return Ok(());
        };
        if reading.timestamp > now + max_skew || reading.timestamp < now - max_skew {
            return Err(StoreError::TimestampSkew {
                name: reading.name.clone(),
                timestamp: reading.timestamp,
                now,
                max_skew_secs: max_skew.num_seconds(),
            });
        }
        Ok(())
    }

    // A panic while holding the lock cannot leave the maps half-updated, so
    // a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    // ---
    /// Drop arrivals at or before the counting cutoff, then drop latest
    /// entries for sensors with no arrival after the freshness cutoff.
    fn evict(&mut self, now: DateTime<Utc>, config: &StoreConfig) -> usize {
        // ---
        let count_cutoff = now - config.counting_window;
        let mut evicted = 0;
        while let Some(front) = self.events.front() {
            if front.at > count_cutoff {
                break;
            }
            self.events.pop_front();
            evicted += 1;
        }

        let fresh_cutoff = now - config.freshness_window;
        let fresh: HashSet<&str> = self
            .events
            .iter()
            .rev()
            .take_while(|a| a.at > fresh_cutoff)
            .map(|a| a.name.as_str())
            .collect();
        self.latest.retain(|name, _| fresh.contains(name.as_str()));

        evicted
    }
}
