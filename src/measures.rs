//! Per-collector stateful conversion of samples into series.
//!
//! Each collector owns one `Measures`. It remembers the last sample of every
//! counter identity so that raw, ever-growing counters can be turned into
//! deltas, and the last emitted gauge of every identity so that unchanged
//! gauges can be suppressed.

use crate::client::Handle;
use crate::error::Error;
use crate::metric::{HashMapFnv, Sample, Series};
use crate::time;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Sample-to-series policies for a single collector.
pub struct Measures {
    client: Handle,
    counter: HashMapFnv<u64, Sample>,
    deviation: HashMapFnv<u64, Sample>,
    max_age: chrono::Duration,
    last_purge: DateTime<Utc>,
}

impl Measures {
    /// Create a `Measures` that emits into `client` and forgets identities not
    /// seen for `max_age`.
    pub fn new(client: Handle, max_age: Duration) -> Measures {
        Measures::with_start(client, max_age, time::now())
    }

    /// Like `new` with an explicit start instant for the purge cadence.
    pub fn with_start(client: Handle, max_age: Duration, start: DateTime<Utc>) -> Measures {
        Measures {
            client: client,
            counter: HashMapFnv::default(),
            deviation: HashMapFnv::default(),
            max_age: time::chrono_duration(max_age),
            last_purge: start,
        }
    }

    /// Emit `sample` as a gauge.
    pub fn gauge(&mut self, sample: Sample) -> Result<(), Error> {
        self.client.send(Series::gauge(sample))
    }

    /// Emit `sample` as a gauge unless the previous emission for the same
    /// identity carried the same value and is younger than `max_age`.
    ///
    /// Returns whether a series was emitted.
    pub fn gauge_deviation(&mut self, mut sample: Sample, max_age: Duration) -> Result<bool, Error> {
        let key = sample.hash();
        if let Some(prev) = self.deviation.get(&key) {
            let age = sample.time.signed_duration_since(prev.time);
            if prev.value.to_bits() == sample.value.to_bits()
                && age < time::chrono_duration(max_age)
            {
                return Ok(false);
            }
        }
        self.deviation.insert(key, sample.clone());
        self.client.send(Series::gauge(sample))?;
        Ok(true)
    }

    /// Emit the increase of a monotonic counter since its previous sample.
    ///
    /// The first sample of an identity is only remembered. On error the stored
    /// sample is left as it was.
    pub fn count(&mut self, mut sample: Sample) -> Result<bool, Error> {
        let key = sample.hash();
        let series = match self.counter.get(&key) {
            None => {
                self.counter.insert(key, sample);
                return Ok(false);
            }
            Some(prev) => prev.count(&sample)?,
        };
        self.counter.insert(key, sample);
        self.client.send(series)?;
        Ok(true)
    }

    /// Like `count`, but a counter that went backwards is taken to have been
    /// reset: the new sample becomes the baseline and nothing is emitted.
    pub fn count_with_negative_reset(&mut self, mut sample: Sample) -> Result<bool, Error> {
        let key = sample.hash();
        let series = match self.counter.get(&key) {
            None => {
                self.counter.insert(key, sample);
                return Ok(false);
            }
            Some(prev) => match prev.count(&sample) {
                Ok(series) => series,
                Err(Error::NegativeCount) => {
                    debug!("counter {} reset, rebasing", sample.name);
                    self.counter.insert(key, sample);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            },
        };
        self.counter.insert(key, sample);
        self.client.send(series)?;
        Ok(true)
    }

    /// Add `sample.value` to a running total and emit the increment as a
    /// count over the time since the previous call.
    pub fn incr(&mut self, mut sample: Sample) -> Result<bool, Error> {
        let key = sample.hash();
        let (series, total) = match self.counter.get(&key) {
            None => {
                self.counter.insert(key, sample);
                return Ok(false);
            }
            Some(prev) => {
                let mut total = sample.clone();
                total.value = prev.value + sample.value;
                (prev.count(&total)?, total)
            }
        };
        self.counter.insert(key, total);
        self.client.send(series)?;
        Ok(true)
    }

    /// Forget stale identities, at most once every `max_age`.
    pub fn purge(&mut self) -> usize {
        self.purge_at(time::now())
    }

    /// `purge` as of `now`. Returns the number of entries evicted.
    ///
    /// After an eligible call no entry is older than `max_age` relative to
    /// `now`.
    pub fn purge_at(&mut self, now: DateTime<Utc>) -> usize {
        if now.signed_duration_since(self.last_purge) < self.max_age {
            return 0;
        }
        self.last_purge = now;
        let cutoff = now - self.max_age;
        let before = self.counter.len() + self.deviation.len();
        self.counter.retain(|_, s| s.time >= cutoff);
        self.deviation.retain(|_, s| s.time >= cutoff);
        let evicted = before - (self.counter.len() + self.deviation.len());
        if evicted > 0 {
            debug!("purged {} stale measures", evicted);
        }
        evicted
    }

    /// Forget everything known about the identity of `sample`.
    pub fn delete(&mut self, mut sample: Sample) {
        let key = sample.hash();
        self.counter.remove(&key);
        self.deviation.remove(&key);
    }

    /// True if a counter sample is stored for the identity of `sample`.
    /// Sorts the tags of `sample`, as `Sample::hash` does.
    pub fn contains(&self, sample: &mut Sample) -> bool {
        self.counter.contains_key(&sample.hash())
    }

    /// Number of identities currently remembered, counters and gauges.
    pub fn len(&self) -> usize {
        self.counter.len() + self.deviation.len()
    }

    /// True if nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
