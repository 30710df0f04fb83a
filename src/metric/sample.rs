use super::series::Series;
use crate::error::Error;
use crate::time;
use chrono::{DateTime, Utc};
use fnv::FnvHasher;
use std::hash::{Hash, Hasher};

/// A single observation made by a collector.
///
/// Samples are created at read time and handed to `Measures`, which decides
/// whether and how they become `Series`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// The metric name.
    pub name: String,
    /// The observed value.
    pub value: f64,
    /// When the value was observed.
    pub time: DateTime<Utc>,
    /// The host the value is reported for.
    pub host: String,
    /// `key:value` tags. Treated as a set.
    pub tags: Vec<String>,
}

impl Sample {
    /// Make a sample observed now, with no host and no tags.
    ///
    /// # Examples
    ///
    /// ```
    /// use pigeon::metric::Sample;
    ///
    /// let s = Sample::new("system.load.1", 0.2).host("gw").tag("role", "router");
    ///
    /// assert_eq!("gw", s.host);
    /// assert_eq!(vec!["role:router".to_string()], s.tags);
    /// ```
    pub fn new<S>(name: S, value: f64) -> Sample
    where
        S: Into<String>,
    {
        Sample {
            name: name.into(),
            value: value,
            time: time::now(),
            host: String::new(),
            tags: Vec::new(),
        }
    }

    /// Set the observation time.
    pub fn time(mut self, time: DateTime<Utc>) -> Sample {
        self.time = time;
        self
    }

    /// Set the host.
    pub fn host<S>(mut self, host: S) -> Sample
    where
        S: Into<String>,
    {
        self.host = host.into();
        self
    }

    /// Append a single `key:value` tag.
    pub fn tag<K, V>(mut self, key: K, value: V) -> Sample
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.tags
            .push(format!("{}:{}", key.as_ref(), value.as_ref()));
        self
    }

    /// Append already joined tags.
    pub fn tags<I, S>(mut self, tags: I) -> Sample
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Identity hash of the sample: FNV-1a over name, host and tags.
    ///
    /// Tags are a set, so this sorts `self.tags` in place before hashing. Two
    /// samples that differ only in tag order, time or value hash equal.
    pub fn hash(&mut self) -> u64 {
        self.tags.sort();
        let mut hasher = FnvHasher::default();
        self.name.hash(&mut hasher);
        self.host.hash(&mut hasher);
        for tag in &self.tags {
            tag.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Build the count series that takes the counter from `self` to `next`.
    ///
    /// The interval is the rounded number of seconds between the two samples
    /// and must be positive. The counter must not have decreased.
    pub fn count(&self, next: &Sample) -> Result<Series, Error> {
        let interval = time::round_secs(&self.time, &next.time);
        if interval <= 0 {
            return Err(Error::NonPositiveInterval);
        }
        let delta = next.value - self.value;
        if delta < 0.0 {
            return Err(Error::NegativeCount);
        }
        Ok(Series::count(
            next.name.clone(),
            next.time.timestamp(),
            delta,
            interval as u64,
            next.host.clone(),
            next.tags.clone(),
        ))
    }
}
