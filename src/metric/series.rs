use super::sample::Sample;
use fnv::FnvHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A `(unix seconds, value)` pair. Serializes as a two element JSON array.
pub type Point = (i64, f64);

/// The remote API's series types.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// The value at an instant.
    Gauge,
    /// The number of events over `interval` seconds.
    Count,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Kind::Gauge => f.write_str("gauge"),
            Kind::Count => f.write_str("count"),
        }
    }
}

/// A point sequence for one metric identity, ready for the uplink.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Series {
    /// The metric name.
    pub metric: String,
    /// The points, in arrival order.
    pub points: Vec<Point>,
    /// Gauge or count.
    #[serde(rename = "type")]
    pub kind: Kind,
    /// Seconds covered by each count point. Never zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// The host the series is reported for.
    pub host: String,
    /// `key:value` tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The body of a series submission.
#[derive(Debug, Serialize)]
pub struct Payload<'a> {
    /// The series to submit.
    pub series: &'a [Series],
}

impl Series {
    /// A gauge series holding the single point of `sample`.
    pub fn gauge(sample: Sample) -> Series {
        Series {
            metric: sample.name,
            points: vec![(sample.time.timestamp(), sample.value)],
            kind: Kind::Gauge,
            interval: None,
            host: sample.host,
            tags: sample.tags,
        }
    }

    /// A count series with a single point.
    ///
    /// An interval of zero is treated as no interval.
    pub fn count<S>(
        metric: S,
        timestamp: i64,
        value: f64,
        interval: u64,
        host: String,
        tags: Vec<String>,
    ) -> Series
    where
        S: Into<String>,
    {
        Series {
            metric: metric.into(),
            points: vec![(timestamp, value)],
            kind: Kind::Count,
            interval: if interval == 0 { None } else { Some(interval) },
            host: host,
            tags: tags,
        }
    }

    /// Aggregation key: FNV-1a over metric, host, type, interval and tags.
    ///
    /// Tags are hashed in emission order. `Measures` sorts them when hashing
    /// samples, so series of the same identity agree on that order by the time
    /// they reach the store.
    pub fn key(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.metric.hash(&mut hasher);
        self.host.hash(&mut hasher);
        self.kind.to_string().hash(&mut hasher);
        self.interval.unwrap_or(0).to_string().hash(&mut hasher);
        for tag in &self.tags {
            tag.hash(&mut hasher);
        }
        hasher.finish()
    }
}
