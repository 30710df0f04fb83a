//! Wall clock helpers and the fixed-cadence ticker used by the runtime and the
//! uplink.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// The current wall time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds between `from` and `to`, rounded to the nearest second.
pub fn round_secs(from: &DateTime<Utc>, to: &DateTime<Utc>) -> i64 {
    let millis = to.signed_duration_since(*from).num_milliseconds();
    (millis as f64 / 1000.0).round() as i64
}

/// Convert a std `Duration` into a chrono one, saturating on overflow.
pub fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::max_value())
}

/// Render a duration in seconds with millisecond precision.
pub fn as_secs_f64(d: Duration) -> f64 {
    d.as_secs() as f64 + f64::from(d.subsec_millis()) / 1000.0
}

/// A fixed-cadence ticker.
///
/// The first tick fires one interval after creation. If the consumer falls
/// behind, missed ticks are skipped rather than fired in a burst.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    /// Create a ticker with the given period.
    pub fn new(interval: Duration) -> Ticker {
        Ticker {
            interval: interval,
            next: Instant::now() + interval,
        }
    }

    /// The ticker's period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left until the next tick, zero if it is due.
    pub fn remaining(&self) -> Duration {
        self.next.saturating_duration_since(Instant::now())
    }

    /// True if the next tick is due.
    pub fn is_due(&self) -> bool {
        Instant::now() >= self.next
    }

    /// Consume the due tick and schedule the next one in the future.
    pub fn advance(&mut self) {
        let now = Instant::now();
        self.next += self.interval;
        if self.next <= now {
            if self.interval == Duration::from_secs(0) {
                self.next = now;
                return;
            }
            while self.next <= now {
                self.next += self.interval;
            }
        }
    }
}
